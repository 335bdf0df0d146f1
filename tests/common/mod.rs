use dockhand::docker::{BindingSnapshot, ContainerRecord, ContainerRuntime, RuntimeError};
use dockhand::types::{ImageDigest, ImageName, ServiceName};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Everything the fake runtime was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Inspect(String),
    Pull(String),
    Stop(String),
    Remove(String),
    Run {
        name: String,
        image: String,
        bindings: BindingSnapshot,
    },
}

/// Lets a test hold a cycle open inside its first pull: the fake signals
/// `entered` and then waits for `release`.
pub struct PullGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory stand-in for the docker daemon.
#[derive(Default)]
pub struct FakeRuntime {
    pub containers: Mutex<Vec<ContainerRecord>>,
    pub list_error: Mutex<Option<RuntimeError>>,
    pub pull_results: Mutex<HashMap<String, Result<ImageDigest, RuntimeError>>>,
    pub stop_errors: Mutex<HashMap<String, RuntimeError>>,
    pub remove_errors: Mutex<HashMap<String, RuntimeError>>,
    pub run_errors: Mutex<HashMap<String, RuntimeError>>,
    pub calls: Mutex<Vec<Call>>,
    pub pull_gate: Option<PullGate>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, record: ContainerRecord) {
        self.containers.lock().unwrap().push(record);
    }

    pub fn set_pull(&self, image: &str, result: Result<ImageDigest, RuntimeError>) {
        self.pull_results
            .lock()
            .unwrap()
            .insert(image.to_string(), result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        self.push(Call::List);
        if let Some(error) = self.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn inspect_container(&self, name: &ServiceName) -> Result<ContainerRecord, RuntimeError> {
        self.push(Call::Inspect(name.as_str().to_string()));
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|record| &record.name == name)
            .cloned()
            .ok_or_else(|| RuntimeError::Unavailable(format!("no such container: {name}")))
    }

    async fn pull_image(&self, image: &ImageName) -> Result<ImageDigest, RuntimeError> {
        self.push(Call::Pull(image.as_str().to_string()));
        if let Some(gate) = &self.pull_gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.pull_results
            .lock()
            .unwrap()
            .get(image.as_str())
            .cloned()
            .unwrap_or_else(|| {
                Err(RuntimeError::PullFailure {
                    image: image.clone(),
                    reason: "no pull result configured".to_string(),
                })
            })
    }

    async fn stop_container(&self, name: &ServiceName) -> Result<(), RuntimeError> {
        self.push(Call::Stop(name.as_str().to_string()));
        if let Some(error) = self.stop_errors.lock().unwrap().get(name.as_str()) {
            return Err(error.clone());
        }
        Ok(())
    }

    async fn remove_container(&self, name: &ServiceName) -> Result<(), RuntimeError> {
        self.push(Call::Remove(name.as_str().to_string()));
        if let Some(error) = self.remove_errors.lock().unwrap().get(name.as_str()) {
            return Err(error.clone());
        }
        self.containers
            .lock()
            .unwrap()
            .retain(|record| &record.name != name);
        Ok(())
    }

    async fn run_container(
        &self,
        image: &ImageName,
        name: &ServiceName,
        bindings: &BindingSnapshot,
    ) -> Result<ContainerRecord, RuntimeError> {
        self.push(Call::Run {
            name: name.as_str().to_string(),
            image: image.as_str().to_string(),
            bindings: bindings.clone(),
        });
        if let Some(error) = self.run_errors.lock().unwrap().get(name.as_str()) {
            return Err(error.clone());
        }
        let record = ContainerRecord {
            name: name.clone(),
            image: image.clone(),
            digest: ImageDigest::new("sha256:started"),
            running: true,
            bindings: bindings.clone(),
        };
        self.add_container(record.clone());
        Ok(record)
    }
}

pub fn record(name: &str, image: &str, digest: &str, bindings: BindingSnapshot) -> ContainerRecord {
    ContainerRecord {
        name: ServiceName::new(name),
        image: ImageName::new(image),
        digest: ImageDigest::new(digest),
        running: true,
        bindings,
    }
}
