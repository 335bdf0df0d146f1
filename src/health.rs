use crate::docker::ContainerRuntime;
use crate::types::ServiceName;
use log::{error, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of one liveness check over the required set. Ephemeral.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub all_running: bool,
    /// required services with no running container, in required-set order
    pub missing: Vec<ServiceName>,
}

/// Last observed "all required services running" value. Owned by the
/// supervisor instance; written only by [`check`].
#[derive(Clone, Default)]
pub struct FleetState(Arc<AtomicBool>);

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, all_running: bool) {
        self.0.store(all_running, Ordering::SeqCst);
    }

    pub fn all_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn missing_services(
    required: &[ServiceName],
    running: &HashSet<ServiceName>,
) -> Vec<ServiceName> {
    required
        .iter()
        .filter(|name| !running.contains(name))
        .cloned()
        .collect()
}

/// Checks that every required service has a running container and records
/// the verdict in `state`. A runtime failure counts as unhealthy rather
/// than propagating; the supervisor keeps running when the daemon is
/// briefly unreachable.
pub async fn check<R: ContainerRuntime>(
    runtime: &R,
    required: &[ServiceName],
    state: &FleetState,
) -> HealthStatus {
    let status = match runtime.list_containers().await {
        Ok(containers) => {
            let running: HashSet<ServiceName> = containers
                .into_iter()
                .filter(|container| container.running)
                .map(|container| container.name)
                .collect();
            let missing = missing_services(required, &running);
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(ServiceName::as_str).collect();
                warn!(
                    "the following required services are not running: {}",
                    names.join(", ")
                );
            }
            HealthStatus {
                all_running: missing.is_empty(),
                missing,
            }
        }
        Err(e) => {
            error!("failed to check whether the fleet is running: {e}");
            HealthStatus {
                all_running: false,
                missing: required.to_vec(),
            }
        }
    };
    state.set(status.all_running);
    status
}
