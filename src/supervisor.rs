use crate::config::Config;
use crate::docker::ContainerRuntime;
use crate::health::{FleetState, HealthStatus};
use crate::updater::UpdateReport;
use crate::{DockhandError, compose, health, notifications, updater};
use chatterbox::message::Dispatcher;
use chrono::NaiveTime;
use log::{info, warn};
use tokio::sync::Mutex;

/// Owns everything with process lifetime: the runtime client, the config
/// snapshot, the fleet-state cell and the single-flight cycle guard.
pub struct Supervisor<R: ContainerRuntime> {
    runtime: R,
    config: Config,
    fleet_state: FleetState,
    cycle_lock: Mutex<()>,
    dispatcher: Dispatcher,
}

impl<R: ContainerRuntime> Supervisor<R> {
    pub fn new(runtime: R, config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            runtime,
            config,
            fleet_state: FleetState::new(),
            cycle_lock: Mutex::new(()),
            dispatcher,
        }
    }

    /// Verifies the runtime and compose binaries are installed.
    pub async fn preflight(&self) -> Result<(), DockhandError> {
        compose::check_installations(&self.config.runtime).await
    }

    /// Checks the fleet and refreshes the cached fleet state.
    pub async fn is_healthy(&self) -> HealthStatus {
        health::check(&self.runtime, &self.config.fleet.services, &self.fleet_state).await
    }

    /// Builds and starts the fleet from the compose definition.
    pub async fn bootstrap(&self) -> Result<(), DockhandError> {
        compose::build_and_start(&self.config.runtime, &self.config.fleet.compose_file).await
    }

    /// Runs one reconciliation cycle: health check, then an update pass
    /// over every required service. At most one cycle is in flight at a
    /// time; a concurrent request is rejected with
    /// [`DockhandError::CycleInFlight`] instead of racing the running one.
    pub async fn run_update_cycle_now(&self) -> Result<UpdateReport, DockhandError> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("rejecting update cycle, another one is already in flight");
            return Err(DockhandError::CycleInFlight);
        };

        info!("update process is starting");
        let status = self.is_healthy().await;
        if !status.all_running {
            warn!("fleet is not fully running, skipping the update pass; run bootstrap first");
            return Ok(UpdateReport::default());
        }

        let excluded = self.config.fleet.excluded.as_ref();
        let report =
            updater::run_cycle(&self.runtime, &self.config.fleet.services, excluded).await?;
        info!("update cycle finished: {report}");
        notifications::notify_report(&self.dispatcher, &report).await;
        Ok(report)
    }

    /// Local time of day the daily cycle fires.
    pub fn fire_time(&self) -> NaiveTime {
        self.config.fire_time()
    }

    /// Last health verdict; readable without touching the runtime.
    pub fn fleet_state(&self) -> &FleetState {
        &self.fleet_state
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}
