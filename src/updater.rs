use crate::docker::{ContainerRecord, ContainerRuntime, RuntimeError};
use crate::types::ServiceName;
use log::{error, info, warn};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Delay before the single retry of a failed run step.
const RUN_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub service: ServiceName,
    pub updated: bool,
    pub error: Option<RuntimeError>,
}

impl UpdateOutcome {
    fn updated(service: ServiceName) -> Self {
        Self {
            service,
            updated: true,
            error: None,
        }
    }

    fn unchanged(service: ServiceName) -> Self {
        Self {
            service,
            updated: false,
            error: None,
        }
    }

    fn failed(service: ServiceName, error: RuntimeError) -> Self {
        Self {
            service,
            updated: false,
            error: Some(error),
        }
    }

    /// The service no longer exists: it was removed and could not be
    /// started again. The worst per-container outcome.
    pub fn left_absent(&self) -> bool {
        matches!(self.error, Some(RuntimeError::RunFailure { .. }))
    }
}

/// All outcomes of one reconciliation cycle. Logged and discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub outcomes: Vec<UpdateOutcome>,
}

impl UpdateReport {
    pub fn failures(&self) -> impl Iterator<Item = &UpdateOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn updated_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.updated).count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

impl Display for UpdateReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let unchanged = self.outcomes.len() - self.updated_count() - self.failure_count();
        write!(
            f,
            "{} checked, {} updated, {} up to date",
            self.outcomes.len(),
            self.updated_count(),
            unchanged
        )?;
        let failed: Vec<&str> = self
            .failures()
            .filter(|outcome| !outcome.left_absent())
            .map(|outcome| outcome.service.as_str())
            .collect();
        if !failed.is_empty() {
            write!(f, ", {} failed ({})", failed.len(), failed.join(", "))?;
        }
        let absent: Vec<&str> = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.left_absent())
            .map(|outcome| outcome.service.as_str())
            .collect();
        if !absent.is_empty() {
            write!(f, ", {} LEFT ABSENT ({})", absent.len(), absent.join(", "))?;
        }
        Ok(())
    }
}

/// Pulls the latest image for every required running service and replaces
/// containers whose image digest changed. One service's failure never
/// aborts the cycle; the report carries every per-service result.
pub async fn run_cycle<R: ContainerRuntime>(
    runtime: &R,
    required: &[ServiceName],
    excluded: Option<&ServiceName>,
) -> Result<UpdateReport, RuntimeError> {
    let containers = runtime.list_containers().await?;
    let mut outcomes = Vec::new();
    for record in containers
        .iter()
        .filter(|record| required.contains(&record.name))
    {
        if Some(&record.name) == excluded {
            info!(
                "skipping update check for {} as it is manually managed",
                record.name
            );
            continue;
        }
        outcomes.push(update_one(runtime, record).await);
    }

    let report = UpdateReport { outcomes };
    for outcome in report.failures() {
        if let Some(error) = &outcome.error {
            warn!("update of {} failed: {error}", outcome.service);
        }
    }
    Ok(report)
}

async fn update_one<R: ContainerRuntime>(runtime: &R, record: &ContainerRecord) -> UpdateOutcome {
    let service = record.name.clone();
    info!("checking for updates: {}", record.image);

    let digest = match runtime.pull_image(&record.image).await {
        Ok(digest) => digest,
        Err(e) => return UpdateOutcome::failed(service, e),
    };

    if digest == record.digest {
        info!("no update available for {service}");
        return UpdateOutcome::unchanged(service);
    }

    info!("new image for {service} ({digest}), replacing container");

    // bindings are captured here, immediately before the replacement, not
    // from the listing taken at the start of the cycle
    let live = match runtime.inspect_container(&service).await {
        Ok(live) => live,
        Err(e) => return UpdateOutcome::failed(service, e),
    };
    if live.digest == digest {
        info!("{service} is already on the new image");
        return UpdateOutcome::unchanged(service);
    }

    if let Err(e) = runtime.stop_container(&service).await {
        return UpdateOutcome::failed(service, e);
    }
    if let Err(e) = runtime.remove_container(&service).await {
        return UpdateOutcome::failed(service, e);
    }

    match runtime
        .run_container(&record.image, &service, &live.bindings)
        .await
    {
        Ok(_) => {
            info!("{service} updated and restarted");
            UpdateOutcome::updated(service)
        }
        Err(first) => {
            warn!("{service} did not start after replacement: {first}, retrying once");
            tokio::time::sleep(RUN_RETRY_DELAY).await;
            match runtime
                .run_container(&record.image, &service, &live.bindings)
                .await
            {
                Ok(_) => {
                    info!("{service} updated and restarted on retry");
                    UpdateOutcome::updated(service)
                }
                Err(e) => {
                    error!("{service} was removed but could not be started again, the service is now ABSENT: {e}");
                    UpdateOutcome::failed(service, e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(service: &str, updated: bool, error: Option<RuntimeError>) -> UpdateOutcome {
        UpdateOutcome {
            service: ServiceName::new(service),
            updated,
            error,
        }
    }

    #[test]
    fn report_summary_names_failed_and_absent_services() {
        let report = UpdateReport {
            outcomes: vec![
                outcome("sonarr", true, None),
                outcome("radarr", false, None),
                outcome(
                    "prowlarr",
                    false,
                    Some(RuntimeError::PullFailure {
                        image: crate::types::ImageName::new("linuxserver/prowlarr:latest"),
                        reason: "registry unreachable".to_string(),
                    }),
                ),
                outcome(
                    "qbittorrent",
                    false,
                    Some(RuntimeError::RunFailure {
                        service: ServiceName::new("qbittorrent"),
                        reason: "port already bound".to_string(),
                    }),
                ),
            ],
        };

        let summary = report.to_string();
        assert_eq!(
            summary,
            "4 checked, 1 updated, 1 up to date, 1 failed (prowlarr), 1 LEFT ABSENT (qbittorrent)"
        );
    }

    #[test]
    fn clean_report_has_no_failure_clause() {
        let report = UpdateReport {
            outcomes: vec![outcome("sonarr", false, None), outcome("radarr", false, None)],
        };
        assert_eq!(report.to_string(), "2 checked, 0 updated, 2 up to date");
        assert_eq!(report.failure_count(), 0);
    }
}
