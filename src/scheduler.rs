use crate::DockhandError;
use crate::docker::ContainerRuntime;
use crate::supervisor::Supervisor;
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay until the next occurrence of `fire_at` in local time. If today's
/// occurrence is already past, targets tomorrow's; at the exact instant
/// the delay is zero. Recomputed from the wall clock after every cycle,
/// never accumulated as a fixed interval.
pub fn delay_until(now: NaiveDateTime, fire_at: NaiveTime) -> Duration {
    let today = now.date().and_time(fire_at);
    let next = if now > today {
        today + TimeDelta::days(1)
    } else {
        today
    };
    (next - now).to_std().unwrap_or_default()
}

/// Arms the daily reconciliation timer. One long-lived task sleeps until
/// the next fire time, runs a cycle through the supervisor's single-flight
/// entry point, then re-arms; scheduled cycles can therefore never
/// overlap each other.
pub fn arm<R: ContainerRuntime + 'static>(supervisor: Arc<Supervisor<R>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let fire_at = supervisor.fire_time();
            let delay = delay_until(Local::now().naive_local(), fire_at);
            let secs = delay.as_secs();
            info!(
                "next reconciliation cycle at {} (in {}h{:02}m)",
                fire_at.format("%H:%M"),
                secs / 3600,
                (secs % 3600) / 60
            );
            tokio::time::sleep(delay).await;

            match supervisor.run_update_cycle_now().await {
                Ok(_) => {}
                Err(DockhandError::CycleInFlight) => {
                    warn!("scheduled cycle skipped, another cycle is in flight");
                }
                Err(e) => error!("scheduled cycle failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, time.2)
            .unwrap()
    }

    fn one_am() -> NaiveTime {
        NaiveTime::from_hms_opt(1, 0, 0).unwrap()
    }

    #[test]
    fn before_todays_occurrence_targets_today() {
        let delay = delay_until(at((2024, 1, 15), (0, 30, 0)), one_am());
        assert_eq!(delay, Duration::from_secs(30 * 60));
    }

    #[test]
    fn after_todays_occurrence_targets_tomorrow() {
        // 02:00 on the 15th -> 01:00 on the 16th
        let delay = delay_until(at((2024, 1, 15), (2, 0, 0)), one_am());
        assert_eq!(delay, Duration::from_secs(23 * 3600));
    }

    #[test]
    fn exact_instant_fires_now() {
        let delay = delay_until(at((2024, 1, 15), (1, 0, 0)), one_am());
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn delay_is_always_under_a_day() {
        for hour in 0..24 {
            for minute in [0, 1, 29, 59] {
                let delay = delay_until(at((2024, 1, 15), (hour, minute, 0)), one_am());
                assert!(delay < Duration::from_secs(24 * 3600));
            }
        }
    }

    #[test]
    fn month_rollover() {
        let delay = delay_until(at((2024, 1, 31), (23, 0, 0)), one_am());
        assert_eq!(delay, Duration::from_secs(2 * 3600));
    }
}
