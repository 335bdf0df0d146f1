use crate::types::ServiceName;
use chrono::NaiveTime;
use log::warn;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use figment2::{
    Figment,
    providers::{Env, Format, Toml},
};

/// The fixed set of services the supervisor keeps alive, and how to bring
/// them up when they are not.
#[derive(Deserialize, Debug, Clone)]
pub struct FleetConfig {
    /// required services; fixed for the process lifetime
    pub services: Vec<ServiceName>,
    /// health-checked but never auto-replaced
    pub excluded: Option<ServiceName>,
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ScheduleConfig {
    /// local wall-clock time of the daily reconciliation cycle, "HH:MM"
    #[serde(default = "default_update_at")]
    pub update_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_at: default_update_at(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    #[serde(default = "default_compose_bin")]
    pub compose_bin: String,
    /// upper bound on any single runtime call, seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,
    /// grace period handed to the runtime when stopping a container, seconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_bin: default_docker_bin(),
            compose_bin: default_compose_bin(),
            operation_timeout: default_operation_timeout(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub fleet: FleetConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Local time of day the daily cycle fires. Falls back to 01:00 when
    /// the configured value does not parse.
    pub fn fire_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.schedule.update_at, "%H:%M").unwrap_or_else(|_| {
            warn!(
                "schedule.update_at {:?} is not HH:MM, using 01:00",
                self.schedule.update_at
            );
            NaiveTime::from_hms_opt(1, 0, 0).unwrap()
        })
    }
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_update_at() -> String {
    "01:00".to_string()
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_compose_bin() -> String {
    "docker-compose".to_string()
}

fn default_operation_timeout() -> u64 {
    120
}

fn default_stop_timeout() -> i32 {
    30
}

pub async fn load_config(config_path: &Path) -> Config {
    let config: Config = Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("DOCKHAND_").split("__"))
        .extract()
        .expect("Failed to load config");

    if config.fleet.services.is_empty() {
        panic!("fleet.services must name at least one service");
    }
    if let Some(excluded) = &config.fleet.excluded
        && !config.fleet.services.contains(excluded)
    {
        panic!(
            "fleet.excluded {:?} is not one of fleet.services",
            excluded.as_str()
        );
    }
    config
}

#[test]
fn test_load_config() {
    use figment2::Jail;
    Jail::expect_with(|jail: &mut Jail| {
        jail.create_file(
            "config-test.toml",
            r#"
            [fleet]
            services = ["jellyseerr", "openvpn-client", "sonarr", "radarr", "prowlarr", "qbittorrent"]
            excluded = "openvpn-client"
            compose_file = "../docker-compose.yml"

            [schedule]
            update_at = "03:30"

            [runtime]
            stop_timeout = 10
            "#,
        )?;

        jail.set_env("DOCKHAND_RUNTIME__DOCKER_BIN", "podman");

        let config_path = "config-test.toml";

        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = rt.block_on(load_config(config_path.as_ref()));

        assert_eq!(config.fleet.services.len(), 6);
        assert_eq!(
            config.fleet.excluded,
            Some(ServiceName::new("openvpn-client"))
        );
        assert_eq!(config.fire_time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
        assert_eq!(config.runtime.docker_bin, "podman");
        assert_eq!(config.runtime.stop_timeout, 10);
        assert_eq!(config.runtime.operation_timeout, 120);
        assert_eq!(config.runtime.compose_bin, "docker-compose");

        Ok(())
    });
}

#[test]
fn test_fire_time_falls_back_on_garbage() {
    let config = Config {
        fleet: FleetConfig {
            services: vec![ServiceName::new("sonarr")],
            excluded: None,
            compose_file: default_compose_file(),
        },
        schedule: ScheduleConfig {
            update_at: "one in the morning".to_string(),
        },
        runtime: RuntimeConfig::default(),
    };
    assert_eq!(config.fire_time(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
}
