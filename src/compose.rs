use crate::DockhandError;
use crate::config::RuntimeConfig;
use log::info;
use std::path::Path;
use tokio::process::Command;

/// Splits a configured command line ("docker-compose", "docker compose")
/// into program and leading arguments.
fn split_command(command_line: &str) -> (&str, Vec<&str>) {
    let mut parts = command_line.split_whitespace();
    let program = parts.next().unwrap_or(command_line);
    (program, parts.collect())
}

async fn probe_version(command_line: &str) -> Result<String, String> {
    let (program, args) = split_command(command_line);
    let output = Command::new(program)
        .args(args)
        .arg("--version")
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string())
}

/// One-shot preflight: verifies the runtime and compose binaries are
/// installed. A failure is reported to the caller, never fatal to the
/// process.
pub async fn check_installations(config: &RuntimeConfig) -> Result<(), DockhandError> {
    match probe_version(&config.docker_bin).await {
        Ok(version) => info!("container runtime found: {version}"),
        Err(reason) => {
            return Err(DockhandError::Preflight(format!(
                "container runtime {:?} is not installed: {reason}",
                config.docker_bin
            )));
        }
    }
    match probe_version(&config.compose_bin).await {
        Ok(version) => info!("compose tool found: {version}"),
        Err(reason) => {
            return Err(DockhandError::Preflight(format!(
                "compose tool {:?} is not installed: {reason}",
                config.compose_bin
            )));
        }
    }
    Ok(())
}

/// Builds and starts the whole fleet from the compose definition,
/// blocking until the compose tool exits. Build output goes straight to
/// the supervisor's stdio. No retry; bootstrapping is triggered again
/// manually or on the next process start.
pub async fn build_and_start(
    config: &RuntimeConfig,
    compose_file: &Path,
) -> Result<(), DockhandError> {
    info!(
        "building and starting the fleet from {}",
        compose_file.display()
    );
    let (program, args) = split_command(&config.compose_bin);
    let status = Command::new(program)
        .args(args)
        .arg("-f")
        .arg(compose_file)
        .args(["up", "-d", "--build"])
        .status()
        .await
        .map_err(|e| DockhandError::Bootstrap(e.to_string()))?;

    if !status.success() {
        return Err(DockhandError::Bootstrap(format!(
            "compose exited with {status}"
        )));
    }
    info!("fleet built and started");
    Ok(())
}
