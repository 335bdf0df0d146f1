use chrono::Local;
use dockhand::cli::configure_cli;
use dockhand::config::load_config;
use dockhand::docker::DockerRuntime;
use dockhand::notifications::setup_dispatcher;
use dockhand::supervisor::Supervisor;
use dockhand::scheduler;
use env_logger::Env;
use log::{error, info};
use std::process;
use std::sync::Arc;

fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            let level = match record.level() {
                log::Level::Error => "ERROR",
                log::Level::Warn => "WARNING",
                log::Level::Info => "INFO",
                log::Level::Debug => "DEBUG",
                log::Level::Trace => "TRACE",
            };
            writeln!(
                buf,
                "({}) [dockhand]: [{level}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    init_logging();
    #[cfg(target_os = "linux")]
    set_group_id();

    let args = configure_cli();
    let config = load_config(&args.config_path).await;
    let dispatcher = setup_dispatcher();
    let runtime = DockerRuntime::new(&config.runtime)?;
    let supervisor = Arc::new(Supervisor::new(runtime, config, dispatcher));

    if args.bootstrap {
        supervisor.bootstrap().await?;
        return Ok(());
    }
    if args.update_now {
        let report = supervisor.run_update_cycle_now().await?;
        info!("{report}");
        return Ok(());
    }

    info!("Starting dockhand");
    if let Err(e) = supervisor.preflight().await {
        error!("{e}");
    }

    // bootstrap only once absence is confirmed, and arm the scheduler only
    // once bootstrap finished
    let status = supervisor.is_healthy().await;
    if status.all_running {
        info!("all required services are already running");
    } else if let Err(e) = supervisor.bootstrap().await {
        error!("initial bootstrap failed: {e}");
    }

    ctrlc::set_handler(move || {
        info!("Received shutdown signal, gracefully shutting down...");
        process::exit(0);
    })
    .expect("Error setting Ctrl-C handler");

    let scheduler = scheduler::arm(supervisor.clone());
    info!("update scheduler is set up");
    scheduler.await?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_group_id() {
    // dockhand itself often runs as a container with the docker socket
    // mounted; joining the socket's group needs CAP_SETGID
    let Ok(gid) = std::env::var("DOCKER_GID") else {
        return;
    };
    let gid = gid.parse::<u32>().expect("Invalid DOCKER_GID");
    info!("Setting GID to {gid}");
    unsafe {
        if libc::setgid(gid) != 0 {
            error!("Failed to set GID to {gid}");
        }
    }
}
