use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub struct CliConfig {
    pub config_path: PathBuf,
    pub update_now: bool,
    pub bootstrap: bool,
}

impl From<ArgMatches> for CliConfig {
    fn from(matches: ArgMatches) -> Self {
        CliConfig {
            config_path: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("dockhand.toml")),
            update_now: matches.get_flag("update-now"),
            bootstrap: matches.get_flag("bootstrap"),
        }
    }
}

pub fn configure_cli() -> CliConfig {
    let matches = Command::new("dockhand")
        .version(env!("CARGO_PKG_VERSION"))
        .about("keep a fixed docker fleet running and on fresh images")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the configuration file")
                .value_name("PATH")
                .default_value("dockhand.toml")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("update-now")
                .long("update-now")
                .help("Run a single reconciliation cycle and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("bootstrap")
                .long("bootstrap")
                .help("Build and start the fleet from the compose file, then exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();
    matches.into()
}
