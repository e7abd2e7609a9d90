use std::process::ExitCode;

use cityhash_lite::report::{self, ReportConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match ReportConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            eprintln!("{}", ReportConfig::USAGE);
            return ExitCode::from(2);
        }
    };

    match report::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
