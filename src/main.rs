mod alerts;
mod api;
mod catalog;
mod cli;
mod config;
mod database;
mod error;
mod lifecycle;
mod notifications;
mod schema;
mod server;

use cli::Cli;
use config::Config;
use flexi_logger::Logger;
use log::{debug, error};

fn main() {
    let config = match Config::init() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG takes precedence over the configured levels
    let logger = Logger::try_with_env_or_str(config.logging.log_spec())
        .and_then(|logger| logger.start());
    let _logger_handle = match logger {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("Failed to start logger: {}", err);
            std::process::exit(1);
        }
    };
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line(config) {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
