//! Native messaging host for the alarm shell.
//!
//! Speaks length-prefixed JSON over stdin/stdout. Logs go to stderr so they
//! never interleave with frames.

use alarmgame_lib::config;
use log::{error, info};

fn main() {
    let config = config::load_or_init();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .target(env_logger::Target::Stderr)
    .init();

    info!("Starting alarm host");
    if let Err(e) = alarmgame_lib::run(&config, std::io::stdin(), std::io::stdout()) {
        error!("Alarm host initialization failed: {e}");
        std::process::exit(1);
    }
}
