//! The warden daemon.
//!
//! Keeps [`WORKERS`] worker processes alive and logs content changes of
//! [`WATCH_DIR`]. There are no command line flags: the configuration is
//! fixed at compile time.

use log::info;

use warden::supervisor::{self, Config};

/// Number of worker processes kept alive.
const WORKERS: usize = 4;

/// Directory watched for content changes.
const WATCH_DIR: &str = "/tmp";

fn main() -> Result<(), warden::Error> {
    // Enable logging.
    std_logger::Config::logfmt().init();

    let config = Config {
        workers: WORKERS,
        watch_dir: WATCH_DIR.into(),
    };
    supervisor::run(config, |event| info!("filesystem change: {}", event))
}
