//! Log file setup: `simplelog::WriteLogger` writing to a file under the
//! user's config directory, falling back to `/tmp` if that directory can't
//! be created.

use std::fs::File;

use simplelog::{Config, WriteLogger};

/// Initialize the global logger at `level`, writing to
/// `$XDG_CONFIG_HOME/epichord/epichord.log` (or `/tmp/epichord.log` if that
/// path isn't writable). Diagnostics also still print to stderr per the
/// external-interfaces contract; that's handled by the caller via `log`'s
/// own level checks plus eprintln at the call sites that mirror stderr
/// output (see `bin/epichord.rs`).
pub fn init_logging(level: log::LevelFilter) {
    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("epichord")
        .join("epichord.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path)
        .unwrap_or_else(|_| File::create("/tmp/epichord.log").expect("cannot create log file"));

    WriteLogger::init(level, Config::default(), log_file).expect("failed to initialize logger");

    log::info!("epichord starting (log level: {:?})", level);
}
