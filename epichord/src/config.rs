//! Embedded-default-plus-user-override configuration, in the style of
//! `imbolc-core::config::Config`: a baked-in `config.toml` merged with an
//! optional user file at `$HOME/.config/epichord/config.toml`.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    timebase: TimebaseConfig,
    #[serde(default)]
    dispatch: DispatchConfig,
    #[serde(default)]
    io: IoConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Deserialize, Default)]
struct TimebaseConfig {
    ticks_per_beat: Option<u32>,
    default_uspq: Option<u32>,
}

#[derive(Deserialize, Default)]
struct DispatchConfig {
    frame_size_ms: Option<u32>,
    playing_notes_capacity: Option<usize>,
    reclaim_queue_capacity: Option<usize>,
}

#[derive(Deserialize, Default)]
struct IoConfig {
    load_path_prefix: Option<String>,
}

#[derive(Deserialize, Default)]
struct LoggingConfig {
    level: Option<String>,
}

/// Resolved engine configuration. Unlike the original's hard-coded C
/// `#define`s, these are overridable, but every field defaults to the
/// original's value.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ticks_per_beat: u32,
    pub default_uspq: u32,
    pub frame_size_ns: u64,
    pub playing_notes_capacity: usize,
    pub reclaim_queue_capacity: usize,
    pub load_path_prefix: String,
    pub log_level: log::LevelFilter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::load()
    }
}

impl EngineConfig {
    /// Load the embedded defaults, merged with the user's config file if present.
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => log::warn!(
                            target: "config",
                            "ignoring malformed config {}: {}",
                            path.display(),
                            e
                        ),
                    },
                    Err(e) => log::warn!(
                        target: "config",
                        "could not read config {}: {}",
                        path.display(),
                        e
                    ),
                }
            }
        }

        let frame_size_ms = base.dispatch.frame_size_ms.unwrap_or(20) as u64;
        let log_level = base
            .logging
            .level
            .as_deref()
            .and_then(parse_level)
            .unwrap_or(log::LevelFilter::Warn);

        EngineConfig {
            ticks_per_beat: base.timebase.ticks_per_beat.unwrap_or(384),
            default_uspq: base.timebase.default_uspq.unwrap_or(500_000),
            frame_size_ns: frame_size_ms * 1_000_000,
            playing_notes_capacity: base.dispatch.playing_notes_capacity.unwrap_or(1024),
            reclaim_queue_capacity: base.dispatch.reclaim_queue_capacity.unwrap_or(32),
            load_path_prefix: base
                .io
                .load_path_prefix
                .unwrap_or_else(|| "/tmp/epichord-".to_string()),
            log_level,
        }
    }
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.timebase.ticks_per_beat.is_some() {
        base.timebase.ticks_per_beat = user.timebase.ticks_per_beat;
    }
    if user.timebase.default_uspq.is_some() {
        base.timebase.default_uspq = user.timebase.default_uspq;
    }
    if user.dispatch.frame_size_ms.is_some() {
        base.dispatch.frame_size_ms = user.dispatch.frame_size_ms;
    }
    if user.dispatch.playing_notes_capacity.is_some() {
        base.dispatch.playing_notes_capacity = user.dispatch.playing_notes_capacity;
    }
    if user.dispatch.reclaim_queue_capacity.is_some() {
        base.dispatch.reclaim_queue_capacity = user.dispatch.reclaim_queue_capacity;
    }
    if user.io.load_path_prefix.is_some() {
        base.io.load_path_prefix = user.io.load_path_prefix;
    }
    if user.logging.level.is_some() {
        base.logging.level = user.logging.level;
    }
}

fn parse_level(s: &str) -> Option<log::LevelFilter> {
    match s.to_ascii_lowercase().as_str() {
        "off" => Some(log::LevelFilter::Off),
        "error" => Some(log::LevelFilter::Error),
        "warn" => Some(log::LevelFilter::Warn),
        "info" => Some(log::LevelFilter::Info),
        "debug" => Some(log::LevelFilter::Debug),
        "trace" => Some(log::LevelFilter::Trace),
        _ => None,
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("epichord").join("config.toml"))
}
