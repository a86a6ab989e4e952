//! Application-level configuration loading: grid bounds, cooldowns and delivery tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PLACE_BACK_CONFIG_PATH";

const DEFAULT_MAX_COLUMNS: u32 = 1024;
const DEFAULT_MAX_ROWS: u32 = 1024;
/// Color reported for cells nobody painted yet.
pub const DEFAULT_COLOR: &str = "#D9D3D9";
const DEFAULT_PLACEMENT_COOLDOWN: Duration = Duration::from_secs(20);
const DEFAULT_SNAPSHOT_COOLDOWN: Duration = Duration::from_secs(5);
const DEFAULT_DELIVERY_BUFFER: usize = 256;
const DEFAULT_SNAPSHOT_CONCURRENCY: usize = 64;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Largest accepted `columns`; placements need `x < max_columns`.
    pub max_columns: u32,
    /// Largest accepted `rows`; placements need `y < max_rows`.
    pub max_rows: u32,
    /// Color reported for cells nobody painted.
    pub default_color: String,
    /// Minimum delay between two accepted placements from one identity.
    pub placement_cooldown: Duration,
    /// Minimum delay between two snapshot reads from one identity.
    pub snapshot_cooldown: Duration,
    /// Pixels a connection may have queued before it counts as stalled.
    pub delivery_buffer: usize,
    /// Concurrent cell reads issued while building a snapshot.
    pub snapshot_concurrency: usize,
    /// Use the first `X-Forwarded-For` entry as the client identity.
    pub trust_forwarded_for: bool,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        max_columns = app_config.max_columns,
                        max_rows = app_config.max_rows,
                        placement_cooldown_secs = app_config.placement_cooldown.as_secs_f64(),
                        "loaded canvas configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Whether `(x, y)` lies on the canvas.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.max_columns && y < self.max_rows
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every field is optional; omitted ones keep their built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    max_columns: Option<u32>,
    max_rows: Option<u32>,
    default_color: Option<String>,
    placement_cooldown_secs: Option<f64>,
    snapshot_cooldown_secs: Option<f64>,
    delivery_buffer: Option<usize>,
    snapshot_concurrency: Option<usize>,
    trust_forwarded_for: Option<bool>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            max_columns: value.max_columns.unwrap_or(DEFAULT_MAX_COLUMNS).max(1),
            max_rows: value.max_rows.unwrap_or(DEFAULT_MAX_ROWS).max(1),
            default_color: value
                .default_color
                .unwrap_or_else(|| DEFAULT_COLOR.to_owned()),
            placement_cooldown: secs_or(
                value.placement_cooldown_secs,
                DEFAULT_PLACEMENT_COOLDOWN,
            ),
            snapshot_cooldown: secs_or(value.snapshot_cooldown_secs, DEFAULT_SNAPSHOT_COOLDOWN),
            delivery_buffer: value
                .delivery_buffer
                .unwrap_or(DEFAULT_DELIVERY_BUFFER)
                .max(1),
            snapshot_concurrency: value
                .snapshot_concurrency
                .unwrap_or(DEFAULT_SNAPSHOT_CONCURRENCY)
                .max(1),
            trust_forwarded_for: value.trust_forwarded_for.unwrap_or(false),
        }
    }
}

/// Negative, NaN or absurdly large values fall back to `default`.
fn secs_or(secs: Option<f64>, default: Duration) -> Duration {
    secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(default)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
