//! Relay configuration – reads/writes `~/.meshrelay/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use meshrelay_runtime::RelayConfig;
use meshrelay_types::RelayError;
use serde::{Deserialize, Serialize};

/// Persisted relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port shared by the push channel and the status endpoint.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Source of decoded packets, one JSON object per line: `-` for stdin
    /// (the default, fed by a radio host tool) or a file / FIFO path.
    #[serde(default = "default_device_path")]
    pub device_path: String,

    /// Quiet period per node before its merged event is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Keep-alive ping interval.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_listen_port() -> u16 {
    meshrelay_server::DEFAULT_PORT
}
fn default_device_path() -> String {
    "-".to_string()
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_keepalive_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            device_path: default_device_path(),
            debounce_ms: default_debounce_ms(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl Config {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.keepalive_secs == 0 {
            return Err(RelayError::Config("keepalive_secs must be at least 1".to_string()));
        }
        if self.device_path.trim().is_empty() {
            return Err(RelayError::Config("device_path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            keepalive: Duration::from_secs(self.keepalive_secs),
        }
    }
}

/// Return the path to `~/.meshrelay/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".meshrelay").join("config.toml")
}

/// Load the file at `path` (defaults when absent), apply environment
/// overrides, and validate the result.
pub fn resolve(path: &Path) -> Result<Config, RelayError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, RelayError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| RelayError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `MESHRELAY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MESHRELAY_PORT` | `listen_port` |
/// | `MESHRELAY_DEVICE` | `device_path` |
/// | `MESHRELAY_DEBOUNCE_MS` | `debounce_ms` |
/// | `MESHRELAY_KEEPALIVE_SECS` | `keepalive_secs` |
///
/// # Errors
///
/// Returns [`RelayError::Config`] naming the variable when a numeric
/// override does not parse.
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), RelayError> {
    if let Some(port) = env_number("MESHRELAY_PORT")? {
        cfg.listen_port = port;
    }
    if let Ok(v) = std::env::var("MESHRELAY_DEVICE") {
        cfg.device_path = v;
    }
    if let Some(ms) = env_number("MESHRELAY_DEBOUNCE_MS")? {
        cfg.debounce_ms = ms;
    }
    if let Some(secs) = env_number("MESHRELAY_KEEPALIVE_SECS")? {
        cfg.keepalive_secs = secs;
    }
    Ok(())
}

fn env_number<T>(var: &str) -> Result<Option<T>, RelayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RelayError::Config(format!("{var}={v}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Save `cfg` to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), RelayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RelayError::Config(format!("failed to create {}: {e}", parent.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RelayError::Config(format!("failed to set permissions on {}: {e}", parent.display()))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RelayError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| RelayError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| RelayError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}
