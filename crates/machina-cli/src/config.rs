//! Configuration – reads/writes `~/.machina/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use machina_bridge::DriverConfig;
use machina_types::ACTION_EXECUTED;

/// Persisted user configuration stored in `~/.machina/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Delay before the follow-up refresh after a new event, in milliseconds.
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,

    /// Event tag the node reacts to.
    #[serde(default = "default_event_tag")]
    pub event_tag: String,

    /// Buffered output updates for the terminal printer.
    #[serde(default = "default_update_capacity")]
    pub update_capacity: usize,
}

fn default_refresh_delay_ms() -> u64 {
    5
}
fn default_event_tag() -> String {
    ACTION_EXECUTED.to_string()
}
fn default_update_capacity() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_delay_ms: default_refresh_delay_ms(),
            event_tag: default_event_tag(),
            update_capacity: default_update_capacity(),
        }
    }
}

impl Config {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            refresh_delay: Duration::from_millis(self.refresh_delay_ms),
            event_tag: self.event_tag.clone(),
        }
    }
}

/// Return the path to `~/.machina/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".machina").join("config.toml")
}

/// Load the config from disk with env overrides applied.  Returns `None` if
/// the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load the config, falling back to defaults (plus env overrides) when the
/// file is missing or unreadable.
pub fn load_or_default() -> (Config, Option<String>) {
    match load() {
        Ok(Some(cfg)) => (cfg, None),
        Ok(None) => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            (cfg, None)
        }
        Err(e) => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            (cfg, Some(e))
        }
    }
}

/// Apply `MACHINA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MACHINA_REFRESH_DELAY_MS` | `refresh_delay_ms` |
/// | `MACHINA_EVENT_TAG` | `event_tag` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MACHINA_REFRESH_DELAY_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.refresh_delay_ms = ms;
    }
    if let Ok(v) = std::env::var("MACHINA_EVENT_TAG")
        && !v.trim().is_empty()
    {
        cfg.event_tag = v.trim().to_string();
    }
}

/// Save the config to disk, creating `~/.machina/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bridge_behaviour() {
        let cfg = Config::default();
        assert_eq!(cfg.refresh_delay_ms, 5);
        assert_eq!(cfg.event_tag, "action-executed");
        let driver = cfg.driver_config();
        assert_eq!(driver.refresh_delay, Duration::from_millis(5));
        assert_eq!(driver, DriverConfig::default());
    }

    #[test]
    fn roundtrip_config_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            refresh_delay_ms: 20,
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.refresh_delay_ms, 20);
        assert_eq!(loaded.update_capacity, 64);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "event_tag = \"action-released\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.event_tag, "action-released");
        assert_eq!(loaded.refresh_delay_ms, 5);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "refresh_delay_ms = \"soon\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_machina_dir() {
        let p = config_path_for_home("/home/robot");
        assert!(p.to_string_lossy().contains(".machina"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    // Env-var tests touch process state; keep them in one test so they never
    // race each other.
    #[test]
    fn apply_env_overrides_reads_machina_vars() {
        // SAFETY: no other test in this crate reads these variables.
        unsafe {
            std::env::set_var("MACHINA_REFRESH_DELAY_MS", "25");
            std::env::set_var("MACHINA_EVENT_TAG", "execution-finished");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.refresh_delay_ms, 25);
        assert_eq!(cfg.event_tag, "execution-finished");

        unsafe { std::env::set_var("MACHINA_REFRESH_DELAY_MS", "later") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.refresh_delay_ms, 5);

        unsafe {
            std::env::remove_var("MACHINA_REFRESH_DELAY_MS");
            std::env::remove_var("MACHINA_EVENT_TAG");
        }
    }
}
