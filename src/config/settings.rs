use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "FLEET_CONSOLE";

/// Settings for the console process itself (not the fleet's run parameters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    pub backend_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub cache_path: PathBuf,
    pub notice_ttl_secs: u64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5001".to_string(),
            poll_interval_secs: 5,
            request_timeout_secs: 10,
            cache_path: PathBuf::from("./console_cache"),
            notice_ttl_secs: 5,
        }
    }
}

impl ConsoleSettings {
    /// Layers defaults, the optional settings file, then `FLEET_CONSOLE_*`
    /// environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let defaults = Self::default();
        let settings: Self = ::config::Config::builder()
            .set_default("backend_url", defaults.backend_url.clone())?
            .set_default("poll_interval_secs", defaults.poll_interval_secs as i64)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("cache_path", defaults.cache_path.to_string_lossy().to_string())?
            .set_default("notice_ttl_secs", defaults.notice_ttl_secs as i64)?
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;

        settings
            .validate()
            .map_err(|errors| anyhow!("invalid console settings: {}", errors.join(", ")))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            errors.push("backend_url must start with http:// or https://".to_string());
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be > 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be > 0".to_string());
        }
        if self.notice_ttl_secs == 0 {
            errors.push("notice_ttl_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn notice_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.notice_ttl_secs as i64)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fleet_console_{}_{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_validate() {
        assert!(ConsoleSettings::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let settings = ConsoleSettings {
            backend_url: "localhost:5001".to_string(),
            poll_interval_secs: 0,
            request_timeout_secs: 0,
            ..ConsoleSettings::default()
        };
        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("fleet_console_does_not_exist.toml");
        let settings = ConsoleSettings::load(&path).unwrap();
        assert_eq!(settings.poll_interval_secs, 5);
        assert_eq!(settings.request_timeout_secs, 10);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = scratch_file(
            "override",
            "backend_url = \"http://10.0.0.5:5001\"\npoll_interval_secs = 2\n",
        );
        let settings = ConsoleSettings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.backend_url, "http://10.0.0.5:5001");
        assert_eq!(settings.poll_interval_secs, 2);
        assert_eq!(settings.notice_ttl_secs, 5);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = scratch_file("invalid", "poll_interval_secs = 0\n");
        let result = ConsoleSettings::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let settings = ConsoleSettings::default();
        let text = settings.to_toml().unwrap();
        let parsed: ConsoleSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }
}
