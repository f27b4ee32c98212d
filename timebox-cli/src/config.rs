//! Supervisor Configuration
//!
//! Optional TOML file plus command-line overrides. Every field has a default,
//! so an empty file (or none at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid port range {start}..={end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("max_spawn_attempts must be at least 1")]
    NoSpawnAttempts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    pub host: String,
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Ports tried before giving up on starting a worker
    pub max_spawn_attempts: u32,
    /// How long a fresh worker must stay alive to count as started
    pub startup_grace_ms: u64,
    pub respawn_pause_ms: u64,
    pub connect_timeout_ms: u64,
    /// 0 disables the limit
    pub problem_timeout_ms: u64,
    /// 0 disables the limit
    pub method_timeout_ms: u64,
    /// Pass worker stderr through
    pub debug: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_range_start: 1707,
            port_range_end: 1783,
            max_spawn_attempts: 77,
            startup_grace_ms: 100,
            respawn_pause_ms: 100,
            connect_timeout_ms: 2000,
            problem_timeout_ms: 5000,
            method_timeout_ms: 1000,
            debug: false,
        }
    }
}

impl SupervisorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            return Err(ConfigError::InvalidPortRange {
                start: self.port_range_start,
                end: self.port_range_end,
            });
        }
        if self.max_spawn_attempts == 0 {
            return Err(ConfigError::NoSpawnAttempts);
        }
        Ok(())
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn respawn_pause(&self) -> Duration {
        Duration::from_millis(self.respawn_pause_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn problem_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.problem_timeout_ms)
    }

    pub fn method_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.method_timeout_ms)
    }

    /// Longest wait for any reply before the worker counts as unresponsive.
    ///
    /// `None` while either request limit is disabled, since a request may
    /// then legitimately run forever.
    pub fn reply_timeout(&self) -> Option<Duration> {
        let limit = self.problem_timeout()?.max(self.method_timeout()?);
        Some(limit + self.connect_timeout())
    }

    /// Port after `port`, wrapping back to the start of the range
    pub fn next_port(&self, port: u16) -> u16 {
        if port >= self.port_range_end || port < self.port_range_start {
            self.port_range_start
        } else {
            port + 1
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SupervisorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.method_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(config.problem_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_next_port_wraps() {
        let config = SupervisorConfig::default();
        assert_eq!(config.next_port(1707), 1708);
        assert_eq!(config.next_port(1782), 1783);
        assert_eq!(config.next_port(1783), 1707);
        assert_eq!(config.next_port(80), 1707);
    }

    #[test]
    fn test_reply_timeout() {
        let config = SupervisorConfig::default();
        assert_eq!(config.reply_timeout(), Some(Duration::from_millis(7000)));

        let unbounded = SupervisorConfig {
            method_timeout_ms: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(unbounded.reply_timeout(), None);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port_range_start = 2000").unwrap();
        writeln!(file, "port_range_end = 2010").unwrap();
        writeln!(file, "method_timeout_ms = 0").unwrap();

        let config = SupervisorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.port_range_start, 2000);
        assert_eq!(config.port_range_end, 2010);
        assert_eq!(config.method_timeout(), None);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "prot = 1").unwrap();
        assert!(matches!(
            SupervisorConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port_range_start = 3000").unwrap();
        writeln!(file, "port_range_end = 2000").unwrap();
        assert!(matches!(
            SupervisorConfig::from_file(file.path()),
            Err(ConfigError::InvalidPortRange { start: 3000, end: 2000 })
        ));

        let config = SupervisorConfig {
            max_spawn_attempts: 0,
            ..SupervisorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoSpawnAttempts)));
    }

    #[test]
    fn test_missing_file() {
        let err = SupervisorConfig::load(Some(Path::new("/nonexistent/timebox.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
