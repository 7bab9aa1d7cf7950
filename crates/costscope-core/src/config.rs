//! Profiler configuration
//!
//! Layering: defaults, then an optional TOML file, then `COSTSCOPE_*`
//! environment variables. The CLI applies its own flags last.
//!
//! ```toml
//! session_name = "nightly-batch"
//! persist = true
//! persist_path = "/var/lib/costscope/usage.db"
//!
//! [hints]
//! cost_share_threshold = 0.05
//! max_mean_input_tokens = 8000
//! ```

use crate::error::CoreError;
use crate::hints::HintConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PERSIST: &str = "COSTSCOPE_PERSIST";
pub const ENV_DB: &str = "COSTSCOPE_DB";
pub const ENV_SESSION: &str = "COSTSCOPE_SESSION";

/// Session-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub session_name: String,
    /// Replay and mirror call records through the SQLite store
    pub persist: bool,
    /// Store location, `~/.costscope/usage.db` when unset
    pub persist_path: Option<PathBuf>,
    /// Broadcast buffer for session events
    pub event_capacity: usize,
    /// Bounded diagnostic history kept per session
    pub max_diagnostics: usize,
    pub hints: HintConfig,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            session_name: "default".to_string(),
            persist: false,
            persist_path: None,
            event_capacity: 256,
            max_diagnostics: 100,
            hints: HintConfig::default(),
        }
    }
}

impl ProfilerConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(CoreError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            message: source.message().to_string(),
            source,
        })
    }

    /// Apply `COSTSCOPE_*` overrides from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_env_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = var(ENV_PERSIST) {
            self.persist = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(value) = var(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.persist_path = Some(PathBuf::from(value));
        }
        if let Some(value) = var(ENV_SESSION).filter(|v| !v.trim().is_empty()) {
            self.session_name = value;
        }
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let fraction = |name: &str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(CoreError::InvalidConfig {
                    message: format!("{name} must be in (0, 1], got {value}"),
                })
            }
        };
        fraction("hints.cost_share_threshold", self.hints.cost_share_threshold)?;
        fraction(
            "hints.material_savings_fraction",
            self.hints.material_savings_fraction,
        )?;

        if self.hints.monthly_window_days == 0 {
            return Err(CoreError::InvalidConfig {
                message: "hints.monthly_window_days must be at least 1".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(CoreError::InvalidConfig {
                message: "event_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Effective store path, `None` only when no home directory exists
    pub fn db_path(&self) -> Option<PathBuf> {
        self.persist_path.clone().or_else(default_db_path)
    }
}

/// `~/.costscope/usage.db`
pub fn default_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".costscope").join("usage.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ProfilerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ProfilerConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("costscope.toml");
        std::fs::write(
            &path,
            "session_name = \"batch\"\n[hints]\ncost_share_threshold = 0.05\n",
        )
        .unwrap();

        let config = ProfilerConfig::load(&path).unwrap();
        assert_eq!(config.session_name, "batch");
        assert_eq!(config.hints.cost_share_threshold, 0.05);
        assert_eq!(config.hints.max_mean_input_tokens, 4_000);
        assert!(!config.persist);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "persist = [not valid").unwrap();

        let err = ProfilerConfig::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_PERSIST, "true"),
            (ENV_DB, "/tmp/costscope-test.db"),
            (ENV_SESSION, "ci"),
        ]);
        let config = ProfilerConfig::default()
            .apply_env_from(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.persist);
        assert_eq!(config.db_path(), Some(PathBuf::from("/tmp/costscope-test.db")));
        assert_eq!(config.session_name, "ci");
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let config = ProfilerConfig::default().apply_env_from(|key| match key {
            ENV_SESSION | ENV_DB => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.session_name, "default");
        assert!(config.persist_path.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = ProfilerConfig::default();
        assert!(config.validate().is_ok());

        config.hints.cost_share_threshold = 0.0;
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig { .. })));

        config.hints.cost_share_threshold = 0.2;
        config.hints.material_savings_fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
