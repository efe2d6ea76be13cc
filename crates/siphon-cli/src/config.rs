//! Configuration for the siphon CLI.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// siphon configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Replay configuration
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Where reconstructed files land
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for all contexts
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    /// Place output under `root/Payload/<bundle name>` instead of `root`
    #[serde(default = "default_true")]
    pub bundle_layout: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Show a progress bar while feeding events
    #[serde(default = "default_true")]
    pub progress: bool,
}

// Default values

fn default_output_root() -> PathBuf {
    PathBuf::from("dump")
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            bundle_layout: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { progress: true }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("siphon/config.toml")
    }

    /// Load config from `path`, writing the defaults there first if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Locate and load the configuration for one invocation.
    ///
    /// Uses `explicit` if given, else [`Config::default_path`]. With `create`
    /// a missing file is written with the defaults. Without it, a missing
    /// explicit file is an error and a missing default file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or created.
    pub fn resolve(explicit: Option<&Path>, create: bool) -> anyhow::Result<(PathBuf, Self)> {
        let path = explicit.map_or_else(Self::default_path, Path::to_path_buf);

        let config = if create {
            Self::load_or_default(&path)
                .with_context(|| format!("initialising {}", path.display()))?
        } else if path.exists() {
            Self::load(&path).with_context(|| format!("loading {}", path.display()))?
        } else if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            Self::default()
        };

        Ok((path, config))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.output.root.as_os_str().is_empty() {
            anyhow::bail!("Output root must not be empty");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.output.root, PathBuf::from("dump"));
        assert!(config.output.bundle_layout);
        assert_eq!(config.logging.level, "info");
        assert!(config.replay.progress);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.output.root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[output]\nbundle_layout = false\n").unwrap();
        assert!(!config.output.bundle_layout);
        assert_eq!(config.output.root, PathBuf::from("dump"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_resolve_init_creates_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom/siphon.toml");

        assert!(Config::resolve(Some(&path), false).is_err());
        assert!(!path.exists());

        let (resolved, config) = Config::resolve(Some(&path), true).unwrap();
        assert_eq!(resolved, path);
        assert!(path.exists());
        assert_eq!(config.logging.level, "info");

        let (_, reloaded) = Config::resolve(Some(&path), false).unwrap();
        assert_eq!(reloaded.output.root, config.output.root);
    }

    #[test]
    fn test_resolve_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("siphon.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let (_, config) = Config::resolve(Some(&path), true).unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_or_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let created = Config::load_or_default(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(created.output.root, loaded.output.root);
        assert_eq!(created.logging.level, loaded.logging.level);
    }
}
