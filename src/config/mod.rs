//! Preview configuration management for `panlive.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [serve], [render], [progress]
//! ├── error.rs       # ConfigError
//! └── mod.rs         # PreviewConfig (this file)
//! ```
//!
//! Precedence: CLI flag / `PANLIVE_*` env var > config file > default.
//! A missing config file is not an error; every section has defaults.

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{MathMode, ProgressConfig, RenderConfig, ServeConfig};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::ServerArgs;

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing panlive.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Absolute path to the config file, if one was read (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Converter and pipeline settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Progress marker timing
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl PreviewConfig {
    /// Load configuration: file (if present), then CLI overrides, then
    /// finalize and validate.
    pub fn load(config_path: &Path, args: &ServerArgs) -> Result<Self, ConfigError> {
        let mut config = if config_path.is_file() {
            let mut parsed = Self::from_path(config_path)?;
            parsed.config_path = Some(config_path.to_path_buf());
            parsed
        } else {
            crate::debug!("config"; "no config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_args(args);
        config.finalize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line overrides.
    fn apply_args(&mut self, args: &ServerArgs) {
        if let Some(home) = &args.home {
            self.serve.home = home.clone();
        }
        if let Some(port) = args.port {
            self.serve.port = port;
        }
        if let Some(interface) = args.interface {
            self.serve.interface = interface;
        }
        if let Some(dir) = &args.runtime_dir {
            self.serve.runtime_dir = Some(dir.clone());
        }
        if let Some(math) = args.math {
            self.render.math = math;
        }
        if let Some(pandoc) = &args.pandoc {
            self.render.pandoc = pandoc.clone();
        }
    }

    /// Expand `~` and make the home directory absolute.
    fn finalize(&mut self) -> Result<(), ConfigError> {
        let raw = self.serve.home.to_string_lossy();
        let expanded = PathBuf::from(shellexpand::tilde(&raw).as_ref());
        self.serve.home = expanded
            .canonicalize()
            .map_err(|e| ConfigError::Io(expanded.clone(), e))?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.serve.home.is_dir() {
            return Err(ConfigError::Validation(format!(
                "invalid home location: {}",
                self.serve.home.display()
            )));
        }
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("serve.port must be non-zero".into()));
        }
        if self.render.cache_capacity == 0 {
            return Err(ConfigError::Validation(
                "render.cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Home directory (absolute after `load`).
    pub fn home(&self) -> &Path {
        &self.serve.home
    }
}

/// Parse config text for tests; panics on invalid input.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> PreviewConfig {
    PreviewConfig::parse(content).expect("test config should parse")
}

/// A config rooted at `home` with fast timings, for pipeline tests.
#[cfg(test)]
pub fn test_config(home: &Path) -> PreviewConfig {
    let mut config = PreviewConfig::default();
    config.serve.home = home.to_path_buf();
    config.serve.runtime_dir = Some(home.join(".run"));
    config.render.settle_ms = 0;
    config.render.workers = 4;
    config.progress.grace_ms = 10_000;
    config
}

// ============================================================================
// tests
// ============================================================================
