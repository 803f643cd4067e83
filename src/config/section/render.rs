//! `[render]` section configuration.
//!
//! Converter flags and render pipeline tuning.
//!
//! # Example
//!
//! ```toml
//! [render]
//! pandoc = "pandoc"               # Converter binary
//! math = "katex"                  # mathml | katex
//! reader = "markdown+emoji"       # pandoc reader with extensions
//! citeproc = ["--citeproc"]       # citation processing flags
//! cache_capacity = 8192           # block cache entries
//! workers = 0                     # 0 = available parallelism
//! settle_ms = 300                 # quiet period between renders
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Math rendering mode passed to the converter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathMode {
    #[default]
    Mathml,
    Katex,
}

impl MathMode {
    /// Converter flag for this mode.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Mathml => "--mathml",
            Self::Katex => "--katex",
        }
    }
}

impl std::str::FromStr for MathMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mathml" => Ok(Self::Mathml),
            "katex" => Ok(Self::Katex),
            other => Err(format!("unknown math mode `{other}` (expected mathml or katex)")),
        }
    }
}

/// Render pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Converter binary.
    pub pandoc: PathBuf,

    /// Math rendering mode.
    pub math: MathMode,

    /// Reader format for the structured-conversion pass.
    pub reader: String,

    /// Arguments enabling citation processing.
    pub citeproc: Vec<String>,

    /// Block cache capacity (entries).
    pub cache_capacity: usize,

    /// Converter worker pool size (0 = available parallelism).
    pub workers: usize,

    /// Settle delay between renders, in milliseconds.
    pub settle_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pandoc: PathBuf::from("pandoc"),
            math: MathMode::Mathml,
            reader: "markdown+emoji".to_string(),
            citeproc: vec!["--citeproc".to_string()],
            cache_capacity: 8192,
            workers: 0,
            settle_ms: 300,
        }
    }
}

impl RenderConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::MathMode;
    use crate::config::test_parse_config;

    #[test]
    fn test_render_config_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.render.math, MathMode::Mathml);
        assert_eq!(config.render.reader, "markdown+emoji");
        assert_eq!(config.render.cache_capacity, 8192);
        assert_eq!(config.render.settle_ms, 300);
        assert!(config.render.worker_count() >= 1);
    }

    #[test]
    fn test_render_config_override() {
        let config = test_parse_config(
            "[render]\nmath = \"katex\"\nworkers = 3\nciteproc = [\"--filter\", \"pandoc-citeproc\"]",
        );
        assert_eq!(config.render.math, MathMode::Katex);
        assert_eq!(config.render.math.flag(), "--katex");
        assert_eq!(config.render.worker_count(), 3);
        assert_eq!(config.render.citeproc, ["--filter", "pandoc-citeproc"]);
    }

    #[test]
    fn test_math_mode_from_str() {
        assert_eq!("KaTeX".parse::<MathMode>(), Ok(MathMode::Katex));
        assert!("mathjax".parse::<MathMode>().is_err());
    }
}
