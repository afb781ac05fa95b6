// ============================================================================
// Engine Configuration
// ============================================================================

use super::Routing;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Playback engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames read per track per streaming cycle
    pub chunk_size: usize,

    /// Output routing mode
    pub routing: Routing,

    /// Output device name substring (None = default device)
    pub output_device: Option<String>,

    /// Device ring buffer length in milliseconds
    pub buffer_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            routing: Routing::PerTrack,
            output_device: None,
            buffer_ms: 200,
        }
    }
}

impl EngineConfig {
    /// Load a YAML config file; absent keys keep their defaults
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Duration of one chunk in seconds at `frame_rate`
    pub fn chunk_duration(&self, frame_rate: u32) -> f64 {
        if frame_rate == 0 {
            return 0.0;
        }
        self.chunk_size as f64 / frame_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.routing, Routing::PerTrack);
        assert_eq!(config.buffer_ms, 200);
        assert!((config.chunk_duration(44100) - 0.02322).abs() < 1e-4);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size: 512\nrouting: mixed_bus").unwrap();

        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.routing, Routing::MixedBus);
        assert_eq!(config.buffer_ms, 200);
        assert_eq!(config.output_device, None);
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size: [1, 2]").unwrap();
        assert!(matches!(
            EngineConfig::from_yaml_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size: 0").unwrap();
        assert!(matches!(
            EngineConfig::from_yaml_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            EngineConfig::from_yaml_file("/nonexistent/engine.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
