//! The render configuration contract (`spec.md` §3, §6 "Config script
//! contract"). The scripting language that actually evaluates a config
//! file is explicitly out of scope (`spec.md` §1); this module only
//! exposes the fields the core needs and a minimal serde-based source so
//! the crate is runnable without an embedded interpreter.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Render configuration, as produced by the (out-of-scope) config
/// script: image size, scene extents, sampling parameters, and the
/// worker addresses the renderer dials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub output_name: String,
    pub width: u32,
    pub height: u32,
    pub scene_min: Vec3,
    pub scene_max: Vec3,
    /// Antialiasing grid factor `A`; `1` disables antialiasing
    /// (`spec.md` §8).
    pub antialiasing: u16,
    /// Samples per emissive triangle, `S`.
    pub samples: u16,
    pub bounces: i16,
    pub threshold: f32,
    pub workers: Vec<String>,
    /// Auxiliary buffer names; `R`, `G`, `B` are always implicitly
    /// present (`spec.md` §3).
    pub buffers: Vec<String>,
}

impl Config {
    /// Validates the fields the core relies on (non-empty worker list,
    /// positive image size, non-degenerate scene extents) before any
    /// asset is sent — configuration errors fail fast in the coordinator
    /// (`spec.md` §7).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.is_empty() {
            return Err(ConfigError::NoWorkers);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "width/height",
                reason: "image dimensions must be nonzero".into(),
            });
        }
        if self.antialiasing == 0 {
            return Err(ConfigError::InvalidValue {
                field: "antialiasing",
                reason: "antialiasing grid factor must be at least 1".into(),
            });
        }
        if (self.scene_max - self.scene_min).min_element() <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "scene_min/scene_max",
                reason: "scene bounds must be non-degenerate".into(),
            });
        }
        Ok(())
    }

    /// All buffer names this render writes, `R`/`G`/`B` first.
    pub fn all_buffers(&self) -> Vec<String> {
        let mut names = vec!["R".to_string(), "G".to_string(), "B".to_string()];
        names.extend(self.buffers.iter().cloned());
        names
    }
}

/// The config-source contract: a config arrives either inline or from a
/// file, in whatever serde-deserializable shape `from_str` understands.
/// A real scripting front-end is a different implementation of this
/// trait; the core never depends on which one is plugged in
/// (`spec.md` §9).
pub trait ConfigSource {
    fn from_str(body: &str) -> Result<Config, ConfigError>;

    fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let body = std::fs::read_to_string(path)?;
        Self::from_str(&body)
    }
}

/// JSON-backed `ConfigSource`, standing in for the embedded scripting
/// front-end (`spec.md` §6's contract) until one is plugged in.
pub struct JsonConfigSource;

impl ConfigSource for JsonConfigSource {
    fn from_str(body: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(body).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            output_name: "out".into(),
            width: 640,
            height: 480,
            scene_min: Vec3::splat(-1.0),
            scene_max: Vec3::splat(1.0),
            antialiasing: 1,
            samples: 1,
            bounces: 0,
            threshold: 0.0,
            workers: vec!["127.0.0.1:19400".into()],
            buffers: vec![],
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_worker_list_is_rejected() {
        let mut config = valid_config();
        config.workers.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn degenerate_scene_bounds_are_rejected() {
        let mut config = valid_config();
        config.scene_max = config.scene_min;
        assert!(config.validate().is_err());
    }

    #[test]
    fn all_buffers_always_includes_rgb() {
        let mut config = valid_config();
        config.buffers = vec!["alpha".into()];
        assert_eq!(config.all_buffers(), vec!["R", "G", "B", "alpha"]);
    }
}
