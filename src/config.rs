use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_geom::{ChunkSize, Vec3};
use tessera_runtime::SchedulerConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("chunk_size must be a power of two in 2..={max}, got {0}", max = ChunkSize::MAX_EDGE)]
    ChunkSize(usize),
    #[error("view_radius must be non-negative, got {0}")]
    ViewRadius(i32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub chunk_size: usize,
    /// Horizontal radius, in chunks, generated around the viewer.
    pub view_radius: i32,
    /// Chunk layers generated below and including cy = 0.
    pub depth: i32,
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            view_radius: 2,
            depth: 2,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub world: WorldConfig,
    pub scheduler: SchedulerConfig,
    pub viewer: [f32; 3],
}

impl TesseraConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: TesseraConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let edge = self.world.chunk_size;
        if !edge.is_power_of_two() || !(2..=ChunkSize::MAX_EDGE).contains(&edge) {
            return Err(ConfigError::ChunkSize(edge));
        }
        if self.world.view_radius < 0 {
            return Err(ConfigError::ViewRadius(self.world.view_radius));
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> ChunkSize {
        ChunkSize::new(self.world.chunk_size)
    }

    pub fn viewer(&self) -> Vec3 {
        let [x, y, z] = self.viewer;
        Vec3::new(x, y, z)
    }
}
