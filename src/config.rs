// src/config.rs
//! Generation settings. One snapshot per generation request; shared as
//! `Arc<GenerationConfig>` and never mutated while a request runs.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// How the source image is turned into a height grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SamplingMode {
    /// Read source pixels directly, every `resolution`-th pixel on each axis.
    #[default]
    Exact,
    /// Fixed `resolution × resolution` grid, bilinear over normalized UV.
    Bilinear,
}

/// Which way the generated buffer reaches the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RenderPath {
    /// Hand the whole buffer to an instance registry.
    #[default]
    Instanced,
    /// One entity per voxel; these form the live set the merge optimizer works on.
    Individual,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Asset path of the heightmap image (relative to `assets/`).
    pub heightmap: String,
    pub sampling: SamplingMode,
    /// Stride in `Exact` mode, output grid edge in `Bilinear` mode. Must be >= 1.
    pub resolution: u32,
    /// World height of a fully white pixel, in voxels.
    pub height_multiplier: f32,
    /// Per-axis voxel size.
    pub voxel_scale: [f32; 3],
    /// Voxels below this Y are not emitted. Clamped per column to its top.
    pub underground_cutoff: u32,
    /// Look up rows as `depth - 1 - z` (image stored top-to-bottom).
    pub flip_z: bool,
    /// Instances folded into one chunk per merge round.
    pub merge_batch_size: usize,
    /// Instances per exported mesh artifact.
    pub export_chunk_size: usize,
    /// Columns handed to a worker at a time. Tuning only.
    pub spawn_batch_size: usize,
    pub render_path: RenderPath,
    /// Seed for the merge optimizer's random selection.
    pub seed: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            heightmap: "Heightmaps/heightmap.png".to_string(),
            sampling: SamplingMode::Exact,
            resolution: 1,
            height_multiplier: 10.0,
            voxel_scale: [1.0, 1.0, 1.0],
            underground_cutoff: 0,
            flip_z: false,
            merge_batch_size: 16,
            export_chunk_size: 1024,
            spawn_batch_size: 64,
            render_path: RenderPath::Instanced,
            seed: 1337,
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn voxel_scale(&self) -> Vec3 {
        Vec3::from_array(self.voxel_scale)
    }

    /// Reject values that would make generation meaningless. Cutoff and merge
    /// batch size are checked where they are used, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution == 0 {
            return Err(ConfigError::Invalid("resolution must be >= 1".into()));
        }
        if !self.height_multiplier.is_finite() || self.height_multiplier < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "height_multiplier must be finite and non-negative, got {}",
                self.height_multiplier
            )));
        }
        if self.voxel_scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "voxel_scale components must be finite and positive, got {:?}",
                self.voxel_scale
            )));
        }
        if self.export_chunk_size == 0 {
            return Err(ConfigError::Invalid("export_chunk_size must be > 0".into()));
        }
        if self.spawn_batch_size == 0 {
            return Err(ConfigError::Invalid("spawn_batch_size must be > 0".into()));
        }
        Ok(())
    }

    pub fn from_ron_str(src: &str) -> Result<Self, ConfigError> {
        let cfg: GenerationConfig =
            ron::de::from_str(src).map_err(|e| ConfigError::Ron(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&text)
    }
}

/// Snapshot handed to systems and tasks. Replaced, never edited in place.
#[derive(Resource, Clone, Debug, Default)]
pub struct ActiveConfig(pub Arc<GenerationConfig>);

/// Where the binary looks for its RON settings.
#[derive(Resource, Clone, Debug)]
pub struct ConfigSource {
    pub path: String,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self { path: "assets/voxel_terrain.ron".to_string() }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_keeps_documented_defaults() {
        let cfg = GenerationConfig::from_ron_str("(resolution: 2, flip_z: true)").unwrap();
        assert_eq!(cfg.resolution, 2);
        assert!(cfg.flip_z);
        assert_eq!(cfg.height_multiplier, 10.0);
        assert_eq!(cfg.voxel_scale(), Vec3::ONE);
        assert_eq!(cfg.sampling, SamplingMode::Exact);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let err = GenerationConfig::from_ron_str("(resolution: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_export_chunk_is_rejected() {
        let cfg = GenerationConfig { export_chunk_size: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_ron_reports_parse_error() {
        let err = GenerationConfig::from_ron_str("(resolution: \"two\")").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }
}
