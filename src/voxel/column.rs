// src/voxel/column.rs
//! Column expansion: one height sample -> a vertical run of voxels.

use bevy::prelude::*;

use crate::config::GenerationConfig;
use crate::height_field::HeightField;

/// One unit cube placed in world space. No identity beyond its slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelInstance {
    pub position: Vec3,
    pub scale: Vec3,
}

impl VoxelInstance {
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position).with_scale(self.scale)
    }
}

impl From<VoxelInstance> for Transform {
    fn from(v: VoxelInstance) -> Self {
        v.transform()
    }
}

/// The voxels of a single `(x, z)` cell, bottom to top.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelColumn {
    pub x: u32,
    pub z: u32,
    /// First emitted Y (inclusive).
    pub y_start: i32,
    /// Column top (exclusive).
    pub y_max: i32,
    pub instances: Vec<VoxelInstance>,
}

impl VoxelColumn {
    #[inline]
    pub fn len(&self) -> usize { self.instances.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.instances.is_empty() }
}

/// `(y_start, y_max)` for a cell. `y_start` never exceeds `y_max`, so a
/// cutoff above the surface gives an empty column instead of an error.
#[inline]
pub fn column_bounds(field: &HeightField, x: u32, z: u32, config: &GenerationConfig) -> (i32, i32) {
    let lookup_z = if config.flip_z { field.depth() - 1 - z } else { z };
    let h = field.get(x, lookup_z);
    let y_max = (h * config.height_multiplier).round() as i32;
    let cutoff = i32::try_from(config.underground_cutoff).unwrap_or(i32::MAX);
    (cutoff.min(y_max), y_max)
}

/// Append the voxels of cell `(x, z)` to `out`. Pure apart from `out`;
/// safe to run concurrently for disjoint cells with separate outputs.
pub fn expand_into(
    field: &HeightField,
    x: u32,
    z: u32,
    config: &GenerationConfig,
    out: &mut Vec<VoxelInstance>,
) {
    let (y_start, y_max) = column_bounds(field, x, z, config);
    let scale = config.voxel_scale();
    out.reserve(y_max.saturating_sub(y_start).max(0) as usize);
    for y in y_start..y_max {
        out.push(VoxelInstance {
            position: Vec3::new(x as f32, y as f32, z as f32) * scale,
            scale,
        });
    }
}

pub fn expand(field: &HeightField, x: u32, z: u32, config: &GenerationConfig) -> VoxelColumn {
    let (y_start, y_max) = column_bounds(field, x, z, config);
    let mut instances = Vec::new();
    expand_into(field, x, z, config, &mut instances);
    VoxelColumn { x, z, y_start, y_max, instances }
}

/// Single-threaded path: z outer, x inner. Reference order for the spawner.
pub fn expand_all(field: &HeightField, config: &GenerationConfig) -> Vec<VoxelInstance> {
    let mut out = Vec::new();
    for z in 0..field.depth() {
        for x in 0..field.width() {
            expand_into(field, x, z, config, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GenerationConfig {
        GenerationConfig::default()
    }

    #[test]
    fn flat_two_by_two_gives_twenty_voxels() {
        let field = HeightField::from_samples(2, 2, vec![0.5; 4]).unwrap();
        let all = expand_all(&field, &cfg());
        assert_eq!(all.len(), 20);
        for x in 0..2 {
            for z in 0..2 {
                let mut ys: Vec<i32> = all
                    .iter()
                    .filter(|v| v.position.x == x as f32 && v.position.z == z as f32)
                    .map(|v| v.position.y as i32)
                    .collect();
                ys.sort();
                assert_eq!(ys, vec![0, 1, 2, 3, 4]);
            }
        }
    }

    #[test]
    fn column_respects_cutoff_and_order() {
        let field = HeightField::from_samples(1, 1, vec![0.8]).unwrap();
        let config = GenerationConfig { underground_cutoff: 3, ..cfg() };
        let col = expand(&field, 0, 0, &config);
        assert_eq!((col.y_start, col.y_max), (3, 8));
        let ys: Vec<f32> = col.instances.iter().map(|v| v.position.y).collect();
        assert_eq!(ys, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn cutoff_above_surface_is_empty_not_error() {
        let field = HeightField::from_samples(1, 1, vec![0.2]).unwrap();
        let config = GenerationConfig { underground_cutoff: 50, ..cfg() };
        let col = expand(&field, 0, 0, &config);
        assert!(col.is_empty());
        assert_eq!(col.y_start, col.y_max);
    }

    #[test]
    fn zero_height_is_empty() {
        let field = HeightField::from_samples(1, 1, vec![0.0]).unwrap();
        assert!(expand(&field, 0, 0, &cfg()).is_empty());
    }

    #[test]
    fn scale_applies_per_axis() {
        let field = HeightField::from_samples(2, 1, vec![0.0, 0.2]).unwrap();
        let config = GenerationConfig { voxel_scale: [2.0, 0.5, 3.0], ..cfg() };
        let col = expand(&field, 1, 0, &config);
        assert_eq!(col.len(), 2);
        assert_eq!(col.instances[1].position, Vec3::new(2.0, 0.5, 0.0));
        assert_eq!(col.instances[1].scale, Vec3::new(2.0, 0.5, 3.0));
    }

    #[test]
    fn flip_z_reads_mirrored_row_but_keeps_world_z() {
        // row 0 low, row 2 high
        let field = HeightField::from_samples(1, 3, vec![0.1, 0.5, 1.0]).unwrap();
        let flipped = GenerationConfig { flip_z: true, ..cfg() };
        let col = expand(&field, 0, 0, &flipped);
        assert_eq!(col.len(), 10);
        assert!(col.instances.iter().all(|v| v.position.z == 0.0));
        assert_eq!(expand(&field, 0, 0, &cfg()).len(), 1);
    }

    #[test]
    fn every_voxel_stays_inside_its_bounds() {
        let samples: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).fract()).collect();
        let field = HeightField::from_samples(8, 8, samples).unwrap();
        let config = GenerationConfig { underground_cutoff: 2, ..cfg() };
        for z in 0..8 {
            for x in 0..8 {
                let col = expand(&field, x, z, &config);
                let (lo, hi) = column_bounds(&field, x, z, &config);
                assert_eq!(col.len(), (hi - lo).max(0) as usize);
                for v in &col.instances {
                    let y = v.position.y as i32;
                    assert!(y >= 2 && y < hi);
                }
            }
        }
    }
}
