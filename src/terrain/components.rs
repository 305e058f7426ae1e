// src/terrain/components.rs
use bevy::prelude::*;

use crate::instancing::RegistryHandle;

/// Marker for every entity the voxel terrain spawns.
#[derive(Component)]
pub struct VoxelTerrain;

/// One separately drawn voxel (individual render path).
#[derive(Component)]
pub struct LiveVoxel;

/// Product of a merge round.
#[derive(Component, Copy, Clone, Debug)]
pub struct MergedChunkTag {
    pub source_count: usize,
}

/// One merged mesh of a registered instance buffer.
#[derive(Component, Copy, Clone, Debug)]
pub struct VoxelBatch {
    pub handle: RegistryHandle,
    pub index: usize,
}
