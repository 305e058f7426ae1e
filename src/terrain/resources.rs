// src/terrain/resources.rs

use std::collections::HashMap;

use bevy::prelude::*;
use bevy::tasks::Task;

use crate::error::VoxelResult;
use crate::instancing::RegistryHandle;
use crate::voxel::InstanceBuffer;

/// Shared geometry and the heightmap being sampled.
#[derive(Resource, Clone)]
pub struct VoxelAssets {
    pub cube: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
    pub heightmap: Handle<Image>,
}

/// What a generation task hands back.
pub struct GenerationOutput {
    pub id: u64,
    pub result: VoxelResult<InstanceBuffer>,
}

/// Request bookkeeping. Only the newest request's result is ever applied;
/// older tasks are detached and left to finish unobserved.
#[derive(Resource, Default)]
pub struct GenerationTasks {
    next_id: u64,
    /// Newest request id waiting for the heightmap to be ready.
    pub wanted: Option<u64>,
    pub in_flight: Option<(u64, Task<GenerationOutput>)>,
}

impl GenerationTasks {
    /// Ask for a (re)generation. Returns the new request id.
    pub fn request(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.wanted = Some(id);
        id
    }

    /// Id of the newest request, if any was made.
    pub fn latest(&self) -> Option<u64> {
        self.next_id.checked_sub(1)
    }
}

/// Entities drawing each registered buffer.
#[derive(Resource, Default)]
pub struct RegistryEntities {
    /// Handle of the terrain's current buffer.
    pub current: Option<RegistryHandle>,
    pub by_handle: HashMap<RegistryHandle, Vec<Entity>>,
}

#[derive(Resource)]
pub struct VoxelRenderConfig {
    /// Registry batches rebuilt per frame.
    pub max_rebuilds_per_frame: usize,
}

impl Default for VoxelRenderConfig {
    fn default() -> Self {
        Self { max_rebuilds_per_frame: 1 }
    }
}

/// Size of the next merge round. Escalation policy belongs to the caller.
#[derive(Resource, Clone, Copy, Debug)]
pub struct MergeRound {
    pub size: usize,
}

/// Mesh assets produced by the last export.
#[derive(Resource, Default)]
pub struct ExportedArtifacts {
    pub meshes: Vec<Handle<Mesh>>,
}
