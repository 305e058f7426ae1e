// src/voxel/spawner.rs
//! Parallel expansion of the whole grid into an instance buffer.

use std::sync::Arc;

use bevy::prelude::*;
use bevy::tasks::{ComputeTaskPool, TaskPool};

use super::buffer::{CommitBuffer, InstanceBuffer};
use super::column::{expand_into, VoxelInstance};
use crate::config::GenerationConfig;
use crate::height_field::HeightField;

/// Columns per worker batch when the config doesn't say otherwise.
pub const DEFAULT_SPAWN_BATCH: usize = 64;

/// One generation request: the shared field, the config snapshot it was
/// built with, and whether its instances have already been produced.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub id: u64,
    pub field: Arc<HeightField>,
    pub config: Arc<GenerationConfig>,
    generated: bool,
}

impl GenerationRequest {
    pub fn new(id: u64, field: Arc<HeightField>, config: Arc<GenerationConfig>) -> Self {
        Self { id, field, config, generated: false }
    }

    #[inline]
    pub fn is_generated(&self) -> bool { self.generated }

    /// Allow the next `spawn_request` to run again.
    pub fn reset(&mut self) {
        self.generated = false;
    }
}

/// Splits the grid into contiguous column ranges and expands them on the
/// compute task pool. The height field is read by every worker through a
/// shared reference; the commit buffer is the only shared mutable state.
#[derive(Clone, Copy, Debug)]
pub struct ParallelSpawner {
    batch_size: usize,
}

impl Default for ParallelSpawner {
    fn default() -> Self {
        Self { batch_size: DEFAULT_SPAWN_BATCH }
    }
}

impl ParallelSpawner {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.spawn_batch_size)
    }

    #[inline]
    pub fn batch_size(&self) -> usize { self.batch_size }

    /// Expand every column. Returns only after all batches finished.
    pub fn spawn(&self, field: &HeightField, config: &GenerationConfig) -> InstanceBuffer {
        InstanceBuffer::from_instances(self.spawn_instances(field, config))
    }

    pub fn spawn_instances(&self, field: &HeightField, config: &GenerationConfig) -> Vec<VoxelInstance> {
        let columns = field.len();
        let width = field.width() as usize;
        let batch = self.batch_size;
        let buffer = CommitBuffer::<VoxelInstance>::new();

        let pool = ComputeTaskPool::get_or_init(TaskPool::default);
        pool.scope(|s| {
            for start in (0..columns).step_by(batch) {
                let end = (start + batch).min(columns);
                let buffer = &buffer;
                s.spawn(async move {
                    buffer.with_local(|out| {
                        for cell in start..end {
                            let x = (cell % width) as u32;
                            let z = (cell / width) as u32;
                            expand_into(field, x, z, config, out);
                        }
                    });
                });
            }
        });

        let instances = buffer.into_vec();
        debug!(
            "ParallelSpawner: {} columns in batches of {} -> {} instances",
            columns,
            batch,
            instances.len()
        );
        instances
    }

    /// Run a request once. A request that already produced its buffer is a
    /// no-op (`None`) until `reset`.
    pub fn spawn_request(&self, request: &mut GenerationRequest) -> Option<InstanceBuffer> {
        if request.generated {
            debug!("ParallelSpawner: request {} already generated; skipping", request.id);
            return None;
        }
        let buffer = self.spawn(&request.field, &request.config);
        request.generated = true;
        info!(
            "Generated request {}: {}x{} grid -> {} instances",
            request.id,
            request.field.width(),
            request.field.depth(),
            buffer.len()
        );
        Some(buffer)
    }
}
