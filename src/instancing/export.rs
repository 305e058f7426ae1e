// src/instancing/export.rs
//! Split an instance list into fixed-size groups and bake each group into
//! its own mesh. Where the artifacts are written is the caller's business.

use bevy::prelude::*;
use bevy::render::mesh::Mesh;

use super::combine::combine_instances;
use crate::error::{VoxelError, VoxelResult};

/// One baked group, numbered in emission order.
#[derive(Clone, Debug)]
pub struct MeshArtifact {
    pub index: usize,
    /// Combined geometry with `Indices::U32`.
    pub mesh: Mesh,
    /// The group's transforms, in input order.
    pub instances: Vec<Transform>,
}

impl MeshArtifact {
    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

/// Contiguous groups of at most `chunk_size`; the last may be shorter.
/// Input order is kept, so the output is deterministic.
pub fn export(
    instances: &[Transform],
    source: Option<&Mesh>,
    chunk_size: usize,
) -> VoxelResult<Vec<MeshArtifact>> {
    let Some(source) = source else {
        return Err(VoxelError::NoGeometry);
    };
    if instances.is_empty() {
        return Err(VoxelError::EmptyInput);
    }
    if chunk_size == 0 {
        return Err(VoxelError::InvalidInput("export chunk size must be > 0".into()));
    }

    let mut artifacts = Vec::with_capacity(instances.len().div_ceil(chunk_size));
    for (index, group) in instances.chunks(chunk_size).enumerate() {
        let mesh = combine_instances(source, group).ok_or(VoxelError::NoGeometry)?;
        artifacts.push(MeshArtifact { index, mesh, instances: group.to_vec() });
    }

    info!(
        "export: {} instances -> {} artifact(s) of up to {}",
        instances.len(),
        artifacts.len(),
        chunk_size
    );
    Ok(artifacts)
}

/// Exporter bound to a chunk size, usually `GenerationConfig::export_chunk_size`.
#[derive(Clone, Copy, Debug)]
pub struct ChunkedExporter {
    pub chunk_size: usize,
}

impl ChunkedExporter {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn export(&self, instances: &[Transform], source: Option<&Mesh>) -> VoxelResult<Vec<MeshArtifact>> {
        export(instances, source, self.chunk_size)
    }
}
