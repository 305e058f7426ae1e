// src/instancing/registry.rs
//! Boundary to an instanced renderer, plus a CPU fallback that draws a
//! registered buffer as a handful of merged meshes.

use std::collections::HashMap;

use bevy::prelude::*;
use bevy::render::mesh::Mesh;

use super::combine::is_combinable;
use super::export::export;
use crate::error::{VoxelError, VoxelResult};
use crate::voxel::InstanceBuffer;

/// Opaque key for a registered buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryHandle(u64);

/// What a high-throughput instanced renderer has to offer.
pub trait InstanceRegistry: Send + Sync + 'static {
    fn register(&mut self, buffer: &InstanceBuffer) -> VoxelResult<RegistryHandle>;
    fn update(&mut self, handle: RegistryHandle, buffer: &InstanceBuffer) -> VoxelResult<()>;
    fn dispose(&mut self, handle: RegistryHandle) -> VoxelResult<()>;
}

/// One registered buffer and its build state.
#[derive(Debug)]
pub struct RegisteredBatch {
    pub instances: Vec<Transform>,
    /// True when instances changed since last build.
    pub dirty: bool,
    /// How many instances were baked into the last build.
    pub last_built_count: usize,
}

/// Registry that turns each buffer into meshes of `batch_size` instances.
#[derive(Resource)]
pub struct BatchedMeshRegistry {
    source: Mesh,
    batch_size: usize,
    max_instances: Option<usize>,
    next_id: u64,
    batches: HashMap<RegistryHandle, RegisteredBatch>,
    disposed: Vec<RegistryHandle>,
}

impl BatchedMeshRegistry {
    pub fn new(source: Mesh, batch_size: usize) -> VoxelResult<Self> {
        if !is_combinable(&source) {
            return Err(VoxelError::RegistrationFailure(
                "registry source mesh must be a triangle list with float3 positions".into(),
            ));
        }
        if batch_size == 0 {
            return Err(VoxelError::InvalidInput("registry batch size must be > 0".into()));
        }
        Ok(Self {
            source,
            batch_size,
            max_instances: None,
            next_id: 0,
            batches: HashMap::new(),
            disposed: Vec::new(),
        })
    }

    /// Refuse buffers larger than `max` instances.
    pub fn with_capacity_limit(mut self, max: usize) -> Self {
        self.max_instances = Some(max);
        self
    }

    pub fn contains(&self, handle: RegistryHandle) -> bool {
        self.batches.contains_key(&handle)
    }

    pub fn get(&self, handle: RegistryHandle) -> Option<&RegisteredBatch> {
        self.batches.get(&handle)
    }

    fn check_capacity(&self, buffer: &InstanceBuffer) -> VoxelResult<()> {
        match self.max_instances {
            Some(max) if buffer.len() > max => Err(VoxelError::RegistrationFailure(format!(
                "buffer of {} instances exceeds the limit of {}",
                buffer.len(),
                max
            ))),
            _ => Ok(()),
        }
    }

    /// Build meshes for up to `budget` dirty batches. An empty buffer
    /// builds to no meshes.
    pub fn rebuild_dirty(&mut self, budget: usize) -> Vec<(RegistryHandle, Vec<Mesh>)> {
        let mut built = Vec::new();
        for (handle, batch) in self.batches.iter_mut() {
            if built.len() >= budget {
                break;
            }
            if !batch.dirty {
                continue;
            }
            let meshes = if batch.instances.is_empty() {
                Vec::new()
            } else {
                match export(&batch.instances, Some(&self.source), self.batch_size) {
                    Ok(artifacts) => artifacts.into_iter().map(|a| a.mesh).collect(),
                    Err(e) => {
                        warn!("registry: could not build {:?}: {e}", handle);
                        continue;
                    }
                }
            };
            batch.dirty = false;
            batch.last_built_count = batch.instances.len();
            debug!("registry: built {:?} -> {} mesh(es)", handle, meshes.len());
            built.push((*handle, meshes));
        }
        built
    }

    /// Handles disposed since the last call.
    pub fn take_disposed(&mut self) -> Vec<RegistryHandle> {
        std::mem::take(&mut self.disposed)
    }
}

impl InstanceRegistry for BatchedMeshRegistry {
    fn register(&mut self, buffer: &InstanceBuffer) -> VoxelResult<RegistryHandle> {
        self.check_capacity(buffer)?;
        let handle = RegistryHandle(self.next_id);
        self.next_id += 1;
        self.batches.insert(
            handle,
            RegisteredBatch { instances: buffer.transforms().to_vec(), dirty: true, last_built_count: 0 },
        );
        info!("registry: registered {:?} with {} instances", handle, buffer.len());
        Ok(handle)
    }

    fn update(&mut self, handle: RegistryHandle, buffer: &InstanceBuffer) -> VoxelResult<()> {
        self.check_capacity(buffer)?;
        let batch = self
            .batches
            .get_mut(&handle)
            .ok_or_else(|| VoxelError::RegistrationFailure(format!("unknown handle {:?}", handle)))?;
        batch.instances = buffer.transforms().to_vec();
        batch.dirty = true;
        debug!("registry: updated {:?} with {} instances", handle, buffer.len());
        Ok(())
    }

    fn dispose(&mut self, handle: RegistryHandle) -> VoxelResult<()> {
        self.batches
            .remove(&handle)
            .ok_or_else(|| VoxelError::RegistrationFailure(format!("unknown handle {:?}", handle)))?;
        self.disposed.push(handle);
        info!("registry: disposed {:?}", handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instancing::combine::tests::unit_cube;

    fn buffer(n: usize) -> InstanceBuffer {
        InstanceBuffer::from_transforms((0..n).map(|i| Transform::from_xyz(i as f32, 0.0, 0.0)).collect())
    }

    #[test]
    fn register_build_update_dispose() {
        let mut reg = BatchedMeshRegistry::new(unit_cube(), 4).unwrap();
        let h = reg.register(&buffer(10)).unwrap();

        let built = reg.rebuild_dirty(8);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].0, h);
        assert_eq!(built[0].1.len(), 3);
        assert!(reg.rebuild_dirty(8).is_empty());

        reg.update(h, &buffer(2)).unwrap();
        let built = reg.rebuild_dirty(8);
        assert_eq!(built[0].1.len(), 1);
        assert_eq!(reg.get(h).unwrap().last_built_count, 2);

        reg.dispose(h).unwrap();
        assert!(!reg.contains(h));
        assert_eq!(reg.take_disposed(), vec![h]);
    }

    #[test]
    fn unknown_handle_and_over_capacity_fail() {
        let mut reg = BatchedMeshRegistry::new(unit_cube(), 4).unwrap().with_capacity_limit(5);
        assert!(matches!(reg.register(&buffer(6)), Err(VoxelError::RegistrationFailure(_))));
        let h = reg.register(&buffer(5)).unwrap();
        reg.dispose(h).unwrap();
        assert!(matches!(reg.update(h, &buffer(1)), Err(VoxelError::RegistrationFailure(_))));
        assert!(matches!(reg.dispose(h), Err(VoxelError::RegistrationFailure(_))));
    }

    #[test]
    fn rebuild_respects_budget() {
        let mut reg = BatchedMeshRegistry::new(unit_cube(), 4).unwrap();
        for _ in 0..3 {
            reg.register(&buffer(1)).unwrap();
        }
        assert_eq!(reg.rebuild_dirty(2).len(), 2);
        assert_eq!(reg.rebuild_dirty(2).len(), 1);
    }

    #[test]
    fn source_without_geometry_is_refused() {
        use bevy::render::render_asset::RenderAssetUsages;
        use bevy::render::render_resource::PrimitiveTopology;

        let empty = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        assert!(matches!(BatchedMeshRegistry::new(empty, 4), Err(VoxelError::RegistrationFailure(_))));
        assert!(matches!(BatchedMeshRegistry::new(unit_cube(), 0), Err(VoxelError::InvalidInput(_))));
    }
}
