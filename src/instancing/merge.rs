// src/instancing/merge.rs
//! Random merge rounds over the live object set.
//!
//! A round draws `count` distinct live objects at random (not spatially),
//! bakes the usable ones into one mesh and replaces them with a single
//! `MergedChunk`. Repeating rounds keeps collapsing the draw count.

use std::collections::HashSet;

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::combine::{combine_parts, transform_matrix};
use crate::error::{VoxelError, VoxelResult};
use crate::voxel::InstanceBuffer;

/// A single voxel drawn as its own object.
#[derive(Clone, Debug)]
pub struct VoxelObject {
    pub transform: Transform,
    pub mesh: Option<Handle<Mesh>>,
    pub material: Option<Handle<StandardMaterial>>,
    pub entity: Option<Entity>,
}

/// Combined geometry of several absorbed objects. Owns its mesh handle;
/// dropping the chunk releases the mesh.
#[derive(Clone, Debug)]
pub struct MergedChunk {
    pub mesh: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
    /// How many objects were folded into this chunk.
    pub source_count: usize,
    pub entity: Option<Entity>,
}

#[derive(Clone, Debug)]
pub enum LiveObject {
    Voxel(VoxelObject),
    Chunk(MergedChunk),
}

impl LiveObject {
    /// World transform of the geometry. Chunks are baked in world space.
    pub fn transform(&self) -> Transform {
        match self {
            LiveObject::Voxel(v) => v.transform,
            LiveObject::Chunk(_) => Transform::IDENTITY,
        }
    }

    pub fn mesh(&self) -> Option<&Handle<Mesh>> {
        match self {
            LiveObject::Voxel(v) => v.mesh.as_ref(),
            LiveObject::Chunk(c) => Some(&c.mesh),
        }
    }

    pub fn material(&self) -> Option<&Handle<StandardMaterial>> {
        match self {
            LiveObject::Voxel(v) => v.material.as_ref(),
            LiveObject::Chunk(c) => Some(&c.material),
        }
    }

    pub fn entity(&self) -> Option<Entity> {
        match self {
            LiveObject::Voxel(v) => v.entity,
            LiveObject::Chunk(c) => c.entity,
        }
    }

    pub fn set_entity(&mut self, entity: Entity) {
        match self {
            LiveObject::Voxel(v) => v.entity = Some(entity),
            LiveObject::Chunk(c) => c.entity = Some(entity),
        }
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, LiveObject::Chunk(_))
    }
}

/// Everything currently drawn as a separate object.
#[derive(Resource, Clone, Debug, Default)]
pub struct LiveSet {
    objects: Vec<LiveObject>,
}

impl LiveSet {
    /// One voxel object per buffer entry, all sharing `mesh` and `material`.
    pub fn from_buffer(
        buffer: &InstanceBuffer,
        mesh: &Handle<Mesh>,
        material: &Handle<StandardMaterial>,
    ) -> Self {
        let objects = buffer
            .iter()
            .map(|t| {
                LiveObject::Voxel(VoxelObject {
                    transform: *t,
                    mesh: Some(mesh.clone()),
                    material: Some(material.clone()),
                    entity: None,
                })
            })
            .collect();
        Self { objects }
    }

    #[inline]
    pub fn len(&self) -> usize { self.objects.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.objects.is_empty() }

    pub fn push(&mut self, object: LiveObject) {
        self.objects.push(object);
    }

    pub fn get(&self, index: usize) -> Option<&LiveObject> {
        self.objects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut LiveObject> {
        self.objects.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveObject> {
        self.objects.iter_mut()
    }

    /// Empty the set, handing back what was in it (for despawning).
    pub fn clear(&mut self) -> Vec<LiveObject> {
        std::mem::take(&mut self.objects)
    }

    pub fn chunk_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_chunk()).count()
    }
}

/// Result of a successful round.
#[derive(Debug)]
pub struct MergeOutcome {
    /// Indices drawn, in draw order (pre-merge indexing).
    pub selected: Vec<usize>,
    /// Objects baked into the chunk; their render entities should go.
    pub absorbed: Vec<LiveObject>,
    /// Drawn objects that could not be baked (no geometry or a different
    /// material). They leave the set too; their entities should go as well.
    pub dropped: Vec<LiveObject>,
    /// Where the new chunk now sits in the set.
    pub chunk_index: usize,
}

/// Draw `count` distinct indices in `0..len` by rejection.
/// Callers guarantee `count <= len`.
pub fn sample_distinct<R: Rng + ?Sized>(rng: &mut R, len: usize, count: usize) -> Vec<usize> {
    debug_assert!(count <= len);
    let mut seen = HashSet::with_capacity(count);
    let mut picked = Vec::with_capacity(count);
    while picked.len() < count {
        let i = rng.random_range(0..len);
        if seen.insert(i) {
            picked.push(i);
        }
    }
    picked
}

/// Merge `count` randomly drawn live objects into one chunk.
///
/// The first drawn object with geometry and a material fixes the shared
/// material; others with a different or missing material, or without a
/// loaded mesh, are not baked but still leave the set. Every drawn object
/// is removed, so the set shrinks by `count - 1`. On error the set is
/// untouched.
pub fn merge<R: Rng + ?Sized>(
    set: &mut LiveSet,
    count: usize,
    rng: &mut R,
    meshes: &mut Assets<Mesh>,
) -> VoxelResult<MergeOutcome> {
    let available = set.len();
    if available == 0 {
        return Err(VoxelError::EmptyInput);
    }
    if count == 0 || count > available {
        return Err(VoxelError::InsufficientInstances { requested: count, available });
    }

    let selected = sample_distinct(rng, available, count);

    let mut shared_material: Option<Handle<StandardMaterial>> = None;
    let mut taken: Vec<usize> = Vec::with_capacity(count);
    let merged = {
        let mut parts: Vec<(&Mesh, Mat4)> = Vec::with_capacity(count);
        for &i in &selected {
            let object = &set.objects[i];
            let Some(mesh) = object.mesh().and_then(|h| meshes.get(h)) else {
                debug!("merge: object {i} has no loaded mesh; dropping");
                continue;
            };
            let Some(material) = object.material() else {
                debug!("merge: object {i} has no material; dropping");
                continue;
            };
            match &shared_material {
                None => shared_material = Some(material.clone()),
                Some(shared) if shared != material => {
                    warn!("merge: object {i} uses a different material; dropping");
                    continue;
                }
                Some(_) => {}
            }
            parts.push((mesh, transform_matrix(&object.transform())));
            taken.push(i);
        }
        if parts.is_empty() {
            None
        } else {
            combine_parts(parts)
        }
    };

    let (Some(merged), Some(material)) = (merged, shared_material) else {
        return Err(VoxelError::NoGeometry);
    };

    let mesh = meshes.add(merged);
    let taken_set: HashSet<usize> = taken.iter().copied().collect();
    let selected_set: HashSet<usize> = selected.iter().copied().collect();
    let mut absorbed = Vec::with_capacity(taken.len());
    let mut dropped = Vec::with_capacity(selected.len() - taken.len());
    let mut kept = Vec::with_capacity(available - selected.len() + 1);
    for (i, object) in std::mem::take(&mut set.objects).into_iter().enumerate() {
        if taken_set.contains(&i) {
            absorbed.push(object);
        } else if selected_set.contains(&i) {
            dropped.push(object);
        } else {
            kept.push(object);
        }
    }
    set.objects = kept;
    set.objects.push(LiveObject::Chunk(MergedChunk {
        mesh,
        material,
        source_count: absorbed.len(),
        entity: None,
    }));

    if !dropped.is_empty() {
        warn!("merge: {} drawn object(s) could not be baked and were dropped", dropped.len());
    }
    info!(
        "merge: folded {} of {} drawn objects into one chunk; {} live objects remain",
        absorbed.len(),
        count,
        set.len()
    );

    Ok(MergeOutcome { selected, absorbed, dropped, chunk_index: set.len() - 1 })
}

/// Seeded merge driver so runs are reproducible.
#[derive(Resource, Clone, Debug)]
pub struct MergeOptimizer {
    rng: ChaCha8Rng,
}

impl MergeOptimizer {
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn merge(
        &mut self,
        set: &mut LiveSet,
        count: usize,
        meshes: &mut Assets<Mesh>,
    ) -> VoxelResult<MergeOutcome> {
        merge(set, count, &mut self.rng, meshes)
    }
}
