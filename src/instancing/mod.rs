//! CPU instancing (mesh merging).
//! Bakes a shared source mesh under many transforms into combined meshes,
//! which cuts draw calls while staying compatible with StandardMaterial.
//! Used three ways: random merge rounds over live objects, chunked export,
//! and a registry that draws a whole instance buffer as a few meshes.

pub mod combine;
pub mod export;
pub mod merge;
pub mod registry;

pub use combine::{combine_instances, combine_parts};
pub use export::{export, ChunkedExporter, MeshArtifact};
pub use merge::{merge, LiveObject, LiveSet, MergeOptimizer, MergeOutcome, MergedChunk, VoxelObject};
pub use registry::{BatchedMeshRegistry, InstanceRegistry, RegistryHandle};
