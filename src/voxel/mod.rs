//! Height field -> voxel instances, sequentially or on the compute pool.

pub mod buffer;
pub mod column;
pub mod spawner;

pub use buffer::{CommitBuffer, InstanceBuffer};
pub use column::{expand, expand_all, expand_into, VoxelColumn, VoxelInstance};
pub use spawner::{GenerationRequest, ParallelSpawner};
