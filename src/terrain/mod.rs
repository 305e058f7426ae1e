pub mod components;
pub mod plugin;
pub mod resources;
pub mod systems;

pub use plugin::{VoxelStartupSet, VoxelTerrainPlugin, VoxelUpdateSet};
pub use resources::{ExportedArtifacts, GenerationTasks, MergeRound, VoxelAssets};
