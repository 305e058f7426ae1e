use bevy::ecs::schedule::common_conditions::resource_changed;
use bevy::prelude::*;

use super::resources::{ExportedArtifacts, GenerationTasks, RegistryEntities, VoxelRenderConfig};
use super::systems::{
    apply_render_path, load_generation_config, rebuild_registry_batches, receive_generation,
    schedule_generation, setup_voxel_assets,
};
use crate::config::ConfigSource;
use crate::instancing::LiveSet;
use crate::voxel::InstanceBuffer;

/// Startup ordering so assets see the loaded settings.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum VoxelStartupSet {
    Config,
    Assets,
}

/// Per-frame ordering of the generation pipeline.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct VoxelUpdateSet;

pub struct VoxelTerrainPlugin;

impl Plugin for VoxelTerrainPlugin {
    fn build(&self, app: &mut App) {
        app
            // --- Startup ordering ---
            .configure_sets(
                Startup,
                (VoxelStartupSet::Config, VoxelStartupSet::Assets.after(VoxelStartupSet::Config)),
            )
            .init_resource::<ConfigSource>()
            .init_resource::<GenerationTasks>()
            .init_resource::<InstanceBuffer>()
            .init_resource::<LiveSet>()
            .init_resource::<RegistryEntities>()
            .init_resource::<VoxelRenderConfig>()
            .init_resource::<ExportedArtifacts>()
            .add_systems(Startup, load_generation_config.in_set(VoxelStartupSet::Config))
            .add_systems(Startup, setup_voxel_assets.in_set(VoxelStartupSet::Assets))
            // On Update:
            // 1. start pending requests, 2. collect finished ones,
            // 3. hand new buffers to the render path, 4. rebuild batches
            .add_systems(
                Update,
                (
                    schedule_generation,
                    receive_generation,
                    apply_render_path.run_if(resource_changed::<InstanceBuffer>),
                    rebuild_registry_batches,
                )
                    .chain()
                    .in_set(VoxelUpdateSet),
            );
    }
}
