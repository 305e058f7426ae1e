use bevy::ecs::schedule::common_conditions::resource_changed;
use bevy::prelude::*;

use heightmap_voxels::config::ConfigSource;
use heightmap_voxels::terrain::VoxelUpdateSet;
use heightmap_voxels::voxel::InstanceBuffer;
use heightmap_voxels::VoxelTerrainPlugin;

mod input;
mod setup;

use input::{export_on_key, merge_on_key, regenerate_on_key};

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| ConfigSource::default().path);

    App::new()
        .add_plugins(DefaultPlugins)
        // settings path first so the plugin doesn't fall back to the default one
        .insert_resource(ConfigSource { path: config_path })
        .add_plugins(VoxelTerrainPlugin)
        .add_systems(Startup, setup::setup)
        .add_systems(
            Update,
            setup::frame_camera_on_terrain
                .run_if(resource_changed::<InstanceBuffer>)
                .after(VoxelUpdateSet),
        )
        // keys: M merge, E export, R regenerate
        .add_systems(
            Update,
            (merge_on_key, export_on_key, regenerate_on_key)
                .chain()
                .after(VoxelUpdateSet),
        )
        .run();
}
