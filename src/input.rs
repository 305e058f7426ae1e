use bevy::input::{keyboard::KeyCode, ButtonInput};
use bevy::prelude::*;

use heightmap_voxels::config::{ActiveConfig, ConfigSource};
use heightmap_voxels::instancing::{export, LiveSet, MergeOptimizer};
use heightmap_voxels::terrain::systems::{despawn_live_objects, install_config, read_config, spawn_live_object};
use heightmap_voxels::terrain::{ExportedArtifacts, GenerationTasks, MergeRound, VoxelAssets};
use heightmap_voxels::voxel::InstanceBuffer;

pub const MERGE_KEY: KeyCode = KeyCode::KeyM;
pub const EXPORT_KEY: KeyCode = KeyCode::KeyE;
pub const REGENERATE_KEY: KeyCode = KeyCode::KeyR;

/// M: merge one random round, then double the round size.
pub fn merge_on_key(
    keys: Res<ButtonInput<KeyCode>>,
    mut commands: Commands,
    mut live: ResMut<LiveSet>,
    mut optimizer: ResMut<MergeOptimizer>,
    mut round: ResMut<MergeRound>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    if !keys.just_pressed(MERGE_KEY) {
        return;
    }
    if live.is_empty() {
        info!("Merge: nothing to merge; live objects exist only on the Individual render path");
        return;
    }

    let count = round.size.min(live.len());
    match optimizer.merge(&mut live, count, &mut meshes) {
        Ok(outcome) => {
            despawn_live_objects(&mut commands, outcome.absorbed.into_iter().chain(outcome.dropped));
            if let Some(chunk) = live.get_mut(outcome.chunk_index) {
                spawn_live_object(&mut commands, chunk);
            }
            round.size = round.size.saturating_mul(2);
            info!("Merge: next round will take {}", round.size);
        }
        Err(e) => warn!("Merge: round of {count} failed: {e}"),
    }
}

/// E: bake the current buffer into export-sized meshes.
pub fn export_on_key(
    keys: Res<ButtonInput<KeyCode>>,
    buffer: Res<InstanceBuffer>,
    config: Res<ActiveConfig>,
    assets: Option<Res<VoxelAssets>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut exported: ResMut<ExportedArtifacts>,
) {
    if !keys.just_pressed(EXPORT_KEY) {
        return;
    }
    let Some(assets) = assets else { return };

    let result = export(buffer.transforms(), meshes.get(&assets.cube), config.0.export_chunk_size);
    match result {
        Ok(artifacts) => {
            exported.meshes = artifacts.into_iter().map(|a| meshes.add(a.mesh)).collect();
            info!("Export: {} mesh artifact(s) ready", exported.meshes.len());
        }
        Err(e) => warn!("Export failed: {e}"),
    }
}

/// R: re-read settings and start a fresh request.
pub fn regenerate_on_key(
    keys: Res<ButtonInput<KeyCode>>,
    mut commands: Commands,
    source: Res<ConfigSource>,
    asset_server: Res<AssetServer>,
    assets: Option<ResMut<VoxelAssets>>,
    mut tasks: ResMut<GenerationTasks>,
) {
    if !keys.just_pressed(REGENERATE_KEY) {
        return;
    }
    let cfg = install_config(&mut commands, read_config(&source));
    if let Some(mut assets) = assets {
        assets.heightmap = asset_server.load(cfg.heightmap.clone());
    }
    let id = tasks.request();
    info!("Regenerate: request {}", id);
}
