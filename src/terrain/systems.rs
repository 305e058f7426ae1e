// src/terrain/systems.rs

use std::sync::Arc;

use bevy::asset::LoadState;
use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use futures_lite::future;

use super::components::{LiveVoxel, MergedChunkTag, VoxelBatch, VoxelTerrain};
use super::resources::{
    GenerationOutput, GenerationTasks, MergeRound, RegistryEntities, VoxelAssets, VoxelRenderConfig,
};
use crate::config::{ActiveConfig, ConfigSource, GenerationConfig, RenderPath};
use crate::height_field::HeightField;
use crate::instancing::{BatchedMeshRegistry, InstanceRegistry, LiveObject, LiveSet, MergeOptimizer};
use crate::voxel::{GenerationRequest, InstanceBuffer, ParallelSpawner};

/// Read the RON settings; fall back to defaults when missing or invalid.
pub fn read_config(source: &ConfigSource) -> GenerationConfig {
    match GenerationConfig::load(&source.path) {
        Ok(cfg) => {
            info!("Voxel terrain: loaded settings from '{}'", source.path);
            cfg
        }
        Err(e) => {
            warn!("Voxel terrain: {} ({}); using defaults", e, source.path);
            GenerationConfig::default()
        }
    }
}

/// Install a new config snapshot and the state derived from it.
pub fn install_config(commands: &mut Commands, cfg: GenerationConfig) -> Arc<GenerationConfig> {
    let cfg = Arc::new(cfg);
    commands.insert_resource(ActiveConfig(cfg.clone()));
    commands.insert_resource(MergeOptimizer::from_seed(cfg.seed));
    commands.insert_resource(MergeRound { size: cfg.merge_batch_size.max(1) });
    cfg
}

/// Startup: settings snapshot.
pub fn load_generation_config(mut commands: Commands, source: Res<ConfigSource>) {
    let cfg = read_config(&source);
    install_config(&mut commands, cfg);
}

/// Startup: shared cube + material, the heightmap image, the CPU registry,
/// and the first generation request.
pub fn setup_voxel_assets(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut tasks: ResMut<GenerationTasks>,
    config: Res<ActiveConfig>,
) {
    let cube = Mesh::from(Cuboid::new(1.0, 1.0, 1.0));
    match BatchedMeshRegistry::new(cube.clone(), config.0.export_chunk_size) {
        Ok(registry) => commands.insert_resource(registry),
        Err(e) => warn!("Voxel terrain: instanced path unavailable: {e}"),
    }

    let material = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.55, 0.62, 0.48),
        perceptual_roughness: 0.95,
        metallic: 0.0,
        ..default()
    });

    let heightmap: Handle<Image> = asset_server.load(config.0.heightmap.clone());
    commands.insert_resource(VoxelAssets { cube: meshes.add(cube), material, heightmap });

    let id = tasks.request();
    info!("Voxel terrain: loading '{}' for request {}", config.0.heightmap, id);
}

/// Once the heightmap is in memory, run the newest request on the async
/// compute pool. A request still running is detached, not cancelled.
pub fn schedule_generation(
    mut tasks: ResMut<GenerationTasks>,
    config: Res<ActiveConfig>,
    assets: Option<Res<VoxelAssets>>,
    images: Res<Assets<Image>>,
    asset_server: Res<AssetServer>,
) {
    let Some(id) = tasks.wanted else { return };
    let Some(assets) = assets else { return };

    if matches!(asset_server.get_load_state(&assets.heightmap), Some(LoadState::Failed(_))) {
        warn!("Voxel terrain: heightmap '{}' failed to load; request {} dropped", config.0.heightmap, id);
        tasks.wanted = None;
        return;
    }
    let Some(image) = images.get(&assets.heightmap) else { return };

    tasks.wanted = None;
    if let Some((old, task)) = tasks.in_flight.take() {
        debug!("Voxel terrain: request {} superseded by {}", old, id);
        task.detach();
    }

    let image = image.clone();
    let config = config.0.clone();
    let task = AsyncComputeTaskPool::get().spawn(async move {
        let result = HeightField::build(&image, config.sampling, config.resolution).map(|field| {
            let mut request = GenerationRequest::new(id, Arc::new(field), config.clone());
            ParallelSpawner::from_config(&config)
                .spawn_request(&mut request)
                .unwrap_or_default()
        });
        GenerationOutput { id, result }
    });
    tasks.in_flight = Some((id, task));
}

/// Install a finished buffer. Stale or failed results leave the current
/// terrain as it is.
pub fn receive_generation(mut commands: Commands, mut tasks: ResMut<GenerationTasks>) {
    let finished = matches!(&tasks.in_flight, Some((_, task)) if task.is_finished());
    if !finished {
        return;
    }
    let Some((_, mut task)) = tasks.in_flight.take() else { return };
    let Some(output) = future::block_on(future::poll_once(&mut task)) else { return };

    if tasks.latest() != Some(output.id) {
        debug!("Voxel terrain: discarding stale result of request {}", output.id);
        return;
    }
    match output.result {
        Ok(buffer) => {
            info!("Voxel terrain: request {} ready with {} instances", output.id, buffer.len());
            commands.insert_resource(buffer);
        }
        Err(e) => warn!("Voxel terrain: request {} failed: {e}; keeping previous terrain", output.id),
    }
}

/// Spawn the render entity for one live object and remember it.
pub fn spawn_live_object(commands: &mut Commands, object: &mut LiveObject) -> Option<Entity> {
    let (mesh, material) = (object.mesh()?.clone(), object.material()?.clone());
    let entity = match object {
        LiveObject::Voxel(v) => commands
            .spawn((VoxelTerrain, LiveVoxel, v.transform, Mesh3d(mesh), MeshMaterial3d(material)))
            .id(),
        LiveObject::Chunk(c) => commands
            .spawn((
                VoxelTerrain,
                MergedChunkTag { source_count: c.source_count },
                Transform::IDENTITY,
                Mesh3d(mesh),
                MeshMaterial3d(material),
                Name::new(format!("Merged chunk ({} voxels)", c.source_count)),
            ))
            .id(),
    };
    object.set_entity(entity);
    Some(entity)
}

pub fn despawn_live_objects(commands: &mut Commands, objects: impl IntoIterator<Item = LiveObject>) {
    for object in objects {
        if let Some(e) = object.entity() {
            commands.entity(e).despawn();
        }
    }
}

/// Push a new buffer to whichever render path the config selects, tearing
/// down the other one.
pub fn apply_render_path(
    mut commands: Commands,
    buffer: Res<InstanceBuffer>,
    config: Res<ActiveConfig>,
    assets: Option<Res<VoxelAssets>>,
    mut registry: Option<ResMut<BatchedMeshRegistry>>,
    mut entities: ResMut<RegistryEntities>,
    mut live: ResMut<LiveSet>,
) {
    let Some(assets) = assets else { return };

    match config.0.render_path {
        RenderPath::Instanced => {
            despawn_live_objects(&mut commands, live.clear());
            let Some(registry) = registry.as_mut() else {
                warn!("Voxel terrain: no instance registry; nothing drawn");
                return;
            };
            let result = match entities.current {
                Some(handle) => registry.update(handle, &buffer).map(|_| handle),
                None => registry.register(&buffer),
            };
            match result {
                Ok(handle) => entities.current = Some(handle),
                Err(e) => warn!("Voxel terrain: {e}"),
            }
        }
        RenderPath::Individual => {
            if let (Some(registry), Some(handle)) = (registry.as_mut(), entities.current.take()) {
                if let Err(e) = registry.dispose(handle) {
                    warn!("Voxel terrain: {e}");
                }
            }
            despawn_live_objects(&mut commands, live.clear());
            *live = LiveSet::from_buffer(&buffer, &assets.cube, &assets.material);
            for object in live.iter_mut() {
                spawn_live_object(&mut commands, object);
            }
            info!("Voxel terrain: spawned {} individual voxels", live.len());
        }
    }
}

/// Rebuild dirty registry batches within the frame budget and swap their
/// entities; despawn entities of disposed handles.
pub fn rebuild_registry_batches(
    mut commands: Commands,
    registry: Option<ResMut<BatchedMeshRegistry>>,
    mut entities: ResMut<RegistryEntities>,
    mut meshes: ResMut<Assets<Mesh>>,
    assets: Option<Res<VoxelAssets>>,
    cfg: Res<VoxelRenderConfig>,
) {
    let (Some(mut registry), Some(assets)) = (registry, assets) else { return };

    for handle in registry.take_disposed() {
        for e in entities.by_handle.remove(&handle).unwrap_or_default() {
            commands.entity(e).despawn();
        }
    }

    for (handle, built) in registry.rebuild_dirty(cfg.max_rebuilds_per_frame) {
        for e in entities.by_handle.remove(&handle).unwrap_or_default() {
            commands.entity(e).despawn();
        }
        let spawned: Vec<Entity> = built
            .into_iter()
            .enumerate()
            .map(|(index, mesh)| {
                commands
                    .spawn((
                        VoxelTerrain,
                        VoxelBatch { handle, index },
                        Transform::default(),
                        Mesh3d(meshes.add(mesh)),
                        MeshMaterial3d(assets.material.clone()),
                        Name::new(format!("Voxel batch {:?} / {}", handle, index)),
                    ))
                    .id()
            })
            .collect();
        debug!("Voxel terrain: {:?} drawn with {} batch entities", handle, spawned.len());
        entities.by_handle.insert(handle, spawned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoxelError;
    use bevy::render::render_asset::RenderAssetUsages;
    use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
    use bevy::tasks::{Task, TaskPool};

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Image>()
            .init_resource::<GenerationTasks>()
            .init_resource::<InstanceBuffer>()
            .insert_resource(ActiveConfig(Arc::new(GenerationConfig::default())))
            .add_systems(Update, (schedule_generation, receive_generation).chain());
        app
    }

    fn row(n: usize) -> InstanceBuffer {
        InstanceBuffer::from_transforms((0..n).map(|i| Transform::from_xyz(i as f32, 0.0, 0.0)).collect())
    }

    /// A task that has already produced `output`.
    fn finished(output: GenerationOutput) -> Task<GenerationOutput> {
        let task = AsyncComputeTaskPool::get_or_init(TaskPool::default).spawn(async move { output });
        while !task.is_finished() {
            std::thread::yield_now();
        }
        task
    }

    fn tasks(app: &mut App) -> Mut<'_, GenerationTasks> {
        app.world_mut().resource_mut::<GenerationTasks>()
    }

    #[test]
    fn newest_result_is_installed() {
        let mut app = app();
        let id = tasks(&mut app).request();
        tasks(&mut app).in_flight = Some((id, finished(GenerationOutput { id, result: Ok(row(5)) })));

        app.update();
        assert_eq!(app.world().resource::<InstanceBuffer>().len(), 5);
        assert!(tasks(&mut app).in_flight.is_none());
    }

    #[test]
    fn superseded_result_is_discarded() {
        let mut app = app();
        let old = tasks(&mut app).request();
        let _newer = tasks(&mut app).request();
        tasks(&mut app).in_flight = Some((old, finished(GenerationOutput { id: old, result: Ok(row(7)) })));

        // no VoxelAssets, so the newer request can't start; only receipt runs
        app.update();
        assert!(app.world().resource::<InstanceBuffer>().is_empty());
        assert!(tasks(&mut app).in_flight.is_none());
    }

    #[test]
    fn failed_generation_keeps_previous_terrain() {
        let mut app = app();
        app.insert_resource(row(3));
        let id = tasks(&mut app).request();
        tasks(&mut app).wanted = None;
        let output = GenerationOutput { id, result: Err(VoxelError::NoGeometry) };
        tasks(&mut app).in_flight = Some((id, finished(output)));

        app.update();
        assert_eq!(app.world().resource::<InstanceBuffer>().len(), 3);
        assert!(tasks(&mut app).in_flight.is_none());
    }

    #[test]
    fn new_request_detaches_running_task_and_wins() {
        let mut app = app();
        // 2x2 mid gray -> 5 voxels per column at the default multiplier
        let image = Image::new_fill(
            Extent3d { width: 2, height: 2, depth_or_array_layers: 1 },
            TextureDimension::D2,
            &[128, 128, 128, 255],
            TextureFormat::Rgba8UnormSrgb,
            RenderAssetUsages::default(),
        );
        let heightmap = app.world_mut().resource_mut::<Assets<Image>>().add(image);
        app.insert_resource(VoxelAssets { cube: Handle::default(), material: Handle::default(), heightmap });

        let stuck = tasks(&mut app).request();
        let never = AsyncComputeTaskPool::get_or_init(TaskPool::default)
            .spawn(future::pending::<GenerationOutput>());
        tasks(&mut app).in_flight = Some((stuck, never));
        let newest = tasks(&mut app).request();

        app.update();
        // the stuck task is gone; what's in flight (if not already received) is the newest
        assert!(tasks(&mut app).wanted.is_none());
        if let Some((id, _)) = tasks(&mut app).in_flight.as_ref() {
            assert_eq!(*id, newest);
        }

        for _ in 0..2000 {
            if !app.world().resource::<InstanceBuffer>().is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
            app.update();
        }
        assert_eq!(app.world().resource::<InstanceBuffer>().len(), 20);
    }
}
