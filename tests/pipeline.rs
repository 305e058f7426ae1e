use std::collections::HashSet;
use std::sync::Arc;

use bevy::prelude::*;
use image::{GrayImage, Luma};

use heightmap_voxels::instancing::{export, LiveSet, MergeOptimizer};
use heightmap_voxels::voxel::{expand_all, GenerationRequest, ParallelSpawner};
use heightmap_voxels::{GenerationConfig, HeightField, SamplingMode, VoxelError};

fn flat_config() -> GenerationConfig {
    GenerationConfig { height_multiplier: 10.0, ..Default::default() }
}

fn key(t: &Transform) -> (i32, i32, i32) {
    (t.translation.x as i32, t.translation.y as i32, t.translation.z as i32)
}

#[test]
fn flat_image_to_voxels_to_merge_to_export() {
    // 2x2, mid gray -> 5 voxels per column
    let img = GrayImage::from_pixel(2, 2, Luma([128]));
    let field = HeightField::build(&img, SamplingMode::Exact, 1).unwrap();
    assert_eq!((field.width(), field.depth()), (2, 2));

    let cfg = flat_config();
    let buffer = ParallelSpawner::new(1).spawn(&field, &cfg);
    assert_eq!(buffer.len(), 20);

    let positions: HashSet<_> = buffer.iter().map(key).collect();
    assert_eq!(positions.len(), 20, "no duplicate voxels");
    for x in 0..2 {
        for z in 0..2 {
            for y in 0..5 {
                assert!(positions.contains(&(x, y, z)), "missing ({x},{y},{z})");
            }
        }
    }

    let mut meshes = Assets::<Mesh>::default();
    let mut materials = Assets::<StandardMaterial>::default();
    let cube = meshes.add(Mesh::from(Cuboid::new(1.0, 1.0, 1.0)));
    let material = materials.add(StandardMaterial::default());

    let mut live = LiveSet::from_buffer(&buffer, &cube, &material);
    let mut optimizer = MergeOptimizer::from_seed(cfg.seed);
    let outcome = optimizer.merge(&mut live, 3, &mut meshes).unwrap();
    assert_eq!(outcome.absorbed.len(), 3);
    assert_eq!(live.len(), 18);
    assert_eq!(live.chunk_count(), 1);

    let artifacts = export(buffer.transforms(), meshes.get(&cube), 8).unwrap();
    let sizes: Vec<usize> = artifacts.iter().map(|a| a.instance_count()).collect();
    assert_eq!(sizes, vec![8, 8, 4]);
}

#[test]
fn parallel_and_sequential_agree_on_bilinear_field() {
    let img = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 13 + y * 7) % 256) as u8]));
    let field = HeightField::build(&img, SamplingMode::Bilinear, 9).unwrap();
    assert_eq!((field.width(), field.depth()), (9, 9));

    let cfg = GenerationConfig { underground_cutoff: 2, flip_z: true, ..flat_config() };

    let mut sequential: Vec<_> = expand_all(&field, &cfg).iter().map(|v| key(&v.transform())).collect();
    let mut parallel: Vec<_> = ParallelSpawner::new(4).spawn(&field, &cfg).iter().map(key).collect();
    sequential.sort_unstable();
    parallel.sort_unstable();
    assert_eq!(sequential, parallel);
}

#[test]
fn request_generates_once() {
    let img = GrayImage::from_pixel(3, 3, Luma([255]));
    let field = Arc::new(HeightField::build(&img, SamplingMode::Exact, 1).unwrap());
    let cfg = Arc::new(GenerationConfig { height_multiplier: 2.0, ..Default::default() });

    let spawner = ParallelSpawner::from_config(&cfg);
    let mut request = GenerationRequest::new(7, field, cfg);
    let first = spawner.spawn_request(&mut request).expect("first run produces a buffer");
    assert_eq!(first.len(), 9 * 2);
    assert!(request.is_generated());
    assert!(spawner.spawn_request(&mut request).is_none());
}

#[test]
fn oversized_merge_leaves_set_alone() {
    let img = GrayImage::from_pixel(1, 1, Luma([255]));
    let field = HeightField::build(&img, SamplingMode::Exact, 1).unwrap();
    let buffer = ParallelSpawner::new(8).spawn(&field, &GenerationConfig { height_multiplier: 3.0, ..Default::default() });

    let mut meshes = Assets::<Mesh>::default();
    let mut materials = Assets::<StandardMaterial>::default();
    let cube = meshes.add(Mesh::from(Cuboid::new(1.0, 1.0, 1.0)));
    let material = materials.add(StandardMaterial::default());
    let mut live = LiveSet::from_buffer(&buffer, &cube, &material);

    let err = MergeOptimizer::from_seed(1).merge(&mut live, 4, &mut meshes).unwrap_err();
    assert_eq!(err, VoxelError::InsufficientInstances { requested: 4, available: 3 });
    assert_eq!(live.len(), 3);
    assert_eq!(live.chunk_count(), 0);
}
