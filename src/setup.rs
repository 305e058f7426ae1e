use bevy::prelude::*;

use heightmap_voxels::voxel::InstanceBuffer;

#[derive(Component)]
pub struct MainCamera;

pub fn setup(mut commands: Commands) {
    // 1) Light
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // 2) Camera
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(-2.5, 4.5, 9.0).looking_at(Vec3::ZERO, Vec3::Y),
        MainCamera,
    ));
}

/// Point the camera at the terrain whenever a new buffer lands.
pub fn frame_camera_on_terrain(
    buffer: Res<InstanceBuffer>,
    mut cam_q: Query<&mut Transform, With<MainCamera>>,
) {
    if buffer.is_empty() {
        return;
    }
    let Ok(mut tf) = cam_q.single_mut() else { return };

    let (min, max) = buffer.iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(lo, hi), t| (lo.min(t.translation), hi.max(t.translation)),
    );
    let center = (min + max) * 0.5;
    let radius = (max - min).length().max(4.0);

    *tf = Transform::from_translation(center + Vec3::new(-0.6, 0.8, 1.0) * radius)
        .looking_at(center, Vec3::Y);
}
