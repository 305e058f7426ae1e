// src/instancing/combine.rs
//! CPU mesh combination: bake source meshes under world transforms into
//! one triangle list with 32-bit indices.

use bevy::prelude::*;
use bevy::render::mesh::{Indices, Mesh, VertexAttributeValues};
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::PrimitiveTopology;

#[inline]
pub fn transform_matrix(t: &Transform) -> Mat4 {
    Mat4::from_scale_rotation_translation(t.scale, t.rotation, t.translation)
}

fn positions_of(mesh: &Mesh) -> Option<&Vec<[f32; 3]>> {
    match mesh.attribute(Mesh::ATTRIBUTE_POSITION)? {
        VertexAttributeValues::Float32x3(v) => Some(v),
        _ => None,
    }
}

fn normals_of(mesh: &Mesh) -> Option<&Vec<[f32; 3]>> {
    match mesh.attribute(Mesh::ATTRIBUTE_NORMAL)? {
        VertexAttributeValues::Float32x3(v) => Some(v),
        _ => None,
    }
}

fn uvs_of(mesh: &Mesh) -> Option<&Vec<[f32; 2]>> {
    match mesh.attribute(Mesh::ATTRIBUTE_UV_0)? {
        VertexAttributeValues::Float32x2(v) => Some(v),
        _ => None,
    }
}

/// True when `mesh` can be fed to `combine_parts`.
pub fn is_combinable(mesh: &Mesh) -> bool {
    mesh.primitive_topology() == PrimitiveTopology::TriangleList && positions_of(mesh).is_some()
}

/// Combine `(mesh, world matrix)` pairs into one mesh.
///
/// Normals go through the inverse-transpose and are renormalized; normals
/// and UVs are only kept when every part has them. Unindexed sources are
/// read as plain triangle lists. `None` if there are no parts, a part is not
/// a float3-position triangle list, or the vertex count overflows `u32`.
pub fn combine_parts<'a>(parts: impl IntoIterator<Item = (&'a Mesh, Mat4)>) -> Option<Mesh> {
    let mut out_positions: Vec<[f32; 3]> = Vec::new();
    let mut out_normals: Vec<[f32; 3]> = Vec::new();
    let mut out_uvs: Vec<[f32; 2]> = Vec::new();
    let mut out_indices: Vec<u32> = Vec::new();
    let mut keep_normals = true;
    let mut keep_uvs = true;
    let mut part_count = 0usize;

    for (src, trs) in parts {
        if !is_combinable(src) {
            return None;
        }
        let positions = positions_of(src)?;
        let base = u32::try_from(out_positions.len()).ok()?;
        u32::try_from(out_positions.len() + positions.len()).ok()?;

        out_positions.extend(positions.iter().map(|p| trs.transform_point3(Vec3::from_array(*p)).to_array()));

        match normals_of(src) {
            Some(normals) if keep_normals => {
                let linear = Mat3::from_mat4(trs);
                let normal_mat = if linear.determinant().abs() > f32::EPSILON {
                    linear.inverse().transpose()
                } else {
                    linear
                };
                out_normals.extend(
                    normals.iter().map(|n| (normal_mat * Vec3::from_array(*n)).normalize_or_zero().to_array()),
                );
            }
            _ => keep_normals = false,
        }

        match uvs_of(src) {
            Some(uvs) if keep_uvs => out_uvs.extend_from_slice(uvs),
            _ => keep_uvs = false,
        }

        match src.indices() {
            Some(Indices::U32(ix)) => out_indices.extend(ix.iter().map(|&i| i + base)),
            Some(Indices::U16(ix)) => out_indices.extend(ix.iter().map(|&i| i as u32 + base)),
            None => out_indices.extend((0..positions.len() as u32).map(|i| i + base)),
        }
        part_count += 1;
    }

    if part_count == 0 {
        return None;
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, out_positions);
    if keep_normals {
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, out_normals);
    }
    if keep_uvs {
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, out_uvs);
    }
    mesh.insert_indices(Indices::U32(out_indices));
    Some(mesh)
}

/// One shared source mesh stamped at every transform.
pub fn combine_instances(src: &Mesh, instances: &[Transform]) -> Option<Mesh> {
    combine_parts(instances.iter().map(|t| (src, transform_matrix(t))))
}
