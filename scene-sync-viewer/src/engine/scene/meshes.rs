//! Mesh construction for scene node payloads. All geometry is in the node's
//! local wire frame; the scene root converts to world space.
use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};

use crate::protocol::messages::{GridProps, MeshProps, PointCloudProps, SkinnedMeshProps};
use crate::sync::staging::BonePose;

/// Faces referencing a missing vertex are dropped.
fn valid_indices(faces: &[[u32; 3]], vertex_count: usize) -> Vec<u32> {
    let valid: Vec<u32> = faces
        .iter()
        .filter(|face| face.iter().all(|&i| (i as usize) < vertex_count))
        .flatten()
        .copied()
        .collect();

    if valid.len() != faces.len() * 3 {
        warn!(
            "Dropped {} faces with out-of-range vertex indices",
            faces.len() - valid.len() / 3
        );
    }
    valid
}

fn triangle_mesh(vertices: &[[f32; 3]], faces: &[[u32; 3]]) -> Mesh {
    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vertices.to_vec());
    mesh.insert_indices(Indices::U32(valid_indices(faces, vertices.len())));
    if !vertices.is_empty() {
        mesh.compute_normals();
    }
    mesh
}

pub fn create_triangle_mesh(props: &MeshProps) -> Mesh {
    triangle_mesh(&props.vertices, &props.faces)
}

/// Triangle mesh with joint attributes. Returns `false` alongside the mesh when
/// the skin data does not fit the skeleton and the mesh is left unskinned.
pub fn create_skinned_mesh(props: &SkinnedMeshProps) -> (Mesh, bool) {
    let mut mesh = triangle_mesh(&props.vertices, &props.faces);

    let bone_count = props.bone_wxyzs.len();
    let skin_fits = !props.skin_indices.is_empty()
        && props.skin_indices.len() == props.vertices.len()
        && props.skin_weights.len() == props.vertices.len()
        && props
            .skin_indices
            .iter()
            .flatten()
            .all(|&bone| (bone as usize) < bone_count);

    if !skin_fits {
        if !props.skin_indices.is_empty() {
            warn!("Skin data does not match the skeleton, rendering the bind pose");
        }
        return (mesh, false);
    }

    mesh.insert_attribute(
        Mesh::ATTRIBUTE_JOINT_INDEX,
        VertexAttributeValues::Uint16x4(props.skin_indices.clone()),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_JOINT_WEIGHT, props.skin_weights.clone());
    (mesh, true)
}

/// Inverse bind matrices from the bind pose bones.
pub fn inverse_bindposes(poses: &[BonePose]) -> Vec<Mat4> {
    poses
        .iter()
        .map(|bone| Mat4::from_rotation_translation(bone.orientation, bone.position).inverse())
        .collect()
}

pub fn create_point_cloud_mesh(props: &PointCloudProps) -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::PointList, RenderAssetUsages::RENDER_WORLD);
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, props.points.clone());

    if props.colors.len() == props.points.len() {
        let colours: Vec<[f32; 4]> = props
            .colors
            .iter()
            .map(|[r, g, b]| Color::srgb_u8(*r, *g, *b).to_linear().to_f32_array())
            .collect();
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colours);
    }

    mesh
}

/// Grid lines in the local XY plane, centred on the origin.
pub fn create_grid_mesh(props: &GridProps) -> Mesh {
    let cell = props.cell_size.max(f32::EPSILON);
    let columns = (props.width / cell).round().max(1.0) as u32;
    let rows = (props.height / cell).round().max(1.0) as u32;
    let (half_w, half_h) = (props.width * 0.5, props.height * 0.5);

    let mut vertices = Vec::with_capacity(((columns + rows + 2) * 2) as usize);
    for i in 0..=columns {
        let x = -half_w + props.width * i as f32 / columns as f32;
        vertices.push([x, -half_h, 0.0]);
        vertices.push([x, half_h, 0.0]);
    }
    for j in 0..=rows {
        let y = -half_h + props.height * j as f32 / rows as f32;
        vertices.push([-half_w, y, 0.0]);
        vertices.push([half_w, y, 0.0]);
    }

    let mut mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::RENDER_WORLD);
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vertices);
    mesh
}
