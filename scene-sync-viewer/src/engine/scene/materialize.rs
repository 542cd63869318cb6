use bevy::ecs::system::SystemParam;
use bevy::pbr::wireframe::Wireframe;
use bevy::prelude::*;
use bevy::render::mesh::skinning::{SkinnedMesh, SkinnedMeshInverseBindposes};
use std::collections::HashMap;

use super::meshes::{
    create_grid_mesh, create_point_cloud_mesh, create_skinned_mesh, create_triangle_mesh,
    inverse_bindposes,
};
use crate::sync::scene_store::{NodeKind, SceneNode, parent_path};
use crate::sync::staging::SkinnedMeshState;
use crate::sync::state::ViewerState;
use constants::coordinate_system::wire_to_world_rotation;
use constants::render_settings::{OVERLAY_FONT_SIZE, OVERLAY_TEXT_COLOUR};
use constants::sync::ROOT_PATH;

/// Converts the Z-up wire frame into the Y-up world. Parent of the root anchor.
#[derive(Component)]
pub struct SceneWorldRoot;

/// Persistent entity for a scene path. It outlives replacements of the node,
/// so children stay attached while their parent's object is rebuilt.
#[derive(Component, Debug)]
pub struct SceneNodeAnchor {
    pub path: String,
}

/// The rendered object of a node. Rebuilt whenever the node's generation moves.
#[derive(Component, Debug)]
pub struct NodeVisual {
    pub path: String,
    pub generation: u64,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct FrameAxes {
    pub length: f32,
}

/// Screen-space text following a node's visual.
#[derive(Component, Debug)]
pub struct SceneLabel {
    pub target: Entity,
}

#[derive(Debug)]
struct BuiltVisual {
    generation: u64,
    entity: Entity,
    joints: Vec<Entity>,
    /// Entities outside the anchor hierarchy (label text).
    detached: Option<Entity>,
}

/// Path → entity bookkeeping for the materialised scene.
#[derive(Resource, Default, Debug)]
pub struct SceneEntities {
    world: Option<Entity>,
    anchors: HashMap<String, Entity>,
    visuals: HashMap<String, BuiltVisual>,
}

impl SceneEntities {
    pub fn anchor(&self, path: &str) -> Option<Entity> {
        self.anchors.get(path).copied()
    }

    pub fn visual(&self, path: &str) -> Option<Entity> {
        self.visuals.get(path).map(|v| v.entity)
    }

    pub fn built_generation(&self, path: &str) -> Option<u64> {
        self.visuals.get(path).map(|v| v.generation)
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    fn forget(&mut self, path: &str, commands: &mut Commands) {
        if let Some(anchor) = self.anchors.remove(path) {
            commands.entity(anchor).try_despawn();
        }
        if let Some(visual) = self.visuals.remove(path) {
            despawn_visual(visual, commands);
        }
    }
}

fn despawn_visual(visual: BuiltVisual, commands: &mut Commands) {
    commands.entity(visual.entity).try_despawn();
    if let Some(detached) = visual.detached {
        commands.entity(detached).try_despawn();
    }
}

/// Asset stores, absent when running without the render plugins.
#[derive(SystemParam)]
pub struct VisualAssets<'w> {
    meshes: Option<ResMut<'w, Assets<Mesh>>>,
    materials: Option<ResMut<'w, Assets<StandardMaterial>>>,
    bindposes: Option<ResMut<'w, Assets<SkinnedMeshInverseBindposes>>>,
}

impl VisualAssets<'_> {
    fn add(
        &mut self,
        mesh: Mesh,
        material: StandardMaterial,
    ) -> Option<(Mesh3d, MeshMaterial3d<StandardMaterial>)> {
        let meshes = self.meshes.as_mut()?;
        let materials = self.materials.as_mut()?;
        Some((
            Mesh3d(meshes.add(mesh)),
            MeshMaterial3d(materials.add(material)),
        ))
    }
}

fn solid_material(color: [u8; 3], opacity: Option<f32>) -> StandardMaterial {
    let alpha = opacity.unwrap_or(1.0).clamp(0.0, 1.0);
    StandardMaterial {
        base_color: Color::srgb_u8(color[0], color[1], color[2]).with_alpha(alpha),
        alpha_mode: if alpha < 1.0 {
            AlphaMode::Blend
        } else {
            AlphaMode::Opaque
        },
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

fn unlit_material(base_color: Color) -> StandardMaterial {
    StandardMaterial {
        base_color,
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    }
}

/// Bring entities in line with the scene store: drop removed paths, add
/// anchors for new ones and rebuild visuals whose node changed.
pub fn materialize_scene_nodes(
    mut commands: Commands,
    mut state: ResMut<ViewerState>,
    mut entities: ResMut<SceneEntities>,
    mut assets: VisualAssets,
) {
    let stale: Vec<String> = entities
        .anchors
        .keys()
        .filter(|path| !state.scene.contains(path))
        .cloned()
        .collect();
    for path in stale {
        debug!("Despawning removed scene node {}", path);
        entities.forget(&path, &mut commands);
    }

    let pending: Vec<(String, u64)> = state
        .scene
        .walk()
        .into_iter()
        .filter_map(|path| {
            let generation = state.scene.generation(path)?;
            let built = entities.built_generation(path);
            (built != Some(generation) || !entities.anchors.contains_key(path))
                .then(|| (path.to_string(), generation))
        })
        .collect();

    for (path, generation) in pending {
        let anchor = match entities.anchor(&path) {
            Some(anchor) => anchor,
            None => spawn_anchor(&mut commands, &mut entities, &path),
        };
        if let Some(old) = entities.visuals.remove(&path) {
            despawn_visual(old, &mut commands);
        }

        let Some(node) = state.scene.get(&path) else {
            continue;
        };
        let built = spawn_visual(
            &mut commands,
            &mut assets,
            anchor,
            node,
            state.scene.skinned_mesh(&path),
            generation,
        );
        entities.visuals.insert(path.clone(), built);

        if let Some(attrs) = state.scene.attributes_mut(&path) {
            attrs.mark_object_made();
        }
    }
}

fn spawn_anchor(commands: &mut Commands, entities: &mut SceneEntities, path: &str) -> Entity {
    let anchor = commands
        .spawn((
            SceneNodeAnchor {
                path: path.to_string(),
            },
            Transform::default(),
            Visibility::default(),
            Name::new(format!("scene:{}", path)),
        ))
        .id();

    let parent = match parent_path(path) {
        Some(parent) => entities.anchor(parent),
        None => Some(world_root(commands, entities)),
    };
    match parent {
        Some(parent) => {
            commands.entity(parent).add_child(anchor);
        }
        None => warn!("No parent anchor for {}", path),
    }

    entities.anchors.insert(path.to_string(), anchor);
    anchor
}

fn world_root(commands: &mut Commands, entities: &mut SceneEntities) -> Entity {
    *entities.world.get_or_insert_with(|| {
        commands
            .spawn((
                SceneWorldRoot,
                Transform::from_rotation(wire_to_world_rotation()),
                Visibility::default(),
                Name::new("scene world"),
            ))
            .id()
    })
}

fn spawn_visual(
    commands: &mut Commands,
    assets: &mut VisualAssets,
    anchor: Entity,
    node: &SceneNode,
    skeleton: Option<&SkinnedMeshState>,
    generation: u64,
) -> BuiltVisual {
    let entity = commands
        .spawn((
            NodeVisual {
                path: node.path.clone(),
                generation,
            },
            Transform::default(),
            Visibility::default(),
        ))
        .id();
    commands.entity(anchor).add_child(entity);

    let mut joints = Vec::new();
    let mut detached = None;

    match &node.kind {
        NodeKind::Frame(props) => {
            if props.show_axes && node.path != ROOT_PATH {
                commands.entity(entity).insert(FrameAxes {
                    length: props.axes_length,
                });
            }
        }
        NodeKind::Mesh(props) => {
            if let Some(handles) = assets.add(
                create_triangle_mesh(props),
                solid_material(props.color, props.opacity),
            ) {
                commands.entity(entity).insert(handles);
                if props.wireframe {
                    commands.entity(entity).insert(Wireframe);
                }
            }
        }
        NodeKind::SkinnedMesh(props) => {
            let (mesh, skinned) = create_skinned_mesh(props);
            if let Some(handles) = assets.add(mesh, solid_material(props.color, None)) {
                commands.entity(entity).insert(handles);
            }

            let poses = skeleton.map(SkinnedMeshState::poses).unwrap_or(&[]);
            joints = poses
                .iter()
                .map(|bone| {
                    commands
                        .spawn((
                            Transform::from_translation(bone.position)
                                .with_rotation(bone.orientation),
                            Visibility::default(),
                        ))
                        .id()
                })
                .collect();
            commands.entity(entity).add_children(&joints);

            if skinned {
                if let Some(bindposes) = assets.bindposes.as_mut() {
                    let inverse_bindposes =
                        bindposes.add(SkinnedMeshInverseBindposes::from(inverse_bindposes(poses)));
                    commands.entity(entity).insert(SkinnedMesh {
                        inverse_bindposes,
                        joints: joints.clone(),
                    });
                }
            }
        }
        NodeKind::PointCloud(props) => {
            if let Some(handles) = assets.add(
                create_point_cloud_mesh(props),
                unlit_material(Color::WHITE),
            ) {
                commands.entity(entity).insert(handles);
            }
        }
        NodeKind::Label(props) => {
            let [r, g, b] = OVERLAY_TEXT_COLOUR;
            let text = commands
                .spawn((
                    Text::new(props.text.clone()),
                    TextFont {
                        font_size: OVERLAY_FONT_SIZE,
                        ..default()
                    },
                    TextColor(Color::srgb(r, g, b)),
                    Node {
                        position_type: PositionType::Absolute,
                        ..default()
                    },
                    Visibility::Hidden,
                    SceneLabel { target: entity },
                ))
                .id();
            detached = Some(text);
        }
        NodeKind::Grid(props) => {
            if let Some(handles) = assets.add(
                create_grid_mesh(props),
                unlit_material(Color::srgba(1.0, 1.0, 1.0, 0.5)),
            ) {
                commands.entity(entity).insert(handles);
            }
        }
    }

    BuiltVisual {
        generation,
        entity,
        joints,
        detached,
    }
}

/// Move staged poses and visibility onto anchors that exist.
pub fn apply_staged_poses(
    mut state: ResMut<ViewerState>,
    entities: Res<SceneEntities>,
    mut anchors: Query<(&mut Transform, &mut Visibility), With<SceneNodeAnchor>>,
) {
    for (path, &anchor) in &entities.anchors {
        let Ok((mut transform, mut visibility)) = anchors.get_mut(anchor) else {
            continue;
        };
        let Some(attrs) = state.scene.attributes_mut(path) else {
            continue;
        };

        if let Some((position, orientation)) = attrs.take_pending_pose() {
            transform.translation = position;
            transform.rotation = orientation;
        }

        let wanted = if attrs.effective_visibility() {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
        if *visibility != wanted {
            *visibility = wanted;
        }
    }
}

/// Copy changed bone poses onto joint entities.
pub fn apply_bone_poses(
    mut state: ResMut<ViewerState>,
    entities: Res<SceneEntities>,
    mut joints: Query<&mut Transform, Without<SceneNodeAnchor>>,
) {
    for (path, visual) in &entities.visuals {
        if visual.joints.is_empty() {
            continue;
        }
        let Some(skeleton) = state.scene.skinned_mesh_mut(path) else {
            continue;
        };
        if !skeleton.take_dirty() {
            continue;
        }

        for (joint, bone) in visual.joints.iter().zip(skeleton.poses()) {
            if let Ok(mut transform) = joints.get_mut(*joint) {
                transform.translation = bone.position;
                transform.rotation = bone.orientation;
            }
        }
    }
}
