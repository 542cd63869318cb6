use bevy::prelude::*;

use super::materialize::{NodeVisual, SceneLabel};
use crate::engine::camera::viewport_camera::ViewerCamera;

/// Pin label text to the screen position of its node. Labels of hidden or
/// off-screen nodes are hidden.
pub fn position_scene_labels(
    cameras: Query<(&Camera, &GlobalTransform), With<ViewerCamera>>,
    targets: Query<(&GlobalTransform, &InheritedVisibility), With<NodeVisual>>,
    mut labels: Query<(&SceneLabel, &mut Node, &mut Visibility)>,
) {
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };

    for (label, mut node, mut visibility) in &mut labels {
        let screen_position = targets
            .get(label.target)
            .ok()
            .filter(|(_, inherited)| inherited.get())
            .and_then(|(target, _)| {
                camera
                    .world_to_viewport(camera_transform, target.translation())
                    .ok()
            });

        match screen_position {
            Some(position) => {
                node.left = Val::Px(position.x);
                node.top = Val::Px(position.y);
                *visibility = Visibility::Inherited;
            }
            None => *visibility = Visibility::Hidden,
        }
    }
}
