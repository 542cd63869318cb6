use bevy::prelude::*;

use super::materialize::FrameAxes;

/// Draw the axes of every visible frame node. Red, green and blue follow the
/// node's local X, Y and Z in the wire frame.
pub fn draw_frame_axes(
    frames: Query<(&GlobalTransform, &InheritedVisibility, &FrameAxes)>,
    mut gizmos: Gizmos,
) {
    for (transform, visibility, axes) in &frames {
        if visibility.get() {
            gizmos.axes(*transform, axes.length);
        }
    }
}
