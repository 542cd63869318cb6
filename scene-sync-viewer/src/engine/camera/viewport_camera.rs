use bevy::prelude::*;
use constants::coordinate_system::{transform_coordinates, wire_to_world_rotation};

use crate::engine::capture::CaptureRig;
use crate::sync::camera::VirtualCamera;
use crate::sync::queue::RenderRequest;

#[derive(Component)]
pub struct ViewerCamera;

pub fn spawn_viewer_camera(mut commands: Commands, camera: Res<VirtualCamera>) {
    commands.spawn((
        Camera3d::default(),
        perspective(camera.fov, camera.near, camera.far),
        camera_transform(camera.position, camera.look_at, camera.up),
        ViewerCamera,
    ));
}

pub fn perspective(fov: f32, near: f32, far: f32) -> Projection {
    Projection::Perspective(PerspectiveProjection {
        fov,
        near,
        far,
        ..default()
    })
}

/// World transform for a camera placed in the wire frame.
pub fn camera_transform(position: Vec3, look_at: Vec3, up: Vec3) -> Transform {
    Transform::from_translation(transform_coordinates(position))
        .looking_at(transform_coordinates(look_at), transform_coordinates(up))
}

/// World transform for a render request camera. The request orientation uses
/// the optical convention of the wire frame: looking down +Z with +Y down.
pub fn capture_transform(request: &RenderRequest) -> Transform {
    let optical_to_bevy = Quat::from_rotation_x(std::f32::consts::PI);
    Transform {
        translation: transform_coordinates(request.position),
        rotation: wire_to_world_rotation() * request.orientation * optical_to_bevy,
        ..default()
    }
}

/// Apply the virtual camera to the viewer camera when its revision moves.
pub fn sync_viewer_camera(
    camera: Res<VirtualCamera>,
    rig: Res<CaptureRig>,
    mut applied_revision: Local<u64>,
    mut query: Query<(&mut Transform, &mut Projection), With<ViewerCamera>>,
) {
    if rig.holds_camera() || camera.revision() == *applied_revision {
        return;
    }
    let Ok((mut transform, mut projection)) = query.single_mut() else {
        return;
    };

    *transform = camera_transform(camera.position, camera.look_at, camera.up);
    *projection = perspective(camera.fov, camera.near, camera.far);
    *applied_revision = camera.revision();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::RenderFormat;

    #[test]
    fn wire_camera_maps_into_the_y_up_world() {
        let transform = camera_transform(Vec3::new(0.0, -5.0, 0.0), Vec3::ZERO, Vec3::Z);

        assert!(transform.translation.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));
        // Looking at the origin from +Z world means forward is -Z.
        assert!(transform.forward().abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!(transform.up().abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn optical_identity_looks_along_wire_z() {
        let request = RenderRequest {
            format: RenderFormat::Png,
            width: 4,
            height: 4,
            quality: 90,
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            fov: 1.0,
        };
        let transform = capture_transform(&request);

        // Wire +Z is world +Y.
        assert!(transform.forward().abs_diff_eq(Vec3::Y, 1e-5));
    }
}
