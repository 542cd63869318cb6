use bevy::math::Vec3;
use bevy::prelude::Resource;
use constants::camera::{
    DEFAULT_FAR, DEFAULT_FOV, DEFAULT_LOOK_AT, DEFAULT_NEAR, DEFAULT_POSITION, DEFAULT_UP,
};

/// Camera operations the rendering engine exposes to the dispatcher.
///
/// Values are in the wire frame (Z-up); the engine converts them.
pub trait CameraControl {
    fn set_position(&mut self, position: Vec3);
    fn set_look_at(&mut self, target: Vec3);
    fn set_up_direction(&mut self, up: Vec3);
    /// Vertical field of view in radians.
    fn set_fov(&mut self, fov: f32);
    fn set_near(&mut self, near: f32);
    fn set_far(&mut self, far: f32);
}

/// Requested camera state. The engine copies it onto the viewport camera
/// whenever `revision` moves.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct VirtualCamera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    revision: u64,
}

impl Default for VirtualCamera {
    fn default() -> Self {
        Self {
            position: Vec3::from_array(DEFAULT_POSITION),
            look_at: Vec3::from_array(DEFAULT_LOOK_AT),
            up: Vec3::from_array(DEFAULT_UP),
            fov: DEFAULT_FOV,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            // Start dirty so the first sync places the camera.
            revision: 1,
        }
    }
}

impl VirtualCamera {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

impl CameraControl for VirtualCamera {
    fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.touch();
    }

    fn set_look_at(&mut self, target: Vec3) {
        self.look_at = target;
        self.touch();
    }

    fn set_up_direction(&mut self, up: Vec3) {
        self.up = up;
        self.touch();
    }

    fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.touch();
    }

    fn set_near(&mut self, near: f32) {
        self.near = near;
        self.touch();
    }

    fn set_far(&mut self, far: f32) {
        self.far = far;
        self.touch();
    }
}
