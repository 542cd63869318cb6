use bevy::math::{Quat, Vec3};

/// Coordinate transformation matrix (row-major: [x_new, y_new, z_new])
/// Wire frame is Z-up, world frame is Y-up: -90° X rotation (Z→Y, -Y→Z, X→X)
pub const COORDINATE_TRANSFORM: [[f32; 3]; 3] = [
    [1.0, 0.0, 0.0],  // X = X
    [0.0, 0.0, 1.0],  // Y = Z
    [0.0, -1.0, 0.0], // Z = -Y
];

/// Apply coordinate transformation matrix to a wire-frame point.
pub fn transform_coordinates(point: Vec3) -> Vec3 {
    let input = point.to_array();
    let mut output = [0.0; 3];

    for i in 0..3 {
        for j in 0..3 {
            output[i] += COORDINATE_TRANSFORM[i][j] * input[j];
        }
    }

    Vec3::from_array(output)
}

/// Rotation equivalent of `COORDINATE_TRANSFORM`, applied once at the scene root.
pub fn wire_to_world_rotation() -> Quat {
    Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)
}
