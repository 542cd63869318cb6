/// Vertical field of view in radians.
pub const DEFAULT_FOV: f32 = 50.0 * std::f32::consts::PI / 180.0;
pub const DEFAULT_NEAR: f32 = 0.01;
pub const DEFAULT_FAR: f32 = 1000.0;

/// Wire-frame (Z-up) camera placement used until the server sends one.
pub const DEFAULT_POSITION: [f32; 3] = [3.0, 3.0, 3.0];
pub const DEFAULT_LOOK_AT: [f32; 3] = [0.0, 0.0, 0.0];
pub const DEFAULT_UP: [f32; 3] = [0.0, 0.0, 1.0];
