//! Viewport camera driven by the server.
//!
//! The server addresses a virtual camera in the wire frame through
//! [`crate::sync::camera::CameraControl`]. This module owns the Bevy camera
//! entity and copies the virtual camera onto it whenever it changes, except
//! while a render capture has borrowed the camera.

/// Viewer camera entity, wire-to-world conversion and the sync system.
pub mod viewport_camera;
