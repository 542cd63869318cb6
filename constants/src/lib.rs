//! Shared constants for the scene synchronisation viewer.

/// Wire-frame (Z-up) to world-frame (Y-up) conversion.
pub mod coordinate_system;

/// Default virtual camera parameters.
pub mod camera;

/// Capture and overlay settings.
pub mod render_settings;

/// Scene path conventions and dispatch timing.
pub mod sync;
