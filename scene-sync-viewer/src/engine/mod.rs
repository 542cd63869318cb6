//! Bevy side of the viewer: turns the synchronised scene into entities,
//! drives the camera and render captures, and reports transfers to the host.

pub mod camera;
pub mod capture;
pub mod core;
pub mod downloads;
pub mod plugin;
pub mod scene;
pub mod systems;
