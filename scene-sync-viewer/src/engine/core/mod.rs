//! Application setup for native and WASM targets.

/// Builds the windowed app: default plugins, wireframes and the viewer plugins.
pub mod app_setup;

/// Platform-specific window configuration.
///
/// Configures canvas integration for web targets and vsync settings.
pub mod window_config;
