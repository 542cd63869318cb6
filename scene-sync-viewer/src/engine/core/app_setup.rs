use bevy::asset::AssetMetaCheck;
use bevy::pbr::wireframe::{WireframeConfig, WireframePlugin};
use bevy::prelude::*;

use crate::config::ViewerConfig;
use crate::engine::core::window_config::create_window_config;
use crate::engine::plugin::{SceneRenderPlugin, SceneSyncPlugin};

pub fn create_app(config: ViewerConfig) -> App {
    let mut app = App::new();

    app.add_plugins(create_default_plugins(&config))
        // Mesh nodes opt in per entity.
        .add_plugins(WireframePlugin::default())
        .insert_resource(WireframeConfig {
            global: false,
            default_color: Color::WHITE,
        })
        .add_plugins(SceneSyncPlugin { config })
        .add_plugins(SceneRenderPlugin);

    app
}

fn create_default_plugins(config: &ViewerConfig) -> impl PluginGroup {
    let window_config = WindowPlugin {
        primary_window: Some(create_window_config(&config.window_title)),
        ..default()
    };

    let asset_config = AssetPlugin {
        meta_check: AssetMetaCheck::Never,
        ..default()
    };

    DefaultPlugins.set(window_config).set(asset_config)
}
