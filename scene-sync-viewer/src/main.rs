use scene_sync_viewer::config::ViewerConfig;
use scene_sync_viewer::engine::core::app_setup::create_app;

fn main() {
    let config = ViewerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Ignoring viewer config: {e}");
        ViewerConfig::default()
    });
    let mut app = create_app(config);

    #[cfg(target_arch = "wasm32")]
    {
        wasm_bindgen_futures::spawn_local(async move {
            app.run();
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        app.run();
    }
}
