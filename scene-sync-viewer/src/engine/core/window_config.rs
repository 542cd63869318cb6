use bevy::prelude::*;
use bevy::window::PresentMode;

pub fn create_window_config(title: &str) -> Window {
    #[cfg(target_arch = "wasm32")]
    {
        Window {
            title: title.to_string(),
            canvas: Some("#bevy".into()),
            fit_canvas_to_parent: true,
            prevent_default_event_handling: false,
            present_mode: PresentMode::AutoVsync,
            ..default()
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        Window {
            title: title.to_string(),
            present_mode: PresentMode::AutoVsync,
            ..default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_carries_the_configured_title() {
        let window = create_window_config("Robot Cell");
        assert_eq!(window.title, "Robot Cell");
        assert_eq!(window.present_mode, PresentMode::AutoVsync);
    }
}
