/// The root node path. It always exists and cannot be removed.
pub const ROOT_PATH: &str = "";

pub const PATH_SEPARATOR: char = '/';

/// Delay before a clickability change takes effect. Surfaces races between
/// node creation and interactivity.
pub const CLICKABLE_DELAY_MS: u64 = 50;

/// Axes length given to frames synthesised for missing ancestors.
pub const SYNTHESISED_FRAME_AXES_LENGTH: f32 = 0.5;

/// Directory completed downloads are written to when none is configured.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Environment variable naming the viewer configuration file.
pub const CONFIG_ENV_VAR: &str = "SCENE_SYNC_CONFIG";
