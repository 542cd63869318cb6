/// JPEG quality used when a render request does not name one.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Frames to wait for a screenshot before completing the capture empty.
pub const CAPTURE_TIMEOUT_FRAMES: u32 = 120;

pub const OVERLAY_FONT_SIZE: f32 = 14.0;
pub const OVERLAY_MARGIN_PX: f32 = 12.0;
pub const OVERLAY_TEXT_COLOUR: [f32; 3] = [0.9, 0.9, 0.9];
