use bevy::prelude::*;
use bevy::render::view::screenshot::{Screenshot, ScreenshotCaptured};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

use crate::engine::camera::viewport_camera::{ViewerCamera, capture_transform, perspective};
use crate::protocol::messages::RenderFormat;
use crate::rpc::web_rpc::WebRpcInterface;
use crate::sync::queue::{CaptureBackend, RenderRequest};
use crate::sync::state::ViewerState;
use constants::render_settings::CAPTURE_TIMEOUT_FRAMES;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no viewer camera to capture from")]
    NoCamera,
    #[error("screenshot could not be converted: {0}")]
    Conversion(String),
    #[error("no screenshot after {0} frames")]
    TimedOut(u32),
    #[error("failed to encode {format}: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone)]
enum CaptureCommand {
    StageCamera(RenderRequest),
    Begin(RenderRequest),
}

/// Frame gate requests, carried out by `run_capture_commands` later in the frame.
#[derive(Resource, Default)]
pub struct CaptureCommands {
    pending: Vec<CaptureCommand>,
}

impl CaptureBackend for CaptureCommands {
    fn stage_camera(&mut self, request: &RenderRequest) {
        self.pending.push(CaptureCommand::StageCamera(request.clone()));
    }

    fn begin_capture(&mut self, request: &RenderRequest) {
        self.pending.push(CaptureCommand::Begin(request.clone()));
    }
}

#[derive(Debug)]
struct InFlightCapture {
    id: u64,
    request: RenderRequest,
    frames_waited: u32,
}

/// State of the capture in flight.
#[derive(Resource, Default)]
pub struct CaptureRig {
    /// Viewer camera as it was before the capture took it over.
    saved_camera: Option<(Transform, Projection)>,
    in_flight: Option<InFlightCapture>,
    /// Result tagged with the id of the capture that produced it.
    finished: Option<(u64, Result<Vec<u8>, CaptureError>)>,
    next_id: u64,
}

impl CaptureRig {
    pub fn holds_camera(&self) -> bool {
        self.saved_camera.is_some()
    }

    pub fn in_flight(&self) -> Option<&RenderRequest> {
        self.in_flight.as_ref().map(|capture| &capture.request)
    }
}

pub fn run_capture_commands(
    mut commands: Commands,
    mut capture: ResMut<CaptureCommands>,
    mut rig: ResMut<CaptureRig>,
    mut cameras: Query<(&mut Transform, &mut Projection), With<ViewerCamera>>,
) {
    for command in std::mem::take(&mut capture.pending) {
        match command {
            CaptureCommand::StageCamera(request) => {
                let Ok((mut transform, mut projection)) = cameras.single_mut() else {
                    warn!("No viewer camera to stage for capture");
                    continue;
                };
                if rig.saved_camera.is_none() {
                    rig.saved_camera = Some((*transform, projection.clone()));
                }

                let (near, far) = match &*projection {
                    Projection::Perspective(p) => (p.near, p.far),
                    _ => (PerspectiveProjection::default().near, PerspectiveProjection::default().far),
                };
                *transform = capture_transform(&request);
                *projection = perspective(request.fov, near, far);
            }
            CaptureCommand::Begin(request) => {
                let id = rig.next_id;
                rig.next_id += 1;
                rig.in_flight = Some(InFlightCapture {
                    id,
                    request: request.clone(),
                    frames_waited: 0,
                });

                if cameras.single().is_err() {
                    rig.finished = Some((id, Err(CaptureError::NoCamera)));
                    continue;
                }

                commands.spawn(Screenshot::primary_window()).observe(
                    move |trigger: Trigger<ScreenshotCaptured>, mut rig: ResMut<CaptureRig>| {
                        rig.finished = Some((id, encode_capture(&trigger.event().0, &request)));
                    },
                );
            }
        }
    }
}

/// Hand a finished capture to the viewer state and give the camera back.
/// A failed or timed out capture still completes, with an empty payload, so
/// the gate reopens. Results of abandoned captures are dropped.
pub fn finish_captures(
    mut rig: ResMut<CaptureRig>,
    mut state: ResMut<ViewerState>,
    mut rpc: ResMut<WebRpcInterface>,
    mut cameras: Query<(&mut Transform, &mut Projection), With<ViewerCamera>>,
) {
    let current = rig.in_flight.as_ref().map(|capture| capture.id);
    let result = match rig.finished.take() {
        Some((id, result)) if current == Some(id) => result,
        Some((id, _)) => {
            warn!("Dropping result of abandoned capture {}", id);
            return;
        }
        None => {
            let Some(capture) = rig.in_flight.as_mut() else {
                return;
            };
            capture.frames_waited += 1;
            if capture.frames_waited < CAPTURE_TIMEOUT_FRAMES {
                return;
            }
            Err(CaptureError::TimedOut(capture.frames_waited))
        }
    };

    let payload = match result {
        Ok(bytes) => {
            info!("Render capture finished ({} bytes)", bytes.len());
            bytes
        }
        Err(e) => {
            error!("Render capture failed: {}", e);
            Vec::new()
        }
    };

    rig.in_flight = None;
    if let Some((saved_transform, saved_projection)) = rig.saved_camera.take() {
        if let Ok((mut transform, mut projection)) = cameras.single_mut() {
            *transform = saved_transform;
            *projection = saved_projection;
        }
    }

    if let Some(response) = state.complete_capture(payload) {
        rpc.send_viewer_message(response);
    }
}

/// Scale a screenshot to the requested size and encode it.
pub fn encode_capture(screenshot: &Image, request: &RenderRequest) -> Result<Vec<u8>, CaptureError> {
    let image = screenshot
        .clone()
        .try_into_dynamic()
        .map_err(|e| CaptureError::Conversion(e.to_string()))?;

    let image = if image.width() == request.width && image.height() == request.height {
        image
    } else {
        image.resize_exact(request.width, request.height, FilterType::Triangle)
    };

    encode_image(&image, request.format, request.quality)
}

pub fn encode_image(
    image: &DynamicImage,
    format: RenderFormat,
    quality: u8,
) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    let encoded = match format {
        RenderFormat::Png => image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png),
        RenderFormat::Jpeg => image
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))),
    };

    encoded.map_err(|source| CaptureError::Encode {
        format: format.mime_type(),
        source,
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::asset::RenderAssetUsages;
    use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};

    fn request(format: RenderFormat, width: u32, height: u32) -> RenderRequest {
        RenderRequest {
            format,
            width,
            height,
            quality: 80,
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            fov: 1.0,
        }
    }

    fn red_screenshot() -> Image {
        Image::new_fill(
            Extent3d {
                width: 8,
                height: 6,
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            &[255, 0, 0, 255],
            TextureFormat::Rgba8UnormSrgb,
            RenderAssetUsages::default(),
        )
    }

    #[test]
    fn screenshot_is_resized_to_the_request() {
        let png = encode_capture(&red_screenshot(), &request(RenderFormat::Png, 4, 3)).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn jpeg_drops_alpha() {
        let jpeg = encode_capture(&red_screenshot(), &request(RenderFormat::Jpeg, 8, 6)).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn backend_queues_gate_requests_in_order() {
        let mut capture = CaptureCommands::default();
        let req = request(RenderFormat::Png, 1, 1);
        capture.stage_camera(&req);
        capture.begin_capture(&req);

        assert!(matches!(capture.pending[0], CaptureCommand::StageCamera(_)));
        assert!(matches!(capture.pending[1], CaptureCommand::Begin(_)));
    }
}
