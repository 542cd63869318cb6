use crate::protocol::messages::{RenderFormat, ViewerMessage};
use crate::sync::staging::quat_from_wxyz;
use bevy::log::{debug, info};
use bevy::math::{Quat, Vec3};
use constants::render_settings::DEFAULT_JPEG_QUALITY;
use std::collections::VecDeque;

/// Parameters of a one-shot render capture.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub format: RenderFormat,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub orientation: Quat,
    pub position: Vec3,
    pub fov: f32,
}

impl RenderRequest {
    /// Build from a render request message; `None` for any other kind.
    pub fn from_message(message: &ViewerMessage) -> Option<Self> {
        match message {
            ViewerMessage::GetRenderRequestMessage {
                format,
                width,
                height,
                quality,
                wxyz,
                position,
                fov,
            } => Some(Self {
                format: *format,
                width: *width,
                height: *height,
                quality: quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                orientation: quat_from_wxyz(*wxyz),
                position: Vec3::from_array(*position),
                fov: *fov,
            }),
            _ => None,
        }
    }
}

/// Capture state machine driven by the frame gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Armed by dispatching the request message.
    Triggered,
    /// One quiet frame so this frame's effects reach the rendered image.
    Pause,
    InProgress,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequestSlot {
    pub request: RenderRequest,
    pub state: CaptureState,
}

impl RenderRequestSlot {
    pub fn triggered(request: RenderRequest) -> Self {
        Self {
            request,
            state: CaptureState::Triggered,
        }
    }

    /// Ordinary traffic is held until the capture is ready.
    pub fn blocks_traffic(&self) -> bool {
        self.state != CaptureState::Ready
    }
}

/// Off-screen capture machinery of the rendering engine.
pub trait CaptureBackend {
    /// Move the capture camera into place during the pause frame.
    fn stage_camera(&mut self, request: &RenderRequest);

    /// Start reading pixels. Completion is reported through
    /// `ViewerState::complete_capture`.
    fn begin_capture(&mut self, request: &RenderRequest);
}

/// What the gate allows this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Capture barrier active: dispatch nothing.
    Hold,
    /// Dispatch this many messages from the front of the queue.
    Drain(usize),
}

/// FIFO of inbound events. Producers only append; the frame loop drains.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<ViewerMessage>,
}

impl MessageQueue {
    /// Append to the tail. Never blocks, never drops.
    pub fn enqueue(&mut self, message: ViewerMessage) {
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewerMessage> {
        self.messages.iter()
    }

    /// Drain up to and including the first render request, or everything.
    pub fn barrier_prefix_len(&self) -> usize {
        self.messages
            .iter()
            .position(ViewerMessage::is_render_request)
            .map(|index| index + 1)
            .unwrap_or(self.messages.len())
    }

    pub fn take_front(&mut self, count: usize) -> Vec<ViewerMessage> {
        let count = count.min(self.messages.len());
        self.messages.drain(..count).collect()
    }
}

/// Decide how much of the queue this frame may dispatch, advancing the
/// capture state machine on the way.
pub fn plan_frame(
    queue: &MessageQueue,
    slot: &mut Option<RenderRequestSlot>,
    capture: &mut dyn CaptureBackend,
) -> GateDecision {
    if let Some(pending) = slot.as_mut() {
        match pending.state {
            CaptureState::Triggered => {
                debug!("Render request armed, pausing message traffic");
                capture.stage_camera(&pending.request);
                pending.state = CaptureState::Pause;
                return GateDecision::Hold;
            }
            CaptureState::Pause => {
                info!(
                    "Capturing {}x{} {}",
                    pending.request.width,
                    pending.request.height,
                    pending.request.format.mime_type()
                );
                capture.begin_capture(&pending.request);
                pending.state = CaptureState::InProgress;
                return GateDecision::Hold;
            }
            CaptureState::InProgress => return GateDecision::Hold,
            CaptureState::Ready => {}
        }
    }

    GateDecision::Drain(queue.barrier_prefix_len())
}
