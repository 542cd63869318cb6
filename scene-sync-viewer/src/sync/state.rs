use crate::protocol::messages::OutboundMessage;
use crate::sync::queue::{CaptureState, RenderRequestSlot};
use crate::sync::scene_store::SceneNodeStore;
use crate::sync::transfer::{ChunkReassembler, DownloadShelf};
use bevy::log::{debug, warn};
use bevy::prelude::Resource;
use constants::sync::CLICKABLE_DELAY_MS;
use std::time::Duration;

/// A clickability change waiting out its delay.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingClickable {
    pub path: String,
    pub clickable: bool,
    pub due: Duration,
}

/// Central mutable viewer state, passed explicitly to the dispatcher and the
/// frame gate. Only the dispatch step mutates it; renderers read it.
#[derive(Resource, Debug)]
pub struct ViewerState {
    pub scene: SceneNodeStore,
    pub transfers: ChunkReassembler,
    pub downloads: DownloadShelf,
    pub render_request: Option<RenderRequestSlot>,
    pending_clickable: Vec<PendingClickable>,
    clickable_delay: Duration,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::with_clickable_delay(Duration::from_millis(CLICKABLE_DELAY_MS))
    }
}

impl ViewerState {
    pub fn with_clickable_delay(clickable_delay: Duration) -> Self {
        Self {
            scene: SceneNodeStore::default(),
            transfers: ChunkReassembler::default(),
            downloads: DownloadShelf::default(),
            render_request: None,
            pending_clickable: Vec::new(),
            clickable_delay,
        }
    }

    pub fn clickable_delay(&self) -> Duration {
        self.clickable_delay
    }

    /// Queue a clickability change to land `clickable_delay` after `now`.
    pub fn schedule_clickable(&mut self, path: &str, clickable: bool, now: Duration) {
        self.pending_clickable.push(PendingClickable {
            path: path.to_string(),
            clickable,
            due: now + self.clickable_delay,
        });
    }

    pub fn pending_clickable(&self) -> &[PendingClickable] {
        &self.pending_clickable
    }

    /// Apply every clickability change that is due, in arrival order.
    /// Changes for nodes removed in the meantime are dropped.
    pub fn apply_due_clickables(&mut self, now: Duration) -> usize {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending_clickable
            .drain(..)
            .partition(|pending| pending.due <= now);
        self.pending_clickable = waiting;

        let mut applied = 0;
        for pending in due {
            if !self.scene.contains(&pending.path) {
                debug!("Dropping clickable change for removed node {}", pending.path);
                continue;
            }
            if let Some(attrs) = self.scene.attributes_mut(&pending.path) {
                attrs.clickable = pending.clickable;
                applied += 1;
            }
        }
        applied
    }

    /// Finish the in-flight capture and build the response for the server.
    pub fn complete_capture(&mut self, payload: Vec<u8>) -> Option<OutboundMessage> {
        match self.render_request.as_mut() {
            Some(slot) if slot.state == CaptureState::InProgress => {
                slot.state = CaptureState::Ready;
                Some(OutboundMessage::GetRenderResponseMessage { payload })
            }
            _ => {
                warn!("Capture completed with no capture in progress, dropping it");
                None
            }
        }
    }

    /// True while the capture barrier holds ordinary traffic.
    pub fn capture_pending(&self) -> bool {
        self.render_request
            .as_ref()
            .is_some_and(RenderRequestSlot::blocks_traffic)
    }

    /// Clear the scene and the clickability changes that targeted it.
    pub fn reset_scene(&mut self) {
        self.scene.reset();
        self.pending_clickable.clear();
    }
}
