//! Client-side scene synchronisation.
//!
//! Everything in this module is plain data plus the rules that mutate it; no
//! ECS system lives here. The engine layer owns the Bevy side and hands the
//! state in explicitly each frame:
//!
//! ```text
//! SceneSync::enqueue ──> MessageQueue ──> plan_frame (capture barrier)
//!                                              │
//!                                              ▼
//!                                dispatch(message, DispatchContext)
//!                    ┌──────────────┬──────────┴─────┬───────────────┐
//!                    ▼              ▼                ▼               ▼
//!              SceneNodeStore   NodeAttributes   ChunkReassembler  CameraControl
//! ```
//!
//! ## Ordering
//! Messages are dispatched strictly in arrival order. A render request is a
//! barrier: the frame that dispatches it dispatches nothing after it, and no
//! further message is dispatched until the capture has completed.
//!
//! ## Pose staging
//! Poses that arrive before a node's object exists are kept in
//! [`staging::NodeAttributes`] and applied once the engine has built the
//! object, see [`staging::PoseUpdateState`].

pub mod camera;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod scene_store;
pub mod staging;
pub mod state;
pub mod transfer;
