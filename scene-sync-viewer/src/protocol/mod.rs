//! Wire protocol between the visualisation server and the viewer.
//!
//! Every inbound message is one variant of [`messages::ViewerMessage`], tagged
//! by a `"type"` field. Messages arrive either as JSON text or as MessagePack
//! frames; a frame may carry a single message or an array of messages.
//!
//! ```text
//! server ──(JSON | MessagePack)──> codec::decode_* ──> ViewerMessage ──> SceneSync::enqueue
//! ```
//!
//! The only outbound message is the render capture response, see
//! [`messages::OutboundMessage`].

/// Serde helpers for raw byte payloads (binary in MessagePack, base64 in JSON).
pub mod bytes;

/// JSON and MessagePack decoding of inbound frames.
pub mod codec;

/// The closed message union and the node payloads it carries.
pub mod messages;
