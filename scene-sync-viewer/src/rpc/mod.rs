//! Channel between the viewer and whatever hosts it.
//!
//! In the browser the viewer runs inside an iframe and talks to its parent
//! window through `postMessage`. Natively it can read newline-delimited JSON
//! from stdin and writes outbound messages to stdout.
//!
//! ## Message Flow
//!
//! ```text
//! Host (parent window | stdin)               Viewer
//!        │                                      │
//!        ├─ JSON text / MessagePack bytes ────> │ HostInbox ─> decode ─> SceneSync
//!        ├─ JSON-RPC request (with ID) ───────> │
//!        │ <──────────────── Response (with ID) ┤
//!        │ <──────────── Notification (no ID) ──┤ transfer progress, files
//!        │ <──── GetRenderResponseMessage ──────┤ MessagePack (wasm) | JSON line (native)
//! ```
//!
//! Inbound text containing a `"jsonrpc"` member is treated as a control
//! request from the host page. Everything else is a scene protocol frame.
//!
//! ## Methods
//!
//! - `list_downloads`: held downloads with their id, filename, MIME type and size
//! - `save_download`: save a held download and release it (`transfer_id`)
//! - `dispose_download`: release a held download without saving (`transfer_id`)
//! - `get_scene_summary`: node paths, active transfers and capture status
//!
//! ## Notifications
//!
//! - `download_progress`, `upload_progress`: `{ transfer_id, bytes, total }`
//! - `file_completed`: a finished download, held or saved
//! - `download_file`: an immediate-save file handed to the browser (wasm)
//!
//! ## Error Handling
//!
//! Standard JSON-RPC 2.0 error codes:
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error

/// Inbox, JSON-RPC handling and outbound delivery.
pub mod web_rpc;
