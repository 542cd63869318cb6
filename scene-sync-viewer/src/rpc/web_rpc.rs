use crate::config::ViewerConfig;
use crate::engine::plugin::SceneSyncSet;
use crate::protocol::codec::{self, CodecError};
use crate::protocol::messages::{OutboundMessage, ViewerMessage};
use crate::sync::dispatch::SceneSync;
use crate::sync::state::ViewerState;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
use web_sys::{MessageEvent, window};

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// One raw frame as it came off the host channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Shared inbox the host listeners push into. Cloning shares the same buffer,
/// so producers on other threads (or JS callbacks) keep a clone.
#[derive(Resource, Clone, Default)]
pub struct HostInbox(Arc<Mutex<Vec<InboundFrame>>>);

impl HostInbox {
    pub fn push(&self, frame: InboundFrame) {
        if let Ok(mut frames) = self.0.lock() {
            frames.push(frame);
        }
    }

    fn take(&self) -> Vec<InboundFrame> {
        if let Ok(mut frames) = self.0.lock() {
            std::mem::take(&mut *frames)
        } else {
            Vec::new()
        }
    }
}

/// Outgoing traffic, flushed once per frame.
#[derive(Resource, Default)]
pub struct WebRpcInterface {
    outgoing_notifications: Vec<RpcNotification>,
    outgoing_responses: Vec<RpcResponse>,
    outgoing_viewer_messages: Vec<OutboundMessage>,
}

impl WebRpcInterface {
    /// Send notification to the host without expecting response.
    pub fn send_notification(&mut self, method: &str, params: serde_json::Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    /// Queue a protocol message for the visualisation server.
    pub fn send_viewer_message(&mut self, message: OutboundMessage) {
        self.outgoing_viewer_messages.push(message);
    }

    pub fn pending_notifications(&self) -> &[RpcNotification] {
        &self.outgoing_notifications
    }

    pub fn pending_viewer_messages(&self) -> &[OutboundMessage] {
        &self.outgoing_viewer_messages
    }

    fn queue_response(&mut self, response: RpcResponse) {
        self.outgoing_responses.push(response);
    }
}

pub struct WebRpcPlugin;

impl Plugin for WebRpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WebRpcInterface>()
            .init_resource::<HostInbox>()
            .add_event::<IncomingRpcMessage>()
            .add_systems(
                Update,
                (process_incoming_messages, handle_rpc_messages)
                    .chain()
                    .in_set(SceneSyncSet::Receive),
            )
            .add_systems(Update, send_outgoing_messages.in_set(SceneSyncSet::Present));

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, setup_message_listener);

        #[cfg(not(target_arch = "wasm32"))]
        app.add_systems(Startup, spawn_stdin_feeder);
    }
}

#[cfg(target_arch = "wasm32")]
fn setup_message_listener(inbox: Res<HostInbox>) {
    let inbox = inbox.clone();

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        let data = event.data();
        if let Some(text) = data.as_string() {
            inbox.push(InboundFrame::Text(text));
        } else if let Ok(buffer) = data.dyn_into::<js_sys::ArrayBuffer>() {
            inbox.push(InboundFrame::Binary(js_sys::Uint8Array::new(&buffer).to_vec()));
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    match window() {
        Some(window) => {
            if let Err(e) =
                window.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            {
                error!("Failed to register message listener: {:?}", e);
            }
        }
        None => error!("Window object not available"),
    }

    // Ownership passes to JS; the listener lives as long as the page.
    closure.forget();
}

/// Feed newline-delimited JSON frames from stdin into the inbox.
#[cfg(not(target_arch = "wasm32"))]
fn spawn_stdin_feeder(config: Res<ViewerConfig>, inbox: Res<HostInbox>) {
    use std::io::BufRead;

    if !config.stdin_feed {
        return;
    }

    let inbox = inbox.clone();
    let spawned = std::thread::Builder::new()
        .name("stdin-feeder".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => inbox.push(InboundFrame::Text(line)),
                    Err(e) => {
                        error!("Stopped reading stdin: {}", e);
                        break;
                    }
                }
            }
            info!("stdin closed, no further messages will arrive");
        });

    match spawned {
        Ok(_) => info!("Reading scene messages from stdin"),
        Err(e) => error!("Failed to start stdin feeder: {}", e),
    }
}

/// Control request from the host page.
#[derive(Event)]
pub struct IncomingRpcMessage {
    pub content: String,
}

/// Top-level `jsonrpc` member, the only thing routing looks at.
#[derive(Deserialize)]
struct RpcMarker {
    jsonrpc: Option<String>,
}

/// Where a text frame belongs. Scene traffic never carries a top-level
/// `jsonrpc` member; batches are always scene traffic.
fn is_rpc_request(text: &str) -> bool {
    text.trim_start().starts_with('{')
        && serde_json::from_str::<RpcMarker>(text).is_ok_and(|marker| marker.jsonrpc.is_some())
}

fn decode_frame(frame: &InboundFrame) -> Result<Vec<ViewerMessage>, CodecError> {
    match frame {
        InboundFrame::Text(text) => codec::decode_json(text),
        InboundFrame::Binary(bytes) => codec::decode_msgpack(bytes),
    }
}

fn process_incoming_messages(
    inbox: Res<HostInbox>,
    mut sync: ResMut<SceneSync>,
    mut rpc_events: EventWriter<IncomingRpcMessage>,
) {
    for frame in inbox.take() {
        if let InboundFrame::Text(text) = &frame {
            if is_rpc_request(text) {
                rpc_events.write(IncomingRpcMessage {
                    content: text.clone(),
                });
                continue;
            }
        }

        match decode_frame(&frame) {
            Ok(messages) => sync.enqueue_all(messages),
            Err(e) => error!("Dropping undecodable frame: {}", e),
        }
    }
}

fn handle_rpc_messages(
    mut events: EventReader<IncomingRpcMessage>,
    mut state: ResMut<ViewerState>,
    config: Res<ViewerConfig>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    for event in events.read() {
        match serde_json::from_str::<RpcRequest>(&event.content) {
            Ok(request) => {
                debug!("Processing RPC method: {}", request.method);
                if let Some(response) = handle_rpc_request(&request, &mut state, &config) {
                    rpc_interface.queue_response(response);
                }
            }
            Err(parse_error) => warn!("Malformed RPC request: {}", parse_error),
        }
    }
}

/// Handle individual RPC request and generate response based on method.
fn handle_rpc_request(
    request: &RpcRequest,
    state: &mut ViewerState,
    config: &ViewerConfig,
) -> Option<RpcResponse> {
    // Notifications have no ID and get no response.
    let id = request.id.clone()?;

    let result = match request.method.as_str() {
        "list_downloads" => handle_list_downloads(state),
        "save_download" => handle_save_download(&request.params, state, config),
        "dispose_download" => handle_dispose_download(&request.params, state),
        "get_scene_summary" => handle_get_scene_summary(state),
        _ => {
            warn!("Unknown RPC method: {}", request.method);
            return Some(create_error_response(
                id,
                -32601,
                "Method not found",
                Some(serde_json::json!({"method": request.method})),
            ));
        }
    };

    match result {
        Ok(result_value) => Some(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(result_value),
            error: None,
            id: Some(id),
        }),
        Err(error) => Some(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        }),
    }
}

#[derive(Deserialize)]
struct DownloadParams {
    transfer_id: String,
}

fn parse_download_params(params: &serde_json::Value) -> Result<DownloadParams, RpcError> {
    serde_json::from_value::<DownloadParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected 'transfer_id' parameter"))
}

fn handle_list_downloads(state: &ViewerState) -> Result<serde_json::Value, RpcError> {
    let downloads: Vec<_> = state
        .downloads
        .iter()
        .map(|held| {
            serde_json::json!({
                "transfer_id": held.file.transfer_id,
                "filename": held.file.filename,
                "mime_type": held.file.mime_type,
                "size": held.file.bytes.len(),
            })
        })
        .collect();

    Ok(serde_json::json!({ "downloads": downloads }))
}

fn handle_save_download(
    params: &serde_json::Value,
    state: &mut ViewerState,
    config: &ViewerConfig,
) -> Result<serde_json::Value, RpcError> {
    let DownloadParams { transfer_id } = parse_download_params(params)?;
    let held = state
        .downloads
        .get(&transfer_id)
        .ok_or_else(|| RpcError::invalid_params(&format!("No held download: {}", transfer_id)))?;

    #[cfg(not(target_arch = "wasm32"))]
    let result = {
        let path = crate::engine::downloads::save_to_directory(&held.file, &config.download_dir)
            .map_err(|e| RpcError::internal_error(&e.to_string()))?;
        serde_json::json!({
            "success": true,
            "transfer_id": transfer_id,
            "saved_to": path.display().to_string(),
        })
    };

    // The browser saves it; hand the bytes back to the page.
    #[cfg(target_arch = "wasm32")]
    let result = {
        let _ = config;
        crate::engine::downloads::file_payload(&held.file)
    };

    state.downloads.dispose(&transfer_id);
    Ok(result)
}

fn handle_dispose_download(
    params: &serde_json::Value,
    state: &mut ViewerState,
) -> Result<serde_json::Value, RpcError> {
    let DownloadParams { transfer_id } = parse_download_params(params)?;
    let released = state.downloads.dispose(&transfer_id).is_some();

    Ok(serde_json::json!({
        "success": released,
        "transfer_id": transfer_id,
    }))
}

fn handle_get_scene_summary(state: &ViewerState) -> Result<serde_json::Value, RpcError> {
    Ok(serde_json::json!({
        "node_count": state.scene.len(),
        "paths": state.scene.walk(),
        "active_transfers": state.transfers.active_transfers(),
        "held_downloads": state.downloads.len(),
        "capture_pending": state.capture_pending(),
    }))
}

/// Create standardized error response with optional data payload.
fn create_error_response(
    id: serde_json::Value,
    code: i32,
    message: &str,
    data: Option<serde_json::Value>,
) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
            data,
        }),
        id: Some(id),
    }
}

fn send_outgoing_messages(mut rpc_interface: ResMut<WebRpcInterface>) {
    for notification in rpc_interface.outgoing_notifications.drain(..) {
        send_message_to_parent(&notification);
    }

    for response in rpc_interface.outgoing_responses.drain(..) {
        send_message_to_parent(&response);
    }

    for message in rpc_interface.outgoing_viewer_messages.drain(..) {
        send_viewer_message(&message);
    }
}

/// Send serialized message to the parent window, or natively to stdout as
/// one JSON line.
fn send_message_to_parent<T: Serialize>(message: &T) {
    #[cfg(target_arch = "wasm32")]
    {
        match serde_json::to_string(message) {
            Ok(json) => post_to_parent(&JsValue::from_str(&json)),
            Err(e) => error!("Failed to serialize message: {}", e),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = write_host_line(&mut std::io::stdout().lock(), message) {
            error!("Failed to write message to stdout: {}", e);
        }
    }
}

/// Newline-delimited JSON, the native host channel format.
#[cfg(not(target_arch = "wasm32"))]
fn write_host_line<W: std::io::Write, T: Serialize>(
    out: &mut W,
    message: &T,
) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Deliver a protocol message to the server side of the host channel.
fn send_viewer_message(message: &OutboundMessage) {
    #[cfg(target_arch = "wasm32")]
    {
        match codec::encode_msgpack(message) {
            Ok(bytes) => post_to_parent(&js_sys::Uint8Array::from(bytes.as_slice()).into()),
            Err(e) => error!("Failed to encode outbound message: {}", e),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = write_host_line(&mut std::io::stdout().lock(), message) {
            error!("Failed to encode outbound message: {}", e);
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn post_to_parent(value: &JsValue) {
    if let Some(window) = window() {
        if let Some(parent) = window.parent().ok().flatten() {
            if let Err(e) = parent.post_message(value, "*") {
                error!("Failed to send message to parent: {:?}", e);
            }
        } else {
            warn!("No parent window available for message transmission");
        }
    } else {
        error!("Window object not available");
    }
}

impl RpcError {
    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn internal_error(message: &str) -> Self {
        Self {
            code: -32603,
            message: message.to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::scene_store::SceneNode;
    use crate::sync::transfer::CompletedFile;

    fn request(method: &str, params: serde_json::Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(serde_json::json!(1)),
        }
    }

    fn held_file(id: &str) -> CompletedFile {
        CompletedFile {
            transfer_id: id.to_string(),
            filename: "scan.ply".to_string(),
            mime_type: "application/octet-stream".to_string(),
            save_immediately: false,
            bytes: vec![0; 16],
        }
    }

    #[test]
    fn routes_text_frames_by_content() {
        assert!(is_rpc_request(r#"{"jsonrpc":"2.0","method":"list_downloads","id":1}"#));
        assert!(!is_rpc_request(r#"{"type":"ResetSceneMessage"}"#));
        assert!(!is_rpc_request(
            r#"{"type":"LabelMessage","path":"/note","props":{"text":"\"jsonrpc\": 2"}}"#
        ));
        assert!(!is_rpc_request(r#"[{"jsonrpc":"2.0","method":"x"}]"#));

        let decoded =
            decode_frame(&InboundFrame::Text(r#"{"type":"ResetSceneMessage"}"#.into())).unwrap();
        assert_eq!(decoded, vec![ViewerMessage::ResetSceneMessage]);
        assert!(decode_frame(&InboundFrame::Binary(vec![0xc1])).is_err());
    }

    #[test]
    fn inbox_clones_share_one_buffer() {
        let inbox = HostInbox::default();
        let producer = inbox.clone();
        producer.push(InboundFrame::Text("a".into()));
        producer.push(InboundFrame::Binary(vec![1]));

        assert_eq!(inbox.take().len(), 2);
        assert!(inbox.take().is_empty());
    }

    #[test]
    fn lists_and_disposes_held_downloads() {
        let mut state = ViewerState::default();
        let config = ViewerConfig::default();
        state.downloads.hold(held_file("d1"));

        let listed = handle_rpc_request(&request("list_downloads", serde_json::Value::Null), &mut state, &config)
            .unwrap();
        let downloads = &listed.result.unwrap()["downloads"];
        assert_eq!(downloads[0]["transfer_id"], "d1");
        assert_eq!(downloads[0]["size"], 16);

        let disposed = handle_rpc_request(
            &request("dispose_download", serde_json::json!({"transfer_id": "d1"})),
            &mut state,
            &config,
        )
        .unwrap();
        assert_eq!(disposed.result.unwrap()["success"], true);
        assert!(state.downloads.is_empty());
    }

    #[test]
    fn saves_held_download_to_the_configured_directory() {
        let mut state = ViewerState::default();
        let config = ViewerConfig {
            download_dir: std::env::temp_dir().join(format!("scene-sync-rpc-{}", std::process::id())),
            ..Default::default()
        };
        state.downloads.hold(held_file("d2"));

        let response = handle_rpc_request(
            &request("save_download", serde_json::json!({"transfer_id": "d2"})),
            &mut state,
            &config,
        )
        .unwrap();
        let result = response.result.unwrap();
        let saved_to = result["saved_to"].as_str().unwrap();
        assert_eq!(std::fs::read(saved_to).unwrap().len(), 16);
        assert!(state.downloads.is_empty());

        std::fs::remove_dir_all(&config.download_dir).unwrap();
    }

    #[test]
    fn reports_errors_with_rpc_codes() {
        let mut state = ViewerState::default();
        let config = ViewerConfig::default();

        let unknown = handle_rpc_request(&request("teleport", serde_json::Value::Null), &mut state, &config)
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, -32601);

        let bad_params = handle_rpc_request(
            &request("save_download", serde_json::json!({"id": 3})),
            &mut state,
            &config,
        )
        .unwrap();
        assert_eq!(bad_params.error.unwrap().code, -32602);

        let notification = RpcRequest {
            id: None,
            ..request("list_downloads", serde_json::Value::Null)
        };
        assert!(handle_rpc_request(&notification, &mut state, &config).is_none());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn native_responses_are_json_lines() {
        let mut state = ViewerState::default();
        let config = ViewerConfig::default();
        let response =
            handle_rpc_request(&request("list_downloads", serde_json::Value::Null), &mut state, &config)
                .unwrap();

        let mut out = Vec::new();
        write_host_line(&mut out, &response).unwrap();
        write_host_line(
            &mut out,
            &OutboundMessage::GetRenderResponseMessage { payload: vec![1] },
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["jsonrpc"], "2.0");
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["type"], "GetRenderResponseMessage");
    }

    #[test]
    fn summarises_the_scene() {
        let mut state = ViewerState::default();
        state.scene.upsert(SceneNode::empty_frame("/robot/base"));

        let summary = handle_get_scene_summary(&state).unwrap();
        assert_eq!(summary["node_count"], 3);
        assert_eq!(summary["paths"], serde_json::json!(["", "/robot", "/robot/base"]));
        assert_eq!(summary["capture_pending"], false);
    }
}
