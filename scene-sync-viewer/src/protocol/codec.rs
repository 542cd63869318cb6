use crate::protocol::messages::{OutboundMessage, ViewerMessage};
use bevy::log::{debug, error, warn};
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::io::Cursor;
use thiserror::Error;

/// Failure to turn a transport frame into messages or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid MessagePack frame: {0}")]
    MessagePackDecode(#[from] rmp_serde::decode::Error),
    #[error("invalid MessagePack array header: {0}")]
    MessagePackHeader(String),
    #[error("failed to encode MessagePack frame: {0}")]
    MessagePackEncode(#[from] rmp_serde::encode::Error),
}

/// Only the tag of a message, used to name kinds this build does not know.
#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode a JSON frame holding one message or an array of messages.
///
/// Array elements decode independently: a malformed element is logged and
/// skipped, the rest of the batch is kept in order.
pub fn decode_json(text: &str) -> Result<Vec<ViewerMessage>, CodecError> {
    if !text.trim_start().starts_with('[') {
        let message = serde_json::from_str::<ViewerMessage>(text)?;
        if message == ViewerMessage::Unknown {
            let tag = serde_json::from_str::<TypeTag>(text).ok();
            log_unknown_kind(tag.as_ref().map(|tag| tag.kind.as_str()));
        }
        return Ok(vec![message]);
    }

    let elements = serde_json::from_str::<Vec<serde_json::Value>>(text)?;
    let mut messages = Vec::with_capacity(elements.len());
    for (index, element) in elements.into_iter().enumerate() {
        let kind = element
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<ViewerMessage>(element) {
            Ok(message) => {
                if message == ViewerMessage::Unknown {
                    log_unknown_kind(kind.as_deref());
                }
                messages.push(message);
            }
            Err(e) => error!("Dropping malformed message {} of batch: {}", index, e),
        }
    }
    Ok(messages)
}

/// Decode a MessagePack frame holding one message or an array of messages.
///
/// Batches decode element by element, as in [`decode_json`]. An element
/// that cannot even be skipped ends the batch; earlier messages are kept.
pub fn decode_msgpack(frame: &[u8]) -> Result<Vec<ViewerMessage>, CodecError> {
    let is_array = frame.first().is_some_and(|marker| is_array_marker(*marker));
    if !is_array {
        let message = rmp_serde::from_slice::<ViewerMessage>(frame)?;
        if message == ViewerMessage::Unknown {
            let tag = rmp_serde::from_slice::<TypeTag>(frame).ok();
            log_unknown_kind(tag.as_ref().map(|tag| tag.kind.as_str()));
        }
        return Ok(vec![message]);
    }

    let mut cursor = Cursor::new(frame);
    let count = rmp::decode::read_array_len(&mut cursor)
        .map_err(|e| CodecError::MessagePackHeader(e.to_string()))?;

    let mut messages = Vec::with_capacity((count as usize).min(frame.len()));
    for index in 0..count {
        let start = cursor.position() as usize;
        if let Err(e) = IgnoredAny::deserialize(&mut rmp_serde::Deserializer::new(&mut cursor)) {
            error!(
                "Truncated batch: element {} of {} is unreadable: {}",
                index, count, e
            );
            break;
        }
        let element = &frame[start..cursor.position() as usize];

        match rmp_serde::from_slice::<ViewerMessage>(element) {
            Ok(message) => {
                if message == ViewerMessage::Unknown {
                    let tag = rmp_serde::from_slice::<TypeTag>(element).ok();
                    log_unknown_kind(tag.as_ref().map(|tag| tag.kind.as_str()));
                }
                messages.push(message);
            }
            Err(e) => error!("Dropping malformed message {} of batch: {}", index, e),
        }
    }
    Ok(messages)
}

pub fn encode_json(message: &OutboundMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Encode with field names so the server can decode by key.
pub fn encode_msgpack(message: &OutboundMessage) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(message)?)
}

/// fixarray, array16 and array32 markers.
fn is_array_marker(marker: u8) -> bool {
    (0x90..=0x9f).contains(&marker) || marker == 0xdc || marker == 0xdd
}

fn log_unknown_kind(kind: Option<&str>) {
    match kind {
        Some(kind) => warn!("Ignoring unknown message kind: {}", kind),
        None => debug!("Ignoring message with unreadable kind"),
    }
}
