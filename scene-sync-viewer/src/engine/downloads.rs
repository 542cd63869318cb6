use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bevy::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::ViewerConfig;
use crate::rpc::web_rpc::WebRpcInterface;
use crate::sync::transfer::{CompletedFile, TransferObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Download,
    Upload,
}

#[derive(Event, Debug, Clone, PartialEq)]
pub struct TransferProgressEvent {
    pub transfer_id: String,
    pub direction: TransferDirection,
    pub bytes: u64,
    pub total: u64,
}

#[derive(Event, Debug, Clone)]
pub struct FileCompletedEvent {
    pub file: CompletedFile,
}

/// Collects transfer callbacks during dispatch; flushed into events afterwards.
#[derive(Default)]
pub struct TransferNotices {
    progress: Vec<TransferProgressEvent>,
    completed: Vec<CompletedFile>,
}

impl TransferObserver for TransferNotices {
    fn download_progress(&mut self, transfer_id: &str, downloaded: u64, total: u64) {
        self.progress.push(TransferProgressEvent {
            transfer_id: transfer_id.to_string(),
            direction: TransferDirection::Download,
            bytes: downloaded,
            total,
        });
    }

    fn upload_progress(&mut self, transfer_id: &str, uploaded: u64, total: u64) {
        self.progress.push(TransferProgressEvent {
            transfer_id: transfer_id.to_string(),
            direction: TransferDirection::Upload,
            bytes: uploaded,
            total,
        });
    }

    fn file_completed(&mut self, file: &CompletedFile) {
        self.completed.push(file.clone());
    }
}

impl TransferNotices {
    pub fn flush(
        self,
        progress: &mut EventWriter<TransferProgressEvent>,
        completed: &mut EventWriter<FileCompletedEvent>,
    ) {
        progress.write_batch(self.progress);
        completed.write_batch(self.completed.into_iter().map(|file| FileCompletedEvent { file }));
    }
}

/// Write a file into `dir` under its own name. Directory parts of the
/// sender's filename are ignored.
pub fn save_to_directory(file: &CompletedFile, dir: &Path) -> std::io::Result<PathBuf> {
    let name = Path::new(&file.filename)
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| format!("download-{}", file.transfer_id).into());

    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, &file.bytes)?;
    Ok(path)
}

/// File contents as a JSON object the host page can turn into a download.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub fn file_payload(file: &CompletedFile) -> serde_json::Value {
    serde_json::json!({
        "transfer_id": file.transfer_id,
        "filename": file.filename,
        "mime_type": file.mime_type,
        "content": STANDARD.encode(&file.bytes),
    })
}

/// Announce finished downloads and deliver the immediate-save ones.
pub fn handle_completed_files(
    mut events: EventReader<FileCompletedEvent>,
    config: Res<ViewerConfig>,
    mut rpc: ResMut<WebRpcInterface>,
) {
    for FileCompletedEvent { file } in events.read() {
        rpc.send_notification(
            "file_completed",
            serde_json::json!({
                "transfer_id": file.transfer_id,
                "filename": file.filename,
                "mime_type": file.mime_type,
                "size": file.bytes.len(),
                "held": !file.save_immediately,
            }),
        );

        if !file.save_immediately {
            info!("Holding {} for the user", file.filename);
            continue;
        }

        #[cfg(not(target_arch = "wasm32"))]
        match save_to_directory(file, &config.download_dir) {
            Ok(path) => info!("Saved {} to {}", file.filename, path.display()),
            Err(e) => error!("Failed to save {}: {}", file.filename, e),
        }

        #[cfg(target_arch = "wasm32")]
        {
            let _ = &config;
            rpc.send_notification("download_file", file_payload(file));
        }
    }
}

pub fn forward_transfer_progress(
    mut events: EventReader<TransferProgressEvent>,
    config: Res<ViewerConfig>,
    mut rpc: ResMut<WebRpcInterface>,
) {
    if !config.send_progress_notifications {
        events.clear();
        return;
    }

    for event in events.read() {
        let method = match event.direction {
            TransferDirection::Download => "download_progress",
            TransferDirection::Upload => "upload_progress",
        };
        rpc.send_notification(
            method,
            serde_json::json!({
                "transfer_id": event.transfer_id,
                "bytes": event.bytes,
                "total": event.total,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(filename: &str) -> CompletedFile {
        CompletedFile {
            transfer_id: "42".into(),
            filename: filename.into(),
            mime_type: "text/plain".into(),
            save_immediately: true,
            bytes: b"hello".to_vec(),
        }
    }

    #[test]
    fn saving_strips_directories_from_the_filename() {
        let dir = std::env::temp_dir().join(format!("scene-sync-downloads-{}", std::process::id()));

        let path = save_to_directory(&file("../../etc/notes.txt"), &dir).unwrap();
        assert_eq!(path, dir.join("notes.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        let fallback = save_to_directory(&file(".."), &dir).unwrap();
        assert_eq!(fallback, dir.join("download-42"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn payload_carries_base64_content() {
        let payload = file_payload(&file("a.txt"));
        assert_eq!(payload["content"], "aGVsbG8=");
        assert_eq!(payload["filename"], "a.txt");
    }

    #[test]
    fn notices_record_both_directions() {
        let mut notices = TransferNotices::default();
        notices.download_progress("d", 1, 2);
        notices.upload_progress("u", 3, 4);
        notices.file_completed(&file("x"));

        assert_eq!(notices.progress[0].direction, TransferDirection::Download);
        assert_eq!(notices.progress[1].bytes, 3);
        assert_eq!(notices.completed.len(), 1);
    }
}
