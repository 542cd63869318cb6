use crate::sync::error::TransferError;
use bevy::log::{info, warn};
use std::collections::HashMap;

/// Receives transfer progress and completed files. Calls are cheap and must not block.
pub trait TransferObserver {
    fn download_progress(&mut self, transfer_id: &str, downloaded: u64, total: u64);

    /// Progress of a file this viewer is sending, reported back by the server.
    fn upload_progress(&mut self, transfer_id: &str, uploaded: u64, total: u64);

    /// A download finished. Files without `save_immediately` are held on the
    /// download shelf after this call returns.
    fn file_completed(&mut self, file: &CompletedFile);
}

/// Metadata a transfer is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub filename: String,
    pub mime_type: String,
    pub total_size: u64,
    /// As declared by the sender; completion is decided by size.
    pub part_count: u32,
    pub save_immediately: bool,
}

/// A transfer in flight.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    header: TransferHeader,
    parts: Vec<Vec<u8>>,
    bytes_received: u64,
}

impl FileTransfer {
    pub fn header(&self) -> &TransferHeader {
        &self.header
    }

    pub fn parts_received(&self) -> usize {
        self.parts.len()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    fn is_complete(&self) -> bool {
        self.bytes_received == self.header.total_size
    }

    fn into_completed(self, transfer_id: String) -> CompletedFile {
        CompletedFile {
            transfer_id,
            filename: self.header.filename,
            mime_type: self.header.mime_type,
            save_immediately: self.header.save_immediately,
            bytes: self.parts.concat(),
        }
    }
}

/// A fully reassembled payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub transfer_id: String,
    pub filename: String,
    pub mime_type: String,
    pub save_immediately: bool,
    pub bytes: Vec<u8>,
}

/// Result of feeding one part to the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOutcome {
    InProgress { downloaded: u64, total: u64 },
    Completed(CompletedFile),
}

/// Accumulates ordered parts per transfer id into complete payloads.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    transfers: HashMap<String, FileTransfer>,
}

impl ChunkReassembler {
    /// Open a transfer. Returns the completed file straight away for empty payloads.
    pub fn start(&mut self, transfer_id: &str, header: TransferHeader) -> Option<CompletedFile> {
        info!(
            "Receiving {} ({} bytes, {}) as transfer {}",
            header.filename, header.total_size, header.mime_type, transfer_id
        );

        let transfer = FileTransfer {
            header,
            parts: Vec::new(),
            bytes_received: 0,
        };

        if self.transfers.remove(transfer_id).is_some() {
            warn!("Transfer {} restarted, discarding earlier parts", transfer_id);
        }

        if transfer.is_complete() {
            return Some(transfer.into_completed(transfer_id.to_string()));
        }

        self.transfers.insert(transfer_id.to_string(), transfer);
        None
    }

    /// Append the next part.
    ///
    /// A part whose index is not the number of parts already received is
    /// rejected and leaves the buffer untouched. A part that would overrun the
    /// declared size abandons the transfer.
    pub fn append_part(
        &mut self,
        transfer_id: &str,
        part_index: usize,
        bytes: Vec<u8>,
    ) -> Result<PartOutcome, TransferError> {
        let transfer = self
            .transfers
            .get_mut(transfer_id)
            .ok_or_else(|| TransferError::UnknownTransfer(transfer_id.to_string()))?;

        let expected = transfer.parts.len();
        if part_index != expected {
            return Err(TransferError::OutOfOrderPart {
                transfer_id: transfer_id.to_string(),
                expected,
                got: part_index,
            });
        }

        let received = transfer.bytes_received + bytes.len() as u64;
        let declared = transfer.header.total_size;
        if received > declared {
            self.transfers.remove(transfer_id);
            return Err(TransferError::SizeOverflow {
                transfer_id: transfer_id.to_string(),
                received,
                declared,
            });
        }

        transfer.parts.push(bytes);
        transfer.bytes_received = received;

        if !transfer.is_complete() {
            return Ok(PartOutcome::InProgress {
                downloaded: received,
                total: declared,
            });
        }

        match self.transfers.remove(transfer_id) {
            Some(done) => Ok(PartOutcome::Completed(
                done.into_completed(transfer_id.to_string()),
            )),
            None => Err(TransferError::UnknownTransfer(transfer_id.to_string())),
        }
    }

    pub fn get(&self, transfer_id: &str) -> Option<&FileTransfer> {
        self.transfers.get(transfer_id)
    }

    pub fn active_transfers(&self) -> usize {
        self.transfers.len()
    }
}

/// A completed download waiting for the user to save or dismiss it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldDownload {
    pub file: CompletedFile,
}

/// Completed downloads retained until their consumer disposes of them.
#[derive(Debug, Default)]
pub struct DownloadShelf {
    held: Vec<HeldDownload>,
}

impl DownloadShelf {
    pub fn hold(&mut self, file: CompletedFile) {
        self.held.retain(|d| d.file.transfer_id != file.transfer_id);
        self.held.push(HeldDownload { file });
    }

    pub fn get(&self, transfer_id: &str) -> Option<&HeldDownload> {
        self.held.iter().find(|d| d.file.transfer_id == transfer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeldDownload> {
        self.held.iter()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release a held download. The shelf keeps no reference afterwards.
    pub fn dispose(&mut self, transfer_id: &str) -> Option<CompletedFile> {
        let index = self
            .held
            .iter()
            .position(|d| d.file.transfer_id == transfer_id)?;
        Some(self.held.remove(index).file)
    }
}
