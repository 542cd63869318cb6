use thiserror::Error;

/// Protocol violations in the file transfer stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer {transfer_id}: part {got} arrived out of order, expected part {expected}")]
    OutOfOrderPart {
        transfer_id: String,
        expected: usize,
        got: usize,
    },
    #[error("transfer {transfer_id}: {received} bytes received, declared size is {declared}")]
    SizeOverflow {
        transfer_id: String,
        received: u64,
        declared: u64,
    },
    #[error("part for unknown transfer {0}")]
    UnknownTransfer(String),
}

/// Structural mismatch between a skeleton and its update stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    #[error("skinned mesh {path}: bone index {index} out of range for {bone_count} bones")]
    BoneIndexOutOfRange {
        path: String,
        index: usize,
        bone_count: usize,
    },
}

/// Failure of a single dispatched message. Never stops the batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
}
