use std::path::PathBuf;

use thiserror::Error;

use crate::item::{ItemId, ItemStatus};

/// Failure reported by a metadata or chapter collaborator
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read catalog {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Failure reported by the media container backend
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unreadable container data in {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("media task did not finish: {0}")]
    Task(String),
}

/// Why a single action failed. Attached to the owning item, never fatal to a run.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no metadata found for \"{0}\"")]
    NoResults(String),
    #[error("missing metadata: {0}")]
    MissingMetadata(String),
    #[error("unsupported action kind \"{0}\"")]
    Unsupported(String),
}

/// Failure reading or writing the queue store
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read queue file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write queue file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt queue file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode queue: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("queue file {} has format version {found}, newer than supported {supported}", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

/// A controller request that would break a queue invariant. Always a no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("position {position} is out of range for {len} items")]
    OutOfRange { position: usize, len: usize },
    #[error("positions must be strictly ascending")]
    UnorderedPositions,
    #[error("{items} items given for {positions} positions")]
    LengthMismatch { items: usize, positions: usize },
    #[error("item {0} is being processed")]
    ItemWorking(ItemId),
    #[error("item {0} is being edited")]
    ItemEditing(ItemId),
    #[error("item {0} is not in the queue")]
    UnknownItem(ItemId),
    #[error("item {0} is already in the queue")]
    DuplicateItem(ItemId),
    #[error("item {id} cannot go from {from} to {to}")]
    IllegalTransition {
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    },
}

/// Error returned by the mutating queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
