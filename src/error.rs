use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classes reported by every public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NoError,
    /// Not enough resources (memory, disk, file system).
    Resource,
    /// A caller supplied value violates a precondition.
    Argument,
    /// Handle unknown, in the wrong state or already released.
    InvalidHandle,
    /// Invariant violation inside the engine.
    Internal,
}

impl ErrorCode {
    /// Collapse an operation result into its error code.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::NoError,
            Err(e) => e.code(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BdfError {
    #[error("Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}")]
    TooShortBuffer {
        actual:   usize,
        expected: usize,
        file:     &'static str,
        line:     u32,
    },

    #[error(r#"Invalid file identifier: Expected "BDF     ", found {0}"#)]
    FileIdentifierError(String),

    #[error("Unsupported file version: {0}")]
    FileVersioningError(String),

    #[error("Invalid block identifier: Expected {expected:?}, got {actual:?}")]
    BlockIDError {
        actual: String,
        expected: String,
    },

    #[error("Invalid file handling")]
    IOError(#[from] std::io::Error),

    #[error("Block linking error: {0}")]
    BlockLinkError(String),

    #[error("Block serialization error: {0}")]
    BlockSerializationError(String),

    #[error("Container {0} was not closed properly")]
    IncompleteContainer(PathBuf),

    #[error("Analog mask {analog:#010x} overlaps marker mask {marker:#010x}")]
    MaskOverlap { analog: u32, marker: u32 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} out of range: requested {requested}, available {available}")]
    OutOfRange {
        what: &'static str,
        requested: u64,
        available: u64,
    },

    #[error("Unknown group {0}")]
    UnknownGroup(String),

    #[error("Unknown input {input} in group {group}")]
    UnknownInput { group: String, input: String },

    #[error("Unknown block {block} of input {input} in group {group}")]
    UnknownBlock { group: usize, input: usize, block: usize },

    #[error("Stale or released handle: {0}")]
    StaleHandle(String),

    #[error("Stream is not in streaming state: {0}")]
    NotStreaming(String),

    #[error("Attributes of group {0} are already written")]
    AttributesSealed(String),

    #[error("Container is faulted after an earlier failure: {0}")]
    Faulted(String),

    #[error("Could not promote {temp} to its final name")]
    PromotionFailed {
        temp: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BdfError {
    /// Map this error onto the public error taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            BdfError::IOError(_) | BdfError::PromotionFailed { .. } => ErrorCode::Resource,
            BdfError::FileIdentifierError(_)
            | BdfError::FileVersioningError(_)
            | BdfError::IncompleteContainer(_)
            | BdfError::MaskOverlap { .. }
            | BdfError::InvalidArgument(_)
            | BdfError::OutOfRange { .. }
            | BdfError::Config(_) => ErrorCode::Argument,
            BdfError::UnknownGroup(_)
            | BdfError::UnknownInput { .. }
            | BdfError::UnknownBlock { .. }
            | BdfError::StaleHandle(_)
            | BdfError::NotStreaming(_) => ErrorCode::InvalidHandle,
            BdfError::TooShortBuffer { .. }
            | BdfError::BlockIDError { .. }
            | BdfError::BlockLinkError(_)
            | BdfError::BlockSerializationError(_)
            | BdfError::AttributesSealed(_)
            | BdfError::Faulted(_) => ErrorCode::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, BdfError>;
