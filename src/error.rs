//! Error types for forge-ann operations.
//!
//! Construction-time and query-time failures (`DimensionMismatch`, `NotFound`,
//! `InvalidState`) are always reported to the caller. Numeric degeneracies met
//! while building trees are resolved internally and never surface here.

use std::io;
use thiserror::Error;

use crate::index::IndexState;
use crate::types::ItemId;

/// Result type alias using [`ForgeAnnError`].
pub type Result<T> = std::result::Result<T, ForgeAnnError>;

/// Errors that can occur during forge-ann operations.
#[derive(Error, Debug)]
pub enum ForgeAnnError {
    /// Vector length does not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was created with.
        expected: usize,
        /// Length of the vector provided.
        actual: usize,
    },

    /// Item id was never added (or lies beyond the stored item slots).
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// Operation is not valid in the current lifecycle state.
    #[error("invalid state: cannot {operation} while index is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the index was in.
        state: IndexState,
    },

    /// I/O error during save or load.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File is truncated or has an unrecognized layout.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Checksum verification failed during loading.
    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    /// File is well formed but was written for a different dimension or metric.
    #[error("incompatible index: {0}")]
    IncompatibleIndex(String),

    /// Invalid parameter value provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error while encoding or decoding an auxiliary table.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Key was already inserted into a keyed index.
    #[error("key already present: {0}")]
    KeyAlreadyPresent(String),

    /// Key is unknown to a keyed index.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Memory could not be reserved for the operation.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),
}

impl ForgeAnnError {
    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `InvalidState` error.
    pub fn invalid_state(operation: &'static str, state: IndexState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Creates a new `IncompatibleIndex` error.
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleIndex(msg.into())
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a new `AllocationFailure` error.
    pub fn allocation_failure(msg: impl Into<String>) -> Self {
        Self::AllocationFailure(msg.into())
    }
}

impl From<bincode::Error> for ForgeAnnError {
    fn from(err: bincode::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for ForgeAnnError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::AllocationFailure(err.to_string())
    }
}
