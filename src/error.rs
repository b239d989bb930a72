// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for orbtree operations.
//!
//! Errors are categorical rather than a single opaque string, so callers can
//! match on the kind of failure (a missing key vs. a corrupted block) without
//! parsing messages.

use std::fmt;

/// Standard Result type for all orbtree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Error types for orbtree operations.
#[derive(Debug, Clone)]
pub enum TreeError {
    /// A key passed to an operation did not have the forest's configured
    /// key length.
    KeySizeMismatch { expected: usize, actual: usize },

    /// A value passed to `insert` exceeded the backend's maximum value size.
    ValueTooLarge { max: usize, actual: usize },

    /// Lookup or remove of a key not present in the tree.
    KeyMissing,

    /// A node id referenced by a parent or by forest metadata has no
    /// corresponding block in the backend.
    NodeMissing { id: u64 },

    /// An encoded node exceeded the backend's block size.
    NodeTooBig { id: u64, size: usize, max: usize },

    /// A node could not be decoded: bad magic cookie or truncated block.
    CodecError { reason: String },

    /// `open_forest` was called with a key size that does not match the
    /// forest's stored key size.
    BadKeySize { expected: usize, requested: usize },

    /// A stored node size failed sanity checks on open.
    BadNodeSize { reason: String },

    /// Forest metadata is missing a key required at open time.
    MetadataMissingKey { key: String },

    /// The backend's stored format tag does not match what this crate
    /// produces.
    FormatProblem { expected: String, found: String },

    /// A node refused a modification because its refcount is greater
    /// than one; the caller must shadow it first.
    NodeCannotBeModified { id: u64 },

    /// A node with the given id already exists in the backend.
    NodeExists { id: u64 },

    /// I/O error from the disk backend.
    Io { operation: String, reason: String },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeySizeMismatch { expected, actual } => {
                write!(f, "key size mismatch: expected {} bytes, got {}", expected, actual)
            }
            Self::ValueTooLarge { max, actual } => {
                write!(f, "value too large: max {} bytes, got {}", max, actual)
            }
            Self::KeyMissing => write!(f, "key not found"),
            Self::NodeMissing { id } => write!(f, "node {} is missing", id),
            Self::NodeTooBig { id, size, max } => {
                write!(f, "node {} encodes to {} bytes, exceeding block size {}", id, size, max)
            }
            Self::CodecError { reason } => write!(f, "codec error: {}", reason),
            Self::BadKeySize { expected, requested } => write!(
                f,
                "forest key size is {} bytes, but {} was requested",
                expected, requested
            ),
            Self::BadNodeSize { reason } => write!(f, "bad node size: {}", reason),
            Self::MetadataMissingKey { key } => {
                write!(f, "metadata is missing required key '{}'", key)
            }
            Self::FormatProblem { expected, found } => write!(
                f,
                "format mismatch: expected '{}', found '{}'",
                expected, found
            ),
            Self::NodeCannotBeModified { id } => {
                write!(f, "node {} cannot be modified in place (refcount > 1)", id)
            }
            Self::NodeExists { id } => write!(f, "node {} already exists", id),
            Self::Io { operation, reason } => {
                write!(f, "I/O error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for TreeError {}

impl From<std::io::Error> for TreeError {
    fn from(err: std::io::Error) -> Self {
        TreeError::Io {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}
