//! Error types for the shard-range allocator.
//!
//! This module defines the central `Error` enum covering every failure an
//! allocation can hit, from bad client input to an unreadable seed file.
//! Transport layers map it onto their own status codes in one place.
//!
//! ## Error Cases
//! - `EmptySeed`: The client did not supply a usable seed.
//! - `Config`: The address-space configuration was rejected.
//! - `CorruptStore`: The seed file exists but cannot be decoded. Allocation is
//!   blocked until an operator repairs it.
//! - `Io`: Reading, writing, or renaming the seed file failed.
//! - `Encode`: The seed map could not be serialized.

use crate::config::ConfigError;
use std::{io, path::PathBuf};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the allocator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The seed was missing or empty.
    #[error("Seed must be a non-empty string")]
    EmptySeed,

    /// The address-space configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The seed file is present but unparsable.
    ///
    /// This never collapses into an empty store: doing so would re-issue
    /// partition indices that already belong to registered nodes.
    #[error("Seed store {} is corrupt: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// An I/O operation on the seed file failed.
    #[error("I/O error while {context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// Serializing the seed map failed.
    #[error("Failed to encode seed map: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// `true` when the failure was caused by the caller's input rather than
    /// the service.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptySeed)
    }
}
