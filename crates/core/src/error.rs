//! Error taxonomy shared across the crate.

use thiserror::Error;

use crate::{codec::CodecError, store::StoreError};

/// Result alias used by fallible core operations.
pub type Result<T> = std::result::Result<T, CraftError>;

/// Top-level error for provider and interaction operations.
#[derive(Debug, Error)]
pub enum CraftError {
    /// Stored text could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The durable store rejected or failed the call.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The request was refused before any state changed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The worker pool is shut down or a task died.
    #[error("worker pool failure: {0}")]
    Worker(String),
}

/// Recoverable rejections reported in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Station type has not been registered.
    #[error("station type '{0}' is not registered")]
    UnknownType(String),

    /// Station type is already registered.
    #[error("station type '{0}' already exists")]
    DuplicateType(String),

    /// Name does not fit the station type naming rules.
    #[error("'{0}' is not a valid station type name")]
    InvalidTypeName(String),

    /// Id is reserved for a station's head-item record.
    #[error("recipe id '{0}' is reserved")]
    ReservedId(String),

    /// Crafting requires a capability token the player does not carry.
    #[error("no capability token for station type '{0}'")]
    MissingToken(String),

    /// Operation is not valid in the surface's current mode.
    #[error("surface {surface} does not support {operation}")]
    WrongMode {
        /// Surface id.
        surface: u64,
        /// Attempted operation.
        operation: &'static str,
    },

    /// No open surface with this id.
    #[error("surface {0} is not open")]
    UnknownSurface(u64),

    /// Player is not connected to the interaction loop.
    #[error("player {0} is not connected")]
    UnknownPlayer(u64),
}
