//! Error types for every component, aggregated into [`CacheError`].
//!
//! Mirrors `apollo-federation`'s split between one `thiserror` enum per
//! concern and a single top-level enum that wraps them with `#[from]`.

use thiserror::Error;

/// Key Encoder failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("selection is missing a field name")]
    MissingFieldName,
}

/// Writer failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("map at path {path} mixes entity and non-entity field values")]
    MixedEntityMap { path: String },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Reader failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PullError {
    #[error("field {field} at path {path} is not an entity reference or collection of references")]
    NotAReference { path: String, field: String },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Policy Engine failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown fetch policy: {0}")]
    InvalidFetchPolicy(String),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Pull(#[from] PullError),
}

/// Aggregated crate error, returned from the `Client` facade.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Pull(#[from] PullError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}
