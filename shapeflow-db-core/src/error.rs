//! Error types for shapeflow-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A pattern or statement query failed
    #[error("Query error: {0}")]
    Query(String),

    /// Term could not be constructed or interpreted
    #[error("Invalid term: {0}")]
    InvalidTerm(String),

    /// Connection was used after being closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        Error::Query(msg.into())
    }

    /// Create an invalid term error
    pub fn invalid_term(msg: impl Into<String>) -> Self {
        Error::InvalidTerm(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
