//! SHACL error types

use crate::settings::ValidationApproach;
use crate::tuple::Scope;
use std::fmt;
use thiserror::Error;

/// Result type for SHACL operations
pub type Result<T> = std::result::Result<T, ShaclError>;

/// A constraint, scope, and approach combination with no implementation
///
/// Returned as a value by the bulk query builders; the engine reacts by
/// falling back to the transactional algebra over all targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported {
    pub component: &'static str,
    pub scope: Scope,
    pub approach: ValidationApproach,
    pub reason: String,
}

impl Unsupported {
    pub fn new(
        component: &'static str,
        scope: Scope,
        approach: ValidationApproach,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            component,
            scope,
            approach,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {:?} scope has no {:?} implementation: {}",
            self.component, self.scope, self.approach, self.reason
        )
    }
}

impl std::error::Error for Unsupported {}

/// SHACL validation and shape construction errors
#[derive(Debug, Error)]
pub enum ShaclError {
    /// Unsupported constraint/scope/approach combination
    #[error("Unsupported: {0}")]
    Unsupported(#[from] Unsupported),

    /// Shape definition is missing required properties or is inconsistent
    #[error("Malformed shape {shape}: {message}")]
    MalformedShape { shape: String, message: String },

    /// Invalid regex pattern in sh:pattern
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Shape references unknown shape
    #[error("Shape {referrer} references unknown shape {referenced}")]
    UnknownShapeReference { referrer: String, referenced: String },

    /// Plan construction reached a shape already being planned
    #[error("Recursive shape reference through {shape}")]
    RecursiveShape { shape: String },

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] shapeflow_db_core::Error),

    /// Bulk query execution failed
    #[error("Query error during validation: {0}")]
    Query(String),

    /// Plan node used before `open()`
    #[error("Plan node not opened")]
    OperatorNotOpened,

    /// Plan node opened twice
    #[error("Plan node already opened")]
    OperatorAlreadyOpened,

    /// Plan node used after `close()`
    #[error("Plan node closed")]
    OperatorClosed,

    /// Grouping input was not ordered by target
    #[error("{node} received input out of target order")]
    UnorderedGroupInput { node: &'static str },

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShaclError {
    pub fn malformed(shape: impl fmt::Display, message: impl Into<String>) -> Self {
        ShaclError::MalformedShape {
            shape: shape.to_string(),
            message: message.into(),
        }
    }
}
