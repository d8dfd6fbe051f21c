//! Store connection interface
//!
//! `Connection` is the narrow surface the validation engine uses to read a
//! transactional snapshot. One connection is handed in for each of the
//! pre-transaction base state, the added statements, and the removed
//! statements; [`crate::overlay::OverlayConnection`] combines them into the
//! post-transaction view.
//!
//! Implementations must be safe to share across tasks: a validation run
//! issues many concurrent reads and never writes.

use crate::error::Result;
use crate::statement::{GraphScope, Statement, TriplePattern};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Connection: Send + Sync {
    /// All statements matching `pattern` within `graphs`
    async fn statements(&self, pattern: &TriplePattern, graphs: &GraphScope) -> Result<Vec<Statement>>;

    /// Statements matching any of `patterns`, as one round trip
    ///
    /// Results are returned per pattern, in input order. The default issues
    /// one query per pattern; stores with a cheaper batched path override it.
    async fn statements_bulk(
        &self,
        patterns: &[TriplePattern],
        graphs: &GraphScope,
    ) -> Result<Vec<Vec<Statement>>> {
        let mut out = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            out.push(self.statements(pattern, graphs).await?);
        }
        Ok(out)
    }

    /// Whether at least one statement matches
    ///
    /// `include_inferred` is forwarded for stores that materialize
    /// entailments; stores without inference ignore it.
    async fn has_statement(
        &self,
        pattern: &TriplePattern,
        include_inferred: bool,
        graphs: &GraphScope,
    ) -> Result<bool> {
        let _ = include_inferred;
        Ok(!self.statements(pattern, graphs).await?.is_empty())
    }

    /// Number of statements in the connection
    async fn size(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }
}

/// Shared connection handle
pub type ConnectionRef = Arc<dyn Connection>;

#[async_trait]
impl<C: Connection + ?Sized> Connection for Arc<C> {
    async fn statements(&self, pattern: &TriplePattern, graphs: &GraphScope) -> Result<Vec<Statement>> {
        (**self).statements(pattern, graphs).await
    }

    async fn statements_bulk(
        &self,
        patterns: &[TriplePattern],
        graphs: &GraphScope,
    ) -> Result<Vec<Vec<Statement>>> {
        (**self).statements_bulk(patterns, graphs).await
    }

    async fn has_statement(
        &self,
        pattern: &TriplePattern,
        include_inferred: bool,
        graphs: &GraphScope,
    ) -> Result<bool> {
        (**self).has_statement(pattern, include_inferred, graphs).await
    }

    async fn size(&self) -> Result<usize> {
        (**self).size().await
    }

    async fn is_empty(&self) -> Result<bool> {
        (**self).is_empty().await
    }
}
