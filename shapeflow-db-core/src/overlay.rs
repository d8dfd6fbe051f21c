//! Overlay connection combining a base snapshot with a transaction delta
//!
//! The post-transaction view is `base - removed + added`, computed per query
//! without materializing a new store. Removed statements are masked first,
//! then added statements are merged in (deduplicated against the base).
//!
//! # Example
//!
//! ```ignore
//! use shapeflow_db_core::{MemoryStore, OverlayConnection};
//! use std::sync::Arc;
//!
//! let current = OverlayConnection::new(
//!     Arc::new(base),
//!     Arc::new(added),
//!     Arc::new(removed),
//! );
//! ```

use crate::connection::{Connection, ConnectionRef};
use crate::error::Result;
use crate::statement::{GraphScope, Statement, TriplePattern};
use async_trait::async_trait;
use rustc_hash::FxHashSet;

#[derive(Clone)]
pub struct OverlayConnection {
    base: ConnectionRef,
    added: ConnectionRef,
    removed: ConnectionRef,
}

impl OverlayConnection {
    pub fn new(base: ConnectionRef, added: ConnectionRef, removed: ConnectionRef) -> Self {
        Self { base, added, removed }
    }

    fn merge(base: Vec<Statement>, added: Vec<Statement>, removed: Vec<Statement>) -> Vec<Statement> {
        let masked: FxHashSet<Statement> = removed.into_iter().collect();
        let mut seen: FxHashSet<Statement> = FxHashSet::default();
        let mut out = Vec::with_capacity(base.len() + added.len());
        for st in base.into_iter().chain(added) {
            if !masked.contains(&st) && seen.insert(st.clone()) {
                out.push(st);
            }
        }
        out
    }
}

impl std::fmt::Debug for OverlayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for OverlayConnection {
    async fn statements(&self, pattern: &TriplePattern, graphs: &GraphScope) -> Result<Vec<Statement>> {
        let base = self.base.statements(pattern, graphs).await?;
        let added = self.added.statements(pattern, graphs).await?;
        let removed = self.removed.statements(pattern, graphs).await?;
        Ok(Self::merge(base, added, removed))
    }

    async fn statements_bulk(
        &self,
        patterns: &[TriplePattern],
        graphs: &GraphScope,
    ) -> Result<Vec<Vec<Statement>>> {
        let base = self.base.statements_bulk(patterns, graphs).await?;
        let added = self.added.statements_bulk(patterns, graphs).await?;
        let removed = self.removed.statements_bulk(patterns, graphs).await?;
        Ok(base
            .into_iter()
            .zip(added)
            .zip(removed)
            .map(|((b, a), r)| Self::merge(b, a, r))
            .collect())
    }

    async fn has_statement(
        &self,
        pattern: &TriplePattern,
        include_inferred: bool,
        graphs: &GraphScope,
    ) -> Result<bool> {
        if self.added.has_statement(pattern, include_inferred, graphs).await? {
            return Ok(true);
        }
        if !self.base.has_statement(pattern, include_inferred, graphs).await? {
            return Ok(false);
        }
        Ok(!self.statements(pattern, graphs).await?.is_empty())
    }

    async fn size(&self) -> Result<usize> {
        // Deltas are assumed consistent: added is disjoint from base, removed is a subset
        let base = self.base.size().await?;
        let added = self.added.size().await?;
        let removed = self.removed.size().await?;
        Ok((base + added).saturating_sub(removed))
    }
}
