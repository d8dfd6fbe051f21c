//! Plan node algebra
//!
//! A validation plan is a tree of [`PlanNode`]s producing batches of
//! [`ValidationTuple`]s through the `open/next_batch/close` lifecycle:
//!
//! 1. `open()` - initialize state, open children, materialize if needed
//! 2. `next_batch()` - pull non-empty batches until `None`
//! 3. `close()` - release resources; idempotent
//!
//! Every node is single-consumer. Sharing one upstream between several
//! consumers goes through [`BufferedSplitter`], which buffers the source
//! once and hands out independent readers.
//!
//! Nodes that re-express tuples at a different scope report it through
//! [`PlanNode::shifts_scope`], which the explain output marks.

pub mod bulked_join;
pub mod closed;
pub mod explain;
pub mod filter;
pub mod group_by;
pub mod join;
pub mod not_values_in;
pub mod pairwise;
pub mod reshape;
pub mod select;
pub mod sparql;
pub mod splitter;
pub mod targets;
pub mod union;
pub mod unique;
pub mod values;

pub use bulked_join::{BulkedExternalJoin, JoinKind};
pub use closed::ClosedCheck;
pub use explain::explain;
pub use filter::{ExternalFilterByType, FilterNode, Keep, TuplePredicate};
pub use group_by::{CountMode, GroupByCountFilter, GroupByFilter, GroupPredicate, Sort};
pub use join::{InnerJoin, LeftOuterJoin};
pub use not_values_in::NotValuesIn;
pub use pairwise::{PairwiseCheck, PairwiseKind};
pub use reshape::{
    Annotate, ChainAsTarget, ShiftToNodeShape, ShiftToPropertyShape, TrimToTarget, Truncate, ValueAsFocus,
};
pub use select::{Select, TupleMapper, UnorderedSelect};
pub use sparql::SparqlSelectNode;
pub use splitter::BufferedSplitter;
pub use targets::{Direction, ExtendNode, PathDeltaNode, TargetChainNode, TargetFilterNode, TargetMode};
pub use union::UnionNode;
pub use unique::{UniqueKey, UniqueNode};
pub use values::{EmptyNode, ValuesNode};

use crate::connections::ConnectionsGroup;
use crate::error::{Result, ShaclError};
use crate::tuple::ValidationTuple;
use async_trait::async_trait;

/// A batch of tuples; never empty when returned from `next_batch`
pub type Batch = Vec<ValidationTuple>;

/// Boxed plan node for dynamic dispatch
pub type BoxedPlanNode = Box<dyn PlanNode>;

/// Tuples per emitted batch for nodes that materialize their output
pub(crate) const OUTPUT_BATCH_SIZE: usize = 256;

#[async_trait]
pub trait PlanNode: Send + Sync {
    /// Node name for explain output and logs
    fn name(&self) -> &'static str;

    /// Whether output tuples are at a different scope than the input
    fn shifts_scope(&self) -> bool {
        false
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        Vec::new()
    }

    /// Extra text shown next to the name in explain output
    fn detail(&self) -> Option<String> {
        None
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()>;

    /// Next non-empty batch, or `None` when exhausted
    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>>;

    /// Release resources; safe to call more than once
    fn close(&mut self);
}

#[async_trait]
impl PlanNode for BoxedPlanNode {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn shifts_scope(&self) -> bool {
        (**self).shifts_scope()
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        (**self).children()
    }

    fn detail(&self) -> Option<String> {
        (**self).detail()
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        (**self).open(ctx).await
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        (**self).next_batch(ctx).await
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Lifecycle state shared by every node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Open,
    Exhausted,
    Closed,
}

impl NodeState {
    pub fn can_open(&self) -> bool {
        matches!(self, NodeState::Created)
    }

    pub fn can_next(&self) -> bool {
        matches!(self, NodeState::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, NodeState::Closed)
    }

    /// Error unless the node may be opened
    pub fn check_open(&self) -> Result<()> {
        if self.can_open() {
            Ok(())
        } else if self.is_closed() {
            Err(ShaclError::OperatorClosed)
        } else {
            Err(ShaclError::OperatorAlreadyOpened)
        }
    }

    /// `Ok(true)` if the node may produce, `Ok(false)` once exhausted or closed
    pub fn check_next(&self) -> Result<bool> {
        match self {
            NodeState::Created => Err(ShaclError::OperatorNotOpened),
            NodeState::Open => Ok(true),
            NodeState::Exhausted | NodeState::Closed => Ok(false),
        }
    }
}

/// Materialized output emitted in fixed-size batches
#[derive(Debug, Default)]
pub(crate) struct Pending {
    items: std::vec::IntoIter<ValidationTuple>,
}

impl Pending {
    pub(crate) fn new(items: Vec<ValidationTuple>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }

    pub(crate) fn next_batch(&mut self) -> Option<Batch> {
        let batch: Batch = self.items.by_ref().take(OUTPUT_BATCH_SIZE).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Pull every tuple from `node`, then close it
///
/// Open errors, pull errors and an early stop at `limit` all close the node.
pub async fn collect(
    node: &mut dyn PlanNode,
    ctx: &ConnectionsGroup,
    limit: Option<usize>,
) -> Result<Vec<ValidationTuple>> {
    let result = drain(node, ctx, limit).await;
    node.close();
    result
}

async fn drain(node: &mut dyn PlanNode, ctx: &ConnectionsGroup, limit: Option<usize>) -> Result<Vec<ValidationTuple>> {
    node.open(ctx).await?;
    let mut out = Vec::new();
    while let Some(batch) = node.next_batch(ctx).await? {
        out.extend(batch);
        if let Some(limit) = limit {
            if out.len() >= limit {
                out.truncate(limit);
                break;
            }
        }
    }
    Ok(out)
}

/// Drain a child that was already opened
pub(crate) async fn drain_open(node: &mut dyn PlanNode, ctx: &ConnectionsGroup) -> Result<Vec<ValidationTuple>> {
    let mut out = Vec::new();
    while let Some(batch) = node.next_batch(ctx).await? {
        out.extend(batch);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::connections::ConnectionsGroup;
    use crate::tuple::{Contexts, Scope, ValidationTuple};
    use shapeflow_db_core::{MemoryStore, Statement, Term};
    use std::sync::Arc;

    pub fn t(s: &str) -> Term {
        Term::iri(format!("http://x/{}", s))
    }

    pub fn no_contexts() -> Contexts {
        Arc::from(Vec::<Option<Term>>::new())
    }

    pub fn node(chain: &[&str]) -> ValidationTuple {
        ValidationTuple::new(chain.iter().map(|s| t(s)).collect(), Scope::NodeShape, false, no_contexts())
    }

    pub fn prop(target: &str, value: &str) -> ValidationTuple {
        ValidationTuple::new(vec![t(target), t(value)], Scope::PropertyShape, true, no_contexts())
    }

    pub fn bare(target: &str) -> ValidationTuple {
        ValidationTuple::target(t(target), Scope::PropertyShape, no_contexts())
    }

    pub async fn ctx_with(base: Vec<Statement>, added: Vec<Statement>, removed: Vec<Statement>) -> ConnectionsGroup {
        ConnectionsGroup::new(
            Arc::new(MemoryStore::from_statements(base)),
            Arc::new(MemoryStore::from_statements(added)),
            Arc::new(MemoryStore::from_statements(removed)),
        )
        .await
        .unwrap()
    }

    pub async fn empty_ctx() -> ConnectionsGroup {
        ctx_with(vec![], vec![], vec![]).await
    }

    pub fn chains(tuples: &[ValidationTuple]) -> Vec<Vec<Term>> {
        let mut out: Vec<Vec<Term>> = tuples.iter().map(|t| t.chain().to_vec()).collect();
        out.sort();
        out
    }
}
