use super::{Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::tuple::{TupleKey, ValidationTuple};
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use shapeflow_db_core::Term;

/// What two tuples must share to count as duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    /// Chain, scope and value flag
    Full,
    /// Target chain only; the first tuple of each chain wins
    TargetChain,
}

#[derive(PartialEq, Eq, Hash)]
enum Seen {
    Full(TupleKey),
    Chain(Vec<Term>),
}

/// Streaming deduplication
pub struct UniqueNode {
    input: BoxedPlanNode,
    key: UniqueKey,
    seen: FxHashSet<Seen>,
    state: NodeState,
}

impl UniqueNode {
    pub fn new(input: BoxedPlanNode, key: UniqueKey) -> Self {
        Self {
            input,
            key,
            seen: FxHashSet::default(),
            state: NodeState::Created,
        }
    }

    fn key_of(&self, tuple: &ValidationTuple) -> Seen {
        match self.key {
            UniqueKey::Full => Seen::Full(tuple.key()),
            UniqueKey::TargetChain => Seen::Chain(tuple.target_chain().to_vec()),
        }
    }
}

#[async_trait]
impl PlanNode for UniqueNode {
    fn name(&self) -> &'static str {
        "Unique"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        match self.key {
            UniqueKey::Full => None,
            UniqueKey::TargetChain => Some("by target chain".to_string()),
        }
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.input.open(ctx).await?;
        self.seen.clear();
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        loop {
            let Some(batch) = self.input.next_batch(ctx).await? else {
                self.state = NodeState::Exhausted;
                return Ok(None);
            };
            let mut out = Vec::with_capacity(batch.len());
            for tuple in batch {
                let key = self.key_of(&tuple);
                if self.seen.insert(key) {
                    out.push(tuple);
                }
            }
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.seen.clear();
        self.state = NodeState::Closed;
    }
}
