//! Hash joins keyed on the target chain
//!
//! The right side is materialized when the join opens; the left side
//! streams. Joined tuples take the right side's value and merge details.

use super::{drain_open, Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::tuple::ValidationTuple;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use shapeflow_db_core::Term;

struct HashJoin {
    left: BoxedPlanNode,
    right: BoxedPlanNode,
    table: FxHashMap<Vec<Term>, Vec<ValidationTuple>>,
    outer: bool,
    state: NodeState,
}

impl HashJoin {
    fn new(left: BoxedPlanNode, right: BoxedPlanNode, outer: bool) -> Self {
        Self {
            left,
            right,
            table: FxHashMap::default(),
            outer,
            state: NodeState::Created,
        }
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.right.open(ctx).await?;
        let right = drain_open(self.right.as_mut(), ctx).await;
        self.right.close();
        self.table.clear();
        for tuple in right? {
            self.table
                .entry(tuple.target_chain().to_vec())
                .or_default()
                .push(tuple);
        }
        self.left.open(ctx).await?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        loop {
            let Some(batch) = self.left.next_batch(ctx).await? else {
                self.state = NodeState::Exhausted;
                return Ok(None);
            };
            let mut out = Vec::with_capacity(batch.len());
            for left in batch {
                match self.table.get(left.target_chain()) {
                    Some(matches) => out.extend(matches.iter().map(|right| left.join(right))),
                    None if self.outer => out.push(left),
                    None => {}
                }
            }
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.table.clear();
        self.state = NodeState::Closed;
    }
}

macro_rules! hash_join_node {
    ($name:ident, $label:literal, $outer:expr) => {
        pub struct $name(HashJoin);

        impl $name {
            pub fn new(left: BoxedPlanNode, right: BoxedPlanNode) -> Self {
                Self(HashJoin::new(left, right, $outer))
            }
        }

        #[async_trait]
        impl PlanNode for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn children(&self) -> Vec<&dyn PlanNode> {
                vec![self.0.left.as_ref(), self.0.right.as_ref()]
            }

            async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
                self.0.open(ctx).await
            }

            async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
                self.0.next_batch(ctx).await
            }

            fn close(&mut self) {
                self.0.close()
            }
        }
    };
}

hash_join_node!(InnerJoin, "InnerJoin", false);
hash_join_node!(LeftOuterJoin, "LeftOuterJoin", true);
