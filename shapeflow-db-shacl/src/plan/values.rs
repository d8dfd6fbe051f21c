//! Constant plan leaves

use super::{Batch, NodeState, Pending, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::tuple::ValidationTuple;
use async_trait::async_trait;

/// Emits a fixed list of tuples
pub struct ValuesNode {
    tuples: Vec<ValidationTuple>,
    pending: Pending,
    state: NodeState,
}

impl ValuesNode {
    pub fn new(tuples: Vec<ValidationTuple>) -> Self {
        Self {
            tuples,
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for ValuesNode {
    fn name(&self) -> &'static str {
        "Values"
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{} tuples", self.tuples.len()))
    }

    async fn open(&mut self, _ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.pending = Pending::new(std::mem::take(&mut self.tuples));
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, _ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        let batch = self.pending.next_batch();
        if batch.is_none() {
            self.state = NodeState::Exhausted;
        }
        Ok(batch)
    }

    fn close(&mut self) {
        self.pending = Pending::default();
        self.state = NodeState::Closed;
    }
}

/// Produces nothing
pub struct EmptyNode {
    state: NodeState,
}

impl EmptyNode {
    pub fn new() -> Self {
        Self {
            state: NodeState::Created,
        }
    }
}

impl Default for EmptyNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanNode for EmptyNode {
    fn name(&self) -> &'static str {
        "Empty"
    }

    async fn open(&mut self, _ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.state = NodeState::Exhausted;
        Ok(())
    }

    async fn next_batch(&mut self, _ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        self.state.check_next()?;
        Ok(None)
    }

    fn close(&mut self) {
        self.state = NodeState::Closed;
    }
}
