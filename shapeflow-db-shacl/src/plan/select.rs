//! Statement scans

use super::{Batch, NodeState, Pending, PlanNode};
use crate::connections::{ConnectionsGroup, StoreView};
use crate::error::Result;
use crate::tuple::{compare_target_chain, ValidationTuple};
use async_trait::async_trait;
use shapeflow_db_core::{Statement, TriplePattern};
use std::sync::Arc;

/// Maps a matching statement to a tuple, or drops it
pub type TupleMapper = Arc<dyn Fn(&Statement, &ConnectionsGroup) -> Option<ValidationTuple> + Send + Sync>;

struct Scan {
    view: StoreView,
    patterns: Vec<TriplePattern>,
    mapper: TupleMapper,
}

impl Scan {
    async fn run(&self, ctx: &ConnectionsGroup) -> Result<Vec<ValidationTuple>> {
        let found = ctx
            .view(self.view)
            .statements_bulk(&self.patterns, ctx.data_graph())
            .await?;
        Ok(found
            .iter()
            .flatten()
            .filter_map(|st| (self.mapper)(st, ctx))
            .collect())
    }

    fn detail(&self) -> String {
        format!("{:?} {} patterns", self.view, self.patterns.len())
    }
}

/// Scan of one store view, sorted by target chain
pub struct Select {
    scan: Scan,
    pending: Pending,
    state: NodeState,
}

impl Select {
    pub fn new(view: StoreView, patterns: Vec<TriplePattern>, mapper: TupleMapper) -> Self {
        Self {
            scan: Scan {
                view,
                patterns,
                mapper,
            },
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for Select {
    fn name(&self) -> &'static str {
        "Select"
    }

    fn detail(&self) -> Option<String> {
        Some(self.scan.detail())
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        let mut tuples = self.scan.run(ctx).await?;
        tuples.sort_by(compare_target_chain);
        self.pending = Pending::new(tuples);
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

/// Scan of one store view in store order
pub struct UnorderedSelect {
    scan: Scan,
    pending: Option<Pending>,
    state: NodeState,
}

impl UnorderedSelect {
    pub fn new(view: StoreView, patterns: Vec<TriplePattern>, mapper: TupleMapper) -> Self {
        Self {
            scan: Scan {
                view,
                patterns,
                mapper,
            },
            pending: None,
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for UnorderedSelect {
    fn name(&self) -> &'static str {
        "UnorderedSelect"
    }

    fn detail(&self) -> Option<String> {
        Some(self.scan.detail())
    }

    async fn open(&mut self, _ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        if self.pending.is_none() {
            self.pending = Some(Pending::new(self.scan.run(ctx).await?));
        }
        let batch = self.pending.as_mut().and_then(Pending::next_batch);
        if batch.is_none() {
            self.state = NodeState::Exhausted;
        }
        Ok(batch)
    }

    fn close(&mut self) {
        self.pending = None;
        self.state = NodeState::Closed;
    }
}
