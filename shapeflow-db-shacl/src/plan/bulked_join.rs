//! Bulked path join against the store
//!
//! Resolves the values of a path for upstream tuples in chunks of
//! `bulk_size`, one bulk store query per chunk and path step, instead of one
//! query per tuple. Input order is preserved, so a target-ordered input
//! yields target-ordered output.

use super::{Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::{ConnectionsGroup, StoreView};
use crate::error::Result;
use crate::path::Path;
use crate::tuple::ValidationTuple;
use async_trait::async_trait;
use shapeflow_db_core::Term;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    /// Tuples without values pass through, trimmed to their target
    LeftOuter,
}

pub struct BulkedExternalJoin {
    input: BoxedPlanNode,
    path: Path,
    view: StoreView,
    kind: JoinKind,
    bulk_size: usize,
    buffer: Vec<ValidationTuple>,
    input_done: bool,
    state: NodeState,
}

impl BulkedExternalJoin {
    pub fn inner(input: BoxedPlanNode, path: Path, bulk_size: usize) -> Self {
        Self::new(input, path, JoinKind::Inner, bulk_size)
    }

    pub fn left_outer(input: BoxedPlanNode, path: Path, bulk_size: usize) -> Self {
        Self::new(input, path, JoinKind::LeftOuter, bulk_size)
    }

    fn new(input: BoxedPlanNode, path: Path, kind: JoinKind, bulk_size: usize) -> Self {
        Self {
            input,
            path,
            view: StoreView::Current,
            kind,
            bulk_size: bulk_size.max(1),
            buffer: Vec::new(),
            input_done: false,
            state: NodeState::Created,
        }
    }

    /// Resolve values in another view than the post-transaction state
    pub fn in_view(mut self, view: StoreView) -> Self {
        self.view = view;
        self
    }

    async fn join_chunk(&self, ctx: &ConnectionsGroup, chunk: Vec<ValidationTuple>) -> Result<Batch> {
        let starts: Vec<Term> = chunk.iter().map(|t| t.active_target().clone()).collect();
        let span = tracing::trace_span!("bulked_join_chunk", tuples = chunk.len(), path = %self.path);
        let values = self
            .path
            .evaluate_chunked(ctx.view(self.view), ctx.data_graph(), &starts, self.bulk_size, true)
            .instrument(span)
            .await?;
        let mut out = Vec::with_capacity(chunk.len());
        for tuple in chunk {
            match values.get(tuple.active_target()) {
                Some(ends) => {
                    let mut ends = ends.clone();
                    ends.sort();
                    out.extend(ends.into_iter().map(|end| tuple.with_value(end)));
                }
                None if self.kind == JoinKind::LeftOuter => out.push(tuple.trim_to_target()),
                None => {}
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl PlanNode for BulkedExternalJoin {
    fn name(&self) -> &'static str {
        match self.kind {
            JoinKind::Inner => "BulkedExternalInnerJoin",
            JoinKind::LeftOuter => "BulkedExternalLeftOuterJoin",
        }
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{} in {:?}, bulk {}", self.path, self.view, self.bulk_size))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.input.open(ctx).await?;
        self.buffer.clear();
        self.input_done = false;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        loop {
            while self.buffer.len() < self.bulk_size && !self.input_done {
                match self.input.next_batch(ctx).await? {
                    Some(batch) => self.buffer.extend(batch),
                    None => self.input_done = true,
                }
            }
            if self.buffer.is_empty() {
                self.state = NodeState::Exhausted;
                return Ok(None);
            }
            let take = self.bulk_size.min(self.buffer.len());
            let chunk: Vec<ValidationTuple> = self.buffer.drain(..take).collect();
            let out = self.join_chunk(ctx, chunk).await?;
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.buffer.clear();
        self.state = NodeState::Closed;
    }
}
