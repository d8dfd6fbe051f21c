use super::{Batch, NodeState, Pending, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::{Result, ShaclError};
use crate::query::ValidationQuery;
use async_trait::async_trait;

/// Runs a bulk validation query through the injected executor
pub struct SparqlSelectNode {
    query: ValidationQuery,
    pending: Pending,
    state: NodeState,
}

impl SparqlSelectNode {
    pub fn new(query: ValidationQuery) -> Self {
        Self {
            query,
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for SparqlSelectNode {
    fn name(&self) -> &'static str {
        "SparqlSelect"
    }

    fn detail(&self) -> Option<String> {
        Some(self.query.to_select().replace('\n', " "))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        let executor = ctx
            .sparql_executor()
            .ok_or_else(|| ShaclError::Query("no query executor configured".to_string()))?;
        let text = self.query.to_select();
        tracing::debug!(query = %text, "running bulk validation query");
        let rows = executor
            .select(&text, ctx.data_graph())
            .await
            .map_err(|e| ShaclError::Query(e.to_string()))?;
        let tuples = rows
            .iter()
            .map(|row| self.query.tuple(row, ctx.contexts()))
            .collect::<Result<Vec<_>>>()?;
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
