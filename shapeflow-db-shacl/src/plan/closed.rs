use super::{Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::tuple::ValidationTuple;
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use shapeflow_db_core::{Iri, TriplePattern};

/// Emits one tuple per statement of a focus node using a predicate outside the allowed set
///
/// Output tuples carry the object as value and the predicate as result path.
pub struct ClosedCheck {
    input: BoxedPlanNode,
    allowed: FxHashSet<Iri>,
    state: NodeState,
}

impl ClosedCheck {
    pub fn new(input: BoxedPlanNode, allowed: FxHashSet<Iri>) -> Self {
        Self {
            input,
            allowed,
            state: NodeState::Created,
        }
    }

    async fn check(&self, ctx: &ConnectionsGroup, batch: Batch) -> Result<Batch> {
        let patterns: Vec<TriplePattern> = batch
            .iter()
            .map(|t| TriplePattern::new(Some(t.active_target().clone()), None, None))
            .collect();
        let found = ctx.current().statements_bulk(&patterns, ctx.data_graph()).await?;
        let mut out = Vec::new();
        for (tuple, statements) in batch.iter().zip(found) {
            let mut bad: Vec<_> = statements
                .into_iter()
                .filter(|st| !self.allowed.contains(&st.predicate))
                .collect();
            bad.sort_by(|a, b| (&a.predicate, &a.object).cmp(&(&b.predicate, &b.object)));
            bad.dedup_by(|a, b| a.predicate == b.predicate && a.object == b.object);
            out.extend(bad.into_iter().map(|st| {
                ValidationTuple::target(tuple.active_target().clone(), tuple.scope(), tuple.contexts().clone())
                    .merge_details(tuple)
                    .with_value(st.object)
                    .with_result_path(st.predicate)
            }));
        }
        Ok(out)
    }
}

#[async_trait]
impl PlanNode for ClosedCheck {
    fn name(&self) -> &'static str {
        "ClosedCheck"
    }

    fn shifts_scope(&self) -> bool {
        true
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{} allowed predicates", self.allowed.len()))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.input.open(ctx).await?;
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
            let out = self.check(ctx, batch).await?;
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.state = NodeState::Closed;
    }
}
