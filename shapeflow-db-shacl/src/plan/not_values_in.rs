use super::{drain_open, Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use shapeflow_db_core::Term;

/// Source tuples whose chain does not occur in the excluded input
///
/// The excluded input is materialized when the node opens.
pub struct NotValuesIn {
    source: BoxedPlanNode,
    exclude: BoxedPlanNode,
    excluded: FxHashSet<Vec<Term>>,
    state: NodeState,
}

impl NotValuesIn {
    pub fn new(source: BoxedPlanNode, exclude: BoxedPlanNode) -> Self {
        Self {
            source,
            exclude,
            excluded: FxHashSet::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for NotValuesIn {
    fn name(&self) -> &'static str {
        "NotValuesIn"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.source.as_ref(), self.exclude.as_ref()]
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.exclude.open(ctx).await?;
        let excluded = drain_open(self.exclude.as_mut(), ctx).await;
        self.exclude.close();
        self.excluded = excluded?.iter().map(|t| t.chain().to_vec()).collect();
        self.source.open(ctx).await?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        loop {
            let Some(batch) = self.source.next_batch(ctx).await? else {
                self.state = NodeState::Exhausted;
                return Ok(None);
            };
            let out: Batch = batch
                .into_iter()
                .filter(|t| !self.excluded.contains(t.chain()))
                .collect();
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    fn close(&mut self) {
        self.source.close();
        self.exclude.close();
        self.excluded.clear();
        self.state = NodeState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_support::*;
    use crate::plan::{collect, ValuesNode};

    #[tokio::test]
    async fn test_excludes_matching_chains() {
        let ctx = empty_ctx().await;
        let mut not_in = NotValuesIn::new(
            Box::new(ValuesNode::new(vec![node(&["a", "v"]), node(&["a", "w"]), node(&["b"])])),
            Box::new(ValuesNode::new(vec![node(&["a", "w"]), node(&["c"])])),
        );
        let out = collect(&mut not_in, &ctx, None).await.unwrap();
        assert_eq!(chains(&out), vec![vec![t("a"), t("v")], vec![t("b")]]);
    }
}
