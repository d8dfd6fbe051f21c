use super::{Batch, BoxedPlanNode, NodeState, PlanNode, UniqueKey, UniqueNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use async_trait::async_trait;

/// Concatenation of its inputs, in input order
pub struct UnionNode {
    inputs: Vec<BoxedPlanNode>,
    current: usize,
    state: NodeState,
}

impl UnionNode {
    pub fn new(inputs: Vec<BoxedPlanNode>) -> Self {
        Self {
            inputs,
            current: 0,
            state: NodeState::Created,
        }
    }

    /// Union followed by full-tuple deduplication
    pub fn dedupe(inputs: Vec<BoxedPlanNode>) -> UniqueNode {
        UniqueNode::new(Box::new(Self::new(inputs)), UniqueKey::Full)
    }
}

#[async_trait]
impl PlanNode for UnionNode {
    fn name(&self) -> &'static str {
        "Union"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        self.inputs.iter().map(|i| i.as_ref() as &dyn PlanNode).collect()
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        for i in 0..self.inputs.len() {
            if let Err(e) = self.inputs[i].open(ctx).await {
                for opened in &mut self.inputs[..=i] {
                    opened.close();
                }
                return Err(e);
            }
        }
        self.current = 0;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        while self.current < self.inputs.len() {
            match self.inputs[self.current].next_batch(ctx).await? {
                Some(batch) => return Ok(Some(batch)),
                None => {
                    self.inputs[self.current].close();
                    self.current += 1;
                }
            }
        }
        self.state = NodeState::Exhausted;
        Ok(None)
    }

    fn close(&mut self) {
        for input in &mut self.inputs {
            input.close();
        }
        self.state = NodeState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_support::*;
    use crate::plan::{collect, EmptyNode, ValuesNode};

    #[tokio::test]
    async fn test_union_concatenates_and_dedupes() {
        let ctx = empty_ctx().await;
        let inputs = || -> Vec<BoxedPlanNode> {
            vec![
                Box::new(ValuesNode::new(vec![node(&["a"]), node(&["b"])])),
                Box::new(EmptyNode::new()),
                Box::new(ValuesNode::new(vec![node(&["a"])])),
            ]
        };
        let mut plain = UnionNode::new(inputs());
        assert_eq!(collect(&mut plain, &ctx, None).await.unwrap().len(), 3);

        let mut deduped = UnionNode::dedupe(inputs());
        let out = collect(&mut deduped, &ctx, None).await.unwrap();
        assert_eq!(chains(&out), vec![vec![t("a")], vec![t("b")]]);
    }
}
