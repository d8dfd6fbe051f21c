//! Shared upstream for several consumers
//!
//! Plan nodes are single-consumer. A [`BufferedSplitter`] runs its source
//! once, on the first reader's `open`, and every reader replays the
//! buffered output independently.

use super::{collect, Batch, BoxedPlanNode, NodeState, Pending, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::{Result, ShaclError};
use crate::tuple::ValidationTuple;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;

struct Shared {
    source: Mutex<Option<BoxedPlanNode>>,
    source_name: &'static str,
    buffer: OnceCell<Arc<[ValidationTuple]>>,
}

#[derive(Clone)]
pub struct BufferedSplitter {
    shared: Arc<Shared>,
}

impl BufferedSplitter {
    pub fn new(source: BoxedPlanNode) -> Self {
        let source_name = source.name();
        Self {
            shared: Arc::new(Shared {
                source: Mutex::new(Some(source)),
                source_name,
                buffer: OnceCell::new(),
            }),
        }
    }

    /// A fresh reader over the shared output
    pub fn plan(&self) -> BoxedPlanNode {
        Box::new(SplitterReader {
            shared: self.shared.clone(),
            pending: Pending::default(),
            state: NodeState::Created,
        })
    }

    async fn buffered(&self, ctx: &ConnectionsGroup) -> Result<Arc<[ValidationTuple]>> {
        let shared = &self.shared;
        let buffer = shared
            .buffer
            .get_or_try_init(|| async {
                let source = shared.source.lock().take();
                let Some(mut source) = source else {
                    return Err(ShaclError::Internal(
                        "splitter source failed on an earlier read".to_string(),
                    ));
                };
                let tuples = collect(source.as_mut(), ctx, None).await?;
                tracing::trace!(source = shared.source_name, tuples = tuples.len(), "splitter buffered");
                Ok(Arc::from(tuples))
            })
            .await?;
        Ok(buffer.clone())
    }
}

struct SplitterReader {
    shared: Arc<Shared>,
    pending: Pending,
    state: NodeState,
}

#[async_trait]
impl PlanNode for SplitterReader {
    fn name(&self) -> &'static str {
        "BufferedSplitter"
    }

    fn detail(&self) -> Option<String> {
        Some(format!("shared {}", self.shared.source_name))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        let splitter = BufferedSplitter {
            shared: self.shared.clone(),
        };
        let tuples = splitter.buffered(ctx).await?;
        self.pending = Pending::new(tuples.to_vec());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_support::*;
    use crate::plan::{NotValuesIn, ValuesNode};

    #[tokio::test]
    async fn test_readers_replay_one_run() {
        let ctx = empty_ctx().await;
        let splitter = BufferedSplitter::new(Box::new(ValuesNode::new(vec![node(&["a"]), node(&["b"])])));
        let mut a = splitter.plan();
        let mut b = splitter.plan();
        assert_eq!(collect(a.as_mut(), &ctx, None).await.unwrap().len(), 2);
        assert_eq!(collect(b.as_mut(), &ctx, None).await.unwrap().len(), 2);

        // Both sides of one node may read the same splitter
        let mut self_minus = NotValuesIn::new(splitter.plan(), splitter.plan());
        assert!(collect(&mut self_minus, &ctx, None).await.unwrap().is_empty());
    }
}
