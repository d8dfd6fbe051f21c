//! Sorting and per-target grouping
//!
//! Grouping nodes consume a [`Sort`], so tuples sharing a target chain are
//! adjacent. A group that starts with a chain ordered before the previous
//! group's chain fails with [`ShaclError::UnorderedGroupInput`].

use super::{drain_open, Batch, BoxedPlanNode, NodeState, Pending, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::{Result, ShaclError};
use crate::tuple::{compare_target_chain, ValidationTuple};
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Materializes its input ordered by target chain, then value
pub struct Sort {
    input: BoxedPlanNode,
    pending: Pending,
    state: NodeState,
}

impl Sort {
    pub fn new(input: BoxedPlanNode) -> Self {
        Self {
            input,
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for Sort {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        let span = tracing::trace_span!("sort", tuples = tracing::field::Empty, ms = tracing::field::Empty);
        let mut tuples = async {
            let span = tracing::Span::current();
            let start = Instant::now();
            self.input.open(ctx).await?;
            let drained = drain_open(self.input.as_mut(), ctx).await;
            self.input.close();
            let mut tuples = drained?;
            tuples.sort_by(compare_target_chain);
            span.record("tuples", tuples.len() as u64);
            span.record("ms", start.elapsed().as_millis() as u64);
            Ok::<_, ShaclError>(tuples)
        }
        .instrument(span)
        .await?;
        tuples.shrink_to_fit();
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
        self.input.close();
        self.pending = Pending::default();
        self.state = NodeState::Closed;
    }
}

/// Predicate over one group of tuples sharing a target chain
pub type GroupPredicate = Arc<dyn Fn(&[ValidationTuple]) -> bool + Send + Sync>;

/// How [`GroupByCountFilter`] counts a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// Distinct values among tuples that carry one
    DistinctValues,
    /// Tuples that carry a value, duplicates included
    Tuples,
}

/// Streams groups of adjacent tuples with the same target chain
struct Grouper {
    input: Sort,
    group: Vec<ValidationTuple>,
    buffered: std::vec::IntoIter<ValidationTuple>,
    input_done: bool,
    node: &'static str,
}

impl Grouper {
    fn new(input: Sort, node: &'static str) -> Self {
        Self {
            input,
            group: Vec::new(),
            buffered: Vec::new().into_iter(),
            input_done: false,
            node,
        }
    }

    /// The next complete group, or `None` at end of input
    async fn next_group(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Vec<ValidationTuple>>> {
        loop {
            let next = match self.buffered.next() {
                Some(t) => Some(t),
                None if self.input_done => None,
                None => match self.input.next_batch(ctx).await? {
                    Some(batch) => {
                        self.buffered = batch.into_iter();
                        continue;
                    }
                    None => {
                        self.input_done = true;
                        None
                    }
                },
            };
            let Some(tuple) = next else {
                if self.group.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.group)));
            };
            let Some(first) = self.group.first() else {
                self.group.push(tuple);
                continue;
            };
            match tuple.target_chain().cmp(first.target_chain()) {
                Ordering::Equal => self.group.push(tuple),
                Ordering::Greater => {
                    let done = std::mem::replace(&mut self.group, vec![tuple]);
                    return Ok(Some(done));
                }
                Ordering::Less => return Err(ShaclError::UnorderedGroupInput { node: self.node }),
            }
        }
    }
}

/// First tuple of the group, carrying every detail in the group
fn representative(group: &[ValidationTuple]) -> Option<ValidationTuple> {
    let (first, rest) = group.split_first()?;
    Some(rest.iter().fold(first.clone(), |acc, t| acc.merge_details(t)))
}

async fn filtered_groups(
    grouper: &mut Grouper,
    ctx: &ConnectionsGroup,
    keep: &(dyn Fn(&[ValidationTuple]) -> bool + Send + Sync),
) -> Result<Option<Batch>> {
    let mut out = Vec::new();
    while let Some(group) = grouper.next_group(ctx).await? {
        if keep(&group) {
            out.extend(representative(&group));
            if out.len() >= super::OUTPUT_BATCH_SIZE {
                break;
            }
        }
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}

/// Emits one tuple per target chain whose group satisfies the predicate
pub struct GroupByFilter {
    grouper: Grouper,
    predicate: GroupPredicate,
    state: NodeState,
}

impl GroupByFilter {
    pub fn new(input: Sort, predicate: GroupPredicate) -> Self {
        Self {
            grouper: Grouper::new(input, "GroupByFilter"),
            predicate,
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for GroupByFilter {
    fn name(&self) -> &'static str {
        "GroupByFilter"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![&self.grouper.input]
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.grouper.input.open(ctx).await?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        let predicate = self.predicate.clone();
        let batch = filtered_groups(&mut self.grouper, ctx, predicate.as_ref()).await?;
        if batch.is_none() {
            self.state = NodeState::Exhausted;
        }
        Ok(batch)
    }

    fn close(&mut self) {
        self.grouper.input.close();
        self.grouper.group.clear();
        self.state = NodeState::Closed;
    }
}

/// Emits one tuple per target chain whose value count satisfies the predicate
pub struct GroupByCountFilter {
    grouper: Grouper,
    mode: CountMode,
    predicate: Arc<dyn Fn(usize) -> bool + Send + Sync>,
    label: String,
    state: NodeState,
}

impl GroupByCountFilter {
    /// Count distinct values
    pub fn new(input: Sort, label: impl Into<String>, predicate: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            grouper: Grouper::new(input, "GroupByCountFilter"),
            mode: CountMode::DistinctValues,
            predicate: Arc::new(predicate),
            label: label.into(),
            state: NodeState::Created,
        }
    }

    pub fn counting(mut self, mode: CountMode) -> Self {
        self.mode = mode;
        self
    }
}

fn count(group: &[ValidationTuple], mode: CountMode) -> usize {
    let with_value = group.iter().filter(|t| t.has_value()).filter_map(|t| t.value());
    match mode {
        CountMode::DistinctValues => with_value.collect::<FxHashSet<_>>().len(),
        CountMode::Tuples => with_value.count(),
    }
}

#[async_trait]
impl PlanNode for GroupByCountFilter {
    fn name(&self) -> &'static str {
        "GroupByCountFilter"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![&self.grouper.input]
    }

    fn detail(&self) -> Option<String> {
        Some(self.label.clone())
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.grouper.input.open(ctx).await?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        let predicate = self.predicate.clone();
        let mode = self.mode;
        let keep = move |group: &[ValidationTuple]| predicate(count(group, mode));
        let batch = filtered_groups(&mut self.grouper, ctx, &keep).await?;
        if batch.is_none() {
            self.state = NodeState::Exhausted;
        }
        Ok(batch)
    }

    fn close(&mut self) {
        self.grouper.input.close();
        self.grouper.group.clear();
        self.state = NodeState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_support::*;
    use crate::plan::{collect, ValuesNode};

    fn sorted(tuples: Vec<ValidationTuple>) -> Sort {
        Sort::new(Box::new(ValuesNode::new(tuples)))
    }

    #[tokio::test]
    async fn test_count_filter_boundaries() {
        let ctx = empty_ctx().await;
        let input = || {
            sorted(vec![
                prop("b", "v1"),
                prop("a", "v1"),
                prop("b", "v2"),
                prop("a", "v1"),
                bare("c"),
            ])
        };
        let mut below_two = GroupByCountFilter::new(input(), "count < 2", |n| n < 2);
        let out = collect(&mut below_two, &ctx, None).await.unwrap();
        let targets: Vec<_> = out.iter().map(|t| t.active_target().clone()).collect();
        assert_eq!(targets, vec![t("a"), t("c")]);

        let mut tuples = GroupByCountFilter::new(input(), "count >= 2", |n| n >= 2).counting(CountMode::Tuples);
        let out = collect(&mut tuples, &ctx, None).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_group_filter_merges_details() {
        let ctx = empty_ctx().await;
        let mut filter = GroupByFilter::new(
            sorted(vec![prop("a", "v1"), prop("a", "v2"), prop("b", "v1")]),
            Arc::new(|group: &[ValidationTuple]| group.len() > 1),
        );
        let out = collect(&mut filter, &ctx, None).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].active_target(), &t("a"));
    }

    #[tokio::test]
    async fn test_grouper_rejects_unordered_input() {
        let ctx = empty_ctx().await;
        let mut grouper = Grouper::new(sorted(vec![]), "test");
        grouper.input.open(&ctx).await.unwrap();
        grouper.buffered = vec![prop("b", "v"), prop("a", "v")].into_iter();
        let result = grouper.next_group(&ctx).await;
        assert!(matches!(result, Err(ShaclError::UnorderedGroupInput { node: "test" })));
    }
}
