//! Value filters

use super::{Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::{ConnectionsGroup, StoreView};
use crate::error::Result;
use crate::tuple::ValidationTuple;
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use shapeflow_db_core::{Iri, Term, TriplePattern};
use shapeflow_vocab::rdf;
use std::sync::Arc;

/// Whether a tuple passes a constraint
pub type TuplePredicate = Arc<dyn Fn(&ValidationTuple) -> bool + Send + Sync>;

/// Which side of a filter is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    Passing,
    Failing,
}

/// In-memory filter on each tuple
pub struct FilterNode {
    input: BoxedPlanNode,
    predicate: TuplePredicate,
    keep: Keep,
    label: String,
    state: NodeState,
}

impl FilterNode {
    /// Emit the tuples failing `predicate`
    pub fn failing(input: BoxedPlanNode, label: impl Into<String>, predicate: TuplePredicate) -> Self {
        Self::new(input, label, predicate, Keep::Failing)
    }

    /// Emit the tuples passing `predicate`
    pub fn passing(input: BoxedPlanNode, label: impl Into<String>, predicate: TuplePredicate) -> Self {
        Self::new(input, label, predicate, Keep::Passing)
    }

    fn new(input: BoxedPlanNode, label: impl Into<String>, predicate: TuplePredicate, keep: Keep) -> Self {
        Self {
            input,
            predicate,
            keep,
            label: label.into(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for FilterNode {
    fn name(&self) -> &'static str {
        match self.keep {
            Keep::Passing => "FilterPassing",
            Keep::Failing => "FilterFailing",
        }
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(self.label.clone())
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
        let want = self.keep == Keep::Passing;
        loop {
            let Some(batch) = self.input.next_batch(ctx).await? else {
                self.state = NodeState::Exhausted;
                return Ok(None);
            };
            let out: Batch = batch
                .into_iter()
                .filter(|t| (self.predicate)(t) == want)
                .collect();
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

/// Filter on whether each tuple's value is an instance of a class
///
/// One bulk `rdf:type` lookup per input batch. Subclasses are included
/// when the run has a reasoner.
pub struct ExternalFilterByType {
    input: BoxedPlanNode,
    class: Iri,
    view: StoreView,
    keep: Keep,
    state: NodeState,
}

impl ExternalFilterByType {
    /// Emit tuples whose value is not an instance of `class`
    pub fn failing(input: BoxedPlanNode, class: Iri) -> Self {
        Self {
            input,
            class,
            view: StoreView::Current,
            keep: Keep::Failing,
            state: NodeState::Created,
        }
    }

    /// Emit tuples whose value is an instance of `class`
    pub fn passing(input: BoxedPlanNode, class: Iri) -> Self {
        Self {
            keep: Keep::Passing,
            ..Self::failing(input, class)
        }
    }

    async fn instances(&self, ctx: &ConnectionsGroup, values: &[Term]) -> Result<FxHashSet<Term>> {
        let classes: FxHashSet<Term> = ctx.expand_class(&self.class).into_iter().map(Term::Iri).collect();
        let patterns: Vec<TriplePattern> = values
            .iter()
            .map(|v| TriplePattern::subject_predicate(v.clone(), Iri::new(rdf::TYPE)))
            .collect();
        let found = ctx.view(self.view).statements_bulk(&patterns, ctx.data_graph()).await?;
        Ok(values
            .iter()
            .zip(found)
            .filter(|(_, sts)| sts.iter().any(|st| classes.contains(&st.object)))
            .map(|(v, _)| v.clone())
            .collect())
    }
}

#[async_trait]
impl PlanNode for ExternalFilterByType {
    fn name(&self) -> &'static str {
        "ExternalFilterByType"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{:?} {}", self.keep, self.class))
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
        let want = self.keep == Keep::Passing;
        loop {
            let Some(batch) = self.input.next_batch(ctx).await? else {
                self.state = NodeState::Exhausted;
                return Ok(None);
            };
            let values: Vec<Term> = batch
                .iter()
                .filter_map(|t| t.value().cloned())
                .collect::<FxHashSet<_>>()
                .into_iter()
                .collect();
            let instances = self.instances(ctx, &values).await?;
            let out: Batch = batch
                .into_iter()
                .filter(|t| t.value().map_or(false, |v| instances.contains(v)) == want)
                .collect();
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
