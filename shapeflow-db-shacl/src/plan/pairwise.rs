//! Property pair comparison
//!
//! Compares, per focus node, the values of the shape's path with the
//! values of another predicate.

use super::{Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::path::Path;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use shapeflow_db_core::{compare_terms, Iri, Term};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairwiseKind {
    Equals,
    Disjoint,
    LessThan,
    LessThanOrEquals,
}

impl PairwiseKind {
    /// The values of `own` violating the pair constraint against `other`
    pub fn violations(&self, own: &[Term], other: &[Term]) -> Vec<Term> {
        let mut out: Vec<Term> = match self {
            PairwiseKind::Equals => own
                .iter()
                .filter(|v| !other.contains(v))
                .chain(other.iter().filter(|w| !own.contains(w)))
                .cloned()
                .collect(),
            PairwiseKind::Disjoint => own.iter().filter(|v| other.contains(v)).cloned().collect(),
            PairwiseKind::LessThan => own
                .iter()
                .filter(|v| other.iter().any(|w| compare_terms(v, w) != Some(Ordering::Less)))
                .cloned()
                .collect(),
            PairwiseKind::LessThanOrEquals => own
                .iter()
                .filter(|v| {
                    other
                        .iter()
                        .any(|w| !matches!(compare_terms(v, w), Some(Ordering::Less | Ordering::Equal)))
                })
                .cloned()
                .collect(),
        };
        out.sort();
        out.dedup();
        out
    }
}

pub struct PairwiseCheck {
    input: BoxedPlanNode,
    path: Option<Path>,
    other: Path,
    kind: PairwiseKind,
    bulk_size: usize,
    input_done: bool,
    state: NodeState,
}

impl PairwiseCheck {
    /// `path` is `None` at node scope, where the focus node is the only value
    pub fn new(input: BoxedPlanNode, path: Option<Path>, other: Iri, kind: PairwiseKind, bulk_size: usize) -> Self {
        Self {
            input,
            path,
            other: Path::Predicate(other),
            kind,
            bulk_size: bulk_size.max(1),
            input_done: false,
            state: NodeState::Created,
        }
    }

    async fn check(&self, ctx: &ConnectionsGroup, chunk: Vec<ValidationTuple>) -> Result<Batch> {
        let targets: Vec<Term> = chunk.iter().map(|t| t.active_target().clone()).collect();
        let graphs = ctx.data_graph();
        let own: FxHashMap<Term, Vec<Term>> = match &self.path {
            Some(path) => path.evaluate_chunked(ctx.current(), graphs, &targets, self.bulk_size, true).await?,
            None => targets.iter().map(|t| (t.clone(), vec![t.clone()])).collect(),
        };
        let other = self
            .other
            .evaluate_chunked(ctx.current(), graphs, &targets, self.bulk_size, true)
            .await?;
        let empty = Vec::new();
        let mut out = Vec::new();
        for tuple in chunk {
            let focus = tuple.active_target();
            let bad = self.kind.violations(
                own.get(focus).unwrap_or(&empty),
                other.get(focus).unwrap_or(&empty),
            );
            match tuple.scope() {
                Scope::NodeShape => {
                    if !bad.is_empty() {
                        out.push(tuple.clone());
                    }
                }
                Scope::PropertyShape => out.extend(bad.into_iter().map(|v| tuple.with_value(v))),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl PlanNode for PairwiseCheck {
    fn name(&self) -> &'static str {
        "PairwiseCheck"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{:?} {}", self.kind, self.other))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.input.open(ctx).await?;
        self.input_done = false;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        loop {
            let mut chunk = Vec::new();
            while chunk.len() < self.bulk_size && !self.input_done {
                match self.input.next_batch(ctx).await? {
                    Some(batch) => chunk.extend(batch),
                    None => self.input_done = true,
                }
            }
            if chunk.is_empty() {
                self.state = NodeState::Exhausted;
                return Ok(None);
            }
            let out = self.check(ctx, chunk).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_support::*;
    use crate::plan::{collect, ValuesNode};
    use shapeflow_db_core::Statement;

    #[test]
    fn test_violation_sets() {
        let one = Term::integer(1);
        let two = Term::integer(2);
        let three = Term::integer(3);
        assert_eq!(
            PairwiseKind::Equals.violations(&[one.clone(), two.clone()], &[two.clone(), three.clone()]),
            vec![one.clone(), three.clone()]
        );
        assert_eq!(PairwiseKind::Disjoint.violations(&[one.clone(), two.clone()], &[two.clone()]), vec![two.clone()]);
        assert_eq!(PairwiseKind::LessThan.violations(&[one.clone(), two.clone()], &[two.clone()]), vec![two.clone()]);
        assert!(PairwiseKind::LessThanOrEquals.violations(&[one.clone(), two.clone()], &[two.clone()]).is_empty());
        // Incomparable values violate ordering constraints
        assert_eq!(
            PairwiseKind::LessThan.violations(&[Term::string("a")], &[three]),
            vec![Term::string("a")]
        );
    }

    #[tokio::test]
    async fn test_emits_each_violating_value() {
        let st = |s: &str, p: &str, o: i64| Statement::new(t(s), Iri::new(format!("http://x/{}", p)), Term::integer(o));
        let ctx = ctx_with(vec![st("a", "start", 5), st("a", "start", 1), st("a", "end", 3)], vec![], vec![]).await;
        let mut check = PairwiseCheck::new(
            Box::new(ValuesNode::new(vec![bare("a")])),
            Some(Path::predicate("http://x/start")),
            Iri::new("http://x/end"),
            PairwiseKind::LessThan,
            10,
        );
        let out = collect(&mut check, &ctx, None).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value(), Some(&Term::integer(5)));
    }
}
