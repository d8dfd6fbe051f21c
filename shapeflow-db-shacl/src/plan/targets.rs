//! Target chain leaves and extensions
//!
//! These nodes compute their output when they open, through the bulk chain
//! operations of [`EffectiveTarget`], and emit it in order of target chain.

use super::{drain_open, Batch, BoxedPlanNode, NodeState, Pending, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::effective::{Chain, EffectiveTarget};
use crate::error::Result;
use crate::path::{DeltaNodes, DeltaSides, Path};
use crate::tuple::ValidationTuple;
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use shapeflow_db_core::Term;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Every chain in the post-transaction state
    All,
    /// Chains touched by the transaction
    Delta { include_removed: bool },
}

/// Which end of the chain the source tuples fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source active targets are chain ends; walk back to the root
    Left,
    /// Source target chains are prefixes; walk forward to full length
    Right,
}

fn emit(pending: &mut Pending, state: &mut NodeState) -> Result<Option<Batch>> {
    if !state.check_next()? {
        return Ok(None);
    }
    let batch = pending.next_batch();
    if batch.is_none() {
        *state = NodeState::Exhausted;
    }
    Ok(batch)
}

fn into_tuples(target: &EffectiveTarget, ctx: &ConnectionsGroup, mut chains: Vec<Chain>) -> Vec<ValidationTuple> {
    chains.sort();
    chains.into_iter().map(|c| target.tuple(c, ctx)).collect()
}

pub struct TargetChainNode {
    target: Arc<EffectiveTarget>,
    mode: TargetMode,
    pending: Pending,
    state: NodeState,
}

impl TargetChainNode {
    pub fn new(target: Arc<EffectiveTarget>, mode: TargetMode) -> Self {
        Self {
            target,
            mode,
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for TargetChainNode {
    fn name(&self) -> &'static str {
        "TargetChain"
    }

    fn detail(&self) -> Option<String> {
        let mode = match self.mode {
            TargetMode::All => "All",
            TargetMode::Delta { include_removed: true } => "Delta+removed",
            TargetMode::Delta { include_removed: false } => "Delta",
        };
        Some(format!("{} {} {:?}", mode, self.target.target().name(), self.target.scope()))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        let start = Instant::now();
        let chains = match self.mode {
            TargetMode::All => self.target.all_chains(ctx).await?,
            TargetMode::Delta { include_removed } => self.target.delta_chains(ctx, include_removed).await?,
        };
        tracing::trace!(
            mode = ?self.mode,
            chains = chains.len(),
            ms = start.elapsed().as_millis() as u64,
            "target chains"
        );
        self.pending = Pending::new(into_tuples(&self.target, ctx, chains));
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, _ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        emit(&mut self.pending, &mut self.state)
    }

    fn close(&mut self) {
        self.pending = Pending::default();
        self.state = NodeState::Closed;
    }
}

/// Full chains reached from the source's tuples
pub struct ExtendNode {
    target: Arc<EffectiveTarget>,
    source: BoxedPlanNode,
    direction: Direction,
    pending: Pending,
    state: NodeState,
}

impl ExtendNode {
    pub fn new(target: Arc<EffectiveTarget>, source: BoxedPlanNode, direction: Direction) -> Self {
        Self {
            target,
            source,
            direction,
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for ExtendNode {
    fn name(&self) -> &'static str {
        match self.direction {
            Direction::Left => "ExtendLeft",
            Direction::Right => "ExtendRight",
        }
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.source.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{} {:?}", self.target.target().name(), self.target.scope()))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.source.open(ctx).await?;
        let drained = drain_open(self.source.as_mut(), ctx).await;
        self.source.close();
        let source = drained?;
        let chains = match self.direction {
            Direction::Left => {
                let nodes: Vec<Term> = source
                    .iter()
                    .map(|t| t.active_target().clone())
                    .collect::<FxHashSet<_>>()
                    .into_iter()
                    .collect();
                self.target.extend_left(ctx, &nodes).await?
            }
            Direction::Right => {
                let prefixes: Vec<Chain> = source.iter().map(|t| t.target_chain().to_vec()).collect();
                self.target.extend_right(ctx, prefixes).await?
            }
        };
        self.pending = Pending::new(into_tuples(&self.target, ctx, chains));
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, _ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        emit(&mut self.pending, &mut self.state)
    }

    fn close(&mut self) {
        self.source.close();
        self.pending = Pending::default();
        self.state = NodeState::Closed;
    }
}

/// Source tuples whose target chain is a current chain of the target
pub struct TargetFilterNode {
    target: Arc<EffectiveTarget>,
    source: BoxedPlanNode,
    state: NodeState,
}

impl TargetFilterNode {
    pub fn new(target: Arc<EffectiveTarget>, source: BoxedPlanNode) -> Self {
        Self {
            target,
            source,
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for TargetFilterNode {
    fn name(&self) -> &'static str {
        "TargetFilter"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.source.as_ref()]
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.source.open(ctx).await?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        let full = self.target.chain_len();
        loop {
            let Some(batch) = self.source.next_batch(ctx).await? else {
                self.state = NodeState::Exhausted;
                return Ok(None);
            };
            let candidates: Vec<Chain> = batch
                .iter()
                .map(|t| t.target_chain().to_vec())
                .filter(|c| c.len() == full)
                .collect();
            let valid: FxHashSet<Chain> = self.target.verify(ctx, candidates).await?.into_iter().collect();
            let out: Batch = batch
                .into_iter()
                .filter(|t| valid.contains(t.target_chain()))
                .collect();
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
    }

    fn close(&mut self) {
        self.source.close();
        self.state = NodeState::Closed;
    }
}

/// Target tuples whose active target gained or lost values along a path
///
/// Paths that cannot be seeded from statements yield every target.
pub struct PathDeltaNode {
    target: Arc<EffectiveTarget>,
    path: Path,
    sides: DeltaSides,
    pending: Pending,
    state: NodeState,
}

impl PathDeltaNode {
    pub fn new(target: Arc<EffectiveTarget>, path: Path, sides: DeltaSides) -> Self {
        Self {
            target,
            path,
            sides,
            pending: Pending::default(),
            state: NodeState::Created,
        }
    }
}

#[async_trait]
impl PlanNode for PathDeltaNode {
    fn name(&self) -> &'static str {
        "PathDelta"
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{} added={} removed={}", self.path, self.sides.added, self.sides.removed))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        let chains = match self.path.delta_nodes(ctx, self.sides).await? {
            DeltaNodes::All => self.target.all_chains(ctx).await?,
            DeltaNodes::Nodes(nodes) if nodes.is_empty() => Vec::new(),
            DeltaNodes::Nodes(nodes) => self.target.extend_left(ctx, &nodes).await?,
        };
        self.pending = Pending::new(into_tuples(&self.target, ctx, chains));
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, _ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        emit(&mut self.pending, &mut self.state)
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
    use crate::plan::{collect, ValuesNode};
    use crate::target::Target;
    use crate::tuple::Scope;
    use shapeflow_db_core::{Iri, Statement};
    use shapeflow_vocab::rdf;

    fn typed(s: &str) -> Statement {
        Statement::new(t(s), Iri::new(rdf::TYPE), t("Person"))
    }

    fn name(s: &str, o: &str) -> Statement {
        Statement::new(t(s), Iri::new("http://x/name"), Term::string(o))
    }

    fn people(scope: Scope) -> Arc<EffectiveTarget> {
        Arc::new(EffectiveTarget::new(
            Target::Class(Iri::new("http://x/Person")),
            vec![],
            Some(Path::predicate("http://x/name")),
            scope,
            10,
        ))
    }

    #[tokio::test]
    async fn test_path_delta_finds_targets_with_changed_values() {
        let ctx = ctx_with(
            vec![typed("a"), typed("b"), name("a", "x")],
            vec![name("b", "y"), name("z", "q")],
            vec![name("a", "x")],
        )
        .await;
        let target = people(Scope::PropertyShape);
        let mut delta = target.path_delta(Path::predicate("http://x/name"), DeltaSides::BOTH);
        let out = collect(delta.as_mut(), &ctx, None).await.unwrap();
        assert_eq!(chains(&out), vec![vec![t("a")], vec![t("b")]]);

        let mut added = target.path_delta(Path::predicate("http://x/name"), DeltaSides::ADDED);
        let out = collect(added.as_mut(), &ctx, None).await.unwrap();
        assert_eq!(chains(&out), vec![vec![t("b")]]);
    }

    #[tokio::test]
    async fn test_extend_right_and_target_filter() {
        let ctx = ctx_with(vec![typed("a")], vec![], vec![]).await;
        let target = people(Scope::NodeShape);
        let source = || -> BoxedPlanNode { Box::new(ValuesNode::new(vec![node(&["a"]), node(&["q"])])) };
        let mut right = target.extend(source(), Direction::Right, true);
        assert_eq!(chains(&collect(right.as_mut(), &ctx, None).await.unwrap()), vec![vec![t("a")]]);
        let mut filtered = target.target_filter(source());
        assert_eq!(chains(&collect(filtered.as_mut(), &ctx, None).await.unwrap()), vec![vec![t("a")]]);
    }
}
