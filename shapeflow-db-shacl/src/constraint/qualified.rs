//! `sh:qualifiedValueShape` with `sh:qualifiedMinCount` or
//! `sh:qualifiedMaxCount`
//!
//! Counts, per focus node, the values conforming to the qualified shape.
//! With `sh:qualifiedValueShapesDisjoint` a value that also conforms to a
//! sibling qualified shape does not count.
//!
//! ```text
//! targets (split) ──> join path (split) ──> values as focus (split)
//!        │                                          │
//!        │                     conforming values <──┘
//!        └──> left outer join ──> count per target ──> invalid targets
//! ```

use super::logical::{focus_len, shape_conforming, shape_targets};
use super::{
    chain_could_match, focus_targets, value_path, ConstraintComponent, PlanContext, SourceConstraintComponent,
    TargetOverride,
};
use crate::error::{Result, Unsupported};
use crate::path::DeltaSides;
use crate::plan::{
    BoxedPlanNode, BufferedSplitter, BulkedExternalJoin, ChainAsTarget, GroupByCountFilter, LeftOuterJoin,
    NotValuesIn, ShiftToPropertyShape, Sort, TrimToTarget, Truncate, UnionNode, UniqueKey, UniqueNode, ValueAsFocus,
};
use crate::settings::ValidationApproach;
use crate::shape::ShapeId;
use crate::target::TargetChain;
use crate::tuple::Scope;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifiedBound {
    Min(usize),
    Max(usize),
}

impl QualifiedBound {
    fn violated(&self, n: usize) -> bool {
        match *self {
            QualifiedBound::Min(min) => n < min,
            QualifiedBound::Max(max) => n > max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedConstraint {
    shape: ShapeId,
    bound: QualifiedBound,
    disjoint: bool,
    siblings: Vec<ShapeId>,
}

impl QualifiedConstraint {
    pub fn new(shape: ShapeId, bound: QualifiedBound) -> Self {
        Self {
            shape,
            bound,
            disjoint: false,
            siblings: Vec::new(),
        }
    }

    /// Values conforming to any of `siblings` are not counted
    pub fn disjoint_from(mut self, siblings: Vec<ShapeId>) -> Self {
        self.disjoint = true;
        self.siblings = siblings;
        self
    }

    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    pub fn bound(&self) -> QualifiedBound {
        self.bound
    }

    pub fn is_disjoint(&self) -> bool {
        self.disjoint
    }

    pub fn siblings(&self) -> &[ShapeId] {
        &self.siblings
    }

    pub(crate) fn remap(&mut self, map: &dyn Fn(ShapeId) -> ShapeId) {
        self.shape = map(self.shape);
        for s in &mut self.siblings {
            *s = map(*s);
        }
    }

    fn unsupported_at_node_scope(&self) -> Unsupported {
        Unsupported::new(
            self.source_component().name(),
            Scope::NodeShape,
            ValidationApproach::Transactional,
            "qualified value shapes need a path",
        )
    }

    /// Shapes whose conformance decides what counts
    fn involved(&self) -> Vec<ShapeId> {
        let mut out = vec![self.shape];
        out.extend(self.siblings.iter().copied().filter(|s| *s != self.shape));
        out
    }

    /// Property-scope target tuples to count values for
    fn candidates(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        let own = focus_targets(pc, chain, Scope::PropertyShape, target, DeltaSides::BOTH);
        if target.is_some() {
            return Ok(own);
        }
        // a value changing conformance changes the count of its targets
        let len = focus_len(pc, chain);
        let targets_len = len.saturating_sub(1);
        let mut inputs = vec![own];
        for shape in self.involved() {
            for plan in shape_targets(pc, chain, shape, len)? {
                let target: BoxedPlanNode = Box::new(Truncate::new(plan, targets_len));
                inputs.push(Box::new(ChainAsTarget::new(target)));
            }
        }
        let current = pc
            .effective(chain, Scope::PropertyShape)
            .target_filter(Box::new(UnionNode::new(inputs)));
        Ok(Box::new(UniqueNode::new(current, UniqueKey::TargetChain)))
    }
}

#[async_trait]
impl ConstraintComponent for QualifiedConstraint {
    fn source_component(&self) -> SourceConstraintComponent {
        match self.bound {
            QualifiedBound::Min(_) => SourceConstraintComponent::QualifiedMinCount,
            QualifiedBound::Max(_) => SourceConstraintComponent::QualifiedMaxCount,
        }
    }

    async fn requires_evaluation(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<bool> {
        let _ = scope;
        if chain_could_match(pc, chain, Vec::new()).await? {
            return Ok(true);
        }
        for shape in self.involved() {
            let _guard = pc.enter(shape)?;
            for unit in pc.arena().units(shape, chain) {
                if unit
                    .constraint
                    .component()
                    .requires_evaluation(pc, &unit.chain, unit.scope)
                    .await?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        if scope != Scope::PropertyShape {
            return Err(self.unsupported_at_node_scope().into());
        }
        let path = value_path(chain, scope, self.source_component())?;
        let targets = BufferedSplitter::new(self.candidates(pc, chain, target)?);
        let values = BufferedSplitter::new(Box::new(BulkedExternalJoin::inner(
            targets.plan(),
            path.clone(),
            pc.bulk_size(),
        )));
        let focus = BufferedSplitter::new(Box::new(ValueAsFocus::new(values.plan())));
        let len = focus_len(pc, chain);

        let mut conforming = shape_conforming(pc, chain, self.shape, &focus, len)?;
        if self.disjoint {
            let siblings = self
                .siblings
                .iter()
                .filter(|s| **s != self.shape)
                .map(|s| shape_conforming(pc, chain, *s, &focus, len))
                .collect::<Result<Vec<_>>>()?;
            if !siblings.is_empty() {
                conforming = Box::new(NotValuesIn::new(conforming, Box::new(UnionNode::new(siblings))));
            }
        }

        let counted = LeftOuterJoin::new(targets.plan(), Box::new(ShiftToPropertyShape::new(conforming)));
        let bound = self.bound;
        let label = match bound {
            QualifiedBound::Min(min) => format!("conforming < {}", min),
            QualifiedBound::Max(max) => format!("conforming > {}", max),
        };
        let grouped = GroupByCountFilter::new(Sort::new(Box::new(counted)), label, move |n| bound.violated(n));
        Ok(Box::new(TrimToTarget::new(Box::new(grouped))))
    }

    fn all_targets_plan(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<BoxedPlanNode> {
        if scope != Scope::PropertyShape {
            return Err(self.unsupported_at_node_scope().into());
        }
        self.candidates(pc, chain, None)
    }
}
