//! `sh:closed`
//!
//! A focus node may only use the predicates of its shape's property shapes
//! plus `sh:ignoredProperties`. New statements on an existing node can
//! break it, so besides the delta targets every subject of an added
//! statement is walked back to the targets it belongs to.

use super::{focus_targets, ConstraintComponent, PlanContext, SourceConstraintComponent, TargetOverride};
use crate::connections::{ConnectionsGroup, StoreView};
use crate::error::{Result, Unsupported};
use crate::matcher::{Role, StatementMatcher};
use crate::path::DeltaSides;
use crate::plan::{
    BoxedPlanNode, ClosedCheck, Direction, TupleMapper, UnionNode, UniqueKey, UniqueNode, UnorderedSelect,
};
use crate::settings::ValidationApproach;
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use shapeflow_db_core::{Iri, Statement, TriplePattern};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedConstraint {
    ignored: Vec<Iri>,
    allowed: FxHashSet<Iri>,
}

impl ClosedConstraint {
    /// Only the ignored predicates are allowed until the shape's property
    /// predicates are added by [`ClosedConstraint::allow`]
    pub fn new(ignored: Vec<Iri>) -> Self {
        let allowed = ignored.iter().cloned().collect();
        Self { ignored, allowed }
    }

    pub(crate) fn allow(&mut self, predicates: impl IntoIterator<Item = Iri>) {
        self.allowed.extend(predicates);
    }

    pub fn ignored(&self) -> &[Iri] {
        &self.ignored
    }

    pub fn allowed(&self) -> &FxHashSet<Iri> {
        &self.allowed
    }

    fn candidates(&self, pc: &PlanContext<'_>, chain: &TargetChain, target: Option<&TargetOverride>) -> BoxedPlanNode {
        let targets = focus_targets(pc, chain, Scope::NodeShape, target, DeltaSides::ADDED);
        if target.is_some() {
            return targets;
        }
        let mapper: TupleMapper = Arc::new(|st: &Statement, ctx: &ConnectionsGroup| {
            Some(ValidationTuple::target(
                st.subject.clone(),
                Scope::NodeShape,
                ctx.contexts().clone(),
            ))
        });
        let subjects = Box::new(UnorderedSelect::new(StoreView::Added, vec![TriplePattern::any()], mapper));
        let touched = pc
            .effective(chain, Scope::NodeShape)
            .extend(subjects, Direction::Left, true);
        Box::new(UniqueNode::new(
            Box::new(UnionNode::new(vec![targets, touched])),
            UniqueKey::TargetChain,
        ))
    }
}

#[async_trait]
impl ConstraintComponent for ClosedConstraint {
    fn source_component(&self) -> SourceConstraintComponent {
        SourceConstraintComponent::Closed
    }

    async fn requires_evaluation(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<bool> {
        let _ = scope;
        let any = StatementMatcher::new(
            Role::Var(pc.vars().next()),
            Role::Var(pc.vars().next()),
            Role::Var(pc.vars().next()),
        );
        super::chain_could_match(pc, chain, vec![any]).await
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        if scope != Scope::NodeShape {
            return Err(Unsupported::new(
                "Closed",
                scope,
                ValidationApproach::Transactional,
                "closed shapes are node shapes",
            )
            .into());
        }
        Ok(Box::new(ClosedCheck::new(
            self.candidates(pc, chain, target),
            self.allowed.clone(),
        )))
    }

    fn all_targets_plan(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<BoxedPlanNode> {
        let _ = scope;
        Ok(self.candidates(pc, chain, None))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::shape::ShapeArena;
    use shapeflow_db_core::Term;
    use shapeflow_vocab::rdf;

    fn closed() -> ClosedConstraint {
        let mut c = ClosedConstraint::new(vec![Iri::new(rdf::TYPE)]);
        c.allow([Iri::new("http://x/name")]);
        c
    }

    #[tokio::test]
    async fn test_new_statement_on_existing_node() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), typed("b", "Person"), st("a", "name", Term::string("x"))],
            vec![st("a", "age", Term::integer(4)), st("b", "name", Term::string("y"))],
            vec![],
        )
        .await;
        let (delta, all) = run(&closed(), &ShapeArena::default(), &ctx, &people(), Scope::NodeShape).await;
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].active_target(), &t("a"));
        assert_eq!(delta[0].value(), Some(&Term::integer(4)));
        assert_eq!(delta[0].result_path(), Some(&Iri::new("http://x/age")));
        assert_eq!(chains(&all), chains(&delta));
    }

    #[tokio::test]
    async fn test_property_scope_is_unsupported() {
        let ctx = empty_ctx().await;
        let arena = ShapeArena::default();
        let settings = settings();
        let pc = PlanContext::new(&ctx, &arena, &settings);
        assert!(closed()
            .transactional_plan(&pc, &people_via("name"), Scope::PropertyShape, None)
            .is_err());
    }
}
