//! Property pair constraints: `sh:equals`, `sh:disjoint`, `sh:lessThan`,
//! `sh:lessThanOrEquals`
//!
//! Either side changing can break the pair, so the affected targets are
//! those whose own values changed plus those whose values of the other
//! predicate changed.

use super::{focus_targets, ConstraintComponent, PlanContext, SourceConstraintComponent, TargetOverride};
use crate::error::Result;
use crate::matcher::{Role, StatementMatcher};
use crate::path::{DeltaSides, Path};
use crate::plan::{BoxedPlanNode, PairwiseCheck, PairwiseKind, UnionNode, UniqueKey, UniqueNode};
use crate::target::TargetChain;
use crate::tuple::Scope;
use async_trait::async_trait;
use shapeflow_db_core::{Iri, Term};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairConstraint {
    kind: PairwiseKind,
    other: Iri,
}

impl PairConstraint {
    pub fn new(kind: PairwiseKind, other: Iri) -> Self {
        Self { kind, other }
    }

    pub fn equals(other: Iri) -> Self {
        Self::new(PairwiseKind::Equals, other)
    }

    pub fn disjoint(other: Iri) -> Self {
        Self::new(PairwiseKind::Disjoint, other)
    }

    pub fn less_than(other: Iri) -> Self {
        Self::new(PairwiseKind::LessThan, other)
    }

    pub fn less_than_or_equals(other: Iri) -> Self {
        Self::new(PairwiseKind::LessThanOrEquals, other)
    }

    pub fn kind(&self) -> PairwiseKind {
        self.kind
    }

    pub fn other(&self) -> &Iri {
        &self.other
    }

    fn candidates(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> BoxedPlanNode {
        let own = focus_targets(pc, chain, scope, target, DeltaSides::BOTH);
        if target.is_some() {
            return own;
        }
        let other = pc
            .effective(chain, scope)
            .path_delta(Path::Predicate(self.other.clone()), DeltaSides::BOTH);
        Box::new(UniqueNode::new(
            Box::new(UnionNode::new(vec![own, other])),
            UniqueKey::TargetChain,
        ))
    }
}

#[async_trait]
impl ConstraintComponent for PairConstraint {
    fn source_component(&self) -> SourceConstraintComponent {
        match self.kind {
            PairwiseKind::Equals => SourceConstraintComponent::Equals,
            PairwiseKind::Disjoint => SourceConstraintComponent::Disjoint,
            PairwiseKind::LessThan => SourceConstraintComponent::LessThan,
            PairwiseKind::LessThanOrEquals => SourceConstraintComponent::LessThanOrEquals,
        }
    }

    async fn requires_evaluation(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<bool> {
        let _ = scope;
        let extra = vec![StatementMatcher::new(
            Role::Var(pc.vars().next()),
            Term::Iri(self.other.clone()),
            Role::Var(pc.vars().next()),
        )];
        super::chain_could_match(pc, chain, extra).await
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        let path = match scope {
            Scope::NodeShape => None,
            Scope::PropertyShape => Some(super::value_path(chain, scope, self.source_component())?.clone()),
        };
        Ok(Box::new(PairwiseCheck::new(
            self.candidates(pc, chain, scope, target),
            path,
            self.other.clone(),
            self.kind,
            pc.bulk_size(),
        )))
    }

    fn all_targets_plan(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<BoxedPlanNode> {
        Ok(self.candidates(pc, chain, scope, None))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::shape::ShapeArena;

    fn other(p: &str) -> Iri {
        Iri::new(format!("http://x/{}", p))
    }

    #[tokio::test]
    async fn test_equals_reports_both_sides() {
        let ctx = ctx_with(
            vec![
                typed("a", "Person"),
                st("a", "name", Term::string("x")),
                st("a", "label", Term::string("x")),
            ],
            vec![st("a", "label", Term::string("y"))],
            vec![],
        )
        .await;
        let c = PairConstraint::equals(other("label"));
        let (delta, all) = run(&c, &ShapeArena::default(), &ctx, &people_via("name"), Scope::PropertyShape).await;
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].value(), Some(&Term::string("y")));
        assert_eq!(chains(&all), chains(&delta));
    }

    #[tokio::test]
    async fn test_disjoint_at_node_scope() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), typed("b", "Person")],
            vec![st("a", "sameAs", t("a")), st("b", "sameAs", t("a"))],
            vec![],
        )
        .await;
        let c = PairConstraint::disjoint(other("sameAs"));
        let (delta, _) = run(&c, &ShapeArena::default(), &ctx, &people(), Scope::NodeShape).await;
        assert_eq!(chains(&delta), vec![vec![t("a")]]);
    }

    #[tokio::test]
    async fn test_less_than_boundary() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), typed("b", "Person")],
            vec![
                st("a", "start", Term::integer(3)),
                st("a", "end", Term::integer(3)),
                st("b", "start", Term::integer(2)),
                st("b", "end", Term::integer(3)),
            ],
            vec![],
        )
        .await;
        let arena = ShapeArena::default();
        let (lt, _) = run(
            &PairConstraint::less_than(other("end")),
            &arena,
            &ctx,
            &people_via("start"),
            Scope::PropertyShape,
        )
        .await;
        assert_eq!(chains(&lt), vec![vec![t("a"), Term::integer(3)]]);
        let (lte, _) = run(
            &PairConstraint::less_than_or_equals(other("end")),
            &arena,
            &ctx,
            &people_via("start"),
            Scope::PropertyShape,
        )
        .await;
        assert!(lte.is_empty());
    }
}
