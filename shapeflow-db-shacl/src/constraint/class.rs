//! `sh:class`
//!
//! A value fails when it is not an instance of the class. Adding a value
//! can break it; so can removing a type statement from a value that was
//! already there, which the delta targets never see. The second case is
//! found by scanning the removed type statements and walking back from the
//! untyped value to the targets it belongs to. Added type statements never
//! break the constraint, but they can make a shape conform, so they count
//! as affected targets for `sh:not`, `sh:or` and `sh:xone` parents.

use super::{
    chain_could_match, filter_query, focus_targets, values_of, ConstraintComponent, PlanContext,
    SourceConstraintComponent, TargetOverride,
};
use crate::connections::{ConnectionsGroup, StoreView};
use crate::error::{Result, Unsupported};
use crate::fragment::SparqlFragment;
use crate::matcher::{Role, StatementMatcher, Variable};
use crate::path::DeltaSides;
use crate::plan::{
    BoxedPlanNode, Direction, ExternalFilterByType, Select, ShiftToPropertyShape, TrimToTarget, TupleMapper, UnionNode,
    UniqueKey, UniqueNode,
};
use crate::query::ValidationQuery;
use crate::settings::ValidationApproach;
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use shapeflow_db_core::{Iri, Statement, Term, TriplePattern};
use shapeflow_vocab::rdf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassConstraint {
    class: Iri,
}

impl ClassConstraint {
    pub fn new(class: Iri) -> Self {
        Self { class }
    }

    pub fn class(&self) -> &Iri {
        &self.class
    }

    /// Values with a type statement for the class or a subclass in `view`,
    /// as tuples of every chain they are a value of
    fn retyped_values(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        view: StoreView,
    ) -> BoxedPlanNode {
        let ctx = pc.connections();
        let patterns: Vec<TriplePattern> = ctx
            .expand_class(&self.class)
            .into_iter()
            .map(|c| TriplePattern::new(None, Some(Iri::new(rdf::TYPE)), Some(Term::Iri(c))))
            .collect();
        let mapper: TupleMapper = Arc::new(|st: &Statement, ctx: &ConnectionsGroup| {
            Some(ValidationTuple::target(
                st.subject.clone(),
                Scope::NodeShape,
                ctx.contexts().clone(),
            ))
        });
        let typed = Box::new(Select::new(view, patterns, mapper));
        // at property scope the value is the last node of the full chain
        let chains = pc
            .effective(chain, Scope::NodeShape)
            .extend(typed, Direction::Left, true);
        match scope {
            Scope::NodeShape => chains,
            Scope::PropertyShape => Box::new(ShiftToPropertyShape::new(chains)),
        }
    }

    fn typed_pattern(&self, ctx: &ConnectionsGroup, value: &Variable, class_var: &Variable) -> SparqlFragment {
        let classes: Vec<String> = ctx.expand_class(&self.class).iter().map(|c| c.to_string()).collect();
        let text = format!(
            "{} <{}> {} .\nVALUES {} {{ {} }}",
            value,
            rdf::TYPE,
            class_var,
            class_var,
            classes.join(" ")
        );
        let matchers = vec![StatementMatcher::new(
            Role::Var(value.clone()),
            Term::iri(rdf::TYPE),
            Role::Var(class_var.clone()),
        )];
        SparqlFragment::pattern(text, matchers)
    }
}

#[async_trait]
impl ConstraintComponent for ClassConstraint {
    fn source_component(&self) -> SourceConstraintComponent {
        SourceConstraintComponent::Class
    }

    async fn requires_evaluation(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<bool> {
        let _ = scope;
        let value = pc.vars().next();
        let extra = pc
            .connections()
            .expand_class(&self.class)
            .into_iter()
            .map(|c| StatementMatcher::new(Role::Var(value.clone()), Term::iri(rdf::TYPE), Term::Iri(c)))
            .collect();
        chain_could_match(pc, chain, extra).await
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        let targets = focus_targets(pc, chain, scope, target, DeltaSides::ADDED);
        let values = values_of(pc, chain, scope, targets, self.source_component())?;
        let added = Box::new(ExternalFilterByType::failing(values, self.class.clone()));
        if target.is_some() {
            return Ok(added);
        }
        let untyped = Box::new(ExternalFilterByType::failing(
            self.retyped_values(pc, chain, scope, StoreView::Removed),
            self.class.clone(),
        ));
        Ok(Box::new(UniqueNode::new(
            Box::new(UnionNode::new(vec![added, untyped])),
            UniqueKey::Full,
        )))
    }

    fn all_targets_plan(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<BoxedPlanNode> {
        let targets = super::affected_targets(pc, chain, scope, DeltaSides::BOTH);
        let mut inputs = vec![targets];
        for view in [StoreView::Removed, StoreView::Added] {
            let retyped = self.retyped_values(pc, chain, scope, view);
            inputs.push(match scope {
                Scope::NodeShape => retyped,
                Scope::PropertyShape => Box::new(TrimToTarget::new(retyped)),
            });
        }
        Ok(Box::new(UniqueNode::new(
            Box::new(UnionNode::new(inputs)),
            UniqueKey::TargetChain,
        )))
    }

    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        Ok(filter_query(pc, chain, scope, &|v| {
            self.typed_pattern(pc.connections(), v, &pc.vars().next())
        }))
    }

    fn valid_filter(&self, pc: &PlanContext<'_>, value: &Variable) -> Option<SparqlFragment> {
        Some(self.typed_pattern(pc.connections(), value, &pc.vars().next()))
    }

    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::SparqlBulk
    }
}
