//! `sh:not`, `sh:and`, `sh:or`, `sh:xone` and `sh:node`
//!
//! The focus nodes of the child shapes are the focus nodes of the
//! constraint at node scope and its values at property scope. One shared
//! provider computes them once:
//!
//! ```text
//!                      ┌──> child 1 units ──> invalid 1 ─┐
//! provider (split) ────┼──> child 2 units ──> invalid 2 ─┼──> combinator ──> invalid
//!                      └─────────────────────────────────┘
//! ```
//!
//! Every child unit is planned with the provider as its target override, so
//! children evaluate exactly the provider's focus nodes. Child results are
//! reshaped to node-scope tuples of the provider's chain length before they
//! are combined, and the combined result is shifted back to property scope
//! when the constraint sits on a property shape.

use super::{
    chain_could_match, check_query, focus_targets, value_path, value_query, ConstraintComponent, PlanContext,
    SourceConstraintComponent, TargetOverride,
};
use crate::error::{Result, Unsupported};
use crate::fragment::SparqlFragment;
use crate::matcher::Variable;
use crate::path::DeltaSides;
use crate::plan::{
    Annotate, BoxedPlanNode, BufferedSplitter, BulkedExternalJoin, ChainAsTarget, CountMode, EmptyNode,
    GroupByCountFilter, GroupByFilter, GroupPredicate, LeftOuterJoin, NotValuesIn, ShiftToNodeShape,
    ShiftToPropertyShape, Sort, TrimToTarget, Truncate, UnionNode, UniqueKey, UniqueNode, ValueAsFocus,
};
use crate::query::ValidationQuery;
use crate::settings::ValidationApproach;
use crate::shape::{ConstraintUnit, ShapeId};
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKind {
    Not,
    And,
    Or,
    Xone,
    Node,
}

impl LogicalKind {
    fn component(&self) -> SourceConstraintComponent {
        match self {
            LogicalKind::Not => SourceConstraintComponent::Not,
            LogicalKind::And => SourceConstraintComponent::And,
            LogicalKind::Or => SourceConstraintComponent::Or,
            LogicalKind::Xone => SourceConstraintComponent::Xone,
            LogicalKind::Node => SourceConstraintComponent::Node,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalConstraint {
    kind: LogicalKind,
    shapes: Vec<ShapeId>,
}

impl LogicalConstraint {
    pub fn new(kind: LogicalKind, shapes: Vec<ShapeId>) -> Self {
        Self { kind, shapes }
    }

    pub fn not(shape: ShapeId) -> Self {
        Self::new(LogicalKind::Not, vec![shape])
    }

    pub fn node(shape: ShapeId) -> Self {
        Self::new(LogicalKind::Node, vec![shape])
    }

    pub fn kind(&self) -> LogicalKind {
        self.kind
    }

    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }

    pub(crate) fn remap(&mut self, map: &dyn Fn(ShapeId) -> ShapeId) {
        for s in &mut self.shapes {
            *s = map(*s);
        }
    }

    /// Focus nodes of the children, as node-scope tuples
    fn provider(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        let own = focus_targets(pc, chain, scope, target, DeltaSides::BOTH);
        let own: BoxedPlanNode = match scope {
            Scope::NodeShape => own,
            Scope::PropertyShape => {
                let path = value_path(chain, scope, self.source_component())?;
                let values = BulkedExternalJoin::inner(own, path.clone(), pc.bulk_size());
                Box::new(ValueAsFocus::new(Box::new(values)))
            }
        };
        if target.is_some() {
            return Ok(own);
        }
        // targets the children consider affected count too
        let len = focus_len(pc, chain);
        let mut inputs = vec![own];
        for shape in &self.shapes {
            inputs.extend(shape_targets(pc, chain, *shape, len)?);
        }
        let current = pc
            .effective(chain, Scope::NodeShape)
            .target_filter(Box::new(UnionNode::new(inputs)));
        Ok(Box::new(UniqueNode::new(current, UniqueKey::TargetChain)))
    }

    /// Whether every child unit has a filter form, combined per the kind
    fn combined_filter(&self, pc: &PlanContext<'_>, value: &Variable) -> Option<SparqlFragment> {
        if self.kind == LogicalKind::Xone {
            return None;
        }
        let per_shape = self
            .shapes
            .iter()
            .map(|shape| shape_filter(pc, *shape, value))
            .collect::<Option<Vec<_>>>()?;
        Some(match self.kind {
            LogicalKind::Not => SparqlFragment::not(&SparqlFragment::or(&per_shape)),
            LogicalKind::Or => SparqlFragment::or(&per_shape),
            LogicalKind::And | LogicalKind::Node | LogicalKind::Xone => SparqlFragment::and(&per_shape),
        })
    }
}

/// Chain length of the children's focus tuples
pub(crate) fn focus_len(pc: &PlanContext<'_>, focus: &TargetChain) -> usize {
    pc.effective(focus, Scope::NodeShape).chain_len()
}

/// Unit output reshaped to node-scope tuples of `len` chain nodes
fn to_focus(pc: &PlanContext<'_>, unit: &ConstraintUnit<'_>, plan: BoxedPlanNode, len: usize) -> BoxedPlanNode {
    let unit_len = pc.effective(&unit.chain, unit.scope).chain_len();
    if unit_len > len {
        Box::new(Truncate::new(plan, len))
    } else if unit.scope == Scope::PropertyShape {
        Box::new(ShiftToNodeShape::new(plan))
    } else {
        plan
    }
}

/// One tuple per chain, carrying the details of every input tuple for it
fn merged(inputs: Vec<BoxedPlanNode>) -> BoxedPlanNode {
    if inputs.is_empty() {
        return Box::new(EmptyNode::new());
    }
    let any: GroupPredicate = Arc::new(|_: &[ValidationTuple]| true);
    Box::new(GroupByFilter::new(
        Sort::new(Box::new(UnionNode::new(inputs))),
        any,
    ))
}

/// Affected focus nodes of `shape` as seen by its own units
pub(crate) fn shape_targets(
    pc: &PlanContext<'_>,
    focus: &TargetChain,
    shape: ShapeId,
    len: usize,
) -> Result<Vec<BoxedPlanNode>> {
    let _guard = pc.enter(shape)?;
    pc.arena()
        .units(shape, focus)
        .iter()
        .map(|unit| {
            let plan = unit
                .constraint
                .component()
                .all_targets_plan(pc, &unit.chain, unit.scope)?;
            Ok(to_focus(pc, unit, plan, len))
        })
        .collect()
}

/// Provider tuples that do not conform to `shape`
pub(crate) fn shape_invalid(
    pc: &PlanContext<'_>,
    focus: &TargetChain,
    shape: ShapeId,
    nodes: &TargetOverride,
    len: usize,
) -> Result<BoxedPlanNode> {
    let _guard = pc.enter(shape)?;
    let mut inputs = Vec::new();
    for unit in pc.arena().units(shape, focus) {
        let component = unit.constraint.component();
        let plan = component.transactional_plan(pc, &unit.chain, unit.scope, Some(nodes))?;
        let id = pc.arena().get(unit.shape).map(|s| s.id().clone());
        let plan: BoxedPlanNode = match id {
            Some(id) => Box::new(Annotate::new(plan, id, component.source_component())),
            None => plan,
        };
        inputs.push(to_focus(pc, &unit, plan, len));
    }
    Ok(merged(inputs))
}

/// Provider tuples that conform to `shape`
pub(crate) fn shape_conforming(
    pc: &PlanContext<'_>,
    focus: &TargetChain,
    shape: ShapeId,
    provider: &BufferedSplitter,
    len: usize,
) -> Result<BoxedPlanNode> {
    let nodes = TargetOverride::Nodes(provider.clone());
    let invalid = shape_invalid(pc, focus, shape, &nodes, len)?;
    Ok(Box::new(NotValuesIn::new(provider.plan(), invalid)))
}

/// Filter true when the value conforms to `shape`; node-scope units only
fn shape_filter(pc: &PlanContext<'_>, shape: ShapeId, value: &Variable) -> Option<SparqlFragment> {
    let _guard = pc.enter(shape).ok()?;
    let s = pc.arena().get(shape)?;
    if s.is_deactivated() {
        return Some(SparqlFragment::filter("true", Vec::new()));
    }
    if s.is_property_shape() || !s.properties().is_empty() {
        return None;
    }
    let filters = s
        .constraints()
        .iter()
        .map(|c| c.component().valid_filter(pc, value))
        .collect::<Option<Vec<_>>>()?;
    if filters.is_empty() {
        return Some(SparqlFragment::filter("true", Vec::new()));
    }
    Some(SparqlFragment::and(&filters))
}

#[async_trait]
impl ConstraintComponent for LogicalConstraint {
    fn source_component(&self) -> SourceConstraintComponent {
        self.kind.component()
    }

    async fn requires_evaluation(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<bool> {
        let _ = scope;
        if chain_could_match(pc, chain, Vec::new()).await? {
            return Ok(true);
        }
        for shape in &self.shapes {
            let _guard = pc.enter(*shape)?;
            for unit in pc.arena().units(*shape, chain) {
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
        let provider = BufferedSplitter::new(self.provider(pc, chain, scope, target)?);
        let nodes = TargetOverride::Nodes(provider.clone());
        let len = focus_len(pc, chain);

        let invalid: BoxedPlanNode = match self.kind {
            LogicalKind::And | LogicalKind::Node => {
                let children = self
                    .shapes
                    .iter()
                    .map(|shape| shape_invalid(pc, chain, *shape, &nodes, len))
                    .collect::<Result<Vec<_>>>()?;
                merged(children)
            }
            LogicalKind::Not => {
                let conforming = self
                    .shapes
                    .iter()
                    .map(|shape| shape_conforming(pc, chain, *shape, &provider, len))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(UniqueNode::new(
                    Box::new(UnionNode::new(conforming)),
                    UniqueKey::TargetChain,
                ))
            }
            LogicalKind::Or => {
                let conforming = self
                    .shapes
                    .iter()
                    .map(|shape| shape_conforming(pc, chain, *shape, &provider, len))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(NotValuesIn::new(
                    provider.plan(),
                    Box::new(UnionNode::new(conforming)),
                ))
            }
            LogicalKind::Xone => {
                let conforming = self
                    .shapes
                    .iter()
                    .map(|shape| shape_conforming(pc, chain, *shape, &provider, len))
                    .collect::<Result<Vec<_>>>()?;
                let joined = LeftOuterJoin::new(
                    Box::new(ChainAsTarget::new(provider.plan())),
                    Box::new(UnionNode::new(conforming)),
                );
                let counted = GroupByCountFilter::new(Sort::new(Box::new(joined)), "conforming != 1", |n| n != 1)
                    .counting(CountMode::Tuples);
                Box::new(ShiftToNodeShape::new(Box::new(TrimToTarget::new(Box::new(counted)))))
            }
        };

        Ok(match scope {
            Scope::NodeShape => invalid,
            Scope::PropertyShape => Box::new(ShiftToPropertyShape::new(invalid)),
        })
    }

    fn all_targets_plan(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<BoxedPlanNode> {
        let provider = self.provider(pc, chain, scope, None)?;
        Ok(match scope {
            Scope::NodeShape => provider,
            Scope::PropertyShape => Box::new(UniqueNode::new(
                Box::new(TrimToTarget::new(Box::new(ShiftToPropertyShape::new(provider)))),
                UniqueKey::TargetChain,
            )),
        })
    }

    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        let q = value_query(pc, chain, scope, false);
        let Some(valid) = self.combined_filter(pc, &q.value) else {
            return Err(Unsupported::new(
                self.source_component().name(),
                scope,
                ValidationApproach::SparqlBulk,
                "a child shape has no filter form",
            ));
        };
        Ok(check_query(pc, q, scope, &valid))
    }

    fn valid_filter(&self, pc: &PlanContext<'_>, value: &Variable) -> Option<SparqlFragment> {
        self.combined_filter(pc, value)
    }

    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::SparqlBulk
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::constraint::{Constraint, FilterKind, MinCount, SimpleFilter};
    use crate::path::Path;
    use crate::shape::{Shape, ShapeArena};
    use shapeflow_db_core::{Iri, Term};
    use shapeflow_vocab::xsd;

    fn datatype(arena: &mut ShapeArena, name: &str, dt: &str) -> ShapeId {
        let filter = SimpleFilter::new(FilterKind::Datatype(Iri::new(dt))).unwrap();
        arena.push(Shape::node(t(name)).with_constraint(Constraint::Simple(filter)))
    }

    fn has_name(arena: &mut ShapeArena) -> ShapeId {
        let name = arena.push(
            Shape::property(t("NameShape"), Path::predicate("http://x/name"))
                .with_constraint(Constraint::MinCount(MinCount::new(1))),
        );
        arena.push(Shape::node(t("Named")).with_property(name))
    }

    #[tokio::test]
    async fn test_not_at_node_scope() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), st("a", "name", Term::string("x"))],
            vec![typed("b", "Person")],
            vec![],
        )
        .await;
        let mut arena = ShapeArena::default();
        let named = has_name(&mut arena);
        let not = LogicalConstraint::not(named);
        let (delta, all) = run(&not, &arena, &ctx, &people(), Scope::NodeShape).await;
        // b is new and unnamed, a is unaffected
        assert!(delta.is_empty());
        assert_eq!(chains(&all), vec![vec![t("a")]]);
    }

    #[tokio::test]
    async fn test_child_change_makes_target_affected() {
        let ctx = ctx_with(
            vec![typed("a", "Person")],
            vec![st("a", "name", Term::string("x"))],
            vec![],
        )
        .await;
        let mut arena = ShapeArena::default();
        let named = has_name(&mut arena);
        let (delta, _) = run(&LogicalConstraint::not(named), &arena, &ctx, &people(), Scope::NodeShape).await;
        assert_eq!(chains(&delta), vec![vec![t("a")]]);
    }

    #[tokio::test]
    async fn test_and_or_xone_over_values() {
        let ctx = ctx_with(
            vec![typed("a", "Person")],
            vec![
                st("a", "age", Term::integer(3)),
                st("a", "age", Term::string("three")),
                st("a", "age", Term::typed("3.5", xsd::DECIMAL)),
            ],
            vec![],
        )
        .await;
        let mut arena = ShapeArena::default();
        let int = datatype(&mut arena, "Int", xsd::INTEGER);
        let string = datatype(&mut arena, "Str", xsd::STRING);
        let chain = people_via("age");

        let and = LogicalConstraint::new(LogicalKind::And, vec![int, string]);
        let (delta, all) = run(&and, &arena, &ctx, &chain, Scope::PropertyShape).await;
        assert_eq!(delta.len(), 3);
        assert_eq!(chains(&all), chains(&delta));
        let three = delta.iter().find(|t| t.value() == Some(&Term::integer(3))).unwrap();
        assert_eq!(three.details().len(), 1);
        assert_eq!(three.details()[0].shape, t("Str"));

        let or = LogicalConstraint::new(LogicalKind::Or, vec![int, string]);
        let (delta, _) = run(&or, &arena, &ctx, &chain, Scope::PropertyShape).await;
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].value(), Some(&Term::typed("3.5", xsd::DECIMAL)));
        assert_eq!(delta[0].scope(), Scope::PropertyShape);

        let xone = LogicalConstraint::new(LogicalKind::Xone, vec![int, int, string]);
        let (delta, _) = run(&xone, &arena, &ctx, &chain, Scope::PropertyShape).await;
        let mut values: Vec<_> = delta.iter().filter_map(|t| t.value().cloned()).collect();
        values.sort();
        let mut expected = vec![Term::integer(3), Term::typed("3.5", xsd::DECIMAL)];
        expected.sort();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_recursive_node_is_an_error() {
        let ctx = ctx_with(vec![], vec![typed("a", "Person")], vec![]).await;
        let mut arena = ShapeArena::default();
        let a = arena.push(Shape::node(t("A")));
        if let Some(shape) = arena.get_mut(a) {
            shape
                .constraints_mut()
                .push(Constraint::Logical(LogicalConstraint::node(a)));
        }
        let settings = settings();
        let pc = PlanContext::new(&ctx, &arena, &settings);
        let node = LogicalConstraint::node(a);
        assert!(node.transactional_plan(&pc, &people(), Scope::NodeShape, None).is_err());
    }

    #[tokio::test]
    async fn test_filter_form() {
        let ctx = empty_ctx().await;
        let mut arena = ShapeArena::default();
        let int = datatype(&mut arena, "Int", xsd::INTEGER);
        let named = has_name(&mut arena);
        let settings = settings();
        let pc = PlanContext::new(&ctx, &arena, &settings);

        let q = LogicalConstraint::not(int)
            .sparql_query(&pc, &people_via("age"), Scope::PropertyShape)
            .unwrap();
        assert!(q.to_select().contains("!(isLiteral(?value) && datatype(?value) = <http://www.w3.org/2001/XMLSchema#integer>)"));
        assert!(LogicalConstraint::not(named)
            .sparql_query(&pc, &people(), Scope::NodeShape)
            .is_err());
        assert!(LogicalConstraint::new(LogicalKind::Xone, vec![int])
            .sparql_query(&pc, &people(), Scope::NodeShape)
            .is_err());
    }
}
