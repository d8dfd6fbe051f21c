//! Constraint components
//!
//! Every constraint kind implements [`ConstraintComponent`]: it decides
//! whether a transaction needs it evaluated at all, builds a transactional
//! plan over the plan-node algebra, and, when it has a declarative form,
//! renders a bulk [`ValidationQuery`].
//!
//! Constraints never store the target chain they are evaluated under. The
//! chain and scope are passed into every call, so one shape tree is shared
//! by every run and every nesting position.
//!
//! ## Plan shape
//!
//! ```text
//! affected targets ──> bulked join on the path ──> constraint filter ──> invalid tuples
//! ```
//!
//! The affected targets are the delta-touched targets, the override's
//! targets when a logical parent provides them, or every target in bulk
//! mode.

pub mod cardinality;
pub mod class;
pub mod closed;
pub mod has_value;
pub mod logical;
pub mod pair;
pub mod qualified;
pub mod simple;
pub mod unique_lang;

pub use cardinality::{MaxCount, MinCount};
pub use class::ClassConstraint;
pub use closed::ClosedConstraint;
pub use has_value::HasValue;
pub use logical::{LogicalConstraint, LogicalKind};
pub use pair::PairConstraint;
pub use qualified::{QualifiedBound, QualifiedConstraint};
pub use simple::{FilterKind, NodeKind, SimpleFilter, ValuePredicate};
pub use unique_lang::UniqueLang;

use crate::connections::ConnectionsGroup;
use crate::effective::EffectiveTarget;
use crate::error::{Result, ShaclError, Unsupported};
use crate::fragment::SparqlFragment;
use crate::matcher::{any_could_match, StableVariableProvider, StatementMatcher, Variable};
use crate::path::{DeltaSides, Path};
use crate::plan::{BoxedPlanNode, BufferedSplitter, BulkedExternalJoin, Direction, UnionNode, UniqueKey, UniqueNode};
use crate::query::ValidationQuery;
use crate::settings::{ValidationApproach, ValidationSettings};
use crate::shape::{ShapeArena, ShapeId};
use crate::target::TargetChain;
use crate::tuple::Scope;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shapeflow_vocab::shacl;
use std::sync::Arc;

/// The `sh:sourceConstraintComponent` of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceConstraintComponent {
    Class,
    Datatype,
    NodeKind,
    MinCount,
    MaxCount,
    MinLength,
    MaxLength,
    Pattern,
    LanguageIn,
    UniqueLang,
    Equals,
    Disjoint,
    LessThan,
    LessThanOrEquals,
    Not,
    And,
    Or,
    Xone,
    Node,
    QualifiedMinCount,
    QualifiedMaxCount,
    Closed,
    HasValue,
    In,
    MinExclusive,
    MinInclusive,
    MaxExclusive,
    MaxInclusive,
}

impl SourceConstraintComponent {
    pub fn iri(&self) -> &'static str {
        use SourceConstraintComponent::*;
        match self {
            Class => shacl::CLASS_CONSTRAINT_COMPONENT,
            Datatype => shacl::DATATYPE_CONSTRAINT_COMPONENT,
            NodeKind => shacl::NODE_KIND_CONSTRAINT_COMPONENT,
            MinCount => shacl::MIN_COUNT_CONSTRAINT_COMPONENT,
            MaxCount => shacl::MAX_COUNT_CONSTRAINT_COMPONENT,
            MinLength => shacl::MIN_LENGTH_CONSTRAINT_COMPONENT,
            MaxLength => shacl::MAX_LENGTH_CONSTRAINT_COMPONENT,
            Pattern => shacl::PATTERN_CONSTRAINT_COMPONENT,
            LanguageIn => shacl::LANGUAGE_IN_CONSTRAINT_COMPONENT,
            UniqueLang => shacl::UNIQUE_LANG_CONSTRAINT_COMPONENT,
            Equals => shacl::EQUALS_CONSTRAINT_COMPONENT,
            Disjoint => shacl::DISJOINT_CONSTRAINT_COMPONENT,
            LessThan => shacl::LESS_THAN_CONSTRAINT_COMPONENT,
            LessThanOrEquals => shacl::LESS_THAN_OR_EQUALS_CONSTRAINT_COMPONENT,
            Not => shacl::NOT_CONSTRAINT_COMPONENT,
            And => shacl::AND_CONSTRAINT_COMPONENT,
            Or => shacl::OR_CONSTRAINT_COMPONENT,
            Xone => shacl::XONE_CONSTRAINT_COMPONENT,
            Node => shacl::NODE_CONSTRAINT_COMPONENT,
            QualifiedMinCount => shacl::QUALIFIED_MIN_COUNT_CONSTRAINT_COMPONENT,
            QualifiedMaxCount => shacl::QUALIFIED_MAX_COUNT_CONSTRAINT_COMPONENT,
            Closed => shacl::CLOSED_CONSTRAINT_COMPONENT,
            HasValue => shacl::HAS_VALUE_CONSTRAINT_COMPONENT,
            In => shacl::IN_CONSTRAINT_COMPONENT,
            MinExclusive => shacl::MIN_EXCLUSIVE_CONSTRAINT_COMPONENT,
            MinInclusive => shacl::MIN_INCLUSIVE_CONSTRAINT_COMPONENT,
            MaxExclusive => shacl::MAX_EXCLUSIVE_CONSTRAINT_COMPONENT,
            MaxInclusive => shacl::MAX_INCLUSIVE_CONSTRAINT_COMPONENT,
        }
    }

    /// Local name without the `ConstraintComponent` suffix
    pub fn name(&self) -> &'static str {
        let iri = self.iri();
        let local = iri.strip_prefix(shacl::NS).unwrap_or(iri);
        local.strip_suffix("ConstraintComponent").unwrap_or(local)
    }
}

/// Targets imposed on a constraint instead of the delta-derived ones
#[derive(Clone)]
pub enum TargetOverride {
    /// Every current target; used by bulk evaluation
    AllTargets,
    /// Target chains supplied by an enclosing logical constraint
    Nodes(BufferedSplitter),
}

impl std::fmt::Debug for TargetOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetOverride::AllTargets => write!(f, "AllTargets"),
            TargetOverride::Nodes(_) => write!(f, "Nodes"),
        }
    }
}

/// Everything plan construction reads, for one constraint unit
pub struct PlanContext<'a> {
    connections: &'a ConnectionsGroup,
    arena: &'a ShapeArena,
    settings: &'a ValidationSettings,
    vars: StableVariableProvider,
    stack: Mutex<Vec<ShapeId>>,
}

impl<'a> PlanContext<'a> {
    pub fn new(connections: &'a ConnectionsGroup, arena: &'a ShapeArena, settings: &'a ValidationSettings) -> Self {
        Self {
            connections,
            arena,
            settings,
            vars: StableVariableProvider::new("tmp"),
            stack: Mutex::new(Vec::new()),
        }
    }

    pub fn connections(&self) -> &'a ConnectionsGroup {
        self.connections
    }

    pub fn arena(&self) -> &'a ShapeArena {
        self.arena
    }

    pub fn settings(&self) -> &'a ValidationSettings {
        self.settings
    }

    pub fn vars(&self) -> &StableVariableProvider {
        &self.vars
    }

    pub fn bulk_size(&self) -> usize {
        self.settings.bulk_join_size
    }

    pub fn effective(&self, chain: &TargetChain, scope: Scope) -> Arc<EffectiveTarget> {
        Arc::new(chain.effective_target(scope, self.bulk_size()))
    }

    /// Push `shape` on the planning stack until the guard drops
    ///
    /// Fails with [`ShaclError::RecursiveShape`] if the shape is already on it.
    pub fn enter(&self, shape: ShapeId) -> Result<StackGuard<'_>> {
        let mut stack = self.stack.lock();
        if stack.contains(&shape) {
            let name = self.arena.get(shape).map(|s| s.id().to_string()).unwrap_or_default();
            return Err(ShaclError::RecursiveShape { shape: name });
        }
        stack.push(shape);
        Ok(StackGuard { stack: &self.stack })
    }
}

pub struct StackGuard<'a> {
    stack: &'a Mutex<Vec<ShapeId>>,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.lock().pop();
    }
}

#[async_trait]
pub trait ConstraintComponent: Send + Sync {
    fn source_component(&self) -> SourceConstraintComponent;

    /// Whether the transaction could change this constraint's outcome
    ///
    /// May return `true` needlessly; must never return `false` when a
    /// result could change.
    async fn requires_evaluation(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<bool> {
        let _ = scope;
        chain_could_match(pc, chain, Vec::new()).await
    }

    /// Invalid tuples among the affected targets
    ///
    /// Output tuples are at `scope`: node scope tuples end in the focus
    /// node, property scope tuples carry the failing value when there is one.
    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode>;

    /// Targets whose validity the transaction may have changed, without values
    fn all_targets_plan(&self, pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope) -> Result<BoxedPlanNode> {
        Ok(affected_targets(pc, chain, scope, DeltaSides::BOTH))
    }

    /// One declarative query producing every invalid tuple in the store
    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        let _ = (pc, chain);
        Err(Unsupported::new(
            self.source_component().name(),
            scope,
            ValidationApproach::SparqlBulk,
            "no declarative form",
        ))
    }

    /// Filter expression true when the value bound to `value` is valid
    ///
    /// Only constraints that test a single value have one.
    fn valid_filter(&self, pc: &PlanContext<'_>, value: &Variable) -> Option<SparqlFragment> {
        let _ = (pc, value);
        None
    }

    fn preferred_approach(&self) -> ValidationApproach {
        ValidationApproach::Transactional
    }

    /// The approach to use when the whole store is validated
    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::Transactional
    }
}

/// A constraint of a shape
#[derive(Debug, Clone)]
pub enum Constraint {
    Simple(SimpleFilter),
    MinCount(MinCount),
    MaxCount(MaxCount),
    Class(ClassConstraint),
    HasValue(HasValue),
    Pair(PairConstraint),
    UniqueLang(UniqueLang),
    Closed(ClosedConstraint),
    Logical(LogicalConstraint),
    Qualified(QualifiedConstraint),
}

impl Constraint {
    pub fn component(&self) -> &dyn ConstraintComponent {
        match self {
            Constraint::Simple(c) => c,
            Constraint::MinCount(c) => c,
            Constraint::MaxCount(c) => c,
            Constraint::Class(c) => c,
            Constraint::HasValue(c) => c,
            Constraint::Pair(c) => c,
            Constraint::UniqueLang(c) => c,
            Constraint::Closed(c) => c,
            Constraint::Logical(c) => c,
            Constraint::Qualified(c) => c,
        }
    }

    pub fn source_component(&self) -> SourceConstraintComponent {
        self.component().source_component()
    }

    /// Shapes this constraint refers to
    pub fn shape_refs(&self) -> Vec<ShapeId> {
        match self {
            Constraint::Logical(c) => c.shapes().to_vec(),
            Constraint::Qualified(c) => {
                let mut out = vec![c.shape()];
                out.extend(c.siblings().iter().copied());
                out
            }
            _ => Vec::new(),
        }
    }

    /// Rewrite shape references, used when arenas are merged
    pub(crate) fn remap(&mut self, map: &dyn Fn(ShapeId) -> ShapeId) {
        match self {
            Constraint::Logical(c) => c.remap(map),
            Constraint::Qualified(c) => c.remap(map),
            _ => {}
        }
    }
}

/// Whether any added or removed statement matches the chain or `extra`
pub(crate) async fn chain_could_match(
    pc: &PlanContext<'_>,
    chain: &TargetChain,
    extra: Vec<StatementMatcher>,
) -> Result<bool> {
    let ctx = pc.connections();
    if !ctx.stats().has_added() && !ctx.stats().has_removed() {
        return Ok(false);
    }
    let mut matchers = pc.effective(chain, Scope::NodeShape).matchers(ctx, pc.vars());
    matchers.extend(extra);
    any_could_match(&matchers, ctx).await
}

/// Targets touched by the transaction: membership changes, plus at
/// property scope the targets whose path values changed on `sides`
pub(crate) fn affected_targets(pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope, sides: DeltaSides) -> BoxedPlanNode {
    let effective = pc.effective(chain, scope);
    let targets = effective.plan_node(sides.removed);
    match effective.optional() {
        Some(path) if !sides.is_empty() => {
            let delta = effective.path_delta(path.clone(), sides);
            Box::new(UniqueNode::new(
                Box::new(UnionNode::new(vec![targets, delta])),
                UniqueKey::TargetChain,
            ))
        }
        _ => targets,
    }
}

/// Target tuples a plan starts from
pub(crate) fn focus_targets(
    pc: &PlanContext<'_>,
    chain: &TargetChain,
    scope: Scope,
    target: Option<&TargetOverride>,
    sides: DeltaSides,
) -> BoxedPlanNode {
    match target {
        None => affected_targets(pc, chain, scope, sides),
        Some(TargetOverride::AllTargets) => pc.effective(chain, scope).all_targets(),
        Some(TargetOverride::Nodes(nodes)) => pc.effective(chain, scope).extend(nodes.plan(), Direction::Right, true),
    }
}

/// The value path of a property scope chain
pub(crate) fn value_path<'c>(chain: &'c TargetChain, scope: Scope, component: SourceConstraintComponent) -> Result<&'c Path> {
    match (scope, chain.path()) {
        (Scope::PropertyShape, Some(path)) => Ok(path),
        _ => Err(ShaclError::Internal(format!(
            "{} evaluated at property scope without a path",
            component.name()
        ))),
    }
}

/// Value tuples of `targets`: the targets themselves at node scope, one
/// tuple per path value at property scope
pub(crate) fn values_of(
    pc: &PlanContext<'_>,
    chain: &TargetChain,
    scope: Scope,
    targets: BoxedPlanNode,
    component: SourceConstraintComponent,
) -> Result<BoxedPlanNode> {
    match scope {
        Scope::NodeShape => Ok(targets),
        Scope::PropertyShape => {
            let path = value_path(chain, scope, component)?;
            Ok(Box::new(BulkedExternalJoin::inner(targets, path.clone(), pc.bulk_size())))
        }
    }
}

/// Graph pattern binding the target chain and the value under test
pub(crate) struct ValueQuery {
    pub body: String,
    pub target_vars: Vec<Variable>,
    pub active: Variable,
    pub value: Variable,
}

/// Target pattern plus, at property scope, `?active <path> ?value`
///
/// With `optional` the path pattern is wrapped in `OPTIONAL`. At node scope
/// the value is the focus node itself.
pub(crate) fn value_query(pc: &PlanContext<'_>, chain: &TargetChain, scope: Scope, optional: bool) -> ValueQuery {
    let ctx = pc.connections();
    let effective = pc.effective(chain, scope);
    let query = effective.query(ctx, pc.vars());
    let active = query.active_var().clone();
    let mut body = query.fragment.as_pattern();
    let value = match effective.optional() {
        Some(path) => {
            let value = Variable::new("value");
            let pattern = path.query_fragment(&active, &value, ctx.renderer(), pc.vars());
            if optional {
                body.push_str(&format!("\nOPTIONAL {{ {} }}", pattern.as_pattern()));
            } else {
                body.push('\n');
                body.push_str(&pattern.as_pattern());
            }
            value
        }
        None => active.clone(),
    };
    ValueQuery {
        body,
        target_vars: query.target_vars,
        active,
        value,
    }
}

/// Bulk query reporting each value for which `valid` is not true
///
/// `valid` receives the variable bound to the value under test.
pub(crate) fn filter_query(
    pc: &PlanContext<'_>,
    chain: &TargetChain,
    scope: Scope,
    valid: &dyn Fn(&Variable) -> SparqlFragment,
) -> ValidationQuery {
    let q = value_query(pc, chain, scope, false);
    let valid = valid(&q.value);
    check_query(pc, q, scope, &valid)
}

/// `q` restricted to the solutions where `valid` is false or unbound
pub(crate) fn check_query(pc: &PlanContext<'_>, q: ValueQuery, scope: Scope, valid: &SparqlFragment) -> ValidationQuery {
    let check = pc.vars().next();
    let body = format!(
        "{}\nBIND(({}) AS {})\nFILTER(!COALESCE({}, false))",
        q.body,
        valid.as_expression(),
        check,
        check
    );
    let value = match scope {
        Scope::PropertyShape => Some(q.value),
        Scope::NodeShape => None,
    };
    ValidationQuery::new(body, q.target_vars, value, scope)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::plan::collect;
    use crate::shape::ShapeArena;
    use crate::target::Target;
    use crate::tuple::ValidationTuple;
    use shapeflow_db_core::{Iri, Statement, Term};
    use shapeflow_vocab::rdf;

    pub use crate::plan::test_support::*;

    pub fn typed(s: &str, class: &str) -> Statement {
        Statement::new(t(s), Iri::new(rdf::TYPE), t(class))
    }

    pub fn st(s: &str, p: &str, o: Term) -> Statement {
        Statement::new(t(s), Iri::new(format!("http://x/{}", p)), o)
    }

    pub fn people() -> TargetChain {
        TargetChain::new(Target::Class(Iri::new("http://x/Person")))
    }

    pub fn people_via(p: &str) -> TargetChain {
        people().with_path(Path::predicate(format!("http://x/{}", p)))
    }

    pub fn settings() -> ValidationSettings {
        ValidationSettings::default().with_bulk_join_size(4)
    }

    /// Run `c` transactionally and in bulk, returning both outputs
    pub async fn run(
        c: &dyn ConstraintComponent,
        arena: &ShapeArena,
        ctx: &ConnectionsGroup,
        chain: &TargetChain,
        scope: Scope,
    ) -> (Vec<ValidationTuple>, Vec<ValidationTuple>) {
        let settings = settings();
        let pc = PlanContext::new(ctx, arena, &settings);
        let mut delta = c.transactional_plan(&pc, chain, scope, None).unwrap();
        let delta = collect(delta.as_mut(), ctx, None).await.unwrap();
        let mut all = c
            .transactional_plan(&pc, chain, scope, Some(&TargetOverride::AllTargets))
            .unwrap();
        let all = collect(all.as_mut(), ctx, None).await.unwrap();
        (delta, all)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::plan::collect;
    use shapeflow_db_core::Term;

    #[test]
    fn test_component_names() {
        assert_eq!(SourceConstraintComponent::MinCount.name(), "MinCount");
        assert_eq!(
            SourceConstraintComponent::Xone.iri(),
            "http://www.w3.org/ns/shacl#XoneConstraintComponent"
        );
    }

    #[tokio::test]
    async fn test_affected_targets_include_path_changes() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), typed("b", "Person"), st("a", "name", Term::string("x"))],
            vec![typed("c", "Person"), st("b", "name", Term::string("y"))],
            vec![st("a", "name", Term::string("x"))],
        )
        .await;
        let arena = ShapeArena::default();
        let settings = settings();
        let pc = PlanContext::new(&ctx, &arena, &settings);
        let chain = people_via("name");

        let mut added = affected_targets(&pc, &chain, Scope::PropertyShape, DeltaSides::ADDED);
        let out = collect(added.as_mut(), &ctx, None).await.unwrap();
        assert_eq!(chains(&out), vec![vec![t("b")], vec![t("c")]]);

        let mut both = affected_targets(&pc, &chain, Scope::PropertyShape, DeltaSides::BOTH);
        let out = collect(both.as_mut(), &ctx, None).await.unwrap();
        assert_eq!(chains(&out), vec![vec![t("a")], vec![t("b")], vec![t("c")]]);
    }

    #[tokio::test]
    async fn test_recursion_guard() {
        let ctx = empty_ctx().await;
        let mut arena = ShapeArena::default();
        let a = arena.push(crate::shape::Shape::node(t("A")));
        let settings = settings();
        let pc = PlanContext::new(&ctx, &arena, &settings);
        {
            let _outer = pc.enter(a).unwrap();
            assert!(matches!(pc.enter(a), Err(ShaclError::RecursiveShape { .. })));
        }
        assert!(pc.enter(a).is_ok());
    }
}
