//! SHACL validation engine
//!
//! A run evaluates every constraint unit of every active, targeted shape:
//!
//! 1. Pick the run mode. A transaction on an empty store, or one larger than
//!    `transactional_validation_limit`, is validated in bulk; otherwise the
//!    run is transactional and units the delta cannot affect are skipped.
//! 2. Per unit, pick the approach: the transactional algebra, or in bulk
//!    mode the declarative query when the constraint has one and an
//!    executor is configured. Anything the chosen approach cannot express
//!    falls back to the algebra over all targets.
//! 3. Drain each plan, apply the result limits, and turn tuples into
//!    [`ValidationResult`]s.
//!
//! Units have no data dependency on each other and run concurrently when
//! `parallel_validation` is set.

use crate::connections::ConnectionsGroup;
use crate::constraint::{ConstraintComponent, PlanContext, TargetOverride};
use crate::error::{Result, ShaclError, Unsupported};
use crate::path::Path;
use crate::plan::{collect, explain, BoxedPlanNode, SparqlSelectNode};
use crate::report::{ReportSink, ValidationReport, ValidationResult};
use crate::settings::{ValidationApproach, ValidationSettings};
use crate::shape::{ConstraintUnit, ShapeArena};
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use futures::future::join_all;
use shapeflow_db_core::GraphScope;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Whether a run follows the delta or checks the whole store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Transactional,
    Bulk,
}

/// Outcome of one unit
struct UnitOutcome {
    results: Vec<ValidationResult>,
    truncated: bool,
}

pub struct ShaclEngine {
    arena: Arc<ShapeArena>,
    settings: ValidationSettings,
}

impl ShaclEngine {
    pub fn new(arena: ShapeArena, settings: ValidationSettings) -> Self {
        Self {
            arena: Arc::new(arena),
            settings,
        }
    }

    /// Share an arena between engines with different settings
    pub fn with_shared_arena(arena: Arc<ShapeArena>, settings: ValidationSettings) -> Self {
        Self { arena, settings }
    }

    pub fn arena(&self) -> &ShapeArena {
        &self.arena
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// The mode a run over `ctx` uses
    pub fn run_mode(&self, ctx: &ConnectionsGroup) -> RunMode {
        let stats = ctx.stats();
        if stats.is_base_empty() || stats.delta_size() > self.settings.transactional_validation_limit {
            RunMode::Bulk
        } else {
            RunMode::Transactional
        }
    }

    /// Every constraint unit reached from the targets of the active shapes
    pub fn units(&self) -> Vec<ConstraintUnit<'_>> {
        let mut out = Vec::new();
        for root in self.arena.roots() {
            let Some(shape) = self.arena.get(root) else { continue };
            for target in shape.targets() {
                out.extend(self.arena.units(root, &TargetChain::new(target.clone())));
            }
        }
        out
    }

    fn prepare(&self, ctx: &ConnectionsGroup) -> ConnectionsGroup {
        let ctx = if self.settings.rdfs_sub_class_reasoning {
            ctx.clone()
        } else {
            ctx.without_reasoner()
        };
        match &self.settings.data_graph {
            GraphScope::All => ctx,
            graphs => ctx.with_data_graph(graphs.clone()),
        }
    }

    /// Validate the transaction in `ctx` and collect a report
    pub async fn validate(&self, ctx: &ConnectionsGroup) -> Result<ValidationReport> {
        let mut results: Vec<ValidationResult> = Vec::new();
        let truncated = self.validate_into(ctx, &mut results).await?;
        Ok(ValidationReport::from_results(results, truncated))
    }

    /// Validate the transaction in `ctx`, pushing results into `sink`
    ///
    /// Returns whether a result limit cut collection short.
    pub async fn validate_into(&self, ctx: &ConnectionsGroup, sink: &mut dyn ReportSink) -> Result<bool> {
        if !self.settings.validation_enabled {
            tracing::debug!("validation disabled");
            return Ok(false);
        }
        let ctx = self.prepare(ctx);
        let mode = self.run_mode(&ctx);
        let units = self.units();
        let span = tracing::debug_span!(
            "shacl_validate",
            mode = ?mode,
            units = units.len(),
            added = ctx.stats().has_added(),
            removed = ctx.stats().has_removed(),
            violations = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty
        );
        async {
            let span = tracing::Span::current();
            let start = Instant::now();

            let outcomes: Vec<Result<UnitOutcome>> = if self.settings.parallel_validation {
                join_all(units.iter().map(|unit| self.evaluate_unit(&ctx, unit, mode))).await
            } else {
                let mut out = Vec::with_capacity(units.len());
                for unit in &units {
                    out.push(self.evaluate_unit(&ctx, unit, mode).await);
                }
                out
            };

            let mut truncated = false;
            let mut count = 0usize;
            'units: for outcome in outcomes {
                let outcome = outcome?;
                truncated |= outcome.truncated;
                for result in outcome.results {
                    if let Some(limit) = self.settings.validation_results_limit_total {
                        if count >= limit {
                            truncated = true;
                            break 'units;
                        }
                    }
                    if self.settings.log_validation_violations {
                        tracing::info!(result = %result, "shacl violation");
                    }
                    sink.push(result);
                    count += 1;
                }
            }

            span.record("violations", count as u64);
            span.record("elapsed_ms", start.elapsed().as_millis() as u64);
            Ok::<_, ShaclError>(truncated)
        }
        .instrument(span)
        .await
    }

    /// Rendered plan of every unit, as a run over `ctx` would build it
    pub fn explain(&self, ctx: &ConnectionsGroup) -> Result<String> {
        let ctx = self.prepare(ctx);
        let mode = self.run_mode(&ctx);
        let mut out = String::new();
        for unit in self.units() {
            let pc = PlanContext::new(&ctx, &self.arena, &self.settings);
            let shape = self.arena.get(unit.shape).map(|s| s.id().to_string()).unwrap_or_default();
            out.push_str(&format!(
                "{} {} {:?}\n",
                shape,
                unit.constraint.source_component().name(),
                unit.scope
            ));
            match self.plan(&pc, &unit, mode)? {
                Some((plan, _)) => {
                    for line in explain(plan.as_ref()).lines() {
                        out.push_str("  ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                None => out.push_str("  unsupported\n"),
            }
        }
        Ok(out)
    }

    /// The plan for one unit, or `None` when no approach supports it
    fn plan(
        &self,
        pc: &PlanContext<'_>,
        unit: &ConstraintUnit<'_>,
        mode: RunMode,
    ) -> Result<Option<(BoxedPlanNode, ValidationApproach)>> {
        let component = unit.constraint.component();
        let approach = match mode {
            RunMode::Transactional => component.preferred_approach(),
            RunMode::Bulk => component.optimal_bulk_approach(),
        };
        let sparql_available = self.settings.sparql_validation && pc.connections().sparql_executor().is_some();

        if approach == ValidationApproach::SparqlBulk && sparql_available {
            match component.sparql_query(pc, &unit.chain, unit.scope) {
                Ok(query) => {
                    let node: BoxedPlanNode = Box::new(SparqlSelectNode::new(query));
                    return Ok(Some((node, approach)));
                }
                Err(unsupported) => fallback(&unsupported),
            }
        }

        let target = match mode {
            RunMode::Transactional => None,
            RunMode::Bulk => Some(&TargetOverride::AllTargets),
        };
        match component.transactional_plan(pc, &unit.chain, unit.scope, target) {
            Ok(plan) => return Ok(Some((plan, ValidationApproach::Transactional))),
            Err(ShaclError::Unsupported(unsupported)) => fallback(&unsupported),
            Err(e) => return Err(e),
        }

        if mode == RunMode::Transactional && sparql_available {
            if let Ok(query) = component.sparql_query(pc, &unit.chain, unit.scope) {
                let node: BoxedPlanNode = Box::new(SparqlSelectNode::new(query));
                return Ok(Some((node, ValidationApproach::SparqlBulk)));
            }
        }
        Ok(None)
    }

    async fn evaluate_unit(&self, ctx: &ConnectionsGroup, unit: &ConstraintUnit<'_>, mode: RunMode) -> Result<UnitOutcome> {
        let component = unit.constraint.component();
        let shape = self.arena.get(unit.shape);
        let shape_id = shape.map(|s| s.id().to_string()).unwrap_or_default();
        let span = tracing::debug_span!(
            "shacl_unit",
            shape = %shape_id,
            component = component.source_component().name(),
            scope = ?unit.scope,
            approach = tracing::field::Empty,
            violations = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty
        );
        async {
            let span = tracing::Span::current();
            let start = Instant::now();
            let pc = PlanContext::new(ctx, &self.arena, &self.settings);

            if mode == RunMode::Transactional && !component.requires_evaluation(&pc, &unit.chain, unit.scope).await? {
                tracing::debug!("unit skipped, delta cannot affect it");
                return Ok(UnitOutcome {
                    results: Vec::new(),
                    truncated: false,
                });
            }

            let Some((mut plan, approach)) = self.plan(&pc, unit, mode)? else {
                tracing::warn!(shape = %shape_id, "no approach supports this constraint, skipped");
                return Ok(UnitOutcome {
                    results: Vec::new(),
                    truncated: false,
                });
            };
            span.record("approach", tracing::field::debug(approach));
            if self.settings.log_validation_plans {
                tracing::debug!(plan = %explain(plan.as_ref()), "validation plan");
            }

            let limit = self.settings.validation_results_limit_per_constraint;
            let mut tuples = collect(plan.as_mut(), ctx, limit.map(|n| n + 1)).await?;
            let truncated = match limit {
                Some(n) if tuples.len() > n => {
                    tuples.truncate(n);
                    true
                }
                _ => false,
            };
            let results: Vec<ValidationResult> = tuples.iter().map(|t| self.result(unit, t)).collect();

            let elapsed = start.elapsed().as_millis() as u64;
            span.record("violations", results.len() as u64);
            span.record("elapsed_ms", elapsed);
            if self.settings.performance_logging {
                tracing::info!(
                    shape = %shape_id,
                    component = component.source_component().name(),
                    elapsed_ms = elapsed,
                    violations = results.len(),
                    "unit evaluated"
                );
            }
            Ok::<_, ShaclError>(UnitOutcome { results, truncated })
        }
        .instrument(span)
        .await
    }

    fn result(&self, unit: &ConstraintUnit<'_>, tuple: &ValidationTuple) -> ValidationResult {
        let shape = self.arena.get(unit.shape);
        let result_path = match (tuple.result_path(), unit.scope) {
            (Some(predicate), _) => Some(Path::Predicate(predicate.clone())),
            (None, Scope::PropertyShape) => unit.chain.path().cloned(),
            (None, Scope::NodeShape) => None,
        };
        ValidationResult {
            focus_node: tuple.active_target().clone(),
            value: tuple.value().cloned(),
            result_path,
            source_shape: shape.map(|s| s.id().clone()).unwrap_or_else(|| tuple.active_target().clone()),
            source_constraint_component: unit.constraint.source_component(),
            severity: shape.map(|s| s.severity()).unwrap_or_default(),
            scope: unit.scope,
            contexts: tuple.contexts().clone(),
            messages: shape.map(|s| s.messages().to_vec()).unwrap_or_default(),
            details: tuple.details().to_vec(),
        }
    }
}

fn fallback(unsupported: &Unsupported) {
    tracing::debug!(%unsupported, "approach unsupported, falling back");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ConstraintDecl, ShapeDecl, ShapesBuilder};
    use crate::plan::test_support::*;
    use crate::shape::Severity;
    use crate::target::Target;
    use shapeflow_db_core::{Iri, Statement, Term};
    use shapeflow_vocab::rdf;

    fn typed(s: &str) -> Statement {
        Statement::new(t(s), Iri::new(rdf::TYPE), t("Person"))
    }

    fn engine(settings: ValidationSettings) -> ShaclEngine {
        let arena = ShapesBuilder::new()
            .shape(
                ShapeDecl::node(t("PersonShape"))
                    .with_target(Target::Class(Iri::new("http://x/Person")))
                    .with_property(t("KnowsShape")),
            )
            .shape(
                ShapeDecl::property(t("KnowsShape"), Path::predicate("http://x/knows"))
                    .with_constraint(ConstraintDecl::MinCount(1))
                    .with_severity(Severity::Warning),
            )
            .build()
            .unwrap();
        ShaclEngine::new(arena, settings)
    }

    #[tokio::test]
    async fn test_run_mode_policies() {
        let e = engine(ValidationSettings::default());
        let empty_base = ctx_with(vec![], vec![typed("a")], vec![]).await;
        assert_eq!(e.run_mode(&empty_base), RunMode::Bulk);

        let small = ctx_with(vec![typed("b")], vec![typed("a")], vec![]).await;
        assert_eq!(e.run_mode(&small), RunMode::Transactional);

        let limited = engine(ValidationSettings::default().with_transactional_validation_limit(0));
        assert_eq!(limited.run_mode(&small), RunMode::Bulk);
    }

    #[tokio::test]
    async fn test_severity_and_limits() {
        let ctx = ctx_with(vec![typed("z")], vec![typed("a"), typed("b"), typed("c")], vec![]).await;
        let report = engine(ValidationSettings::default()).validate(&ctx).await.unwrap();
        assert_eq!(report.results.len(), 3);
        assert!(report.conforms, "warnings do not break conformance");
        assert!(!report.truncated);
        let r = &report.results[0];
        assert_eq!(r.result_path, Some(Path::predicate("http://x/knows")));
        assert_eq!(r.source_shape, t("KnowsShape"));

        let limited = engine(ValidationSettings::default().with_validation_results_limit_per_constraint(Some(2)));
        let report = limited.validate(&ctx).await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(report.truncated);

        let total = engine(
            ValidationSettings::default()
                .with_parallel_validation(false)
                .with_validation_results_limit_total(Some(1)),
        );
        let report = total.validate(&ctx).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn test_disabled_and_explain() {
        let ctx = ctx_with(vec![typed("z")], vec![typed("a")], vec![]).await;
        let report = engine(ValidationSettings::default().with_validation_enabled(false))
            .validate(&ctx)
            .await
            .unwrap();
        assert!(report.conforms && report.results.is_empty());

        let text = engine(ValidationSettings::default()).explain(&ctx).unwrap();
        assert!(text.starts_with("<http://x/KnowsShape> MinCount PropertyShape\n"));
        assert!(text.contains("GroupByCountFilter"));
    }

    #[tokio::test]
    async fn test_unaffected_units_are_skipped() {
        let ctx = ctx_with(
            vec![typed("a")],
            vec![Statement::new(t("x"), Iri::new("http://x/other"), Term::integer(1))],
            vec![],
        )
        .await;
        let report = engine(ValidationSettings::default()).validate(&ctx).await.unwrap();
        assert!(report.results.is_empty(), "a lacks knows but nothing touched it");
    }
}
