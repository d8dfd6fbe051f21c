//! `sh:hasValue`

use super::{
    filter_query, focus_targets, value_path, ConstraintComponent, PlanContext,
    SourceConstraintComponent, TargetOverride,
};
use crate::error::{Result, Unsupported};
use crate::fragment::SparqlFragment;
use crate::matcher::Variable;
use crate::path::DeltaSides;
use crate::plan::{
    BoxedPlanNode, BulkedExternalJoin, FilterNode, GroupByFilter, GroupPredicate, Sort, TrimToTarget, TuplePredicate,
};
use crate::query::ValidationQuery;
use crate::settings::ValidationApproach;
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use shapeflow_db_core::Term;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasValue {
    value: Term,
}

impl HasValue {
    pub fn new(value: Term) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Term {
        &self.value
    }
}

#[async_trait]
impl ConstraintComponent for HasValue {
    fn source_component(&self) -> SourceConstraintComponent {
        SourceConstraintComponent::HasValue
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        let expected = self.value.clone();
        match scope {
            Scope::NodeShape => {
                let targets = focus_targets(pc, chain, scope, target, DeltaSides::ADDED);
                let predicate: TuplePredicate = Arc::new(move |t: &ValidationTuple| t.active_target() == &expected);
                Ok(Box::new(FilterNode::failing(targets, "HasValue", predicate)))
            }
            Scope::PropertyShape => {
                // removing the value breaks it, so removals count
                let path = value_path(chain, scope, self.source_component())?;
                let targets = focus_targets(pc, chain, scope, target, DeltaSides::BOTH);
                let joined = BulkedExternalJoin::left_outer(targets, path.clone(), pc.bulk_size());
                let missing: GroupPredicate =
                    Arc::new(move |group: &[ValidationTuple]| !group.iter().any(|t| t.value() == Some(&expected)));
                let grouped = GroupByFilter::new(Sort::new(Box::new(joined)), missing);
                Ok(Box::new(TrimToTarget::new(Box::new(grouped))))
            }
        }
    }

    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        match scope {
            Scope::NodeShape => Ok(filter_query(pc, chain, scope, &|v| {
                SparqlFragment::filter(format!("sameTerm({}, {})", v, self.value), Vec::new())
            })),
            Scope::PropertyShape => {
                let Some(path) = chain.path() else {
                    return Err(Unsupported::new(
                        "HasValue",
                        scope,
                        ValidationApproach::SparqlBulk,
                        "property scope without a path",
                    ));
                };
                let targets = pc.effective(chain, scope).query(pc.connections(), pc.vars());
                let body = format!(
                    "{}\nFILTER NOT EXISTS {{ {} {} {} . }}",
                    targets.fragment.as_pattern(),
                    targets.active_var(),
                    pc.connections().renderer().render(path),
                    self.value
                );
                Ok(ValidationQuery::new(body, targets.target_vars, None, scope))
            }
        }
    }

    fn valid_filter(&self, _pc: &PlanContext<'_>, value: &Variable) -> Option<SparqlFragment> {
        Some(SparqlFragment::filter(
            format!("sameTerm({}, {})", value, self.value),
            Vec::new(),
        ))
    }

    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::SparqlBulk
    }
}
