//! `sh:minCount` and `sh:maxCount`
//!
//! Both group the joined values per target and compare the distinct count.
//! A minimum can be broken by removing values, so its affected targets
//! include removals; a maximum only by adding them.

use super::{
    focus_targets, value_path, value_query, ConstraintComponent, PlanContext, SourceConstraintComponent,
    TargetOverride,
};
use crate::error::{Result, Unsupported};
use crate::path::DeltaSides;
use crate::plan::{BoxedPlanNode, BulkedExternalJoin, EmptyNode, GroupByCountFilter, Sort, TrimToTarget};
use crate::query::ValidationQuery;
use crate::settings::ValidationApproach;
use crate::target::TargetChain;
use crate::tuple::Scope;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinCount {
    pub min: usize,
}

impl MinCount {
    pub fn new(min: usize) -> Self {
        Self { min }
    }
}

#[async_trait]
impl ConstraintComponent for MinCount {
    fn source_component(&self) -> SourceConstraintComponent {
        SourceConstraintComponent::MinCount
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        if self.min == 0 {
            return Ok(Box::new(EmptyNode::new()));
        }
        let path = value_path(chain, scope, self.source_component())?;
        let targets = focus_targets(pc, chain, scope, target, DeltaSides::BOTH);
        let joined = BulkedExternalJoin::left_outer(targets, path.clone(), pc.bulk_size());
        let min = self.min;
        let grouped = GroupByCountFilter::new(Sort::new(Box::new(joined)), "MinCount", move |n| n < min);
        Ok(Box::new(TrimToTarget::new(Box::new(grouped))))
    }

    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        if scope != Scope::PropertyShape || self.min == 0 {
            return Err(Unsupported::new(
                "MinCount",
                scope,
                ValidationApproach::SparqlBulk,
                "only positive counts on property shapes",
            ));
        }
        let q = value_query(pc, chain, scope, true);
        let having = format!("COUNT(DISTINCT {}) < {}", q.value, self.min);
        Ok(ValidationQuery::new(q.body, q.target_vars, Some(q.value), scope).with_having(having))
    }

    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::SparqlBulk
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxCount {
    pub max: usize,
}

impl MaxCount {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

#[async_trait]
impl ConstraintComponent for MaxCount {
    fn source_component(&self) -> SourceConstraintComponent {
        SourceConstraintComponent::MaxCount
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        let path = value_path(chain, scope, self.source_component())?;
        let targets = focus_targets(pc, chain, scope, target, DeltaSides::ADDED);
        let joined = BulkedExternalJoin::inner(targets, path.clone(), pc.bulk_size());
        let max = self.max;
        let grouped = GroupByCountFilter::new(Sort::new(Box::new(joined)), "MaxCount", move |n| n > max);
        Ok(Box::new(TrimToTarget::new(Box::new(grouped))))
    }

    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        if scope != Scope::PropertyShape {
            return Err(Unsupported::new(
                "MaxCount",
                scope,
                ValidationApproach::SparqlBulk,
                "only property shapes have counts",
            ));
        }
        let q = value_query(pc, chain, scope, false);
        let having = format!("COUNT(DISTINCT {}) > {}", q.value, self.max);
        Ok(ValidationQuery::new(q.body, q.target_vars, Some(q.value), scope).with_having(having))
    }

    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::SparqlBulk
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::shape::ShapeArena;
    use shapeflow_db_core::Term;

    #[tokio::test]
    async fn test_min_count_sees_removed_values() {
        // a loses its only friend, b gains one, c is new without any
        let ctx = ctx_with(
            vec![
                typed("a", "Person"),
                typed("b", "Person"),
                st("a", "knows", t("b")),
            ],
            vec![typed("c", "Person"), st("b", "knows", t("a"))],
            vec![st("a", "knows", t("b"))],
        )
        .await;
        let arena = ShapeArena::default();
        let (delta, all) = run(&MinCount::new(1), &arena, &ctx, &people_via("knows"), Scope::PropertyShape).await;
        assert_eq!(chains(&delta), vec![vec![t("a")], vec![t("c")]]);
        assert_eq!(chains(&all), chains(&delta));
        assert!(delta.iter().all(|t| t.value().is_none()));
    }

    #[tokio::test]
    async fn test_max_count_boundary() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), typed("b", "Person")],
            vec![
                st("a", "name", Term::string("x")),
                st("a", "name", Term::string("y")),
                st("b", "name", Term::string("x")),
            ],
            vec![],
        )
        .await;
        let arena = ShapeArena::default();
        let (at_max, _) = run(&MaxCount::new(2), &arena, &ctx, &people_via("name"), Scope::PropertyShape).await;
        assert!(at_max.is_empty());
        let (over, _) = run(&MaxCount::new(1), &arena, &ctx, &people_via("name"), Scope::PropertyShape).await;
        assert_eq!(chains(&over), vec![vec![t("a")]]);
    }

    #[tokio::test]
    async fn test_zero_min_count_is_empty() {
        let ctx = ctx_with(vec![], vec![typed("a", "Person")], vec![]).await;
        let (delta, _) = run(
            &MinCount::new(0),
            &ShapeArena::default(),
            &ctx,
            &people_via("knows"),
            Scope::PropertyShape,
        )
        .await;
        assert!(delta.is_empty());
    }

    #[tokio::test]
    async fn test_min_count_query_groups() {
        let ctx = empty_ctx().await;
        let arena = ShapeArena::default();
        let settings = settings();
        let pc = PlanContext::new(&ctx, &arena, &settings);
        let q = MinCount::new(2)
            .sparql_query(&pc, &people_via("knows"), Scope::PropertyShape)
            .unwrap();
        let text = q.to_select();
        assert!(text.contains("OPTIONAL { ?target_0000000000 <http://x/knows> ?value . }"));
        assert!(text.ends_with("HAVING (COUNT(DISTINCT ?value) < 2)"));
    }
}
