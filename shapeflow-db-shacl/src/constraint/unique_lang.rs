//! `sh:uniqueLang`

use super::{focus_targets, value_path, ConstraintComponent, PlanContext, SourceConstraintComponent, TargetOverride};
use crate::error::Result;
use crate::path::DeltaSides;
use crate::plan::{BoxedPlanNode, BulkedExternalJoin, EmptyNode, GroupByFilter, GroupPredicate, Sort, TrimToTarget};
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// No two values of a focus node share a language tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueLang {
    pub enabled: bool,
}

impl UniqueLang {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

fn has_duplicate_lang(group: &[ValidationTuple]) -> bool {
    let mut seen = FxHashSet::default();
    group
        .iter()
        .filter_map(|t| t.value())
        .filter_map(|v| v.as_literal())
        .filter_map(|lit| lit.language())
        .any(|lang| !seen.insert(lang))
}

#[async_trait]
impl ConstraintComponent for UniqueLang {
    fn source_component(&self) -> SourceConstraintComponent {
        SourceConstraintComponent::UniqueLang
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        if !self.enabled {
            return Ok(Box::new(EmptyNode::new()));
        }
        let path = value_path(chain, scope, self.source_component())?;
        let targets = focus_targets(pc, chain, scope, target, DeltaSides::ADDED);
        let joined = BulkedExternalJoin::inner(targets, path.clone(), pc.bulk_size());
        let duplicate: GroupPredicate = Arc::new(has_duplicate_lang);
        let grouped = GroupByFilter::new(Sort::new(Box::new(joined)), duplicate);
        Ok(Box::new(TrimToTarget::new(Box::new(grouped))))
    }
}
