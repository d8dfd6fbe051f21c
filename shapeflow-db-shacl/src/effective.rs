//! Effective targets
//!
//! An [`EffectiveTarget`] is a [`TargetChain`](crate::target::TargetChain)
//! resolved for one scope. It enumerates chains `[t0 .. tn]`, where `t0` is a
//! member of the root target and each `t(k+1)` is reached from `tk` through
//! hop `k`. At property scope the last hop of the chain is split off as the
//! optional value path; the active target is then the node the values hang
//! off.
//!
//! Chains are computed in bulk: every hop is one batched path evaluation
//! per `bulk_size` nodes, forward (extend right) or inverse (extend left).

use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::fragment::SparqlFragment;
use crate::matcher::{any_could_match, Role, StableVariableProvider, StatementMatcher, Variable};
use crate::path::{DeltaNodes, DeltaSides, Path};
use crate::plan::{
    BoxedPlanNode, Direction, ExtendNode, PathDeltaNode, TargetChainNode, TargetFilterNode, TargetMode, UniqueKey,
    UniqueNode,
};
use crate::target::Target;
use crate::tuple::{Scope, ValidationTuple};
use rustc_hash::FxHashSet;
use shapeflow_db_core::Term;
use std::sync::Arc;

pub type Chain = Vec<Term>;

fn distinct_chains(chains: Vec<Chain>) -> Vec<Chain> {
    let mut seen = FxHashSet::default();
    chains.into_iter().filter(|c| seen.insert(c.clone())).collect()
}

fn distinct_nodes<'a>(nodes: impl Iterator<Item = &'a Term>) -> Vec<Term> {
    let mut seen = FxHashSet::default();
    nodes.filter(|n| seen.insert(*n)).cloned().collect()
}

/// Target variables and graph pattern of an effective target
#[derive(Debug, Clone)]
pub struct TargetQuery {
    pub fragment: SparqlFragment,
    /// One variable per chain position, root first
    pub target_vars: Vec<Variable>,
}

impl TargetQuery {
    pub fn active_var(&self) -> &Variable {
        &self.target_vars[self.target_vars.len() - 1]
    }
}

#[derive(Debug, Clone)]
pub struct EffectiveTarget {
    target: Target,
    paths: Vec<Path>,
    optional: Option<Path>,
    scope: Scope,
    bulk_size: usize,
}

impl EffectiveTarget {
    pub fn new(target: Target, paths: Vec<Path>, optional: Option<Path>, scope: Scope, bulk_size: usize) -> Self {
        Self {
            target,
            paths,
            optional,
            scope,
            bulk_size: bulk_size.max(1),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// The value path at property scope
    pub fn optional(&self) -> Option<&Path> {
        self.optional.as_ref()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    /// Number of nodes in a complete chain
    pub fn chain_len(&self) -> usize {
        self.paths.len() + 1
    }

    pub(crate) fn tuple(&self, chain: Chain, ctx: &ConnectionsGroup) -> ValidationTuple {
        ValidationTuple::new(chain, self.scope, false, ctx.contexts().clone())
    }

    /// Extend chains to full length through the remaining hops
    pub async fn forward(&self, ctx: &ConnectionsGroup, chains: Vec<Chain>) -> Result<Vec<Chain>> {
        let mut open = chains;
        for (k, path) in self.paths.iter().enumerate() {
            let (extend, keep): (Vec<Chain>, Vec<Chain>) = open.into_iter().partition(|c| c.len() == k + 1);
            if extend.is_empty() {
                open = keep;
                continue;
            }
            let heads = distinct_nodes(extend.iter().filter_map(|c| c.last()));
            let next = path
                .evaluate_chunked(ctx.current(), ctx.data_graph(), &heads, self.bulk_size, true)
                .await?;
            open = keep;
            for chain in extend {
                let Some(head) = chain.last() else { continue };
                for end in next.get(head).into_iter().flatten() {
                    let mut longer = chain.clone();
                    longer.push(end.clone());
                    open.push(longer);
                }
            }
        }
        let full = self.chain_len();
        Ok(distinct_chains(open.into_iter().filter(|c| c.len() == full).collect()))
    }

    /// Chains `[t0 .. t_position]` ending in `nodes`, with `t0` in the target
    pub async fn backward(&self, ctx: &ConnectionsGroup, position: usize, nodes: &[Term]) -> Result<Vec<Chain>> {
        // reversed while walking: [t_position, .., t0]
        let mut partial: Vec<Chain> = distinct_nodes(nodes.iter()).into_iter().map(|n| vec![n]).collect();
        for k in (0..position.min(self.paths.len())).rev() {
            let heads = distinct_nodes(partial.iter().filter_map(|c| c.last()));
            if heads.is_empty() {
                return Ok(Vec::new());
            }
            let previous = self.paths[k]
                .evaluate_chunked(ctx.current(), ctx.data_graph(), &heads, self.bulk_size, false)
                .await?;
            let mut next = Vec::new();
            for chain in partial {
                let Some(head) = chain.last() else { continue };
                for p in previous.get(head).into_iter().flatten() {
                    let mut longer = chain.clone();
                    longer.push(p.clone());
                    next.push(longer);
                }
            }
            partial = next;
        }
        let roots = distinct_nodes(partial.iter().filter_map(|c| c.last()));
        let members = self.target.members(ctx, &roots).await?;
        Ok(distinct_chains(
            partial
                .into_iter()
                .filter(|c| c.last().map_or(false, |r| members.contains(r)))
                .map(|mut c| {
                    c.reverse();
                    c
                })
                .collect(),
        ))
    }

    /// Keep the chains (complete or prefixes) that exist in the post-transaction state
    pub async fn verify(&self, ctx: &ConnectionsGroup, chains: Vec<Chain>) -> Result<Vec<Chain>> {
        let roots = distinct_nodes(chains.iter().filter_map(|c| c.first()));
        let members = self.target.members(ctx, &roots).await?;
        let mut valid: Vec<Chain> = chains
            .into_iter()
            .filter(|c| !c.is_empty() && c.len() <= self.chain_len() && members.contains(&c[0]))
            .collect();
        for (k, path) in self.paths.iter().enumerate() {
            let heads = distinct_nodes(valid.iter().filter(|c| c.len() > k + 1).map(|c| &c[k]));
            if heads.is_empty() {
                break;
            }
            let next = path
                .evaluate_chunked(ctx.current(), ctx.data_graph(), &heads, self.bulk_size, true)
                .await?;
            valid.retain(|c| {
                c.len() <= k + 1 || next.get(&c[k]).map_or(false, |ends| ends.contains(&c[k + 1]))
            });
        }
        Ok(valid)
    }

    /// Every chain in the post-transaction state
    pub async fn all_chains(&self, ctx: &ConnectionsGroup) -> Result<Vec<Chain>> {
        let roots = self.target.all_nodes(ctx).await?;
        self.forward(ctx, roots.into_iter().map(|r| vec![r]).collect()).await
    }

    /// Chains whose root membership or hops changed in this transaction
    pub async fn delta_chains(&self, ctx: &ConnectionsGroup, include_removed: bool) -> Result<Vec<Chain>> {
        let sides = if include_removed { DeltaSides::BOTH } else { DeltaSides::ADDED };
        let mut chains = Vec::new();
        if !self.target.is_static() {
            let candidates = self.target.delta_nodes(ctx, include_removed).await?;
            let members = self.target.members(ctx, &candidates).await?;
            let roots: Vec<Chain> = candidates
                .into_iter()
                .filter(|c| members.contains(c))
                .map(|r| vec![r])
                .collect();
            chains.extend(self.forward(ctx, roots).await?);
        }
        for (k, path) in self.paths.iter().enumerate() {
            match path.delta_nodes(ctx, sides).await? {
                DeltaNodes::All => return self.all_chains(ctx).await,
                DeltaNodes::Nodes(nodes) if nodes.is_empty() => {}
                DeltaNodes::Nodes(nodes) => {
                    let prefixes = self.backward(ctx, k, &nodes).await?;
                    chains.extend(self.forward(ctx, prefixes).await?);
                }
            }
        }
        Ok(distinct_chains(chains))
    }

    /// Complete chains extending verified prefixes
    pub async fn extend_right(&self, ctx: &ConnectionsGroup, prefixes: Vec<Chain>) -> Result<Vec<Chain>> {
        let prefixes = self.verify(ctx, prefixes).await?;
        self.forward(ctx, prefixes).await
    }

    /// Complete chains whose active target is one of `nodes`
    pub async fn extend_left(&self, ctx: &ConnectionsGroup, nodes: &[Term]) -> Result<Vec<Chain>> {
        self.backward(ctx, self.paths.len(), nodes).await
    }

    /// Statement matchers for the target and every hop
    pub fn matchers(&self, ctx: &ConnectionsGroup, vars: &StableVariableProvider) -> Vec<StatementMatcher> {
        let root = vars.next();
        let mut out = self.target.matchers(&root, ctx, vars);
        let mut from = Role::Var(root);
        for path in &self.paths {
            let to = Role::Var(vars.next());
            out.extend(path.matchers(from, to.clone(), vars));
            from = to;
        }
        out
    }

    /// Whether the transaction could have changed any chain
    pub async fn could_match(&self, ctx: &ConnectionsGroup, vars: &StableVariableProvider) -> Result<bool> {
        any_could_match(&self.matchers(ctx, vars), ctx).await
    }

    /// Graph pattern binding the chain variables
    pub fn query(&self, ctx: &ConnectionsGroup, vars: &StableVariableProvider) -> TargetQuery {
        let names = StableVariableProvider::new("target");
        let target_vars: Vec<Variable> = (0..self.chain_len()).map(|_| names.next()).collect();
        let mut fragments = vec![self.target.query_fragment(&target_vars[0], ctx, vars)];
        for (k, path) in self.paths.iter().enumerate() {
            fragments.push(path.query_fragment(&target_vars[k], &target_vars[k + 1], ctx.renderer(), vars));
        }
        TargetQuery {
            fragment: SparqlFragment::join(&fragments),
            target_vars,
        }
    }

    /// Target tuples: every chain, or only those touched by the delta
    pub fn plan(self: &Arc<Self>, mode: TargetMode) -> BoxedPlanNode {
        Box::new(TargetChainNode::new(self.clone(), mode))
    }

    pub fn all_targets(self: &Arc<Self>) -> BoxedPlanNode {
        self.plan(TargetMode::All)
    }

    pub fn plan_node(self: &Arc<Self>, include_removed: bool) -> BoxedPlanNode {
        self.plan(TargetMode::Delta { include_removed })
    }

    /// Complete chains reachable from the source's tuples
    pub fn extend(self: &Arc<Self>, source: BoxedPlanNode, direction: Direction, dedupe: bool) -> BoxedPlanNode {
        let node: BoxedPlanNode = Box::new(ExtendNode::new(self.clone(), source, direction));
        if dedupe {
            Box::new(UniqueNode::new(node, UniqueKey::TargetChain))
        } else {
            node
        }
    }

    /// Source tuples whose target chain is a current chain of this target
    pub fn target_filter(self: &Arc<Self>, source: BoxedPlanNode) -> BoxedPlanNode {
        Box::new(TargetFilterNode::new(self.clone(), source))
    }

    /// Targets whose values along `path` changed
    pub fn path_delta(self: &Arc<Self>, path: Path, sides: DeltaSides) -> BoxedPlanNode {
        Box::new(PathDeltaNode::new(self.clone(), path, sides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::collect;
    use crate::plan::test_support::*;
    use shapeflow_db_core::{Iri, Statement};
    use shapeflow_vocab::rdf;

    fn typed(s: &str, class: &str) -> Statement {
        Statement::new(t(s), Iri::new(rdf::TYPE), t(class))
    }

    fn knows(s: &str, o: &str) -> Statement {
        Statement::new(t(s), Iri::new("http://x/knows"), t(o))
    }

    fn person_knows(scope: Scope) -> Arc<EffectiveTarget> {
        Arc::new(EffectiveTarget::new(
            Target::Class(Iri::new("http://x/Person")),
            vec![Path::predicate("http://x/knows")],
            None,
            scope,
            10,
        ))
    }

    #[tokio::test]
    async fn test_all_and_delta_chains() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), knows("a", "b")],
            vec![typed("c", "Person"), knows("c", "d"), knows("a", "e")],
            vec![],
        )
        .await;
        let target = person_knows(Scope::NodeShape);
        let mut all = target.all_chains(&ctx).await.unwrap();
        all.sort();
        assert_eq!(all, vec![vec![t("a"), t("b")], vec![t("a"), t("e")], vec![t("c"), t("d")]]);

        // a knows a new node, so every chain through a is revisited
        let mut delta = target.delta_chains(&ctx, false).await.unwrap();
        delta.sort();
        assert_eq!(delta, all);

        let removed_only = ctx_with(vec![typed("a", "Person"), knows("a", "b")], vec![], vec![knows("a", "b")]).await;
        assert!(target.delta_chains(&removed_only, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extend_left_and_verify() {
        let ctx = ctx_with(
            vec![typed("a", "Person"), knows("a", "b"), knows("z", "b")],
            vec![],
            vec![],
        )
        .await;
        let target = person_knows(Scope::NodeShape);
        let left = target.extend_left(&ctx, &[t("b")]).await.unwrap();
        assert_eq!(left, vec![vec![t("a"), t("b")]]);

        let verified = target
            .verify(&ctx, vec![vec![t("a"), t("b")], vec![t("z"), t("b")], vec![t("a"), t("q")], vec![t("a")]])
            .await
            .unwrap();
        assert_eq!(verified, vec![vec![t("a"), t("b")], vec![t("a")]]);
    }

    #[tokio::test]
    async fn test_plan_nodes_emit_target_tuples() {
        let ctx = ctx_with(vec![typed("a", "Person"), knows("a", "b")], vec![], vec![]).await;
        let target = person_knows(Scope::PropertyShape);
        let out = collect(target.all_targets().as_mut(), &ctx, None).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].scope(), Scope::PropertyShape);
        assert!(!out[0].has_value());
        assert_eq!(out[0].active_target(), &t("b"));
        assert!(collect(target.plan_node(true).as_mut(), &ctx, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_could_match_and_query() {
        let ctx = ctx_with(vec![], vec![knows("a", "b")], vec![]).await;
        let vars = StableVariableProvider::new("tmp");
        assert!(person_knows(Scope::NodeShape).could_match(&ctx, &vars).await.unwrap());
        let unrelated = EffectiveTarget::new(Target::Class(Iri::new("http://x/Dog")), vec![], None, Scope::NodeShape, 10);
        assert!(!unrelated.could_match(&ctx, &vars).await.unwrap());

        let q = person_knows(Scope::NodeShape).query(&ctx, &vars);
        assert_eq!(q.target_vars[0].name(), "target_0000000000");
        assert_eq!(
            q.fragment.text(),
            "?target_0000000000 a <http://x/Person> .\n?target_0000000000 <http://x/knows> ?target_0000000001 ."
        );
    }
}
