//! Target declarations and target chains
//!
//! A [`Target`] names the focus nodes of a shape. A [`TargetChain`] is a
//! target followed by the path hops that lead from the root focus nodes to
//! the nodes a nested shape applies to.

use crate::connections::ConnectionsGroup;
use crate::effective::EffectiveTarget;
use crate::error::Result;
use crate::fragment::SparqlFragment;
use crate::matcher::{Role, StableVariableProvider, StatementMatcher, Variable};
use crate::path::Path;
use crate::tuple::Scope;
use rustc_hash::FxHashSet;
use shapeflow_db_core::{Connection, Iri, Term, TriplePattern};
use shapeflow_vocab::rdf;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// `sh:targetClass`
    Class(Iri),
    /// `sh:targetNode`
    Node(Vec<Term>),
    /// `sh:targetSubjectsOf`
    SubjectsOf(Iri),
    /// `sh:targetObjectsOf`
    ObjectsOf(Iri),
    /// A shape that is also a class targets its instances
    ImplicitClass(Iri),
}

fn rdf_type() -> Iri {
    Iri::new(rdf::TYPE)
}

fn distinct(nodes: Vec<Term>) -> Vec<Term> {
    let mut seen = FxHashSet::default();
    nodes.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

impl Target {
    fn class(&self) -> Option<&Iri> {
        match self {
            Target::Class(c) | Target::ImplicitClass(c) => Some(c),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::Class(_) => "targetClass",
            Target::Node(_) => "targetNode",
            Target::SubjectsOf(_) => "targetSubjectsOf",
            Target::ObjectsOf(_) => "targetObjectsOf",
            Target::ImplicitClass(_) => "implicitClass",
        }
    }

    /// Node targets do not depend on store content
    pub fn is_static(&self) -> bool {
        matches!(self, Target::Node(_))
    }

    fn scan_patterns(&self, ctx: &ConnectionsGroup) -> Vec<TriplePattern> {
        match self {
            Target::Class(_) | Target::ImplicitClass(_) => self
                .class()
                .map(|c| ctx.expand_class(c))
                .unwrap_or_default()
                .into_iter()
                .map(|c| TriplePattern::predicate_object(rdf_type(), Term::Iri(c)))
                .collect(),
            Target::SubjectsOf(p) | Target::ObjectsOf(p) => vec![TriplePattern::predicate(p.clone())],
            Target::Node(_) => Vec::new(),
        }
    }

    async fn scan(&self, ctx: &ConnectionsGroup, conn: &dyn Connection) -> Result<Vec<Term>> {
        if let Target::Node(nodes) = self {
            return Ok(nodes.clone());
        }
        let patterns = self.scan_patterns(ctx);
        let found = conn.statements_bulk(&patterns, ctx.data_graph()).await?;
        let nodes = found
            .into_iter()
            .flatten()
            .map(|st| match self {
                Target::ObjectsOf(_) => st.object,
                _ => st.subject,
            })
            .collect();
        Ok(distinct(nodes))
    }

    /// Every node currently in the target
    pub async fn all_nodes(&self, ctx: &ConnectionsGroup) -> Result<Vec<Term>> {
        self.scan(ctx, ctx.current()).await
    }

    /// Candidate nodes whose membership may have changed in this transaction
    ///
    /// Not filtered by membership; callers confirm with [`Target::members`].
    pub async fn delta_nodes(&self, ctx: &ConnectionsGroup, include_removed: bool) -> Result<Vec<Term>> {
        if self.is_static() {
            return self.scan(ctx, ctx.current()).await;
        }
        let mut nodes = Vec::new();
        if ctx.stats().has_added() {
            nodes.extend(self.scan(ctx, ctx.added()).await?);
        }
        if include_removed && ctx.stats().has_removed() {
            nodes.extend(self.scan(ctx, ctx.removed()).await?);
        }
        Ok(distinct(nodes))
    }

    /// The subset of `nodes` currently in the target
    pub async fn members(&self, ctx: &ConnectionsGroup, nodes: &[Term]) -> Result<FxHashSet<Term>> {
        let graphs = ctx.data_graph();
        match self {
            Target::Node(listed) => Ok(nodes.iter().filter(|n| listed.contains(n)).cloned().collect()),
            Target::Class(c) | Target::ImplicitClass(c) => {
                let classes: FxHashSet<Term> = ctx.expand_class(c).into_iter().map(Term::Iri).collect();
                let patterns: Vec<TriplePattern> = nodes
                    .iter()
                    .map(|n| TriplePattern::subject_predicate(n.clone(), rdf_type()))
                    .collect();
                let found = ctx.current().statements_bulk(&patterns, graphs).await?;
                Ok(nodes
                    .iter()
                    .zip(found)
                    .filter(|(_, sts)| sts.iter().any(|st| classes.contains(&st.object)))
                    .map(|(n, _)| n.clone())
                    .collect())
            }
            Target::SubjectsOf(p) | Target::ObjectsOf(p) => {
                let subjects = matches!(self, Target::SubjectsOf(_));
                let patterns: Vec<TriplePattern> = nodes
                    .iter()
                    .map(|n| {
                        if subjects {
                            TriplePattern::subject_predicate(n.clone(), p.clone())
                        } else {
                            TriplePattern::predicate_object(p.clone(), n.clone())
                        }
                    })
                    .collect();
                let found = ctx.current().statements_bulk(&patterns, graphs).await?;
                Ok(nodes
                    .iter()
                    .zip(found)
                    .filter(|(_, sts)| !sts.is_empty())
                    .map(|(n, _)| n.clone())
                    .collect())
            }
        }
    }

    pub fn matchers(&self, var: &Variable, ctx: &ConnectionsGroup, vars: &StableVariableProvider) -> Vec<StatementMatcher> {
        match self {
            Target::Class(c) | Target::ImplicitClass(c) => ctx
                .expand_class(c)
                .into_iter()
                .map(|c| StatementMatcher::new(var.clone(), Term::Iri(rdf_type()), Term::Iri(c)))
                .collect(),
            Target::SubjectsOf(p) => vec![StatementMatcher::new(
                var.clone(),
                Term::Iri(p.clone()),
                Role::Var(vars.next()),
            )],
            Target::ObjectsOf(p) => vec![StatementMatcher::new(
                Role::Var(vars.next()),
                Term::Iri(p.clone()),
                var.clone(),
            )],
            Target::Node(_) => Vec::new(),
        }
    }

    pub fn query_fragment(&self, var: &Variable, ctx: &ConnectionsGroup, vars: &StableVariableProvider) -> SparqlFragment {
        let matchers = self.matchers(var, ctx, vars);
        let text = match self {
            Target::Node(nodes) => format!(
                "VALUES {} {{ {} }}",
                var,
                nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" ")
            ),
            Target::Class(_) | Target::ImplicitClass(_) => {
                let classes: Vec<String> = matchers.iter().map(|m| m.object.to_string()).collect();
                if classes.len() == 1 {
                    format!("{} a {} .", var, classes[0])
                } else {
                    let class_var = vars.next();
                    format!(
                        "VALUES {} {{ {} }}\n{} a {} .",
                        class_var,
                        classes.join(" "),
                        var,
                        class_var
                    )
                }
            }
            Target::SubjectsOf(_) | Target::ObjectsOf(_) => {
                matchers.iter().map(|m| m.to_string()).collect::<Vec<_>>().join("\n")
            }
        };
        SparqlFragment::pattern(text, matchers)
    }
}

/// One link of a target chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainLink {
    Target(Target),
    Path(Path),
}

/// A target followed by zero or more path hops
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetChain {
    target: Target,
    paths: Vec<Path>,
}

impl TargetChain {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            paths: Vec::new(),
        }
    }

    /// The chain extended by one path hop
    pub fn with_path(&self, path: Path) -> Self {
        let mut out = self.clone();
        out.paths.push(path);
        out
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// The last hop, if any
    pub fn path(&self) -> Option<&Path> {
        self.paths.last()
    }

    pub fn links(&self) -> Vec<ChainLink> {
        std::iter::once(ChainLink::Target(self.target.clone()))
            .chain(self.paths.iter().cloned().map(ChainLink::Path))
            .collect()
    }

    /// Resolve the chain for a scope
    ///
    /// At property scope the last hop becomes the optional value path.
    pub fn effective_target(&self, scope: Scope, bulk_size: usize) -> EffectiveTarget {
        let (chain_paths, optional) = match (scope, self.paths.split_last()) {
            (Scope::PropertyShape, Some((last, rest))) => (rest.to_vec(), Some(last.clone())),
            _ => (self.paths.clone(), None),
        };
        EffectiveTarget::new(self.target.clone(), chain_paths, optional, scope, bulk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapeflow_db_core::{MemoryStore, SchemaHierarchy, Statement};
    use shapeflow_vocab::rdfs;
    use std::sync::Arc;

    fn t(s: &str) -> Term {
        Term::iri(format!("http://x/{}", s))
    }

    fn typed(s: &str, class: &str) -> Statement {
        Statement::new(t(s), rdf_type(), t(class))
    }

    async fn ctx(base: Vec<Statement>, added: Vec<Statement>) -> ConnectionsGroup {
        ConnectionsGroup::new(
            Arc::new(MemoryStore::from_statements(base)),
            Arc::new(MemoryStore::from_statements(added)),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_class_target_with_reasoner() {
        let sub = Statement::new(t("Student"), Iri::new(rdfs::SUB_CLASS_OF), t("Person"));
        let hierarchy = SchemaHierarchy::from_statements([&sub]);
        let ctx = ctx(vec![typed("a", "Person"), typed("b", "Student")], vec![typed("c", "Dog")])
            .await
            .with_reasoner(Arc::new(hierarchy));
        let target = Target::Class(Iri::new("http://x/Person"));
        let mut all = target.all_nodes(&ctx).await.unwrap();
        all.sort();
        assert_eq!(all, vec![t("a"), t("b")]);
        let members = target.members(&ctx, &[t("b"), t("c")]).await.unwrap();
        assert!(members.contains(&t("b")));
        assert!(!members.contains(&t("c")));
    }

    #[tokio::test]
    async fn test_delta_nodes_read_added_view() {
        let ctx = ctx(vec![typed("a", "Person")], vec![typed("b", "Person")]).await;
        let target = Target::Class(Iri::new("http://x/Person"));
        assert_eq!(target.delta_nodes(&ctx, true).await.unwrap(), vec![t("b")]);

        let objects = Target::ObjectsOf(Iri::new(rdf::TYPE));
        assert_eq!(objects.delta_nodes(&ctx, false).await.unwrap(), vec![t("Person")]);
    }

    #[tokio::test]
    async fn test_query_fragments() {
        let ctx = ctx(vec![], vec![]).await;
        let vars = StableVariableProvider::new("tmp");
        let v = Variable::new("t");
        let class = Target::Class(Iri::new("http://x/Person")).query_fragment(&v, &ctx, &vars);
        assert_eq!(class.text(), "?t a <http://x/Person> .");
        let nodes = Target::Node(vec![t("a"), t("b")]).query_fragment(&v, &ctx, &vars);
        assert_eq!(nodes.text(), "VALUES ?t { <http://x/a> <http://x/b> }");
        assert!(nodes.matchers().is_empty());
    }
}
