//! Property paths
//!
//! A [`Path`] selects the values a property shape checks. Paths are
//! evaluated in batches: one call resolves many start nodes, issuing one
//! bulk store query per step.
//!
//! Only predicate and inverse-predicate paths can be seeded from delta
//! statements; any other path touched by the delta is re-evaluated for
//! every target.

use crate::connections::ConnectionsGroup;
use crate::error::Result;
use crate::fragment::SparqlFragment;
use crate::matcher::{Role, StableVariableProvider, StatementMatcher, Variable};
use futures::future::{BoxFuture, FutureExt};
use rustc_hash::{FxHashMap, FxHashSet};
use shapeflow_db_core::{Connection, GraphScope, Iri, Term, TriplePattern};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Path {
    Predicate(Iri),
    Inverse(Box<Path>),
    Sequence(Vec<Path>),
    Alternative(Vec<Path>),
    ZeroOrMore(Box<Path>),
    OneOrMore(Box<Path>),
    ZeroOrOne(Box<Path>),
}

/// Which delta views to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaSides {
    pub added: bool,
    pub removed: bool,
}

impl DeltaSides {
    pub const ADDED: DeltaSides = DeltaSides {
        added: true,
        removed: false,
    };
    pub const REMOVED: DeltaSides = DeltaSides {
        added: false,
        removed: true,
    };
    pub const BOTH: DeltaSides = DeltaSides {
        added: true,
        removed: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.added && !self.removed
    }
}

/// Start nodes whose path values may have changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaNodes {
    Nodes(Vec<Term>),
    /// The path cannot be seeded from statements; every start node is suspect
    All,
}

/// Renders a path as query text
pub trait PathRenderer: Send + Sync + fmt::Debug {
    fn render(&self, path: &Path) -> String;
}

/// SPARQL 1.1 property path syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct SparqlPathRenderer;

impl PathRenderer for SparqlPathRenderer {
    fn render(&self, path: &Path) -> String {
        match path {
            Path::Predicate(p) => p.to_string(),
            Path::Inverse(inner) => format!("^{}", self.render(inner)),
            Path::Sequence(steps) => format!(
                "({})",
                steps.iter().map(|s| self.render(s)).collect::<Vec<_>>().join("/")
            ),
            Path::Alternative(alts) => format!(
                "({})",
                alts.iter().map(|s| self.render(s)).collect::<Vec<_>>().join("|")
            ),
            Path::ZeroOrMore(inner) => format!("({})*", self.render(inner)),
            Path::OneOrMore(inner) => format!("({})+", self.render(inner)),
            Path::ZeroOrOne(inner) => format!("({})?", self.render(inner)),
        }
    }
}

type Pairs = Vec<(Term, Term)>;

fn dedupe(pairs: Pairs) -> Pairs {
    let mut seen = FxHashSet::default();
    pairs.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

fn distinct(nodes: &[Term]) -> Vec<Term> {
    let mut seen = FxHashSet::default();
    nodes.iter().filter(|n| seen.insert(*n)).cloned().collect()
}

impl Path {
    pub fn predicate(iri: impl AsRef<str>) -> Self {
        Path::Predicate(Iri::new(iri))
    }

    pub fn inverse(path: Path) -> Self {
        Path::Inverse(Box::new(path))
    }

    /// `(predicate, inverse)` for predicate and inverse-predicate paths
    pub fn simple_predicate(&self) -> Option<(&Iri, bool)> {
        match self {
            Path::Predicate(p) => Some((p, false)),
            Path::Inverse(inner) => match inner.as_ref() {
                Path::Predicate(p) => Some((p, true)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.simple_predicate().is_some()
    }

    /// Every predicate the path mentions
    pub fn predicates(&self) -> Vec<Iri> {
        let mut out = Vec::new();
        self.collect_predicates(&mut out);
        out.dedup();
        out
    }

    fn collect_predicates(&self, out: &mut Vec<Iri>) {
        match self {
            Path::Predicate(p) => {
                if !out.contains(p) {
                    out.push(p.clone())
                }
            }
            Path::Inverse(inner) | Path::ZeroOrMore(inner) | Path::OneOrMore(inner) | Path::ZeroOrOne(inner) => {
                inner.collect_predicates(out)
            }
            Path::Sequence(steps) | Path::Alternative(steps) => {
                for s in steps {
                    s.collect_predicates(out);
                }
            }
        }
    }

    /// `(start, end)` pairs for every start node, evaluated in `conn`
    pub async fn evaluate(&self, conn: &dyn Connection, graphs: &GraphScope, starts: &[Term]) -> Result<Pairs> {
        self.walk(true, conn, graphs, distinct(starts)).await
    }

    /// `(end, start)` pairs: for each input node, the nodes reaching it through the path
    pub async fn evaluate_inverse(
        &self,
        conn: &dyn Connection,
        graphs: &GraphScope,
        ends: &[Term],
    ) -> Result<Pairs> {
        self.walk(false, conn, graphs, distinct(ends)).await
    }

    /// Evaluate in chunks of `chunk` start nodes, one bulk query per chunk and step
    pub async fn evaluate_chunked(
        &self,
        conn: &dyn Connection,
        graphs: &GraphScope,
        starts: &[Term],
        chunk: usize,
        forward: bool,
    ) -> Result<FxHashMap<Term, Vec<Term>>> {
        let mut out: FxHashMap<Term, Vec<Term>> = FxHashMap::default();
        for batch in distinct(starts).chunks(chunk.max(1)) {
            for (from, to) in self.walk(forward, conn, graphs, batch.to_vec()).await? {
                out.entry(from).or_default().push(to);
            }
        }
        Ok(out)
    }

    fn walk<'a>(
        &'a self,
        forward: bool,
        conn: &'a dyn Connection,
        graphs: &'a GraphScope,
        nodes: Vec<Term>,
    ) -> BoxFuture<'a, Result<Pairs>> {
        async move {
            if nodes.is_empty() {
                return Ok(Vec::new());
            }
            match self {
                Path::Predicate(p) => {
                    let patterns: Vec<TriplePattern> = nodes
                        .iter()
                        .map(|n| {
                            if forward {
                                TriplePattern::subject_predicate(n.clone(), p.clone())
                            } else {
                                TriplePattern::predicate_object(p.clone(), n.clone())
                            }
                        })
                        .collect();
                    let found = conn.statements_bulk(&patterns, graphs).await?;
                    let mut pairs = Vec::new();
                    for (node, statements) in nodes.iter().zip(found) {
                        for st in statements {
                            let other = if forward { st.object } else { st.subject };
                            pairs.push((node.clone(), other));
                        }
                    }
                    Ok(dedupe(pairs))
                }
                Path::Inverse(inner) => inner.walk(!forward, conn, graphs, nodes).await,
                Path::Sequence(steps) => {
                    let mut frontier: Pairs = nodes.iter().map(|n| (n.clone(), n.clone())).collect();
                    let ordered: Vec<&Path> = if forward {
                        steps.iter().collect()
                    } else {
                        steps.iter().rev().collect()
                    };
                    for step in ordered {
                        let mids: Vec<Term> = distinct(&frontier.iter().map(|(_, m)| m.clone()).collect::<Vec<_>>());
                        let mut reach: FxHashMap<Term, Vec<Term>> = FxHashMap::default();
                        for (from, to) in step.walk(forward, conn, graphs, mids).await? {
                            reach.entry(from).or_default().push(to);
                        }
                        frontier = frontier
                            .into_iter()
                            .flat_map(|(root, mid)| {
                                reach
                                    .get(&mid)
                                    .into_iter()
                                    .flatten()
                                    .map(move |end| (root.clone(), end.clone()))
                                    .collect::<Vec<_>>()
                            })
                            .collect();
                        frontier = dedupe(frontier);
                    }
                    Ok(frontier)
                }
                Path::Alternative(alts) => {
                    let mut pairs = Vec::new();
                    for alt in alts {
                        pairs.extend(alt.walk(forward, conn, graphs, nodes.clone()).await?);
                    }
                    Ok(dedupe(pairs))
                }
                Path::ZeroOrOne(inner) => {
                    let mut pairs: Pairs = nodes.iter().map(|n| (n.clone(), n.clone())).collect();
                    pairs.extend(inner.walk(forward, conn, graphs, nodes).await?);
                    Ok(dedupe(pairs))
                }
                Path::ZeroOrMore(inner) => closure(inner, forward, conn, graphs, nodes, true).await,
                Path::OneOrMore(inner) => closure(inner, forward, conn, graphs, nodes, false).await,
            }
        }
        .boxed()
    }

    /// Matchers describing the path between `subject` and `object`
    pub fn matchers(&self, subject: Role, object: Role, vars: &StableVariableProvider) -> Vec<StatementMatcher> {
        match self {
            Path::Predicate(p) => vec![StatementMatcher::new(subject, Term::Iri(p.clone()), object)],
            Path::Inverse(inner) => inner.matchers(object, subject, vars),
            Path::Sequence(steps) => {
                let mut out = Vec::new();
                let mut from = subject;
                for (i, step) in steps.iter().enumerate() {
                    let to = if i + 1 == steps.len() {
                        object.clone()
                    } else {
                        Role::Var(vars.next())
                    };
                    out.extend(step.matchers(from, to.clone(), vars));
                    from = to;
                }
                out
            }
            Path::Alternative(alts) => alts
                .iter()
                .flat_map(|a| a.matchers(subject.clone(), object.clone(), vars))
                .collect(),
            Path::ZeroOrMore(inner) | Path::OneOrMore(inner) | Path::ZeroOrOne(inner) => {
                inner.matchers(Role::Var(vars.next()), Role::Var(vars.next()), vars)
            }
        }
    }

    /// Graph pattern `?subject <path> ?object .`
    pub fn query_fragment(
        &self,
        subject: &Variable,
        object: &Variable,
        renderer: &dyn PathRenderer,
        vars: &StableVariableProvider,
    ) -> SparqlFragment {
        let text = format!("{} {} {} .", subject, renderer.render(self), object);
        let fragment = SparqlFragment::pattern(
            text,
            self.matchers(Role::Var(subject.clone()), Role::Var(object.clone()), vars),
        );
        if self.is_simple() {
            fragment
        } else {
            fragment.non_incremental()
        }
    }

    /// Start nodes of path edges added or removed by the transaction
    pub async fn delta_nodes(&self, ctx: &ConnectionsGroup, sides: DeltaSides) -> Result<DeltaNodes> {
        let mut views: Vec<&dyn Connection> = Vec::new();
        if sides.added && ctx.stats().has_added() {
            views.push(ctx.added());
        }
        if sides.removed && ctx.stats().has_removed() {
            views.push(ctx.removed());
        }
        if views.is_empty() {
            return Ok(DeltaNodes::Nodes(Vec::new()));
        }
        let graphs = ctx.data_graph();
        match self.simple_predicate() {
            Some((p, inverse)) => {
                let mut nodes = Vec::new();
                for view in views {
                    for st in view.statements(&TriplePattern::predicate(p.clone()), graphs).await? {
                        nodes.push(if inverse { st.object } else { st.subject });
                    }
                }
                Ok(DeltaNodes::Nodes(distinct(&nodes)))
            }
            None => {
                let patterns: Vec<TriplePattern> =
                    self.predicates().into_iter().map(TriplePattern::predicate).collect();
                for view in views {
                    for found in view.statements_bulk(&patterns, graphs).await? {
                        if !found.is_empty() {
                            return Ok(DeltaNodes::All);
                        }
                    }
                }
                Ok(DeltaNodes::Nodes(Vec::new()))
            }
        }
    }
}

/// Transitive closure from each node, optionally reflexive
async fn closure(
    step: &Path,
    forward: bool,
    conn: &dyn Connection,
    graphs: &GraphScope,
    nodes: Vec<Term>,
    reflexive: bool,
) -> Result<Pairs> {
    let mut reached: FxHashMap<Term, FxHashSet<Term>> = FxHashMap::default();
    let mut pairs: Pairs = Vec::new();
    let mut frontier: Pairs = nodes.iter().map(|n| (n.clone(), n.clone())).collect();
    if reflexive {
        for n in &nodes {
            reached.entry(n.clone()).or_default().insert(n.clone());
            pairs.push((n.clone(), n.clone()));
        }
    }
    while !frontier.is_empty() {
        let mids = distinct(&frontier.iter().map(|(_, m)| m.clone()).collect::<Vec<_>>());
        let mut next: FxHashMap<Term, Vec<Term>> = FxHashMap::default();
        for (from, to) in step.walk(forward, conn, graphs, mids).await? {
            next.entry(from).or_default().push(to);
        }
        let mut new_frontier = Vec::new();
        for (root, mid) in frontier {
            for end in next.get(&mid).into_iter().flatten() {
                if reached.entry(root.clone()).or_default().insert(end.clone()) {
                    pairs.push((root.clone(), end.clone()));
                    new_frontier.push((root.clone(), end.clone()));
                }
            }
        }
        frontier = new_frontier;
    }
    Ok(pairs)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SparqlPathRenderer.render(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapeflow_db_core::{MemoryStore, Statement};

    fn t(s: &str) -> Term {
        Term::iri(format!("http://x/{}", s))
    }

    fn st(s: &str, p: &str, o: &str) -> Statement {
        Statement::new(t(s), Iri::new(format!("http://x/{}", p)), t(o))
    }

    fn p(name: &str) -> Path {
        Path::predicate(format!("http://x/{}", name))
    }

    fn store() -> MemoryStore {
        MemoryStore::from_statements([
            st("a", "knows", "b"),
            st("b", "knows", "c"),
            st("c", "knows", "a"),
            st("a", "name", "n1"),
            st("b", "likes", "d"),
        ])
    }

    fn sorted(mut pairs: Pairs) -> Pairs {
        pairs.sort();
        pairs
    }

    #[tokio::test]
    async fn test_predicate_and_inverse() {
        let s = store();
        let fwd = s_eval(&p("knows"), &s, &[t("a"), t("b")], true).await;
        assert_eq!(sorted(fwd), vec![(t("a"), t("b")), (t("b"), t("c"))]);
        let inv = s_eval(&Path::inverse(p("knows")), &s, &[t("a")], true).await;
        assert_eq!(inv, vec![(t("a"), t("c"))]);
        let back = s_eval(&p("knows"), &s, &[t("b")], false).await;
        assert_eq!(back, vec![(t("b"), t("a"))]);
    }

    async fn s_eval(path: &Path, s: &MemoryStore, nodes: &[Term], forward: bool) -> Pairs {
        if forward {
            path.evaluate(s, &GraphScope::All, nodes).await.unwrap()
        } else {
            path.evaluate_inverse(s, &GraphScope::All, nodes).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_sequence_alternative_and_closure() {
        let s = store();
        let seq = Path::Sequence(vec![p("knows"), p("likes")]);
        assert_eq!(s_eval(&seq, &s, &[t("a")], true).await, vec![(t("a"), t("d"))]);
        assert_eq!(s_eval(&seq, &s, &[t("d")], false).await, vec![(t("d"), t("a"))]);

        let alt = Path::Alternative(vec![p("knows"), p("name")]);
        assert_eq!(
            sorted(s_eval(&alt, &s, &[t("a")], true).await),
            vec![(t("a"), t("b")), (t("a"), t("n1"))]
        );

        let plus = Path::OneOrMore(Box::new(p("knows")));
        assert_eq!(
            sorted(s_eval(&plus, &s, &[t("a")], true).await),
            vec![(t("a"), t("a")), (t("a"), t("b")), (t("a"), t("c"))]
        );
        let star = Path::ZeroOrMore(Box::new(p("likes")));
        assert_eq!(
            sorted(s_eval(&star, &s, &[t("b")], true).await),
            vec![(t("b"), t("b")), (t("b"), t("d"))]
        );
        let opt = Path::ZeroOrOne(Box::new(p("likes")));
        assert_eq!(sorted(s_eval(&opt, &s, &[t("a")], true).await), vec![(t("a"), t("a"))]);
    }

    #[tokio::test]
    async fn test_one_bulk_query_per_step() {
        let s = store();
        s.reset_queries();
        p("knows")
            .evaluate(&s, &GraphScope::All, &[t("a"), t("b"), t("c")])
            .await
            .unwrap();
        assert_eq!(s.queries(), 1);
    }

    #[test]
    fn test_render_and_matchers() {
        let path = Path::Sequence(vec![p("knows"), Path::inverse(p("likes"))]);
        assert_eq!(path.to_string(), "(<http://x/knows>/^<http://x/likes>)");
        let vars = StableVariableProvider::new("tmp");
        let m = path.matchers(Role::Var(Variable::new("s")), Role::Var(Variable::new("o")), &vars);
        assert_eq!(m.len(), 2);
        assert_eq!(m[1].subject, Role::Var(Variable::new("o")));
        assert!(!path.is_simple());
        assert_eq!(Path::inverse(p("knows")).simple_predicate().map(|(_, inv)| inv), Some(true));
    }
}
