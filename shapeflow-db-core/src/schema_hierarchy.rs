//! Schema hierarchy for RDFS subclass reasoning
//!
//! Provides precomputed transitive closures of class and property hierarchies
//! so that a class target can be expanded into its equivalent set before a
//! query runs.
//!
//! # Closure Direction
//!
//! The closures compute **descendants** (not ancestors):
//! - `subclasses_of(Animal)` returns `[Dog, Cat, ...]` (things that are subClassOf Animal)
//! - `subproperties_of(hasColor)` returns `[hasFurColor, ...]`
//!
//! This is the direction needed for target expansion: every instance of Dog
//! is also a target of a shape targeting Animal.

use crate::connection::Connection;
use crate::error::Result;
use crate::statement::{GraphScope, Statement, TriplePattern};
use crate::term::{Iri, Term};
use shapeflow_vocab::rdfs;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Class and predicate expansion, injected into the validation engine
///
/// Both expansions include the input itself.
pub trait Reasoner: Send + Sync + std::fmt::Debug {
    fn expand_class(&self, class: &Iri) -> Vec<Iri>;

    fn expand_predicate(&self, predicate: &Iri) -> Vec<Iri> {
        vec![predicate.clone()]
    }
}

/// Static empty slice for missing entries
static EMPTY_IRIS: &[Iri] = &[];

/// Arc-backed schema hierarchy for cheap cloning.
#[derive(Clone, Debug, Default)]
pub struct SchemaHierarchy {
    inner: Arc<SchemaHierarchyInner>,
}

#[derive(Debug, Default)]
struct SchemaHierarchyInner {
    /// Transitive closure: class C -> all descendants of C (NOT including C itself)
    subclasses_closure: HashMap<Iri, Arc<[Iri]>>,
    /// Transitive closure: property P -> all descendants of P (NOT including P itself)
    subproperties_closure: HashMap<Iri, Arc<[Iri]>>,
}

impl SchemaHierarchy {
    /// Build from `rdfs:subClassOf` and `rdfs:subPropertyOf` statements.
    ///
    /// Other statements are ignored. Cycles are handled (no infinite loops).
    pub fn from_statements<'a>(statements: impl IntoIterator<Item = &'a Statement>) -> Self {
        let mut direct_subclass_of: HashMap<Iri, SmallVec<[Iri; 2]>> = HashMap::new();
        let mut direct_subproperty_of: HashMap<Iri, SmallVec<[Iri; 2]>> = HashMap::new();

        for st in statements {
            let (Term::Iri(child), Term::Iri(parent)) = (&st.subject, &st.object) else {
                continue;
            };
            let target = match st.predicate.as_str() {
                rdfs::SUB_CLASS_OF => &mut direct_subclass_of,
                rdfs::SUB_PROPERTY_OF => &mut direct_subproperty_of,
                _ => continue,
            };
            target.entry(parent.clone()).or_default().push(child.clone());
        }

        Self {
            inner: Arc::new(SchemaHierarchyInner {
                subclasses_closure: compute_transitive_closure(&direct_subclass_of),
                subproperties_closure: compute_transitive_closure(&direct_subproperty_of),
            }),
        }
    }

    /// Load the hierarchy from a connection
    pub async fn load(conn: &dyn Connection, graphs: &GraphScope) -> Result<Self> {
        let patterns = [
            TriplePattern::predicate(Iri::new(rdfs::SUB_CLASS_OF)),
            TriplePattern::predicate(Iri::new(rdfs::SUB_PROPERTY_OF)),
        ];
        let found = conn.statements_bulk(&patterns, graphs).await?;
        Ok(Self::from_statements(found.iter().flatten()))
    }

    /// Returns all descendants of class `c` (subclasses, transitively).
    ///
    /// Does NOT include `c` itself.
    pub fn subclasses_of(&self, c: &Iri) -> &[Iri] {
        self.inner
            .subclasses_closure
            .get(c)
            .map(|arc| arc.as_ref())
            .unwrap_or(EMPTY_IRIS)
    }

    /// Returns all descendants of property `p` (subproperties, transitively).
    pub fn subproperties_of(&self, p: &Iri) -> &[Iri] {
        self.inner
            .subproperties_closure
            .get(p)
            .map(|arc| arc.as_ref())
            .unwrap_or(EMPTY_IRIS)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subclasses_closure.is_empty() && self.inner.subproperties_closure.is_empty()
    }
}

impl Reasoner for SchemaHierarchy {
    fn expand_class(&self, class: &Iri) -> Vec<Iri> {
        std::iter::once(class.clone())
            .chain(self.subclasses_of(class).iter().cloned())
            .collect()
    }

    fn expand_predicate(&self, predicate: &Iri) -> Vec<Iri> {
        std::iter::once(predicate.clone())
            .chain(self.subproperties_of(predicate).iter().cloned())
            .collect()
    }
}

/// Compute transitive closure using BFS from each node.
fn compute_transitive_closure(direct: &HashMap<Iri, SmallVec<[Iri; 2]>>) -> HashMap<Iri, Arc<[Iri]>> {
    let mut closure: HashMap<Iri, Arc<[Iri]>> = HashMap::new();
    for start in direct.keys() {
        let descendants = compute_descendants(start, direct);
        if !descendants.is_empty() {
            closure.insert(start.clone(), descendants.into());
        }
    }
    closure
}

/// All nodes reachable from `start`, excluding `start` even when a cycle leads back to it.
fn compute_descendants(start: &Iri, direct: &HashMap<Iri, SmallVec<[Iri; 2]>>) -> Vec<Iri> {
    let mut visited: HashSet<Iri> = HashSet::new();
    let mut queue: VecDeque<Iri> = VecDeque::new();
    let mut result: Vec<Iri> = Vec::new();

    visited.insert(start.clone());
    queue.push_back(start.clone());

    while let Some(current) = queue.pop_front() {
        if let Some(children) = direct.get(&current) {
            for child in children {
                if visited.insert(child.clone()) {
                    queue.push_back(child.clone());
                    result.push(child.clone());
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(child: &str, parent: &str) -> Statement {
        Statement::new(Term::iri(child), Iri::new(rdfs::SUB_CLASS_OF), Term::iri(parent))
    }

    #[test]
    fn test_transitive_subclasses() {
        let sts = [sub("http://x/Dog", "http://x/Animal"), sub("http://x/Poodle", "http://x/Dog")];
        let h = SchemaHierarchy::from_statements(sts.iter());
        let mut expanded: Vec<String> = h
            .expand_class(&Iri::new("http://x/Animal"))
            .iter()
            .map(|i| i.as_str().to_string())
            .collect();
        expanded.sort();
        assert_eq!(expanded, vec!["http://x/Animal", "http://x/Dog", "http://x/Poodle"]);
        assert!(h.subclasses_of(&Iri::new("http://x/Poodle")).is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let sts = [sub("http://x/A", "http://x/B"), sub("http://x/B", "http://x/A")];
        let h = SchemaHierarchy::from_statements(sts.iter());
        assert_eq!(h.subclasses_of(&Iri::new("http://x/A")), &[Iri::new("http://x/B")]);
    }
}
