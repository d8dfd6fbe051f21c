//! Statements, triple patterns, and graph scopes

use crate::term::{Iri, Term};
use std::fmt;

/// A quad: subject, predicate, object, and the named graph it lives in
///
/// `graph == None` is the default graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Iri,
    pub object: Term,
    pub graph: Option<Term>,
}

impl Statement {
    /// Create a statement in the default graph
    pub fn new(subject: Term, predicate: impl Into<Iri>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
            graph: None,
        }
    }

    /// Place the statement in a named graph
    pub fn in_graph(mut self, graph: Term) -> Self {
        self.graph = Some(graph);
        self
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(g) = &self.graph {
            write!(f, " {}", g)?;
        }
        write!(f, " .")
    }
}

/// A single-statement pattern; `None` components are wildcards
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: Option<Term>,
    pub predicate: Option<Iri>,
    pub object: Option<Term>,
}

impl TriplePattern {
    pub fn new(subject: Option<Term>, predicate: Option<Iri>, object: Option<Term>) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Pattern matching every statement
    pub fn any() -> Self {
        Self::default()
    }

    /// `(s, p, ?)`
    pub fn subject_predicate(subject: Term, predicate: Iri) -> Self {
        Self::new(Some(subject), Some(predicate), None)
    }

    /// `(?, p, o)`
    pub fn predicate_object(predicate: Iri, object: Term) -> Self {
        Self::new(None, Some(predicate), Some(object))
    }

    /// `(?, p, ?)`
    pub fn predicate(predicate: Iri) -> Self {
        Self::new(None, Some(predicate), None)
    }

    pub fn matches(&self, st: &Statement) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == st.subject)
            && self.predicate.as_ref().map_or(true, |p| *p == st.predicate)
            && self.object.as_ref().map_or(true, |o| *o == st.object)
    }
}

/// The set of graphs a query ranges over
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum GraphScope {
    /// Union of all graphs
    #[default]
    All,
    /// Only the listed graphs; `None` stands for the default graph
    Graphs(Vec<Option<Term>>),
}

impl GraphScope {
    /// Only the default graph
    pub fn default_graph() -> Self {
        GraphScope::Graphs(vec![None])
    }

    pub fn contains(&self, graph: &Option<Term>) -> bool {
        match self {
            GraphScope::All => true,
            GraphScope::Graphs(graphs) => graphs.contains(graph),
        }
    }

    /// Graphs recorded as tuple provenance; `All` records nothing
    pub fn contexts(&self) -> Vec<Option<Term>> {
        match self {
            GraphScope::All => Vec::new(),
            GraphScope::Graphs(graphs) => graphs.clone(),
        }
    }
}
