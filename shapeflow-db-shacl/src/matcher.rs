//! Statement matchers
//!
//! A [`StatementMatcher`] is a static, descriptive triple pattern whose
//! roles are either bound terms or named variables. Matchers are never
//! executed as queries; they answer "could any statement in this
//! transaction's delta touch this constraint" and they document the
//! patterns behind query fragments.

use crate::connections::ConnectionsGroup;
use crate::error::Result;
use shapeflow_db_core::{Connection, Iri, Term, TriplePattern};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A named query variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(Arc<str>);

impl Variable {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Allocates non-colliding variable names within one plan build
#[derive(Debug)]
pub struct StableVariableProvider {
    prefix: String,
    counter: AtomicU32,
}

impl StableVariableProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> Variable {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Variable::new(format!("{}_{:010}", self.prefix, n))
    }
}

impl Default for StableVariableProvider {
    fn default() -> Self {
        Self::new("target")
    }
}

/// One role of a matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Bound(Term),
    Var(Variable),
}

impl Role {
    fn bound(&self) -> Option<&Term> {
        match self {
            Role::Bound(t) => Some(t),
            Role::Var(_) => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Bound(t) => write!(f, "{}", t),
            Role::Var(v) => write!(f, "{}", v),
        }
    }
}

impl From<Variable> for Role {
    fn from(v: Variable) -> Self {
        Role::Var(v)
    }
}

impl From<Term> for Role {
    fn from(t: Term) -> Self {
        Role::Bound(t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementMatcher {
    pub subject: Role,
    pub predicate: Role,
    pub object: Role,
}

impl StatementMatcher {
    pub fn new(subject: impl Into<Role>, predicate: impl Into<Role>, object: impl Into<Role>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The bound roles as a store pattern
    ///
    /// A predicate bound to a non-IRI matches nothing, so it yields `None`.
    pub fn pattern(&self) -> Option<TriplePattern> {
        let predicate = match self.predicate.bound() {
            Some(Term::Iri(iri)) => Some(iri.clone()),
            Some(_) => return None,
            None => None,
        };
        Some(TriplePattern::new(
            self.subject.bound().cloned(),
            predicate,
            self.object.bound().cloned(),
        ))
    }

    /// Whether the predicate is bound to `iri`
    pub fn has_predicate(&self, iri: &Iri) -> bool {
        matches!(&self.predicate, Role::Bound(Term::Iri(p)) if p == iri)
    }

    /// Whether any added or removed statement matches the bound roles
    pub async fn could_match(&self, ctx: &ConnectionsGroup) -> Result<bool> {
        let Some(pattern) = self.pattern() else {
            return Ok(false);
        };
        let graphs = ctx.data_graph();
        if ctx.stats().has_added() && ctx.added().has_statement(&pattern, false, graphs).await? {
            return Ok(true);
        }
        if ctx.stats().has_removed() && ctx.removed().has_statement(&pattern, false, graphs).await? {
            return Ok(true);
        }
        Ok(false)
    }
}

impl fmt::Display for StatementMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Whether any matcher could match the delta; stops at the first hit
pub async fn any_could_match(matchers: &[StatementMatcher], ctx: &ConnectionsGroup) -> Result<bool> {
    if !ctx.stats().has_added() && !ctx.stats().has_removed() {
        return Ok(false);
    }
    for m in matchers {
        if m.could_match(ctx).await? {
            return Ok(true);
        }
    }
    Ok(false)
}
