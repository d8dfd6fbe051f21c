//! Validation tuples
//!
//! A [`ValidationTuple`] is the unit of data flowing through a validation
//! plan: the chain of nodes from a target through each path hop, optionally
//! ending in the value under test.
//!
//! ## Active target
//!
//! | scope | `has_value` | chain | active target | value |
//! |-------|-------------|-------|---------------|-------|
//! | node | - | `[t0 .. tn]` | `tn` | `tn` |
//! | property | false | `[t0 .. tn]` | `tn` | none |
//! | property | true | `[t0 .. tn, v]` | `tn` | `v` |
//!
//! Tuples are immutable values: every reshaping operation returns a new
//! tuple. The chain is never empty.

use crate::constraint::SourceConstraintComponent;
use serde::{Deserialize, Serialize};
use shapeflow_db_core::{Iri, Term};
use std::cmp::Ordering;
use std::sync::Arc;

/// Whether a tuple or constraint is anchored at a focus node or at the values of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    NodeShape,
    PropertyShape,
}

/// Nested result recorded by a child shape inside a logical constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDetail {
    pub focus_node: Term,
    pub value: Option<Term>,
    pub shape: Term,
    pub component: SourceConstraintComponent,
}

/// Graph provenance shared by every tuple of a run
pub type Contexts = Arc<[Option<Term>]>;

#[derive(Debug, Clone)]
pub struct ValidationTuple {
    chain: Vec<Term>,
    scope: Scope,
    has_value: bool,
    contexts: Contexts,
    details: Vec<ResultDetail>,
    result_path: Option<Iri>,
}

/// Hashable identity of a tuple for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleKey {
    chain: Vec<Term>,
    scope: Scope,
    has_value: bool,
}

impl ValidationTuple {
    /// Create a tuple
    ///
    /// `has_value` is ignored at node scope, where the focus node is the value.
    pub fn new(chain: Vec<Term>, scope: Scope, has_value: bool, contexts: Contexts) -> Self {
        debug_assert!(!chain.is_empty());
        let has_value = has_value && scope == Scope::PropertyShape && chain.len() > 1;
        Self {
            chain,
            scope,
            has_value,
            contexts,
            details: Vec::new(),
            result_path: None,
        }
    }

    /// A single-node target tuple
    pub fn target(node: Term, scope: Scope, contexts: Contexts) -> Self {
        Self::new(vec![node], scope, false, contexts)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The full chain, including the value at property scope
    pub fn chain(&self) -> &[Term] {
        &self.chain
    }

    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    pub fn details(&self) -> &[ResultDetail] {
        &self.details
    }

    pub fn result_path(&self) -> Option<&Iri> {
        self.result_path.as_ref()
    }

    /// Whether the tuple carries a value under test
    pub fn has_value(&self) -> bool {
        self.scope == Scope::NodeShape || self.has_value
    }

    pub fn value(&self) -> Option<&Term> {
        if self.has_value() {
            self.chain.last()
        } else {
            None
        }
    }

    /// The chain without the property value
    pub fn target_chain(&self) -> &[Term] {
        if self.has_value {
            &self.chain[..self.chain.len() - 1]
        } else {
            &self.chain
        }
    }

    pub fn active_target(&self) -> &Term {
        let targets = self.target_chain();
        &targets[targets.len() - 1]
    }

    pub fn key(&self) -> TupleKey {
        TupleKey {
            chain: self.chain.clone(),
            scope: self.scope,
            has_value: self.has_value,
        }
    }

    /// Drop the value, keeping the chain up to the active target
    pub fn trim_to_target(&self) -> Self {
        if !self.has_value {
            return self.clone();
        }
        let mut out = self.clone();
        out.chain.pop();
        out.has_value = false;
        out
    }

    /// Re-express a node-scope tuple `[t0 .. tn, v]` as `v` being a value of `tn`
    pub fn shift_to_property_shape(&self) -> Self {
        let mut out = self.clone();
        out.has_value = self.chain.len() > 1;
        out.scope = Scope::PropertyShape;
        out
    }

    /// Re-express a property-scope tuple at node scope, dropping any value
    pub fn shift_to_node_shape(&self) -> Self {
        let mut out = self.trim_to_target();
        out.scope = Scope::NodeShape;
        out
    }

    /// Treat the value as the focus node of a node-scope tuple
    pub fn value_as_focus(&self) -> Self {
        let mut out = self.clone();
        out.scope = Scope::NodeShape;
        out.has_value = false;
        out
    }

    /// Node-scope tuple of the first `len` chain nodes
    pub fn truncate(&self, len: usize) -> Self {
        let mut out = self.clone();
        out.chain.truncate(len.max(1));
        out.scope = Scope::NodeShape;
        out.has_value = false;
        out
    }

    /// Treat the full chain, value included, as a target chain without value
    pub fn chain_as_target(&self) -> Self {
        let mut out = self.clone();
        out.scope = Scope::PropertyShape;
        out.has_value = false;
        out
    }

    /// Property-scope tuple with `value` appended to the target chain
    pub fn with_value(&self, value: Term) -> Self {
        let mut out = self.trim_to_target();
        out.chain.push(value);
        out.scope = Scope::PropertyShape;
        out.has_value = true;
        out
    }

    /// Join with a tuple sharing this one's target chain, taking its value
    ///
    /// Details and contexts from both sides are merged.
    pub fn join(&self, right: &ValidationTuple) -> Self {
        let mut out = match right.value() {
            Some(v) => self.with_value(v.clone()),
            None => self.clone(),
        };
        for d in &right.details {
            if !out.details.contains(d) {
                out.details.push(d.clone());
            }
        }
        if out.contexts != right.contexts {
            let mut merged: Vec<Option<Term>> = out.contexts.to_vec();
            for c in right.contexts.iter() {
                if !merged.contains(c) {
                    merged.push(c.clone());
                }
            }
            out.contexts = merged.into();
        }
        out
    }

    pub fn with_detail(mut self, detail: ResultDetail) -> Self {
        if !self.details.contains(&detail) {
            self.details.push(detail);
        }
        self
    }

    /// Add the details of `other` that this tuple lacks
    pub fn merge_details(mut self, other: &ValidationTuple) -> Self {
        for d in &other.details {
            if !self.details.contains(d) {
                self.details.push(d.clone());
            }
        }
        self
    }

    pub fn with_result_path(mut self, path: Iri) -> Self {
        self.result_path = Some(path);
        self
    }
}

/// Order by active target
pub fn compare_active_target(a: &ValidationTuple, b: &ValidationTuple) -> Ordering {
    a.active_target().cmp(b.active_target())
}

/// Order by the full target chain, then by value
pub fn compare_target_chain(a: &ValidationTuple, b: &ValidationTuple) -> Ordering {
    a.target_chain()
        .cmp(b.target_chain())
        .then_with(|| a.value().cmp(&b.value()))
}
