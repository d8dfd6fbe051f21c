//! Declarative bulk validation queries
//!
//! A constraint that supports the bulk approach renders a
//! [`ValidationQuery`]: a `SELECT` whose solutions are the invalid focus
//! nodes (and values). The engine hands the text to an injected
//! [`SparqlExecutor`] and turns the rows back into validation tuples.

use crate::error::{Result, ShaclError};
use crate::matcher::Variable;
use crate::tuple::{Contexts, Scope, ValidationTuple};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use shapeflow_db_core::{GraphScope, Term};

/// One solution: variable name (without `?`) to bound term
pub type QueryRow = FxHashMap<String, Term>;

/// Executes `SELECT` queries over the post-transaction state
#[async_trait]
pub trait SparqlExecutor: Send + Sync {
    async fn select(&self, query: &str, graphs: &GraphScope) -> shapeflow_db_core::Result<Vec<QueryRow>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationQuery {
    /// Group graph pattern producing invalid solutions
    pub body: String,
    /// Variables of the target chain, root first
    pub target_vars: Vec<Variable>,
    /// The value variable at property scope
    pub value_var: Option<Variable>,
    pub scope: Scope,
    /// `HAVING` condition; groups by the target variables when set
    pub having: Option<String>,
}

impl ValidationQuery {
    pub fn new(body: impl Into<String>, target_vars: Vec<Variable>, value_var: Option<Variable>, scope: Scope) -> Self {
        Self {
            body: body.into(),
            target_vars,
            value_var,
            scope,
            having: None,
        }
    }

    pub fn with_having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Full `SELECT` text
    pub fn to_select(&self) -> String {
        let targets = self
            .target_vars
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        match &self.having {
            Some(having) => format!(
                "SELECT {} WHERE {{\n{}\n}}\nGROUP BY {}\nHAVING ({})",
                targets, self.body, targets, having
            ),
            None => {
                let projection = match &self.value_var {
                    Some(v) => format!("{} {}", targets, v),
                    None => targets,
                };
                format!("SELECT DISTINCT {} WHERE {{\n{}\n}}", projection, self.body)
            }
        }
    }

    /// Turn one solution back into a tuple
    pub fn tuple(&self, row: &QueryRow, contexts: &Contexts) -> Result<ValidationTuple> {
        let mut chain = Vec::with_capacity(self.target_vars.len() + 1);
        for var in &self.target_vars {
            let term = row
                .get(var.name())
                .ok_or_else(|| ShaclError::Query(format!("solution without target binding {}", var)))?;
            chain.push(term.clone());
        }
        if chain.is_empty() {
            return Err(ShaclError::Query("query without target variables".to_string()));
        }
        let value = if self.having.is_none() {
            self.value_var.as_ref().and_then(|v| row.get(v.name()))
        } else {
            None
        };
        match (self.scope, value) {
            (Scope::PropertyShape, Some(v)) => {
                chain.push(v.clone());
                Ok(ValidationTuple::new(chain, Scope::PropertyShape, true, contexts.clone()))
            }
            (scope, _) => Ok(ValidationTuple::new(chain, scope, false, contexts.clone())),
        }
    }
}
