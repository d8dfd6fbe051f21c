//! Validation settings
//!
//! Loaded from JSON (every field optional) or built with `with_*` methods.
//!
//! ```ignore
//! let settings = ValidationSettings::from_json(r#"{"bulk_join_size": 50}"#)?;
//! ```

use serde::{Deserialize, Serialize};
use shapeflow_db_core::GraphScope;

/// Upstream tuples per bulked store query
pub const DEFAULT_BULK_JOIN_SIZE: usize = 200;

/// Delta size above which a run switches from transactional to bulk validation
pub const DEFAULT_TRANSACTIONAL_VALIDATION_LIMIT: usize = 500_000;

/// How a constraint is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationApproach {
    /// Plan-node algebra driven by the transaction delta
    Transactional,
    /// One declarative query over the whole store
    SparqlBulk,
}

impl ValidationApproach {
    /// Combine the preferences of several constraints: bulk wins if any prefers it
    pub fn reduce_preferred(approaches: impl IntoIterator<Item = ValidationApproach>) -> Self {
        if approaches
            .into_iter()
            .any(|a| a == ValidationApproach::SparqlBulk)
        {
            ValidationApproach::SparqlBulk
        } else {
            ValidationApproach::Transactional
        }
    }

    /// Combine bulk capabilities: the query approach only if all support it
    pub fn reduce_compatible(approaches: impl IntoIterator<Item = ValidationApproach>) -> Self {
        if approaches
            .into_iter()
            .all(|a| a == ValidationApproach::SparqlBulk)
        {
            ValidationApproach::SparqlBulk
        } else {
            ValidationApproach::Transactional
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub validation_enabled: bool,
    pub parallel_validation: bool,
    pub log_validation_plans: bool,
    pub log_validation_violations: bool,
    pub performance_logging: bool,
    pub rdfs_sub_class_reasoning: bool,
    /// Allow the declarative bulk approach when a query executor is available
    pub sparql_validation: bool,
    pub bulk_join_size: usize,
    pub transactional_validation_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_results_limit_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_results_limit_per_constraint: Option<usize>,
    /// Graphs queried and recorded as provenance
    #[serde(skip)]
    pub data_graph: GraphScope,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            validation_enabled: true,
            parallel_validation: true,
            log_validation_plans: false,
            log_validation_violations: false,
            performance_logging: false,
            rdfs_sub_class_reasoning: true,
            sparql_validation: true,
            bulk_join_size: DEFAULT_BULK_JOIN_SIZE,
            transactional_validation_limit: DEFAULT_TRANSACTIONAL_VALIDATION_LIMIT,
            validation_results_limit_total: None,
            validation_results_limit_per_constraint: None,
            data_graph: GraphScope::All,
        }
    }
}

impl ValidationSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_validation_enabled(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled;
        self
    }

    pub fn with_parallel_validation(mut self, parallel: bool) -> Self {
        self.parallel_validation = parallel;
        self
    }

    pub fn with_log_validation_plans(mut self, log: bool) -> Self {
        self.log_validation_plans = log;
        self
    }

    pub fn with_log_validation_violations(mut self, log: bool) -> Self {
        self.log_validation_violations = log;
        self
    }

    pub fn with_performance_logging(mut self, log: bool) -> Self {
        self.performance_logging = log;
        self
    }

    pub fn with_rdfs_sub_class_reasoning(mut self, reasoning: bool) -> Self {
        self.rdfs_sub_class_reasoning = reasoning;
        self
    }

    pub fn with_sparql_validation(mut self, sparql: bool) -> Self {
        self.sparql_validation = sparql;
        self
    }

    pub fn with_bulk_join_size(mut self, size: usize) -> Self {
        self.bulk_join_size = size.max(1);
        self
    }

    pub fn with_transactional_validation_limit(mut self, limit: usize) -> Self {
        self.transactional_validation_limit = limit;
        self
    }

    pub fn with_validation_results_limit_total(mut self, limit: Option<usize>) -> Self {
        self.validation_results_limit_total = limit;
        self
    }

    pub fn with_validation_results_limit_per_constraint(mut self, limit: Option<usize>) -> Self {
        self.validation_results_limit_per_constraint = limit;
        self
    }

    pub fn with_data_graph(mut self, graphs: GraphScope) -> Self {
        self.data_graph = graphs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            ValidationSettings::from_json(r#"{"bulk_join_size": 50, "parallel_validation": false}"#)
                .unwrap();
        assert_eq!(settings.bulk_join_size, 50);
        assert!(!settings.parallel_validation);
        assert!(settings.validation_enabled);
        assert_eq!(
            settings.transactional_validation_limit,
            DEFAULT_TRANSACTIONAL_VALIDATION_LIMIT
        );
        assert_eq!(settings.validation_results_limit_total, None);
    }

    #[test]
    fn test_approach_reduction() {
        use ValidationApproach::*;
        assert_eq!(ValidationApproach::reduce_preferred([Transactional, SparqlBulk]), SparqlBulk);
        assert_eq!(ValidationApproach::reduce_compatible([Transactional, SparqlBulk]), Transactional);
        assert_eq!(ValidationApproach::reduce_compatible([SparqlBulk, SparqlBulk]), SparqlBulk);
    }
}
