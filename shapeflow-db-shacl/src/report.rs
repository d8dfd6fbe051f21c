//! Validation results and reports

use crate::constraint::SourceConstraintComponent;
use crate::path::Path;
use crate::shape::Severity;
use crate::tuple::{Contexts, ResultDetail, Scope};
use shapeflow_db_core::Term;
use std::fmt;

/// One `sh:ValidationResult`
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub focus_node: Term,
    /// The offending value, when the constraint tests values
    pub value: Option<Term>,
    /// The path of the property shape, or the offending predicate of a closed shape
    pub result_path: Option<Path>,
    pub source_shape: Term,
    pub source_constraint_component: SourceConstraintComponent,
    pub severity: Severity,
    pub scope: Scope,
    /// Graphs the data was read from
    pub contexts: Contexts,
    /// `sh:message` of the source shape
    pub messages: Vec<Term>,
    /// Results of the failing branches of a logical constraint
    pub details: Vec<ResultDetail>,
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} on {}",
            self.severity,
            self.source_constraint_component.name(),
            self.focus_node
        )?;
        if let Some(path) = &self.result_path {
            write!(f, " path {}", path)?;
        }
        if let Some(value) = &self.value {
            write!(f, " value {}", value)?;
        }
        write!(f, " (shape {})", self.source_shape)
    }
}

/// Receives results as the engine produces them
pub trait ReportSink: Send {
    fn push(&mut self, result: ValidationResult);
}

impl ReportSink for Vec<ValidationResult> {
    fn push(&mut self, result: ValidationResult) {
        Vec::push(self, result)
    }
}

/// Outcome of one validation run
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// No result of severity Violation
    pub conforms: bool,
    /// A result limit stopped collection early
    pub truncated: bool,
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    /// An empty conforming report
    pub fn conforming() -> Self {
        Self {
            conforms: true,
            truncated: false,
            results: Vec::new(),
        }
    }

    pub fn from_results(results: Vec<ValidationResult>, truncated: bool) -> Self {
        let conforms = !results.iter().any(|r| r.severity == Severity::Violation);
        Self {
            conforms,
            truncated,
            results,
        }
    }

    pub fn violation_count(&self) -> usize {
        self.count(Severity::Violation)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.results.iter().filter(|r| r.severity == severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn result(severity: Severity) -> ValidationResult {
        ValidationResult {
            focus_node: Term::iri("http://x/a"),
            value: None,
            result_path: Some(Path::predicate("http://x/knows")),
            source_shape: Term::iri("http://x/PersonShape"),
            source_constraint_component: SourceConstraintComponent::MinCount,
            severity,
            scope: Scope::PropertyShape,
            contexts: Arc::from(Vec::<Option<Term>>::new()),
            messages: Vec::new(),
            details: Vec::new(),
        }
    }

    #[test]
    fn test_only_violations_break_conformance() {
        let report = ValidationReport::from_results(vec![result(Severity::Warning)], false);
        assert!(report.conforms);
        assert_eq!(report.warning_count(), 1);

        let mut sink: Vec<ValidationResult> = Vec::new();
        ReportSink::push(&mut sink, result(Severity::Violation));
        let report = ValidationReport::from_results(sink, false);
        assert!(!report.conforms);
        assert_eq!(report.violation_count(), 1);
        assert!(report.results[0].to_string().starts_with("Violation MinCount on <http://x/a>"));
    }
}
