//! Query fragments for the bulk validation approach
//!
//! A [`SparqlFragment`] is either a graph pattern or a boolean filter
//! expression, plus the statement matchers describing it. Graph patterns
//! combine with join and union; filters combine with `&&`, `||` and `!`.
//! Mixing the two wraps patterns in `EXISTS { .. }`.

use crate::matcher::StatementMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    GraphPattern,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlFragment {
    text: String,
    matchers: Vec<StatementMatcher>,
    kind: FragmentKind,
    incremental: bool,
}

impl SparqlFragment {
    pub fn pattern(text: impl Into<String>, matchers: Vec<StatementMatcher>) -> Self {
        Self {
            text: text.into(),
            matchers,
            kind: FragmentKind::GraphPattern,
            incremental: true,
        }
    }

    pub fn filter(expression: impl Into<String>, matchers: Vec<StatementMatcher>) -> Self {
        Self {
            text: expression.into(),
            matchers,
            kind: FragmentKind::Filter,
            incremental: true,
        }
    }

    /// Mark the fragment as unable to seed incremental evaluation from delta statements
    pub fn non_incremental(mut self) -> Self {
        self.incremental = false;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn matchers(&self) -> &[StatementMatcher] {
        &self.matchers
    }

    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    pub fn is_filter(&self) -> bool {
        self.kind == FragmentKind::Filter
    }

    pub fn supports_incremental(&self) -> bool {
        self.incremental
    }

    /// Text usable inside a group graph pattern
    pub fn as_pattern(&self) -> String {
        match self.kind {
            FragmentKind::GraphPattern => self.text.clone(),
            FragmentKind::Filter => format!("FILTER({})", self.text),
        }
    }

    /// Text usable inside a filter expression
    pub fn as_expression(&self) -> String {
        match self.kind {
            FragmentKind::GraphPattern => format!("EXISTS {{\n{}\n}}", self.text),
            FragmentKind::Filter => self.text.clone(),
        }
    }

    fn collect_matchers(fragments: &[SparqlFragment]) -> Vec<StatementMatcher> {
        fragments.iter().flat_map(|f| f.matchers.iter().cloned()).collect()
    }

    fn all_incremental(fragments: &[SparqlFragment]) -> bool {
        fragments.iter().all(|f| f.incremental)
    }

    /// Conjunction of graph patterns (filters become `FILTER(..)` lines)
    pub fn join(fragments: &[SparqlFragment]) -> Self {
        let text = fragments
            .iter()
            .map(|f| f.as_pattern())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            matchers: Self::collect_matchers(fragments),
            kind: FragmentKind::GraphPattern,
            incremental: Self::all_incremental(fragments),
        }
    }

    /// Disjunction of graph patterns
    pub fn union(fragments: &[SparqlFragment]) -> Self {
        if fragments.len() == 1 {
            return fragments[0].clone();
        }
        let text = fragments
            .iter()
            .map(|f| format!("{{\n{}\n}}", f.as_pattern()))
            .collect::<Vec<_>>()
            .join("\nUNION\n");
        Self {
            text,
            matchers: Self::collect_matchers(fragments),
            kind: FragmentKind::GraphPattern,
            incremental: Self::all_incremental(fragments),
        }
    }

    fn connective(fragments: &[SparqlFragment], op: &str) -> Self {
        if fragments.len() == 1 && fragments[0].is_filter() {
            return fragments[0].clone();
        }
        let text = fragments
            .iter()
            .map(|f| format!("({})", f.as_expression()))
            .collect::<Vec<_>>()
            .join(op);
        Self {
            text,
            matchers: Self::collect_matchers(fragments),
            kind: FragmentKind::Filter,
            incremental: Self::all_incremental(fragments),
        }
    }

    /// `AND`: join for patterns, `&&` for filters
    pub fn and(fragments: &[SparqlFragment]) -> Self {
        if fragments.iter().all(|f| !f.is_filter()) {
            return Self::join(fragments);
        }
        Self::connective(fragments, " && ")
    }

    /// `OR`: union for patterns, `||` for filters
    pub fn or(fragments: &[SparqlFragment]) -> Self {
        if fragments.iter().all(|f| !f.is_filter()) {
            return Self::union(fragments);
        }
        Self::connective(fragments, " || ")
    }

    /// Negation, always a filter
    pub fn not(fragment: &SparqlFragment) -> Self {
        Self {
            text: format!("!({})", fragment.as_expression()),
            matchers: fragment.matchers.clone(),
            kind: FragmentKind::Filter,
            incremental: fragment.incremental,
        }
    }
}
