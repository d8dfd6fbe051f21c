//! Single-value constraints
//!
//! Datatype, node kind, length, pattern, language, value set and range
//! constraints all test one value at a time. They share one plan: join the
//! affected targets to their values and keep the values failing a boxed
//! predicate. The kind is plain data; the predicate is built from it once.

use super::{
    filter_query, focus_targets, values_of, ConstraintComponent, PlanContext, SourceConstraintComponent,
    TargetOverride,
};
use crate::error::{Result, ShaclError, Unsupported};
use crate::fragment::SparqlFragment;
use crate::matcher::Variable;
use crate::path::DeltaSides;
use crate::plan::{BoxedPlanNode, FilterNode, TuplePredicate};
use crate::query::ValidationQuery;
use crate::settings::ValidationApproach;
use crate::target::TargetChain;
use crate::tuple::{Scope, ValidationTuple};
use async_trait::async_trait;
use regex::Regex;
use shapeflow_db_core::{compare_terms, is_well_formed, Iri, Term};
use shapeflow_vocab::{rdf, shacl};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Whether a value satisfies a constraint
pub type ValuePredicate = Arc<dyn Fn(&Term) -> bool + Send + Sync>;

/// `sh:nodeKind` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    BlankNode,
    Iri,
    Literal,
    BlankNodeOrIri,
    BlankNodeOrLiteral,
    IriOrLiteral,
}

impl NodeKind {
    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri {
            shacl::BLANK_NODE => Some(NodeKind::BlankNode),
            shacl::IRI => Some(NodeKind::Iri),
            shacl::LITERAL => Some(NodeKind::Literal),
            shacl::BLANK_NODE_OR_IRI => Some(NodeKind::BlankNodeOrIri),
            shacl::BLANK_NODE_OR_LITERAL => Some(NodeKind::BlankNodeOrLiteral),
            shacl::IRI_OR_LITERAL => Some(NodeKind::IriOrLiteral),
            _ => None,
        }
    }

    pub fn iri(&self) -> &'static str {
        match self {
            NodeKind::BlankNode => shacl::BLANK_NODE,
            NodeKind::Iri => shacl::IRI,
            NodeKind::Literal => shacl::LITERAL,
            NodeKind::BlankNodeOrIri => shacl::BLANK_NODE_OR_IRI,
            NodeKind::BlankNodeOrLiteral => shacl::BLANK_NODE_OR_LITERAL,
            NodeKind::IriOrLiteral => shacl::IRI_OR_LITERAL,
        }
    }

    pub fn matches(&self, term: &Term) -> bool {
        match self {
            NodeKind::BlankNode => term.is_blank(),
            NodeKind::Iri => term.is_iri(),
            NodeKind::Literal => term.is_literal(),
            NodeKind::BlankNodeOrIri => term.is_blank() || term.is_iri(),
            NodeKind::BlankNodeOrLiteral => term.is_blank() || term.is_literal(),
            NodeKind::IriOrLiteral => term.is_iri() || term.is_literal(),
        }
    }

    fn expression(&self, v: &Variable) -> String {
        match self {
            NodeKind::BlankNode => format!("isBlank({})", v),
            NodeKind::Iri => format!("isIRI({})", v),
            NodeKind::Literal => format!("isLiteral({})", v),
            NodeKind::BlankNodeOrIri => format!("isBlank({v}) || isIRI({v})", v = v),
            NodeKind::BlankNodeOrLiteral => format!("isBlank({v}) || isLiteral({v})", v = v),
            NodeKind::IriOrLiteral => format!("isIRI({v}) || isLiteral({v})", v = v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    Datatype(Iri),
    NodeKind(NodeKind),
    MinLength(usize),
    MaxLength(usize),
    Pattern { pattern: String, flags: Option<String> },
    LanguageIn(Vec<String>),
    In(Vec<Term>),
    MinInclusive(Term),
    MaxInclusive(Term),
    MinExclusive(Term),
    MaxExclusive(Term),
}

impl FilterKind {
    pub fn component(&self) -> SourceConstraintComponent {
        match self {
            FilterKind::Datatype(_) => SourceConstraintComponent::Datatype,
            FilterKind::NodeKind(_) => SourceConstraintComponent::NodeKind,
            FilterKind::MinLength(_) => SourceConstraintComponent::MinLength,
            FilterKind::MaxLength(_) => SourceConstraintComponent::MaxLength,
            FilterKind::Pattern { .. } => SourceConstraintComponent::Pattern,
            FilterKind::LanguageIn(_) => SourceConstraintComponent::LanguageIn,
            FilterKind::In(_) => SourceConstraintComponent::In,
            FilterKind::MinInclusive(_) => SourceConstraintComponent::MinInclusive,
            FilterKind::MaxInclusive(_) => SourceConstraintComponent::MaxInclusive,
            FilterKind::MinExclusive(_) => SourceConstraintComponent::MinExclusive,
            FilterKind::MaxExclusive(_) => SourceConstraintComponent::MaxExclusive,
        }
    }
}

/// Regex with `sh:flags` applied as an inline group
///
/// `q` matches the pattern literally; flags outside the SPARQL set are
/// rejected.
pub fn compile_pattern(pattern: &str, flags: Option<&str>) -> Result<Regex> {
    let invalid = |message: String| ShaclError::InvalidPattern {
        pattern: pattern.to_string(),
        message,
    };
    let mut inline = String::new();
    let mut literal = false;
    for c in flags.unwrap_or_default().chars() {
        match c {
            'i' | 'm' | 's' | 'x' => inline.push(c),
            'q' => literal = true,
            other => return Err(invalid(format!("unsupported flag '{}'", other))),
        }
    }
    let body = if literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    let source = if inline.is_empty() {
        body
    } else {
        format!("(?{}){}", inline, body)
    };
    Regex::new(&source).map_err(|e| invalid(e.to_string()))
}

/// `langMatches` basic filtering; tags are stored lowercase
fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let range = range.to_ascii_lowercase();
    tag == range || (tag.starts_with(&range) && tag[range.len()..].starts_with('-'))
}

fn predicate_for(kind: &FilterKind) -> Result<ValuePredicate> {
    let predicate: ValuePredicate = match kind.clone() {
        FilterKind::Datatype(dt) => Arc::new(move |v: &Term| match v.as_literal() {
            Some(lit) if dt.as_str() == rdf::LANG_STRING => lit.language().is_some(),
            Some(lit) => lit.language().is_none() && lit.datatype() == &dt && is_well_formed(lit),
            None => false,
        }),
        FilterKind::NodeKind(kind) => Arc::new(move |v: &Term| kind.matches(v)),
        FilterKind::MinLength(min) => {
            Arc::new(move |v: &Term| v.str_value().map_or(false, |s| s.chars().count() >= min))
        }
        FilterKind::MaxLength(max) => {
            Arc::new(move |v: &Term| v.str_value().map_or(false, |s| s.chars().count() <= max))
        }
        FilterKind::Pattern { pattern, flags } => {
            let regex = compile_pattern(&pattern, flags.as_deref())?;
            Arc::new(move |v: &Term| v.str_value().map_or(false, |s| regex.is_match(s)))
        }
        FilterKind::LanguageIn(ranges) => Arc::new(move |v: &Term| {
            v.as_literal()
                .and_then(|lit| lit.language())
                .map_or(false, |tag| ranges.iter().any(|r| lang_matches(tag, r)))
        }),
        FilterKind::In(values) => Arc::new(move |v: &Term| values.contains(v)),
        FilterKind::MinInclusive(bound) => Arc::new(move |v: &Term| {
            matches!(compare_terms(v, &bound), Some(Ordering::Greater | Ordering::Equal))
        }),
        FilterKind::MaxInclusive(bound) => Arc::new(move |v: &Term| {
            matches!(compare_terms(v, &bound), Some(Ordering::Less | Ordering::Equal))
        }),
        FilterKind::MinExclusive(bound) => {
            Arc::new(move |v: &Term| compare_terms(v, &bound) == Some(Ordering::Greater))
        }
        FilterKind::MaxExclusive(bound) => {
            Arc::new(move |v: &Term| compare_terms(v, &bound) == Some(Ordering::Less))
        }
    };
    Ok(predicate)
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A constraint testing each value on its own
#[derive(Clone)]
pub struct SimpleFilter {
    kind: FilterKind,
    predicate: ValuePredicate,
}

impl fmt::Debug for SimpleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleFilter").field("kind", &self.kind).finish()
    }
}

impl SimpleFilter {
    /// Fails only for a pattern that does not compile
    pub fn new(kind: FilterKind) -> Result<Self> {
        let predicate = predicate_for(&kind)?;
        Ok(Self { kind, predicate })
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn is_valid(&self, value: &Term) -> bool {
        (self.predicate)(value)
    }

    fn expression(&self, v: &Variable) -> String {
        let not_blank = format!("!isBlank({})", v);
        match &self.kind {
            FilterKind::Datatype(dt) if dt.as_str() == rdf::LANG_STRING => {
                format!("isLiteral({v}) && lang({v}) != \"\"", v = v)
            }
            FilterKind::Datatype(dt) => format!("isLiteral({v}) && datatype({v}) = {dt}", v = v, dt = dt),
            FilterKind::NodeKind(kind) => kind.expression(v),
            FilterKind::MinLength(min) => format!("{} && STRLEN(STR({})) >= {}", not_blank, v, min),
            FilterKind::MaxLength(max) => format!("{} && STRLEN(STR({})) <= {}", not_blank, v, max),
            FilterKind::Pattern { pattern, flags } => match flags {
                Some(flags) => format!("{} && REGEX(STR({}), {}, {})", not_blank, v, quote(pattern), quote(flags)),
                None => format!("{} && REGEX(STR({}), {})", not_blank, v, quote(pattern)),
            },
            FilterKind::LanguageIn(ranges) => {
                let tests: Vec<String> = ranges
                    .iter()
                    .map(|r| format!("langMatches(lang({}), {})", v, quote(r)))
                    .collect();
                format!("isLiteral({}) && ({})", v, tests.join(" || "))
            }
            FilterKind::In(values) => format!(
                "{} IN ({})",
                v,
                values.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
            ),
            FilterKind::MinInclusive(b) => format!("{} >= {}", v, b),
            FilterKind::MaxInclusive(b) => format!("{} <= {}", v, b),
            FilterKind::MinExclusive(b) => format!("{} > {}", v, b),
            FilterKind::MaxExclusive(b) => format!("{} < {}", v, b),
        }
    }
}

#[async_trait]
impl ConstraintComponent for SimpleFilter {
    fn source_component(&self) -> SourceConstraintComponent {
        self.kind.component()
    }

    fn transactional_plan(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
        target: Option<&TargetOverride>,
    ) -> Result<BoxedPlanNode> {
        // only added values or new targets can introduce an invalid value
        let targets = focus_targets(pc, chain, scope, target, DeltaSides::ADDED);
        let values = values_of(pc, chain, scope, targets, self.source_component())?;
        let filter = self.predicate.clone();
        let predicate: TuplePredicate =
            Arc::new(move |t: &ValidationTuple| t.value().map_or(true, |v| filter(v)));
        Ok(Box::new(FilterNode::failing(
            values,
            self.source_component().name(),
            predicate,
        )))
    }

    fn sparql_query(
        &self,
        pc: &PlanContext<'_>,
        chain: &TargetChain,
        scope: Scope,
    ) -> std::result::Result<ValidationQuery, Unsupported> {
        Ok(filter_query(pc, chain, scope, &|v| {
            SparqlFragment::filter(self.expression(v), Vec::new())
        }))
    }

    fn valid_filter(&self, _pc: &PlanContext<'_>, value: &Variable) -> Option<SparqlFragment> {
        Some(SparqlFragment::filter(self.expression(value), Vec::new()))
    }

    fn optimal_bulk_approach(&self) -> ValidationApproach {
        ValidationApproach::SparqlBulk
    }
}
