//! RDF terms
//!
//! A [`Term`] is an IRI, a blank node, or a literal. Every component uses
//! `Arc<str>` so terms clone cheaply as they flow through validation plans.
//!
//! ## Ordering
//!
//! Terms have a strict total order: IRIs, then blank nodes, then literals;
//! within a kind, by lexical form, then datatype, then language tag. The
//! order is structural, not a value order. Use [`crate::comparator`] for
//! typed value comparison.

use shapeflow_vocab::{rdf, xsd};
use std::fmt;
use std::sync::Arc;

/// An absolute IRI
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iri(Arc<str>);

impl Iri {
    pub fn new(iri: impl AsRef<str>) -> Self {
        Self(Arc::from(iri.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl From<&str> for Iri {
    fn from(s: &str) -> Self {
        Iri::new(s)
    }
}

/// A literal value with lexical form, datatype, and optional language tag
///
/// Language-tagged literals always carry `rdf:langString` as datatype.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    lexical: Arc<str>,
    datatype: Iri,
    language: Option<Arc<str>>,
}

impl Literal {
    /// Create a typed literal
    pub fn typed(lexical: impl AsRef<str>, datatype: impl Into<Iri>) -> Self {
        Self {
            lexical: Arc::from(lexical.as_ref()),
            datatype: datatype.into(),
            language: None,
        }
    }

    /// Create an `xsd:string` literal
    pub fn string(lexical: impl AsRef<str>) -> Self {
        Self::typed(lexical, xsd::STRING)
    }

    /// Create a language-tagged string
    ///
    /// Tags are normalized to lowercase.
    pub fn lang(lexical: impl AsRef<str>, language: impl AsRef<str>) -> Self {
        Self {
            lexical: Arc::from(lexical.as_ref()),
            datatype: Iri::new(rdf::LANG_STRING),
            language: Some(Arc::from(language.as_ref().to_ascii_lowercase())),
        }
    }

    /// Create an `xsd:integer` literal
    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), xsd::INTEGER)
    }

    /// Create an `xsd:boolean` literal
    pub fn boolean(value: bool) -> Self {
        Self::typed(if value { "true" } else { "false" }, xsd::BOOLEAN)
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    pub fn datatype(&self) -> &Iri {
        &self.datatype
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.lexical.chars() {
            match c {
                '"' => write!(f, "\\\"")?,
                '\\' => write!(f, "\\\\")?,
                '\n' => write!(f, "\\n")?,
                '\r' => write!(f, "\\r")?,
                '\t' => write!(f, "\\t")?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "\"")?;
        match &self.language {
            Some(lang) => write!(f, "@{}", lang),
            None => write!(f, "^^{}", self.datatype),
        }
    }
}

/// An RDF term
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(Iri),
    BlankNode(Arc<str>),
    Literal(Literal),
}

impl Term {
    /// Create an IRI term
    pub fn iri(iri: impl AsRef<str>) -> Self {
        Term::Iri(Iri::new(iri))
    }

    /// Create a blank node term from its label (without the `_:` prefix)
    pub fn blank(label: impl AsRef<str>) -> Self {
        Term::BlankNode(Arc::from(label.as_ref()))
    }

    /// Create a plain `xsd:string` literal term
    pub fn string(lexical: impl AsRef<str>) -> Self {
        Term::Literal(Literal::string(lexical))
    }

    /// Create an `xsd:integer` literal term
    pub fn integer(value: i64) -> Self {
        Term::Literal(Literal::integer(value))
    }

    /// Create a typed literal term
    pub fn typed(lexical: impl AsRef<str>, datatype: impl AsRef<str>) -> Self {
        Term::Literal(Literal::typed(lexical, Iri::new(datatype)))
    }

    /// Create a language-tagged literal term
    pub fn lang(lexical: impl AsRef<str>, language: impl AsRef<str>) -> Self {
        Term::Literal(Literal::lang(lexical, language))
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// The string form used by `STR()`: IRI text or literal lexical form
    ///
    /// Blank nodes have no string form.
    pub fn str_value(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri.as_str()),
            Term::Literal(lit) => Some(lit.lexical()),
            Term::BlankNode(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "{}", iri),
            Term::BlankNode(label) => write!(f, "_:{}", label),
            Term::Literal(lit) => write!(f, "{}", lit),
        }
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Iri(iri)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}
