//! RDF Vocabulary Constants for shapeflow
//!
//! Centralized IRIs used by the store layer and the shape validation engine.
//!
//! # Organization
//!
//! - `rdf` - RDF vocabulary (http://www.w3.org/1999/02/22-rdf-syntax-ns#)
//! - `rdfs` - RDFS vocabulary (http://www.w3.org/2000/01/rdf-schema#)
//! - `xsd` - XSD vocabulary (http://www.w3.org/2001/XMLSchema#)
//! - `shacl` - SHACL vocabulary (http://www.w3.org/ns/shacl#)

/// RDF vocabulary constants
pub mod rdf {
    /// RDF namespace IRI
    pub const NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

    /// rdf:type IRI
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

    /// rdf:langString IRI
    pub const LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
}

/// RDFS vocabulary constants
pub mod rdfs {
    /// rdfs:subClassOf IRI
    pub const SUB_CLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";

    /// rdfs:subPropertyOf IRI
    pub const SUB_PROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
}

/// XSD vocabulary constants
pub mod xsd {
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const SHORT: &str = "http://www.w3.org/2001/XMLSchema#short";
    pub const BYTE: &str = "http://www.w3.org/2001/XMLSchema#byte";
    pub const NON_NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
    pub const POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#positiveInteger";
    pub const NON_POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonPositiveInteger";
    pub const NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#negativeInteger";
    pub const UNSIGNED_LONG: &str = "http://www.w3.org/2001/XMLSchema#unsignedLong";
    pub const UNSIGNED_INT: &str = "http://www.w3.org/2001/XMLSchema#unsignedInt";
    pub const UNSIGNED_SHORT: &str = "http://www.w3.org/2001/XMLSchema#unsignedShort";
    pub const UNSIGNED_BYTE: &str = "http://www.w3.org/2001/XMLSchema#unsignedByte";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";

    /// Integer-derived datatypes, widest first
    pub const INTEGER_TYPES: &[&str] = &[
        INTEGER,
        LONG,
        INT,
        SHORT,
        BYTE,
        NON_NEGATIVE_INTEGER,
        POSITIVE_INTEGER,
        NON_POSITIVE_INTEGER,
        NEGATIVE_INTEGER,
        UNSIGNED_LONG,
        UNSIGNED_INT,
        UNSIGNED_SHORT,
        UNSIGNED_BYTE,
    ];

    /// Check if a datatype IRI is xsd:integer or one of its derived types
    pub fn is_integer_type(iri: &str) -> bool {
        INTEGER_TYPES.contains(&iri)
    }

    /// Check if a datatype IRI is numeric (integer family, decimal, double, float)
    pub fn is_numeric_type(iri: &str) -> bool {
        is_integer_type(iri) || iri == DECIMAL || iri == DOUBLE || iri == FLOAT
    }
}

/// SHACL vocabulary constants
pub mod shacl {
    /// SHACL namespace IRI
    pub const NS: &str = "http://www.w3.org/ns/shacl#";

    // ========================================================================
    // Node kinds
    // ========================================================================

    pub const IRI: &str = "http://www.w3.org/ns/shacl#IRI";
    pub const BLANK_NODE: &str = "http://www.w3.org/ns/shacl#BlankNode";
    pub const LITERAL: &str = "http://www.w3.org/ns/shacl#Literal";
    pub const BLANK_NODE_OR_IRI: &str = "http://www.w3.org/ns/shacl#BlankNodeOrIRI";
    pub const BLANK_NODE_OR_LITERAL: &str = "http://www.w3.org/ns/shacl#BlankNodeOrLiteral";
    pub const IRI_OR_LITERAL: &str = "http://www.w3.org/ns/shacl#IRIOrLiteral";

    // ========================================================================
    // Severities
    // ========================================================================

    pub const VIOLATION: &str = "http://www.w3.org/ns/shacl#Violation";
    pub const WARNING: &str = "http://www.w3.org/ns/shacl#Warning";
    pub const INFO: &str = "http://www.w3.org/ns/shacl#Info";

    // ========================================================================
    // Constraint components
    // ========================================================================

    pub const CLASS_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#ClassConstraintComponent";
    pub const DATATYPE_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#DatatypeConstraintComponent";
    pub const NODE_KIND_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#NodeKindConstraintComponent";
    pub const MIN_COUNT_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MinCountConstraintComponent";
    pub const MAX_COUNT_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MaxCountConstraintComponent";
    pub const MIN_EXCLUSIVE_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MinExclusiveConstraintComponent";
    pub const MIN_INCLUSIVE_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MinInclusiveConstraintComponent";
    pub const MAX_EXCLUSIVE_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MaxExclusiveConstraintComponent";
    pub const MAX_INCLUSIVE_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MaxInclusiveConstraintComponent";
    pub const MIN_LENGTH_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MinLengthConstraintComponent";
    pub const MAX_LENGTH_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#MaxLengthConstraintComponent";
    pub const PATTERN_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#PatternConstraintComponent";
    pub const LANGUAGE_IN_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#LanguageInConstraintComponent";
    pub const UNIQUE_LANG_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#UniqueLangConstraintComponent";
    pub const EQUALS_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#EqualsConstraintComponent";
    pub const DISJOINT_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#DisjointConstraintComponent";
    pub const LESS_THAN_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#LessThanConstraintComponent";
    pub const LESS_THAN_OR_EQUALS_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#LessThanOrEqualsConstraintComponent";
    pub const NOT_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#NotConstraintComponent";
    pub const AND_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#AndConstraintComponent";
    pub const OR_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#OrConstraintComponent";
    pub const XONE_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#XoneConstraintComponent";
    pub const NODE_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#NodeConstraintComponent";
    pub const QUALIFIED_MIN_COUNT_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#QualifiedMinCountConstraintComponent";
    pub const QUALIFIED_MAX_COUNT_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#QualifiedMaxCountConstraintComponent";
    pub const CLOSED_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#ClosedConstraintComponent";
    pub const HAS_VALUE_CONSTRAINT_COMPONENT: &str =
        "http://www.w3.org/ns/shacl#HasValueConstraintComponent";
    pub const IN_CONSTRAINT_COMPONENT: &str = "http://www.w3.org/ns/shacl#InConstraintComponent";
}
