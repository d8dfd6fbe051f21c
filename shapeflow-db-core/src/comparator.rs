//! Typed literal interpretation and value comparison
//!
//! Range constraints compare values by their typed meaning, not their
//! lexical form:
//!
//! | Datatype family | Parsed as |
//! |-----------------|-----------|
//! | xsd:integer and derived, xsd:decimal | `BigDecimal` |
//! | xsd:double, xsd:float | `f64` |
//! | xsd:boolean | `bool` |
//! | xsd:dateTime | `chrono::DateTime<FixedOffset>` (naive values assume UTC) |
//! | xsd:date | `chrono::NaiveDate` |
//! | xsd:string, rdf:langString | lexical form |
//!
//! Values from incomparable families yield `None`, which range constraints
//! treat as a failure.

use crate::term::{Literal, Term};
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use shapeflow_vocab::{rdf, xsd};
use std::cmp::Ordering;
use std::str::FromStr;

/// A literal interpreted according to its datatype
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Decimal(BigDecimal),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    String(String),
}

/// Inclusive bounds for bounded integer datatypes
fn integer_bounds(datatype: &str) -> Option<(i128, i128)> {
    match datatype {
        xsd::LONG => Some((i64::MIN as i128, i64::MAX as i128)),
        xsd::INT => Some((i32::MIN as i128, i32::MAX as i128)),
        xsd::SHORT => Some((i16::MIN as i128, i16::MAX as i128)),
        xsd::BYTE => Some((i8::MIN as i128, i8::MAX as i128)),
        xsd::UNSIGNED_LONG => Some((0, u64::MAX as i128)),
        xsd::UNSIGNED_INT => Some((0, u32::MAX as i128)),
        xsd::UNSIGNED_SHORT => Some((0, u16::MAX as i128)),
        xsd::UNSIGNED_BYTE => Some((0, u8::MAX as i128)),
        xsd::NON_NEGATIVE_INTEGER => Some((0, i128::MAX)),
        xsd::POSITIVE_INTEGER => Some((1, i128::MAX)),
        xsd::NON_POSITIVE_INTEGER => Some((i128::MIN, 0)),
        xsd::NEGATIVE_INTEGER => Some((i128::MIN, -1)),
        _ => None,
    }
}

fn parse_integer(lexical: &str, datatype: &str) -> Option<BigDecimal> {
    let trimmed = lexical.strip_prefix('+').unwrap_or(lexical);
    if trimmed.is_empty() || !trimmed.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Some((min, max)) = integer_bounds(datatype) {
        // Anything that does not fit i128 is out of range for a bounded type
        let v = trimmed.parse::<i128>().ok()?;
        if v < min || v > max {
            return None;
        }
    }
    BigDecimal::from_str(trimmed).ok()
}

fn parse_double(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => lexical.parse::<f64>().ok(),
    }
}

fn parse_date_time(lexical: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(lexical) {
        return Some(dt);
    }
    let naive = NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(naive.and_utc().fixed_offset())
}

/// Interpret a literal by its datatype
///
/// Returns `None` when the lexical form is not valid for the datatype, or
/// when the datatype is not one the engine interprets.
pub fn parse_literal(lit: &Literal) -> Option<LiteralValue> {
    let datatype = lit.datatype().as_str();
    let lexical = lit.lexical();
    if xsd::is_integer_type(datatype) {
        return parse_integer(lexical, datatype).map(LiteralValue::Decimal);
    }
    match datatype {
        xsd::DECIMAL => BigDecimal::from_str(lexical)
            .ok()
            .filter(|_| !lexical.contains(['e', 'E']))
            .map(LiteralValue::Decimal),
        xsd::DOUBLE | xsd::FLOAT => parse_double(lexical).map(LiteralValue::Double),
        xsd::BOOLEAN => match lexical {
            "true" | "1" => Some(LiteralValue::Boolean(true)),
            "false" | "0" => Some(LiteralValue::Boolean(false)),
            _ => None,
        },
        xsd::DATE_TIME => parse_date_time(lexical).map(LiteralValue::DateTime),
        xsd::DATE => NaiveDate::parse_from_str(lexical, "%Y-%m-%d")
            .ok()
            .map(LiteralValue::Date),
        xsd::STRING | rdf::LANG_STRING => Some(LiteralValue::String(lexical.to_string())),
        _ => None,
    }
}

/// Whether the literal's lexical form is valid for its datatype
///
/// Datatypes the engine does not interpret are assumed well-formed.
pub fn is_well_formed(lit: &Literal) -> bool {
    let datatype = lit.datatype().as_str();
    let interpreted = xsd::is_numeric_type(datatype)
        || matches!(datatype, xsd::BOOLEAN | xsd::DATE_TIME | xsd::DATE);
    !interpreted || parse_literal(lit).is_some()
}

fn decimal_to_f64(d: &BigDecimal) -> Option<f64> {
    d.to_string().parse::<f64>().ok()
}

/// Compare two interpreted values
pub fn compare_values(a: &LiteralValue, b: &LiteralValue) -> Option<Ordering> {
    use LiteralValue::*;
    match (a, b) {
        (Decimal(x), Decimal(y)) => Some(x.cmp(y)),
        (Double(x), Double(y)) => x.partial_cmp(y),
        (Decimal(x), Double(y)) => decimal_to_f64(x)?.partial_cmp(y),
        (Double(x), Decimal(y)) => x.partial_cmp(&decimal_to_f64(y)?),
        (Boolean(x), Boolean(y)) => Some(x.cmp(y)),
        (DateTime(x), DateTime(y)) => Some(x.cmp(y)),
        (Date(x), Date(y)) => Some(x.cmp(y)),
        (String(x), String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Compare two terms by value
///
/// Only literals are comparable. Strings compare only when both carry the
/// same language tag (or none).
pub fn compare_terms(a: &Term, b: &Term) -> Option<Ordering> {
    let (la, lb) = (a.as_literal()?, b.as_literal()?);
    if la.language() != lb.language() {
        return None;
    }
    compare_values(&parse_literal(la)?, &parse_literal(lb)?)
}
