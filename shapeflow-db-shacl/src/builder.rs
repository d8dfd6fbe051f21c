//! Shape construction
//!
//! Shapes are declared with [`ShapeDecl`], referring to each other by
//! identifier, and turned into a [`ShapeArena`] by [`ShapesBuilder::build`].
//! Everything that can be wrong with a shape is reported here, before any
//! validation run:
//!
//! - shapes referenced through `sh:property` must have a path
//! - counts and lengths must be non-negative
//! - patterns must compile
//! - every shape reference must resolve
//! - logical lists must not be empty
//!
//! The builder also wires what depends on other shapes: the allowed
//! predicates of closed shapes and the siblings of disjoint qualified value
//! shapes.

use crate::constraint::{
    ClassConstraint, ClosedConstraint, Constraint, FilterKind, HasValue, LogicalConstraint, LogicalKind, MaxCount,
    MinCount, NodeKind, PairConstraint, QualifiedBound, QualifiedConstraint, SimpleFilter, UniqueLang,
};
use crate::error::{Result, ShaclError};
use crate::path::Path;
use crate::shape::{Severity, Shape, ShapeArena, ShapeId};
use crate::target::Target;
use rustc_hash::FxHashMap;
use shapeflow_db_core::{Iri, Term};

/// A constraint as declared, before validation and reference resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintDecl {
    Datatype(Iri),
    NodeKind(NodeKind),
    MinCount(i64),
    MaxCount(i64),
    MinLength(i64),
    MaxLength(i64),
    Pattern { pattern: String, flags: Option<String> },
    LanguageIn(Vec<String>),
    In(Vec<Term>),
    MinInclusive(Term),
    MaxInclusive(Term),
    MinExclusive(Term),
    MaxExclusive(Term),
    Class(Iri),
    HasValue(Term),
    Equals(Iri),
    Disjoint(Iri),
    LessThan(Iri),
    LessThanOrEquals(Iri),
    UniqueLang(bool),
    Closed { ignored: Vec<Iri> },
    Not(Term),
    And(Vec<Term>),
    Or(Vec<Term>),
    Xone(Vec<Term>),
    Node(Term),
    QualifiedValueShape {
        shape: Term,
        min: Option<i64>,
        max: Option<i64>,
        disjoint: bool,
    },
}

/// A shape as declared
#[derive(Debug, Clone)]
pub struct ShapeDecl {
    id: Term,
    path: Option<Path>,
    targets: Vec<Target>,
    constraints: Vec<ConstraintDecl>,
    properties: Vec<Term>,
    severity: Severity,
    deactivated: bool,
    messages: Vec<Term>,
}

impl ShapeDecl {
    pub fn node(id: Term) -> Self {
        Self {
            id,
            path: None,
            targets: Vec::new(),
            constraints: Vec::new(),
            properties: Vec::new(),
            severity: Severity::Violation,
            deactivated: false,
            messages: Vec::new(),
        }
    }

    pub fn property(id: Term, path: Path) -> Self {
        Self {
            path: Some(path),
            ..Self::node(id)
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_constraint(mut self, constraint: ConstraintDecl) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// `sh:property`
    pub fn with_property(mut self, shape: Term) -> Self {
        self.properties.push(shape);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: Term) -> Self {
        self.messages.push(message);
        self
    }

    pub fn deactivate(mut self, deactivated: bool) -> Self {
        self.deactivated = deactivated;
        self
    }

    pub fn id(&self) -> &Term {
        &self.id
    }
}

#[derive(Debug, Default)]
pub struct ShapesBuilder {
    decls: Vec<ShapeDecl>,
}

impl ShapesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(mut self, decl: ShapeDecl) -> Self {
        self.decls.push(decl);
        self
    }

    pub fn add(&mut self, decl: ShapeDecl) -> &mut Self {
        self.decls.push(decl);
        self
    }

    /// Validate every declaration and build the arena
    ///
    /// Shapes keep their declaration order: the n-th declared shape is
    /// `ShapeId` n.
    pub fn build(self) -> Result<ShapeArena> {
        let mut index: FxHashMap<Term, ShapeId> = FxHashMap::default();
        let mut arena = ShapeArena::default();
        for decl in &self.decls {
            if index.contains_key(&decl.id) {
                return Err(ShaclError::malformed(&decl.id, "declared more than once"));
            }
            if let Some(path) = &decl.path {
                check_path(&decl.id, path)?;
            }
            let placeholder = match &decl.path {
                Some(path) => Shape::property(decl.id.clone(), path.clone()),
                None => Shape::node(decl.id.clone()),
            };
            index.insert(decl.id.clone(), arena.push(placeholder));
        }

        let resolver = Resolver { index: &index };
        for decl in &self.decls {
            let shape = resolver.shape(decl, &self.decls)?;
            let id = resolver.resolve(&decl.id, &decl.id)?;
            if let Some(slot) = arena.get_mut(id) {
                *slot = shape;
            }
        }

        wire_closed(&mut arena);
        wire_qualified_siblings(&mut arena);
        tracing::debug!(shapes = arena.len(), roots = arena.roots().len(), "shapes built");
        Ok(arena)
    }
}

struct Resolver<'a> {
    index: &'a FxHashMap<Term, ShapeId>,
}

impl Resolver<'_> {
    fn resolve(&self, referrer: &Term, referenced: &Term) -> Result<ShapeId> {
        self.index
            .get(referenced)
            .copied()
            .ok_or_else(|| ShaclError::UnknownShapeReference {
                referrer: referrer.to_string(),
                referenced: referenced.to_string(),
            })
    }

    fn list(&self, referrer: &Term, what: &str, shapes: &[Term]) -> Result<Vec<ShapeId>> {
        if shapes.is_empty() {
            return Err(ShaclError::malformed(referrer, format!("{} list is empty", what)));
        }
        shapes.iter().map(|s| self.resolve(referrer, s)).collect()
    }

    fn shape(&self, decl: &ShapeDecl, decls: &[ShapeDecl]) -> Result<Shape> {
        let mut shape = match &decl.path {
            Some(path) => Shape::property(decl.id.clone(), path.clone()),
            None => Shape::node(decl.id.clone()),
        }
        .with_severity(decl.severity)
        .deactivate(decl.deactivated);
        for target in &decl.targets {
            shape = shape.with_target(target.clone());
        }
        for message in &decl.messages {
            shape = shape.with_message(message.clone());
        }
        for property in &decl.properties {
            let id = self.resolve(&decl.id, property)?;
            let has_path = decls.iter().any(|d| &d.id == property && d.path.is_some());
            if !has_path {
                return Err(ShaclError::malformed(
                    property,
                    "used as sh:property but has no sh:path",
                ));
            }
            shape = shape.with_property(id);
        }
        for c in &decl.constraints {
            for constraint in self.constraints(decl, c)? {
                shape = shape.with_constraint(constraint);
            }
        }
        Ok(shape)
    }

    fn constraints(&self, decl: &ShapeDecl, c: &ConstraintDecl) -> Result<Vec<Constraint>> {
        let id = &decl.id;
        let simple = |kind: FilterKind| -> Result<Vec<Constraint>> {
            Ok(vec![Constraint::Simple(SimpleFilter::new(kind)?)])
        };
        let needs_path = |name: &str| -> Result<()> {
            if decl.path.is_none() {
                return Err(ShaclError::malformed(id, format!("{} needs sh:path", name)));
            }
            Ok(())
        };
        Ok(match c {
            ConstraintDecl::Datatype(dt) => return simple(FilterKind::Datatype(dt.clone())),
            ConstraintDecl::NodeKind(kind) => return simple(FilterKind::NodeKind(*kind)),
            ConstraintDecl::MinLength(n) => return simple(FilterKind::MinLength(count(id, "sh:minLength", *n)?)),
            ConstraintDecl::MaxLength(n) => return simple(FilterKind::MaxLength(count(id, "sh:maxLength", *n)?)),
            ConstraintDecl::Pattern { pattern, flags } => {
                return simple(FilterKind::Pattern {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                })
            }
            ConstraintDecl::LanguageIn(ranges) => return simple(FilterKind::LanguageIn(ranges.clone())),
            ConstraintDecl::In(values) => return simple(FilterKind::In(values.clone())),
            ConstraintDecl::MinInclusive(v) => return simple(FilterKind::MinInclusive(v.clone())),
            ConstraintDecl::MaxInclusive(v) => return simple(FilterKind::MaxInclusive(v.clone())),
            ConstraintDecl::MinExclusive(v) => return simple(FilterKind::MinExclusive(v.clone())),
            ConstraintDecl::MaxExclusive(v) => return simple(FilterKind::MaxExclusive(v.clone())),
            ConstraintDecl::MinCount(n) => {
                needs_path("sh:minCount")?;
                vec![Constraint::MinCount(MinCount::new(count(id, "sh:minCount", *n)?))]
            }
            ConstraintDecl::MaxCount(n) => {
                needs_path("sh:maxCount")?;
                vec![Constraint::MaxCount(MaxCount::new(count(id, "sh:maxCount", *n)?))]
            }
            ConstraintDecl::Class(class) => vec![Constraint::Class(ClassConstraint::new(class.clone()))],
            ConstraintDecl::HasValue(v) => vec![Constraint::HasValue(HasValue::new(v.clone()))],
            ConstraintDecl::Equals(p) => vec![Constraint::Pair(PairConstraint::equals(p.clone()))],
            ConstraintDecl::Disjoint(p) => vec![Constraint::Pair(PairConstraint::disjoint(p.clone()))],
            ConstraintDecl::LessThan(p) => {
                needs_path("sh:lessThan")?;
                vec![Constraint::Pair(PairConstraint::less_than(p.clone()))]
            }
            ConstraintDecl::LessThanOrEquals(p) => {
                needs_path("sh:lessThanOrEquals")?;
                vec![Constraint::Pair(PairConstraint::less_than_or_equals(p.clone()))]
            }
            ConstraintDecl::UniqueLang(enabled) => {
                needs_path("sh:uniqueLang")?;
                vec![Constraint::UniqueLang(UniqueLang::new(*enabled))]
            }
            ConstraintDecl::Closed { ignored } => vec![Constraint::Closed(ClosedConstraint::new(ignored.clone()))],
            ConstraintDecl::Not(s) => vec![Constraint::Logical(LogicalConstraint::not(self.resolve(id, s)?))],
            ConstraintDecl::Node(s) => vec![Constraint::Logical(LogicalConstraint::node(self.resolve(id, s)?))],
            ConstraintDecl::And(list) => vec![Constraint::Logical(LogicalConstraint::new(
                LogicalKind::And,
                self.list(id, "sh:and", list)?,
            ))],
            ConstraintDecl::Or(list) => vec![Constraint::Logical(LogicalConstraint::new(
                LogicalKind::Or,
                self.list(id, "sh:or", list)?,
            ))],
            ConstraintDecl::Xone(list) => vec![Constraint::Logical(LogicalConstraint::new(
                LogicalKind::Xone,
                self.list(id, "sh:xone", list)?,
            ))],
            ConstraintDecl::QualifiedValueShape {
                shape,
                min,
                max,
                disjoint,
            } => {
                needs_path("sh:qualifiedValueShape")?;
                let target = self.resolve(id, shape)?;
                let mut bounds = Vec::new();
                if let Some(min) = min {
                    bounds.push(QualifiedBound::Min(count(id, "sh:qualifiedMinCount", *min)?));
                }
                if let Some(max) = max {
                    bounds.push(QualifiedBound::Max(count(id, "sh:qualifiedMaxCount", *max)?));
                }
                if bounds.is_empty() {
                    return Err(ShaclError::malformed(
                        id,
                        "sh:qualifiedValueShape without sh:qualifiedMinCount or sh:qualifiedMaxCount",
                    ));
                }
                bounds
                    .into_iter()
                    .map(|bound| {
                        let q = QualifiedConstraint::new(target, bound);
                        let q = if *disjoint { q.disjoint_from(Vec::new()) } else { q };
                        Constraint::Qualified(q)
                    })
                    .collect()
            }
        })
    }
}

fn count(shape: &Term, what: &str, n: i64) -> Result<usize> {
    usize::try_from(n).map_err(|_| ShaclError::malformed(shape, format!("{} must be non-negative, got {}", what, n)))
}

fn check_path(shape: &Term, path: &Path) -> Result<()> {
    match path {
        Path::Predicate(_) => Ok(()),
        Path::Inverse(inner) | Path::ZeroOrMore(inner) | Path::OneOrMore(inner) | Path::ZeroOrOne(inner) => {
            check_path(shape, inner)
        }
        Path::Sequence(parts) | Path::Alternative(parts) => {
            if parts.is_empty() {
                return Err(ShaclError::malformed(shape, "empty path list"));
            }
            parts.iter().try_for_each(|p| check_path(shape, p))
        }
    }
}

/// Closed shapes allow the predicates of their property shapes
fn wire_closed(arena: &mut ShapeArena) {
    let ids: Vec<ShapeId> = arena.iter().map(|(id, _)| id).collect();
    for id in ids {
        let Some(shape) = arena.get(id) else { continue };
        let allowed: Vec<Iri> = shape
            .properties()
            .iter()
            .filter_map(|p| arena.get(*p))
            .filter_map(|p| p.path())
            .filter_map(|path| match path.simple_predicate() {
                Some((iri, false)) => Some(iri.clone()),
                _ => None,
            })
            .collect();
        if let Some(shape) = arena.get_mut(id) {
            for c in shape.constraints_mut() {
                if let Constraint::Closed(closed) = c {
                    closed.allow(allowed.iter().cloned());
                }
            }
        }
    }
}

/// Disjoint qualified shapes exclude the qualified shapes of sibling
/// property shapes, those reached through the same parent
fn wire_qualified_siblings(arena: &mut ShapeArena) {
    let parents: Vec<Vec<ShapeId>> = arena
        .iter()
        .map(|(_, s)| s.properties().to_vec())
        .filter(|p| !p.is_empty())
        .collect();
    let mut siblings: FxHashMap<ShapeId, Vec<ShapeId>> = FxHashMap::default();
    for properties in parents {
        let qualified: Vec<ShapeId> = properties
            .iter()
            .filter_map(|p| arena.get(*p))
            .flat_map(|p| p.constraints())
            .filter_map(|c| match c {
                Constraint::Qualified(q) => Some(q.shape()),
                _ => None,
            })
            .collect();
        for p in properties {
            let entry = siblings.entry(p).or_default();
            for q in &qualified {
                if !entry.contains(q) {
                    entry.push(*q);
                }
            }
        }
    }
    for (property, qualified) in siblings {
        if let Some(shape) = arena.get_mut(property) {
            for c in shape.constraints_mut() {
                if let Constraint::Qualified(q) = c {
                    if q.is_disjoint() {
                        *q = q.clone().disjoint_from(qualified.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Term {
        Term::iri(format!("http://x/{}", s))
    }

    fn person() -> ShapeDecl {
        ShapeDecl::node(t("PersonShape"))
            .with_target(Target::Class(Iri::new("http://x/Person")))
            .with_property(t("NameShape"))
            .with_constraint(ConstraintDecl::Closed { ignored: vec![] })
    }

    fn name() -> ShapeDecl {
        ShapeDecl::property(t("NameShape"), Path::predicate("http://x/name"))
            .with_constraint(ConstraintDecl::MinCount(1))
            .with_constraint(ConstraintDecl::Pattern {
                pattern: "^[A-Z]".to_string(),
                flags: None,
            })
    }

    #[test]
    fn test_build_resolves_and_wires_closed() {
        let arena = ShapesBuilder::new().shape(person()).shape(name()).build().unwrap();
        assert_eq!(arena.len(), 2);
        let person = arena.get(arena.find(&t("PersonShape")).unwrap()).unwrap();
        let Constraint::Closed(closed) = &person.constraints()[0] else {
            panic!("expected closed")
        };
        assert!(closed.allowed().contains(&Iri::new("http://x/name")));
        let name = arena.get(person.properties()[0]).unwrap();
        assert_eq!(name.constraints().len(), 2);
    }

    #[test]
    fn test_rejects_malformed_shapes() {
        let unknown = ShapesBuilder::new().shape(person()).build();
        assert!(matches!(unknown, Err(ShaclError::UnknownShapeReference { .. })));

        let negative = ShapesBuilder::new()
            .shape(ShapeDecl::property(t("P"), Path::predicate("http://x/p")).with_constraint(ConstraintDecl::MinCount(-1)))
            .build();
        assert!(matches!(negative, Err(ShaclError::MalformedShape { .. })));

        let bad_regex = ShapesBuilder::new()
            .shape(ShapeDecl::node(t("N")).with_constraint(ConstraintDecl::Pattern {
                pattern: "(".to_string(),
                flags: None,
            }))
            .build();
        assert!(matches!(bad_regex, Err(ShaclError::InvalidPattern { .. })));

        let bad_flag = ShapesBuilder::new()
            .shape(ShapeDecl::node(t("N")).with_constraint(ConstraintDecl::Pattern {
                pattern: "abc".to_string(),
                flags: Some("u".to_string()),
            }))
            .build();
        assert!(matches!(bad_flag, Err(ShaclError::InvalidPattern { .. })));

        let empty_or = ShapesBuilder::new()
            .shape(ShapeDecl::node(t("N")).with_constraint(ConstraintDecl::Or(vec![])))
            .build();
        assert!(matches!(empty_or, Err(ShaclError::MalformedShape { .. })));

        let pathless = ShapesBuilder::new()
            .shape(ShapeDecl::node(t("N")).with_property(t("M")))
            .shape(ShapeDecl::node(t("M")))
            .build();
        assert!(matches!(pathless, Err(ShaclError::MalformedShape { .. })));

        let min_count_on_node = ShapesBuilder::new()
            .shape(ShapeDecl::node(t("N")).with_constraint(ConstraintDecl::MinCount(1)))
            .build();
        assert!(matches!(min_count_on_node, Err(ShaclError::MalformedShape { .. })));
    }

    #[test]
    fn test_disjoint_qualified_siblings() {
        let qualified = |id: &str, shape: &str| {
            ShapeDecl::property(t(id), Path::predicate("http://x/pet")).with_constraint(
                ConstraintDecl::QualifiedValueShape {
                    shape: t(shape),
                    min: Some(1),
                    max: Some(2),
                    disjoint: true,
                },
            )
        };
        let arena = ShapesBuilder::new()
            .shape(ShapeDecl::node(t("Owner")).with_property(t("Q1")).with_property(t("Q2")))
            .shape(qualified("Q1", "Cat"))
            .shape(qualified("Q2", "Dog"))
            .shape(ShapeDecl::node(t("Cat")))
            .shape(ShapeDecl::node(t("Dog")))
            .build()
            .unwrap();
        let q1 = arena.get(arena.find(&t("Q1")).unwrap()).unwrap();
        assert_eq!(q1.constraints().len(), 2);
        let Constraint::Qualified(q) = &q1.constraints()[0] else {
            panic!("expected qualified")
        };
        assert!(q.is_disjoint());
        let dog = arena.find(&t("Dog")).unwrap();
        assert!(q.siblings().contains(&dog));
    }
}
