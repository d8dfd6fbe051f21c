//! Shapes and the shape arena
//!
//! Shapes reference each other (`sh:property`, `sh:node`, the logical
//! lists, qualified value shapes), possibly cyclically. They live in a
//! [`ShapeArena`] and refer to each other by [`ShapeId`], so a shape graph
//! is plain owned data that can be cloned, merged and shared across runs.
//!
//! A shape is evaluated as a flat list of [`ConstraintUnit`]s: one per
//! constraint of the shape and of its nested property shapes, each with the
//! target chain and scope it applies at.

use crate::constraint::Constraint;
use crate::path::Path;
use crate::target::{Target, TargetChain};
use crate::tuple::Scope;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shapeflow_db_core::Term;
use shapeflow_vocab::shacl;
use std::fmt;

/// Index of a shape in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `sh:severity`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Violation,
    Warning,
    Info,
}

impl Severity {
    pub fn iri(&self) -> &'static str {
        match self {
            Severity::Violation => shacl::VIOLATION,
            Severity::Warning => shacl::WARNING,
            Severity::Info => shacl::INFO,
        }
    }

    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri {
            shacl::VIOLATION => Some(Severity::Violation),
            shacl::WARNING => Some(Severity::Warning),
            shacl::INFO => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shape {
    id: Term,
    path: Option<Path>,
    targets: Vec<Target>,
    constraints: Vec<Constraint>,
    properties: Vec<ShapeId>,
    severity: Severity,
    deactivated: bool,
    messages: Vec<Term>,
}

impl Shape {
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

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_property(mut self, property: ShapeId) -> Self {
        self.properties.push(property);
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

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn is_property_shape(&self) -> bool {
        self.path.is_some()
    }

    pub fn scope(&self) -> Scope {
        if self.path.is_some() {
            Scope::PropertyShape
        } else {
            Scope::NodeShape
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub(crate) fn constraints_mut(&mut self) -> &mut Vec<Constraint> {
        &mut self.constraints
    }

    pub fn properties(&self) -> &[ShapeId] {
        &self.properties
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    pub fn messages(&self) -> &[Term] {
        &self.messages
    }

    /// Every shape this one refers to
    pub fn references(&self) -> Vec<ShapeId> {
        let mut out = self.properties.clone();
        for c in &self.constraints {
            out.extend(c.shape_refs());
        }
        out
    }

    fn remap(&mut self, map: &dyn Fn(ShapeId) -> ShapeId) {
        for p in &mut self.properties {
            *p = map(*p);
        }
        for c in &mut self.constraints {
            c.remap(map);
        }
    }
}

/// One constraint of a shape, positioned on a target chain
#[derive(Debug, Clone)]
pub struct ConstraintUnit<'a> {
    /// The shape declaring the constraint
    pub shape: ShapeId,
    pub chain: TargetChain,
    pub scope: Scope,
    pub constraint: &'a Constraint,
}

#[derive(Debug, Clone, Default)]
pub struct ShapeArena {
    shapes: Vec<Shape>,
}

impl ShapeArena {
    pub fn push(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(shape);
        id
    }

    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ShapeId) -> Option<&mut Shape> {
        self.shapes.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
        self.shapes.iter().enumerate().map(|(i, s)| (ShapeId(i as u32), s))
    }

    /// The shape with the given identifier
    pub fn find(&self, id: &Term) -> Option<ShapeId> {
        self.iter().find(|(_, s)| s.id() == id).map(|(i, _)| i)
    }

    /// Active shapes with at least one target
    pub fn roots(&self) -> Vec<ShapeId> {
        self.iter()
            .filter(|(_, s)| !s.is_deactivated() && !s.targets().is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// The constraints `shape` evaluates for focus nodes reached by `focus`
    ///
    /// Nested property shapes are included; a property shape's own property
    /// shapes take its values as focus nodes. Deactivated shapes and cycles
    /// through `sh:property` contribute nothing.
    pub fn units(&self, shape: ShapeId, focus: &TargetChain) -> Vec<ConstraintUnit<'_>> {
        let mut out = Vec::new();
        let mut visiting = Vec::new();
        self.collect_units(shape, focus, &mut visiting, &mut out);
        out
    }

    fn collect_units<'a>(
        &'a self,
        id: ShapeId,
        focus: &TargetChain,
        visiting: &mut Vec<ShapeId>,
        out: &mut Vec<ConstraintUnit<'a>>,
    ) {
        if visiting.contains(&id) {
            return;
        }
        let Some(shape) = self.get(id) else { return };
        if shape.is_deactivated() {
            return;
        }
        let chain = match shape.path() {
            Some(path) => focus.with_path(path.clone()),
            None => focus.clone(),
        };
        let scope = shape.scope();
        out.extend(shape.constraints().iter().map(|constraint| ConstraintUnit {
            shape: id,
            chain: chain.clone(),
            scope,
            constraint,
        }));
        visiting.push(id);
        for property in shape.properties() {
            self.collect_units(*property, &chain, visiting, out);
        }
        visiting.pop();
    }

    /// Shapes reachable from `root`, `root` first
    fn reachable(&self, root: ShapeId) -> Vec<ShapeId> {
        let mut order = vec![root];
        let mut i = 0;
        while i < order.len() {
            if let Some(shape) = self.get(order[i]) {
                for r in shape.references() {
                    if !order.contains(&r) {
                        order.push(r);
                    }
                }
            }
            i += 1;
        }
        order
    }

    /// A new arena holding `root` and every shape it reaches
    ///
    /// The root is `ShapeId` 0 of the returned arena.
    pub fn deep_clone(&self, root: ShapeId) -> ShapeArena {
        let order: Vec<ShapeId> = self.reachable(root).into_iter().filter(|id| self.get(*id).is_some()).collect();
        let index: FxHashMap<ShapeId, ShapeId> = order
            .iter()
            .enumerate()
            .map(|(i, old)| (*old, ShapeId(i as u32)))
            .collect();
        let map = |id: ShapeId| index.get(&id).copied().unwrap_or(id);
        let mut out = ShapeArena::default();
        for old in &order {
            if let Some(shape) = self.get(*old) {
                let mut shape = shape.clone();
                shape.remap(&map);
                out.push(shape);
            }
        }
        out
    }

    /// Append every shape of `other`, returning where its shapes landed
    pub fn import(&mut self, other: &ShapeArena) -> Vec<ShapeId> {
        let offset = self.shapes.len() as u32;
        let map = |id: ShapeId| ShapeId(id.0 + offset);
        other
            .shapes
            .iter()
            .map(|shape| {
                let mut shape = shape.clone();
                shape.remap(&map);
                self.push(shape)
            })
            .collect()
    }
}
