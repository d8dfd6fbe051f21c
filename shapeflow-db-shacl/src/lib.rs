//! Incremental SHACL validation
//!
//! This crate validates a transaction against a set of SHACL shapes by
//! looking only at what the transaction can have changed. Each constraint of
//! each shape compiles into a plan: a tree of [`plan::PlanNode`]s that
//! streams [`ValidationTuple`]s from the added and removed statements,
//! expands them into the affected target chains, and keeps the invalid ones.
//!
//! # Overview
//!
//! 1. Declare shapes with [`ShapesBuilder`], which resolves shape references
//!    into a [`ShapeArena`].
//! 2. Bundle the store before the transaction and the added and removed
//!    statements into a [`ConnectionsGroup`].
//! 3. Run a [`ShaclEngine`] over it to get a [`ValidationReport`].
//!
//! Large transactions and transactions on an empty store are validated in
//! bulk instead. With a [`SparqlExecutor`] configured, constraints that have
//! a declarative form are then checked with one query each.
//!
//! # Supported Constraints
//!
//! - Cardinality: `sh:minCount`, `sh:maxCount`
//! - Value type: `sh:datatype`, `sh:nodeKind`, `sh:class`
//! - Value range: `sh:minInclusive`, `sh:maxInclusive`, `sh:minExclusive`, `sh:maxExclusive`
//! - String: `sh:pattern`, `sh:minLength`, `sh:maxLength`, `sh:languageIn`, `sh:uniqueLang`
//! - Value: `sh:hasValue`, `sh:in`
//! - Closed: `sh:closed`, `sh:ignoredProperties`
//! - Pair: `sh:equals`, `sh:disjoint`, `sh:lessThan`, `sh:lessThanOrEquals`
//! - Logical: `sh:not`, `sh:and`, `sh:or`, `sh:xone`, `sh:node`
//! - Qualified: `sh:qualifiedValueShape` with `sh:qualifiedMinCount`, `sh:qualifiedMaxCount`
//!
//! # Example
//!
//! ```ignore
//! use shapeflow_db_shacl::{ConnectionsGroup, ShaclEngine, ShapesBuilder, ValidationSettings};
//!
//! let arena = ShapesBuilder::new().shape(person_shape).build()?;
//! let engine = ShaclEngine::new(arena, ValidationSettings::default());
//!
//! let ctx = ConnectionsGroup::new(base, added, removed).await?;
//! let report = engine.validate(&ctx).await?;
//!
//! if !report.conforms {
//!     for result in &report.results {
//!         println!("{}", result);
//!     }
//! }
//! ```

pub mod builder;
pub mod connections;
pub mod constraint;
pub mod effective;
pub mod error;
pub mod fragment;
pub mod matcher;
pub mod path;
pub mod plan;
pub mod query;
pub mod report;
pub mod settings;
pub mod shape;
pub mod target;
pub mod tuple;
pub mod validate;

pub use builder::{ConstraintDecl, ShapeDecl, ShapesBuilder};
pub use connections::{ConnectionsGroup, Stats, StoreView};
pub use constraint::{Constraint, ConstraintComponent, PlanContext, SourceConstraintComponent, TargetOverride};
pub use effective::EffectiveTarget;
pub use error::{Result, ShaclError, Unsupported};
pub use fragment::SparqlFragment;
pub use path::{Path, PathRenderer, SparqlPathRenderer};
pub use query::{QueryRow, SparqlExecutor, ValidationQuery};
pub use report::{ReportSink, ValidationReport, ValidationResult};
pub use settings::{ValidationApproach, ValidationSettings};
pub use shape::{ConstraintUnit, Severity, Shape, ShapeArena, ShapeId};
pub use target::{Target, TargetChain};
pub use tuple::{Scope, ValidationTuple};
pub use validate::{RunMode, ShaclEngine};

/// SHACL vocabulary full IRIs (re-exported from shapeflow-vocab)
pub use shapeflow_vocab::shacl;
