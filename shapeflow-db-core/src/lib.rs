//! # shapeflow DB Core
//!
//! Store-side building blocks for the shape validation engine.
//!
//! This crate provides:
//! - Core types: `Term`, `Iri`, `Literal`, `Statement`, `TriplePattern`, `GraphScope`
//! - The async `Connection` trait the engine reads snapshots through
//! - `MemoryStore`, an indexed in-memory store
//! - `OverlayConnection`, the post-transaction view `base - removed + added`
//! - The `Reasoner` trait and `SchemaHierarchy` subclass closures
//! - Typed literal parsing and comparison
//!
//! ## Design Principles
//!
//! 1. **Async at I/O seam only**: connections are async, everything else is plain data
//! 2. **Read-only during validation**: no connection is written while a run iterates
//! 3. **Cheap clones**: terms are `Arc<str>`-backed
//!
//! ## Example
//!
//! ```ignore
//! use shapeflow_db_core::{Connection, GraphScope, MemoryStore, TriplePattern};
//!
//! let store = MemoryStore::from_statements(statements);
//! let found = store.statements(&TriplePattern::any(), &GraphScope::All).await?;
//! ```

pub mod comparator;
pub mod connection;
pub mod error;
pub mod memory;
pub mod overlay;
pub mod schema_hierarchy;
pub mod statement;
pub mod term;

pub use comparator::{compare_terms, is_well_formed, parse_literal, LiteralValue};
pub use connection::{Connection, ConnectionRef};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use overlay::OverlayConnection;
pub use schema_hierarchy::{Reasoner, SchemaHierarchy};
pub use statement::{GraphScope, Statement, TriplePattern};
pub use term::{Iri, Literal, Term};
