//! Shared test harness for shapeflow-db-shacl integration tests.
//!
//! Provides term helpers, connection group builders, report projections, and
//! a span capture layer for asserting on the engine's tracing output.

// Helpers are shared by several test crates; not every crate uses every one.
#![allow(dead_code)]

use shapeflow_db_core::{ConnectionRef, Iri, MemoryStore, Statement, Term};
use shapeflow_db_shacl::{
    ConnectionsGroup, ShaclEngine, ShapeArena, ValidationReport, ValidationSettings, ValidationTuple,
};
use shapeflow_vocab::rdf;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

// =============================================================================
// Terms and statements
// =============================================================================

pub const EX: &str = "http://example.org/";

pub fn ex(local: &str) -> Iri {
    Iri::new(format!("{}{}", EX, local))
}

pub fn node(local: &str) -> Term {
    Term::iri(format!("{}{}", EX, local))
}

pub fn st(s: &str, p: &str, o: Term) -> Statement {
    Statement::new(node(s), ex(p), o)
}

pub fn link(s: &str, p: &str, o: &str) -> Statement {
    st(s, p, node(o))
}

pub fn typed(s: &str, class: &str) -> Statement {
    Statement::new(node(s), Iri::new(rdf::TYPE), node(class))
}

// =============================================================================
// Connection groups
// =============================================================================

/// A transaction over `base`
pub async fn transaction(base: Vec<Statement>, added: Vec<Statement>, removed: Vec<Statement>) -> ConnectionsGroup {
    ConnectionsGroup::new(store(base), store(added), store(removed))
        .await
        .expect("connections group")
}

/// The post-transaction state loaded into an empty store, which forces bulk validation
pub async fn post_state(base: Vec<Statement>, added: Vec<Statement>, removed: Vec<Statement>) -> ConnectionsGroup {
    let after = MemoryStore::from_statements(base).apply(
        &MemoryStore::from_statements(added),
        &MemoryStore::from_statements(removed),
    );
    ConnectionsGroup::new(
        Arc::new(MemoryStore::new()),
        Arc::new(after),
        Arc::new(MemoryStore::new()),
    )
    .await
    .expect("connections group")
}

fn store(statements: Vec<Statement>) -> ConnectionRef {
    Arc::new(MemoryStore::from_statements(statements))
}

// =============================================================================
// Running and projecting
// =============================================================================

/// Sequential settings with small join batches
pub fn settings() -> ValidationSettings {
    ValidationSettings::default()
        .with_parallel_validation(false)
        .with_bulk_join_size(2)
}

pub async fn validate(arena: &ShapeArena, ctx: &ConnectionsGroup) -> ValidationReport {
    ShaclEngine::new(arena.clone(), settings())
        .validate(ctx)
        .await
        .expect("validation run")
}

/// `(focus, value, component)` of every result
pub type Violation = (Term, Option<Term>, &'static str);

pub fn violations(report: &ValidationReport) -> BTreeSet<Violation> {
    report
        .results
        .iter()
        .map(|r| {
            (
                r.focus_node.clone(),
                r.value.clone(),
                r.source_constraint_component.name(),
            )
        })
        .collect()
}

pub fn focus_nodes(report: &ValidationReport) -> BTreeSet<Term> {
    report.results.iter().map(|r| r.focus_node.clone()).collect()
}

pub fn active_targets(tuples: &[ValidationTuple]) -> BTreeSet<Term> {
    tuples.iter().map(|t| t.active_target().clone()).collect()
}

pub fn chains(tuples: &[ValidationTuple]) -> BTreeSet<Vec<Term>> {
    tuples.iter().map(|t| t.chain().to_vec()).collect()
}

// =============================================================================
// Span capture
// =============================================================================

/// A recorded span with its name, level, and creation fields.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub level: tracing::Level,
    pub fields: HashMap<String, String>,
    pub parent_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpanStore(Arc<Mutex<Vec<CapturedSpan>>>);

impl SpanStore {
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.0.lock().unwrap().clone()
    }

    pub fn find_spans(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    pub fn has_span(&self, name: &str) -> bool {
        !self.find_spans(name).is_empty()
    }
}

struct SpanCaptureLayer {
    store: SpanStore,
}

struct FieldVisitor(HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = FieldVisitor(HashMap::new());
        attrs.record(&mut fields);
        let parent_name = attrs
            .parent()
            .and_then(|pid| ctx.span(pid))
            .map(|span| span.name().to_string())
            .or_else(|| ctx.lookup_current().map(|span| span.name().to_string()));
        let span = ctx.span(id).expect("span should exist");
        let meta = span.metadata();
        self.store.0.lock().unwrap().push(CapturedSpan {
            name: meta.name(),
            level: *meta.level(),
            fields: fields.0,
            parent_name,
        });
    }
}

/// Capture spans on this thread until the guard drops
pub fn init_test_tracing() -> (SpanStore, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;
    let store = SpanStore::default();
    let subscriber = tracing_subscriber::registry().with(SpanCaptureLayer { store: store.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}
