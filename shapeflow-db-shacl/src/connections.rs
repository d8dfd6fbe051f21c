//! Transactional context for one validation run
//!
//! A [`ConnectionsGroup`] bundles the pre-transaction base connection, the
//! added and removed statement views, the derived post-transaction view,
//! and the injected collaborators (reasoner, bulk query executor, path
//! renderer). It is read-only for the duration of a run and cheap to clone.

use crate::error::Result;
use crate::path::{PathRenderer, SparqlPathRenderer};
use crate::query::SparqlExecutor;
use crate::tuple::Contexts;
use shapeflow_db_core::{Connection, ConnectionRef, GraphScope, Iri, OverlayConnection, Reasoner};
use std::sync::Arc;

/// Which statements a scan reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreView {
    /// Pre-transaction state
    Base,
    /// Statements added by the transaction
    Added,
    /// Statements removed by the transaction
    Removed,
    /// Post-transaction state
    Current,
}

/// Summary statistics used for fast-path skipping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    added_size: usize,
    removed_size: usize,
    base_empty: bool,
}

impl Stats {
    pub fn has_added(&self) -> bool {
        self.added_size > 0
    }

    pub fn has_removed(&self) -> bool {
        self.removed_size > 0
    }

    /// Whether the store was empty before the transaction
    pub fn is_base_empty(&self) -> bool {
        self.base_empty
    }

    /// Number of added plus removed statements
    pub fn delta_size(&self) -> usize {
        self.added_size + self.removed_size
    }
}

#[derive(Clone)]
pub struct ConnectionsGroup {
    base: ConnectionRef,
    added: ConnectionRef,
    removed: ConnectionRef,
    current: Arc<OverlayConnection>,
    reasoner: Option<Arc<dyn Reasoner>>,
    sparql: Option<Arc<dyn SparqlExecutor>>,
    renderer: Arc<dyn PathRenderer>,
    data_graph: GraphScope,
    contexts: Contexts,
    stats: Stats,
}

impl ConnectionsGroup {
    /// Build the group and compute its statistics
    pub async fn new(base: ConnectionRef, added: ConnectionRef, removed: ConnectionRef) -> Result<Self> {
        let stats = Stats {
            added_size: added.size().await?,
            removed_size: removed.size().await?,
            base_empty: base.is_empty().await?,
        };
        let current = Arc::new(OverlayConnection::new(
            base.clone(),
            added.clone(),
            removed.clone(),
        ));
        Ok(Self {
            base,
            added,
            removed,
            current,
            reasoner: None,
            sparql: None,
            renderer: Arc::new(SparqlPathRenderer),
            data_graph: GraphScope::All,
            contexts: Arc::from(Vec::new()),
            stats,
        })
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn without_reasoner(&self) -> Self {
        let mut out = self.clone();
        out.reasoner = None;
        out
    }

    pub fn with_sparql_executor(mut self, executor: Arc<dyn SparqlExecutor>) -> Self {
        self.sparql = Some(executor);
        self
    }

    pub fn with_path_renderer(mut self, renderer: Arc<dyn PathRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_data_graph(mut self, graphs: GraphScope) -> Self {
        self.contexts = graphs.contexts().into();
        self.data_graph = graphs;
        self
    }

    pub fn base(&self) -> &dyn Connection {
        self.base.as_ref()
    }

    pub fn added(&self) -> &dyn Connection {
        self.added.as_ref()
    }

    pub fn removed(&self) -> &dyn Connection {
        self.removed.as_ref()
    }

    /// Post-transaction state
    pub fn current(&self) -> &dyn Connection {
        self.current.as_ref()
    }

    pub fn view(&self, view: StoreView) -> &dyn Connection {
        match view {
            StoreView::Base => self.base(),
            StoreView::Added => self.added(),
            StoreView::Removed => self.removed(),
            StoreView::Current => self.current(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn reasoner(&self) -> Option<&Arc<dyn Reasoner>> {
        self.reasoner.as_ref()
    }

    pub fn sparql_executor(&self) -> Option<&Arc<dyn SparqlExecutor>> {
        self.sparql.as_ref()
    }

    pub fn renderer(&self) -> &dyn PathRenderer {
        self.renderer.as_ref()
    }

    pub fn data_graph(&self) -> &GraphScope {
        &self.data_graph
    }

    /// Provenance recorded on tuples
    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    /// A class and, with a reasoner, its subclasses
    pub fn expand_class(&self, class: &Iri) -> Vec<Iri> {
        match &self.reasoner {
            Some(r) => r.expand_class(class),
            None => vec![class.clone()],
        }
    }
}

impl std::fmt::Debug for ConnectionsGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionsGroup")
            .field("stats", &self.stats)
            .field("data_graph", &self.data_graph)
            .field("reasoner", &self.reasoner.is_some())
            .field("sparql", &self.sparql.is_some())
            .finish()
    }
}
