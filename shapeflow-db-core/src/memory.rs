//! In-memory indexed statement store
//!
//! `MemoryStore` keeps statements in a set plus subject, predicate, and
//! object indexes. It serves as the base snapshot and as the added/removed
//! delta views in tests and embedded use.
//!
//! The store counts the queries it serves (a bulk call counts once), which
//! lets callers observe how well bulked joins amortize round trips.

use crate::connection::Connection;
use crate::error::Result;
use crate::statement::{GraphScope, Statement, TriplePattern};
use crate::term::{Iri, Term};
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    statements: FxHashSet<Statement>,
    by_subject: FxHashMap<Term, Vec<Statement>>,
    by_predicate: FxHashMap<Iri, Vec<Statement>>,
    by_object: FxHashMap<Term, Vec<Statement>>,
    queries: AtomicUsize,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            statements: self.statements.clone(),
            by_subject: self.by_subject.clone(),
            by_predicate: self.by_predicate.clone(),
            by_object: self.by_object.clone(),
            queries: AtomicUsize::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_statements(statements: impl IntoIterator<Item = Statement>) -> Self {
        let mut store = Self::new();
        for st in statements {
            store.insert(st);
        }
        store
    }

    /// Insert a statement; returns false if it was already present
    pub fn insert(&mut self, st: Statement) -> bool {
        if !self.statements.insert(st.clone()) {
            return false;
        }
        self.by_subject.entry(st.subject.clone()).or_default().push(st.clone());
        self.by_predicate.entry(st.predicate.clone()).or_default().push(st.clone());
        self.by_object.entry(st.object.clone()).or_default().push(st);
        true
    }

    /// Remove a statement; returns false if it was absent
    pub fn remove(&mut self, st: &Statement) -> bool {
        if !self.statements.remove(st) {
            return false;
        }
        if let Some(v) = self.by_subject.get_mut(&st.subject) {
            v.retain(|x| x != st);
        }
        if let Some(v) = self.by_predicate.get_mut(&st.predicate) {
            v.retain(|x| x != st);
        }
        if let Some(v) = self.by_object.get_mut(&st.object) {
            v.retain(|x| x != st);
        }
        true
    }

    pub fn contains(&self, st: &Statement) -> bool {
        self.statements.contains(st)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    /// Produce the post-transaction state `self - removed + added`
    pub fn apply(&self, added: &MemoryStore, removed: &MemoryStore) -> MemoryStore {
        let mut next = self.clone();
        for st in removed.iter() {
            next.remove(st);
        }
        for st in added.iter() {
            next.insert(st.clone());
        }
        next
    }

    /// Number of queries served so far
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn reset_queries(&self) {
        self.queries.store(0, Ordering::Relaxed);
    }

    fn scan(&self, pattern: &TriplePattern, graphs: &GraphScope) -> Vec<Statement> {
        // Pick the most selective bound index
        let candidates: Box<dyn Iterator<Item = &Statement> + '_> =
            match (&pattern.subject, &pattern.predicate, &pattern.object) {
                (Some(s), _, _) => Box::new(self.by_subject.get(s).into_iter().flatten()),
                (None, _, Some(o)) => Box::new(self.by_object.get(o).into_iter().flatten()),
                (None, Some(p), None) => Box::new(self.by_predicate.get(p).into_iter().flatten()),
                (None, None, None) => Box::new(self.statements.iter()),
            };
        candidates
            .filter(|st| pattern.matches(st) && graphs.contains(&st.graph))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Connection for MemoryStore {
    async fn statements(&self, pattern: &TriplePattern, graphs: &GraphScope) -> Result<Vec<Statement>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.scan(pattern, graphs))
    }

    async fn statements_bulk(
        &self,
        patterns: &[TriplePattern],
        graphs: &GraphScope,
    ) -> Result<Vec<Vec<Statement>>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(patterns.iter().map(|p| self.scan(p, graphs)).collect())
    }

    async fn has_statement(
        &self,
        pattern: &TriplePattern,
        _include_inferred: bool,
        graphs: &GraphScope,
    ) -> Result<bool> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(!self.scan(pattern, graphs).is_empty())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.statements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(s: &str, p: &str, o: &str) -> Statement {
        Statement::new(Term::iri(s), Iri::new(p), Term::iri(o))
    }

    #[tokio::test]
    async fn test_scan_by_each_index() {
        let store = MemoryStore::from_statements([
            st("http://x/a", "http://x/p", "http://x/b"),
            st("http://x/a", "http://x/q", "http://x/c"),
            st("http://x/d", "http://x/p", "http://x/b"),
        ]);
        let all = GraphScope::All;
        let by_s = store
            .statements(&TriplePattern::new(Some(Term::iri("http://x/a")), None, None), &all)
            .await
            .unwrap();
        assert_eq!(by_s.len(), 2);
        let by_o = store
            .statements(&TriplePattern::new(None, None, Some(Term::iri("http://x/b"))), &all)
            .await
            .unwrap();
        assert_eq!(by_o.len(), 2);
        let by_p = store
            .statements(&TriplePattern::predicate(Iri::new("http://x/q")), &all)
            .await
            .unwrap();
        assert_eq!(by_p.len(), 1);
        assert_eq!(store.queries(), 3);
    }

    #[tokio::test]
    async fn test_bulk_counts_once() {
        let store = MemoryStore::from_statements([st("http://x/a", "http://x/p", "http://x/b")]);
        let patterns = vec![
            TriplePattern::subject_predicate(Term::iri("http://x/a"), Iri::new("http://x/p")),
            TriplePattern::subject_predicate(Term::iri("http://x/z"), Iri::new("http://x/p")),
        ];
        let out = store.statements_bulk(&patterns, &GraphScope::All).await.unwrap();
        assert_eq!(out[0].len(), 1);
        assert!(out[1].is_empty());
        assert_eq!(store.queries(), 1);
    }

    #[test]
    fn test_apply_delta() {
        let base = MemoryStore::from_statements([st("http://x/a", "http://x/p", "http://x/b")]);
        let added = MemoryStore::from_statements([st("http://x/c", "http://x/p", "http://x/b")]);
        let removed = MemoryStore::from_statements([st("http://x/a", "http://x/p", "http://x/b")]);
        let next = base.apply(&added, &removed);
        assert_eq!(next.len(), 1);
        assert!(next.contains(&st("http://x/c", "http://x/p", "http://x/b")));
    }

    #[test]
    fn test_named_graph_filter() {
        let g = Term::iri("http://x/g");
        let store = MemoryStore::from_statements([
            st("http://x/a", "http://x/p", "http://x/b").in_graph(g.clone()),
            st("http://x/a", "http://x/p", "http://x/c"),
        ]);
        let scoped = store.scan(&TriplePattern::any(), &GraphScope::Graphs(vec![Some(g)]));
        assert_eq!(scoped.len(), 1);
        assert_eq!(store.scan(&TriplePattern::any(), &GraphScope::default_graph()).len(), 1);
    }
}
