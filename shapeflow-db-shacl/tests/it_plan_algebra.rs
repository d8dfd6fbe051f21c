//! Algebraic properties of validation plans

mod support;

use shapeflow_db_core::{Connection, GraphScope, MemoryStore, Term, TriplePattern};
use shapeflow_db_shacl::plan::{collect, BoxedPlanNode, BulkedExternalJoin, UnionNode, UniqueKey, UniqueNode, ValuesNode};
use shapeflow_db_shacl::tuple::Contexts;
use shapeflow_db_shacl::{
    ConnectionsGroup, ConstraintDecl, Path, PlanContext, Scope, ShapeArena, ShapeDecl, ShapesBuilder, Target,
    TargetChain, TargetOverride, ValidationSettings, ValidationTuple,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use support::*;

fn no_contexts() -> Contexts {
    Arc::from(Vec::<Option<Term>>::new())
}

fn values(tuples: &[ValidationTuple]) -> BoxedPlanNode {
    Box::new(ValuesNode::new(tuples.to_vec()))
}

fn people() -> TargetChain {
    TargetChain::new(Target::Class(ex("Person")))
}

#[tokio::test]
async fn unique_over_self_union_is_idempotent() {
    let ctx = transaction(vec![], vec![], vec![]).await;
    let pair = |t: &str, v: &str| ValidationTuple::new(vec![node(t), node(v)], Scope::PropertyShape, true, no_contexts());
    let stream = vec![pair("a", "1"), pair("a", "2"), pair("b", "1"), pair("a", "1")];

    let mut single = UniqueNode::new(values(&stream), UniqueKey::Full);
    let single = collect(&mut single, &ctx, None).await.unwrap();

    let mut doubled = UniqueNode::new(
        Box::new(UnionNode::new(vec![values(&stream), values(&stream)])),
        UniqueKey::Full,
    );
    let doubled = collect(&mut doubled, &ctx, None).await.unwrap();

    assert_eq!(doubled.len(), 3, "no duplicate target/value pairs");
    assert_eq!(chains(&doubled), chains(&single));
}

#[tokio::test]
async fn batched_join_matches_per_tuple_join() {
    let statements = vec![
        link("a", "knows", "b"),
        link("a", "knows", "c"),
        link("b", "knows", "c"),
        link("d", "knows", "a"),
        link("e", "likes", "a"),
    ];
    let base = Arc::new(MemoryStore::from_statements(statements));
    let ctx = ConnectionsGroup::new(base.clone(), Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    let targets: Vec<ValidationTuple> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|n| ValidationTuple::target(node(n), Scope::PropertyShape, no_contexts()))
        .collect();

    // one store lookup per target
    let mut naive = BTreeSet::new();
    for t in &targets {
        let pattern = TriplePattern::subject_predicate(t.active_target().clone(), ex("knows"));
        for found in base.statements(&pattern, &GraphScope::All).await.unwrap() {
            naive.insert(vec![t.active_target().clone(), found.object]);
        }
    }

    let mut joined = Vec::new();
    for bulk in [1, 2, 100] {
        base.reset_queries();
        let mut join = BulkedExternalJoin::inner(values(&targets), Path::Predicate(ex("knows")), bulk);
        let out = collect(&mut join, &ctx, None).await.unwrap();
        joined.push((bulk, base.queries(), chains(&out)));
    }

    for (bulk, _, out) in &joined {
        assert_eq!(out, &naive, "bulk size {}", bulk);
    }
    let queries: Vec<usize> = joined.iter().map(|(_, q, _)| *q).collect();
    assert_eq!(queries, vec![5, 3, 1]);
}

/// Shapes over the `Person` class: `Emp` and `Mgr` check class membership,
/// the rest combine them
fn logical_arena() -> ShapeArena {
    let shape = |name: &str, c: ConstraintDecl| ShapeDecl::node(node(name)).with_constraint(c);
    let list = |names: &[&str]| names.iter().map(|n| node(n)).collect::<Vec<_>>();
    ShapesBuilder::new()
        .shape(shape("Emp", ConstraintDecl::Class(ex("Employee"))))
        .shape(shape("Mgr", ConstraintDecl::Class(ex("Manager"))))
        .shape(shape("NotEmp", ConstraintDecl::Not(node("Emp"))))
        .shape(shape("NotMgr", ConstraintDecl::Not(node("Mgr"))))
        .shape(shape("And", ConstraintDecl::And(list(&["Emp", "Mgr"]))))
        .shape(shape("Or", ConstraintDecl::Or(list(&["Emp", "Mgr"]))))
        .shape(shape("NotOr", ConstraintDecl::Not(node("Or"))))
        .shape(shape("AndNots", ConstraintDecl::And(list(&["NotEmp", "NotMgr"]))))
        .build()
        .unwrap()
}

async fn staff() -> ConnectionsGroup {
    transaction(
        vec![
            typed("ann", "Person"),
            typed("bob", "Person"),
            typed("cat", "Person"),
            typed("dan", "Person"),
            typed("ann", "Employee"),
            typed("bob", "Manager"),
            typed("cat", "Employee"),
            typed("cat", "Manager"),
            typed("eve", "Employee"),
        ],
        vec![],
        vec![],
    )
    .await
}

/// Focus nodes the first constraint of `shape` reports over every person
async fn invalid(arena: &ShapeArena, ctx: &ConnectionsGroup, shape: &str) -> BTreeSet<Term> {
    let settings = ValidationSettings::default().with_bulk_join_size(2);
    let pc = PlanContext::new(ctx, arena, &settings);
    let id = arena.find(&node(shape)).unwrap();
    let constraint = &arena.get(id).unwrap().constraints()[0];
    let mut plan = constraint
        .component()
        .transactional_plan(&pc, &people(), Scope::NodeShape, Some(&TargetOverride::AllTargets))
        .unwrap();
    active_targets(&collect(plan.as_mut(), ctx, None).await.unwrap())
}

fn set(names: &[&str]) -> BTreeSet<Term> {
    names.iter().map(|n| node(n)).collect()
}

#[tokio::test]
async fn negation_is_complement_of_child() {
    let arena = logical_arena();
    let ctx = staff().await;
    let all = set(&["ann", "bob", "cat", "dan"]);

    let emp_invalid = invalid(&arena, &ctx, "Emp").await;
    assert_eq!(emp_invalid, set(&["bob", "dan"]));
    let not_emp = invalid(&arena, &ctx, "NotEmp").await;
    assert_eq!(not_emp, all.difference(&emp_invalid).cloned().collect());
}

#[tokio::test]
async fn and_is_union_and_or_is_intersection() {
    let arena = logical_arena();
    let ctx = staff().await;
    let emp = invalid(&arena, &ctx, "Emp").await;
    let mgr = invalid(&arena, &ctx, "Mgr").await;

    let and = invalid(&arena, &ctx, "And").await;
    assert_eq!(and, emp.union(&mgr).cloned().collect());
    assert_eq!(and, set(&["ann", "bob", "dan"]));

    let or = invalid(&arena, &ctx, "Or").await;
    assert_eq!(or, emp.intersection(&mgr).cloned().collect());
    assert_eq!(or, set(&["dan"]));

    let not_or = invalid(&arena, &ctx, "NotOr").await;
    let and_nots = invalid(&arena, &ctx, "AndNots").await;
    assert_eq!(not_or, and_nots);
    assert_eq!(not_or, set(&["ann", "bob", "cat"]));
}
