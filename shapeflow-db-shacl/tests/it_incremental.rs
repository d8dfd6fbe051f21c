//! Transactional validation against bulk validation of the same state

mod support;

use shapeflow_db_core::{Statement, Term};
use shapeflow_db_shacl::{
    ConstraintDecl, Path, RunMode, ShaclEngine, ShapeArena, ShapeDecl, ShapesBuilder, SourceConstraintComponent,
    Target,
};
use shapeflow_vocab::xsd;
use support::*;

fn person_shapes() -> ShapeArena {
    ShapesBuilder::new()
        .shape(
            ShapeDecl::node(node("PersonShape"))
                .with_target(Target::Class(ex("Person")))
                .with_property(node("KnowsShape"))
                .with_property(node("AgeShape")),
        )
        .shape(
            ShapeDecl::property(node("KnowsShape"), Path::Predicate(ex("knows")))
                .with_constraint(ConstraintDecl::MinCount(1))
                .with_constraint(ConstraintDecl::MaxCount(2))
                .with_constraint(ConstraintDecl::Class(ex("Person"))),
        )
        .shape(
            ShapeDecl::property(node("AgeShape"), Path::Predicate(ex("age")))
                .with_constraint(ConstraintDecl::Datatype(xsd::INTEGER.into()))
                .with_constraint(ConstraintDecl::MaxCount(1)),
        )
        .build()
        .unwrap()
}

fn people_base() -> Vec<Statement> {
    vec![
        typed("ann", "Person"),
        typed("bob", "Person"),
        typed("cat", "Person"),
        link("ann", "knows", "bob"),
        link("bob", "knows", "ann"),
        link("cat", "knows", "ann"),
        link("cat", "knows", "bob"),
        st("ann", "age", Term::integer(30)),
        st("bob", "age", Term::integer(40)),
    ]
}

#[tokio::test]
async fn new_person_without_knows_reported_once_then_cleared() {
    let arena = person_shapes();
    let base = vec![typed("zed", "Thing")];

    let ctx = transaction(base.clone(), vec![typed("ann", "Person")], vec![]).await;
    let engine = ShaclEngine::new(arena.clone(), settings());
    assert_eq!(engine.run_mode(&ctx), RunMode::Transactional);
    let report = engine.validate(&ctx).await.unwrap();
    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert_eq!(result.focus_node, node("ann"));
    assert_eq!(result.value, None);
    assert_eq!(result.source_constraint_component, SourceConstraintComponent::MinCount);
    assert_eq!(result.result_path, Some(Path::Predicate(ex("knows"))));
    assert!(!report.conforms);

    // same transaction with one knows triple
    let ctx = transaction(
        base.clone(),
        vec![
            typed("ann", "Person"),
            link("ann", "knows", "zed"),
            typed("zed", "Person"),
            link("zed", "knows", "ann"),
        ],
        vec![],
    )
    .await;
    let report = validate(&arena, &ctx).await;
    assert!(report.conforms, "{:?}", report.results);

    // next transaction on top of the first adds the missing triple
    let mut after_first = base;
    after_first.push(typed("ann", "Person"));
    after_first.push(typed("zed", "Person"));
    after_first.push(link("zed", "knows", "ann"));
    let ctx = transaction(after_first, vec![link("ann", "knows", "zed")], vec![]).await;
    let report = validate(&arena, &ctx).await;
    assert!(report.results.is_empty(), "{:?}", report.results);
}

#[tokio::test]
async fn count_boundaries() {
    let arena = ShapesBuilder::new()
        .shape(
            ShapeDecl::node(node("S"))
                .with_target(Target::Class(ex("Person")))
                .with_property(node("P")),
        )
        .shape(
            ShapeDecl::property(node("P"), Path::Predicate(ex("knows")))
                .with_constraint(ConstraintDecl::MinCount(2))
                .with_constraint(ConstraintDecl::MaxCount(3)),
        )
        .build()
        .unwrap();

    let mut added = Vec::new();
    for (person, n) in [("one", 1), ("two", 2), ("three", 3), ("four", 4)] {
        added.push(typed(person, "Person"));
        for i in 0..n {
            added.push(link(person, "knows", &format!("k{}", i)));
        }
    }

    for ctx in [
        post_state(vec![], added.clone(), vec![]).await,
        transaction(vec![typed("x", "Other")], added.clone(), vec![]).await,
    ] {
        let found = violations(&validate(&arena, &ctx).await);
        let expected = [(node("one"), None, "MinCount"), (node("four"), None, "MaxCount")]
            .into_iter()
            .collect();
        assert_eq!(found, expected);
    }
}

#[tokio::test]
async fn transactional_matches_bulk_over_post_state() {
    let arena = person_shapes();
    let base = people_base();
    let clean = post_state(base.clone(), vec![], vec![]).await;
    assert!(validate(&arena, &clean).await.results.is_empty(), "base conforms");

    let deltas: Vec<(&str, Vec<Statement>, Vec<Statement>)> = vec![
        ("new person", vec![typed("dan", "Person")], vec![]),
        ("lost knows", vec![], vec![link("bob", "knows", "ann")]),
        ("too many and untyped", vec![link("cat", "knows", "dan")], vec![]),
        ("value loses class", vec![], vec![typed("bob", "Person")]),
        ("second age", vec![st("ann", "age", Term::string("thirty"))], vec![]),
        (
            "age replaced",
            vec![st("ann", "age", Term::string("x"))],
            vec![st("ann", "age", Term::integer(30))],
        ),
        (
            "person removed",
            vec![],
            vec![typed("ann", "Person"), link("ann", "knows", "bob")],
        ),
    ];

    for (name, added, removed) in deltas {
        let incremental = transaction(base.clone(), added.clone(), removed.clone()).await;
        let bulk = post_state(base.clone(), added, removed).await;
        let incremental = violations(&validate(&arena, &incremental).await);
        let bulk = violations(&validate(&arena, &bulk).await);
        assert!(!bulk.is_empty(), "{} has violations", name);
        assert_eq!(incremental, bulk, "{}", name);
    }
}

/// `sh:not`, `sh:xone` and `sh:or` over class shapes, on the targets
/// themselves or on their `knows` values
fn role_shapes(on_values: bool) -> ShapeArena {
    let roles = [
        ConstraintDecl::Not(node("IsAgent")),
        ConstraintDecl::Xone(vec![node("IsAgent"), node("IsRobot")]),
        ConstraintDecl::Or(vec![node("IsAgent"), node("IsRobot")]),
    ];
    let mut person = ShapeDecl::node(node("PersonShape")).with_target(Target::Class(ex("Person")));
    let mut builder = ShapesBuilder::new();
    if on_values {
        let mut friend = ShapeDecl::property(node("FriendShape"), Path::Predicate(ex("knows")));
        for c in roles {
            friend = friend.with_constraint(c);
        }
        person = person.with_property(node("FriendShape"));
        builder = builder.shape(friend);
    } else {
        for c in roles {
            person = person.with_constraint(c);
        }
    }
    builder
        .shape(person)
        .shape(ShapeDecl::node(node("IsAgent")).with_constraint(ConstraintDecl::Class(ex("Agent"))))
        .shape(ShapeDecl::node(node("IsRobot")).with_constraint(ConstraintDecl::Class(ex("Robot"))))
        .build()
        .unwrap()
}

async fn assert_matches_bulk(
    arena: &ShapeArena,
    base: &[Statement],
    deltas: Vec<(&str, Vec<Statement>, Vec<Statement>)>,
) {
    let clean = post_state(base.to_vec(), vec![], vec![]).await;
    assert!(validate(arena, &clean).await.results.is_empty(), "base conforms");

    for (name, added, removed) in deltas {
        let incremental = transaction(base.to_vec(), added.clone(), removed.clone()).await;
        let bulk = post_state(base.to_vec(), added, removed).await;
        let incremental = violations(&validate(arena, &incremental).await);
        let bulk = violations(&validate(arena, &bulk).await);
        assert!(!bulk.is_empty(), "{} has violations", name);
        assert_eq!(incremental, bulk, "{}", name);
    }
}

#[tokio::test]
async fn logical_on_focus_matches_bulk_when_types_change() {
    let base = vec![
        typed("ann", "Person"),
        typed("ann", "Robot"),
        typed("bob", "Person"),
        typed("bob", "Robot"),
    ];
    let deltas = vec![
        ("gains agent", vec![typed("ann", "Agent")], vec![]),
        ("loses robot", vec![], vec![typed("ann", "Robot")]),
        (
            "robot becomes agent",
            vec![typed("bob", "Agent")],
            vec![typed("bob", "Robot")],
        ),
        ("new person", vec![typed("cat", "Person")], vec![]),
    ];
    assert_matches_bulk(&role_shapes(false), &base, deltas).await;
}

#[tokio::test]
async fn logical_on_values_matches_bulk_when_types_change() {
    let base = vec![
        typed("ann", "Person"),
        link("ann", "knows", "r1"),
        typed("r1", "Robot"),
        typed("bob", "Person"),
        link("bob", "knows", "r2"),
        typed("r2", "Robot"),
    ];
    let deltas = vec![
        ("value gains agent", vec![typed("r1", "Agent")], vec![]),
        ("value loses robot", vec![], vec![typed("r1", "Robot")]),
        (
            "value becomes agent",
            vec![typed("r2", "Agent")],
            vec![typed("r2", "Robot")],
        ),
        ("new untyped value", vec![link("ann", "knows", "x")], vec![]),
    ];
    assert_matches_bulk(&role_shapes(true), &base, deltas).await;
}

#[tokio::test]
async fn and_of_datatypes_reports_once_per_value() {
    let arena = ShapesBuilder::new()
        .shape(
            ShapeDecl::node(node("S"))
                .with_target(Target::Class(ex("Item")))
                .with_property(node("P")),
        )
        .shape(
            ShapeDecl::property(node("P"), Path::Predicate(ex("code"))).with_constraint(ConstraintDecl::And(vec![
                node("IntShape"),
                node("StrShape"),
            ])),
        )
        .shape(ShapeDecl::node(node("IntShape")).with_constraint(ConstraintDecl::Datatype(xsd::INTEGER.into())))
        .shape(ShapeDecl::node(node("StrShape")).with_constraint(ConstraintDecl::Datatype(xsd::STRING.into())))
        .build()
        .unwrap();

    let ctx = transaction(
        vec![typed("other", "Thing")],
        vec![
            typed("i", "Item"),
            st("i", "code", Term::integer(5)),
            st("i", "code", Term::string("five")),
        ],
        vec![],
    )
    .await;
    let report = validate(&arena, &ctx).await;
    assert_eq!(report.results.len(), 2, "{:?}", report.results);

    for result in &report.results {
        assert_eq!(result.focus_node, node("i"));
        assert_eq!(result.source_constraint_component, SourceConstraintComponent::And);
        let failing: Vec<&Term> = result.details.iter().map(|d| &d.shape).collect();
        let expected = if result.value == Some(Term::integer(5)) {
            node("StrShape")
        } else {
            assert_eq!(result.value, Some(Term::string("five")));
            node("IntShape")
        };
        assert_eq!(failing, vec![&expected]);
    }
}
