mod common;

use common::{memory, registry, user};
use pretty_assertions::assert_eq;
use quarry_model::{ColumnDef, Entity, EntitySchema, SchemaRegistry};
use quarry_session::{field, translate, Predicate, SessionConfig, SessionError, SessionFactory};
use quarry_storage::{Condition, Filter, MemoryEngine, SqliteEngine, StorageEngine};
use quarry_types::Value;
use std::sync::Arc;

fn measurement() -> EntitySchema {
    EntitySchema::new("Measurement", "measurements")
        .column(ColumnDef::primary_key("id"))
        .column(ColumnDef::real("reading"))
        .column(ColumnDef::bool("valid"))
}

// ── Translation ──────────────────────────────────────────────────

#[test]
fn equality_and_membership_translate_to_conditions() {
    let registry = registry();
    let schema = registry.resolve("User").unwrap();
    let filter = translate(
        schema,
        &[field("username").eq("ed"), field("email").is_in(["a@x.org", "b@x.org"])],
    )
    .unwrap();

    assert_eq!(
        filter,
        Filter::all()
            .and(Condition::equals("username", Value::from("ed")))
            .and(Condition::is_in("email", vec![Value::from("a@x.org"), Value::from("b@x.org")]))
    );
}

#[test]
fn nested_conjunctions_flatten() {
    let registry = registry();
    let schema = registry.resolve("User").unwrap();
    let predicate = field("username").eq("ed").and(field("email").eq("ed@x.org").and(field("id").eq(1)));
    let filter = translate(schema, &[predicate]).unwrap();
    assert_eq!(filter.conditions().len(), 3);
}

#[test]
fn null_equality_becomes_is_null() {
    let registry = registry();
    let schema = registry.resolve("User").unwrap();
    let filter = translate(schema, &[field("email").is_null()]).unwrap();
    assert_eq!(
        filter.conditions(),
        &[Condition::IsNull {
            column: "email".to_string()
        }]
    );
}

#[test]
fn no_predicates_match_everything() {
    let registry = registry();
    let filter = translate(registry.resolve("User").unwrap(), &[]).unwrap();
    assert!(filter.is_empty());
}

#[test]
fn integers_widen_against_real_columns() {
    let schema = measurement();
    let filter = translate(&schema, &[field("reading").eq(3)]).unwrap();
    assert_eq!(filter.conditions(), &[Condition::equals("reading", Value::Real(3.0))]);
}

#[test]
fn integer_readings_are_found_on_every_engine() {
    let engines: [Arc<dyn StorageEngine>; 2] =
        [Arc::new(MemoryEngine::new()), Arc::new(SqliteEngine::open_in_memory().unwrap())];
    for engine in engines {
        let mut registry = SchemaRegistry::new();
        registry.register(measurement()).unwrap();
        let factory = SessionFactory::new(registry, engine, SessionConfig::default()).unwrap();

        let mut writer = factory.open().unwrap();
        let m = writer.add(Entity::new("Measurement").with("reading", 3).with("valid", true)).unwrap();
        assert_eq!(writer.get(m).unwrap().get("reading"), Some(&Value::Real(3.0)));
        let other = writer.add(Entity::new("Measurement").with("reading", 1.5)).unwrap();
        writer.commit().unwrap();
        writer.set(other, "reading", 4).unwrap();
        writer.commit().unwrap();

        let mut reader = factory.open().unwrap();
        let by_int = reader.query("Measurement").filter(field("reading").eq(3)).all().unwrap();
        let by_real = reader.query("Measurement").filter(field("reading").eq(3.0)).all().unwrap();
        assert_eq!(by_int.len(), 1);
        assert_eq!(by_int, by_real);
        assert_eq!(reader.get(by_int[0]).unwrap().get("reading"), Some(&Value::Real(3.0)));

        let updated = reader.query("Measurement").filter(field("reading").eq(4)).all().unwrap();
        assert_eq!(updated.len(), 1);
        assert!(!reader.is_dirty(updated[0]).unwrap());
    }
}

#[test]
fn unsupported_shapes_are_rejected() {
    let registry = registry();
    let schema = registry.resolve("User").unwrap();
    let rejected = [
        field("username").ne("ed"),
        field("id").lt(3),
        field("id").gt(3),
        field("username").like("e%"),
        field("username").eq("ed").or(field("username").eq("mary")),
        field("username").eq("ed").not(),
        field("username").eq("ed").and(field("id").gt(1)),
    ];
    for predicate in rejected {
        let err = translate(schema, &[predicate.clone()]).unwrap_err();
        assert!(
            matches!(err, SessionError::UnsupportedPredicate(_)),
            "{predicate} gave {err}"
        );
    }
}

#[test]
fn unknown_columns_are_rejected() {
    let registry = registry();
    let schema = registry.resolve("User").unwrap();
    let err = translate(schema, &[field("nickname").eq("ed")]).unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedPredicate(msg) if msg.contains("nickname")));
}

#[test]
fn mistyped_values_are_rejected() {
    let registry = registry();
    let schema = registry.resolve("User").unwrap();
    let err = translate(schema, &[field("username").eq(42)]).unwrap_err();
    assert!(matches!(err, SessionError::TypeMismatch { ref column, .. } if column == "username"));

    let err = translate(schema, &[field("username").is_in([Value::from("ed"), Value::Bool(true)])]).unwrap_err();
    assert!(matches!(err, SessionError::TypeMismatch { .. }));
}

#[test]
fn predicates_display_readably() {
    let predicate: Predicate = field("username").eq("ed").and(field("id").is_in([1, 2]));
    let text = predicate.to_string();
    assert!(text.contains("username"));
    assert!(text.contains("id"));
}

// ── Execution ────────────────────────────────────────────────────

#[test]
fn in_with_no_values_matches_nothing() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    session.add(user("ed", "ed@example.com")).unwrap();
    let empty: [&str; 0] = [];
    let found = session.query("User").filter(field("username").is_in(empty)).all().unwrap();
    assert!(found.is_empty());
}

#[test]
fn filters_combine_as_conjunction() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let ids = session
        .add_all([
            user("ed", "shared@example.com"),
            user("wendy", "shared@example.com"),
            user("mary", "mary@example.com"),
        ])
        .unwrap();

    let found = session
        .query("User")
        .filter(field("email").eq("shared@example.com"))
        .filter(field("username").is_in(["wendy", "mary"]))
        .all()
        .unwrap();
    assert_eq!(found, vec![ids[1]]);
}

#[test]
fn null_filters_find_rows_without_a_value() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let ed = session.add(quarry_model::Entity::new("User").with("username", "ed")).unwrap();
    session.add(user("wendy", "wendy@example.com")).unwrap();
    let found = session.query("User").filter(field("email").is_null()).all().unwrap();
    assert_eq!(found, vec![ed]);
}

#[test]
fn invalid_predicate_fails_before_touching_storage() {
    let (engine, factory) = memory();
    let mut session = factory.open().unwrap();
    session.add(user("ed", "ed@example.com")).unwrap();
    let err = session.query("User").filter(field("id").gt(0)).all().unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedPredicate(_)));
    assert_eq!(engine.statement_count(), 0);
}

#[test]
fn query_on_unknown_entity_fails() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    assert!(matches!(
        session.query("Order").all(),
        Err(SessionError::Model(quarry_model::ModelError::UnknownEntity(_)))
    ));
}
