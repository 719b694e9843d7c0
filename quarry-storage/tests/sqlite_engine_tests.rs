mod common;

use common::{address, addresses, row, tables, user, users};
use pretty_assertions::assert_eq;
use quarry_storage::{Condition, Filter, SqliteEngine, StorageEngine, StorageError};
use quarry_types::{PrimaryKey, Value};

fn engine() -> SqliteEngine {
    let engine = SqliteEngine::open_in_memory().unwrap();
    engine.create_schema(&tables()).unwrap();
    engine
}

#[test]
fn insert_and_select_round_trip() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    let key = conn.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    assert_eq!(key, PrimaryKey::new(1));

    let rows = conn.execute_select(&users(), &Filter::all()).unwrap();
    assert_eq!(rows, vec![row(&[
        ("id", Value::Integer(1)),
        ("username", "alice".into()),
        ("email", "a@x.io".into()),
    ])]);
}

#[test]
fn connections_share_the_in_memory_database() {
    let engine = engine();
    let mut writer = engine.connect().unwrap();
    let mut reader = engine.connect().unwrap();
    writer.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    assert_eq!(reader.execute_select(&users(), &Filter::all()).unwrap().len(), 1);
}

#[test]
fn separate_in_memory_engines_are_isolated() {
    let first = engine();
    let second = engine();
    first.connect().unwrap().execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    assert!(second.connect().unwrap().execute_select(&users(), &Filter::all()).unwrap().is_empty());
}

#[test]
fn file_database_persists_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quarry.db");

    {
        let engine = SqliteEngine::open(&path).unwrap();
        engine.create_schema(&tables()).unwrap();
        engine.connect().unwrap().execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    }

    let engine = SqliteEngine::from_url(&format!("sqlite://{}", path.display())).unwrap();
    engine.create_schema(&tables()).unwrap();
    let rows = engine.connect().unwrap().execute_select(&users(), &Filter::all()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("username"), Some(&Value::from("alice")));
}

#[test]
fn constraint_violations_are_mapped() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    conn.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();

    let dup = conn.execute_insert(&users(), &user("alice", "b@x.io")).unwrap_err();
    assert!(matches!(dup, StorageError::ConstraintViolation(_)));

    let missing = conn.execute_insert(&users(), &row(&[("email", "c@x.io".into())])).unwrap_err();
    assert!(matches!(missing, StorageError::ConstraintViolation(_)));

    let dangling = conn.execute_insert(&addresses(), &address("a@x.io", 42)).unwrap_err();
    assert!(matches!(dangling, StorageError::ConstraintViolation(_)));
}

#[test]
fn delete_restricted_while_referenced() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    let owner = conn.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    conn.execute_insert(&addresses(), &address("a@x.io", owner.get())).unwrap();
    assert!(matches!(
        conn.execute_delete(&users(), owner),
        Err(StorageError::ConstraintViolation(_))
    ));
}

#[test]
fn update_changes_only_given_columns() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    let key = conn.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    conn.execute_update(&users(), key, &row(&[("email", Value::Null)])).unwrap();

    let rows = conn.execute_select(&users(), &Filter::all().and(Condition::equals("email", Value::Null))).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("username"), Some(&Value::from("alice")));
}

#[test]
fn missing_rows_are_not_found() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    assert!(matches!(
        conn.execute_update(&users(), PrimaryKey::new(5), &user("x", "y")),
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        conn.execute_delete(&users(), PrimaryKey::new(5)),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn in_filter_uses_native_membership() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    for (name, email) in [("alice", "a@x.io"), ("bob", "b@x.io"), ("carol", "c@x.io")] {
        conn.execute_insert(&users(), &user(name, email)).unwrap();
    }
    let filter = Filter::all().and(Condition::is_in("username", vec!["carol".into(), "alice".into()]));
    let rows = conn.execute_select(&users(), &filter).unwrap();
    let keys: Vec<_> = rows.iter().map(|r| r.get("id").and_then(Value::as_i64)).collect();
    assert_eq!(keys, vec![Some(1), Some(3)]);

    let empty = Filter::all().and(Condition::is_in("username", vec![]));
    assert!(conn.execute_select(&users(), &empty).unwrap().is_empty());
}

#[test]
fn savepoints_and_rollback() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    conn.begin().unwrap();
    assert!(conn.in_transaction());
    conn.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();

    conn.savepoint("flush").unwrap();
    conn.execute_insert(&users(), &user("bob", "b@x.io")).unwrap();
    conn.rollback_to("flush").unwrap();
    conn.release("flush").unwrap();
    assert_eq!(conn.execute_select(&users(), &Filter::all()).unwrap().len(), 1);

    conn.rollback().unwrap();
    assert!(!conn.in_transaction());
    assert!(conn.execute_select(&users(), &Filter::all()).unwrap().is_empty());
}

#[test]
fn keys_handed_out_after_a_savepoint_are_rolled_back_with_it() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    conn.begin().unwrap();
    conn.savepoint("flush").unwrap();
    conn.execute_insert(&users(), &user("alice", "a@x.io")).unwrap();
    conn.rollback_to("flush").unwrap();

    let key = conn.execute_insert(&users(), &user("bob", "b@x.io")).unwrap();
    conn.release("flush").unwrap();
    conn.commit().unwrap();
    assert_eq!(key, PrimaryKey::new(1));
}

#[test]
fn unknown_savepoint_is_a_transaction_error() {
    let engine = engine();
    let mut conn = engine.connect().unwrap();
    conn.begin().unwrap();
    assert!(matches!(conn.rollback_to("nope"), Err(StorageError::Transaction(_))));
}

#[test]
fn booleans_and_reals_round_trip() {
    use quarry_model::{ColumnDef, EntitySchema, SchemaRegistry};

    let mut registry = SchemaRegistry::new();
    registry
        .register(
            EntitySchema::new("Setting", "settings")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::bool("enabled"))
                .column(ColumnDef::real("ratio")),
        )
        .unwrap();
    let table = registry.table_definitions().remove(0);

    let engine = SqliteEngine::open_in_memory().unwrap();
    engine.create_schema(&[table.clone()]).unwrap();
    let mut conn = engine.connect().unwrap();
    conn.execute_insert(&table, &row(&[("enabled", true.into()), ("ratio", Value::Integer(2))]))
        .unwrap();

    let rows = conn.execute_select(&table, &Filter::all()).unwrap();
    assert_eq!(rows[0].get("enabled"), Some(&Value::Bool(true)));
    assert_eq!(rows[0].get("ratio"), Some(&Value::Real(2.0)));
}
