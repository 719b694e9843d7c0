mod common;

use common::{address, memory, node, statements_of, user};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quarry_model::{Entity, ModelError};
use quarry_session::{InstanceState, SessionError};
use quarry_storage::StatementKind;
use quarry_types::Value;

// ── Binding ──────────────────────────────────────────────────────

#[test]
fn append_binds_both_sides() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    let a = session.add(address("ed@example.com")).unwrap();

    session.append(u, "addresses", a).unwrap();
    session.append(u, "addresses", a).unwrap();
    assert_eq!(session.children(u, "addresses").unwrap(), vec![a]);
    assert_eq!(session.parent(a, "user_id").unwrap(), Some(u));
}

#[test]
fn rebinding_moves_child_between_parents() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let first = session.add(user("ed", "ed@example.com")).unwrap();
    let second = session.add(user("wendy", "wendy@example.com")).unwrap();
    let a = session.add(address("shared@example.com")).unwrap();

    session.append(first, "addresses", a).unwrap();
    session.append(second, "addresses", a).unwrap();

    assert!(session.children(first, "addresses").unwrap().is_empty());
    assert_eq!(session.children(second, "addresses").unwrap(), vec![a]);
    assert_eq!(session.parent(a, "user_id").unwrap(), Some(second));
}

#[test]
fn removing_an_unbound_child_fails() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    let a = session.add(address("ed@example.com")).unwrap();

    let err = session.remove(u, "addresses", a).unwrap_err();
    assert!(matches!(err, SessionError::NotBound { parent, child, .. } if parent == u && child == a));
}

#[test]
fn mismatched_types_and_names_are_rejected() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    let other = session.add(user("wendy", "wendy@example.com")).unwrap();
    let a = session.add(address("ed@example.com")).unwrap();

    assert!(matches!(
        session.append(u, "addresses", other),
        Err(SessionError::Model(ModelError::Schema(_)))
    ));
    assert!(matches!(session.append(u, "orders", a), Err(SessionError::Model(_))));
    assert!(matches!(session.set_parent(a, "email_address", Some(u)), Err(SessionError::Model(_))));
    assert!(session.children(u, "addresses").unwrap().is_empty());
}

#[test]
fn set_parent_rejects_a_parent_of_the_wrong_type() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let team = session.add(Entity::new("Team").with("name", "core")).unwrap();
    let a = session.add(address("ed@example.com")).unwrap();

    let err = session.set_parent(a, "user_id", Some(team)).unwrap_err();
    assert!(matches!(err, SessionError::Model(ModelError::Schema(ref m)) if m.contains("refers to User")));
    assert_eq!(session.parent(a, "user_id").unwrap(), None);
    assert!(matches!(session.parent(a, "email_address"), Err(SessionError::Model(_))));
}

#[test]
fn set_parent_is_the_many_to_one_view() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    let a = session.add(address("ed@example.com")).unwrap();

    session.set_parent(a, "user_id", Some(u)).unwrap();
    assert_eq!(session.children(u, "addresses").unwrap(), vec![a]);

    session.set_parent(a, "user_id", None).unwrap();
    assert!(session.children(u, "addresses").unwrap().is_empty());
    assert_eq!(session.parent(a, "user_id").unwrap(), None);
    assert_eq!(session.get(a).unwrap().get("user_id"), Some(&Value::Null));
}

#[test]
fn detached_pending_orphan_is_never_inserted() {
    let (engine, factory) = memory();
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    let a = session.add(address("ed@example.com")).unwrap();
    session.append(u, "addresses", a).unwrap();
    session.remove(u, "addresses", a).unwrap();

    session.commit().unwrap();
    assert!(!session.contains(a));
    assert_eq!(engine.row_count("addresses").unwrap(), 0);
}

#[test]
fn orphan_adopted_before_flush_survives() {
    let (engine, factory) = memory();
    let mut session = factory.open().unwrap();
    let ed = session.add(user("ed", "ed@example.com")).unwrap();
    let wendy = session.add(user("wendy", "wendy@example.com")).unwrap();
    let a = session.add(address("moving@example.com")).unwrap();
    session.append(ed, "addresses", a).unwrap();
    session.commit().unwrap();

    session.remove(ed, "addresses", a).unwrap();
    session.append(wendy, "addresses", a).unwrap();
    let summary = session.commit().unwrap();

    assert_eq!(summary.deleted(), 0);
    assert_eq!(summary.updated(), 1);
    let wendy_key = session.key(wendy).unwrap().unwrap();
    assert_eq!(session.get(a).unwrap().get("user_id"), Some(&Value::from(wendy_key)));
    assert_eq!(engine.row_count("addresses").unwrap(), 1);
}

#[test]
fn persistent_child_follows_pending_parent_key() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let a = session.add(address("early@example.com")).unwrap();
    session.commit().unwrap();

    let u = session.add(user("ed", "ed@example.com")).unwrap();
    session.append(u, "addresses", a).unwrap();
    assert!(session.is_dirty(a).unwrap());

    let summary = session.commit().unwrap();
    assert_eq!((summary.inserted(), summary.updated()), (1, 1));
    let key = session.key(u).unwrap().unwrap();
    assert_eq!(session.get(a).unwrap().get("user_id"), Some(&Value::from(key)));
    assert!(!session.is_dirty(a).unwrap());
}

#[test]
fn raw_foreign_key_on_add_binds_to_tracked_parent() {
    let (_, factory) = memory();
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    session.commit().unwrap();
    let key = session.key(u).unwrap().unwrap();

    let a = session.add(address("ed@example.com").with("user_id", key)).unwrap();
    assert_eq!(session.children(u, "addresses").unwrap(), vec![a]);
    assert_eq!(session.parent(a, "user_id").unwrap(), Some(u));
}

// ── Cascades ─────────────────────────────────────────────────────

#[test]
fn deleting_without_cascade_detaches_children() {
    let (engine, factory) = memory();
    let mut session = factory.open().unwrap();
    let team = session.add(Entity::new("Team").with("name", "core")).unwrap();
    let members = session
        .add_all([
            Entity::new("Member").with("name", "ed"),
            Entity::new("Member").with("name", "wendy"),
        ])
        .unwrap();
    for m in &members {
        session.append(team, "members", *m).unwrap();
    }
    session.commit().unwrap();
    engine.clear_log();

    session.delete(team).unwrap();
    for m in &members {
        assert_eq!(session.state(*m).unwrap(), InstanceState::Persistent);
        assert_eq!(session.parent(*m, "team_id").unwrap(), None);
    }
    let summary = session.commit().unwrap();

    assert_eq!((summary.updated(), summary.deleted()), (2, 1));
    let kinds: Vec<StatementKind> = engine
        .statements()
        .into_iter()
        .map(|s| s.kind)
        .filter(|k| *k != StatementKind::Select)
        .collect();
    assert_eq!(kinds, vec![StatementKind::Update, StatementKind::Update, StatementKind::Delete]);
    assert_eq!(engine.row_count("teams").unwrap(), 0);
    for row in engine.rows("members").unwrap() {
        assert_eq!(row.get("team_id"), Some(&Value::Null));
    }
}

#[test]
fn self_referential_tree_inserts_parents_first_and_deletes_leaves_first() {
    let (engine, factory) = memory();
    let mut session = factory.open().unwrap();
    let leaf = session.add(node("leaf")).unwrap();
    let branch = session.add(node("branch")).unwrap();
    let root = session.add(node("root")).unwrap();
    session.append(branch, "children", leaf).unwrap();
    session.append(root, "children", branch).unwrap();

    let summary = session.commit().unwrap();
    let labels: Vec<&str> = summary
        .operations
        .iter()
        .filter_map(|op| op.values().and_then(|v| v.get("label")).and_then(Value::as_str))
        .collect();
    assert_eq!(labels, vec!["root", "branch", "leaf"]);

    session.delete(root).unwrap();
    assert_eq!(session.deleted_instances(), vec![leaf, branch, root]);
    session.commit().unwrap();
    assert_eq!(engine.row_count("nodes").unwrap(), 0);
    assert_eq!(statements_of(&engine, StatementKind::Delete).len(), 3);
}

// ── Hydration ────────────────────────────────────────────────────

fn seed(factory: &quarry_session::SessionFactory) {
    let mut session = factory.open().unwrap();
    let u = session.add(user("ed", "ed@example.com")).unwrap();
    for email in ["one@example.com", "two@example.com"] {
        let a = session.add(address(email)).unwrap();
        session.append(u, "addresses", a).unwrap();
    }
    session.commit().unwrap();
}

#[test]
fn loaded_parent_binds_already_loaded_children() {
    let (_, factory) = memory();
    seed(&factory);

    let mut session = factory.open().unwrap();
    let addresses = session.query("Address").all().unwrap();
    let u = session.query("User").first().unwrap().unwrap();

    assert_eq!(session.children(u, "addresses").unwrap(), addresses);
    for a in &addresses {
        assert_eq!(session.parent(*a, "user_id").unwrap(), Some(u));
    }
}

#[test]
fn loaded_children_bind_to_already_loaded_parent() {
    let (_, factory) = memory();
    seed(&factory);

    let mut session = factory.open().unwrap();
    let u = session.query("User").first().unwrap().unwrap();
    assert!(session.children(u, "addresses").unwrap().is_empty());

    let addresses = session.query("Address").all().unwrap();
    assert_eq!(addresses.len(), 2);
    assert_eq!(session.children(u, "addresses").unwrap(), addresses);
}

#[test]
fn load_related_fills_the_collection() {
    let (_, factory) = memory();
    seed(&factory);

    let mut session = factory.open().unwrap();
    let u = session.query("User").first().unwrap().unwrap();
    let loaded = session.load_related(u, "addresses").unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(session.load_related(u, "addresses").unwrap(), loaded);
    assert_eq!(session.len(), 3);
}

// ── Invariant ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Append(usize, usize),
    Remove(usize, usize),
    Detach(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 0usize..4).prop_map(|(p, c)| Op::Append(p, c)),
        (0usize..3, 0usize..4).prop_map(|(p, c)| Op::Remove(p, c)),
        (0usize..4).prop_map(Op::Detach),
    ]
}

proptest! {
    #[test]
    fn collections_and_back_references_agree(ops in proptest::collection::vec(op(), 0..30)) {
        let (_, factory) = memory();
        let mut session = factory.open().unwrap();
        let users: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| session.add(user(n, "x@example.com")).unwrap())
            .collect();
        let addresses: Vec<_> = (0..4)
            .map(|i| session.add(address(&format!("{i}@example.com"))).unwrap())
            .collect();

        for op in ops {
            match op {
                Op::Append(p, c) => session.append(users[p], "addresses", addresses[c]).unwrap(),
                Op::Remove(p, c) => match session.remove(users[p], "addresses", addresses[c]) {
                    Ok(()) | Err(SessionError::NotBound { .. }) => {}
                    Err(e) => panic!("unexpected {e}"),
                },
                Op::Detach(c) => session.set_parent(addresses[c], "user_id", None).unwrap(),
            }
        }

        for a in &addresses {
            let owners: Vec<_> = users
                .iter()
                .filter(|u| session.children(**u, "addresses").unwrap().contains(a))
                .copied()
                .collect();
            prop_assert!(owners.len() <= 1);
            prop_assert_eq!(owners.first().copied(), session.parent(*a, "user_id").unwrap());
        }
        for u in &users {
            let children = session.children(*u, "addresses").unwrap();
            let mut unique = children.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(children.len(), unique.len());
        }
    }
}
