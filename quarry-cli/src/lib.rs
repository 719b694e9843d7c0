//! Configuration, demo schema and demo flows for the `quarry` binary.

use anyhow::{Context, Result};
use quarry_model::{ColumnDef, Entity, EntitySchema, RelationshipDescriptor, SchemaRegistry};
use quarry_session::{field, Session, SessionConfig, SessionFactory};
use quarry_storage::{MemoryEngine, SqliteEngine, StorageEngine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Contents of a `quarry.toml` file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `:memory:`, `memory://` for the in-process engine, or a SQLite path.
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    ":memory:".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

impl CliConfig {
    /// Reads a config file. A missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {path:?}"))?;
        let config = Self::parse(&contents).with_context(|| format!("Failed to parse config file {path:?}"))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Opens the engine named by `url`.
pub fn open_engine(url: &str) -> Result<Arc<dyn StorageEngine>> {
    if url == "memory://" {
        return Ok(Arc::new(MemoryEngine::new()));
    }
    let engine = SqliteEngine::from_url(url).with_context(|| format!("Failed to open database {url}"))?;
    Ok(Arc::new(engine))
}

/// `User` owning `addresses` (delete-orphan), and `Address`.
pub fn demo_registry() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(
        EntitySchema::new("User", "users")
            .column(ColumnDef::primary_key("id"))
            .column(ColumnDef::text("username").not_null().unique())
            .column(ColumnDef::text("email"))
            .relationship(RelationshipDescriptor::one_to_many("addresses", "Address", "user_id").delete_orphan()),
    )?;
    registry.register(
        EntitySchema::new("Address", "addresses")
            .column(ColumnDef::primary_key("id"))
            .column(ColumnDef::text("email_address").not_null())
            .column(ColumnDef::foreign_key("user_id", "User", "id")),
    )?;
    Ok(registry)
}

/// What the demo flows found, rendered with each entity's display form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoReport {
    pub inserted: Vec<String>,
    pub selected_one: Option<String>,
    pub selected_many: Vec<String>,
    pub added: Option<String>,
    pub with_addresses: Option<String>,
    pub addresses: Vec<String>,
}

/// Runs every demo flow in order against one factory.
pub fn run_demo(factory: &SessionFactory) -> Result<DemoReport> {
    let mut report = DemoReport::default();
    let mut session = factory.open()?;

    // Insert two users, then look them up by name.
    let ids = session.add_all([user("ed", "ed@example.com"), user("mary", "mary@example.com")])?;
    session.commit()?;
    report.inserted = describe(&session, &ids)?;

    let one = session.query("User").filter(field("username").eq("ed")).first()?;
    report.selected_one = one.map(|id| session.get(id).map(ToString::to_string)).transpose()?;

    let many = session
        .query("User")
        .filter(field("username").is_in(["ed", "mary"]))
        .all()?;
    report.selected_many = describe(&session, &many)?;

    // Plain ORM add and commit.
    let wendy = session.add(user("wendy", "wendy@example.com"))?;
    session.commit()?;
    report.added = Some(session.get(wendy)?.to_string());

    // A user with two addresses attached through the collection.
    let jack = session.add(user("jack", "jack@example.com"))?;
    for email in ["jack@google.com", "j25@yahoo.com"] {
        let address = session.add(Entity::new("Address").with("email_address", email))?;
        session.append(jack, "addresses", address)?;
    }
    session.commit()?;
    report.with_addresses = Some(session.get(jack)?.to_string());
    let addresses = session.children(jack, "addresses")?;
    report.addresses = describe(&session, &addresses)?;

    session.close()?;
    Ok(report)
}

fn user(username: &str, email: &str) -> Entity {
    Entity::new("User").with("username", username).with("email", email)
}

fn describe(session: &Session, ids: &[quarry_types::InstanceId]) -> Result<Vec<String>> {
    ids.iter()
        .map(|id| Ok(session.get(*id)?.to_string()))
        .collect()
}
