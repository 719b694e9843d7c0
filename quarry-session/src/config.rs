//! Session configuration.

use serde::{Deserialize, Serialize};

/// Behaviour switches for sessions opened by a
/// [`SessionFactory`](crate::SessionFactory).
///
/// Deserializes from a `[session]` table; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Flush pending changes before every query.
    #[serde(default = "default_true")]
    pub autoflush: bool,
    /// Create all registered tables when the factory is built.
    #[serde(default = "default_true")]
    pub create_schema: bool,
    /// Log every dispatched write at INFO instead of DEBUG.
    #[serde(default)]
    pub echo: bool,
    /// Prefix of the savepoint each flush runs in.
    #[serde(default = "default_savepoint_prefix")]
    pub savepoint_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_savepoint_prefix() -> String {
    "quarry_flush".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autoflush: true,
            create_schema: true,
            echo: false,
            savepoint_prefix: default_savepoint_prefix(),
        }
    }
}
