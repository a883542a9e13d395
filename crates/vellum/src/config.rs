use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Database-wide settings.
///
/// Every field has a default, so a TOML document only needs to name the
/// settings it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Schema version the database starts at. Migrations move it forward.
    pub schema_version: u64,
    /// Nesting depth after which descriptions print a placeholder instead
    /// of following links and lists.
    pub max_description_depth: usize,
    /// Number of link hops a change notification looks through by default.
    /// Key-path filters extend this to their longest path.
    pub notification_depth: usize,
    /// Prefix for the names of dispatch queues the database creates.
    pub queue_label_prefix: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            schema_version: 0,
            max_description_depth: 2,
            notification_depth: 4,
            queue_label_prefix: "vellum".into(),
        }
    }
}

impl Configuration {
    /// Parse a configuration from TOML, filling unset fields with defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Label for a queue named `name` under this database's prefix.
    pub fn queue_label(&self, name: &str) -> String {
        format!("{}.{}", self.queue_label_prefix, name)
    }
}
