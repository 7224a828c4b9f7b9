//! # Identity Resolution
//!
//! Maps a data-row event to the grouping key used to split a transaction into
//! logical sub-transactions.
//!
//! Each participating table names an id column; the value of that column in
//! the row becomes the grouping key. Tables without a configured column, and
//! rows where the column is empty, fall into the default group.
//!
//! ## Configuration Document
//!
//! ```json
//! {
//!   "splitter": {
//!     "tables": [
//!       {"tableName": "orders", "idColumn": "order_id"},
//!       {"tableName": "order_items", "idColumn": "order_id"}
//!     ]
//!   },
//!   "entityConfigs": {
//!     "Orders": {}
//!   }
//! }
//! ```
//!
//! Every `tables` array found anywhere in the document contributes entries.
//! The field names of the first `entityConfigs` object, lowercased, are the
//! entity types: a missing identity on an entity table is reported as an
//! error.
//!
//! A missing or unreadable document disables the resolver; every event then
//! falls into the default group.

use crate::common::{CdcError, CdcEvent, GroupingKey, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{error, info, trace};

/// Trailing partition suffixes: `orders_p2024_01`, `orders_3`.
static PARTITION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)(?:_p?\d+)+$").unwrap());

/// Identity split configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Table name → identity column
    pub tables: HashMap<String, String>,
    /// Lowercased entity table names
    pub entity_types: HashSet<String>,
}

impl IdentityConfig {
    /// Create a new config builder.
    pub fn builder() -> IdentityConfigBuilder {
        IdentityConfigBuilder::default()
    }

    /// Read the configuration document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(content)?;
        Self::from_value(&document)
    }

    /// Extract the configuration from a parsed document.
    pub fn from_value(document: &serde_json::Value) -> Result<Self> {
        let mut config = Self::default();

        for tables in find_values(document, "tables") {
            let entries: Vec<&serde_json::Value> = match tables {
                serde_json::Value::Array(items) => items.iter().collect(),
                serde_json::Value::Object(fields) => fields.values().collect(),
                other => {
                    return Err(CdcError::config(format!(
                        "'tables' must be an array, got {}",
                        other
                    )))
                }
            };

            for entry in entries {
                let table = required_text(entry, "tableName")?;
                let column = required_text(entry, "idColumn")?;
                config.tables.insert(table, column);
            }
        }

        if let Some(serde_json::Value::Object(entities)) =
            find_values(document, "entityConfigs").into_iter().next()
        {
            config.entity_types = entities
                .keys()
                .map(|name| name.trim().to_lowercase())
                .collect();
        }

        Ok(config)
    }

    /// Identity column configured for a normalized table name.
    pub fn id_column(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    pub fn is_entity_type(&self, table: &str) -> bool {
        self.entity_types.contains(&table.to_lowercase())
    }
}

/// Builder for IdentityConfig.
#[derive(Default)]
pub struct IdentityConfigBuilder {
    config: IdentityConfig,
}

impl IdentityConfigBuilder {
    /// Map a table to its identity column.
    pub fn table(mut self, table: impl Into<String>, id_column: impl Into<String>) -> Self {
        self.config.tables.insert(table.into(), id_column.into());
        self
    }

    /// Mark a table as an entity type.
    pub fn entity_type(mut self, name: impl AsRef<str>) -> Self {
        self.config
            .entity_types
            .insert(name.as_ref().trim().to_lowercase());
        self
    }

    /// Build the config.
    pub fn build(self) -> IdentityConfig {
        self.config
    }
}

/// Values of every field named `name`, searched depth-first. Matched values
/// are not searched further.
fn find_values<'a>(node: &'a serde_json::Value, name: &str) -> Vec<&'a serde_json::Value> {
    let mut found = Vec::new();
    collect_values(node, name, &mut found);
    found
}

fn collect_values<'a>(
    node: &'a serde_json::Value,
    name: &str,
    found: &mut Vec<&'a serde_json::Value>,
) {
    match node {
        serde_json::Value::Object(fields) => {
            for (key, value) in fields {
                if key == name {
                    found.push(value);
                } else {
                    collect_values(value, name, found);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_values(item, name, found);
            }
        }
        _ => {}
    }
}

fn required_text(entry: &serde_json::Value, field: &str) -> Result<String> {
    match entry.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(CdcError::config(format!(
            "table entry {} has no '{}'",
            entry, field
        ))),
    }
}

/// Outcome of an identity lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    /// No configuration loaded
    Disabled,
    /// Table does not participate in splitting
    NotConfigured,
    /// Table is configured but the row has no identity value
    Missing {
        /// Whether the table is a configured entity type
        entity: bool,
    },
    /// Identity value found
    Found(String),
}

impl IdentityLookup {
    pub fn grouping_key(&self) -> GroupingKey {
        match self {
            IdentityLookup::Found(value) => GroupingKey::identity(value.as_str()),
            _ => GroupingKey::Default,
        }
    }
}

/// Resolves grouping keys for data-row events.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    config: Option<IdentityConfig>,
}

impl IdentityResolver {
    pub fn new(config: Option<IdentityConfig>) -> Self {
        Self { config }
    }

    /// Resolver that routes every event to the default group.
    pub fn disabled() -> Self {
        Self { config: None }
    }

    /// Load the configuration document at `location`.
    ///
    /// Never fails: a missing location leaves grouping disabled, and an
    /// unreadable or malformed document is logged and also disables it.
    pub fn from_location(location: Option<&Path>) -> Self {
        let Some(path) = location.filter(|p| !p.as_os_str().is_empty()) else {
            return Self::disabled();
        };

        info!("Transaction splitter configuration file {}", path.display());
        match IdentityConfig::from_file(path) {
            Ok(config) => {
                info!(
                    "Loaded transaction split configuration {:?}, entity types {:?}",
                    config.tables, config.entity_types
                );
                Self::new(Some(config))
            }
            Err(e) => {
                error!(
                    "Failed to load transaction splitter configuration {}: {}",
                    path.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub fn config(&self) -> Option<&IdentityConfig> {
        self.config.as_ref()
    }

    /// Grouping key of `event`, read from table `data_collection`.
    pub fn resolve(&self, data_collection: &str, event: &CdcEvent) -> GroupingKey {
        self.lookup(data_collection, event).grouping_key()
    }

    /// Look up the identity of `event` with a diagnostic outcome.
    pub fn lookup(&self, data_collection: &str, event: &CdcEvent) -> IdentityLookup {
        let Some(config) = &self.config else {
            return IdentityLookup::Disabled;
        };

        let table = normalize_table_name(data_collection);
        let Some(column) = config.id_column(&table) else {
            trace!(
                "Didn't find identity column name for table {} {}",
                table,
                data_collection
            );
            return IdentityLookup::NotConfigured;
        };

        match column_value(event, column) {
            Some(value) => IdentityLookup::Found(value),
            None => {
                let entity = config.is_entity_type(&table);
                if entity {
                    error!(
                        "Can't find identity with column {} in {} row {:?}",
                        column,
                        data_collection,
                        event.after.as_ref().or(event.before.as_ref())
                    );
                }
                IdentityLookup::Missing { entity }
            }
        }
    }
}

/// Reduce a data collection name to its base table: drop the schema
/// qualification and any partition suffix.
pub fn normalize_table_name(data_collection: &str) -> String {
    let table = data_collection
        .rsplit_once('.')
        .map(|(_, table)| table)
        .unwrap_or(data_collection);

    match PARTITION_SUFFIX.captures(table) {
        Some(captures) => captures[1].to_string(),
        None => table.to_string(),
    }
}

/// Value of `column` in the after image, falling back to the before image.
fn column_value(event: &CdcEvent, column: &str) -> Option<String> {
    let row = event.after.as_ref().or(event.before.as_ref())?;
    let fields = row.as_object()?;
    let value = fields.get(column).or_else(|| {
        fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })?;

    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
