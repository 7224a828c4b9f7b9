//! CDC Event representation
//!
//! Row-level change events as handed over by the replication decoder.
//!
//! ## Transaction Metadata
//!
//! Once an event has been counted by the [`TransactionContext`](crate::common::TransactionContext)
//! it carries ordering metadata for the emission path:
//! - **data_collection_order**: position of the event among events of the same
//!   table and grouping key within the transaction (1-based)
//! - **total_order**: position among all events of the same grouping key (1-based)
//!
//! ```ignore
//! // Events from same transaction and group
//! event1.transaction.as_ref().map(|t| &t.id) == event2.transaction.as_ref().map(|t| &t.id)
//! ```

use serde::{Deserialize, Serialize};

/// Transaction metadata attached to counted CDC events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Transaction ID (PostgreSQL: xid)
    pub id: String,
    /// Log sequence number of the event
    pub lsn: String,
    /// Grouping key the event was attributed to (None = default group)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Position among events of this table within the group (1-based)
    pub data_collection_order: u64,
    /// Position among all events of the group (1-based)
    pub total_order: u64,
}

impl TransactionMetadata {
    /// Create new transaction metadata.
    pub fn new(id: impl Into<String>, lsn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lsn: lsn.into(),
            identity: None,
            data_collection_order: 0,
            total_order: 0,
        }
    }

    /// Set the grouping key.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set both ordinals.
    pub fn with_order(mut self, data_collection_order: u64, total_order: u64) -> Self {
        self.data_collection_order = data_collection_order;
        self.total_order = total_order;
        self
    }
}

/// Represents a change captured from a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdcEvent {
    /// Source database type: "postgres"
    pub source_type: String,
    /// Database name
    pub database: String,
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
    /// Operation type
    pub op: CdcOp,
    /// Previous row state (for UPDATE/DELETE)
    pub before: Option<serde_json::Value>,
    /// Current row state (for INSERT/UPDATE)
    pub after: Option<serde_json::Value>,
    /// Event timestamp (Unix epoch seconds)
    pub timestamp: i64,
    /// Transaction metadata (set once the event is counted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionMetadata>,
}

/// CDC operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CdcOp {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
    /// Table truncated
    Truncate,
}

impl CdcEvent {
    /// Create a new INSERT event
    pub fn insert(
        source_type: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        data: serde_json::Value,
        timestamp: i64,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
            op: CdcOp::Insert,
            before: None,
            after: Some(data),
            timestamp,
            transaction: None,
        }
    }

    /// Create a new UPDATE event
    pub fn update(
        source_type: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        before: Option<serde_json::Value>,
        after: serde_json::Value,
        timestamp: i64,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
            op: CdcOp::Update,
            before,
            after: Some(after),
            timestamp,
            transaction: None,
        }
    }

    /// Create a new DELETE event
    pub fn delete(
        source_type: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        before: serde_json::Value,
        timestamp: i64,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
            op: CdcOp::Delete,
            before: Some(before),
            after: None,
            timestamp,
            transaction: None,
        }
    }

    /// Data collection identifier used for per-table counting: `schema.table`.
    pub fn data_collection(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl std::fmt::Display for CdcOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CdcOp::Insert => write!(f, "INSERT"),
            CdcOp::Update => write!(f, "UPDATE"),
            CdcOp::Delete => write!(f, "DELETE"),
            CdcOp::Truncate => write!(f, "TRUNCATE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delete_event_has_only_before() {
        let event = CdcEvent::delete("postgres", "mydb", "public", "orders", json!({"id": 1}), 0);

        assert_eq!(event.op, CdcOp::Delete);
        assert!(event.before.is_some());
        assert!(event.after.is_none());
        assert_eq!(event.data_collection(), "public.orders");
    }

    #[test]
    fn test_transaction_metadata_serialization() {
        let txn = TransactionMetadata::new("571", "0/16B3748")
            .with_identity("order-7")
            .with_order(2, 5);
        let mut event = CdcEvent::insert("pg", "db", "s", "t", json!({"id": 1}), 0);
        event.transaction = Some(txn);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"data_collection_order\":2"));
        assert!(json.contains("order-7"));

        let parsed: CdcEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.transaction.unwrap().id, "571");
    }

    #[test]
    fn test_default_group_omits_identity() {
        let txn = TransactionMetadata::new("571", "0/1").with_order(1, 1);
        let json = serde_json::to_string(&txn).unwrap();
        assert!(!json.contains("identity"));
    }
}
