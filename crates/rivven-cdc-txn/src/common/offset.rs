//! # Offset Encoding
//!
//! Key layout of the transaction state embedded in the connector offset.
//!
//! | Key | Value |
//! |-----|-------|
//! | `transaction_id` | active transaction id, absent when idle |
//! | `format_version` | `1`, marks the grouped encoding |
//! | `transaction_data_collection_order_<key>:<table>` | per-group, per-table count |
//!
//! Offsets written before grouping existed carry no version marker and use
//! `transaction_data_collection_order_<table>` keys for a single implicit
//! group. [`OffsetFormat::detect`] picks the decoder for a persisted map.

use crate::common::GroupingKey;
use std::collections::HashMap;
use tracing::warn;

/// Flat persisted offset map.
pub type OffsetMap = HashMap<String, serde_json::Value>;

/// Active transaction id.
pub const OFFSET_TRANSACTION_ID: &str = "transaction_id";

/// Version marker of the grouped encoding.
pub const OFFSET_FORMAT_VERSION: &str = "format_version";

/// Prefix of per-table count keys.
pub const OFFSET_TABLE_COUNT_PREFIX: &str = "transaction_data_collection_order_";

/// Separates the grouping key from the table in grouped count keys.
pub const IDENTITY_SEPARATOR: char = ':';

/// Version written by this crate.
pub const CURRENT_FORMAT_VERSION: u64 = 1;

/// Known offset encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetFormat {
    /// Flat per-table counts, single default group
    Legacy,
    /// Per-group, per-table counts
    Grouped,
}

/// Version marker value → decoder. Newest entry last.
const VERSIONED_FORMATS: &[(u64, OffsetFormat)] = &[(1, OffsetFormat::Grouped)];

impl OffsetFormat {
    /// Select the decoder for a persisted map.
    pub fn detect(offsets: &OffsetMap) -> Self {
        let Some(marker) = offsets.get(OFFSET_FORMAT_VERSION).filter(|v| !v.is_null()) else {
            return OffsetFormat::Legacy;
        };

        let version = read_u64(marker);
        if let Some(format) = version.and_then(Self::for_version) {
            return format;
        }

        let newest = VERSIONED_FORMATS
            .last()
            .map(|(_, format)| *format)
            .unwrap_or(OffsetFormat::Grouped);
        warn!(
            "Unknown offset format version {}, decoding as {:?}",
            marker, newest
        );
        newest
    }

    /// Decoder registered for a version marker value.
    pub fn for_version(version: u64) -> Option<Self> {
        VERSIONED_FORMATS
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, format)| *format)
    }
}

/// Count key for one group and table.
pub fn table_count_key(key: &GroupingKey, table: &str) -> String {
    format!(
        "{}{}{}{}",
        OFFSET_TABLE_COUNT_PREFIX,
        key.as_offset_str(),
        IDENTITY_SEPARATOR,
        table
    )
}

/// Split the suffix of a grouped count key into `(grouping key, table)`.
///
/// The split happens at the last separator so identities may contain it.
/// Returns `None` when the separator is missing or the table is empty.
pub fn split_grouped_suffix(suffix: &str) -> Option<(GroupingKey, &str)> {
    let (identity, table) = suffix.rsplit_once(IDENTITY_SEPARATOR)?;
    if table.is_empty() {
        return None;
    }
    Some((GroupingKey::from_offset_str(identity), table))
}

/// Keys written by [`TransactionContext::store`](crate::common::TransactionContext::store).
pub fn is_transaction_key(key: &str) -> bool {
    key == OFFSET_TRANSACTION_ID
        || key == OFFSET_FORMAT_VERSION
        || key.starts_with(OFFSET_TABLE_COUNT_PREFIX)
}

/// Persisted transaction id; numbers are accepted for ids written by older
/// connectors, `null` means idle.
pub fn read_transaction_id(offsets: &OffsetMap) -> Option<String> {
    match offsets.get(OFFSET_TRANSACTION_ID)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Null => None,
        other => {
            warn!("Ignoring non-scalar transaction id {}", other);
            None
        }
    }
}

/// Persisted transaction id value as written, if it is a string or number.
pub fn persisted_transaction_id(offsets: &OffsetMap) -> Option<serde_json::Value> {
    offsets
        .get(OFFSET_TRANSACTION_ID)
        .filter(|v| v.is_string() || v.is_number())
        .cloned()
}

/// Read a non-negative count, accepting numeric strings.
pub fn read_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
