//! # Transaction Context
//!
//! Book-keeping of the events seen in the active transaction:
//!
//! - the active transaction id
//! - per grouping key ("identity"), the number of events per table
//! - the offset fragment mirroring those counts
//!
//! One physical transaction is split into logical sub-transactions, one per
//! grouping key. Each sub-transaction numbers its events per table
//! independently, so the ordinal of an event only depends on earlier events
//! of the same group.
//!
//! The state is embedded in the connector offset by [`TransactionContext::store`]
//! and rebuilt by [`TransactionContext::load`] on restart. Both the legacy flat
//! encoding and the grouped encoding are understood; see [`crate::common::offset`].
//!
//! Not thread-safe: one context per connector task.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut context = TransactionContext::load(&persisted);
//!
//! context.begin_transaction("571");
//! let order = context.record_event("public.orders", &GroupingKey::identity("A-1"));
//! context.store(&mut offset);
//! context.end_transaction();
//! ```

use crate::common::offset::{
    is_transaction_key, persisted_transaction_id, read_transaction_id, read_u64,
    split_grouped_suffix, table_count_key, OffsetFormat, OffsetMap, CURRENT_FORMAT_VERSION,
    OFFSET_FORMAT_VERSION, OFFSET_TABLE_COUNT_PREFIX, OFFSET_TRANSACTION_ID,
};
use crate::common::{CdcEvent, IdentityResolver};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace, warn};

/// Logical sub-transaction a data-row event is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupingKey {
    /// Events without a resolvable identity
    #[default]
    Default,
    /// Events sharing an identity value
    Identity(String),
}

impl GroupingKey {
    /// Grouping key for an identity value. An empty value maps to the default group.
    pub fn identity(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            GroupingKey::Default
        } else {
            GroupingKey::Identity(value)
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, GroupingKey::Default)
    }

    pub fn as_identity(&self) -> Option<&str> {
        match self {
            GroupingKey::Default => None,
            GroupingKey::Identity(value) => Some(value),
        }
    }

    /// Encoding inside offset keys; the default group is the empty string.
    pub fn as_offset_str(&self) -> &str {
        self.as_identity().unwrap_or("")
    }

    pub fn from_offset_str(value: &str) -> Self {
        Self::identity(value)
    }
}

impl From<Option<String>> for GroupingKey {
    fn from(value: Option<String>) -> Self {
        value.map(GroupingKey::identity).unwrap_or_default()
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingKey::Default => write!(f, "<default>"),
            GroupingKey::Identity(value) => write!(f, "{}", value),
        }
    }
}

/// Per-group event counters of the active transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCounter {
    key: GroupingKey,
    transaction_id: Option<String>,
    per_table: HashMap<String, u64>,
    total: u64,
    local_offset: OffsetMap,
}

impl GroupCounter {
    pub fn new(key: GroupingKey) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    /// Clear all counts and attach the counter to `transaction_id`.
    pub fn begin_transaction(&mut self, transaction_id: Option<&str>) {
        self.reset();
        self.transaction_id = transaction_id.map(str::to_string);
    }

    fn reset(&mut self) {
        self.transaction_id = None;
        self.per_table.clear();
        self.total = 0;
        self.local_offset.clear();
    }

    /// Count one event of `table` and return its ordinal within the table.
    pub fn record_event(&mut self, table: &str) -> u64 {
        let count = self.per_table.entry(table.to_string()).or_insert(0);
        *count += 1;
        let ordinal = *count;
        self.recompute();
        ordinal
    }

    /// Set a table count directly, as restored from an offset.
    pub fn set_count(&mut self, table: &str, count: u64) {
        self.per_table.insert(table.to_string(), count);
        self.recompute();
    }

    /// Rebuild the total and the offset fragment from the per-table counts.
    fn recompute(&mut self) {
        self.total = self.per_table.values().sum();
        self.local_offset = self
            .per_table
            .iter()
            .map(|(table, count)| {
                (
                    table_count_key(&self.key, table),
                    serde_json::Value::from(*count),
                )
            })
            .collect();
    }

    /// Rebuild the default group from a legacy offset, where count keys have
    /// no grouping key: `transaction_data_collection_order_<table>`.
    pub fn load_legacy(offsets: &OffsetMap) -> Self {
        let mut counter = Self::new(GroupingKey::Default);
        counter.transaction_id = read_transaction_id(offsets);

        for (key, value) in offsets {
            let Some(table) = key.strip_prefix(OFFSET_TABLE_COUNT_PREFIX) else {
                continue;
            };
            match read_u64(value) {
                Some(count) => {
                    counter.per_table.insert(table.to_string(), count);
                }
                None => warn!("Skipping legacy offset entry {} with value {}", key, value),
            }
        }

        counter.recompute();
        counter
    }

    pub fn key(&self) -> &GroupingKey {
        &self.key
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn total_event_count(&self) -> u64 {
        self.total
    }

    pub fn per_table_event_count(&self) -> &HashMap<String, u64> {
        &self.per_table
    }

    /// Offset entries mirroring the counts of this group.
    pub fn local_offset(&self) -> &OffsetMap {
        &self.local_offset
    }
}

/// Ordinals assigned to one counted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOrder {
    /// Group the event was attributed to
    pub key: GroupingKey,
    /// Position among events of the same table in the group (1-based)
    pub data_collection_order: u64,
    /// Position among all events of the group (1-based)
    pub total_order: u64,
}

/// Transaction state embedded in the connector offset.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    transaction_id: Option<String>,
    /// Id as found in a loaded offset, written back unchanged
    persisted_transaction_id: Option<serde_json::Value>,
    default_group: GroupCounter,
    groups: HashMap<String, GroupCounter>,
    local_offset: OffsetMap,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.transaction_id = None;
        self.persisted_transaction_id = None;
        self.default_group.reset();
        self.groups.clear();
        self.local_offset.clear();
    }

    /// Start bookkeeping for `transaction_id`, discarding all previous counts.
    pub fn begin_transaction(&mut self, transaction_id: impl Into<String>) {
        let transaction_id = transaction_id.into();
        if let Some(open) = &self.transaction_id {
            debug!(
                "Transaction {} begins while {} is still open, resetting",
                transaction_id, open
            );
        }

        self.reset();
        self.default_group.begin_transaction(Some(&transaction_id));
        self.local_offset
            .insert(OFFSET_TRANSACTION_ID.to_string(), transaction_id.clone().into());
        self.local_offset.insert(
            OFFSET_FORMAT_VERSION.to_string(),
            CURRENT_FORMAT_VERSION.into(),
        );
        self.transaction_id = Some(transaction_id);
    }

    pub fn end_transaction(&mut self) {
        self.reset();
    }

    /// Count one event of `table` for group `key` and return its ordinal
    /// within the table.
    pub fn record_event(&mut self, table: &str, key: &GroupingKey) -> u64 {
        let transaction_id = self.transaction_id.as_deref();
        let counter = match key {
            GroupingKey::Default => &mut self.default_group,
            GroupingKey::Identity(identity) => {
                self.groups.entry(identity.clone()).or_insert_with(|| {
                    trace!("New group {} in transaction {:?}", identity, transaction_id);
                    let mut counter = GroupCounter::new(key.clone());
                    counter.begin_transaction(transaction_id);
                    counter
                })
            }
        };

        let ordinal = counter.record_event(table);
        self.local_offset
            .entry(OFFSET_FORMAT_VERSION.to_string())
            .or_insert_with(|| CURRENT_FORMAT_VERSION.into());
        self.local_offset.extend(
            counter
                .local_offset()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        ordinal
    }

    /// Resolve the group of a row event and count it.
    pub fn record_row_event(
        &mut self,
        event: &CdcEvent,
        resolver: &IdentityResolver,
    ) -> EventOrder {
        let table = event.data_collection();
        let key = resolver.resolve(&table, event);
        let data_collection_order = self.record_event(&table, &key);
        let total_order = self
            .group(&key)
            .map(GroupCounter::total_event_count)
            .unwrap_or(data_collection_order);

        EventOrder {
            key,
            data_collection_order,
            total_order,
        }
    }

    pub fn is_transaction_in_progress(&self) -> bool {
        self.transaction_id.is_some()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Events counted across all groups.
    pub fn total_event_count(&self) -> u64 {
        self.groups().map(GroupCounter::total_event_count).sum()
    }

    /// Per-table counts of the default group.
    pub fn per_table_event_count(&self) -> &HashMap<String, u64> {
        self.default_group.per_table_event_count()
    }

    pub fn default_group(&self) -> &GroupCounter {
        &self.default_group
    }

    pub fn group(&self, key: &GroupingKey) -> Option<&GroupCounter> {
        match key {
            GroupingKey::Default => Some(&self.default_group),
            GroupingKey::Identity(identity) => self.groups.get(identity),
        }
    }

    /// All groups, the default group first.
    pub fn groups(&self) -> impl Iterator<Item = &GroupCounter> {
        std::iter::once(&self.default_group).chain(self.groups.values())
    }

    /// Number of groups including the default group.
    pub fn group_count(&self) -> usize {
        self.groups.len() + 1
    }

    /// Write the transaction state into `offset`.
    ///
    /// Transaction keys already present in `offset` that are not part of the
    /// current state are removed, so groups of earlier transactions never
    /// outlive a new BEGIN in the persisted map.
    pub fn store(&self, offset: &mut OffsetMap) {
        offset.retain(|key, _| !is_transaction_key(key));
        offset.extend(
            self.local_offset
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    /// Transaction state as a standalone offset map.
    pub fn snapshot(&self) -> OffsetMap {
        self.local_offset.clone()
    }

    /// Rebuild the context from a persisted offset map.
    pub fn load(offsets: &OffsetMap) -> Self {
        let context = match OffsetFormat::detect(offsets) {
            OffsetFormat::Legacy => Self::load_legacy(offsets),
            OffsetFormat::Grouped => Self::load_grouped(offsets),
        };
        debug!(
            "Loaded transaction context for {:?} with {} groups, {} events",
            context.transaction_id,
            context.group_count(),
            context.total_event_count()
        );
        context
    }

    fn load_legacy(offsets: &OffsetMap) -> Self {
        let default_group = GroupCounter::load_legacy(offsets);
        let mut context = Self {
            transaction_id: default_group.transaction_id.clone(),
            persisted_transaction_id: persisted_transaction_id(offsets),
            default_group,
            groups: HashMap::new(),
            local_offset: OffsetMap::new(),
        };

        let has_state =
            context.transaction_id.is_some() || context.default_group.total_event_count() > 0;
        if has_state {
            context.rebuild_local_offset();
        }
        context
    }

    fn load_grouped(offsets: &OffsetMap) -> Self {
        let transaction_id = read_transaction_id(offsets);
        let mut context = Self {
            transaction_id: transaction_id.clone(),
            persisted_transaction_id: persisted_transaction_id(offsets),
            ..Default::default()
        };
        context
            .default_group
            .begin_transaction(transaction_id.as_deref());

        for (key, value) in offsets {
            let Some(suffix) = key.strip_prefix(OFFSET_TABLE_COUNT_PREFIX) else {
                continue;
            };
            let Some((group_key, table)) = split_grouped_suffix(suffix) else {
                warn!("Skipping malformed transaction offset key {}", key);
                continue;
            };
            let Some(count) = read_u64(value) else {
                warn!("Skipping transaction offset key {} with value {}", key, value);
                continue;
            };

            let counter = match &group_key {
                GroupingKey::Default => &mut context.default_group,
                GroupingKey::Identity(identity) => {
                    context.groups.entry(identity.clone()).or_insert_with(|| {
                        let mut counter = GroupCounter::new(group_key.clone());
                        counter.begin_transaction(transaction_id.as_deref());
                        counter
                    })
                }
            };
            counter.per_table.insert(table.to_string(), count);
        }

        context.default_group.recompute();
        for counter in context.groups.values_mut() {
            counter.recompute();
        }
        context.rebuild_local_offset();
        context
    }

    fn rebuild_local_offset(&mut self) {
        let mut local = OffsetMap::new();
        let transaction_id = self
            .persisted_transaction_id
            .clone()
            .or_else(|| self.transaction_id.clone().map(Into::into));
        if let Some(transaction_id) = transaction_id {
            local.insert(OFFSET_TRANSACTION_ID.to_string(), transaction_id);
        }
        local.insert(
            OFFSET_FORMAT_VERSION.to_string(),
            CURRENT_FORMAT_VERSION.into(),
        );
        for counter in std::iter::once(&self.default_group).chain(self.groups.values()) {
            local.extend(
                counter
                    .local_offset()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        self.local_offset = local;
    }
}

impl fmt::Display for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransactionContext [transaction_id={:?}, groups={}, events={}]",
            self.transaction_id,
            self.group_count(),
            self.total_event_count()
        )
    }
}
