//! Replication messages
//!
//! The decoder hands the bookkeeping core either a transaction control marker
//! (BEGIN/COMMIT) or a data-row change. Row data is only reachable after
//! matching on [`ReplicationMessage::Row`]; the accessor shortcuts on the
//! enum fail with [`CdcError::InvalidForControlMessage`] for control markers.

use crate::common::{CdcError, CdcEvent, CdcOp, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Kind of a transaction control marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Transaction begin
    Begin,
    /// Transaction commit
    Commit,
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOp::Begin => write!(f, "BEGIN"),
            ControlOp::Commit => write!(f, "COMMIT"),
        }
    }
}

/// Transaction demarcation marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    transaction_id: u64,
    commit_time: DateTime<Utc>,
    op: ControlOp,
    origin: Option<String>,
}

impl ControlMessage {
    /// Create a control marker.
    pub fn new(op: ControlOp, transaction_id: u64, commit_time: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            commit_time,
            op,
            origin: None,
        }
    }

    /// Create a BEGIN marker.
    pub fn begin(transaction_id: u64, commit_time: DateTime<Utc>) -> Self {
        Self::new(ControlOp::Begin, transaction_id, commit_time)
    }

    /// Create a COMMIT marker.
    pub fn commit(transaction_id: u64, commit_time: DateTime<Utc>) -> Self {
        Self::new(ControlOp::Commit, transaction_id, commit_time)
    }

    /// Set the replication origin the transaction came from.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Whether the decoder may acknowledge the position of this record.
    pub fn is_last_event_for_position(&self) -> bool {
        self.op == ControlOp::Commit
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn commit_time(&self) -> DateTime<Utc> {
        self.commit_time
    }

    pub fn op(&self) -> ControlOp {
        self.op
    }

    pub fn origin_name(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} txn={} commit_time={}",
            self.op,
            self.transaction_id,
            self.commit_time.to_rfc3339()
        )?;
        if let Some(origin) = &self.origin {
            write!(f, " origin={}", origin)?;
        }
        Ok(())
    }
}

/// Data-row change together with the transaction it was decoded in.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMessage {
    /// Transaction ID, when the decoder knows it
    pub transaction_id: Option<u64>,
    /// Decoded change
    pub event: CdcEvent,
}

impl RowMessage {
    pub fn new(transaction_id: Option<u64>, event: CdcEvent) -> Self {
        Self {
            transaction_id,
            event,
        }
    }
}

/// Message produced by the replication decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationMessage {
    /// BEGIN/COMMIT marker
    Control(ControlMessage),
    /// Row change
    Row(RowMessage),
}

impl ReplicationMessage {
    /// Transaction ID carried by the message, if any.
    pub fn transaction_id(&self) -> Option<u64> {
        match self {
            Self::Control(ctrl) => Some(ctrl.transaction_id()),
            Self::Row(row) => row.transaction_id,
        }
    }

    /// Only a COMMIT marker completes its log position.
    pub fn is_last_event_for_position(&self) -> bool {
        match self {
            Self::Control(ctrl) => ctrl.is_last_event_for_position(),
            Self::Row(_) => false,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Control(_))
    }

    /// Borrow the row change, failing for control markers.
    pub fn as_row(&self) -> Result<&RowMessage> {
        match self {
            Self::Row(row) => Ok(row),
            Self::Control(_) => Err(CdcError::InvalidForControlMessage("row")),
        }
    }

    /// Table the row change belongs to.
    pub fn table(&self) -> Result<&str> {
        match self {
            Self::Row(row) => Ok(&row.event.table),
            Self::Control(_) => Err(CdcError::InvalidForControlMessage("table")),
        }
    }

    /// Row operation.
    pub fn operation(&self) -> Result<CdcOp> {
        match self {
            Self::Row(row) => Ok(row.event.op),
            Self::Control(_) => Err(CdcError::InvalidForControlMessage("operation")),
        }
    }

    /// Row image before the change.
    pub fn old_tuple(&self) -> Result<Option<&serde_json::Value>> {
        match self {
            Self::Row(row) => Ok(row.event.before.as_ref()),
            Self::Control(_) => Err(CdcError::InvalidForControlMessage("old_tuple")),
        }
    }

    /// Row image after the change.
    pub fn new_tuple(&self) -> Result<Option<&serde_json::Value>> {
        match self {
            Self::Row(row) => Ok(row.event.after.as_ref()),
            Self::Control(_) => Err(CdcError::InvalidForControlMessage("new_tuple")),
        }
    }
}

impl From<ControlMessage> for ReplicationMessage {
    fn from(ctrl: ControlMessage) -> Self {
        Self::Control(ctrl)
    }
}

impl From<RowMessage> for ReplicationMessage {
    fn from(row: RowMessage) -> Self {
        Self::Row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_705_000_000, 0).unwrap()
    }

    #[test]
    fn test_commit_is_last_event_for_position() {
        assert!(ControlMessage::commit(42, ts()).is_last_event_for_position());
        assert!(!ControlMessage::begin(42, ts()).is_last_event_for_position());
    }

    #[test]
    fn test_control_accessors() {
        let msg = ControlMessage::begin(42, ts()).with_origin("node_a");
        assert_eq!(msg.transaction_id(), 42);
        assert_eq!(msg.commit_time(), ts());
        assert_eq!(msg.op(), ControlOp::Begin);
        assert_eq!(msg.origin_name(), Some("node_a"));
        assert_eq!(ControlMessage::commit(1, ts()).origin_name(), None);
        assert!(msg.to_string().contains("origin=node_a"));
    }

    #[test]
    fn test_row_accessors_fail_on_control() {
        for ctrl in [ControlMessage::begin(7, ts()), ControlMessage::commit(7, ts())] {
            let msg = ReplicationMessage::from(ctrl);
            assert!(matches!(
                msg.table(),
                Err(CdcError::InvalidForControlMessage("table"))
            ));
            assert!(msg.operation().is_err());
            assert!(msg.old_tuple().is_err());
            assert!(msg.new_tuple().is_err());
            assert!(msg.as_row().is_err());
            assert_eq!(msg.transaction_id(), Some(7));
        }
    }

    #[test]
    fn test_row_accessors() {
        let event = CdcEvent::update(
            "postgres",
            "db",
            "public",
            "orders",
            Some(json!({"order_id": "A"})),
            json!({"order_id": "B"}),
            0,
        );
        let msg = ReplicationMessage::from(RowMessage::new(Some(9), event));

        assert_eq!(msg.table().unwrap(), "orders");
        assert_eq!(msg.operation().unwrap(), CdcOp::Update);
        assert_eq!(msg.old_tuple().unwrap(), Some(&json!({"order_id": "A"})));
        assert_eq!(msg.new_tuple().unwrap(), Some(&json!({"order_id": "B"})));
        assert!(!msg.is_last_event_for_position());
        assert!(!msg.is_control());
    }
}
