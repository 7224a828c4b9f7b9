//! # Transaction Buffering
//!
//! Collects the messages of one open transaction, in arrival order, from the
//! BEGIN marker until the transaction commits or is abandoned.
//!
//! Buffers compare and hash by transaction id only: two buffers for the same
//! transaction are equal regardless of their contents, so a set of buffers
//! collapses duplicates of the same transaction.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut buffer = TransactionBuffer::open(begin, lsn)?;
//! buffer.append(next_lsn, row);
//! for (lsn, message) in buffer.events() {
//!     // ...
//! }
//! ```

use crate::common::{CdcError, ControlOp, Lsn, ReplicationMessage, Result};
use std::hash::{Hash, Hasher};

/// Messages of one open transaction.
#[derive(Debug, Clone)]
pub struct TransactionBuffer {
    transaction_id: u64,
    begin: ReplicationMessage,
    start_position: Lsn,
    events: Vec<(Lsn, ReplicationMessage)>,
}

impl TransactionBuffer {
    /// Open a buffer for the transaction started by `begin`.
    pub fn open(begin: ReplicationMessage, start_position: Lsn) -> Result<Self> {
        if let ReplicationMessage::Control(ctrl) = &begin {
            if ctrl.op() == ControlOp::Commit {
                return Err(CdcError::invalid_state(format!(
                    "cannot open transaction {} with a COMMIT marker",
                    ctrl.transaction_id()
                )));
            }
        }
        let transaction_id = begin
            .transaction_id()
            .ok_or(CdcError::MissingTransactionId)?;

        Ok(Self {
            transaction_id,
            begin,
            start_position,
            events: Vec::new(),
        })
    }

    /// Append a message. Positions must be supplied in increasing order; this
    /// is not checked.
    pub fn append(&mut self, position: Lsn, message: ReplicationMessage) {
        self.events.push((position, message));
    }

    pub fn events(&self) -> &[(Lsn, ReplicationMessage)] {
        &self.events
    }

    pub fn into_events(self) -> Vec<(Lsn, ReplicationMessage)> {
        self.events
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    /// The message that opened this buffer.
    pub fn begin(&self) -> &ReplicationMessage {
        &self.begin
    }

    pub fn start_position(&self) -> Lsn {
        self.start_position
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl PartialEq for TransactionBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_id == other.transaction_id
    }
}

impl Eq for TransactionBuffer {}

impl Hash for TransactionBuffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.transaction_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CdcEvent, ControlMessage, RowMessage};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashSet;

    fn begin(txn: u64) -> ReplicationMessage {
        ControlMessage::begin(txn, Utc::now()).into()
    }

    fn row(txn: Option<u64>, id: i64) -> ReplicationMessage {
        let event = CdcEvent::insert("postgres", "db", "public", "orders", json!({"id": id}), 0);
        RowMessage::new(txn, event).into()
    }

    #[test]
    fn test_open_takes_id_from_begin() {
        let buffer = TransactionBuffer::open(begin(100), Lsn::new(10)).unwrap();
        assert_eq!(buffer.transaction_id(), 100);
        assert_eq!(buffer.start_position(), Lsn::new(10));
        assert!(buffer.begin().is_control());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_open_without_transaction_id_fails() {
        let err = TransactionBuffer::open(row(None, 1), Lsn::new(10)).unwrap_err();
        assert!(matches!(err, CdcError::MissingTransactionId));
    }

    #[test]
    fn test_open_with_commit_fails() {
        let commit = ControlMessage::commit(5, Utc::now()).into();
        let err = TransactionBuffer::open(commit, Lsn::new(10)).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let mut buffer = TransactionBuffer::open(begin(1), Lsn::new(10)).unwrap();
        buffer.append(Lsn::new(11), row(Some(1), 1));
        buffer.append(Lsn::new(12), row(Some(1), 2));
        buffer.append(Lsn::new(13), row(Some(1), 3));

        let positions: Vec<u64> = buffer.events().iter().map(|(p, _)| p.as_u64()).collect();
        assert_eq!(positions, vec![11, 12, 13]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_equality_by_transaction_id_only() {
        let mut a = TransactionBuffer::open(begin(7), Lsn::new(1)).unwrap();
        a.append(Lsn::new(2), row(Some(7), 1));
        let b = TransactionBuffer::open(begin(7), Lsn::new(50)).unwrap();
        let c = TransactionBuffer::open(begin(8), Lsn::new(1)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<TransactionBuffer> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
