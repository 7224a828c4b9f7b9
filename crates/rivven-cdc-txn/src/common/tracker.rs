//! # Transaction Tracking
//!
//! Drives the [`TransactionContext`] and a [`TransactionBuffer`] from the
//! decoded replication stream:
//!
//! - **BEGIN** resets the context and opens a buffer
//! - **Rows** are attributed to a group, counted and annotated with
//!   [`TransactionMetadata`], then buffered
//! - **COMMIT** closes the buffer and resets the context
//!
//! Messages must be fed in log order from a single task.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let resolver = IdentityResolver::from_location(config_path.as_deref());
//! let mut tracker = TransactionTracker::resume(&persisted_offset, resolver);
//!
//! while let Some((lsn, message)) = stream.next() {
//!     if let TrackerOutput::Completed(buffer) = tracker.process(lsn, message)? {
//!         publish(buffer.into_events());
//!     }
//!     tracker.store(&mut offset);
//! }
//! ```

use crate::common::{
    CdcError, CdcEvent, ControlMessage, ControlOp, IdentityResolver, Lsn, OffsetMap,
    ReplicationMessage, Result, RowMessage, TransactionBuffer, TransactionContext,
    TransactionMetadata,
};
use tracing::{debug, info, warn};

/// Result of feeding one message to the tracker.
#[derive(Debug)]
pub enum TrackerOutput {
    /// A transaction was opened
    Begun {
        transaction_id: u64,
        /// Buffer of a transaction that never committed
        abandoned: Option<TransactionBuffer>,
    },
    /// Row counted and appended to the open transaction
    Buffered,
    /// Row counted outside of any transaction
    PassThrough(CdcEvent),
    /// Transaction committed
    Completed(TransactionBuffer),
}

/// Transaction boundary tracker for one connector task.
#[derive(Debug)]
pub struct TransactionTracker {
    context: TransactionContext,
    resolver: IdentityResolver,
    open: Option<TransactionBuffer>,
}

impl TransactionTracker {
    pub fn new(resolver: IdentityResolver) -> Self {
        Self {
            context: TransactionContext::new(),
            resolver,
            open: None,
        }
    }

    /// Restore the context from a persisted offset.
    ///
    /// If the offset was taken inside a transaction, a replayed BEGIN for
    /// that transaction continues its counts instead of resetting them.
    pub fn resume(offsets: &OffsetMap, resolver: IdentityResolver) -> Self {
        let context = TransactionContext::load(offsets);
        if let Some(transaction_id) = context.transaction_id() {
            info!(
                "Resuming transaction {} with {} counted events",
                transaction_id,
                context.total_event_count()
            );
        }
        Self {
            context,
            resolver,
            open: None,
        }
    }

    /// Feed the next message of the stream, read at `position`.
    pub fn process(
        &mut self,
        position: Lsn,
        message: ReplicationMessage,
    ) -> Result<TrackerOutput> {
        match message {
            ReplicationMessage::Control(ctrl) => match ctrl.op() {
                ControlOp::Begin => self.begin(position, ctrl),
                ControlOp::Commit => self.commit(ctrl),
            },
            ReplicationMessage::Row(row) => Ok(self.row(position, row)),
        }
    }

    fn begin(&mut self, position: Lsn, ctrl: ControlMessage) -> Result<TrackerOutput> {
        let transaction_id = ctrl.transaction_id();
        let id = transaction_id.to_string();

        let abandoned = self.open.take();
        if let Some(previous) = &abandoned {
            warn!(
                "Transaction {} begins before {} committed, abandoning {} buffered events",
                transaction_id,
                previous.transaction_id(),
                previous.len()
            );
        }

        let resumed = abandoned.is_none() && self.context.transaction_id() == Some(id.as_str());
        if resumed {
            debug!("Continuing counts of resumed transaction {}", transaction_id);
        } else {
            self.context.begin_transaction(id);
        }

        self.open = Some(TransactionBuffer::open(
            ReplicationMessage::Control(ctrl),
            position,
        )?);
        Ok(TrackerOutput::Begun {
            transaction_id,
            abandoned,
        })
    }

    fn commit(&mut self, ctrl: ControlMessage) -> Result<TrackerOutput> {
        let Some(buffer) = self.open.take() else {
            return Err(CdcError::invalid_state(format!(
                "COMMIT of transaction {} without BEGIN",
                ctrl.transaction_id()
            )));
        };
        if buffer.transaction_id() != ctrl.transaction_id() {
            let open = buffer.transaction_id();
            self.open = Some(buffer);
            return Err(CdcError::invalid_state(format!(
                "COMMIT of transaction {} while {} is open",
                ctrl.transaction_id(),
                open
            )));
        }

        debug!(
            "Transaction {} committed with {} events",
            buffer.transaction_id(),
            buffer.len()
        );
        self.context.end_transaction();
        Ok(TrackerOutput::Completed(buffer))
    }

    fn row(&mut self, position: Lsn, mut row: RowMessage) -> TrackerOutput {
        let order = self.context.record_row_event(&row.event, &self.resolver);

        let transaction_id = self
            .context
            .transaction_id()
            .map(str::to_string)
            .or_else(|| row.transaction_id.map(|id| id.to_string()));
        if let Some(transaction_id) = transaction_id {
            let mut metadata = TransactionMetadata::new(transaction_id, position.to_string())
                .with_order(order.data_collection_order, order.total_order);
            if let Some(identity) = order.key.as_identity() {
                metadata = metadata.with_identity(identity);
            }
            row.event.transaction = Some(metadata);
        }

        match &mut self.open {
            Some(buffer) => {
                buffer.append(position, ReplicationMessage::Row(row));
                TrackerOutput::Buffered
            }
            None => TrackerOutput::PassThrough(row.event),
        }
    }

    /// Write the transaction state into the connector offset.
    pub fn store(&self, offset: &mut OffsetMap) {
        self.context.store(offset);
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn open_transaction(&self) -> Option<&TransactionBuffer> {
        self.open.as_ref()
    }
}
