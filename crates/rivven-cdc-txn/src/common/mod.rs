//! # Common Transaction Bookkeeping Types
//!
//! Database-agnostic building blocks of the transaction bookkeeping core:
//!
//! - [`ReplicationMessage`] - Control markers vs. data-row changes
//! - [`TransactionBuffer`] - Messages of one open transaction
//! - [`IdentityResolver`] - Grouping keys for data-row events
//! - [`GroupCounter`] - Per-identity event counts
//! - [`TransactionContext`] - Offset-persisted transaction state
//! - [`TransactionTracker`] - Stream driver tying the above together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ReplicationMessage ──► TransactionTracker                  │
//! │                            │                                │
//! │       BEGIN/COMMIT ◄───────┼───────► Row                    │
//! │            │               │          │                     │
//! │            ▼               │          ▼                     │
//! │   TransactionBuffer        │   IdentityResolver             │
//! │                            │          │ GroupingKey         │
//! │                            ▼          ▼                     │
//! │                   TransactionContext ─► GroupCounter        │
//! │                            │                                │
//! │                            ▼ store / load                   │
//! │                       OffsetMap                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod context;
mod error;
mod event;
mod identity;
mod lsn;
mod message;
pub mod offset;
mod tracker;
mod transaction;

pub use context::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use lsn::*;
pub use message::*;
pub use offset::{OffsetFormat, OffsetMap};
pub use tracker::*;
pub use transaction::*;
