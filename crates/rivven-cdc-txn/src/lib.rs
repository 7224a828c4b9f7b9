//! # rivven-cdc-txn - Transaction Bookkeeping for Rivven CDC
//!
//! Tracks transaction boundaries and per-identity event ordinals for a
//! change-data-capture stream read from a write-ahead log.
//!
//! ## Features
//!
//! - Control markers (BEGIN/COMMIT) as a distinct message kind
//! - Transaction splitting: events are grouped by an identity column so one
//!   physical transaction yields independently numbered sub-transactions
//! - Restart-safe counters embedded in the connector offset
//! - Decoding of both the legacy flat and the grouped offset encoding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rivven_cdc_txn::{IdentityResolver, OffsetMap, TrackerOutput, TransactionTracker};
//! use std::path::Path;
//!
//! let resolver = IdentityResolver::from_location(Some(Path::new("/etc/rivven/split.json")));
//! let persisted = OffsetMap::new();
//! let tracker = TransactionTracker::resume(&persisted, resolver);
//!
//! // for (lsn, message) in decoded stream:
//! //     if let TrackerOutput::Completed(buffer) = tracker.process(lsn, message)? { ... }
//!
//! let mut offset = OffsetMap::new();
//! tracker.store(&mut offset);
//! # let _ = TrackerOutput::Buffered;
//! ```
//!
//! ## Public API Organization
//!
//! Core types are re-exported at the crate root. Offset key constants and
//! helpers live in [`common::offset`].

pub mod common;

pub use common::{
    // Error handling
    CdcError,
    // Events
    CdcEvent,
    CdcOp,
    ControlMessage,
    ControlOp,
    ErrorCategory,
    // Transaction state
    EventOrder,
    GroupCounter,
    GroupingKey,
    // Identity resolution
    IdentityConfig,
    IdentityLookup,
    IdentityResolver,
    Lsn,
    OffsetFormat,
    OffsetMap,
    ReplicationMessage,
    Result,
    RowMessage,
    TrackerOutput,
    TransactionBuffer,
    TransactionContext,
    TransactionMetadata,
    TransactionTracker,
};
