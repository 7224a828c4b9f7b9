//! Shared helpers for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rivven_cdc_txn::{
    CdcEvent, ControlMessage, IdentityConfig, IdentityResolver, ReplicationMessage, RowMessage,
};
use std::io;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

/// Initialize test logging
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("rivven_cdc_txn=trace".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Log lines written while running `f`, at `warn` and above.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn commit_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_705_000_000, 0).unwrap()
}

pub fn begin(txn: u64) -> ReplicationMessage {
    ControlMessage::begin(txn, commit_time()).into()
}

pub fn commit(txn: u64) -> ReplicationMessage {
    ControlMessage::commit(txn, commit_time()).into()
}

pub fn insert(txn: u64, table: &str, after: serde_json::Value) -> ReplicationMessage {
    let event = CdcEvent::insert("postgres", "shop", "public", table, after, 1_705_000_000);
    RowMessage::new(Some(txn), event).into()
}

pub fn delete(txn: u64, table: &str, before: serde_json::Value) -> ReplicationMessage {
    let event = CdcEvent::delete("postgres", "shop", "public", table, before, 1_705_000_000);
    RowMessage::new(Some(txn), event).into()
}

/// Resolver splitting `orders` and `order_items` by `order_id`.
pub fn order_resolver() -> IdentityResolver {
    IdentityResolver::new(Some(
        IdentityConfig::builder()
            .table("orders", "order_id")
            .table("order_items", "order_id")
            .entity_type("orders")
            .build(),
    ))
}
