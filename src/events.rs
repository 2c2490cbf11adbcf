//! Domain events
//!
//! Every meaningful state change produces one [`WalletEvent`]. Events of a
//! batch are buffered while it runs and handed to an [`EventSink`] only after
//! the whole batch committed, so indexers never see effects of a reverted
//! batch.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Canonical event schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum WalletEvent {
    LogMint { erc20: Address, token_amt: U256 },
    LogRedeem { erc20: Address, token_amt: U256 },
    LogBorrow { erc20: Address, token_amt: U256 },
    LogPayback { erc20: Address, token_amt: U256 },
    LogSwap { src: Address, dest: Address, amount: U256 },
    LogLiquidityAdd {
        token_a: Address,
        token_b: Address,
        amount: U256,
    },
    LogLiquidityRemove { token_a: Address, token_b: Address },
    LogDeposit { erc20: Address, amount: U256 },
    LogWithdraw { erc20: Address, amount: U256 },
    FeeCharged {
        asset: Address,
        recipient: Address,
        amount: U256,
    },
    DelegateAdded { delegate: Address },
    DelegateRemoved { delegate: Address },
    WalletCreated { owner: Address, wallet: Address },
}

/// An event together with where and when it was emitted
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    /// Contract that emitted the event
    pub emitter: Address,
    /// Batch the event belongs to, if it came out of `execute`
    pub batch_id: Option<Uuid>,
    #[serde(flatten)]
    pub event: WalletEvent,
}

impl EventRecord {
    pub fn new(emitter: Address, batch_id: Option<Uuid>, event: WalletEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            emitter,
            batch_id,
            event,
        }
    }
}

/// Destination for committed events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, records: &[EventRecord]);
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<EventRecord> {
        self.records.lock().await.clone()
    }

    /// Events emitted by one contract, in order
    pub async fn events_of(&self, emitter: Address) -> Vec<WalletEvent> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.emitter == emitter)
            .map(|r| r.event.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventLog {
    async fn publish(&self, records: &[EventRecord]) {
        self.records.lock().await.extend_from_slice(records);
    }
}

/// Writer for JSONL event lines
struct JsonlWriter {
    path: PathBuf,
}

impl JsonlWriter {
    fn write(&self, records: &[EventRecord]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{}", json)?;
        }
        Ok(())
    }
}

/// Appends committed events to a JSONL file for off-chain indexers
pub struct JsonlEventLog {
    writer: Arc<Mutex<JsonlWriter>>,
}

impl JsonlEventLog {
    /// # Arguments
    /// * `log_path` - Path to the event log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(JsonlWriter {
                path: log_path.into(),
            })),
        }
    }
}

#[async_trait]
impl EventSink for JsonlEventLog {
    async fn publish(&self, records: &[EventRecord]) {
        let writer = self.writer.lock().await;
        // Publishing never fails the batch; it already committed
        if let Err(e) = writer.write(records) {
            tracing::warn!(error = %e, "Failed to write event log entry");
        }
    }
}

/// Publishes to several sinks in order
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn publish(&self, records: &[EventRecord]) {
        for sink in &self.sinks {
            sink.publish(records).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_jsonl_log_appends_records() {
        let temp_file = NamedTempFile::new().unwrap();
        let log = JsonlEventLog::new(temp_file.path());
        let wallet = Address::repeat_byte(0x77);

        log.publish(&[EventRecord::new(
            wallet,
            Some(Uuid::new_v4()),
            WalletEvent::LogMint {
                erc20: Address::repeat_byte(0x01),
                token_amt: U256::from(100),
            },
        )])
        .await;
        log.publish(&[EventRecord::new(
            wallet,
            None,
            WalletEvent::DelegateAdded {
                delegate: Address::repeat_byte(0x02),
            },
        )])
        .await;

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"event\":\"LogMint\""));
        assert!(content.contains("DelegateAdded"));
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MemoryEventLog::new());
        let second = Arc::new(MemoryEventLog::new());
        let fanout = FanoutSink::new(vec![first.clone(), second.clone()]);
        let emitter = Address::repeat_byte(0x33);

        fanout
            .publish(&[EventRecord::new(
                emitter,
                None,
                WalletEvent::DelegateRemoved {
                    delegate: Address::ZERO,
                },
            )])
            .await;

        assert_eq!(first.events_of(emitter).await.len(), 1);
        assert_eq!(second.records().await.len(), 1);
    }
}
