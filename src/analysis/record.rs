//! Per-request analysis records and the sinks that receive them.
//!
//! The executor builds one [`AnalysisRecord`] for every request it makes and hands it to a
//! [`RecordSink`]. Storing records is the sink's business.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::schema::AnalysisKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub kind: AnalysisKind,
    /// `provider:model` of the backend that served the request.
    pub backend: String,
    pub prompt: String,
    /// Raw model text; empty when the backend call itself failed.
    pub response: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Receives analysis records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn record(&self, record: AnalysisRecord);
}

pub type SharedRecordSink = Arc<dyn RecordSink>;

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl RecordSink for NullSink {
    async fn record(&self, _record: AnalysisRecord) {}
}

/// Writes a one-line summary of each record to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl RecordSink for TracingSink {
    async fn record(&self, record: AnalysisRecord) {
        if record.success {
            tracing::info!(
                record_id = %record.id,
                kind = %record.kind,
                backend = %record.backend,
                duration_ms = record.duration_ms,
                tokens = record.token_count,
                "Analysis request recorded"
            );
        } else {
            tracing::warn!(
                record_id = %record.id,
                kind = %record.kind,
                backend = %record.backend,
                duration_ms = record.duration_ms,
                error = record.error.as_deref().unwrap_or_default(),
                "Failed analysis request recorded"
            );
        }
    }
}

/// Keeps records in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<RwLock<Vec<AnalysisRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AnalysisRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn record(&self, record: AnalysisRecord) {
        self.records.write().await.push(record);
    }
}
