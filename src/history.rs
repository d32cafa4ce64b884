//! Run history: one record per successful summarization.
//!
//! The store is an async trait so the HTTP layer and tests can swap implementations. The bundled
//! [`InMemoryHistoryStore`] keeps records for the lifetime of the process.

use crate::processing::PipelineConfig;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors surfaced by a history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// No record carries the requested id.
    #[error("history record not found: {0}")]
    NotFound(String),
    /// The id is not a valid record identifier.
    #[error("invalid history id: {0}")]
    InvalidId(String),
    /// The creation timestamp could not be formatted.
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Data captured from a finished run, before the store assigns identity.
#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    /// Text that was summarized.
    pub original_text: String,
    /// Final summary.
    pub summary: String,
    /// Model used for every call.
    pub model: String,
    /// Wall-clock duration in seconds.
    pub processing_time: f64,
    /// Settings the run used.
    pub config: PipelineConfig,
}

/// A persisted run.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    /// UUID v4 identifier.
    pub id: String,
    /// Text that was summarized.
    pub original_text: String,
    /// Final summary.
    pub summary: String,
    /// Model used for every call.
    pub model: String,
    /// Wall-clock duration in seconds.
    pub processing_time: f64,
    /// Creation time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub created_at: String,
    /// Settings the run used.
    pub config: PipelineConfig,
}

/// Storage for run history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a record and return it with its assigned id and timestamp.
    async fn insert(&self, record: NewHistoryRecord) -> Result<HistoryRecord, HistoryError>;

    /// Return up to `limit` records, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Fetch a single record.
    async fn get(&self, id: &str) -> Result<HistoryRecord, HistoryError>;

    /// Remove a record.
    async fn delete(&self, id: &str) -> Result<(), HistoryError>;

    /// Cheap reachability probe used by the health endpoint.
    async fn ping(&self) -> Result<(), HistoryError>;
}

/// Process-local history kept in insertion order.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_id(id: &str) -> Result<Uuid, HistoryError> {
    Uuid::parse_str(id.trim()).map_err(|_| HistoryError::InvalidId(id.to_string()))
}

fn timestamp() -> Result<String, HistoryError> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    Ok(OffsetDateTime::now_utc().format(format)?)
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert(&self, record: NewHistoryRecord) -> Result<HistoryRecord, HistoryError> {
        let NewHistoryRecord {
            original_text,
            summary,
            model,
            processing_time,
            config,
        } = record;
        let stored = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            original_text,
            summary,
            model,
            processing_time,
            created_at: timestamp()?,
            config,
        };
        self.records.write().await.push(stored.clone());
        tracing::debug!(id = %stored.id, "History record stored");
        Ok(stored)
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
        let key = parse_id(id)?.to_string();
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.id == key)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), HistoryError> {
        let key = parse_id(id)?.to_string();
        let mut records = self.records.write().await;
        let position = records
            .iter()
            .position(|record| record.id == key)
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))?;
        records.remove(position);
        tracing::debug!(id = %key, "History record deleted");
        Ok(())
    }

    async fn ping(&self) -> Result<(), HistoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(summary: &str) -> NewHistoryRecord {
        NewHistoryRecord {
            original_text: "transcript".into(),
            summary: summary.into(),
            model: "gpt-5-mini".into(),
            processing_time: 1.25,
            config: PipelineConfig::default(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_uuid_and_timestamp() {
        let store = InMemoryHistoryStore::new();
        let record = store.insert(new_record("first")).await.unwrap();

        assert!(Uuid::parse_str(&record.id).is_ok());
        assert_eq!(record.created_at.len(), "2024-01-01 00:00:00".len());
        assert_eq!(&record.created_at[4..5], "-");
        assert_eq!(&record.created_at[10..11], " ");
        assert_eq!(store.get(&record.id).await.unwrap().summary, "first");
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let store = InMemoryHistoryStore::new();
        for summary in ["one", "two", "three"] {
            store.insert(new_record(summary)).await.unwrap();
        }

        let summaries: Vec<String> = store
            .list(2)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.summary)
            .collect();
        assert_eq!(summaries, vec!["three", "two"]);
    }

    #[tokio::test]
    async fn delete_removes_only_the_target() {
        let store = InMemoryHistoryStore::new();
        let keep = store.insert(new_record("keep")).await.unwrap();
        let removed = store.insert(new_record("drop")).await.unwrap();

        store.delete(&removed.id).await.unwrap();

        assert!(matches!(
            store.get(&removed.id).await,
            Err(HistoryError::NotFound(_))
        ));
        assert_eq!(store.list(10).await.unwrap().len(), 1);
        assert_eq!(store.get(&keep.id).await.unwrap().summary, "keep");
        assert!(matches!(
            store.delete(&removed.id).await,
            Err(HistoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let store = InMemoryHistoryStore::new();
        assert!(matches!(
            store.delete("not-a-uuid").await,
            Err(HistoryError::InvalidId(_))
        ));
        assert!(matches!(
            store.get("").await,
            Err(HistoryError::InvalidId(_))
        ));
    }
}
