//! Write-once, read-once transfer of a graded result to the results view.
//!
//! [`TabStorage`] stands in for storage scoped to one client context. It is
//! never persisted; a fresh instance starts empty.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::model::ResultPayload;

/// Key the latest result is stored under.
pub const RESULT_KEY: &str = "practest.last_result";

/// Errors from publishing a result.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("failed to encode result payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// In-memory key/value store shared by clones of the same context.
#[derive(Debug, Clone, Default)]
pub struct TabStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl TabStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_item(&self, key: &str, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    /// Remove and return an entry.
    pub fn take_item(&self, key: &str) -> Option<String> {
        self.entries().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Publishes a result from the controller and hands it to one reader.
#[derive(Debug, Clone, Default)]
pub struct ResultHandoff {
    storage: TabStorage,
}

impl ResultHandoff {
    pub fn new(storage: TabStorage) -> Self {
        Self { storage }
    }

    pub fn publish(&self, payload: &ResultPayload) -> Result<(), HandoffError> {
        let json = serde_json::to_string(payload)?;
        if self.storage.get_item(RESULT_KEY).is_some() {
            tracing::warn!("replacing a result that was never read");
        }
        self.storage.set_item(RESULT_KEY, json);
        tracing::debug!(attempt = %payload.attempt_id, module = %payload.module, "result published");
        Ok(())
    }

    /// Take the pending result. Later calls return `None` until the next
    /// publish.
    pub fn consume(&self) -> Option<ResultPayload> {
        let raw = self.storage.take_item(RESULT_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!("discarding unreadable result payload: {e}");
                None
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.storage.get_item(RESULT_KEY).is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::model::{ExamModule, Report, ResultMeta, SubmitReason};

    fn payload() -> ResultPayload {
        ResultPayload {
            module: ExamModule::Writing,
            attempt_id: "att-42".into(),
            report: Report(json!({"band": 7.0, "criteria": {"coherence": 7.5}})),
            meta: ResultMeta {
                word_count: Some(280),
                audio_mime: None,
                reason: SubmitReason::Manual,
                submitted_at: Utc::now(),
            },
        }
    }

    #[test]
    fn fresh_context_has_no_result() {
        let handoff = ResultHandoff::new(TabStorage::new());
        assert!(!handoff.is_pending());
        assert!(handoff.consume().is_none());
    }

    #[test]
    fn published_result_is_read_back_once() {
        let storage = TabStorage::new();
        let writer = ResultHandoff::new(storage.clone());
        let reader = ResultHandoff::new(storage.clone());

        let written = payload();
        writer.publish(&written).unwrap();
        assert!(reader.is_pending());

        let read = reader.consume().unwrap();
        assert_eq!(read.module, written.module);
        assert_eq!(read.attempt_id, written.attempt_id);
        assert_eq!(read.report, written.report);
        assert_eq!(read.meta.word_count, Some(280));

        assert!(reader.consume().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn separate_contexts_do_not_share_results() {
        let first = ResultHandoff::new(TabStorage::new());
        first.publish(&payload()).unwrap();

        let second = ResultHandoff::new(TabStorage::new());
        assert!(second.consume().is_none());
        assert!(first.is_pending());
    }

    #[test]
    fn corrupt_entry_is_dropped() {
        let storage = TabStorage::new();
        storage.set_item(RESULT_KEY, "{not json".into());
        let handoff = ResultHandoff::new(storage.clone());
        assert!(handoff.consume().is_none());
        assert!(storage.get_item(RESULT_KEY).is_none());
    }
}
