//! Call store abstraction and the in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::{CallFinalization, CallRecord, LedgerError, LedgerResult};

/// Persistence for call records.
///
/// `finalize` is the only way a record reaches a terminal status. It must be
/// atomic: status, end time, duration and cost are written together, and only
/// while the record is still non-terminal. A second finalization reports
/// [`LedgerError::AlreadyFinalized`].
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn insert(&self, record: CallRecord) -> LedgerResult<CallRecord>;

    async fn get(&self, call_sid: &str) -> LedgerResult<Option<CallRecord>>;

    async fn finalize(&self, call_sid: &str, finalization: CallFinalization)
    -> LedgerResult<CallRecord>;

    async fn append_transcript(&self, call_sid: &str, text: &str) -> LedgerResult<()>;
}

/// Call store backed by a concurrent map. Used when no database is configured
/// and in tests.
#[derive(Debug, Default)]
pub struct InMemoryCallStore {
    calls: DashMap<String, CallRecord>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn insert(&self, mut record: CallRecord) -> LedgerResult<CallRecord> {
        match self.calls.entry(record.call_sid.clone()) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists(record.call_sid)),
            Entry::Vacant(slot) => {
                if record.id.is_none() {
                    record.id = Some(uuid::Uuid::new_v4().to_string());
                }
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get(&self, call_sid: &str) -> LedgerResult<Option<CallRecord>> {
        Ok(self.calls.get(call_sid).map(|r| r.value().clone()))
    }

    async fn finalize(
        &self,
        call_sid: &str,
        finalization: CallFinalization,
    ) -> LedgerResult<CallRecord> {
        let mut record = self
            .calls
            .get_mut(call_sid)
            .ok_or_else(|| LedgerError::NotFound(call_sid.to_string()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinalized(call_sid.to_string()));
        }

        record.status = finalization.status;
        record.ended_at = Some(finalization.ended_at);
        record.duration_seconds = Some(finalization.duration_seconds);
        record.cost_usd = Some(finalization.cost_usd);
        Ok(record.clone())
    }

    async fn append_transcript(&self, call_sid: &str, text: &str) -> LedgerResult<()> {
        let mut record = self
            .calls
            .get_mut(call_sid)
            .ok_or_else(|| LedgerError::NotFound(call_sid.to_string()))?;
        record
            .transcript
            .get_or_insert_with(String::new)
            .push_str(text);
        Ok(())
    }
}
