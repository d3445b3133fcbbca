use crate::models::{ErrorDetail, TransferError, TransferRecord, TransferState};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Transfer {0} already exists")]
    Duplicate(String),

    #[error("Transfer {0} not found")]
    NotFound(String),

    #[error("Transfer {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TransferState,
        to: TransferState,
    },
}

/// In-memory table of transfer records.
///
/// Every mutation runs under the entry's shard lock and every read clones
/// under it, so a status poll never observes a half-applied update. State
/// changes are checked against [`TransferState::can_transition_to`], which
/// keeps the sequence of observed states monotonic.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    records: DashMap<String, TransferRecord>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new transfer in `receiving`. Identifiers are never reused.
    pub fn create(&self, id: &str, filename: &str) -> Result<TransferRecord, RegistryError> {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(id.to_string())),
            Entry::Vacant(slot) => {
                let record = TransferRecord::new(id, filename);
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<TransferRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// Updates the byte counter of a transfer that is still receiving.
    pub fn record_progress(&self, id: &str, bytes_received: u64) -> Result<(), RegistryError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if record.state != TransferState::Receiving {
            return Err(RegistryError::InvalidTransition {
                id: id.to_string(),
                from: record.state,
                to: TransferState::Receiving,
            });
        }
        record.bytes_received = bytes_received;
        Ok(())
    }

    pub fn mark_decompressing(&self, id: &str) -> Result<TransferRecord, RegistryError> {
        self.advance(id, TransferState::Decompressing, |_| {})
    }

    pub fn mark_stored(
        &self,
        id: &str,
        stored_as: &Path,
        bytes_received: u64,
    ) -> Result<TransferRecord, RegistryError> {
        self.advance(id, TransferState::Stored, |record| {
            record.bytes_received = bytes_received;
            record.stored_as = Some(stored_as.display().to_string());
        })
    }

    pub fn mark_failed(
        &self,
        id: &str,
        error: &TransferError,
    ) -> Result<TransferRecord, RegistryError> {
        self.advance(id, TransferState::Failed, |record| {
            record.error = Some(ErrorDetail::from(error));
        })
    }

    fn advance(
        &self,
        id: &str,
        next: TransferState,
        apply: impl FnOnce(&mut TransferRecord),
    ) -> Result<TransferRecord, RegistryError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if !record.state.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                id: id.to_string(),
                from: record.state,
                to: next,
            });
        }

        apply(record.value_mut());
        record.state = next;
        if next.is_terminal() {
            record.finished_at = Some(Utc::now());
        }
        Ok(record.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes terminal records that finished more than `max_age` ago.
    /// In-flight transfers are never evicted. Returns the number removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let before = self.records.len();

        self.records.retain(|_, record| {
            !(record.state.is_terminal()
                && record.finished_at.is_some_and(|finished| finished < cutoff))
        });

        before.saturating_sub(self.records.len())
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, id: &str, age: chrono::Duration) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.started_at -= age;
            if let Some(finished) = record.finished_at.as_mut() {
                *finished -= age;
            }
        }
    }
}
