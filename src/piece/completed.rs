use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::error;

/// Verified chunk payloads, one write-once slot per index.
pub struct CompletedChunks {
    slots: Mutex<Vec<Option<Bytes>>>,
    completed: AtomicUsize,
}

impl CompletedChunks {
    pub fn new(num_chunks: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; num_chunks]),
            completed: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Bytes>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the payload for `index`. Returns `false` without touching the slot
    /// if it was already filled or is out of range.
    pub fn record(&self, index: usize, data: Bytes) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(index) else {
            error!("Chunk index {} out of range", index);
            return false;
        };
        if slot.is_some() {
            error!("Chunk {} completed twice, keeping the first copy", index);
            return false;
        }
        *slot = Some(data);
        self.completed.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn is_recorded(&self, index: usize) -> bool {
        matches!(self.lock().get(index), Some(Some(_)))
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_done(&self) -> bool {
        self.completed() == self.len()
    }

    /// Hand the slots to the assembler, leaving this set empty.
    pub fn take(&self) -> Vec<Option<Bytes>> {
        std::mem::take(&mut *self.lock())
    }
}
