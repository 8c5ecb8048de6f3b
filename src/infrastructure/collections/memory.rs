use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::domain::models::Collection;
use crate::domain::models::RecordPayload;
use crate::domain::models::RemoteRecord;

/// In-process collection that counts calls and can be told to fail.
#[derive(Default)]
pub struct MemoryCollection {
    records: DashMap<String, RemoteRecord>,
    next_id: AtomicUsize,
    pub get_all_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryCollection {
    pub fn get_all_count(&self) -> usize {
        return self.get_all_calls.load(Ordering::SeqCst);
    }

    pub fn add_count(&self) -> usize {
        return self.add_calls.load(Ordering::SeqCst);
    }

    pub fn update_count(&self) -> usize {
        return self.update_calls.load(Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        return self.add_count() + self.update_count();
    }

    pub fn set_failing(&self, reads: bool, writes: bool) {
        self.fail_reads.store(reads, Ordering::SeqCst);
        self.fail_writes.store(writes, Ordering::SeqCst);
    }

    pub fn insert(&self, record: RemoteRecord) {
        self.records.insert(record.id.to_string(), record);
    }

    pub fn record_for(&self, local_id: &str) -> Option<RemoteRecord> {
        return self
            .records
            .iter()
            .find(|e| return e.value().local_id == local_id)
            .map(|e| return e.value().clone());
    }

    pub fn len(&self) -> usize {
        return self.records.len();
    }

    /// Edits a record the way another session would, without counting it as
    /// a call.
    pub fn edit_component(&self, local_id: &str, index: usize, data: Value, last_modified: i64) {
        for mut entry in self.records.iter_mut() {
            if entry.local_id != local_id {
                continue;
            }

            if let Some(slot) = entry.data.pointer_mut(&format!("/components/{index}/data")) {
                *slot = data.clone();
            }
            entry.last_modified = last_modified;
        }
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    #[allow(clippy::implicit_return)]
    async fn get_all(&self) -> Result<Vec<RemoteRecord>> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("Collection is unreachable");
        }

        let mut records = self
            .records
            .iter()
            .map(|e| return e.value().clone())
            .collect::<Vec<RemoteRecord>>();
        records.sort_by(|a, b| return a.id.cmp(&b.id));

        return Ok(records);
    }

    #[allow(clippy::implicit_return)]
    async fn add(&self, record: RecordPayload) -> Result<String> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Collection rejected the write");
        }

        let id = format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.records.insert(
            id.to_string(),
            RemoteRecord {
                id: id.to_string(),
                local_id: record.local_id,
                data: record.data,
                last_modified: record.last_modified,
            },
        );

        return Ok(id);
    }

    #[allow(clippy::implicit_return)]
    async fn update(&self, id: &str, record: RecordPayload) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Collection rejected the write");
        }

        if !self.records.contains_key(id) {
            bail!(format!("No record with id {id}"));
        }

        self.records.insert(
            id.to_string(),
            RemoteRecord {
                id: id.to_string(),
                local_id: record.local_id,
                data: record.data,
                last_modified: record.last_modified,
            },
        );

        return Ok(());
    }
}
