//! In-process emulation of a block blob container.
//!
//! Staged blocks, committed block lists, ETags and conditional commits behave like the storage
//! service does, so writers can be exercised without a network. Faults can be injected per
//! operation.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::trace;
use parking_lot::Mutex;

use crate::{
    error::{ErrorKind, StorageError},
    AccessCondition, BlobProperties, BlockStore, CommittedBlob,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListBlobs,
    GetBlockList,
    PutBlock,
    PutBlockList,
}

#[derive(Debug, Default)]
struct Blob {
    staged: HashMap<String, Vec<u8>>,
    committed: Vec<(String, Vec<u8>)>,
    etag: Option<String>,
    last_modified: Option<DateTime<Utc>>,
}

impl Blob {
    fn exists(&self) -> bool {
        self.etag.is_some()
    }

    fn length(&self) -> u64 {
        self.committed.iter().map(|(_, data)| data.len() as u64).sum()
    }
}

#[derive(Debug, Default)]
struct Container {
    blobs: BTreeMap<String, Blob>,
    etag_seq: u64,
    requests: HashMap<Operation, usize>,
    faults: HashMap<Operation, VecDeque<StorageError>>,
    outages: HashMap<Operation, StorageError>,
}

impl Container {
    fn next_etag(&mut self) -> String {
        self.etag_seq += 1;
        format!("\"0x{:016X}\"", self.etag_seq)
    }

    /// Count the request and surface an injected fault, if any.
    fn begin(&mut self, op: Operation) -> Result<(), StorageError> {
        *self.requests.entry(op).or_default() += 1;
        if let Some(error) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if let Some(error) = self.outages.get(&op) {
            return Err(error.clone());
        }
        Ok(())
    }
}

/// Cloning yields another handle to the same container.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockStore {
    inner: Arc<Mutex<Container>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` with `error`. Queued faults are consumed in order.
    pub fn fail_next(&self, op: Operation, error: StorageError) {
        self.inner
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `op` until cleared with `None`.
    pub fn set_outage(&self, op: Operation, error: Option<StorageError>) {
        let mut inner = self.inner.lock();
        match error {
            Some(error) => {
                inner.outages.insert(op, error);
            }
            None => {
                inner.outages.remove(&op);
            }
        }
    }

    /// Number of calls of `op` so far, failed ones included.
    pub fn requests(&self, op: Operation) -> usize {
        self.inner.lock().requests.get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls that could have changed the container.
    pub fn mutations(&self) -> usize {
        self.requests(Operation::PutBlock) + self.requests(Operation::PutBlockList)
    }

    /// Committed content of a blob.
    pub fn download(&self, name: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        let blob = inner.blobs.get(name).filter(|blob| blob.exists())?;
        Some(
            blob.committed
                .iter()
                .flat_map(|(_, data)| data.iter().copied())
                .collect(),
        )
    }

    /// Names of committed blobs, sorted.
    pub fn blob_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .blobs
            .iter()
            .filter(|(_, blob)| blob.exists())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Update the metadata of a committed blob, as an unrelated client would. Content is
    /// unchanged, but the ETag and last-modified time move.
    pub fn touch(&self, name: &str, last_modified: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        let etag = inner.next_etag();
        match inner.blobs.get_mut(name).filter(|blob| blob.exists()) {
            Some(blob) => {
                blob.etag = Some(etag);
                blob.last_modified = Some(last_modified);
                true
            }
            None => false,
        }
    }

    /// Create or overwrite a blob committed as the given blocks.
    pub fn put_blob(&self, name: &str, blocks: &[&[u8]]) -> String {
        let mut inner = self.inner.lock();
        let etag = inner.next_etag();
        let blob = inner.blobs.entry(name.to_owned()).or_default();
        blob.committed = blocks
            .iter()
            .enumerate()
            .map(|(index, data)| (format!("{index:08}"), data.to_vec()))
            .collect();
        blob.staged.clear();
        blob.etag = Some(etag.clone());
        blob.last_modified = Some(Utc::now());
        etag
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobProperties>, StorageError> {
        let mut inner = self.inner.lock();
        inner.begin(Operation::ListBlobs)?;
        let blobs = inner
            .blobs
            .range(prefix.to_owned()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter_map(|(name, blob)| {
                Some(BlobProperties {
                    name: name.clone(),
                    last_modified: blob.last_modified?,
                    length: blob.length(),
                    etag: blob.etag.clone()?,
                })
            })
            .collect();
        Ok(blobs)
    }

    async fn get_block_list(&self, name: &str) -> Result<Option<CommittedBlob>, StorageError> {
        let mut inner = self.inner.lock();
        inner.begin(Operation::GetBlockList)?;
        let committed = inner.blobs.get(name).and_then(|blob| {
            Some(CommittedBlob {
                block_ids: blob.committed.iter().map(|(id, _)| id.clone()).collect(),
                length: blob.length(),
                etag: blob.etag.clone()?,
            })
        });
        Ok(committed)
    }

    async fn put_block(&self, name: &str, block_id: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.begin(Operation::PutBlock)?;
        trace!("Staging block {block_id} of {name}, {} bytes", data.len());
        inner
            .blobs
            .entry(name.to_owned())
            .or_default()
            .staged
            .insert(block_id.to_owned(), data.to_vec());
        Ok(())
    }

    async fn put_block_list(
        &self,
        name: &str,
        block_ids: &[String],
        condition: AccessCondition,
    ) -> Result<String, StorageError> {
        let mut inner = self.inner.lock();
        inner.begin(Operation::PutBlockList)?;
        let etag = inner.next_etag();
        let blob = inner.blobs.entry(name.to_owned()).or_default();

        let satisfied = match &condition {
            AccessCondition::IfMatch(expected) => blob.etag.as_ref() == Some(expected),
            AccessCondition::IfNoneMatchAny => !blob.exists(),
        };
        if !satisfied {
            return Err(StorageError::new(
                ErrorKind::ConcurrencyConflict,
                "ConditionNotMet",
                format!("Condition {condition:?} does not hold for {name}"),
            ));
        }

        let mut committed = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            let data = blob.staged.get(id).cloned().or_else(|| {
                blob.committed
                    .iter()
                    .find(|(committed_id, _)| committed_id == id)
                    .map(|(_, data)| data.clone())
            });
            match data {
                Some(data) => committed.push((id.clone(), data)),
                None => {
                    return Err(StorageError::from_code(
                        "InvalidBlockList",
                        format!("Block {id} of {name} is neither staged nor committed"),
                    ))
                }
            }
        }

        blob.committed = committed;
        blob.staged.clear();
        blob.etag = Some(etag.clone());
        blob.last_modified = Some(Utc::now());
        Ok(etag)
    }
}
