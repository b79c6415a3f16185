use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use config::{error::ConfigurationError, CurrentBlobSelection};
use futures::future::join_all;
use log::{debug, error, info, warn};
use model::Block;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{StorageError, WriteError},
    AccessCondition, BlobWriter, BlockStore, NamingStrategy,
};

/// Cached view of the blob currently appended to.
#[derive(Debug)]
struct LogObjectState {
    prefix: String,
    sequence: u32,
    name: String,
    block_ids: Vec<String>,
    size_remaining: u64,

    /// `None` until the blob is first committed.
    etag: Option<String>,
}

impl LogObjectState {
    fn has_room(&self, size: u64, blocks: usize, blocks_allowed: usize) -> bool {
        self.size_remaining >= size && self.block_ids.len() + blocks <= blocks_allowed
    }
}

/// Failed block puts of one write, grouped for logging.
#[derive(Debug, Default)]
struct PutFailures<'a> {
    /// First failure of each distinct hard error code.
    hard: Vec<&'a StorageError>,
    other: Vec<&'a StorageError>,
    conflicts: usize,
}

impl<'a> PutFailures<'a> {
    fn classify(failures: &'a [StorageError]) -> Self {
        let mut hard_codes = HashSet::new();
        let mut classified = Self::default();
        for e in failures {
            if e.is_hard() {
                if hard_codes.insert(e.code.as_str()) {
                    classified.hard.push(e);
                }
            } else if e.is_conflict() {
                classified.conflicts += 1;
            } else {
                classified.other.push(e);
            }
        }
        classified
    }
}

/// Block ids are the zero-padded position of the block in its blob, so re-staging a block at
/// the same position replaces it.
fn block_id(index: usize) -> String {
    format!("{index:08}")
}

/// Appends batches of blocks to `<prefix><sequence>` blobs, moving to the next sequence when
/// the current blob runs out of bytes or blocks.
///
/// Commits are conditional on the ETag last seen, so a second writer appending to the same blob
/// makes this one fail, forget what it cached and reload on the next write.
pub struct RollingBlobWriter<S: BlockStore + ?Sized, N: NamingStrategy> {
    log_ident: String,
    store: Arc<S>,
    naming: N,
    container: String,
    roll_size: u64,
    blocks_allowed: usize,
    block_size: usize,
    selection: CurrentBlobSelection,
    state: Option<LogObjectState>,
}

impl<S, N> RollingBlobWriter<S, N>
where
    S: BlockStore + ?Sized,
    N: NamingStrategy,
{
    pub fn new(
        partition_id: &str,
        store: Arc<S>,
        naming: N,
        config: &config::BlobWriter,
    ) -> Result<Self, ConfigurationError> {
        config.check()?;
        Ok(Self {
            log_ident: format!("BlobWriter[{}#{}] ", config.container, partition_id),
            store,
            naming,
            container: config.container.clone(),
            roll_size: config.roll_size_bytes(),
            blocks_allowed: config.blocks_allowed,
            block_size: config.block_size,
            selection: config.current_blob_selection,
            state: None,
        })
    }

    /// Name of the blob the next write goes to, if it is known already.
    pub fn current_blob(&self) -> Option<&str> {
        self.state.as_ref().map(|state| state.name.as_str())
    }

    fn validate(&self, blocks: &[&Block]) -> Result<u64, WriteError> {
        if blocks.len() > self.blocks_allowed {
            return Err(WriteError::TooManyBlocks {
                count: blocks.len(),
                allowed: self.blocks_allowed,
            });
        }

        let mut total = 0;
        for (index, block) in blocks.iter().enumerate() {
            if block.len() > self.block_size {
                return Err(WriteError::BlockTooLarge {
                    index,
                    len: block.len(),
                    block_size: self.block_size,
                });
            }
            total += block.len() as u64;
        }

        if total > self.roll_size {
            return Err(WriteError::RollSizeExceeded {
                total,
                roll_size: self.roll_size,
            });
        }
        Ok(total)
    }

    /// Sequence of the blob to resume appending to, 0 if nothing exists under the prefix.
    async fn current_sequence(&self, prefix: &str) -> Result<u32, StorageError> {
        let blobs = self.store.list_blobs(prefix).await?;
        let candidates = blobs.iter().filter_map(|blob| {
            let sequence = blob.name.strip_prefix(prefix)?.parse::<u32>().ok()?;
            Some((sequence, blob))
        });
        let sequence = match self.selection {
            CurrentBlobSelection::HighestSequence => candidates.map(|(sequence, _)| sequence).max(),
            CurrentBlobSelection::LastModified => candidates
                .max_by_key(|(_, blob)| blob.last_modified)
                .map(|(sequence, _)| sequence),
        };
        Ok(sequence.unwrap_or(0))
    }

    async fn load(&self, prefix: &str, sequence: u32) -> Result<LogObjectState, StorageError> {
        let name = format!("{prefix}{sequence}");
        let state = match self.store.get_block_list(&name).await? {
            Some(committed) => LogObjectState {
                prefix: prefix.to_owned(),
                sequence,
                name,
                block_ids: committed.block_ids,
                size_remaining: self.roll_size.saturating_sub(committed.length),
                etag: Some(committed.etag),
            },
            None => LogObjectState {
                prefix: prefix.to_owned(),
                sequence,
                name,
                block_ids: vec![],
                size_remaining: self.roll_size,
                etag: None,
            },
        };
        Ok(state)
    }

    /// Resolve the blob a batch of `size` bytes in `blocks` blocks goes to, rolling over as
    /// many times as needed.
    async fn prepare(
        &self,
        cached: Option<LogObjectState>,
        prefix: &str,
        size: u64,
        blocks: usize,
    ) -> Result<LogObjectState, StorageError> {
        let mut state = match cached {
            Some(state) if state.prefix == prefix => state,
            _ => {
                let sequence = self.current_sequence(prefix).await?;
                self.load(prefix, sequence).await?
            }
        };

        while !state.has_room(size, blocks, self.blocks_allowed) {
            let next = self.load(prefix, state.sequence + 1).await?;
            info!(
                "{}Rolled over from {} to {}",
                self.log_ident, state.name, next.name
            );
            state = next;
        }
        Ok(state)
    }

    fn log_storage_error(&self, e: &StorageError) {
        if e.is_hard() {
            error!(
                "{}Hard storage error writing to container {}, operator action required: {e}",
                self.log_ident, self.container
            );
        } else {
            warn!(
                "{}Storage error writing to container {}: {e}",
                self.log_ident, self.container
            );
        }
    }

    /// Log failed block puts, one line per distinct hard error code. Returns true if any of
    /// them was a concurrency conflict.
    fn log_put_failures(&self, failures: &[StorageError], name: &str) -> bool {
        let failures = PutFailures::classify(failures);
        for e in failures.hard.iter().chain(&failures.other) {
            self.log_storage_error(e);
        }
        if failures.conflicts > 0 {
            error!(
                "{}ETag mismatch on {name} for {} blocks",
                self.log_ident, failures.conflicts
            );
        }
        failures.conflicts > 0
    }
}

#[async_trait]
impl<S, N> BlobWriter for RollingBlobWriter<S, N>
where
    S: BlockStore + ?Sized,
    N: NamingStrategy,
{
    async fn write(
        &mut self,
        blocks: &[&Block],
        token: &CancellationToken,
    ) -> Result<bool, WriteError> {
        let total = self.validate(blocks)?;
        if blocks.is_empty() {
            return Ok(true);
        }
        let start = Instant::now();

        let prefix = self.naming.name_prefix();
        let cached = self.state.take();
        let prepared = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            prepared = self.prepare(cached, &prefix, total, blocks.len()) => Some(prepared),
        };
        let mut state = match prepared {
            None => return Err(WriteError::Cancelled),
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                self.log_storage_error(&e);
                return Ok(false);
            }
        };

        debug!(
            "{}Writing {} blocks, {total} bytes, to {} which holds {} blocks",
            self.log_ident,
            blocks.len(),
            state.name,
            state.block_ids.len()
        );

        let base = state.block_ids.len();
        let mut block_ids = state.block_ids.clone();
        block_ids.extend((base..base + blocks.len()).map(block_id));

        let puts = blocks
            .iter()
            .zip(&block_ids[base..])
            .map(|(block, id)| self.store.put_block(&state.name, id, block.data()));
        let results = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            results = join_all(puts) => Some(results),
        };
        let Some(results) = results else {
            self.state = Some(state);
            return Err(WriteError::Cancelled);
        };

        let failures = results
            .into_iter()
            .filter_map(Result::err)
            .collect::<Vec<_>>();
        if !failures.is_empty() {
            error!(
                "{}Failed to write {} blocks, {total} bytes, to {}",
                self.log_ident,
                blocks.len(),
                state.name
            );
            if !self.log_put_failures(&failures, &state.name) {
                self.state = Some(state);
            }
            return Ok(false);
        }

        let condition = match &state.etag {
            Some(etag) => AccessCondition::IfMatch(etag.clone()),
            None => AccessCondition::IfNoneMatchAny,
        };
        let committed = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            committed = self.store.put_block_list(&state.name, &block_ids, condition) => Some(committed),
        };

        // Once the commit has been sent its outcome is unknown, so a cancelled commit leaves
        // nothing cached.
        match committed {
            None => Err(WriteError::Cancelled),
            Some(Ok(etag)) => {
                state.block_ids = block_ids;
                state.size_remaining -= total;
                state.etag = Some(etag);
                debug!(
                    "{}Committed {}, now {} blocks, in {:?}",
                    self.log_ident,
                    state.name,
                    state.block_ids.len(),
                    start.elapsed()
                );
                self.state = Some(state);
                Ok(true)
            }
            Some(Err(e)) if e.is_conflict() => {
                error!(
                    "{}ETag mismatch on {}, another writer advanced it",
                    self.log_ident, state.name
                );
                Ok(false)
            }
            Some(Err(e)) => {
                self.log_storage_error(&e);
                self.state = Some(state);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        error::Error,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use config::{error::ConfigurationError, CurrentBlobSelection, MEGA_BYTES};
    use model::Block;
    use tokio_util::sync::CancellationToken;

    use super::{PutFailures, RollingBlobWriter};
    use crate::{
        error::{StorageError, WriteError},
        memory::Operation,
        naming::FixedNamingStrategy,
        AccessCondition, BlobProperties, BlobWriter, BlockStore, CommittedBlob, MemoryBlockStore,
        MockBlockStore,
    };

    const PREFIX: &str = "prefix/";
    const BLOCKS_ALLOWED: usize = 6;
    const BLOCK_SIZE: usize = MEGA_BYTES as usize;

    fn writer_config() -> config::BlobWriter {
        config::BlobWriter {
            container: "test".to_owned(),
            roll_size_mb: 1,
            blocks_allowed: BLOCKS_ALLOWED,
            block_size: BLOCK_SIZE,
            ..Default::default()
        }
    }

    fn writer<S: BlockStore>(store: S) -> RollingBlobWriter<S, FixedNamingStrategy> {
        RollingBlobWriter::new(
            "0",
            Arc::new(store),
            FixedNamingStrategy(PREFIX.to_owned()),
            &writer_config(),
        )
        .unwrap()
    }

    fn payload(c: char, len: usize) -> Block {
        Block::from_data(c.to_string().repeat(len).as_bytes())
    }

    async fn write(
        writer: &mut RollingBlobWriter<MemoryBlockStore, FixedNamingStrategy>,
        blocks: &[Block],
    ) -> Result<bool, WriteError> {
        let blocks = blocks.iter().collect::<Vec<_>>();
        writer.write(&blocks, &CancellationToken::new()).await
    }

    fn text(store: &MemoryBlockStore, name: &str) -> Option<String> {
        store
            .download(name)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Cancels `token` while staging blocks once armed, so the commit that follows is cut off.
    struct CancelOnPut {
        inner: MemoryBlockStore,
        token: CancellationToken,
        armed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BlockStore for CancelOnPut {
        async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobProperties>, StorageError> {
            self.inner.list_blobs(prefix).await
        }

        async fn get_block_list(&self, name: &str) -> Result<Option<CommittedBlob>, StorageError> {
            self.inner.get_block_list(name).await
        }

        async fn put_block(
            &self,
            name: &str,
            block_id: &str,
            data: &[u8],
        ) -> Result<(), StorageError> {
            if self.armed.load(Ordering::SeqCst) {
                self.token.cancel();
            }
            self.inner.put_block(name, block_id, data).await
        }

        async fn put_block_list(
            &self,
            name: &str,
            block_ids: &[String],
            condition: AccessCondition,
        ) -> Result<String, StorageError> {
            self.inner.put_block_list(name, block_ids, condition).await
        }
    }

    #[tokio::test]
    async fn test_write_single_block() -> Result<(), Box<dyn Error>> {
        ulog::try_init_log();
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        assert!(write(&mut writer, &[payload('a', 50)]).await?);
        assert_eq!(Some("a".repeat(50)), text(&store, "prefix/0"));
        assert_eq!(Some("prefix/0"), writer.current_blob());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_blocks_in_order() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        assert!(write(&mut writer, &[payload('a', 50), payload('b', 50)]).await?);
        assert!(write(&mut writer, &[payload('c', 50), payload('d', 50)]).await?);
        assert_eq!(
            Some(["a", "b", "c", "d"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );
        assert_eq!(vec!["prefix/0".to_owned()], store.blob_names());
        Ok(())
    }

    #[tokio::test]
    async fn test_roll_over_block_limit() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        let first = ['a', 'b', 'c', 'd'].map(|c| payload(c, 50));
        let second = ['b', 'c', 'd'].map(|c| payload(c, 50));
        assert!(write(&mut writer, &first).await?);
        assert!(write(&mut writer, &second).await?);
        assert_eq!(
            Some(["a", "b", "c", "d"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );
        assert_eq!(
            Some(["b", "c", "d"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/1")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_roll_over_size_limit() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        let first = ['a', 'b', 'c', 'd'].map(|c| payload(c, 50));
        assert!(write(&mut writer, &first).await?);
        assert!(write(&mut writer, &[payload('e', BLOCK_SIZE - 10)]).await?);
        assert_eq!(
            Some(["a", "b", "c", "d"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );
        assert_eq!(Some("e".repeat(BLOCK_SIZE - 10)), text(&store, "prefix/1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_append_to_existing_blob() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        store.put_blob("prefix/0", &[b"existing"]);
        let mut writer = writer(store.clone());
        assert!(write(&mut writer, &[payload('a', 50)]).await?);
        assert_eq!(
            Some(format!("existing{}", "a".repeat(50))),
            text(&store, "prefix/0")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_roll_past_full_existing_blobs() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let full = vec![b'x'; BLOCK_SIZE - 100];
        store.put_blob("prefix/0", &[b"old"]);
        store.put_blob("prefix/1", &[full.as_slice()]);
        let mut writer = writer(store.clone());

        // Only 100 bytes remain in the latest blob
        assert!(write(&mut writer, &[payload('a', 50)]).await?);
        assert_eq!(BLOCK_SIZE - 50, text(&store, "prefix/1").map_or(0, |s| s.len()));

        assert!(write(&mut writer, &[payload('b', 60)]).await?);
        assert_eq!(Some("b".repeat(60)), text(&store, "prefix/2"));
        assert_eq!(Some("old".to_owned()), text(&store, "prefix/0"));
        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_resets_writer() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        assert!(write(&mut writer, &[payload('a', 50), payload('b', 50)]).await?);

        assert!(store.touch("prefix/0", Utc::now()));
        assert!(!write(&mut writer, &[payload('c', 50), payload('d', 50)]).await?);
        assert_eq!(None, writer.current_blob());
        assert_eq!(
            Some(["a", "b"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );

        let retry = [payload('c', 50), payload('d', 50), payload('b', 50)];
        assert!(write(&mut writer, &retry).await?);
        assert_eq!(
            Some(["a", "b", "c", "d", "b"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_second_writer() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut first = writer(store.clone());
        let mut second = writer(store.clone());
        assert!(write(&mut first, &[payload('a', 10)]).await?);
        assert!(write(&mut second, &[payload('b', 10)]).await?);
        assert!(!write(&mut first, &[payload('c', 10)]).await?);
        assert!(write(&mut first, &[payload('c', 10)]).await?);
        assert_eq!(
            Some(["a", "b", "c"].map(|s| s.repeat(10)).concat()),
            text(&store, "prefix/0")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_performs_no_requests() {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());

        let too_many = (0..BLOCKS_ALLOWED + 1)
            .map(|_| payload('a', 1))
            .collect::<Vec<_>>();
        assert_eq!(
            Err(WriteError::TooManyBlocks {
                count: 7,
                allowed: 6
            }),
            write(&mut writer, &too_many).await
        );

        let oversized = Block::from_data(&vec![b'a'; BLOCK_SIZE + 1]);
        assert!(matches!(
            write(&mut writer, &[oversized]).await,
            Err(WriteError::BlockTooLarge { index: 0, .. })
        ));

        let big = [payload('a', BLOCK_SIZE), payload('b', 1)];
        assert_eq!(
            Err(WriteError::RollSizeExceeded {
                total: BLOCK_SIZE as u64 + 1,
                roll_size: BLOCK_SIZE as u64
            }),
            write(&mut writer, &big).await
        );

        assert_eq!(0, store.requests(Operation::ListBlobs));
        assert_eq!(0, store.mutations());
    }

    #[tokio::test]
    async fn test_put_failure_leaves_blob_unchanged() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        assert!(write(&mut writer, &[payload('a', 50)]).await?);

        store.fail_next(
            Operation::PutBlock,
            StorageError::from_code("ServerBusy", "injected"),
        );
        assert!(!write(&mut writer, &[payload('b', 50), payload('c', 50)]).await?);
        assert_eq!(Some("a".repeat(50)), text(&store, "prefix/0"));
        assert_eq!(1, store.requests(Operation::PutBlockList));

        // Cached state survives a transient fault
        assert_eq!(Some("prefix/0"), writer.current_blob());
        assert!(write(&mut writer, &[payload('b', 50), payload('c', 50)]).await?);
        assert_eq!(
            Some(["a", "b", "c"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_put_conflict_resets_writer() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        assert!(write(&mut writer, &[payload('a', 50)]).await?);

        store.fail_next(
            Operation::PutBlock,
            StorageError::from_code("ConditionNotMet", "injected"),
        );
        assert!(!write(&mut writer, &[payload('b', 50), payload('c', 50)]).await?);
        assert_eq!(None, writer.current_blob());
        assert_eq!(1, store.requests(Operation::PutBlockList));
        assert_eq!(Some("a".repeat(50)), text(&store, "prefix/0"));

        // The next write reloads the blob before appending
        let lists = store.requests(Operation::ListBlobs);
        assert!(write(&mut writer, &[payload('b', 50), payload('c', 50)]).await?);
        assert_eq!(lists + 1, store.requests(Operation::ListBlobs));
        assert_eq!(
            Some(["a", "b", "c"].map(|s| s.repeat(50)).concat()),
            text(&store, "prefix/0")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_commit_drops_state() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let token = CancellationToken::new();
        let armed = Arc::new(AtomicBool::new(false));
        let mut writer = writer(CancelOnPut {
            inner: store.clone(),
            token: token.clone(),
            armed: Arc::clone(&armed),
        });

        let first = payload('a', 10);
        assert!(writer.write(&[&first], &token).await?);
        assert_eq!(Some("prefix/0"), writer.current_blob());

        armed.store(true, Ordering::SeqCst);
        let second = payload('b', 10);
        assert_eq!(
            Err(WriteError::Cancelled),
            writer.write(&[&second], &token).await
        );
        assert_eq!(None, writer.current_blob());
        assert_eq!(1, store.requests(Operation::PutBlockList));
        assert_eq!(Some("a".repeat(10)), text(&store, "prefix/0"));

        armed.store(false, Ordering::SeqCst);
        assert!(writer.write(&[&second], &CancellationToken::new()).await?);
        assert_eq!(
            Some(["a", "b"].map(|s| s.repeat(10)).concat()),
            text(&store, "prefix/0")
        );
        Ok(())
    }

    #[test]
    fn test_put_failures_keep_one_per_hard_code() {
        let failures = [
            StorageError::from_code("AuthenticationFailed", "denied"),
            StorageError::from_code("ServerBusy", "busy"),
            StorageError::from_code("AuthenticationFailed", "denied"),
            StorageError::from_code("ContainerNotFound", "gone"),
            StorageError::from_code("ConditionNotMet", "etag"),
            StorageError::from_code("AuthenticationFailed", "denied"),
            StorageError::from_code("ServerBusy", "busy"),
        ];
        let classified = PutFailures::classify(&failures);
        let hard_codes = classified
            .hard
            .iter()
            .map(|e| e.code.as_str())
            .collect::<Vec<_>>();
        assert_eq!(vec!["AuthenticationFailed", "ContainerNotFound"], hard_codes);
        assert_eq!(2, classified.other.len());
        assert_eq!(1, classified.conflicts);

        assert!(PutFailures::classify(&[]).hard.is_empty());
    }

    #[tokio::test]
    async fn test_hard_commit_failure() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        store.set_outage(
            Operation::PutBlockList,
            Some(StorageError::from_code("ContainerNotFound", "injected")),
        );
        assert!(!write(&mut writer, &[payload('a', 50)]).await?);
        assert!(!write(&mut writer, &[payload('a', 50)]).await?);
        assert!(store.blob_names().is_empty());

        store.set_outage(Operation::PutBlockList, None);
        assert!(write(&mut writer, &[payload('a', 50)]).await?);
        assert_eq!(Some("a".repeat(50)), text(&store, "prefix/0"));
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_failure() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        store.fail_next(
            Operation::ListBlobs,
            StorageError::from_code("OperationTimedOut", "injected"),
        );
        assert!(!write(&mut writer, &[payload('a', 50)]).await?);
        assert_eq!(0, store.mutations());
        assert!(write(&mut writer, &[payload('a', 50)]).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_current_blob_selection() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        store.put_blob("prefix/0", &[b"zero"]);
        store.put_blob("prefix/1", &[b"one"]);
        store.put_blob("prefix/other", &[b"ignored"]);
        // An unrelated client touches the older blob
        assert!(store.touch("prefix/0", Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()));

        let mut highest = writer(store.clone());
        assert!(write(&mut highest, &[payload('h', 1)]).await?);
        assert_eq!(Some("oneh".to_owned()), text(&store, "prefix/1"));

        let config = config::BlobWriter {
            current_blob_selection: CurrentBlobSelection::LastModified,
            ..writer_config()
        };
        let mut last_modified = RollingBlobWriter::new(
            "0",
            Arc::new(store.clone()),
            FixedNamingStrategy(PREFIX.to_owned()),
            &config,
        )?;
        assert!(write(&mut last_modified, &[payload('l', 1)]).await?);
        assert_eq!(Some("zerol".to_owned()), text(&store, "prefix/0"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_before_write() -> Result<(), Box<dyn Error>> {
        let store = MemoryBlockStore::new();
        let mut writer = writer(store.clone());
        let token = CancellationToken::new();
        token.cancel();
        let block = payload('a', 10);
        assert_eq!(
            Err(WriteError::Cancelled),
            writer.write(&[&block], &token).await
        );
        assert_eq!(0, store.mutations());
        Ok(())
    }

    #[tokio::test]
    async fn test_hard_put_errors_with_mock() -> Result<(), Box<dyn Error>> {
        let mut store = MockBlockStore::new();
        store.expect_list_blobs().times(1).returning(|_| Ok(vec![]));
        store.expect_get_block_list().times(1).returning(|_| Ok(None));
        store
            .expect_put_block()
            .times(3)
            .returning(|_, _, _| Err(StorageError::from_code("AuthenticationFailed", "denied")));
        store.expect_put_block_list().never();

        let mut writer = writer(store);
        let blocks = [payload('a', 1), payload('b', 1), payload('c', 1)];
        let blocks = blocks.iter().collect::<Vec<_>>();
        assert!(!writer.write(&blocks, &CancellationToken::new()).await?);
        assert_eq!(Some("prefix/0"), writer.current_blob());
        Ok(())
    }

    #[test]
    fn test_constructor_guards() {
        let store = Arc::new(MemoryBlockStore::new());
        let naming = || FixedNamingStrategy(PREFIX.to_owned());

        let config = config::BlobWriter {
            blocks_allowed: 0,
            ..writer_config()
        };
        assert!(matches!(
            RollingBlobWriter::new("0", Arc::clone(&store), naming(), &config),
            Err(ConfigurationError::OutOfRange { .. })
        ));

        let config = config::BlobWriter {
            block_size: 1024,
            ..writer_config()
        };
        assert!(matches!(
            RollingBlobWriter::new("0", Arc::clone(&store), naming(), &config),
            Err(ConfigurationError::RollSizeTooLarge { .. })
        ));

        let config = config::BlobWriter {
            roll_size_mb: 0,
            ..writer_config()
        };
        assert!(RollingBlobWriter::new("0", store, naming(), &config).is_err());
    }
}
