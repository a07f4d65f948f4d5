//! TTL + size-bounded eviction queue for processed-chunk cache files.
//!
//! Records are kept in insertion order; under a fixed TTL that order is also
//! expiry order, so both the sweep and the size cap pop from the front.
//! All queue state lives behind one async mutex, and a record's removal and
//! its file's deletion happen inside the same critical section, so an entry
//! never outlives its file.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::KnowledgeResult;
use crate::models::QueueStats;
use crate::paths::CACHE_BLOB_EXT;

#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub path: PathBuf,
    pub expires_at: Instant,
    pub size_bytes: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<CacheRecord>,
    total_bytes: u64,
}

#[derive(Debug)]
pub struct EvictionQueue {
    cache_dir: PathBuf,
    ttl: Duration,
    max_total_bytes: u64,
    sweep_interval: Duration,
    state: Mutex<QueueState>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl EvictionQueue {
    pub fn new(
        cache_dir: PathBuf,
        ttl: Duration,
        max_total_bytes: u64,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            cache_dir,
            ttl,
            max_total_bytes,
            sweep_interval,
            state: Mutex::new(QueueState::default()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory and load cache files that already exist,
    /// oldest first, with expiry derived from their mtime. Returns how many
    /// were picked up.
    pub async fn load_existing(&self) -> KnowledgeResult<usize> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let mut found: Vec<(PathBuf, Duration, u64)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CACHE_BLOB_EXT) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .unwrap_or_default();
            found.push((path, age, metadata.len()));
        }

        // oldest first, so queue order stays expiry order
        found.sort_by_key(|(_, age, _)| std::cmp::Reverse(*age));

        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut loaded = 0;
        for (path, age, size) in found {
            if state.records.iter().any(|record| record.path == path) {
                continue;
            }
            state.records.push_back(CacheRecord {
                path,
                expires_at: now + self.ttl.saturating_sub(age),
                size_bytes: size,
            });
            state.total_bytes += size;
            loaded += 1;
        }
        drop(state);

        info!("loaded {loaded} existing cache file(s)");
        Ok(loaded)
    }

    /// Track a cache file: expiry is `now + ttl`, and the size bound is
    /// enforced immediately: while the total exceeds the maximum, the
    /// oldest-inserted record is evicted (file deleted) regardless of its
    /// own expiry.
    pub async fn add_file(&self, path: &Path) -> KnowledgeResult<()> {
        let size = tokio::fs::metadata(path).await?.len();

        let mut state = self.state.lock().await;
        if state.records.iter().any(|record| record.path == path) {
            debug!("file already in cache queue: {}", path.display());
            return Ok(());
        }

        state.records.push_back(CacheRecord {
            path: path.to_path_buf(),
            expires_at: Instant::now() + self.ttl,
            size_bytes: size,
        });
        state.total_bytes += size;
        debug!("added file to cache queue: {} ({size} bytes)", path.display());

        while state.total_bytes > self.max_total_bytes {
            let Some(record) = state.records.pop_front() else {
                break;
            };
            state.total_bytes -= record.size_bytes;
            remove_cache_file(&record.path).await;
            info!(
                "evicted oldest cache file to hold size bound: {} ({} bytes)",
                record.path.display(),
                record.size_bytes
            );
        }

        Ok(())
    }

    /// Stop tracking a path without deleting the underlying file, used when
    /// a cache file is claimed back into active use.
    pub async fn remove_file(&self, path: &Path) {
        let mut state = self.state.lock().await;
        let before = state.records.len();
        let mut reclaimed = 0;
        state.records.retain(|record| {
            if record.path == path {
                reclaimed += record.size_bytes;
                false
            } else {
                true
            }
        });
        let removed = before - state.records.len();
        state.total_bytes -= reclaimed;
        if removed > 0 {
            debug!("removed {removed} tracked instance(s) of {}", path.display());
        }
    }

    /// Synchronously sweep every expired record, deleting its file. Returns
    /// the count removed. Front-popping suffices: insertion order is expiry
    /// order under a fixed TTL.
    pub async fn cleanup_expired_now(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut removed = 0;
        while state
            .records
            .front()
            .is_some_and(|record| record.expires_at <= now)
        {
            let Some(record) = state.records.pop_front() else {
                break;
            };
            state.total_bytes -= record.size_bytes;
            remove_cache_file(&record.path).await;
            info!(
                "removed expired cache file: {} ({} bytes)",
                record.path.display(),
                record.size_bytes
            );
            removed += 1;
        }
        removed
    }

    /// Read-only queue snapshot.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let now = Instant::now();
        let next_expiry_in = state
            .records
            .iter()
            .map(|record| record.expires_at)
            .min()
            .map(|soonest| soonest.saturating_duration_since(now));

        QueueStats {
            total_files: state.records.len(),
            total_size: state.total_bytes,
            max_size: self.max_total_bytes,
            next_expiry_in,
        }
    }

    /// Spawn the owned background sweep task. Idempotent: a second call
    /// while a sweeper runs is a no-op.
    pub async fn start_sweeper(self: Arc<Self>) {
        let mut slot = self.sweeper.lock().await;
        if slot.is_some() {
            return;
        }

        let queue = Arc::clone(&self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = queue.cleanup_expired_now().await;
                if removed > 0 {
                    debug!("sweep removed {removed} expired cache file(s)");
                }
            }
        }));
        info!("cache eviction sweeper started");
    }

    /// Stop the background sweep task if one is running.
    pub async fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
            info!("cache eviction sweeper stopped");
        }
    }
}

/// Delete a cache file from disk. A file already gone is success (another
/// path may have claimed or removed it), logged at debug level.
async fn remove_cache_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("cache file already removed: {}", path.display());
        }
        Err(err) => {
            warn!("failed to remove cache file {}: {err}", path.display());
        }
    }
}
