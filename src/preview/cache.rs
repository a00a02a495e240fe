//! Bounded preview cache with windowed background prefetch.
//!
//! - `PreviewStore`: LRU of decoded previews plus the set of paths with a
//!   decode in flight. Entries and recency live in one `LruCache` behind one
//!   lock, so a lookup, insert or eviction is never observed half-applied.
//! - `PreviewCache`: the interactive entry point. `get` decodes synchronously
//!   on a miss and then sweeps the prefetch window into the worker queue.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::decoder::{decode_or_placeholder, Decoder, PreviewImage};
use super::queue::{DecodeQueue, DecodeRequest};
use crate::config::CullConfig;
use crate::error::{CullError, Result};

/// Shared LRU store and in-flight set, cloned into every decode worker.
#[derive(Clone)]
pub struct PreviewStore {
    entries: Arc<Mutex<LruCache<PathBuf, PreviewImage>>>,
    pending: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PreviewStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Look up a preview and mark it most recently used.
    pub fn get(&self, path: &Path) -> Option<PreviewImage> {
        self.entries.lock().get(path).cloned()
    }

    /// Presence check that leaves recency untouched.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().contains(path)
    }

    /// Insert for the interactive path. If another thread populated the slot
    /// first, its preview wins and is returned; either way the entry ends up
    /// most recently used.
    pub fn insert(&self, path: PathBuf, preview: PreviewImage) -> PreviewImage {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&path) {
            return existing.clone();
        }
        if let Some((evicted, _)) = entries.push(path, preview.clone()) {
            trace!(?evicted, "Evicted least recently used preview");
        }
        preview
    }

    /// Insert for prefetch results: an existing entry is never replaced.
    /// Returns `false` when the result was discarded.
    pub fn insert_if_absent(&self, path: PathBuf, preview: PreviewImage) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains(&path) {
            return false;
        }
        if let Some((evicted, _)) = entries.push(path, preview) {
            trace!(?evicted, "Evicted least recently used preview");
        }
        true
    }

    /// Claim `path` for a background decode. `false` means one is already in flight.
    pub fn try_claim(&self, path: &Path) -> bool {
        self.pending.lock().insert(path.to_path_buf())
    }

    pub fn release(&self, path: &Path) {
        self.pending.lock().remove(path);
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Preview cache over a fixed, caller-supplied path list.
pub struct PreviewCache {
    paths: Vec<PathBuf>,
    store: PreviewStore,
    queue: DecodeQueue,
    decoder: Arc<dyn Decoder>,
    preload_ahead: usize,
    preload_behind: usize,
    shut_down: AtomicBool,
}

impl PreviewCache {
    /// Start the worker pool and create an empty cache over `paths`.
    pub fn new(paths: Vec<PathBuf>, decoder: Arc<dyn Decoder>, config: &CullConfig) -> Result<Self> {
        let config = config.clone().validate()?;
        let capacity = NonZeroUsize::new(config.cache_size)
            .ok_or_else(|| CullError::InvalidConfig("cache size must be at least 1".into()))?;

        let store = PreviewStore::new(capacity);
        let queue = DecodeQueue::new(
            config.workers,
            config.queue_depth,
            store.clone(),
            Arc::clone(&decoder),
        )?;

        debug!(
            images = paths.len(),
            capacity = config.cache_size,
            ahead = config.preload_ahead,
            behind = config.preload_behind,
            "Initialized preview cache"
        );

        Ok(Self {
            paths,
            store,
            queue,
            decoder,
            preload_ahead: config.preload_ahead,
            preload_behind: config.preload_behind,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Preview for `paths[index]`, decoding on the calling thread if it is not
    /// cached, then queue the neighbours in the prefetch window.
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn get(&self, index: usize) -> PreviewImage {
        let path = &self.paths[index];

        let preview = match self.store.get(path) {
            Some(hit) => {
                trace!(?path, "Preview cache hit");
                hit
            }
            None => {
                debug!(?path, "Preview cache miss, decoding");
                let decoded = decode_or_placeholder(self.decoder.as_ref(), path);
                self.store.insert(path.clone(), decoded)
            }
        };

        self.prefetch(index);
        preview
    }

    /// Queue background decodes for the window around `center`, nearest first.
    /// Returns the number of requests submitted.
    pub fn prefetch(&self, center: usize) -> usize {
        if self.paths.is_empty() || self.is_shut_down() {
            return 0;
        }

        let start = center.saturating_sub(self.preload_behind);
        let end = center
            .saturating_add(self.preload_ahead)
            .min(self.paths.len() - 1);

        // Ahead before behind at equal distance.
        let mut window: Vec<usize> = (start..=end).filter(|&i| i != center).collect();
        window.sort_by_key(|&i| (i.abs_diff(center), i < center));

        let mut submitted = 0;
        for index in window {
            let path = &self.paths[index];
            if !self.store.try_claim(path) {
                trace!(?path, "Decode already in flight");
                continue;
            }
            if self.store.contains(path) {
                self.store.release(path);
                continue;
            }
            let distance = index.abs_diff(center);
            if self.queue.request(DecodeRequest::new(path.clone(), distance)) {
                submitted += 1;
            }
        }
        submitted
    }

    /// Stop accepting decode work and release the decoder's scratch resources.
    /// In-flight decodes are not awaited.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.shutdown();
        self.decoder.cleanup();
        debug!("Preview cache shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn contains(&self, index: usize) -> bool {
        self.paths
            .get(index)
            .map(|p| self.store.contains(p))
            .unwrap_or(false)
    }

    /// Number of resident previews.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    /// Whether background decodes are queued or running.
    pub fn is_busy(&self) -> bool {
        self.pending_count() > 0 || self.queue.active_worker_count() > 0
    }
}

impl Drop for PreviewCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
