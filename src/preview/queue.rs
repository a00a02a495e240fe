//! Fixed-size worker pool for background preview decoding.
//!
//! - Requests travel over a bounded flume channel; a full queue drops the
//!   request and releases its in-flight claim
//! - Workers insert results with insert-if-absent, so completion order does
//!   not change what ends up cached
//! - Shutdown closes the channel without joining; a decode already running
//!   finishes and its result is discarded

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::cache::PreviewStore;
use super::decoder::{decode_or_placeholder, Decoder};
use crate::error::{CullError, Result};

/// A background decode for one path.
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub path: PathBuf,
    /// Distance from the requested index (0 = the requested image itself).
    pub distance: usize,
}

impl DecodeRequest {
    pub fn new(path: PathBuf, distance: usize) -> Self {
        Self { path, distance }
    }
}

/// Worker queue feeding decoded previews into a `PreviewStore`.
pub struct DecodeQueue {
    /// `None` once shut down.
    request_tx: Mutex<Option<Sender<DecodeRequest>>>,
    /// Worker thread handles, detached on shutdown.
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
    store: PreviewStore,
}

impl DecodeQueue {
    pub fn new(
        workers: usize,
        queue_depth: usize,
        store: PreviewStore,
        decoder: Arc<dyn Decoder>,
    ) -> Result<Self> {
        let num_workers = workers.max(1);
        let (request_tx, request_rx) = flume::bounded(queue_depth.max(1));

        let shutdown = Arc::new(AtomicBool::new(false));
        let active_workers = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let shutdown = Arc::clone(&shutdown);
            let active = Arc::clone(&active_workers);
            let store = store.clone();
            let decoder = Arc::clone(&decoder);

            let handle = thread::Builder::new()
                .name(format!("preview-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, shutdown, active, store, decoder))
                .map_err(CullError::Spawn)?;
            handles.push(handle);
        }

        debug!(num_workers, queue_depth, "Started preview decode workers");

        Ok(Self {
            request_tx: Mutex::new(Some(request_tx)),
            workers: Mutex::new(handles),
            shutdown,
            active_workers,
            store,
        })
    }

    /// Submit a request whose path the caller has already claimed.
    ///
    /// Returns false if the queue is full or shut down; the claim is released.
    pub fn request(&self, req: DecodeRequest) -> bool {
        let guard = self.request_tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.store.release(&req.path);
            return false;
        };

        match tx.try_send(req) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(req)) => {
                warn!(path = ?req.path, "Preview queue full, dropping request");
                self.store.release(&req.path);
                false
            }
            Err(flume::TrySendError::Disconnected(req)) => {
                error!("Preview queue disconnected");
                self.store.release(&req.path);
                false
            }
        }
    }

    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting requests. Does not wait for running decodes.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the only sender wakes idle workers with a disconnect.
        self.request_tx.lock().take();
        let detached = self.workers.lock().drain(..).count();
        debug!(detached, "Preview decode queue shut down");
    }
}

impl Drop for DecodeQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<DecodeRequest>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    store: PreviewStore,
    decoder: Arc<dyn Decoder>,
) {
    debug!(worker_id, "Preview worker started");

    while let Ok(req) = rx.recv() {
        // Drain what is left after shutdown so no claim stays pending.
        if shutdown.load(Ordering::SeqCst) {
            store.release(&req.path);
            continue;
        }

        active.fetch_add(1, Ordering::Relaxed);
        trace!(worker_id, path = ?req.path, distance = req.distance, "Decoding preview");

        let preview = decode_or_placeholder(decoder.as_ref(), &req.path);
        if shutdown.load(Ordering::SeqCst) {
            trace!(path = ?req.path, "Discarding preview decoded after shutdown");
        } else if !store.insert_if_absent(req.path.clone(), preview) {
            trace!(path = ?req.path, "Preview already cached, discarding duplicate");
        }
        // Release only after the insert so a sweep never sees neither.
        store.release(&req.path);

        active.fetch_sub(1, Ordering::Relaxed);
    }

    debug!(worker_id, "Preview worker stopped");
}
