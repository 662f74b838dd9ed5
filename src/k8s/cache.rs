//! Watch-fed pod cache with a sync barrier.
//!
//! A background task consumes the pod event stream and keeps a map of
//! [`PodKey`] → [`PodSnapshot`] current. The foreground waits on
//! [`PodCache::wait_for_sync`] once, then answers every selector query from
//! the same local map instead of listing pods per PDB.
//!
//! # Consistency
//!
//! Queries observe a best-effort snapshot: after the barrier releases, the map
//! trails the API server by the watch propagation delay. A relist is staged in
//! a side buffer and swapped in whole, so readers never see a half-built map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::k8s::source::{PodEvent, PodEventStream};
use crate::model::{PodKey, PodSnapshot};
use crate::selector::Selector;

type PodMap = HashMap<PodKey, PodSnapshot>;

/// Progress of the initial list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Synced,
    Failed(String),
    Cancelled,
}

pub struct PodCache {
    store: Arc<RwLock<PodMap>>,
    state: watch::Receiver<SyncState>,
    /// Handed to the consumer on `start`; `None` afterwards.
    state_tx: Mutex<Option<watch::Sender<SyncState>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for PodCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PodCache {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(SyncState::Pending);
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            state: rx,
            state_tx: Mutex::new(Some(tx)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the background consumer for `events`. Returns immediately.
    ///
    /// Must be called from within a tokio runtime, and only once.
    pub fn start(&self, events: PodEventStream, cancel: CancellationToken) -> Result<()> {
        let tx = self
            .state_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyStarted)?;

        let consumer = Consumer {
            store: Arc::clone(&self.store),
            staged: None,
            state: tx,
        };
        let handle = tokio::spawn(consumer.run(events, cancel));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Block until the initial list has been applied.
    pub async fn wait_for_sync(&self, deadline: Duration) -> Result<()> {
        let mut rx = self.state.clone();
        let waited = tokio::time::timeout(
            deadline,
            rx.wait_for(|s| !matches!(s, SyncState::Pending)),
        )
        .await;

        let state = match waited {
            Err(_) => return Err(Error::SyncTimeout(deadline)),
            Ok(Err(_)) => {
                return Err(Error::SyncFailed(
                    "pod cache consumer stopped before the initial list completed".into(),
                ))
            }
            Ok(Ok(state)) => state.clone(),
        };

        match state {
            SyncState::Synced => Ok(()),
            SyncState::Failed(reason) => Err(Error::SyncFailed(reason)),
            SyncState::Cancelled => Err(Error::Cancelled),
            // wait_for only settles on a non-pending state
            SyncState::Pending => Err(Error::SyncTimeout(deadline)),
        }
    }

    pub fn is_synced(&self) -> bool {
        *self.state.borrow() == SyncState::Synced
    }

    /// Every cached pod whose labels satisfy `selector`, in map order.
    pub fn query(&self, selector: &Selector) -> Result<Vec<PodSnapshot>> {
        if !self.is_synced() {
            return Err(Error::NotSynced);
        }
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(store
            .values()
            .filter(|pod| selector.matches_pod(pod))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PodCache {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

// ─── Background consumer ──────────────────────────────────────────────────────

struct Consumer {
    store: Arc<RwLock<PodMap>>,
    /// Pods collected since the last `InitStarted`.
    staged: Option<PodMap>,
    state: watch::Sender<SyncState>,
}

impl Consumer {
    fn synced(&self) -> bool {
        *self.state.borrow() == SyncState::Synced
    }

    async fn run(mut self, mut events: PodEventStream, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("pod cache consumer cancelled");
                    if !self.synced() {
                        self.state.send_replace(SyncState::Cancelled);
                    }
                    return;
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(ev)) => self.apply(ev),
                Some(Err(e)) if self.synced() => {
                    // The watcher backs off and relists on its own.
                    warn!(error = %e, "pod watch error, cache may lag until it recovers");
                }
                Some(Err(e)) => {
                    self.state.send_replace(SyncState::Failed(e.to_string()));
                    return;
                }
                None => {
                    if self.synced() {
                        let closed = Error::StreamClosed("no further pod updates".into());
                        warn!(error = %closed, "pod cache frozen at its last state");
                    } else {
                        let closed =
                            Error::StreamClosed("ended before the initial list completed".into());
                        self.state.send_replace(SyncState::Failed(closed.to_string()));
                    }
                    return;
                }
            }
        }
    }

    fn apply(&mut self, ev: PodEvent) {
        match ev {
            PodEvent::InitStarted => {
                debug!("pod list started");
                self.staged = Some(HashMap::new());
            }
            PodEvent::Added(pod) | PodEvent::Modified(pod) => {
                let key = pod.key();
                match self.staged.as_mut() {
                    Some(staged) => {
                        staged.insert(key, pod);
                    }
                    None => {
                        self.write().insert(key, pod);
                    }
                }
            }
            PodEvent::Deleted(pod) => {
                let key = pod.key();
                match self.staged.as_mut() {
                    Some(staged) => {
                        staged.remove(&key);
                    }
                    None => {
                        self.write().remove(&key);
                    }
                }
            }
            PodEvent::InitDone => {
                if let Some(staged) = self.staged.take() {
                    *self.write() = staged;
                }
                if !self.synced() {
                    let pods = self.store.read().unwrap_or_else(PoisonError::into_inner).len();
                    info!(pods, "pod cache synced");
                    self.state.send_replace(SyncState::Synced);
                }
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PodMap> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}
