//! In-flight request registry
//!
//! At most one network fetch runs per key. The first request for a key
//! becomes the leader and starts the fetch; requests arriving while it runs
//! join as waiters. When the fetch finishes, its single outcome is sent to
//! every waiter and the key returns to idle.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::app::image::Image;
use crate::app::key::CacheKey;
use crate::errors::RequestError;

/// Result delivered to every waiter of one fetch
pub type Outcome = Result<Image, RequestError>;

/// Lifecycle of requests for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestState {
    /// No fetch running and none remembered
    Idle,
    /// A network fetch is in flight
    Fetching,
    /// The last fetch produced an image
    Succeeded,
    /// The last fetch failed
    Failed,
}

/// How a request was admitted
#[derive(Debug)]
pub enum Registration {
    /// Memory was populated while the caller was checking disk
    Ready(Image),
    /// A fetch for the key is already running; await its outcome
    Joined(oneshot::Receiver<Outcome>),
    /// No fetch was running; the caller must start one
    Leader(oneshot::Receiver<Outcome>),
}

#[derive(Debug)]
struct PendingState {
    waiters: HashMap<CacheKey, Vec<oneshot::Sender<Outcome>>>,
    history: LruCache<CacheKey, RequestState>,
}

/// Registry of keys with a fetch in flight
#[derive(Debug)]
pub struct PendingRequests {
    state: Mutex<PendingState>,
}

impl PendingRequests {
    /// Create a registry remembering up to `history` finished states
    pub fn new(history: usize) -> Self {
        let capacity = NonZeroUsize::new(history).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(PendingState {
                waiters: HashMap::new(),
                history: LruCache::new(capacity),
            }),
        }
    }

    /// Admit a request for `key`
    ///
    /// `recheck` runs inside the registry lock when no fetch is in flight; if
    /// it finds an image, no fetch is started. The check and the insertion
    /// are one critical section, so concurrent callers cannot both lead.
    pub fn register<F>(&self, key: &CacheKey, recheck: F) -> Registration
    where
        F: FnOnce() -> Option<Image>,
    {
        let mut state = self.state.lock();
        let (tx, rx) = oneshot::channel();

        if let Some(waiters) = state.waiters.get_mut(key) {
            waiters.push(tx);
            trace!("Joined in-flight fetch for {} ({} waiters)", key, waiters.len());
            return Registration::Joined(rx);
        }

        if let Some(image) = recheck() {
            return Registration::Ready(image);
        }

        state.waiters.insert(key.clone(), vec![tx]);
        state.history.pop(key);
        Registration::Leader(rx)
    }

    /// Deliver the outcome of a key's fetch to all its waiters
    ///
    /// Returns the number of waiters still listening.
    pub fn complete(&self, key: &CacheKey, outcome: Outcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            let final_state = if outcome.is_ok() {
                RequestState::Succeeded
            } else {
                RequestState::Failed
            };
            state.history.put(key.clone(), final_state);
            state.waiters.remove(key).unwrap_or_default()
        };

        let total = waiters.len();
        let delivered = waiters
            .into_iter()
            .map(|tx| tx.send(outcome.clone()).is_ok())
            .filter(|sent| *sent)
            .count();

        if delivered < total {
            debug!("{} of {} waiters for {} went away", total - delivered, total, key);
        }
        delivered
    }

    /// Current state of a key
    pub fn state(&self, key: &CacheKey) -> RequestState {
        let state = self.state.lock();
        if state.waiters.contains_key(key) {
            return RequestState::Fetching;
        }
        state.history.peek(key).copied().unwrap_or(RequestState::Idle)
    }

    /// Number of keys with a fetch in flight
    pub fn in_flight(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

/// Ensures waiters hear back even if the fetch task never finishes normally
///
/// Dropping the guard without calling [`CompletionGuard::complete`] (task
/// panicked or was cancelled at runtime shutdown) fails every waiter with
/// [`RequestError::Abandoned`].
#[derive(Debug)]
pub struct CompletionGuard {
    pending: Arc<PendingRequests>,
    key: CacheKey,
    done: bool,
}

impl CompletionGuard {
    /// Guard the in-flight fetch for `key`
    pub fn new(pending: Arc<PendingRequests>, key: CacheKey) -> Self {
        Self {
            pending,
            key,
            done: false,
        }
    }

    /// Deliver the outcome and disarm the guard
    pub fn complete(mut self, outcome: Outcome) -> usize {
        self.done = true;
        self.pending.complete(&self.key, outcome)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.done {
            let error = RequestError::Abandoned {
                key: self.key.clone(),
            };
            self.pending.complete(&self.key, Err(error));
        }
    }
}
