//! Binding of image requests to reusable display slots
//!
//! A list view recycles its cells: by the time an image for row 3 arrives,
//! the cell may already show row 40. A [`SlotBinding`] remembers which
//! request a slot currently wants. Each request takes a [`SlotTicket`], and
//! a result is only applied when its ticket is still the current one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;
use url::Url;

use crate::app::facade::ImageCache;
use crate::app::image::Image;
use crate::app::key::CacheKey;
use crate::errors::RequestError;

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    current: Option<CacheKey>,
}

/// Proof of which request a slot asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTicket {
    generation: u64,
    key: CacheKey,
}

impl SlotTicket {
    /// Key the ticket was issued for
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// Current-request token for one display slot
#[derive(Debug, Default)]
pub struct SlotBinding {
    state: Mutex<SlotState>,
}

impl SlotBinding {
    /// Create a binding with no current request
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding any earlier one
    pub fn begin(&self, key: CacheKey) -> SlotTicket {
        let mut state = self.state.lock();
        state.generation += 1;
        state.current = Some(key.clone());
        SlotTicket {
            generation: state.generation,
            key,
        }
    }

    /// True while no later request or reset has replaced the ticket
    pub fn is_current(&self, ticket: &SlotTicket) -> bool {
        let state = self.state.lock();
        state.generation == ticket.generation && state.current.as_ref() == Some(&ticket.key)
    }

    /// Consume a current ticket; returns false for stale tickets
    ///
    /// A settled slot keeps showing its key until the next `begin` or `reset`.
    pub fn settle(&self, ticket: &SlotTicket) -> bool {
        let mut state = self.state.lock();
        if state.generation != ticket.generation {
            return false;
        }
        // Bump so the same ticket cannot settle twice
        state.generation += 1;
        true
    }

    /// Forget the current request (slot cleared or recycled)
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.current = None;
    }

    /// Key the slot currently wants or shows
    pub fn current_key(&self) -> Option<CacheKey> {
        self.state.lock().current.clone()
    }

    /// Request an image for this slot and apply it only if still wanted
    ///
    /// A memory hit is applied immediately on the calling thread and no task
    /// is spawned. Otherwise the request runs on the cache's runtime and
    /// `apply` is called there, unless the slot moved on in the meantime.
    pub fn load<F>(
        self: &Arc<Self>,
        cache: &Arc<ImageCache>,
        url: Url,
        key: Option<&str>,
        apply: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<Image, RequestError>) + Send + 'static,
    {
        let cache_key = cache.key_for(&url, key);
        let ticket = self.begin(cache_key.clone());

        if let Some(image) = cache.cached_image(cache_key.as_str()) {
            self.settle(&ticket);
            apply(Ok(image));
            return None;
        }

        let binding = Arc::clone(self);
        let cache = Arc::clone(cache);
        let key = key.map(str::to_string);
        let runtime = cache.runtime().clone();

        let task = runtime.spawn(async move {
            let outcome = match key {
                Some(key) => cache.image_for_url_with_key(&url, &key).await,
                None => cache.image_for_url(&url).await,
            };

            if binding.settle(&ticket) {
                apply(outcome);
            } else {
                trace!("Discarding stale result for {}", ticket.key());
            }
        });
        Some(task)
    }
}
