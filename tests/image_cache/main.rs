//! Integration tests for the image cache facade
//!
//! These tests drive the public API end to end against a counting in-memory
//! fetcher and a temporary cache directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{oneshot, Semaphore};
use tokio_test::{assert_err, assert_ok};
use url::Url;

use image_cache::app::{
    derive_key, CacheConfig, CacheKey, Callbacks, Fetcher, Image, ImageCache, RasterCodec,
    RequestState, SlotBinding,
};
use image_cache::errors::{FetchError, FetchResult, RequestError};

/// Fetcher serving canned bodies by URL and counting every call
///
/// Unknown URLs answer 404. When gated, each fetch waits for a permit.
#[derive(Debug, Default)]
struct CountingFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl CountingFetcher {
    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (fetcher, gate)
    }

    fn serve(&self, url: &Url, body: Vec<u8>) {
        self.bodies.lock().insert(url.to_string(), body);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await;
            drop(permit);
        }

        let body = self.bodies.lock().get(url.as_str()).cloned();
        body.ok_or_else(|| FetchError::NotFound {
            url: url.to_string(),
        })
    }
}

fn png_bytes(seed: u8) -> Vec<u8> {
    let raster = RgbaImage::from_pixel(5, 3, Rgba([seed, 0, 255 - seed, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(raster)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn sample_image(seed: u8) -> Image {
    Image::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        2,
        2,
        Rgba([seed, seed, seed, 255]),
    )))
}

fn url(path: &str) -> Url {
    Url::parse(&format!("https://example.com/{}", path)).unwrap()
}

async fn open_cache(temp_dir: &TempDir, fetcher: Arc<CountingFetcher>) -> Arc<ImageCache> {
    let config = CacheConfig::with_cache_root(temp_dir.path().to_path_buf());
    let cache = ImageCache::new(config, fetcher, Arc::new(RasterCodec::new()))
        .await
        .unwrap();
    Arc::new(cache)
}

async fn wait_for_joined(cache: &ImageCache, expected: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while cache.stats().await.requests.joined < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("requests did not join in time");
}

#[tokio::test]
async fn test_set_then_cached_returns_same_image() {
    let temp_dir = TempDir::new().unwrap();
    let cache = open_cache(&temp_dir, Arc::new(CountingFetcher::default())).await;
    let image = sample_image(7);

    cache.set_image(image.clone(), "k");

    let cached = cache.cached_image("k").unwrap();
    assert!(cached.same_as(&image));
}

#[tokio::test]
async fn test_url_key_is_sha1_of_url() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let url = url("a.png");
    fetcher.serve(&url, png_bytes(1));

    let image = assert_ok!(cache.image_for_url(&url).await);
    cache.flush().await.unwrap();

    let key = CacheKey::explicit("b86dafa63bceefac631caa7d6745c8a343bc0c4a");
    assert_eq!(derive_key(url.as_str(), None).unwrap(), key);
    assert!(cache.cached_image(key.as_str()).unwrap().same_as(&image));
    assert!(cache.is_on_disk(&key));

    cache.purge_memory();
    let from_disk = cache.image_from_disk(key.as_str()).unwrap();
    assert_eq!(from_disk, image);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_fetch_once() {
    let temp_dir = TempDir::new().unwrap();
    let (fetcher, gate) = CountingFetcher::gated();
    let fetcher = Arc::new(fetcher);
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let url = url("shared.png");
    fetcher.serve(&url, png_bytes(2));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let cache = cache.clone();
        let url = url.clone();
        handles.push(tokio::spawn(
            async move { cache.image_for_url(&url).await },
        ));
    }

    wait_for_joined(&cache, 4).await;
    assert_eq!(cache.request_state_for_url(&url), RequestState::Fetching);
    gate.add_permits(1);

    let mut images = Vec::new();
    for handle in handles {
        images.push(assert_ok!(handle.await.unwrap()));
    }

    assert_eq!(fetcher.calls(), 1);
    assert!(images.iter().all(|image| image.same_as(&images[0])));
    assert_eq!(cache.request_state_for_url(&url), RequestState::Succeeded);
}

#[tokio::test]
async fn test_concurrent_failures_share_the_error() {
    let temp_dir = TempDir::new().unwrap();
    let (fetcher, gate) = CountingFetcher::gated();
    let fetcher = Arc::new(fetcher);
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let url = url("missing.png");

    let first = {
        let cache = cache.clone();
        let url = url.clone();
        tokio::spawn(async move { cache.image_for_url(&url).await })
    };
    let second = {
        let cache = cache.clone();
        let url = url.clone();
        tokio::spawn(async move { cache.image_for_url(&url).await })
    };

    wait_for_joined(&cache, 1).await;
    gate.add_permits(1);

    let first = assert_err!(first.await.unwrap());
    let second = assert_err!(second.await.unwrap());

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first.status(), Some(404));
    assert_eq!(second.status(), Some(404));
}

#[tokio::test]
async fn test_not_found_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let url = url("gone.png");
    let key = cache.key_for(&url, None);

    let error = assert_err!(cache.image_for_url(&url).await);
    cache.flush().await.unwrap();

    assert!(matches!(error, RequestError::Fetch { .. }));
    assert_eq!(error.url(), Some(url.as_str()));
    assert!(cache.cached_image(key.as_str()).is_none());
    assert!(!cache.is_on_disk(&key));
    assert_eq!(cache.request_state(key.as_str()), RequestState::Failed);

    // Failures are not cached: the next request fetches again
    let _ = cache.image_for_url(&url).await;
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_completed_fetch_is_on_disk_without_flush() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let url = url("fresh.png");
    fetcher.serve(&url, png_bytes(8));
    let key = cache.key_for(&url, None);

    let image = assert_ok!(cache.image_for_url(&url).await);

    assert!(cache.is_on_disk(&key));
    assert_eq!(cache.image_from_disk(key.as_str()), Some(image));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_removed_image_is_fetched_again() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let url = url("replaced.png");
    fetcher.serve(&url, png_bytes(1));
    assert_ok!(cache.image_for_url(&url).await);
    cache.flush().await.unwrap();

    fetcher.serve(&url, png_bytes(200));
    cache.remove_image_for_url(&url);
    let key = cache.key_for(&url, None);
    assert!(cache.image_from_disk(key.as_str()).is_none());

    let image = assert_ok!(cache.image_for_url(&url).await);
    let pixel = image.as_dynamic().to_rgba8().get_pixel(0, 0).0;
    assert_eq!(pixel, [200, 0, 55, 255]);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_disk_tier_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let url = url("persist.png");

    {
        let fetcher = Arc::new(CountingFetcher::default());
        fetcher.serve(&url, png_bytes(3));
        let cache = open_cache(&temp_dir, fetcher).await;
        assert_ok!(cache.image_for_url(&url).await);
        cache.flush().await.unwrap();
    }

    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let key = cache.key_for(&url, None);

    assert!(cache.cached_image(key.as_str()).is_none());
    let image = assert_ok!(cache.image_for_url(&url).await);

    assert_eq!((image.width(), image.height()), (5, 3));
    assert_eq!(fetcher.calls(), 0);
    assert!(cache.cached_image(key.as_str()).is_some());
}

#[tokio::test]
async fn test_set_image_persists_through_disk_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let cache = open_cache(&temp_dir, Arc::new(CountingFetcher::default())).await;

    cache.set_image(sample_image(9), "avatar");
    cache.flush().await.unwrap();
    assert_eq!(cache.purge_memory(), 1);

    // Synchronous disk lookup leaves memory untouched
    let from_disk = cache.image_from_disk("avatar").unwrap();
    assert_eq!(from_disk, sample_image(9));
    assert!(cache.cached_image("avatar").is_none());

    let loaded = cache.load_from_disk("avatar").await.unwrap();
    assert_eq!(loaded, sample_image(9));
    assert!(cache.cached_image("avatar").is_some());
}

#[tokio::test]
async fn test_remove_clears_both_tiers() {
    let temp_dir = TempDir::new().unwrap();
    let cache = open_cache(&temp_dir, Arc::new(CountingFetcher::default())).await;
    let key = CacheKey::explicit("k");

    cache.set_image(sample_image(1), "k");
    cache.flush().await.unwrap();
    assert!(cache.is_on_disk(&key));

    cache.remove_image("k");
    assert!(cache.image_from_disk("k").is_none());
    assert!(!cache.is_on_disk(&key));

    cache.flush().await.unwrap();
    assert!(cache.cached_image("k").is_none());
    assert!(!cache.is_on_disk(&key));
    assert!(cache.image_from_disk("k").is_none());
}

#[tokio::test]
async fn test_clear_empties_cache_directory() {
    let temp_dir = TempDir::new().unwrap();
    let cache = open_cache(&temp_dir, Arc::new(CountingFetcher::default())).await;
    let foreign = temp_dir.path().join("notes.txt");
    std::fs::write(&foreign, b"keep me").unwrap();

    cache.set_image(sample_image(1), "a");
    cache.set_image(sample_image(2), "b");
    cache.flush().await.unwrap();
    assert_eq!(cache.stats().await.cached_files_count, 2);

    cache.clear();
    cache.flush().await.unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.cached_files_count, 0);
    assert_eq!(stats.memory.entries, 0);
    assert!(foreign.exists());
}

#[tokio::test]
async fn test_callbacks_receive_outcome() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let good = url("good.png");
    fetcher.serve(&good, png_bytes(4));

    let (tx, rx) = oneshot::channel();
    let handle = cache.image_for_url_then(
        good,
        Some("explicit"),
        Callbacks::new(move |image: Image| {
            let _ = tx.send(image.width());
        }),
    );
    handle.await.unwrap();
    assert_eq!(rx.await.unwrap(), 5);
    assert!(cache.cached_image("explicit").is_some());

    let (tx, rx) = oneshot::channel();
    let handle = cache.image_for_url_then(
        url("bad.png"),
        None,
        Callbacks::new(|_image: Image| panic!("unexpected success"))
            .on_failure(move |error: RequestError| {
                let _ = tx.send(error.status());
            }),
    );
    handle.await.unwrap();
    assert_eq!(rx.await.unwrap(), Some(404));
}

#[tokio::test]
async fn test_slot_binding_discards_stale_results() {
    let temp_dir = TempDir::new().unwrap();
    let (fetcher, gate) = CountingFetcher::gated();
    let fetcher = Arc::new(fetcher);
    let cache = open_cache(&temp_dir, fetcher.clone()).await;
    let slow = url("row-3.png");
    let fresh = url("row-40.png");
    fetcher.serve(&slow, png_bytes(5));
    fetcher.serve(&fresh, png_bytes(6));

    let binding = Arc::new(SlotBinding::new());
    let applied = Arc::new(Mutex::new(Vec::new()));

    let record = |label: &'static str| {
        let applied = applied.clone();
        move |outcome: Result<Image, RequestError>| {
            if outcome.is_ok() {
                applied.lock().push(label);
            }
        }
    };

    let stale = binding.load(&cache, slow, None, record("row-3")).unwrap();
    let current = binding.load(&cache, fresh.clone(), None, record("row-40")).unwrap();

    gate.add_permits(2);
    stale.await.unwrap();
    current.await.unwrap();

    assert_eq!(*applied.lock(), vec!["row-40"]);
    assert_eq!(binding.current_key(), Some(cache.key_for(&fresh, None)));

    // A memory hit applies synchronously without a task
    let hit = binding.load(&cache, fresh, None, record("hit"));
    assert!(hit.is_none());
    assert_eq!(*applied.lock(), vec!["row-40", "hit"]);
}
