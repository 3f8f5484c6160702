//! Unit tests for the request coordinator
//!
//! These tests drive the coordinator against a scripted in-memory fetcher.
//! Integration tests through the public facade are located in the top-level
//! tests directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{oneshot, Semaphore};

use super::*;
use crate::app::image::RasterCodec;
use crate::errors::{FetchError, FetchResult};

/// Scripted response for one URL
#[derive(Debug, Clone)]
enum Scripted {
    Body(Vec<u8>),
    Status(u16),
}

/// Fetcher that serves scripted responses and counts calls
///
/// When gated, each fetch waits for a permit so tests can line up
/// concurrent requests before the fetch resolves.
#[derive(Debug, Default)]
struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedFetcher {
    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (fetcher, gate)
    }

    fn respond(&self, url: &Url, response: Scripted) {
        self.responses.lock().insert(url.to_string(), response);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await;
            drop(permit);
        }

        let response = self.responses.lock().get(url.as_str()).cloned();
        match response {
            Some(Scripted::Body(bytes)) => Ok(bytes),
            Some(Scripted::Status(404)) | None => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            Some(Scripted::Status(status)) => Err(FetchError::ServerError {
                status,
                url: url.to_string(),
            }),
        }
    }
}

/// Test harness holding the coordinator and direct handles on its parts
struct Harness {
    coordinator: Arc<FetchCoordinator>,
    fetcher: Arc<ScriptedFetcher>,
    memory: Arc<MemoryCache>,
    disk: Arc<DiskStore>,
    _temp_dir: TempDir,
}

async fn harness_with(fetcher: ScriptedFetcher) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let memory = Arc::new(MemoryCache::new(16 * 1024 * 1024, 100));
    let disk = Arc::new(DiskStore::open(temp_dir.path(), "img-").await.unwrap());
    let fetcher = Arc::new(fetcher);

    let coordinator = Arc::new(FetchCoordinator::new(
        memory.clone(),
        disk.clone(),
        fetcher.clone(),
        Arc::new(RasterCodec::new()),
        64,
        Handle::current(),
    ));

    Harness {
        coordinator,
        fetcher,
        memory,
        disk,
        _temp_dir: temp_dir,
    }
}

async fn harness() -> Harness {
    harness_with(ScriptedFetcher::default()).await
}

fn png_bytes(seed: u8) -> Vec<u8> {
    let raster = RgbaImage::from_fn(6, 4, |x, y| Rgba([seed, x as u8, y as u8, 255]));
    RasterCodec::new()
        .encode(&Image::new(DynamicImage::ImageRgba8(raster)))
        .unwrap()
}

fn url(path: &str) -> Url {
    Url::parse(&format!("https://example.com/{}", path)).unwrap()
}

/// Wait until `condition` holds, failing the test after two seconds
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_network_miss_populates_both_tiers() {
    let h = harness().await;
    let url = url("a.png");
    h.fetcher.respond(&url, Scripted::Body(png_bytes(1)));

    let image = h.coordinator.request(&url, None).await.unwrap();
    let key = CacheKey::from_url(&url);

    assert_eq!(h.fetcher.calls(), 1);
    assert!(h.memory.get(&key).unwrap().same_as(&image));

    h.disk.flush().await.unwrap();
    assert_eq!(h.disk.read(&key), Some(png_bytes(1)));
    assert_eq!(h.coordinator.state(&key), RequestState::Succeeded);
}

#[tokio::test]
async fn test_memory_hit_skips_fetch() {
    let h = harness().await;
    let url = url("a.png");
    h.fetcher.respond(&url, Scripted::Body(png_bytes(1)));

    let first = h.coordinator.request(&url, None).await.unwrap();
    let second = h.coordinator.request(&url, None).await.unwrap();

    assert_eq!(h.fetcher.calls(), 1);
    assert!(first.same_as(&second));
    assert_eq!(h.coordinator.stats().memory_hits, 1);
}

#[tokio::test]
async fn test_disk_hit_skips_fetch_and_warms_memory() {
    let h = harness().await;
    let url = url("a.png");
    let key = CacheKey::from_url(&url);
    h.disk.write(key.clone(), png_bytes(2));
    h.disk.flush().await.unwrap();

    let image = h.coordinator.request(&url, None).await.unwrap();

    assert_eq!(h.fetcher.calls(), 0);
    assert!(h.memory.get(&key).unwrap().same_as(&image));
    assert_eq!(h.coordinator.stats().disk_hits, 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let (fetcher, gate) = ScriptedFetcher::gated();
    let h = harness_with(fetcher).await;
    let url = url("shared.png");
    h.fetcher.respond(&url, Scripted::Body(png_bytes(3)));

    let first = tokio::spawn({
        let coordinator = h.coordinator.clone();
        let url = url.clone();
        async move { coordinator.request(&url, None).await }
    });
    let second = tokio::spawn({
        let coordinator = h.coordinator.clone();
        let url = url.clone();
        async move { coordinator.request(&url, None).await }
    });

    let coordinator = h.coordinator.clone();
    wait_until(move || coordinator.stats().joined == 1).await;
    gate.add_permits(1);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(h.fetcher.calls(), 1);
    assert!(first.same_as(&second));
    assert_eq!(h.coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_failures_share_outcome() {
    let (fetcher, gate) = ScriptedFetcher::gated();
    let h = harness_with(fetcher).await;
    let url = url("missing.png");
    let key = CacheKey::from_url(&url);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            let url = url.clone();
            tokio::spawn(async move { coordinator.request(&url, None).await })
        })
        .collect();

    let coordinator = h.coordinator.clone();
    wait_until(move || coordinator.stats().joined == 2).await;
    gate.add_permits(1);

    for waiter in waiters {
        let error = waiter.await.unwrap().unwrap_err();
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.key(), Some(&key));
        assert_eq!(error.url(), Some(url.as_str()));
    }

    assert_eq!(h.fetcher.calls(), 1);
    assert!(h.memory.get(&key).is_none());
    h.disk.flush().await.unwrap();
    assert!(h.disk.read(&key).is_none());
    assert_eq!(h.coordinator.state(&key), RequestState::Failed);
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let h = harness().await;
    let url = url("flaky.png");
    h.fetcher.respond(&url, Scripted::Status(503));

    let error = h.coordinator.request(&url, None).await.unwrap_err();
    assert_eq!(error.status(), Some(503));

    // A later request goes back to the network
    h.fetcher.respond(&url, Scripted::Body(png_bytes(4)));
    assert!(h.coordinator.request(&url, None).await.is_ok());
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_undecodable_payload_fails_without_entry() {
    let h = harness().await;
    let url = url("page.html");
    let key = CacheKey::from_url(&url);
    h.fetcher
        .respond(&url, Scripted::Body(b"<html>login</html>".to_vec()));

    let error = h.coordinator.request(&url, None).await.unwrap_err();

    assert!(matches!(error, RequestError::Decode { .. }));
    assert_eq!(error.status(), None);
    assert!(h.memory.get(&key).is_none());
    h.disk.flush().await.unwrap();
    assert!(h.disk.read(&key).is_none());
    assert_eq!(h.coordinator.stats().fetch_failures, 1);
}

#[tokio::test]
async fn test_corrupt_disk_entry_falls_through_and_is_replaced() {
    let h = harness().await;
    let url = url("a.png");
    let key = CacheKey::from_url(&url);
    h.disk.write(key.clone(), b"truncated".to_vec());
    h.disk.flush().await.unwrap();
    h.fetcher.respond(&url, Scripted::Body(png_bytes(5)));

    assert!(h.coordinator.request(&url, None).await.is_ok());

    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.coordinator.stats().corrupt_disk_entries, 1);
    h.disk.flush().await.unwrap();
    assert_eq!(h.disk.read(&key), Some(png_bytes(5)));
}

#[tokio::test]
async fn test_explicit_key_takes_precedence() {
    let h = harness().await;
    let url = url("a.png");
    h.fetcher.respond(&url, Scripted::Body(png_bytes(6)));

    h.coordinator.request(&url, Some("avatar-1")).await.unwrap();

    assert!(h.memory.contains(&CacheKey::explicit("avatar-1")));
    assert!(!h.memory.contains(&CacheKey::from_url(&url)));
}

#[tokio::test]
async fn test_dropped_caller_does_not_cancel_fetch() {
    let (fetcher, gate) = ScriptedFetcher::gated();
    let h = harness_with(fetcher).await;
    let url = url("a.png");
    let key = CacheKey::from_url(&url);
    h.fetcher.respond(&url, Scripted::Body(png_bytes(7)));

    let caller = tokio::spawn({
        let coordinator = h.coordinator.clone();
        let url = url.clone();
        async move { coordinator.request(&url, None).await }
    });

    let coordinator = h.coordinator.clone();
    let probe = key.clone();
    wait_until(move || coordinator.state(&probe) == RequestState::Fetching).await;

    caller.abort();
    gate.add_permits(1);

    let coordinator = h.coordinator.clone();
    let probe = key.clone();
    wait_until(move || coordinator.state(&probe) == RequestState::Succeeded).await;
    assert!(h.memory.contains(&key));
}

#[tokio::test]
async fn test_request_with_runs_callbacks() {
    let h = harness().await;
    let ok_url = url("a.png");
    let bad_url = url("missing.png");
    h.fetcher.respond(&ok_url, Scripted::Body(png_bytes(8)));

    let (ok_tx, ok_rx) = oneshot::channel();
    h.coordinator
        .request_with(
            ok_url,
            None,
            Callbacks::new(move |image| {
                let _ = ok_tx.send(image.width());
            }),
        )
        .await
        .unwrap();
    assert_eq!(ok_rx.await.unwrap(), 6);

    let (err_tx, err_rx) = oneshot::channel();
    h.coordinator
        .request_with(
            bad_url,
            Some("thumb".to_string()),
            Callbacks::new(|_| panic!("must not succeed")).on_failure(move |error| {
                let _ = err_tx.send(error.status());
            }),
        )
        .await
        .unwrap();
    assert_eq!(err_rx.await.unwrap(), Some(404));
}

#[tokio::test]
async fn test_decode_from_disk_populates_nothing() {
    let h = harness().await;
    let key = CacheKey::explicit("warm");
    h.disk.write(key.clone(), png_bytes(9));
    h.disk.flush().await.unwrap();

    assert!(h.coordinator.decode_from_disk(&key).is_some());
    assert!(!h.memory.contains(&key));
    assert!(h.coordinator.decode_from_disk(&CacheKey::explicit("cold")).is_none());
}
