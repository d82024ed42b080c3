//! Retrieval strategies, one per resource class.
//!
//! - Shell: cache-first, refreshed in the background after a hit
//! - Image: network-first, then the image store, then a placeholder
//! - Default: network-first, then any store, then 503; never persisted
//!
//! `resolve` always yields a response. Transport failures are recovered
//! here and never reach the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::classify::{Classifier, ResourceClass};
use crate::error::{CacheError, CacheResult};
use crate::fallback::{offline_document, placeholder_for, service_unavailable};
use crate::lifecycle::Generations;
use crate::models::{Request, RequestKey, Response};
use crate::transport::Transport;

/// Buffer size for the background refresh report channel.
/// Reports are informational; when nobody drains them they are dropped.
const REFRESH_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh copy stored.
    Updated { status: u16 },
    /// Network answered with a non-success status; entry left as is.
    Skipped { status: u16 },
    Failed(String),
}

/// Result of one detached shell refresh.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub key: RequestKey,
    pub outcome: RefreshOutcome,
}

/// Re-fetch `request` and overwrite its entry in `store_name` on success.
pub(crate) async fn refresh_entry(
    store: &dyn CacheStore,
    transport: &dyn Transport,
    store_name: &str,
    request: &Request,
) -> RefreshOutcome {
    match transport.fetch(request).await {
        Ok(response) if response.is_success() => {
            match store.put(store_name, &request.key(), &response).await {
                Ok(()) => RefreshOutcome::Updated {
                    status: response.status,
                },
                Err(e) => RefreshOutcome::Failed(e.to_string()),
            }
        }
        Ok(response) => RefreshOutcome::Skipped {
            status: response.status,
        },
        Err(e) => RefreshOutcome::Failed(e.to_string()),
    }
}

pub struct StrategyEngine {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    generations: Generations,
    classifier: Arc<Classifier>,
    /// Stand-in for the shell root when it is neither cached nor reachable.
    offline_page: Response,
    refresh_tx: mpsc::Sender<RefreshReport>,
    in_flight: Arc<AtomicUsize>,
}

impl StrategyEngine {
    /// Returns the engine and the receiving end of its refresh reports.
    pub fn new(
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        generations: Generations,
        classifier: Arc<Classifier>,
        app_name: &str,
    ) -> (Self, mpsc::Receiver<RefreshReport>) {
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_CHANNEL_SIZE);
        let engine = Self {
            store,
            transport,
            generations,
            classifier,
            offline_page: offline_document(app_name),
            refresh_tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        };
        (engine, refresh_rx)
    }

    pub async fn resolve(&self, class: ResourceClass, request: &Request) -> Response {
        match class {
            ResourceClass::Shell => self.cache_first(request).await,
            ResourceClass::Image => self.network_first_image(request).await,
            ResourceClass::Default => self.network_first(request).await,
        }
    }

    /// Detached shell refreshes that have not finished yet.
    pub fn refreshes_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.cached(&self.generations.shell, request).await {
            self.spawn_refresh(request.clone());
            return cached;
        }

        debug!(url = %request.url, "Cache miss for shell resource, trying network");
        match self.transport.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_copy(&self.generations.shell, request, &response)
                        .await;
                }
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Shell resource unavailable");
                if self.classifier.is_shell_root(request.path()) {
                    self.offline_page.clone()
                } else {
                    service_unavailable()
                }
            }
        }
    }

    async fn network_first_image(&self, request: &Request) -> Response {
        match self.transport.fetch(request).await {
            Ok(response) if response.is_success() => {
                self.store_copy(&self.generations.image, request, &response)
                    .await;
                return response;
            }
            Ok(response) => {
                debug!(url = %request.url, status = response.status, "Image fetch not ok, trying cache");
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed for image, trying cache");
            }
        }

        if let Some(cached) = self.cached(&self.generations.image, request).await {
            return cached;
        }
        placeholder_for(ResourceClass::Image).unwrap_or_else(service_unavailable)
    }

    async fn network_first(&self, request: &Request) -> Response {
        let err = match self.transport.fetch(request).await {
            Ok(response) => return response,
            Err(e) => e,
        };

        debug!(url = %request.url, error = %err, "Network failed for default request, trying cache");
        match self.store.match_any(&request.key()).await {
            Ok(Some(cached)) => cached,
            Ok(None) => service_unavailable(),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                service_unavailable()
            }
        }
    }

    async fn lookup(&self, store_name: &str, request: &Request) -> CacheResult<Response> {
        let key = request.key();
        self.store
            .get(store_name, &key)
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Store failures degrade to a miss.
    async fn cached(&self, store_name: &str, request: &Request) -> Option<Response> {
        match self.lookup(store_name, request).await {
            Ok(response) => Some(response),
            Err(CacheError::NotFound(_)) => None,
            Err(e) => {
                warn!(store = store_name, url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store_copy(&self, store_name: &str, request: &Request, response: &Response) {
        if let Err(e) = self.store.put(store_name, &request.key(), response).await {
            warn!(store = store_name, url = %request.url, error = %e, "Failed to cache response");
        }
    }

    fn spawn_refresh(&self, request: Request) {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let store_name = self.generations.shell.clone();
        let tx = self.refresh_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let outcome = refresh_entry(&*store, &*transport, &store_name, &request).await;
            match &outcome {
                RefreshOutcome::Updated { .. } => {
                    debug!(url = %request.url, "Shell entry refreshed in background")
                }
                RefreshOutcome::Skipped { status } => {
                    debug!(url = %request.url, status, "Background refresh got non-success status")
                }
                RefreshOutcome::Failed(error) => {
                    info!(url = %request.url, error = %error, "Background cache update failed")
                }
            }

            in_flight.fetch_sub(1, Ordering::SeqCst);
            let report = RefreshReport {
                key: request.key(),
                outcome,
            };
            if let Err(e) = tx.try_send(report) {
                debug!(error = %e, "Dropping refresh report");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::Config;
    use crate::testing::{get, ok, FlakyStore, MockTransport};
    use std::time::Duration;
    use tokio::time::timeout;

    const SHELL: &str = "spice-affair-shell-v1";
    const IMAGES: &str = "spice-affair-images-v1";

    struct Harness {
        store: Arc<dyn CacheStore>,
        transport: Arc<MockTransport>,
        engine: StrategyEngine,
        reports: mpsc::Receiver<RefreshReport>,
    }

    fn harness_with(store: Arc<dyn CacheStore>) -> Harness {
        let config = Config::default();
        let transport = Arc::new(MockTransport::new());
        let classifier = Arc::new(Classifier::from_config(&config).unwrap());
        let (engine, reports) = StrategyEngine::new(
            Arc::clone(&store),
            transport.clone(),
            config.generations.clone(),
            classifier,
            &config.app_name,
        );
        Harness {
            store,
            transport,
            engine,
            reports,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new()))
    }

    async fn next_report(reports: &mut mpsc::Receiver<RefreshReport>) -> RefreshReport {
        timeout(Duration::from_secs(5), reports.recv())
            .await
            .expect("refresh report timed out")
            .expect("refresh channel closed")
    }

    // ===== Shell =====

    #[tokio::test]
    async fn test_shell_hit_does_not_wait_for_network() {
        let h = harness();
        let req = get("/menu.json");
        h.store.put(SHELL, &req.key(), &ok("cached")).await.unwrap();
        h.transport.hang("/menu.json");

        let resp = timeout(
            Duration::from_secs(1),
            h.engine.resolve(ResourceClass::Shell, &req),
        )
        .await
        .expect("cache hit blocked on network");

        assert_eq!(resp.body, b"cached");
        assert_eq!(h.engine.refreshes_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_shell_hit_refreshes_in_background() {
        let mut h = harness();
        let req = get("/menu.json");
        h.store.put(SHELL, &req.key(), &ok("old")).await.unwrap();
        h.transport.respond("/menu.json", ok("new"));

        let resp = h.engine.resolve(ResourceClass::Shell, &req).await;
        assert_eq!(resp.body, b"old");

        let report = next_report(&mut h.reports).await;
        assert_eq!(report.key, req.key());
        assert_eq!(report.outcome, RefreshOutcome::Updated { status: 200 });

        let stored = h.store.get(SHELL, &req.key()).await.unwrap().unwrap();
        assert_eq!(stored.body, b"new");
        assert_eq!(h.transport.calls("/menu.json"), 1);
    }

    #[tokio::test]
    async fn test_shell_background_failure_keeps_entry() {
        let mut h = harness();
        let req = get("/menu.json");
        h.store.put(SHELL, &req.key(), &ok("old")).await.unwrap();
        h.transport.fail("/menu.json");

        let resp = h.engine.resolve(ResourceClass::Shell, &req).await;
        assert_eq!(resp.body, b"old");

        let report = next_report(&mut h.reports).await;
        assert!(matches!(report.outcome, RefreshOutcome::Failed(_)));
        let stored = h.store.get(SHELL, &req.key()).await.unwrap().unwrap();
        assert_eq!(stored.body, b"old");
    }

    #[tokio::test]
    async fn test_shell_background_non_success_is_skipped() {
        let mut h = harness();
        let req = get("/menu.json");
        h.store.put(SHELL, &req.key(), &ok("old")).await.unwrap();
        h.transport.respond("/menu.json", Response::new(500, "boom"));

        h.engine.resolve(ResourceClass::Shell, &req).await;

        let report = next_report(&mut h.reports).await;
        assert_eq!(report.outcome, RefreshOutcome::Skipped { status: 500 });
        let stored = h.store.get(SHELL, &req.key()).await.unwrap().unwrap();
        assert_eq!(stored.body, b"old");
    }

    #[tokio::test]
    async fn test_shell_miss_fetches_and_stores() {
        let h = harness();
        let req = get("/manifest.json");
        h.transport.respond("/manifest.json", ok("{}"));

        let resp = h.engine.resolve(ResourceClass::Shell, &req).await;
        assert_eq!(resp, ok("{}"));
        assert_eq!(h.store.get(SHELL, &req.key()).await.unwrap(), Some(ok("{}")));
        assert_eq!(h.engine.refreshes_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shell_miss_error_status_returned_but_not_stored() {
        let h = harness();
        let req = get("/manifest.json");
        h.transport.respond("/manifest.json", Response::new(404, "missing"));

        let resp = h.engine.resolve(ResourceClass::Shell, &req).await;
        assert_eq!(resp.status, 404);
        assert_eq!(h.store.get(SHELL, &req.key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shell_root_offline_document() {
        let h = harness();
        for path in ["/", "/index.html"] {
            let resp = h.engine.resolve(ResourceClass::Shell, &get(path)).await;
            assert_eq!(resp, offline_document("Spice Affair"), "{}", path);
        }
        assert!(h.store.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shell_other_path_unavailable() {
        let h = harness();
        let resp = h.engine.resolve(ResourceClass::Shell, &get("/menu.json")).await;
        assert_eq!(resp.status, 503);
    }

    #[tokio::test]
    async fn test_shell_lookup_failure_is_a_miss() {
        let store = Arc::new(FlakyStore::new());
        store.fail_reads.store(true, Ordering::SeqCst);
        let h = harness_with(store);
        h.transport.respond("/menu.json", ok("net"));

        let resp = h.engine.resolve(ResourceClass::Shell, &get("/menu.json")).await;
        assert_eq!(resp.body, b"net");
    }

    // ===== Image =====

    #[tokio::test]
    async fn test_image_network_success_is_stored() {
        let h = harness();
        let req = get("/assets/curry.webp");
        let png = Response::new(200, vec![1u8, 2, 3]).with_header("content-type", "image/webp");
        h.transport.respond("/assets/curry.webp", png.clone());

        let resp = h.engine.resolve(ResourceClass::Image, &req).await;
        assert_eq!(resp, png);
        assert_eq!(h.store.get(IMAGES, &req.key()).await.unwrap(), Some(png));
    }

    #[tokio::test]
    async fn test_image_network_failure_uses_cache() {
        let h = harness();
        let req = get("/assets/curry.webp");
        let cached = Response::new(200, vec![9u8]);
        h.store.put(IMAGES, &req.key(), &cached).await.unwrap();
        h.transport.fail("/assets/curry.webp");

        assert_eq!(h.engine.resolve(ResourceClass::Image, &req).await, cached);
    }

    #[tokio::test]
    async fn test_image_error_status_uses_cache() {
        let h = harness();
        let req = get("/assets/curry.webp");
        let cached = Response::new(200, vec![9u8]);
        h.store.put(IMAGES, &req.key(), &cached).await.unwrap();
        h.transport.respond("/assets/curry.webp", Response::new(404, "nope"));

        assert_eq!(h.engine.resolve(ResourceClass::Image, &req).await, cached);
    }

    #[tokio::test]
    async fn test_image_placeholder_when_nothing_available() {
        let h = harness();
        let req = get("/assets/curry.webp");
        h.transport.fail("/assets/curry.webp");

        let resp = h.engine.resolve(ResourceClass::Image, &req).await;
        assert_eq!(Some(resp.clone()), placeholder_for(ResourceClass::Image));
        assert_eq!(resp.status, 200);
        assert_eq!(h.store.get(IMAGES, &req.key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_image_ignores_shell_store() {
        let h = harness();
        let req = get("/assets/logo.png");
        h.store.put(SHELL, &req.key(), &ok("shell copy")).await.unwrap();

        let resp = h.engine.resolve(ResourceClass::Image, &req).await;
        assert_eq!(Some(resp), placeholder_for(ResourceClass::Image));
    }

    // ===== Default =====

    #[tokio::test]
    async fn test_default_success_not_stored() {
        let h = harness();
        let req = get("/api/specials");
        h.transport.respond("/api/specials", ok("[]"));

        assert_eq!(h.engine.resolve(ResourceClass::Default, &req).await, ok("[]"));
        assert!(h.store.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_error_status_returned_verbatim() {
        let h = harness();
        let req = get("/api/specials");
        h.store.put(SHELL, &req.key(), &ok("stale")).await.unwrap();
        h.transport.respond("/api/specials", Response::new(500, "oops"));

        let resp = h.engine.resolve(ResourceClass::Default, &req).await;
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, b"oops");
    }

    #[tokio::test]
    async fn test_default_failure_searches_every_store() {
        let h = harness();
        let req = get("/api/specials");
        h.store.put("spice-affair-menu-v1", &req.key(), &ok("old menu")).await.unwrap();
        h.transport.fail("/api/specials");

        let resp = h.engine.resolve(ResourceClass::Default, &req).await;
        assert_eq!(resp.body, b"old menu");
    }

    #[tokio::test]
    async fn test_default_failure_without_cache_is_503() {
        let h = harness();
        let resp = h.engine.resolve(ResourceClass::Default, &get("/api/specials")).await;
        assert_eq!(resp, service_unavailable());
    }

    #[tokio::test]
    async fn test_default_store_failure_is_503() {
        let store = Arc::new(FlakyStore::new());
        store.fail_listing.store(true, Ordering::SeqCst);
        let h = harness_with(store);

        let resp = h.engine.resolve(ResourceClass::Default, &get("/api/specials")).await;
        assert_eq!(resp.status, 503);
    }
}
