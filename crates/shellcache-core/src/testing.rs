//! Test doubles for the transport and store seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::{CacheStore, MemoryStore};
use crate::error::{StoreError, TransportError};
use crate::models::{Request, RequestKey, Response, StoredEntry};
use crate::transport::Transport;

pub const ORIGIN: &str = "http://localhost:8080";

pub fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

pub fn get(path: &str) -> Request {
    Request::get(&url(path)).unwrap()
}

pub fn ok(body: &str) -> Response {
    Response::new(200, body).with_header("content-type", "text/plain")
}

#[derive(Clone)]
enum Scripted {
    Respond(Response),
    Fail(TransportError),
    Hang,
}

/// Transport answering from a per-URL script. Unscripted URLs are
/// unreachable.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, path: &str, scripted: Scripted) {
        self.routes.lock().unwrap().insert(url(path), scripted);
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.script(path, Scripted::Respond(response));
    }

    pub fn fail(&self, path: &str) {
        self.script(
            path,
            Scripted::Fail(TransportError::Connect("connection refused".to_string())),
        );
    }

    /// Never completes.
    pub fn hang(&self, path: &str) {
        self.script(path, Scripted::Hang);
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&url(path))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
        let key = request.url.as_str().to_string();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        let scripted = self.routes.lock().unwrap().get(&key).cloned();
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Hang) => futures::future::pending().await,
            None => Err(TransportError::Connect(format!("no route to {}", key))),
        }
    }
}

/// Memory store whose operations can be made to fail.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_listing: AtomicBool,
    /// Number of puts that still succeed before puts start failing.
    pub puts_before_failure: AtomicUsize,
    /// Puts of this key always fail.
    pub fail_puts_for: Mutex<Option<RequestKey>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
            puts_before_failure: AtomicUsize::new(usize::MAX),
            fail_puts_for: Mutex::new(None),
        }
    }

    fn broken() -> StoreError {
        StoreError::io(
            "/flaky",
            std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable"),
        )
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        self.inner.open(name).await
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.get(name, key).await
    }

    async fn put(
        &self,
        name: &str,
        key: &RequestKey,
        response: &Response,
    ) -> Result<(), StoreError> {
        if self.fail_puts_for.lock().unwrap().as_ref() == Some(key) {
            return Err(Self::broken());
        }
        let allowed = self
            .puts_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(Self::broken());
        }
        self.inner.put(name, key, response).await
    }

    async fn delete(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError> {
        self.inner.delete(name, key).await
    }

    async fn delete_store(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete_store(name).await
    }

    async fn store_names(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.store_names().await
    }

    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, StoreError> {
        self.inner.entries(name).await
    }
}
