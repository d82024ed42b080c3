//! Tiered resource cache manager for offline-capable clients.
//!
//! Requests are classified into resource classes and served by a strategy
//! per class from generation-versioned local stores or the network origin:
//!
//! - [`classify`]: request → `Shell` / `Image` / `Default` / pass-through
//! - [`strategy`]: cache-first and network-first retrieval with fallbacks
//! - [`lifecycle`]: purge of stale store generations on activation
//! - [`fallback`]: placeholder and offline responses
//! - [`worker`]: lifecycle event handling (install, activate, fetch, ...)
//! - [`cache`], [`transport`]: the store and network seams

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod fallback;
pub mod lifecycle;
pub mod models;
pub mod strategy;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStore, DiskStore, MemoryStore};
pub use classify::{Classifier, ImageRule, ResourceClass, Route};
pub use config::Config;
pub use error::{CacheError, CacheResult, StoreError, TransportError};
pub use lifecycle::Generations;
pub use models::{Request, RequestKey, Response, StoredEntry};
pub use strategy::{RefreshOutcome, RefreshReport, StrategyEngine};
pub use transport::{HttpTransport, Transport};
pub use worker::{
    CacheWorker, ControlMessage, EventHandler, EventOutcome, FetchOutcome, LifecycleEvent,
    RefreshSummary, WorkerState,
};
