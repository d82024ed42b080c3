//! Lifecycle event handling.
//!
//! The hosting runtime delivers install, activate, fetch, message and sync
//! events. Each handler runs to completion and reports success or failure;
//! only install and activate can fail in a way the host must act on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::classify::{Classifier, Route};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::lifecycle::{reconcile, Generations};
use crate::models::{Request, RequestKey, Response};
use crate::strategy::{refresh_entry, RefreshOutcome, RefreshReport, StrategyEngine};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this instance will never serve.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Message posted to the worker by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Take over immediately instead of waiting for older instances.
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    pub fn parse(json: &str) -> CacheResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidRequest(format!("control message: {}", e)))
    }
}

#[derive(Debug)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(ControlMessage),
    Sync { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Respond(Response),
    /// Not managed; handed back unmodified for the host to perform.
    PassThrough(Request),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: Vec<String>,
    /// Path and reason.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug)]
pub enum EventOutcome {
    Done,
    Fetched(FetchOutcome),
    /// `None` when the sync tag was not ours.
    Refreshed(Option<RefreshSummary>),
}

/// One handler per event type, all with the same completion contract.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_install(&self) -> CacheResult<()>;

    async fn on_activate(&self) -> CacheResult<()>;

    async fn on_fetch(&self, request: Request) -> CacheResult<FetchOutcome>;

    async fn on_message(&self, message: ControlMessage) -> CacheResult<()>;

    async fn on_periodic_refresh(&self) -> CacheResult<RefreshSummary>;

    async fn on_sync(&self, tag: &str) -> CacheResult<Option<RefreshSummary>>;

    async fn dispatch(&self, event: LifecycleEvent) -> CacheResult<EventOutcome> {
        match event {
            LifecycleEvent::Install => self.on_install().await.map(|_| EventOutcome::Done),
            LifecycleEvent::Activate => self.on_activate().await.map(|_| EventOutcome::Done),
            LifecycleEvent::Fetch(request) => {
                self.on_fetch(request).await.map(EventOutcome::Fetched)
            }
            LifecycleEvent::Message(message) => {
                self.on_message(message).await.map(|_| EventOutcome::Done)
            }
            LifecycleEvent::Sync { tag } => self.on_sync(&tag).await.map(EventOutcome::Refreshed),
        }
    }
}

pub struct CacheWorker {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    classifier: Arc<Classifier>,
    engine: StrategyEngine,
    generations: Generations,
    origin: Url,
    shell_files: Vec<String>,
    refresh_tag: String,
    state: Mutex<WorkerState>,
    /// Held for writing while stale generations are purged.
    activation: RwLock<()>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl CacheWorker {
    /// Returns the worker and the receiving end of its background refresh
    /// reports.
    pub fn new(
        config: &Config,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
    ) -> anyhow::Result<(Self, mpsc::Receiver<RefreshReport>)> {
        config.validate()?;

        let classifier = Arc::new(Classifier::from_config(config)?);
        let (engine, reports) = StrategyEngine::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            config.generations.clone(),
            Arc::clone(&classifier),
            &config.app_name,
        );

        let worker = Self {
            store,
            transport,
            classifier,
            engine,
            generations: config.generations.clone(),
            origin: config.origin_url()?,
            shell_files: config.shell_files.clone(),
            refresh_tag: config.refresh_tag.clone(),
            state: Mutex::new(WorkerState::Parsed),
            activation: RwLock::new(()),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        };
        Ok((worker, reports))
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn generations(&self) -> &Generations {
        &self.generations
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.lock().await = state;
    }

    fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        info!("Skip waiting requested; taking over immediately");
    }

    fn shell_requests(&self) -> CacheResult<Vec<Request>> {
        self.shell_files
            .iter()
            .map(|path| Request::for_path(&self.origin, path))
            .collect()
    }

    async fn fetch_for_install(&self, request: Request) -> CacheResult<(RequestKey, Response)> {
        let response = self.transport.fetch(&request).await?;
        if !response.is_success() {
            return Err(CacheError::Upstream {
                url: request.url.to_string(),
                status: response.status,
            });
        }
        Ok((request.key(), response))
    }

    /// Fetch every shell resource, and only when all succeeded write them.
    /// A failed write puts back what this call overwrote and removes what it
    /// added, so a generation that was already complete stays complete.
    async fn populate_shell(&self) -> CacheResult<usize> {
        let requests = self.shell_requests()?;
        let fetched = try_join_all(
            requests
                .into_iter()
                .map(|request| self.fetch_for_install(request)),
        )
        .await?;

        let shell = &self.generations.shell;
        self.store.open(shell).await?;

        let mut written: Vec<(&RequestKey, Option<Response>)> = Vec::with_capacity(fetched.len());
        for (key, response) in &fetched {
            let previous = match self.store.get(shell, key).await {
                Ok(previous) => previous,
                Err(e) => {
                    self.rollback(&written).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = self.store.put(shell, key, response).await {
                self.rollback(&written).await;
                return Err(e.into());
            }
            written.push((key, previous));
        }
        Ok(written.len())
    }

    /// Undo install writes in reverse order. Restored entries get a new
    /// `cached_at`.
    async fn rollback(&self, written: &[(&RequestKey, Option<Response>)]) {
        let shell = &self.generations.shell;
        for (key, previous) in written.iter().rev() {
            let result = match previous {
                Some(response) => self.store.put(shell, key, response).await,
                None => self.store.delete(shell, key).await.map(|_| ()),
            };
            if let Err(e) = result {
                error!(key = %key, error = %e, "Failed to roll back shell entry");
            }
        }
    }
}

#[async_trait]
impl EventHandler for CacheWorker {
    async fn on_install(&self) -> CacheResult<()> {
        info!(generation = %self.generations.shell, "Installing");
        self.set_state(WorkerState::Installing).await;

        match self.populate_shell().await {
            Ok(count) => {
                info!(count, "Shell files cached successfully");
                self.set_state(WorkerState::Installed).await;
                self.request_skip_waiting();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Error caching shell files");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    async fn on_activate(&self) -> CacheResult<()> {
        info!("Activating");
        self.set_state(WorkerState::Activating).await;

        let result = {
            let _gate = self.activation.write().await;
            reconcile(&*self.store, &self.generations.live_names()).await
        };

        match result {
            Ok(deleted) => {
                info!(deleted = deleted.len(), "Activated successfully");
                self.set_state(WorkerState::Activated).await;
                self.clients_claimed.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to purge stale generations");
                self.set_state(WorkerState::Installed).await;
                Err(e.into())
            }
        }
    }

    async fn on_fetch(&self, request: Request) -> CacheResult<FetchOutcome> {
        let class = match self.classifier.classify(&request) {
            Route::PassThrough => return Ok(FetchOutcome::PassThrough(request)),
            Route::Handle(class) => class,
        };

        // Wait out a running purge; in-flight fetches are not held back.
        drop(self.activation.read().await);

        debug!(url = %request.url, %class, "Handling fetch");
        let response = self.engine.resolve(class, &request).await;
        Ok(FetchOutcome::Respond(response))
    }

    async fn on_message(&self, message: ControlMessage) -> CacheResult<()> {
        match message {
            ControlMessage::SkipWaiting => self.request_skip_waiting(),
            ControlMessage::Unknown => debug!("Ignoring unknown control message"),
        }
        Ok(())
    }

    async fn on_periodic_refresh(&self) -> CacheResult<RefreshSummary> {
        let requests = self.shell_requests()?;
        let shell = &self.generations.shell;
        let store = &*self.store;
        let transport = &*self.transport;

        let outcomes = join_all(self.shell_files.iter().zip(requests.iter()).map(
            |(path, request)| async move {
                (path.clone(), refresh_entry(store, transport, shell, request).await)
            },
        ))
        .await;

        let mut summary = RefreshSummary::default();
        for (path, outcome) in outcomes {
            match outcome {
                RefreshOutcome::Updated { .. } => summary.refreshed.push(path),
                RefreshOutcome::Skipped { status } => {
                    info!(path = %path, status, "Failed to update cache");
                    summary.failed.push((path, format!("status {}", status)));
                }
                RefreshOutcome::Failed(reason) => {
                    info!(path = %path, error = %reason, "Failed to update cache");
                    summary.failed.push((path, reason));
                }
            }
        }

        info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "Shell cache updated"
        );
        Ok(summary)
    }

    async fn on_sync(&self, tag: &str) -> CacheResult<Option<RefreshSummary>> {
        if tag != self.refresh_tag {
            debug!(tag, "Ignoring sync for unknown tag");
            return Ok(None);
        }
        self.on_periodic_refresh().await.map(Some)
    }
}
