//! Fetch-once-per-parameter-set list loader.
//!
//! A [`ListLoader`] is the request controller of one list view. It is created
//! when the view mounts and torn down with it, and it guarantees that:
//!
//! - at most one request per view accepts results at any time;
//! - only the response to the latest requested tuple is committed;
//! - a repeated tuple while its request is pending does not hit the network again;
//! - nothing reaches the sink after [`ListLoader::teardown`] returns;
//! - failures keep the last-good items and notify exactly once, and
//!   cancellations never notify.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::FetchError;
use crate::model::{ListQuery, Resource};

pub mod sink;
pub mod state;

pub use sink::{ChannelSink, ListSink, ViewEvent};
pub use state::{reduce, Commit, LoadPhase, Outcome, Snapshot};

/// Source of list pages for a parameter tuple.
///
/// Implementations should stop early once `cancel` fires; the loader discards
/// late results either way.
#[async_trait]
pub trait Fetch<Q, T>: Send + Sync + 'static
where
    Q: Send + Sync + 'static,
    T: Send + 'static,
{
    async fn fetch(&self, query: &Q, cancel: CancellationToken) -> Result<Vec<T>, FetchError>;
}

/// [`Fetch`] backed by one admin API list endpoint.
#[derive(Debug, Clone)]
pub struct ResourceFetch {
    client: ApiClient,
    resource: Resource,
}

impl ResourceFetch {
    pub fn new(client: ApiClient, resource: Resource) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl<T> Fetch<ListQuery, T> for ResourceFetch
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self, query: &ListQuery, cancel: CancellationToken) -> Result<Vec<T>, FetchError> {
        self.client.list(self.resource, query, &cancel).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Quiet period before a request goes out; a newer tuple during it replaces the request.
    pub debounce: Duration,
    /// Upper bound on one fetch. Expiry counts as a network failure.
    pub timeout: Option<Duration>,
}

/// What [`ListLoader::request`] did with a tuple.
#[derive(Debug)]
pub enum Dispatch {
    Started(RequestHandle),
    /// Same tuple already loading.
    Suppressed,
    /// Loader was torn down.
    Detached,
}

impl Dispatch {
    pub fn into_handle(self) -> Option<RequestHandle> {
        match self {
            Dispatch::Started(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Handle on one spawned request task.
#[derive(Debug)]
pub struct RequestHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl RequestHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until the request task has finished, committed or not.
    pub async fn settled(self) {
        if let Err(err) = self.task.await {
            warn!(generation = self.generation, ?err, "list request task failed");
        }
    }
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

struct Inner<Q, T> {
    live: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    view: Snapshot<Q, T>,
}

struct Shared<Q, T>
where
    Q: Send + Sync + 'static,
    T: Send + 'static,
{
    fetcher: Arc<dyn Fetch<Q, T>>,
    sink: Arc<dyn ListSink<T>>,
    options: LoaderOptions,
    lifetime: CancellationToken,
    inner: Mutex<Inner<Q, T>>,
}

impl<Q, T> Shared<Q, T>
where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, Inner<Q, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit a finished request if it is still the live, current one.
    fn settle(&self, generation: u64, cancel: &CancellationToken, result: Result<Vec<T>, FetchError>) {
        let mut inner = self.lock();
        let current = inner.in_flight.as_ref().map(|f| f.generation) == Some(generation);
        if !inner.live || !current || cancel.is_cancelled() {
            debug!(generation, live = inner.live, "discarding stale list response");
            return;
        }
        inner.in_flight = None;

        let outcome = Outcome::from(result);
        match &outcome {
            Outcome::Ok(items) => info!(generation, count = items.len(), "list committed"),
            Outcome::Err(message) => warn!(generation, %message, "list request failed"),
            Outcome::Cancelled => debug!(generation, "list request aborted by transport"),
        }
        let commit = reduce(&mut inner.view, outcome);

        // Applied under the lock so teardown cannot interleave with a commit.
        if let Some(items) = commit.items {
            self.sink.set_items(items);
        }
        self.sink.set_loading(commit.loading);
        if let Some(message) = commit.notify {
            self.sink.notify_error(&message);
        }
    }
}

async fn run_request<Q, T>(
    shared: Arc<Shared<Q, T>>,
    generation: u64,
    query: Q,
    cancel: CancellationToken,
) where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    let debounce = shared.options.debounce;
    if !debounce.is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "list request superseded during debounce");
                return;
            }
            _ = tokio::time::sleep(debounce) => {}
        }
    } else if cancel.is_cancelled() {
        return;
    }

    let fetch = shared.fetcher.fetch(&query, cancel.clone());
    let result = match shared.options.timeout {
        Some(limit) => match tokio::time::timeout(limit, fetch).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Network("request timed out".to_string())),
        },
        None => fetch.await,
    };
    shared.settle(generation, &cancel, result);
}

/// Per-view request controller. Dropping it tears it down.
pub struct ListLoader<Q, T>
where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    shared: Arc<Shared<Q, T>>,
}

impl<Q, T> ListLoader<Q, T>
where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    pub fn mount<F, S>(fetcher: F, sink: S, options: LoaderOptions) -> Self
    where
        F: Fetch<Q, T>,
        S: ListSink<T>,
    {
        Self {
            shared: Arc::new(Shared {
                fetcher: Arc::new(fetcher),
                sink: Arc::new(sink),
                options,
                lifetime: CancellationToken::new(),
                inner: Mutex::new(Inner {
                    live: true,
                    generation: 0,
                    in_flight: None,
                    view: Snapshot::default(),
                }),
            }),
        }
    }

    /// Ask for the list matching `query`. Must be called inside a Tokio runtime.
    ///
    /// The same tuple while it is loading is suppressed. A different tuple
    /// cancels the outstanding request and replaces it.
    pub fn request(&self, query: Q) -> Dispatch {
        let mut inner = self.shared.lock();
        if !inner.live {
            return Dispatch::Detached;
        }
        if let Some(flight) = inner.in_flight.take() {
            if inner.view.query.as_ref() == Some(&query) {
                debug!(generation = flight.generation, ?query, "list request already in flight");
                inner.in_flight = Some(flight);
                return Dispatch::Suppressed;
            }
            debug!(generation = flight.generation, "cancelling superseded list request");
            flight.cancel.cancel();
        }

        inner.generation += 1;
        let generation = inner.generation;
        let cancel = self.shared.lifetime.child_token();
        inner.in_flight = Some(InFlight {
            generation,
            cancel: cancel.clone(),
        });
        debug!(generation, ?query, "starting list request");
        if inner.view.begin(query.clone()) {
            self.shared.sink.set_loading(true);
        }
        drop(inner);

        let task = tokio::spawn(run_request(self.shared.clone(), generation, query, cancel));
        Dispatch::Started(RequestHandle { generation, task })
    }

    /// Re-issue the latest tuple. `None` when nothing was requested yet.
    pub fn refresh(&self) -> Option<Dispatch> {
        let query = self.shared.lock().view.query.clone()?;
        Some(self.request(query))
    }

    /// Stop accepting results and cancel the outstanding request.
    pub fn teardown(&self) {
        let mut inner = self.shared.lock();
        if !inner.live {
            return;
        }
        inner.live = false;
        if inner.in_flight.take().is_some() {
            inner.view.phase = LoadPhase::Idle;
        }
        self.shared.lifetime.cancel();
        debug!(generation = inner.generation, "list loader torn down");
    }

    pub fn is_live(&self) -> bool {
        self.shared.lock().live
    }

    pub fn phase(&self) -> LoadPhase {
        self.shared.lock().view.phase
    }

    pub fn snapshot(&self) -> Snapshot<Q, T> {
        self.shared.lock().view.clone()
    }
}

impl<Q, T> Drop for ListLoader<Q, T>
where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<Q, T> fmt::Debug for ListLoader<Q, T>
where
    Q: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ListLoader")
            .field("live", &inner.live)
            .field("generation", &inner.generation)
            .field("phase", &inner.view.phase)
            .field("query", &inner.view.query)
            .finish_non_exhaustive()
    }
}
