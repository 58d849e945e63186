use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use storefront_admin::error::FetchError;
use storefront_admin::loader::{
    Dispatch, Fetch, ListLoader, ListSink, LoadPhase, LoaderOptions,
};
use storefront_admin::model::ListQuery;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

type Reply = Result<Vec<String>, FetchError>;

struct Call {
    query: ListQuery,
    cancel: CancellationToken,
    reply: Option<oneshot::Sender<Reply>>,
    aborted: bool,
}

/// Fetch fake whose calls stay pending until the test resolves them.
#[derive(Clone, Default)]
struct ScriptedFetch {
    calls: Arc<Mutex<Vec<Call>>>,
    honor_cancel: bool,
}

impl ScriptedFetch {
    fn honoring_cancel() -> Self {
        Self {
            honor_cancel: true,
            ..Default::default()
        }
    }

    async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn wait_for_calls(&self, n: usize) {
        for _ in 0..2000 {
            if self.call_count().await >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {} fetch calls, saw {}", n, self.call_count().await);
    }

    async fn resolve(&self, index: usize, reply: Reply) {
        let tx = self.calls.lock().await[index]
            .reply
            .take()
            .expect("call already resolved");
        let _ = tx.send(reply);
    }

    async fn query(&self, index: usize) -> ListQuery {
        self.calls.lock().await[index].query.clone()
    }

    async fn aborted(&self, index: usize) -> bool {
        self.calls.lock().await[index].aborted
    }

    async fn live_tokens(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| !c.cancel.is_cancelled())
            .count()
    }
}

#[async_trait::async_trait]
impl Fetch<ListQuery, String> for ScriptedFetch {
    async fn fetch(&self, query: &ListQuery, cancel: CancellationToken) -> Result<Vec<String>, FetchError> {
        let (tx, rx) = oneshot::channel();
        let index = {
            let mut calls = self.calls.lock().await;
            calls.push(Call {
                query: query.clone(),
                cancel: cancel.clone(),
                reply: Some(tx),
                aborted: false,
            });
            calls.len() - 1
        };

        if self.honor_cancel {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.calls.lock().await[index].aborted = true;
                    Err(FetchError::Cancelled)
                }
                reply = rx => reply.unwrap_or_else(|_| Err(FetchError::Network("dropped".into()))),
            }
        } else {
            rx.await
                .unwrap_or_else(|_| Err(FetchError::Network("dropped".into())))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Loading(bool),
    Items(Vec<String>),
    Error(String),
}

#[derive(Clone, Default)]
struct RecordingSink {
    events: Arc<StdMutex<Vec<Event>>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn items_commits(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Items(items) => Some(items),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

impl ListSink<String> for RecordingSink {
    fn set_loading(&self, loading: bool) {
        self.events.lock().unwrap().push(Event::Loading(loading));
    }

    fn set_items(&self, items: Vec<String>) {
        self.events.lock().unwrap().push(Event::Items(items));
    }

    fn notify_error(&self, message: &str) {
        self.events.lock().unwrap().push(Event::Error(message.to_string()));
    }
}

fn status(s: &str) -> ListQuery {
    ListQuery::default().with_status(s)
}

fn items(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn mount(fetch: &ScriptedFetch, sink: &RecordingSink, options: LoaderOptions) -> ListLoader<ListQuery, String> {
    ListLoader::mount(fetch.clone(), sink.clone(), options)
}

fn started(dispatch: Dispatch) -> storefront_admin::loader::RequestHandle {
    match dispatch {
        Dispatch::Started(handle) => handle,
        other => panic!("expected a started request, got {:?}", other),
    }
}

#[tokio::test]
async fn commits_items_and_clears_loading() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let handle = started(loader.request(status("pending")));
    assert_eq!(loader.phase(), LoadPhase::Loading);
    fetch.wait_for_calls(1).await;
    fetch.resolve(0, Ok(items(&["P-1", "P-2"]))).await;
    handle.settled().await;

    assert_eq!(
        sink.events(),
        vec![
            Event::Loading(true),
            Event::Items(items(&["P-1", "P-2"])),
            Event::Loading(false),
        ]
    );
    let snap = loader.snapshot();
    assert_eq!(snap.phase, LoadPhase::Success);
    assert_eq!(snap.query, Some(status("pending")));
    assert_eq!(snap.items, items(&["P-1", "P-2"]));
}

#[tokio::test]
async fn identical_tuple_while_pending_is_one_call() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let handle = started(loader.request(status("pending")));
    assert!(matches!(loader.request(status("pending")), Dispatch::Suppressed));
    fetch.wait_for_calls(1).await;
    assert!(matches!(loader.request(status("pending")), Dispatch::Suppressed));

    fetch.resolve(0, Ok(items(&["P-1"]))).await;
    handle.settled().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(fetch.call_count().await, 1);
    assert_eq!(sink.items_commits(), vec![items(&["P-1"])]);
}

#[tokio::test]
async fn pending_then_shipped_only_shipped_populates() {
    let fetch = ScriptedFetch::honoring_cancel();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let first = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = started(loader.request(status("shipped")));
    fetch.wait_for_calls(2).await;

    first.settled().await;
    assert!(fetch.aborted(0).await, "first call should observe its abort");
    assert_eq!(fetch.query(1).await, status("shipped"));

    fetch.resolve(1, Ok(items(&["S-1", "S-2"]))).await;
    second.settled().await;

    assert_eq!(sink.items_commits(), vec![items(&["S-1", "S-2"])]);
    assert!(sink.errors().is_empty(), "cancellation must not notify");
    let snap = loader.snapshot();
    assert_eq!(snap.phase, LoadPhase::Success);
    assert_eq!(snap.query, Some(status("shipped")));
    assert_eq!(snap.items, items(&["S-1", "S-2"]));
}

#[tokio::test]
async fn superseded_response_arriving_last_is_discarded() {
    // This fetcher ignores cancellation, so stale replies really do arrive.
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let t1 = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    let t2 = started(loader.request(status("processing")));
    fetch.wait_for_calls(2).await;
    let t3 = started(loader.request(status("shipped")));
    fetch.wait_for_calls(3).await;

    fetch.resolve(2, Ok(items(&["T3"]))).await;
    t3.settled().await;
    fetch.resolve(0, Ok(items(&["T1"]))).await;
    fetch.resolve(1, Err(FetchError::Network("late".into()))).await;
    t1.settled().await;
    t2.settled().await;

    assert_eq!(sink.items_commits(), vec![items(&["T3"])]);
    assert!(sink.errors().is_empty());
    assert_eq!(loader.snapshot().items, items(&["T3"]));
    assert_eq!(
        sink.events().last(),
        Some(&Event::Loading(false))
    );
}

#[tokio::test]
async fn never_more_than_one_live_request() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let mut handles = Vec::new();
    for (i, term) in ["m", "mu", "mug", "mugs", "mug"].iter().enumerate() {
        let q = ListQuery::default().with_search(term);
        handles.push(started(loader.request(q)));
        fetch.wait_for_calls(i + 1).await;
        assert!(fetch.live_tokens().await <= 1);
    }
    assert_eq!(fetch.live_tokens().await, 1);

    let last = handles.len() - 1;
    for i in (0..=last).rev() {
        fetch.resolve(i, Ok(items(&[format!("r{}", i).as_str()]))).await;
    }
    futures::future::join_all(handles.into_iter().map(|h| h.settled())).await;

    assert_eq!(sink.items_commits(), vec![items(&[format!("r{}", last).as_str()])]);
    assert_eq!(loader.snapshot().query, Some(ListQuery::default().with_search("mug")));
}

#[tokio::test]
async fn no_sink_calls_after_teardown() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let handle = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    loader.teardown();
    let before = sink.events().len();

    fetch.resolve(0, Ok(items(&["P-1"]))).await;
    handle.settled().await;

    assert_eq!(sink.events().len(), before);
    assert!(!loader.is_live());
    assert!(matches!(loader.request(status("shipped")), Dispatch::Detached));
    assert_eq!(fetch.call_count().await, 1);
}

#[tokio::test]
async fn teardown_while_loading_reports_idle() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let handle = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    assert_eq!(loader.phase(), LoadPhase::Loading);

    loader.teardown();
    assert_eq!(loader.phase(), LoadPhase::Idle);
    assert!(!loader.snapshot().is_loading());

    fetch.resolve(0, Ok(items(&["P-1"]))).await;
    handle.settled().await;
    assert_eq!(loader.phase(), LoadPhase::Idle);
    assert!(loader.snapshot().items.is_empty());
}

#[tokio::test]
async fn dropping_the_loader_cancels_and_mutes() {
    let fetch = ScriptedFetch::honoring_cancel();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let handle = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    let before = sink.events().len();
    drop(loader);
    handle.settled().await;

    assert!(fetch.aborted(0).await);
    assert_eq!(sink.events().len(), before);
}

#[tokio::test]
async fn failure_keeps_items_and_notifies_once() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let h = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    fetch.resolve(0, Ok(items(&["P-1"]))).await;
    h.settled().await;

    let h = started(loader.request(status("shipped")));
    fetch.wait_for_calls(2).await;
    fetch
        .resolve(
            1,
            Err(FetchError::Application {
                status: 500,
                message: "Orders service unavailable".into(),
            }),
        )
        .await;
    h.settled().await;

    assert_eq!(sink.errors(), vec!["Orders service unavailable".to_string()]);
    assert_eq!(sink.items_commits(), vec![items(&["P-1"])]);
    let snap = loader.snapshot();
    assert_eq!(snap.phase, LoadPhase::Failed);
    assert_eq!(snap.items, items(&["P-1"]));
    assert_eq!(snap.error.as_deref(), Some("Orders service unavailable"));

    // Same tuple again after the failure goes back to the network.
    let h = loader.refresh().and_then(|d| d.into_handle()).expect("refresh starts");
    fetch.wait_for_calls(3).await;
    assert_eq!(fetch.query(2).await, status("shipped"));
    fetch.resolve(2, Ok(items(&["S-1"]))).await;
    h.settled().await;

    assert_eq!(sink.errors().len(), 1);
    let snap = loader.snapshot();
    assert_eq!(snap.phase, LoadPhase::Success);
    assert_eq!(snap.items, items(&["S-1"]));
    assert!(snap.error.is_none());
}

#[tokio::test]
async fn network_failure_uses_generic_message() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let h = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    fetch
        .resolve(0, Err(FetchError::Network("connection reset by peer".into())))
        .await;
    h.settled().await;

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Network error"));
    assert!(loader.snapshot().items.is_empty());
}

#[tokio::test]
async fn transport_cancellation_is_silent() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let loader = mount(&fetch, &sink, LoaderOptions::default());

    let h = started(loader.request(status("pending")));
    fetch.wait_for_calls(1).await;
    fetch.resolve(0, Err(FetchError::Cancelled)).await;
    h.settled().await;

    assert!(sink.errors().is_empty());
    assert_eq!(sink.events(), vec![Event::Loading(true), Event::Loading(false)]);
    assert_eq!(loader.phase(), LoadPhase::Idle);
}

#[tokio::test]
async fn timeout_is_a_network_failure() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let options = LoaderOptions {
        timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let loader = mount(&fetch, &sink, options);

    let h = started(loader.request(status("pending")));
    h.settled().await;

    assert_eq!(sink.errors().len(), 1);
    assert_eq!(loader.phase(), LoadPhase::Failed);
}

#[tokio::test]
async fn debounce_collapses_a_typing_burst() {
    let fetch = ScriptedFetch::default();
    let sink = RecordingSink::default();
    let options = LoaderOptions {
        debounce: Duration::from_millis(30),
        ..Default::default()
    };
    let loader = mount(&fetch, &sink, options);

    let mut last = None;
    for term in ["b", "bl", "blu", "blue"] {
        last = loader.request(ListQuery::default().with_search(term)).into_handle();
    }
    fetch.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(fetch.call_count().await, 1);
    assert_eq!(fetch.query(0).await, ListQuery::default().with_search("blue"));

    fetch.resolve(0, Ok(items(&["Blue mug"]))).await;
    last.expect("last request started").settled().await;
    assert_eq!(sink.items_commits(), vec![items(&["Blue mug"])]);
    assert_eq!(
        sink.events().iter().filter(|e| **e == Event::Loading(true)).count(),
        1
    );
}
