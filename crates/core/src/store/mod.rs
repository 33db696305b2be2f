//! Account-scoped read-models over ledger data.
//!
//! A [`ReadModel`] owns one snapshot of a ledger collection. Snapshots are published through a
//! `watch` channel and replaced by value, so readers never see a partially applied refresh.
//! Refreshes are single-flight: while one is running, every other caller joins it.
use std::{
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use futures::{
    FutureExt as _, Stream,
    future::{BoxFuture, Shared},
};
use pin_project::pin_project;
use tokio::{select, sync::watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;

pub use balances::BalanceStore;
pub use history::TransferHistoryStore;

mod balances;
mod history;

/// Completion of a refresh. Cloneable, every clone resolves to the same result.
pub type Refresh = Shared<BoxFuture<'static, Result<(), FetchError>>>;

type Fetch<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, FetchError>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Arc<[T]>,
    pub is_loading: bool,
    /// Error of the most recent refresh; cleared by the next successful one.
    pub last_error: Option<FetchError>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Arc::from(Vec::new()),
            is_loading: false,
            last_error: None,
        }
    }
}

pub struct ReadModel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ReadModel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    name: &'static str,
    fetch: Fetch<T>,
    arrange: fn(&mut Vec<T>),
    state_tx: watch::Sender<Snapshot<T>>,
    in_flight: Mutex<Option<Refresh>>,
    shutdown_token: CancellationToken,
}

impl<T> ReadModel<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        name: &'static str,
        fetch: Fetch<T>,
        arrange: fn(&mut Vec<T>),
        shutdown_token: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner {
                name,
                fetch,
                arrange,
                state_tx,
                in_flight: Mutex::new(None),
                shutdown_token,
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.inner.state_tx.borrow().clone()
    }

    pub fn items(&self) -> Arc<[T]> {
        Arc::clone(&self.inner.state_tx.borrow().items)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state_tx.borrow().is_loading
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.inner.state_tx.borrow().last_error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.inner.state_tx.subscribe()
    }

    /// Stream of snapshots, yielding once per state change after subscription.
    pub fn changes(&self) -> Changes<T> {
        Changes {
            inner: WatchStream::from_changes(self.subscribe()),
        }
    }

    /// Refreshes from the ledger, joining a refresh that is already running.
    ///
    /// # Errors
    /// Returns the fetch error of the refresh this call ran or joined. The previous snapshot is
    /// kept in that case.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        self.begin_refresh().await
    }

    /// Starts a refresh (or joins the running one) without waiting for it.
    ///
    /// When this returns, `is_loading` is already set and the fetch is driven by a background
    /// task, so the returned handle may be dropped. Must be called within a tokio runtime.
    #[instrument(skip(self), fields(store = self.inner.name))]
    pub fn begin_refresh(&self) -> Refresh {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(refresh) = in_flight.as_ref() {
            debug!("joining in-flight refresh");
            return refresh.clone();
        }

        self.inner
            .state_tx
            .send_modify(|state| state.is_loading = true);
        let refresh = Arc::clone(&self.inner).run().boxed().shared();
        *in_flight = Some(refresh.clone());
        drop(in_flight);

        debug!("started refresh");

        let driver = refresh.clone();
        let shutdown_token = self.inner.shutdown_token.clone();
        let name = self.inner.name;
        tokio::spawn(async move {
            select! {
                biased;
                () = shutdown_token.cancelled() => {
                    debug!(store = name, "refresh driver stopped by shutdown");
                }
                _ = driver => {}
            }
        });

        refresh
    }
}

impl<T> Inner<T>
where
    T: Send + Sync + 'static,
{
    async fn run(self: Arc<Self>) -> Result<(), FetchError> {
        let fetched = (self.fetch)().await;

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match fetched {
            Ok(mut items) => {
                (self.arrange)(&mut items);
                debug!(store = self.name, count = items.len(), "refresh completed");
                self.state_tx.send_modify(|state| {
                    state.items = Arc::from(items);
                    state.is_loading = false;
                    state.last_error = None;
                });
                Ok(())
            }
            Err(err) => {
                warn!(store = self.name, error = %err, "refresh failed, keeping previous snapshot");
                self.state_tx.send_modify(|state| {
                    state.is_loading = false;
                    state.last_error = Some(err.clone());
                });
                Err(err)
            }
        };
        *in_flight = None;

        result
    }
}

#[pin_project]
pub struct Changes<T> {
    #[pin]
    inner: WatchStream<Snapshot<T>>,
}

impl<T> Stream for Changes<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = Snapshot<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt as _;
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    struct Gated {
        calls: AtomicUsize,
        release: Notify,
        results: Mutex<Vec<Result<Vec<u32>, FetchError>>>,
    }

    fn gated(results: Vec<Result<Vec<u32>, FetchError>>) -> (Arc<Gated>, ReadModel<u32>) {
        let gate = Arc::new(Gated {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
            results: Mutex::new(results),
        });
        let fetch_gate = Arc::clone(&gate);
        let fetch: Fetch<u32> = Arc::new(move || {
            let gate = Arc::clone(&fetch_gate);
            async move {
                gate.calls.fetch_add(1, Ordering::SeqCst);
                gate.release.notified().await;
                gate.results.lock().unwrap().remove(0)
            }
            .boxed()
        });
        let model = ReadModel::new("numbers", fetch, |items| items.sort(), CancellationToken::new());
        (gate, model)
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_fetch() {
        let (gate, model) = gated(vec![Ok(vec![3, 1, 2])]);

        let mut first = task::spawn(model.refresh());
        let mut second = task::spawn(model.refresh());
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert!(model.is_loading());
        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);

        gate.release.notify_one();
        assert_eq!(first.await, Ok(()));
        assert_ready_eq!(second.poll(), Ok(()));

        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
        assert_eq!(&*model.items(), &[1, 2, 3]);
        assert!(!model.is_loading());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_items() {
        let (gate, model) = gated(vec![
            Ok(vec![7]),
            Err(FetchError::Network("connection reset".into())),
            Ok(vec![8]),
        ]);

        gate.release.notify_one();
        model.refresh().await.unwrap();
        assert_eq!(&*model.items(), &[7]);

        gate.release.notify_one();
        let err = model.refresh().await.unwrap_err();
        assert_eq!(err, FetchError::Network("connection reset".into()));
        let snapshot = model.snapshot();
        assert_eq!(&*snapshot.items, &[7]);
        assert_eq!(snapshot.last_error, Some(err));
        assert!(!snapshot.is_loading);

        gate.release.notify_one();
        model.refresh().await.unwrap();
        assert_eq!(&*model.items(), &[8]);
        assert_eq!(model.last_error(), None);
        assert_eq!(gate.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dropped_handle_still_completes_refresh() {
        let (gate, model) = gated(vec![Ok(vec![5])]);
        let mut updates = model.subscribe();

        drop(model.begin_refresh());
        gate.release.notify_one();

        updates
            .wait_for(|state| !state.is_loading && !state.items.is_empty())
            .await
            .unwrap();
        assert_eq!(&*model.items(), &[5]);
    }

    #[tokio::test]
    async fn changes_emit_loading_then_result() {
        let (gate, model) = gated(vec![Ok(vec![4])]);
        let mut changes = model.changes();

        let refresh = model.begin_refresh();
        let loading = changes.next().await.unwrap();
        assert!(loading.is_loading);

        gate.release.notify_one();
        refresh.await.unwrap();
        let done = changes.next().await.unwrap();
        assert!(!done.is_loading);
        assert_eq!(&*done.items, &[4]);
    }
}
