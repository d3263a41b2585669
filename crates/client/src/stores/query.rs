//! Reactive query cells.
//!
//! A [`QueryCell`] caches the result of one pull-API query and publishes every
//! change through a `watch` channel. Reads are single-flight and
//! stale-while-revalidate: an invalidated value stays visible, marked stale,
//! until the next read refetches it.
//!
//! ### Example
//!
//! ```rust,ignore
//! let count: QueryCell<u64> = QueryCell::new("unread_count");
//!
//! // Fetches once, then serves the cached value until invalidated.
//! let n = count.read(|| api.unread_count()).await?;
//!
//! // Any number of invalidations collapse into one refetch on the next read.
//! count.invalidate();
//! count.invalidate();
//! let n = count.read(|| api.unread_count()).await?;
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bestflow_shared::ApiError;
use tokio::sync::watch;

/// Lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never fetched, or cleared
    Idle,
    /// First fetch in flight
    Loading,
    Fresh,
    /// Invalidated; the next read refetches
    Stale,
    /// Last fetch failed. Retry by reading again.
    Failed,
}

/// What consumers observe.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<ApiError>,
}

impl<T> QuerySnapshot<T> {
    fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.status == QueryStatus::Stale
    }
}

type Patch<T> = Box<dyn Fn(&mut T) + Send + Sync>;

struct CellState<T> {
    snapshot: QuerySnapshot<T>,
    /// Bumped by every invalidation
    generation: u64,
    /// Bumped by direct writes; a fetch that straddles one is discarded
    version: u64,
    in_flight: bool,
    /// Patches applied while a fetch was in flight, replayed on its result
    pending: Vec<Patch<T>>,
}

pub struct QueryCell<T> {
    name: &'static str,
    state: Mutex<CellState<T>>,
    snapshot_tx: watch::Sender<QuerySnapshot<T>>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl<T> std::fmt::Debug for QueryCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCell")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<T> QueryCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        let (snapshot_tx, _) = watch::channel(QuerySnapshot::idle());
        Self {
            name,
            state: Mutex::new(CellState {
                snapshot: QuerySnapshot::idle(),
                generation: 0,
                version: 0,
                in_flight: false,
                pending: Vec::new(),
            }),
            snapshot_tx,
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.lock().snapshot.clone()
    }

    pub fn status(&self) -> QueryStatus {
        self.lock().snapshot.status
    }

    pub fn peek(&self) -> Option<T> {
        self.lock().snapshot.data.clone()
    }

    pub fn watch(&self) -> watch::Receiver<QuerySnapshot<T>> {
        self.snapshot_tx.subscribe()
    }

    /// Return the cached value if fresh, otherwise fetch it.
    ///
    /// Concurrent callers share one fetch. A fetch error is stored as
    /// [`QueryStatus::Failed`] and returned; any cached value is kept.
    pub async fn read<F, Fut>(&self, fetch: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Some(data) = self.fresh() {
            return Ok(data);
        }
        let _single_flight = self.fetch_lock.lock().await;
        // Another reader may have filled the cell while we waited
        if let Some(data) = self.fresh() {
            return Ok(data);
        }

        let (generation, version) = self.begin_fetch();
        let mut in_flight = InFlight { cell: self, armed: true };
        let result = fetch().await;
        in_flight.armed = false;
        self.complete_fetch(generation, version, result)
    }

    /// Mark the cached value stale. Repeated calls before the next read
    /// collapse into a single refetch.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        if state.snapshot.status == QueryStatus::Fresh {
            state.snapshot.status = QueryStatus::Stale;
            tracing::debug!(query = self.name, "query invalidated");
            self.publish(&state);
        }
    }

    /// Overwrite the cached value. A fetch already in flight is discarded.
    pub fn set(&self, value: T) {
        let mut state = self.lock();
        state.version = state.version.wrapping_add(1);
        state.pending.clear();
        state.snapshot = QuerySnapshot {
            data: Some(value),
            status: QueryStatus::Fresh,
            error: None,
        };
        self.publish(&state);
    }

    /// Edit the cached value in place without changing its status.
    ///
    /// While a fetch is in flight the patch is also replayed on its result.
    /// Patches must therefore be idempotent. Returns whether a cached value
    /// was edited.
    pub fn patch(&self, patch: impl Fn(&mut T) + Send + Sync + 'static) -> bool {
        let mut state = self.lock();
        let applied = match state.snapshot.data.as_mut() {
            Some(data) => {
                patch(data);
                true
            }
            None => false,
        };
        if state.in_flight {
            state.pending.push(Box::new(patch));
        }
        if applied {
            self.publish(&state);
        }
        applied
    }

    /// Forget everything. A fetch already in flight is discarded.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.version = state.version.wrapping_add(1);
        state.generation = state.generation.wrapping_add(1);
        state.pending.clear();
        state.snapshot = QuerySnapshot::idle();
        self.publish(&state);
    }

    fn lock(&self) -> MutexGuard<'_, CellState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CellState<T>) {
        self.snapshot_tx.send_replace(state.snapshot.clone());
    }

    fn fresh(&self) -> Option<T> {
        let state = self.lock();
        match state.snapshot.status {
            QueryStatus::Fresh => state.snapshot.data.clone(),
            _ => None,
        }
    }

    fn begin_fetch(&self) -> (u64, u64) {
        let mut state = self.lock();
        state.in_flight = true;
        state.pending.clear();
        if state.snapshot.data.is_none() {
            state.snapshot.status = QueryStatus::Loading;
            state.snapshot.error = None;
            self.publish(&state);
        }
        tracing::debug!(query = self.name, "fetching query");
        (state.generation, state.version)
    }

    fn complete_fetch(
        &self,
        generation: u64,
        version: u64,
        result: Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = self.lock();
        state.in_flight = false;
        let pending = std::mem::take(&mut state.pending);

        if state.version != version {
            tracing::debug!(query = self.name, "discarding fetch overtaken by a direct write");
            return match (&state.snapshot.data, result) {
                (Some(current), _) => Ok(current.clone()),
                (None, result) => result,
            };
        }

        match result {
            Ok(mut value) => {
                for patch in &pending {
                    patch(&mut value);
                }
                let status = if state.generation == generation {
                    QueryStatus::Fresh
                } else {
                    // Invalidated mid-flight: keep the result, but it may predate the change
                    QueryStatus::Stale
                };
                state.snapshot = QuerySnapshot {
                    data: Some(value.clone()),
                    status,
                    error: None,
                };
                self.publish(&state);
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(query = self.name, error = %e, "query fetch failed");
                state.snapshot.status = QueryStatus::Failed;
                state.snapshot.error = Some(e.clone());
                self.publish(&state);
                Err(e)
            }
        }
    }
}

/// Clears the in-flight flag when a read is cancelled mid-fetch.
struct InFlight<'a, T> {
    cell: &'a QueryCell<T>,
    armed: bool,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cell.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        state.pending.clear();
        if state.snapshot.status == QueryStatus::Loading {
            state.snapshot.status = QueryStatus::Idle;
            self.cell.snapshot_tx.send_replace(QuerySnapshot::idle());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn reads_are_cached_until_invalidated() {
        let cell = QueryCell::<u64>::new("count");
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(5)
        };

        assert_eq!(cell.read(fetch).await.unwrap(), 5);
        assert_eq!(cell.read(fetch).await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cell.invalidate();
        cell.invalidate();
        cell.invalidate();
        assert_eq!(cell.status(), QueryStatus::Stale);
        assert_eq!(cell.peek(), Some(5));

        cell.read(fetch).await.unwrap();
        cell.read(fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cell.status(), QueryStatus::Fresh);
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let cell = Arc::new(QueryCell::<u64>::new("count"));
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let cell = cell.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cell.read(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = release_rx.await;
                    Ok(9)
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let cell = cell.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cell.read(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(10)
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        release_tx.send(()).unwrap();

        assert_eq!(first.await.unwrap().unwrap(), 9);
        assert_eq!(second.await.unwrap().unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn direct_set_wins_over_in_flight_fetch() {
        let cell = Arc::new(QueryCell::<u64>::new("count"));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let reader = {
            let cell = cell.clone();
            tokio::spawn(async move {
                cell.read(|| async move {
                    let _ = release_rx.await;
                    Ok(1)
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cell.status(), QueryStatus::Loading);

        cell.set(7);
        release_tx.send(()).unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), 7);
        assert_eq!(cell.peek(), Some(7));
        assert_eq!(cell.status(), QueryStatus::Fresh);
    }

    #[tokio::test]
    async fn fetch_straddling_invalidation_lands_stale() {
        let cell = Arc::new(QueryCell::<u64>::new("count"));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let reader = {
            let cell = cell.clone();
            tokio::spawn(async move {
                cell.read(|| async move {
                    let _ = release_rx.await;
                    Ok(1)
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        cell.invalidate();
        release_tx.send(()).unwrap();
        reader.await.unwrap().unwrap();

        assert_eq!(cell.peek(), Some(1));
        assert_eq!(cell.status(), QueryStatus::Stale);
    }

    #[tokio::test]
    async fn patches_during_fetch_are_replayed() {
        let cell = Arc::new(QueryCell::<Vec<u32>>::new("list"));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let reader = {
            let cell = cell.clone();
            tokio::spawn(async move {
                cell.read(|| async move {
                    let _ = release_rx.await;
                    Ok(vec![1, 2])
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert!(!cell.patch(|v| {
            v.retain(|x| *x != 3);
            v.insert(0, 3);
        }));
        release_tx.send(()).unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), vec![3, 1, 2]);
        assert_eq!(cell.peek(), Some(vec![3, 1, 2]));
    }

    #[tokio::test]
    async fn failures_are_distinct_from_empty_and_retryable() {
        let cell = QueryCell::<Vec<u32>>::new("list");
        let err = cell
            .read(|| async { Err(ApiError::Network("down".to_string())) })
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let snapshot = cell.snapshot();
        assert_eq!(snapshot.status, QueryStatus::Failed);
        assert_eq!(snapshot.data, None);
        assert!(snapshot.error.is_some());

        assert_eq!(cell.read(|| async { Ok(Vec::new()) }).await.unwrap(), Vec::<u32>::new());
        let snapshot = cell.snapshot();
        assert_eq!(snapshot.status, QueryStatus::Fresh);
        assert_eq!(snapshot.data, Some(Vec::new()));
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn clear_resets_to_idle() {
        let cell = QueryCell::<u64>::new("count");
        cell.set(3);
        let mut rx = cell.watch();
        cell.clear();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, QueryStatus::Idle);
        assert_eq!(cell.peek(), None);
    }
}
