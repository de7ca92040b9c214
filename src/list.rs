//! Paginated live list engine.
//!
//! Merges a page-based historical fetch and a push-based live feed into one
//! ordered, de-duplicated in-memory sequence. The merge is idempotent under
//! re-delivery, which is what makes out-of-order completion of the two
//! sources safe: replaying an item from an overlapping page boundary or a
//! live push racing a pull is absorbed without duplication or reordering.
//!
//! Collaborators (how to fetch a page, how to subscribe) are supplied as
//! boxed async closures, and ordering rules as comparator/equality functions,
//! so the engine is generic over the item and filter types.

use crate::adapter::SubscriptionToken;
use crate::error::CoreError;
use crate::types::PageResponse;
use futures::future::BoxFuture;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Page-fetch collaborator: (filter, page_size, page_key) -> page.
pub type PageFetchFn<T, F> = Box<
    dyn Fn(F, usize, Option<String>) -> BoxFuture<'static, Result<PageResponse<T>, CoreError>>
        + Send
        + Sync,
>;

/// Live-feed collaborator: (filter, sink) -> cancellation token.
pub type SubscribeFn<T, F> = Box<
    dyn Fn(F, UnboundedSender<T>) -> BoxFuture<'static, Result<SubscriptionToken, CoreError>>
        + Send
        + Sync,
>;

type CompareFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;
type EqualFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// What the view layer observes: emitted on every state mutation.
///
/// A terminated live feed shows up as the `live: true -> false` transition
/// with no `stop_live()` call; re-arming is the caller's decision.
#[derive(Clone, Debug)]
pub struct ListSnapshot<T> {
    pub items: Vec<T>,
    pub exhausted: bool,
    pub live: bool,
}

impl<T> Default for ListSnapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            exhausted: false,
            live: false,
        }
    }
}

struct LiveSub {
    token: SubscriptionToken,
    drain: JoinHandle<()>,
}

struct Inner<T, F> {
    filter: Option<F>,
    items: Vec<T>,
    page_key: Option<String>,
    exhausted: bool,
    live: Option<LiveSub>,
    /// Bumped on every reset; any async completion carrying a stale
    /// generation is discarded instead of mutating post-reset state.
    generation: u64,
}

pub struct PaginatedList<T, F> {
    inner: Arc<Mutex<Inner<T, F>>>,
    fetch_page: PageFetchFn<T, F>,
    subscribe: SubscribeFn<T, F>,
    compare: CompareFn<T>,
    equal: EqualFn<T>,
    snapshot_tx: Arc<watch::Sender<ListSnapshot<T>>>,
    /// Task driving resets from an external invalidation signal.
    coupled_reset: Mutex<Option<JoinHandle<()>>>,
}

/// Merge `item` into the sorted, deduplicated `items`.
///
/// An equality-key hit replaces in place (last-writer-wins; the ordering key
/// is unchanged by definition of the equality key, so no reorder is needed).
/// Otherwise the item is inserted at the position the comparator dictates.
/// Returns true when the item was new.
fn merge_item<T>(
    items: &mut Vec<T>,
    item: T,
    compare: &dyn Fn(&T, &T) -> Ordering,
    equal: &dyn Fn(&T, &T) -> bool,
) -> bool {
    match items.binary_search_by(|existing| compare(existing, &item)) {
        Ok(pos) => {
            debug_assert!(equal(&items[pos], &item));
            items[pos] = item;
            false
        }
        Err(pos) => {
            items.insert(pos, item);
            true
        }
    }
}

impl<T, F> PaginatedList<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Clone + PartialEq + Send + Sync + 'static,
{
    /// Build an engine from its collaborators and ordering rules.
    ///
    /// `compare` defines the display order (first argument sorts earlier when
    /// `Less`); ties on the primary ordering key must be broken by the
    /// equality key's secondary component so that `Equal` holds exactly for
    /// items `equal` considers the same.
    pub fn new(
        fetch_page: PageFetchFn<T, F>,
        subscribe: SubscribeFn<T, F>,
        compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
        equal: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(ListSnapshot::default());
        Self {
            inner: Arc::new(Mutex::new(Inner {
                filter: None,
                items: Vec::new(),
                page_key: None,
                exhausted: false,
                live: None,
                generation: 0,
            })),
            fetch_page,
            subscribe,
            compare: Arc::new(compare),
            equal: Arc::new(equal),
            snapshot_tx: Arc::new(snapshot_tx),
            coupled_reset: Mutex::new(None),
        }
    }

    /// Install or replace the filter. A changed filter invalidates the whole
    /// list state (reset); an identical filter is a no-op.
    pub fn configure(&self, filter: F) {
        let mut inner = self.lock();
        if inner.filter.as_ref() == Some(&filter) {
            return;
        }
        inner.filter = Some(filter);
        reset_locked(&mut inner);
        publish(&self.snapshot_tx, &inner);
    }

    /// Cancel the live subscription, clear items and cursor, forget
    /// exhaustion. In-flight fetches become stale and will be ignored.
    pub fn reset(&self) {
        let mut inner = self.lock();
        reset_locked(&mut inner);
        publish(&self.snapshot_tx, &inner);
    }

    /// Reset the list whenever `signal` observes a new value.
    ///
    /// List contents are scoped to one backend; a network switch invalidates
    /// them the same way a filter change does, so the wiring couples the
    /// switchboard's active-network feed here. Replaces any previous
    /// coupling. Must be called within a Tokio runtime.
    pub fn reset_on<S: Send + Sync + 'static>(&self, mut signal: watch::Receiver<S>) {
        let state = Arc::clone(&self.inner);
        let snapshot_tx = Arc::clone(&self.snapshot_tx);
        let task = tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
                log::debug!("external invalidation signal, resetting list");
                reset_locked(&mut inner);
                publish(&snapshot_tx, &inner);
            }
        });
        let mut slot = self
            .coupled_reset
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Fetch and merge the next page. Returns the number of new items.
    ///
    /// No-op once exhausted. On failure the state is untouched, so the same
    /// call can be retried; a result arriving after a reset is discarded.
    pub async fn load_next_page(&self, page_size: usize) -> Result<usize, CoreError> {
        let (filter, page_key, generation) = {
            let inner = self.lock();
            if inner.exhausted {
                return Ok(0);
            }
            let filter = inner.filter.clone().ok_or_else(|| {
                CoreError::Configuration("list has no filter; call configure() first".into())
            })?;
            (filter, inner.page_key.clone(), inner.generation)
        };

        let page = (self.fetch_page)(filter, page_size, page_key).await?;

        let mut inner = self.lock();
        if inner.generation != generation {
            log::debug!("discarding stale page result (generation {generation} superseded)");
            return Ok(0);
        }
        let short = page.items.len() < page_size;
        let mut added = 0;
        for item in page.items {
            if merge_item(&mut inner.items, item, &*self.compare, &*self.equal) {
                added += 1;
            }
        }
        inner.page_key = page.next_page_key;
        if short {
            inner.exhausted = true;
        }
        publish(&self.snapshot_tx, &inner);
        Ok(added)
    }

    /// Open the live subscription for the current filter. No-op when one is
    /// already running. Delivered items go through the same merge as pages.
    pub async fn start_live(&self) -> Result<(), CoreError> {
        let (filter, generation) = {
            let inner = self.lock();
            if inner.live.is_some() {
                return Ok(());
            }
            let filter = inner.filter.clone().ok_or_else(|| {
                CoreError::Configuration("list has no filter; call configure() first".into())
            })?;
            (filter, inner.generation)
        };

        let (tx, mut rx) = unbounded_channel::<T>();
        let token = (self.subscribe)(filter, tx).await?;

        let mut inner = self.lock();
        if inner.generation != generation || inner.live.is_some() {
            // A reset or a racing start_live superseded this subscription.
            token.cancel();
            return Ok(());
        }

        let state = Arc::clone(&self.inner);
        let compare = Arc::clone(&self.compare);
        let equal = Arc::clone(&self.equal);
        let snapshot_tx = Arc::clone(&self.snapshot_tx);
        let drain = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.generation != generation {
                    return;
                }
                merge_item(&mut inner.items, item, &*compare, &*equal);
                publish(&snapshot_tx, &inner);
            }
            // Channel closed: the feed ended on the adapter side. Terminal;
            // the caller must start_live() again to resume.
            let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.generation == generation && inner.live.take().is_some() {
                log::warn!("live subscription terminated");
                publish(&snapshot_tx, &inner);
            }
        });

        inner.live = Some(LiveSub { token, drain });
        publish(&self.snapshot_tx, &inner);
        Ok(())
    }

    /// Cancel the live subscription if one is running. Idempotent.
    pub fn stop_live(&self) {
        let mut inner = self.lock();
        if let Some(live) = inner.live.take() {
            live.drain.abort();
            live.token.cancel();
            publish(&self.snapshot_tx, &inner);
        }
    }

    /// Observable handle over the list for the view layer.
    pub fn watch(&self) -> watch::Receiver<ListSnapshot<T>> {
        self.snapshot_tx.subscribe()
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    pub fn exhausted(&self) -> bool {
        self.lock().exhausted
    }

    pub fn page_key(&self) -> Option<String> {
        self.lock().page_key.clone()
    }

    pub fn is_live(&self) -> bool {
        self.lock().live.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T, F>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, F> Drop for PaginatedList<T, F> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.coupled_reset.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        // Dropping LiveSub aborts both tasks through the token/handle drops.
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(live) = inner.live.take() {
                live.drain.abort();
                drop(live.token);
            }
        }
    }
}

fn reset_locked<T, F>(inner: &mut Inner<T, F>) {
    inner.generation += 1;
    if let Some(live) = inner.live.take() {
        live.drain.abort();
        live.token.cancel();
    }
    inner.items.clear();
    inner.page_key = None;
    inner.exhausted = false;
}

fn publish<T: Clone, F>(tx: &watch::Sender<ListSnapshot<T>>, inner: &Inner<T, F>) {
    tx.send_replace(ListSnapshot {
        items: inner.items.clone(),
        exhausted: inner.exhausted,
        live: inner.live.is_some(),
    });
}
