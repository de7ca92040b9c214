//! The adapter contract every backend must satisfy, plus the handle type the
//! registry and switchboard pass around.
//!
//! An adapter is bound to exactly one (network, capability) pair. The core
//! never talks to a concrete backend type: historical data comes back as
//! pages through `fetch_extrinsics`, live data is pushed into a channel
//! handed to `subscribe_new_extrinsics`.

use crate::error::CoreError;
use crate::types::{Capability, ConnectionState, Extrinsic, ExtrinsicFilter, PageResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{AbortHandle, JoinHandle};

/// Cancellation token for a live subscription.
///
/// Wraps the spawned feed task; cancelling (or dropping) the token aborts it.
/// Dropping the sender side of the sink is how an adapter signals terminal
/// failure to the consumer.
pub struct SubscriptionToken {
    handle: JoinHandle<()>,
}

impl SubscriptionToken {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionToken").finish_non_exhaustive()
    }
}

/// Abort handles for the feed tasks an adapter has spawned.
///
/// `close()` must cancel in-flight work immediately, not wait for consumers
/// to drop their sinks, so each adapter tracks its spawned feeds here and
/// aborts them all on close.
#[derive(Default)]
pub struct FeedSet(Mutex<Vec<AbortHandle>>);

impl FeedSet {
    pub fn track(&self, handle: &JoinHandle<()>) {
        let mut feeds = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        feeds.retain(|h| !h.is_finished());
        feeds.push(handle.abort_handle());
    }

    pub fn abort_all(&self) {
        let mut feeds = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in feeds.drain(..) {
            handle.abort();
        }
    }
}

/// Lock-free connection state cell shared between an adapter and its handle.
#[derive(Debug)]
pub struct ConnState(AtomicU8);

impl ConnState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(Self::encode(state)))
    }

    pub fn get(&self) -> ConnectionState {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(Self::encode(state), Ordering::Release);
    }

    fn encode(state: ConnectionState) -> u8 {
        match state {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Ready => 2,
            ConnectionState::Closed => 3,
        }
    }

    fn decode(raw: u8) -> ConnectionState {
        match raw {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Ready,
            _ => ConnectionState::Closed,
        }
    }
}

impl Default for ConnState {
    fn default() -> Self {
        Self::new(ConnectionState::Idle)
    }
}

/// Contract for one backend bound to one network and one capability.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn network(&self) -> &str;
    fn capability(&self) -> Capability;
    fn connection_state(&self) -> ConnectionState;

    /// Bring the backend connection up. Called by the switchboard during
    /// activation; the adapter must be `Ready` when this resolves `Ok`.
    async fn connect(&self) -> Result<(), CoreError>;

    /// Release the backend connection, transitioning to `Closed`. Idempotent.
    async fn close(&self);

    /// Fetch one page of historical extrinsics matching `filter`, starting
    /// at the opaque `page_key` cursor (`None` = newest).
    async fn fetch_extrinsics(
        &self,
        filter: &ExtrinsicFilter,
        page_size: usize,
        page_key: Option<String>,
    ) -> Result<PageResponse<Extrinsic>, CoreError>;

    /// Open a push subscription for newly produced extrinsics matching
    /// `filter`. Items are delivered at-most-once into `sink`; dedup is the
    /// consumer's job. Dropping the returned token cancels the feed.
    async fn subscribe_new_extrinsics(
        &self,
        filter: &ExtrinsicFilter,
        sink: UnboundedSender<Extrinsic>,
    ) -> Result<SubscriptionToken, CoreError>;
}

/// One instantiated adapter bound to one network and one capability.
///
/// Cheap to clone; the underlying adapter is shared. Handles are created and
/// destroyed only by the registry.
#[derive(Clone)]
pub struct AdapterHandle {
    network: String,
    capability: Capability,
    adapter: Arc<dyn Adapter>,
}

impl AdapterHandle {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            network: adapter.network().to_string(),
            capability: adapter.capability(),
            adapter,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.adapter.connection_state()
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub(crate) async fn connect(&self) -> Result<(), CoreError> {
        self.adapter.connect().await
    }

    pub(crate) async fn close(&self) {
        self.adapter.close().await;
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("network", &self.network)
            .field("capability", &self.capability)
            .field("state", &self.connection_state())
            .finish()
    }
}
