//! Capability routing over the current active set.
//!
//! Callers never reference a concrete adapter: they name a capability and the
//! router resolves it against whatever network is active right now. Pure
//! routing, no caching, no business logic.

use crate::adapter::{AdapterHandle, SubscriptionToken};
use crate::error::CoreError;
use crate::switchboard::NetworkSwitchboard;
use crate::types::{Capability, Extrinsic, ExtrinsicFilter, PageResponse};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

#[derive(Clone)]
pub struct CapabilityRouter {
    switchboard: Arc<NetworkSwitchboard>,
}

impl CapabilityRouter {
    pub fn new(switchboard: Arc<NetworkSwitchboard>) -> Self {
        Self { switchboard }
    }

    /// Active-network change feed, for callers holding per-network state.
    pub fn network_watch(&self) -> watch::Receiver<Option<String>> {
        self.switchboard.network_watch()
    }

    /// Resolve `capability` against the current active set.
    pub fn resolve(&self, capability: Capability) -> Result<AdapterHandle, CoreError> {
        let set = self.switchboard.active_set().ok_or(CoreError::NotActive)?;
        set.handle(capability)
            .cloned()
            .ok_or_else(|| CoreError::CapabilityUnavailable {
                network: set.network().to_string(),
                capability,
            })
    }

    pub async fn fetch_extrinsics(
        &self,
        capability: Capability,
        filter: &ExtrinsicFilter,
        page_size: usize,
        page_key: Option<String>,
    ) -> Result<PageResponse<Extrinsic>, CoreError> {
        self.resolve(capability)?
            .adapter()
            .fetch_extrinsics(filter, page_size, page_key)
            .await
    }

    pub async fn subscribe_new_extrinsics(
        &self,
        capability: Capability,
        filter: &ExtrinsicFilter,
        sink: UnboundedSender<Extrinsic>,
    ) -> Result<SubscriptionToken, CoreError> {
        self.resolve(capability)?
            .adapter()
            .subscribe_new_extrinsics(filter, sink)
            .await
    }
}
