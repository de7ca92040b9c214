//! Per-network adapter instances, constructed lazily from configuration.
//!
//! The registry owns every `AdapterHandle` it hands out: handles live until
//! their network is disposed (network switch) or the registry is dropped.
//! Construction is a capability-keyed table resolved once per activation,
//! never a per-call dynamic lookup.

use crate::adapter::{Adapter, AdapterHandle};
use crate::chain_rpc::ChainRpcAdapter;
use crate::config::Config;
use crate::error::CoreError;
use crate::index_api::IndexApiAdapter;
use crate::types::Capability;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub struct AdapterRegistry {
    config: Config,
    adapters: Mutex<HashMap<(String, Capability), AdapterHandle>>,
}

impl AdapterRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Capabilities the named network's configuration declares, i.e. the set
    /// the switchboard must bring up on activation.
    pub fn capabilities(&self, network: &str) -> Result<Vec<Capability>, CoreError> {
        Ok(self.config.network(network)?.capabilities())
    }

    /// Return the cached handle for (network, capability), constructing the
    /// adapter from configuration on first request. Missing configuration is
    /// reported synchronously.
    pub fn get_or_create(
        &self,
        network: &str,
        capability: Capability,
    ) -> Result<AdapterHandle, CoreError> {
        let mut adapters = self.lock();
        if let Some(handle) = adapters.get(&(network.to_string(), capability)) {
            return Ok(handle.clone());
        }

        let net_cfg = self.config.network(network)?;
        let url = net_cfg.endpoint(capability)?;
        let adapter: Arc<dyn Adapter> = match capability {
            Capability::ChainRpc => Arc::new(ChainRpcAdapter::new(network, url, &self.config)),
            Capability::IndexApi => Arc::new(IndexApiAdapter::new(network, url, &self.config)),
        };
        let handle = AdapterHandle::new(adapter);
        log::debug!("created {capability} adapter for network '{network}'");
        adapters.insert((network.to_string(), capability), handle.clone());
        Ok(handle)
    }

    /// Cache a pre-constructed adapter under its (network, capability) slot,
    /// replacing any existing handle. Lets embedders plug in custom backends.
    pub fn register(&self, adapter: Arc<dyn Adapter>) {
        let handle = AdapterHandle::new(adapter);
        let key = (handle.network().to_string(), handle.capability());
        self.lock().insert(key, handle);
    }

    /// Tear down and remove every handle for `network`, closing the
    /// underlying connections. Idempotent.
    pub async fn dispose(&self, network: &str) {
        let removed: Vec<AdapterHandle> = {
            let mut adapters = self.lock();
            let mut removed = Vec::new();
            adapters.retain(|(net, _), handle| {
                if net == network {
                    removed.push(handle.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };
        for handle in &removed {
            handle.close().await;
        }
        if !removed.is_empty() {
            log::info!(
                "disposed {} adapter(s) for network '{network}'",
                removed.len()
            );
        }
    }

    /// Number of live handles held for `network`.
    pub fn handle_count(&self, network: &str) -> usize {
        self.lock().keys().filter(|(net, _)| net == network).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, Capability), AdapterHandle>> {
        self.adapters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
