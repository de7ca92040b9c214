//! Runtime network switching with clean teardown/rebuild of adapter sets.
//!
//! At most one network is active at a time. Activation is all-or-nothing:
//! every capability the network's configuration declares must come up
//! `Ready`, otherwise whatever was partially acquired is disposed and the
//! switchboard returns to `NoActive`.

use crate::adapter::AdapterHandle;
use crate::error::CoreError;
use crate::registry::AdapterRegistry;
use crate::types::Capability;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// The live capability -> handle mapping for exactly one network.
///
/// Mutated only by the switchboard; everyone else (the router) reads clones.
#[derive(Clone, Debug)]
pub struct ActiveSet {
    network: String,
    handles: HashMap<Capability, AdapterHandle>,
}

impl ActiveSet {
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn handle(&self, capability: Capability) -> Option<&AdapterHandle> {
        self.handles.get(&capability)
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.handles.keys().copied().collect()
    }
}

#[derive(Debug)]
enum SwitchState {
    NoActive,
    Activating(String),
    Active(ActiveSet),
}

pub struct NetworkSwitchboard {
    registry: Arc<AdapterRegistry>,
    state: Mutex<SwitchState>,
    /// Serializes activate/deactivate so two sets never exist transiently.
    gate: tokio::sync::Mutex<()>,
    /// Announces every active-network transition; consumers holding
    /// per-network state (the list engines) invalidate on it.
    network_tx: watch::Sender<Option<String>>,
}

impl NetworkSwitchboard {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        let (network_tx, _) = watch::channel(None);
        Self {
            registry,
            state: Mutex::new(SwitchState::NoActive),
            gate: tokio::sync::Mutex::new(()),
            network_tx,
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Observe active-network changes. A new value means any state scoped to
    /// the previous network is stale.
    pub fn network_watch(&self) -> watch::Receiver<Option<String>> {
        self.network_tx.subscribe()
    }

    /// Snapshot of the current active set, if any.
    pub fn active_set(&self) -> Option<ActiveSet> {
        match &*self.lock() {
            SwitchState::Active(set) => Some(set.clone()),
            _ => None,
        }
    }

    pub fn active_network(&self) -> Option<String> {
        self.active_set().map(|s| s.network.clone())
    }

    /// Make `network` the active network.
    ///
    /// Deactivates the previous network first (full disposal of its handles),
    /// then acquires and connects a handle for every configured capability.
    /// Concurrent calls are serialized; re-activating the already-active
    /// network is a no-op.
    pub async fn activate(&self, network: &str) -> Result<(), CoreError> {
        let _gate = self.gate.lock().await;

        if self.active_network().as_deref() == Some(network) {
            log::debug!("network '{network}' already active");
            return Ok(());
        }

        self.teardown().await;

        let capabilities = match self.registry.capabilities(network) {
            Ok(caps) => caps,
            Err(e) => {
                // unknown network; nothing was acquired
                return Err(e);
            }
        };
        *self.lock() = SwitchState::Activating(network.to_string());
        log::info!("activating network '{network}' ({} capabilities)", capabilities.len());

        let mut handles = HashMap::new();
        for capability in capabilities {
            match self.registry.get_or_create(network, capability) {
                Ok(handle) => {
                    handles.insert(capability, handle);
                }
                Err(e) => {
                    self.rollback(network).await;
                    return Err(e);
                }
            }
        }

        // Await readiness of every handle; any failure rolls the whole
        // activation back so no partial adapters are left open.
        for handle in handles.values() {
            if let Err(e) = handle.connect().await {
                log::warn!(
                    "activation of '{network}' failed on {}: {e}",
                    handle.capability()
                );
                self.rollback(network).await;
                return Err(e);
            }
        }

        *self.lock() = SwitchState::Active(ActiveSet {
            network: network.to_string(),
            handles,
        });
        self.network_tx.send_replace(Some(network.to_string()));
        log::info!("network '{network}' active");
        Ok(())
    }

    /// Dispose the active network's handles and return to `NoActive`.
    /// No-op when nothing is active.
    pub async fn deactivate(&self) {
        let _gate = self.gate.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        let previous = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, SwitchState::NoActive) {
                SwitchState::Active(set) => Some(set.network),
                SwitchState::Activating(network) => Some(network),
                SwitchState::NoActive => None,
            }
        };
        if let Some(network) = previous {
            log::info!("deactivating network '{network}'");
            self.registry.dispose(&network).await;
            self.network_tx.send_replace(None);
        }
    }

    async fn rollback(&self, network: &str) {
        self.registry.dispose(network).await;
        *self.lock() = SwitchState::NoActive;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SwitchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
