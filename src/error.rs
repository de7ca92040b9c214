//! Error taxonomy for the sync core.
//!
//! Every variant maps to a distinct caller decision: configuration errors are
//! fatal to the operation and never retried, transient fetch failures are safe
//! to retry with identical arguments, and a terminated subscription needs an
//! explicit `start_live()` to resume.

use crate::types::Capability;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or invalid network/capability configuration. Surfaced
    /// synchronously, never retried automatically.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation was attempted while no network is active.
    #[error("no active network; call activate() first")]
    NotActive,

    /// The active set has no adapter for the requested capability.
    /// Permanent for that network.
    #[error("network '{network}' has no '{capability}' capability")]
    CapabilityUnavailable {
        network: String,
        capability: Capability,
    },

    /// Network or page-fetch failure. The list state is left unmodified, so
    /// retrying the same request is safe.
    #[error("transient fetch failure: {0}")]
    TransientFetch(#[from] anyhow::Error),

    /// The live feed ended or errored. Callers must re-subscribe.
    #[error("live subscription terminated")]
    SubscriptionTerminated,
}

impl CoreError {
    /// True when retrying the same call with identical arguments may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransientFetch(_))
    }
}
