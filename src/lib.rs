//! chainlens - multi-source sync core for a blockchain explorer
//!
//! This library is the data plane behind an explorer UI: it multiplexes
//! pluggable backend adapters per network, switches the active network at
//! runtime with clean teardown, and drives live-paginated lists that merge
//! historical pages with a push feed into one deduplicated, sorted sequence.
//!
//! ## Architecture
//!
//! - [`registry::AdapterRegistry`] constructs and owns adapter instances per
//!   (network, capability), lazily from [`config::Config`].
//! - [`switchboard::NetworkSwitchboard`] keeps at most one network active and
//!   guarantees full disposal of the previous adapter set on switch.
//! - [`router::CapabilityRouter`] resolves capability calls against the
//!   active set so callers never touch a concrete adapter.
//! - [`list::PaginatedList`] merges page fetches and live deliveries into an
//!   ordered, deduplicated sequence observable through a watch channel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chainlens::{config, extrinsics, registry::AdapterRegistry,
//!                 router::CapabilityRouter, switchboard::NetworkSwitchboard,
//!                 types::{Capability, ExtrinsicFilter}};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), chainlens::error::CoreError> {
//! let cfg = config::load_from_path(std::path::Path::new("networks.toml"))?;
//! let registry = Arc::new(AdapterRegistry::new(cfg));
//! let switchboard = Arc::new(NetworkSwitchboard::new(registry));
//! switchboard.activate("polkadot").await?;
//!
//! let router = CapabilityRouter::new(switchboard);
//! let list = extrinsics::extrinsic_list(router, Capability::IndexApi);
//! list.configure(ExtrinsicFilter { signed: Some(true), ..Default::default() });
//! list.load_next_page(100).await?;
//! list.start_live().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod chain_rpc;
pub mod config;
pub mod error;
pub mod extrinsics;
pub mod index_api;
pub mod list;
pub mod registry;
pub mod router;
pub mod rpc_utils;
pub mod switchboard;
pub mod types;

// Re-export commonly used types
pub use adapter::{Adapter, AdapterHandle, SubscriptionToken};
pub use config::{Config, NetworkConfig};
pub use error::CoreError;
pub use extrinsics::{extrinsic_list, ExtrinsicList};
pub use list::{ListSnapshot, PaginatedList};
pub use registry::AdapterRegistry;
pub use router::CapabilityRouter;
pub use switchboard::{ActiveSet, NetworkSwitchboard};
pub use types::{Capability, ConnectionState, Extrinsic, ExtrinsicFilter, PageResponse};
