//! "chain-rpc" capability adapter: talks JSON-RPC to a chain node.
//!
//! The node has no server-side filtering or cursors, so pages are produced by
//! walking blocks backward from a height cursor and filtering client-side,
//! and the live feed is a head-polling loop with bounded catch-up.

use crate::adapter::{Adapter, ConnState, FeedSet, SubscriptionToken};
use crate::config::Config;
use crate::error::CoreError;
use crate::rpc_utils::{get_block, get_head_number, health_check};
use crate::types::{Capability, ConnectionState, Extrinsic, ExtrinsicFilter, PageResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Duration};

pub struct ChainRpcAdapter {
    network: String,
    url: String,
    state: ConnState,
    rpc_timeout_ms: u64,
    poll_interval_ms: u64,
    poll_max_catchup: u64,
    auth_token: Option<String>,
    feeds: FeedSet,
}

impl ChainRpcAdapter {
    pub fn new(network: &str, url: &str, cfg: &Config) -> Self {
        Self {
            network: network.to_string(),
            url: url.to_string(),
            state: ConnState::default(),
            rpc_timeout_ms: cfg.rpc_timeout_ms,
            poll_interval_ms: cfg.poll_interval_ms,
            poll_max_catchup: cfg.poll_max_catchup,
            auth_token: cfg.auth_token.clone(),
            feeds: FeedSet::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockPayload {
    number: u64,
    #[serde(default)]
    datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    extrinsics: Vec<BlockExtrinsic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockExtrinsic {
    extrinsic_idx: u32,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    call_module: Option<String>,
    #[serde(default)]
    call_name: Option<String>,
    #[serde(default)]
    signed: Option<i32>,
    #[serde(default)]
    multi_address_account_id: Option<String>,
}

impl BlockPayload {
    /// Extrinsic rows of this block, newest index first.
    fn into_extrinsics(self) -> Vec<Extrinsic> {
        let number = self.number;
        let datetime = self.datetime;
        self.extrinsics
            .into_iter()
            .rev()
            .map(|xt| Extrinsic {
                block_number: number,
                extrinsic_idx: xt.extrinsic_idx,
                hash: xt.hash,
                call_module: xt.call_module,
                call_name: xt.call_name,
                signed: xt.signed,
                multi_address_account_id: xt.multi_address_account_id,
                block_datetime: datetime,
            })
            .collect()
    }
}

fn parse_block(raw: serde_json::Value) -> anyhow::Result<BlockPayload> {
    Ok(serde_json::from_value(raw)?)
}

#[async_trait]
impl Adapter for ChainRpcAdapter {
    fn network(&self) -> &str {
        &self.network
    }

    fn capability(&self) -> Capability {
        Capability::ChainRpc
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<(), CoreError> {
        self.state.set(ConnectionState::Connecting);
        match health_check(&self.url, self.rpc_timeout_ms, self.auth_token.as_deref()).await {
            Ok(()) => {
                self.state.set(ConnectionState::Ready);
                log::info!("chain-rpc ready for '{}' at {}", self.network, self.url);
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Idle);
                Err(CoreError::TransientFetch(e))
            }
        }
    }

    async fn close(&self) {
        self.feeds.abort_all();
        self.state.set(ConnectionState::Closed);
        log::debug!("chain-rpc closed for '{}'", self.network);
    }

    async fn fetch_extrinsics(
        &self,
        filter: &ExtrinsicFilter,
        page_size: usize,
        page_key: Option<String>,
    ) -> Result<PageResponse<Extrinsic>, CoreError> {
        let start = match page_key {
            Some(key) => key.parse::<u64>().map_err(|_| {
                CoreError::Configuration(format!("bad chain-rpc page key '{key}'"))
            })?,
            None => get_head_number(&self.url, self.rpc_timeout_ms, self.auth_token.as_deref())
                .await?,
        };

        let mut items = Vec::new();
        let mut height = start;
        loop {
            let raw = get_block(
                &self.url,
                height,
                self.rpc_timeout_ms,
                self.auth_token.as_deref(),
            )
            .await?;
            let block = parse_block(raw)?;
            items.extend(block.into_extrinsics().into_iter().filter(|x| filter.matches(x)));

            if height == 0 {
                // Genesis reached; short page signals exhaustion upstream.
                return Ok(PageResponse {
                    items,
                    next_page_key: None,
                });
            }
            height -= 1;

            // Whole blocks only, so the height cursor never splits a block's
            // rows across pages. A page may run slightly over page_size.
            if items.len() >= page_size {
                return Ok(PageResponse {
                    items,
                    next_page_key: Some(height.to_string()),
                });
            }
        }
    }

    async fn subscribe_new_extrinsics(
        &self,
        filter: &ExtrinsicFilter,
        sink: UnboundedSender<Extrinsic>,
    ) -> Result<SubscriptionToken, CoreError> {
        let url = self.url.clone();
        let timeout = self.rpc_timeout_ms;
        let interval = self.poll_interval_ms;
        let catchup = self.poll_max_catchup;
        let auth = self.auth_token.clone();
        let filter = filter.clone();
        let network = self.network.clone();

        let handle = tokio::spawn(async move {
            // non-overlapping poll loop, catch-up limited per tick
            let mut last_height: u64 = 0;
            loop {
                match get_head_number(&url, timeout, auth.as_deref()).await {
                    Ok(latest) => {
                        if last_height == 0 {
                            last_height = latest;
                            log::info!("chain-rpc feed for '{network}' starting at block {latest}");
                        }
                        if latest > last_height {
                            let start = last_height + 1;
                            let end = latest.min(start + catchup - 1);
                            for h in start..=end {
                                match get_block(&url, h, timeout, auth.as_deref()).await {
                                    Ok(raw) => match parse_block(raw) {
                                        Ok(block) => {
                                            for xt in block.into_extrinsics() {
                                                if filter.matches(&xt)
                                                    && sink.send(xt).is_err()
                                                {
                                                    // consumer gone
                                                    return;
                                                }
                                            }
                                            last_height = h;
                                        }
                                        Err(e) => {
                                            log::warn!("bad block payload at {h}: {e:?}");
                                            last_height = h;
                                        }
                                    },
                                    Err(e) => {
                                        log::warn!("failed to fetch block {h}: {e:?}");
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("chain-rpc head poll error for '{network}': {e:?}");
                    }
                }

                if sink.is_closed() {
                    return;
                }
                sleep(Duration::from_millis(interval)).await;
            }
        });
        self.feeds.track(&handle);

        Ok(SubscriptionToken::new(handle))
    }
}
