//! "index-api" capability adapter: talks to the indexing service.
//!
//! Historical pages come from the HTTP API; new items are pushed over a
//! WebSocket derived from the same endpoint (`http(s)` -> `ws(s)`, `/ws`).

use crate::adapter::{Adapter, ConnState, FeedSet, SubscriptionToken};
use crate::config::Config;
use crate::error::CoreError;
use crate::rpc_utils::http_client;
use crate::types::{Capability, ConnectionState, Extrinsic, ExtrinsicFilter, PageResponse};
use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message;

pub struct IndexApiAdapter {
    network: String,
    api_url: String,
    state: ConnState,
    timeout_ms: u64,
    auth_token: Option<String>,
    feeds: FeedSet,
}

impl IndexApiAdapter {
    pub fn new(network: &str, url: &str, cfg: &Config) -> Self {
        Self {
            network: network.to_string(),
            api_url: url.trim_end_matches('/').to_string(),
            state: ConnState::default(),
            timeout_ms: cfg.rpc_timeout_ms,
            auth_token: cfg.auth_token.clone(),
            feeds: FeedSet::default(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = http_client()
            .post(format!("{}/{path}", self.api_url))
            .timeout(Duration::from_millis(self.timeout_ms));
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }
}

/// Derive the push endpoint from the HTTP API endpoint.
fn ws_endpoint(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{swapped}/ws")
}

#[async_trait]
impl Adapter for IndexApiAdapter {
    fn network(&self) -> &str {
        &self.network
    }

    fn capability(&self) -> Capability {
        Capability::IndexApi
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<(), CoreError> {
        self.state.set(ConnectionState::Connecting);
        let res = self
            .request("status")
            .json(&json!({}))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match res {
            Ok(_) => {
                self.state.set(ConnectionState::Ready);
                log::info!("index-api ready for '{}' at {}", self.network, self.api_url);
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Idle);
                Err(CoreError::TransientFetch(
                    anyhow::Error::new(e).context("index-api status check failed"),
                ))
            }
        }
    }

    async fn close(&self) {
        self.feeds.abort_all();
        self.state.set(ConnectionState::Closed);
        log::debug!("index-api closed for '{}'", self.network);
    }

    async fn fetch_extrinsics(
        &self,
        filter: &ExtrinsicFilter,
        page_size: usize,
        page_key: Option<String>,
    ) -> Result<PageResponse<Extrinsic>, CoreError> {
        let body = json!({
            "filter": filter.to_query(),
            "pageSize": page_size,
            "pageKey": page_key,
        });
        let res = self
            .request("extrinsics")
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::TransientFetch(e.into()))?;
        if !res.status().is_success() {
            return Err(CoreError::TransientFetch(anyhow!(
                "index-api http {}",
                res.status()
            )));
        }
        let page: PageResponse<Extrinsic> = res
            .json()
            .await
            .map_err(|e| CoreError::TransientFetch(anyhow::Error::new(e).context("bad page payload")))?;
        Ok(page)
    }

    async fn subscribe_new_extrinsics(
        &self,
        filter: &ExtrinsicFilter,
        sink: UnboundedSender<Extrinsic>,
    ) -> Result<SubscriptionToken, CoreError> {
        let ws_url = ws_endpoint(&self.api_url);
        let (ws, _) = connect_async(&ws_url)
            .await
            .map_err(|e| CoreError::TransientFetch(anyhow::Error::new(e).context("ws connect")))?;
        let (mut ws_write, mut ws_read) = ws.split();

        // Filter handshake; the service only pushes matching extrinsics back.
        let subscribe_msg = json!({
            "type": "subscribeNewExtrinsic",
            "filter": filter.to_query(),
        });
        ws_write
            .send(Message::Text(subscribe_msg.to_string()))
            .await
            .map_err(|e| {
                CoreError::TransientFetch(anyhow::Error::new(e).context("ws subscribe"))
            })?;

        let network = self.network.clone();
        let handle = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("index-api feed error for '{network}': {e}");
                        break;
                    }
                };
                if !msg.is_text() {
                    continue;
                }
                let text = msg.into_text().unwrap_or_default();
                match serde_json::from_str::<Extrinsic>(&text) {
                    Ok(xt) => {
                        if sink.send(xt).is_err() {
                            // consumer gone
                            return;
                        }
                    }
                    Err(e) => {
                        log::debug!("ignoring unparseable feed frame: {e}");
                    }
                }
            }
            // Stream ended: dropping the sink signals terminal failure.
            log::warn!("index-api feed for '{network}' ended");
        });
        self.feeds.track(&handle);

        Ok(SubscriptionToken::new(handle))
    }
}
