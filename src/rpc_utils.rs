//! Shared HTTP plumbing: a process-wide client and the JSON-RPC 2.0 envelope
//! used by the chain-rpc adapter.
//!
//! The bounded retry here covers transient HTTP statuses only; retry policy
//! above the transport envelope is a caller decision.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::sync::OnceLock;
use tokio::time::{sleep, Duration};

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

pub(crate) fn http_client() -> &'static reqwest::Client {
    HTTP.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .expect("reqwest client")
    })
}

/// POST a JSON-RPC 2.0 request and unwrap the `result` member.
pub async fn rpc_post(
    url: &str,
    method: &str,
    params: Value,
    timeout_ms: u64,
    auth_token: Option<&str>,
) -> Result<Value> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": "chainlens",
        "method": method,
        "params": params,
    });

    // Small, bounded retry on transient HTTP failures
    let mut attempt = 0u32;
    loop {
        let mut req = http_client()
            .post(url)
            .json(&body)
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(token) = auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let res = req.send().await?;
        if res.status().is_success() {
            let v: Value = res.json().await?;
            if let Some(err) = v.get("error") {
                let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or_default();
                let msg = err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("rpc error");
                return Err(anyhow!("rpc {code} {msg}"));
            }
            if let Some(r) = v.get("result") {
                return Ok(r.clone());
            }
            return Err(anyhow!("invalid rpc payload (no result)"));
        } else {
            // Retry only on transient statuses
            if matches!(res.status().as_u16(), 429 | 500 | 502 | 503 | 504) && attempt < 2 {
                attempt += 1;
                log::debug!("transient http {} from {url}, retry {attempt}", res.status());
                sleep(Duration::from_millis(150 * attempt as u64)).await;
                continue;
            }
            return Err(anyhow!("http {}", res.status()));
        }
    }
}

/// Height of the latest finalized block.
pub async fn get_head_number(url: &str, timeout_ms: u64, auth_token: Option<&str>) -> Result<u64> {
    let head = rpc_post(url, "chain_getHead", json!({}), timeout_ms, auth_token).await?;
    head.get("number")
        .and_then(|n| n.as_u64())
        .ok_or_else(|| anyhow!("head payload missing number"))
}

/// Full block by height, including its extrinsic rows.
pub async fn get_block(
    url: &str,
    height: u64,
    timeout_ms: u64,
    auth_token: Option<&str>,
) -> Result<Value> {
    rpc_post(
        url,
        "chain_getBlock",
        json!({ "blockNumber": height }),
        timeout_ms,
        auth_token,
    )
    .await
}

/// Cheap liveness probe used during activation.
pub async fn health_check(url: &str, timeout_ms: u64, auth_token: Option<&str>) -> Result<()> {
    get_head_number(url, timeout_ms, auth_token).await.map(|_| ())
}
