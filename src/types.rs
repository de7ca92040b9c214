use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Backend capability keys. Each logical network configures at most one
/// adapter per capability; only one adapter is queried per capability at a
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Direct chain node RPC.
    #[serde(rename = "chain-rpc")]
    ChainRpc,
    /// Indexing service API (paginated history + push feed).
    #[serde(rename = "index-api")]
    IndexApi,
}

impl std::str::FromStr for Capability {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "chain-rpc" | "chainrpc" => Ok(Capability::ChainRpc),
            "index-api" | "indexapi" => Ok(Capability::IndexApi),
            _ => Err(anyhow::anyhow!(
                "Invalid capability '{s}'. Valid options: chain-rpc, index-api"
            )),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ChainRpc => write!(f, "chain-rpc"),
            Capability::IndexApi => write!(f, "index-api"),
        }
    }
}

/// Lifecycle of one adapter connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Ready,
    Closed,
}

/// One extrinsic row as the indexing service reports it.
///
/// `(block_number, extrinsic_idx)` is both the ordering key (descending) and
/// the equality key: two results carrying the same pair are the same logical
/// extrinsic even when the payload fields differ by representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extrinsic {
    pub block_number: u64,
    pub extrinsic_idx: u32,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub call_module: Option<String>,
    #[serde(default)]
    pub call_name: Option<String>,
    /// 1 for signed, 0 for unsigned (wire convention of the index service).
    #[serde(default)]
    pub signed: Option<i32>,
    #[serde(default)]
    pub multi_address_account_id: Option<String>,
    #[serde(default)]
    pub block_datetime: Option<DateTime<Utc>>,
}

impl Extrinsic {
    /// Equality key: block number plus index within the block.
    pub fn id(&self) -> (u64, u32) {
        (self.block_number, self.extrinsic_idx)
    }
}

/// Caller-supplied list filter. Equality-comparable; any change invalidates
/// the current list state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtrinsicFilter {
    pub signed: Option<bool>,
    pub multi_address_account_id: Option<String>,
}

impl ExtrinsicFilter {
    /// Wire form sent to backends.
    ///
    /// `signed` is asymmetric on purpose: `Some(true)` emits `signed=1`,
    /// while `Some(false)` emits nothing, so unsigned-only filtering is not
    /// expressible. Documented behavior of the index service, kept as is.
    pub fn to_query(&self) -> serde_json::Value {
        let mut q = serde_json::Map::new();
        if self.signed == Some(true) {
            q.insert("signed".into(), json!(1));
        }
        if let Some(addr) = &self.multi_address_account_id {
            if !addr.is_empty() {
                q.insert("multiAddressAccountId".into(), json!(addr));
            }
        }
        serde_json::Value::Object(q)
    }

    /// Client-side match, used by the chain-rpc adapter which filters
    /// block-extracted extrinsics itself.
    pub fn matches(&self, xt: &Extrinsic) -> bool {
        if self.signed == Some(true) && xt.signed != Some(1) {
            return false;
        }
        if let Some(addr) = &self.multi_address_account_id {
            if !addr.is_empty() && xt.multi_address_account_id.as_deref() != Some(addr.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One page of historical results plus the cursor for the next one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_key: Option<String>,
}

impl<T> PageResponse<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_page_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xt(block: u64, idx: u32, signed: i32, addr: Option<&str>) -> Extrinsic {
        Extrinsic {
            block_number: block,
            extrinsic_idx: idx,
            hash: None,
            call_module: Some("balances".into()),
            call_name: Some("transfer".into()),
            signed: Some(signed),
            multi_address_account_id: addr.map(|s| s.to_string()),
            block_datetime: None,
        }
    }

    #[test]
    fn signed_filter_is_asymmetric() {
        let f = ExtrinsicFilter {
            signed: Some(true),
            ..Default::default()
        };
        assert_eq!(f.to_query(), json!({"signed": 1}));

        // signed=false contributes nothing to the wire query
        let f = ExtrinsicFilter {
            signed: Some(false),
            ..Default::default()
        };
        assert_eq!(f.to_query(), json!({}));

        assert_eq!(ExtrinsicFilter::default().to_query(), json!({}));
    }

    #[test]
    fn filter_matches_signed_and_address() {
        let f = ExtrinsicFilter {
            signed: Some(true),
            multi_address_account_id: Some("0xabc".into()),
        };
        assert!(f.matches(&xt(10, 0, 1, Some("0xabc"))));
        assert!(!f.matches(&xt(10, 0, 0, Some("0xabc"))));
        assert!(!f.matches(&xt(10, 0, 1, Some("0xdef"))));
        assert!(!f.matches(&xt(10, 0, 1, None)));

        // signed=false matches everything (asymmetric mapping)
        let f = ExtrinsicFilter {
            signed: Some(false),
            ..Default::default()
        };
        assert!(f.matches(&xt(10, 0, 1, None)));
        assert!(f.matches(&xt(10, 0, 0, None)));
    }

    #[test]
    fn capability_round_trips_through_strings() {
        for cap in [Capability::ChainRpc, Capability::IndexApi] {
            let parsed: Capability = cap.to_string().parse().unwrap();
            assert_eq!(parsed, cap);
        }
        assert!("graphql".parse::<Capability>().is_err());
    }

    #[test]
    fn extrinsic_uses_camel_case_wire_names() {
        let parsed: Extrinsic = serde_json::from_value(json!({
            "blockNumber": 100,
            "extrinsicIdx": 2,
            "callModule": "system",
            "signed": 1
        }))
        .unwrap();
        assert_eq!(parsed.id(), (100, 2));
        assert_eq!(parsed.call_module.as_deref(), Some("system"));
    }
}
