//! Switchboard and router tests with mock adapters registered into the
//! registry: activation handle accounting, all-or-nothing rollback, and the
//! routed full stack down to a live list.

use async_trait::async_trait;
use chainlens::adapter::{Adapter, ConnState, SubscriptionToken};
use chainlens::config::load_from_str;
use chainlens::error::CoreError;
use chainlens::extrinsics::extrinsic_list;
use chainlens::registry::AdapterRegistry;
use chainlens::router::CapabilityRouter;
use chainlens::switchboard::NetworkSwitchboard;
use chainlens::types::{
    Capability, ConnectionState, Extrinsic, ExtrinsicFilter, PageResponse,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout, Duration};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct MockAdapter {
    network: String,
    capability: Capability,
    state: ConnState,
    fail_connect: bool,
    connects: AtomicUsize,
    pages: Mutex<VecDeque<PageResponse<Extrinsic>>>,
    sink: Mutex<Option<UnboundedSender<Extrinsic>>>,
}

impl MockAdapter {
    fn new(network: &str, capability: Capability) -> Arc<Self> {
        Self::build(network, capability, false)
    }

    fn failing(network: &str, capability: Capability) -> Arc<Self> {
        Self::build(network, capability, true)
    }

    fn build(network: &str, capability: Capability, fail_connect: bool) -> Arc<Self> {
        Arc::new(Self {
            network: network.to_string(),
            capability,
            state: ConnState::default(),
            fail_connect,
            connects: AtomicUsize::new(0),
            pages: Mutex::new(VecDeque::new()),
            sink: Mutex::new(None),
        })
    }

    fn script_page(&self, items: Vec<Extrinsic>, next: Option<&str>) {
        self.pages.lock().unwrap().push_back(PageResponse {
            items,
            next_page_key: next.map(|s| s.to_string()),
        });
    }

    fn push_live(&self, item: Extrinsic) {
        let sink = self.sink.lock().unwrap();
        sink.as_ref().expect("no live sink").send(item).unwrap();
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn network(&self) -> &str {
        &self.network
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<(), CoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.state.set(ConnectionState::Connecting);
        if self.fail_connect {
            self.state.set(ConnectionState::Idle);
            return Err(CoreError::TransientFetch(anyhow::anyhow!(
                "mock refuses to connect"
            )));
        }
        self.state.set(ConnectionState::Ready);
        Ok(())
    }

    async fn close(&self) {
        self.state.set(ConnectionState::Closed);
    }

    async fn fetch_extrinsics(
        &self,
        _filter: &ExtrinsicFilter,
        _page_size: usize,
        _page_key: Option<String>,
    ) -> Result<PageResponse<Extrinsic>, CoreError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PageResponse::empty))
    }

    async fn subscribe_new_extrinsics(
        &self,
        _filter: &ExtrinsicFilter,
        sink: UnboundedSender<Extrinsic>,
    ) -> Result<SubscriptionToken, CoreError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(SubscriptionToken::new(tokio::spawn(
            std::future::pending::<()>(),
        )))
    }
}

fn xt(block: u64, idx: u32) -> Extrinsic {
    Extrinsic {
        block_number: block,
        extrinsic_idx: idx,
        hash: None,
        call_module: None,
        call_name: None,
        signed: Some(1),
        multi_address_account_id: None,
        block_datetime: None,
    }
}

const NETWORKS: &str = r#"
    [networks.alpha.endpoints]
    chain-rpc = "https://rpc.alpha.example"
    index-api = "https://index.alpha.example"

    [networks.beta.endpoints]
    chain-rpc = "https://rpc.beta.example"
    index-api = "https://index.beta.example"

    [networks.gamma.endpoints]
    chain-rpc = "https://rpc.gamma.example"
    index-api = "https://index.gamma.example"

    [networks.solo.endpoints]
    chain-rpc = "https://rpc.solo.example"
"#;

struct Harness {
    registry: Arc<AdapterRegistry>,
    switchboard: Arc<NetworkSwitchboard>,
    alpha_rpc: Arc<MockAdapter>,
    alpha_index: Arc<MockAdapter>,
    beta_rpc: Arc<MockAdapter>,
    beta_index: Arc<MockAdapter>,
}

fn harness() -> Harness {
    init_logs();
    let registry = Arc::new(AdapterRegistry::new(load_from_str(NETWORKS).unwrap()));

    let alpha_rpc = MockAdapter::new("alpha", Capability::ChainRpc);
    let alpha_index = MockAdapter::new("alpha", Capability::IndexApi);
    let beta_rpc = MockAdapter::new("beta", Capability::ChainRpc);
    let beta_index = MockAdapter::new("beta", Capability::IndexApi);
    for adapter in [&alpha_rpc, &alpha_index, &beta_rpc, &beta_index] {
        registry.register(Arc::clone(adapter) as Arc<dyn Adapter>);
    }

    let switchboard = Arc::new(NetworkSwitchboard::new(Arc::clone(&registry)));
    Harness {
        registry,
        switchboard,
        alpha_rpc,
        alpha_index,
        beta_rpc,
        beta_index,
    }
}

#[tokio::test]
async fn switching_networks_disposes_the_previous_set() {
    let h = harness();

    h.switchboard.activate("alpha").await.unwrap();
    assert_eq!(h.switchboard.active_network().as_deref(), Some("alpha"));
    assert_eq!(h.alpha_rpc.connection_state(), ConnectionState::Ready);
    assert_eq!(h.alpha_index.connection_state(), ConnectionState::Ready);

    let set = h.switchboard.active_set().unwrap();
    let mut caps = set.capabilities();
    caps.sort();
    assert_eq!(caps, vec![Capability::ChainRpc, Capability::IndexApi]);

    h.switchboard.activate("beta").await.unwrap();
    assert_eq!(h.switchboard.active_network().as_deref(), Some("beta"));

    // zero handles remain for alpha, its adapters are closed
    assert_eq!(h.registry.handle_count("alpha"), 0);
    assert_eq!(h.alpha_rpc.connection_state(), ConnectionState::Closed);
    assert_eq!(h.alpha_index.connection_state(), ConnectionState::Closed);
    assert_eq!(h.beta_rpc.connection_state(), ConnectionState::Ready);
    assert_eq!(h.beta_index.connection_state(), ConnectionState::Ready);
}

#[tokio::test]
async fn reactivating_the_active_network_is_a_noop() {
    let h = harness();
    h.switchboard.activate("alpha").await.unwrap();
    h.switchboard.activate("alpha").await.unwrap();
    assert_eq!(h.alpha_rpc.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.handle_count("alpha"), 2);
}

#[tokio::test]
async fn failed_activation_rolls_back_to_no_active() {
    let h = harness();
    let gamma_rpc = MockAdapter::new("gamma", Capability::ChainRpc);
    let gamma_index = MockAdapter::failing("gamma", Capability::IndexApi);
    h.registry.register(Arc::clone(&gamma_rpc) as Arc<dyn Adapter>);
    h.registry
        .register(Arc::clone(&gamma_index) as Arc<dyn Adapter>);

    let err = h.switchboard.activate("gamma").await.unwrap_err();
    assert!(err.is_retryable());

    // no partial adapters held open
    assert!(h.switchboard.active_set().is_none());
    assert_eq!(h.registry.handle_count("gamma"), 0);
    assert_eq!(gamma_rpc.connection_state(), ConnectionState::Closed);
    assert_eq!(gamma_index.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn previous_network_survives_until_new_activation_starts() {
    // activate(beta) after alpha must first fully release alpha even when
    // beta then fails, leaving NoActive rather than a half-open mix
    let h = harness();
    let gamma_index = MockAdapter::failing("gamma", Capability::IndexApi);
    let gamma_rpc = MockAdapter::new("gamma", Capability::ChainRpc);
    h.registry.register(Arc::clone(&gamma_rpc) as Arc<dyn Adapter>);
    h.registry
        .register(Arc::clone(&gamma_index) as Arc<dyn Adapter>);

    h.switchboard.activate("alpha").await.unwrap();
    assert!(h.switchboard.activate("gamma").await.is_err());

    assert!(h.switchboard.active_network().is_none());
    assert_eq!(h.registry.handle_count("alpha"), 0);
    assert_eq!(h.alpha_rpc.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn unknown_network_is_a_configuration_error() {
    let h = harness();
    assert!(matches!(
        h.switchboard.activate("omega").await,
        Err(CoreError::Configuration(_))
    ));
    assert!(h.switchboard.active_set().is_none());
}

#[tokio::test]
async fn deactivate_is_idempotent() {
    let h = harness();
    h.switchboard.deactivate().await;
    assert!(h.switchboard.active_network().is_none());

    h.switchboard.activate("alpha").await.unwrap();
    h.switchboard.deactivate().await;
    h.switchboard.deactivate().await;
    assert!(h.switchboard.active_network().is_none());
    assert_eq!(h.registry.handle_count("alpha"), 0);
}

#[tokio::test]
async fn router_reports_not_active_and_missing_capability() {
    let h = harness();
    let router = CapabilityRouter::new(Arc::clone(&h.switchboard));

    assert!(matches!(
        router.resolve(Capability::IndexApi),
        Err(CoreError::NotActive)
    ));

    // "solo" only configures chain-rpc
    let solo_rpc = MockAdapter::new("solo", Capability::ChainRpc);
    h.registry.register(Arc::clone(&solo_rpc) as Arc<dyn Adapter>);
    h.switchboard.activate("solo").await.unwrap();

    assert!(router.resolve(Capability::ChainRpc).is_ok());
    assert!(matches!(
        router.resolve(Capability::IndexApi),
        Err(CoreError::CapabilityUnavailable { network, capability })
            if network == "solo" && capability == Capability::IndexApi
    ));
}

#[tokio::test]
async fn routed_list_runs_against_the_active_network() {
    let h = harness();
    h.alpha_index
        .script_page(vec![xt(100, 1), xt(100, 0)], Some("99"));
    h.switchboard.activate("alpha").await.unwrap();

    let router = CapabilityRouter::new(Arc::clone(&h.switchboard));
    let list = extrinsic_list(router, Capability::IndexApi);
    list.configure(ExtrinsicFilter {
        signed: Some(true),
        ..Default::default()
    });

    assert_eq!(list.load_next_page(2).await.unwrap(), 2);
    list.start_live().await.unwrap();

    let mut watch = list.watch();
    watch.borrow_and_update();
    h.alpha_index.push_live(xt(101, 0));
    timeout(Duration::from_secs(5), watch.changed())
        .await
        .unwrap()
        .unwrap();

    let ids: Vec<_> = list.items().iter().map(|x| x.id()).collect();
    assert_eq!(ids, vec![(101, 0), (100, 1), (100, 0)]);

    // network switch: the coupled reset clears alpha's rows, and the next
    // fetch routes to beta's adapter
    h.beta_index.script_page(vec![xt(7, 0)], None);
    h.switchboard.activate("beta").await.unwrap();
    settle(&list).await;

    assert_eq!(list.load_next_page(2).await.unwrap(), 1);
    assert!(list.exhausted());
    assert_eq!(list.items()[0].id(), (7, 0));
}

/// Wait until the list has absorbed the reset driven by a network switch.
async fn settle(list: &chainlens::extrinsics::ExtrinsicList) {
    let mut watch = list.watch();
    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snap = watch.borrow_and_update();
                if snap.items.is_empty() && !snap.live {
                    break;
                }
            }
            watch.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn switching_networks_resets_routed_lists() {
    let h = harness();
    h.alpha_index.script_page(vec![xt(100, 0)], Some("99"));
    h.switchboard.activate("alpha").await.unwrap();

    let router = CapabilityRouter::new(Arc::clone(&h.switchboard));
    let list = extrinsic_list(router, Capability::IndexApi);
    list.configure(ExtrinsicFilter::default());
    assert_eq!(list.load_next_page(1).await.unwrap(), 1);
    list.start_live().await.unwrap();
    let alpha_sink = h.alpha_index.sink.lock().unwrap().clone().unwrap();

    h.switchboard.activate("beta").await.unwrap();
    settle(&list).await;

    // alpha's rows are gone and the live coupling is down
    assert!(list.items().is_empty());
    assert_eq!(list.page_key(), None);
    assert!(!list.is_live());

    // a late delivery from alpha's adapter cannot reach the list
    let _ = alpha_sink.send(xt(200, 0));
    tokio::task::yield_now().await;
    assert!(list.items().is_empty());
}
