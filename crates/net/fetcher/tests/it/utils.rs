use ptn_fetcher::{
    test_utils::{genesis, FetcherEvent, TestDag, TestObserver},
    FetcherConfig, FetcherHandle, FetcherService, UnitFetcher,
};
use ptn_primitives::AssetId;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound for anything the tests wait for.
pub const WAIT: Duration = Duration::from_secs(10);

/// Short windows so scenarios finish quickly.
pub fn test_config() -> FetcherConfig {
    FetcherConfig::default()
        .with_gather_slack(Duration::from_millis(20))
        .with_arrive_timeout(Duration::from_millis(300))
}

pub struct TestFetcher {
    pub dag: Arc<TestDag>,
    pub handle: FetcherHandle,
    pub service: FetcherService,
    pub events: UnboundedReceiver<FetcherEvent>,
}

/// Starts a fetcher on top of a Dag holding a single lane genesis.
pub fn spawn_fetcher(config: FetcherConfig) -> TestFetcher {
    ptn_tracing::init_test_tracing();
    let dag = Arc::new(TestDag::new(genesis(AssetId::with_last_byte(1))));
    let (observer, events) = TestObserver::new();
    let (fetcher, handle) = UnitFetcher::new(config, dag.clone(), dag.clone());
    let service = fetcher.with_observer(observer).start();
    TestFetcher { dag, handle, service, events }
}
