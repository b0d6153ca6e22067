use crate::{
    poll::{run_poll_loop, PollTarget, DEFAULT_POLL_INTERVAL},
    snapshot_map::SnapshotMap,
};
use arbitros_execution::ExchangeClient;
use arbitros_instrument::{ExchangeId, Symbol};
use arbitros_integration::PublishEpoch;
use indexmap::IndexMap;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns one supervised poll loop per configured exchange and the [`SnapshotMap`] they publish
/// into. This is the composition-root-facing handle for the Market Data Service (§4.2): the
/// rest of the system only ever talks to MDS through [`MarketDataService::latest`],
/// [`MarketDataService::snapshot`] and [`MarketDataService::subscribe`].
pub struct MarketDataService {
    map: SnapshotMap,
    handles: Vec<JoinHandle<()>>,
}

impl MarketDataService {
    /// Spawn one poll loop per `(client, symbols)` pair in `targets`, each polling at
    /// `interval` (default [`DEFAULT_POLL_INTERVAL`]) until `cancel` fires.
    pub fn spawn(
        clients: Vec<(Arc<dyn ExchangeClient>, PollTarget)>,
        cancel: CancellationToken,
        interval: Option<Duration>,
    ) -> Self {
        let map = SnapshotMap::new();
        let interval = interval.unwrap_or(DEFAULT_POLL_INTERVAL);

        let handles = clients
            .into_iter()
            .map(|(client, target)| {
                let map = map.clone();
                let cancel = cancel.child_token();
                tokio::spawn(run_poll_loop(client, target.symbols, map, cancel, interval))
            })
            .collect();

        Self { map, handles }
    }

    pub fn latest(&self, exchange: ExchangeId, symbol: &Symbol) -> Option<arbitros_execution::types::Ticker> {
        self.map.latest(exchange, symbol)
    }

    pub fn snapshot(&self) -> Arc<IndexMap<(ExchangeId, Symbol), arbitros_execution::types::Ticker>> {
        self.map.current()
    }

    pub fn epoch(&self) -> PublishEpoch {
        self.map.epoch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishEpoch> {
        self.map.subscribe()
    }

    /// Handle to the underlying map, useful for tests that want to publish synthetically.
    pub fn map(&self) -> SnapshotMap {
        self.map.clone()
    }

    pub async fn shutdown(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
