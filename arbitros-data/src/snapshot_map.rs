use arbitros_execution::types::Ticker;
use arbitros_instrument::{ExchangeId, Symbol};
use arbitros_integration::PublishEpoch;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::{atomic::{AtomicU64, Ordering}, Arc};
use tokio::sync::broadcast;

pub type MarketKey = (ExchangeId, Symbol);

/// Immutable-per-epoch map of the latest [`Ticker`] for every (exchange, symbol). Publishing a
/// new ticker clones the current map, inserts the update, and atomically swaps the whole
/// `Arc` in — the §9 "atomic pointer swap" replacement for a globally mutable price
/// dictionary. Readers taking a reference via [`SnapshotMap::current`] see one consistent
/// epoch across every key they read from it, never a torn mix of two publishes.
#[derive(Clone)]
pub struct SnapshotMap {
    inner: Arc<RwLock<Arc<IndexMap<MarketKey, Ticker>>>>,
    epoch: Arc<AtomicU64>,
    notify: broadcast::Sender<PublishEpoch>,
}

impl Default for SnapshotMap {
    fn default() -> Self {
        let (notify, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(Arc::new(IndexMap::new()))),
            epoch: Arc::new(AtomicU64::new(0)),
            notify,
        }
    }
}

impl SnapshotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking lookup of the last-published ticker for one key.
    pub fn latest(&self, exchange: ExchangeId, symbol: &Symbol) -> Option<Ticker> {
        self.inner
            .read()
            .get(&(exchange, symbol.clone()))
            .cloned()
    }

    /// O(1) consistent reference to the current publish epoch's full map.
    pub fn current(&self) -> Arc<IndexMap<MarketKey, Ticker>> {
        self.inner.read().clone()
    }

    pub fn epoch(&self) -> PublishEpoch {
        PublishEpoch(self.epoch.load(Ordering::Acquire))
    }

    /// Stream of publish-epoch notifications, one per successful publish.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishEpoch> {
        self.notify.subscribe()
    }

    /// Publish a new ticker, replacing any prior value for the same key and bumping the
    /// publish epoch. Total order per key is guaranteed by requiring `&mut self` access to be
    /// serialized by the owning poll loop — only one task ever publishes for a given exchange.
    pub fn publish(&self, ticker: Ticker) {
        let key = (ticker.exchange, ticker.symbol.clone());
        let mut guard = self.inner.write();
        let mut next = IndexMap::clone(&guard);
        next.insert(key, ticker);
        *guard = Arc::new(next);
        drop(guard);

        let epoch = PublishEpoch(self.epoch.fetch_add(1, Ordering::AcqRel) + 1);
        let _ = self.notify.send(epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_instrument::Symbol;
    use arbitros_integration::time::now_ms;
    use rust_decimal_macros::dec;

    fn ticker(symbol: Symbol, exchange: ExchangeId) -> Ticker {
        Ticker {
            exchange,
            symbol,
            bid: dec!(100),
            ask: dec!(101),
            last: dec!(100.5),
            bid_depth_top_n: vec![],
            ask_depth_top_n: vec![],
            quote_volume_24h: dec!(0),
            observed_at: now_ms(),
        }
    }

    #[test]
    fn publish_is_visible_immediately_and_epoch_advances() {
        let map = SnapshotMap::new();
        let symbol = Symbol::new("BTC", "USDT");
        assert!(map.latest(ExchangeId::Binance, &symbol).is_none());

        map.publish(ticker(symbol.clone(), ExchangeId::Binance));
        assert!(map.latest(ExchangeId::Binance, &symbol).is_some());
        assert_eq!(map.epoch(), PublishEpoch(1));

        map.publish(ticker(symbol.clone(), ExchangeId::Binance));
        assert_eq!(map.epoch(), PublishEpoch(2));
    }

    #[test]
    fn readers_never_see_an_older_epoch_after_a_newer_one() {
        let map = SnapshotMap::new();
        let symbol = Symbol::new("BTC", "USDT");
        map.publish(ticker(symbol.clone(), ExchangeId::Binance));
        let seen_first = map.epoch();
        map.publish(ticker(symbol, ExchangeId::Binance));
        let seen_second = map.epoch();
        assert!(seen_second > seen_first);
    }
}
