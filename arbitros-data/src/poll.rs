use crate::snapshot_map::SnapshotMap;
use arbitros_execution::ExchangeClient;
use arbitros_instrument::{ExchangeId, Symbol};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Default poll cadence for a single exchange's ticker set (§4.2).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive poll failures (summed across all of one exchange's symbols) after which the
/// loop requests EA reconnection rather than continuing to poll a connection that is probably
/// dead.
pub const RECONNECT_AFTER_CONSECUTIVE_FAILURES: u32 = 5;

/// One supervised poll loop per exchange: on each tick, fetches a ticker for every configured
/// symbol and publishes it to `map` on success. A run of failures across ticks (not
/// necessarily the same symbol) trips the reconnection threshold; the counter resets on the
/// next success. The loop itself never reconnects — "requesting reconnection" here means
/// logging the event and resetting state, since the wire-level reconnect is a concrete
/// [`ExchangeClient`]'s own concern (out of scope, §1).
pub async fn run_poll_loop(
    client: Arc<dyn ExchangeClient>,
    symbols: Vec<Symbol>,
    map: SnapshotMap,
    cancel: CancellationToken,
    interval: Duration,
) {
    let exchange = client.exchange();
    let mut ticker = tokio::time::interval(interval);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(?exchange, "poll loop cancelled");
                return;
            }
            _ = ticker.tick() => {
                for symbol in &symbols {
                    match client.fetch_ticker(symbol, &cancel).await {
                        Ok(snapshot) => {
                            map.publish(snapshot);
                            consecutive_failures = 0;
                        }
                        Err(err) => {
                            consecutive_failures += 1;
                            tracing::warn!(
                                ?exchange,
                                %symbol,
                                %err,
                                consecutive_failures,
                                "poll failed"
                            );
                            if consecutive_failures >= RECONNECT_AFTER_CONSECUTIVE_FAILURES {
                                tracing::error!(
                                    ?exchange,
                                    consecutive_failures,
                                    "requesting EA reconnection after repeated poll failures"
                                );
                                consecutive_failures = 0;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Which symbols to poll on which exchange, and at what cadence — the wiring a composition
/// root hands to [`run_poll_loop`] per exchange.
#[derive(Debug, Clone)]
pub struct PollTarget {
    pub exchange: ExchangeId,
    pub symbols: Vec<Symbol>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_execution::{error::ExecutionError, types::*};
    use arbitros_instrument::AssetId;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    struct FlakyClient {
        fail_next: Mutex<u32>,
    }

    #[async_trait]
    impl ExchangeClient for FlakyClient {
        fn exchange(&self) -> ExchangeId {
            ExchangeId::Mock
        }

        async fn fetch_ticker(
            &self,
            symbol: &Symbol,
            _cancel: &CancellationToken,
        ) -> Result<Ticker, ExecutionError> {
            let mut remaining = self.fail_next.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ExecutionError::new(
                    arbitros_integration::ErrorKind::TransientNetwork,
                    "simulated",
                ));
            }
            Ok(Ticker {
                exchange: ExchangeId::Mock,
                symbol: symbol.clone(),
                bid: dec!(100),
                ask: dec!(101),
                last: dec!(100),
                bid_depth_top_n: vec![],
                ask_depth_top_n: vec![],
                quote_volume_24h: dec!(0),
                observed_at: arbitros_integration::time::now_ms(),
            })
        }

        async fn fetch_order_book(
            &self,
            symbol: &Symbol,
            _depth: usize,
            _cancel: &CancellationToken,
        ) -> Result<OrderBookTop, ExecutionError> {
            Ok(OrderBookTop {
                symbol: symbol.clone(),
                bids: vec![],
                asks: vec![],
                observed_at: arbitros_integration::time::now_ms(),
            })
        }

        async fn fetch_balance(&self, _cancel: &CancellationToken) -> Result<BalanceMap, ExecutionError> {
            unimplemented!()
        }

        async fn market_buy(
            &self,
            _symbol: &Symbol,
            _qty: Decimal,
            _cancel: &CancellationToken,
        ) -> Result<OrderFill, ExecutionError> {
            unimplemented!()
        }

        async fn market_sell(
            &self,
            _symbol: &Symbol,
            _qty: Decimal,
            _cancel: &CancellationToken,
        ) -> Result<OrderFill, ExecutionError> {
            unimplemented!()
        }

        async fn request_withdrawal(
            &self,
            _asset: &AssetId,
            _amount: Decimal,
            _dest_addr: &str,
            _network: &str,
            _cancel: &CancellationToken,
        ) -> Result<(String, Decimal), ExecutionError> {
            unimplemented!()
        }

        async fn fetch_withdrawal_status(
            &self,
            _transfer_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<WithdrawalStatus, ExecutionError> {
            unimplemented!()
        }

        async fn fetch_deposit_address(
            &self,
            _asset: &AssetId,
            _network: &str,
            _cancel: &CancellationToken,
        ) -> Result<DepositAddress, ExecutionError> {
            unimplemented!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures_and_publishes() {
        let client: Arc<dyn ExchangeClient> = Arc::new(FlakyClient {
            fail_next: Mutex::new(2),
        });
        let map = SnapshotMap::new();
        let symbol = Symbol::new("BTC", "USDT");
        let cancel = CancellationToken::new();

        let loop_cancel = cancel.clone();
        let loop_map = map.clone();
        let handle = tokio::spawn(run_poll_loop(
            client,
            vec![symbol.clone()],
            loop_map,
            loop_cancel,
            StdDuration::from_millis(10),
        ));

        for _ in 0..3 {
            tokio::time::advance(StdDuration::from_millis(10)).await;
            tokio::task::yield_now().await;
        }

        assert!(map.latest(ExchangeId::Mock, &symbol).is_some());
        cancel.cancel();
        let _ = handle.await;
    }
}
