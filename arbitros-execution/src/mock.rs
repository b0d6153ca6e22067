use crate::{
    client::ExchangeClient,
    error::ExecutionError,
    types::{BalanceMap, DepositAddress, OrderBookTop, OrderFill, Ticker, WithdrawalStatus},
};
use arbitros_instrument::{AssetId, ExchangeId, Symbol};
use arbitros_integration::time::now_ms;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// In-process test double standing in for a real venue. Tickers are seeded by the caller
/// (tests, or the simulation engine's paper-trading path) and orders fill instantly at the
/// seeded price with a configurable fee, modelling no slippage beyond what the caller sets.
#[derive(Default)]
pub struct MockExchangeClient {
    tickers: Mutex<HashMap<Symbol, Ticker>>,
    balances: Mutex<BalanceMap>,
    taker_fee: Decimal,
    withdrawal_statuses: Mutex<HashMap<String, WithdrawalStatus>>,
}

impl MockExchangeClient {
    pub fn new(taker_fee: Decimal) -> Self {
        Self {
            tickers: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            taker_fee,
            withdrawal_statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed_ticker(&self, ticker: Ticker) {
        self.tickers.lock().insert(ticker.symbol.clone(), ticker);
    }

    pub fn seed_balance(&self, asset: AssetId, balance: crate::types::AssetBalance) {
        self.balances.lock().insert(asset, balance);
    }

    pub fn set_withdrawal_status(&self, transfer_id: &str, status: WithdrawalStatus) {
        self.withdrawal_statuses
            .lock()
            .insert(transfer_id.to_string(), status);
    }

    /// Marks every withdrawal still sitting at `Pending` as `Confirmed`. Lets a test drive the
    /// happy path of a transfer-polling loop without needing to know the transfer id the mock
    /// generated internally.
    pub fn confirm_all_pending_withdrawals(&self) {
        for status in self.withdrawal_statuses.lock().values_mut() {
            if matches!(status, WithdrawalStatus::Pending) {
                *status = WithdrawalStatus::Confirmed;
            }
        }
    }

    fn ticker_for(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError> {
        self.tickers.lock().get(symbol).cloned().ok_or_else(|| {
            ExecutionError::new(
                arbitros_integration::ErrorKind::Rejected,
                crate::error::SYMBOL_UNKNOWN,
            )
        })
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Mock
    }

    async fn fetch_ticker(
        &self,
        symbol: &Symbol,
        _cancel: &CancellationToken,
    ) -> Result<Ticker, ExecutionError> {
        self.ticker_for(symbol)
    }

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        _cancel: &CancellationToken,
    ) -> Result<OrderBookTop, ExecutionError> {
        let ticker = self.ticker_for(symbol)?;
        Ok(OrderBookTop {
            symbol: symbol.clone(),
            bids: ticker.bid_depth_top_n.into_iter().take(depth).collect(),
            asks: ticker.ask_depth_top_n.into_iter().take(depth).collect(),
            observed_at: ticker.observed_at,
        })
    }

    async fn fetch_balance(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<BalanceMap, ExecutionError> {
        Ok(self.balances.lock().clone())
    }

    async fn market_buy(
        &self,
        symbol: &Symbol,
        qty: Decimal,
        _cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        let ticker = self.ticker_for(symbol)?;
        let fee = qty * ticker.ask * self.taker_fee;
        Ok(OrderFill {
            filled_price: ticker.ask,
            filled_qty: qty,
            fee,
            fee_asset: symbol.quote.clone(),
        })
    }

    async fn market_sell(
        &self,
        symbol: &Symbol,
        qty: Decimal,
        _cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        let ticker = self.ticker_for(symbol)?;
        let fee = qty * ticker.bid * self.taker_fee;
        Ok(OrderFill {
            filled_price: ticker.bid,
            filled_qty: qty,
            fee,
            fee_asset: symbol.quote.clone(),
        })
    }

    async fn request_withdrawal(
        &self,
        _asset: &AssetId,
        amount: Decimal,
        _dest_addr: &str,
        _network: &str,
        _cancel: &CancellationToken,
    ) -> Result<(String, Decimal), ExecutionError> {
        let transfer_id = format!("mock-transfer-{}", now_ms().timestamp_nanos_opt().unwrap_or(0));
        self.withdrawal_statuses
            .lock()
            .insert(transfer_id.clone(), WithdrawalStatus::Pending);
        Ok((transfer_id, amount * Decimal::new(1, 3)))
    }

    async fn fetch_withdrawal_status(
        &self,
        transfer_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<WithdrawalStatus, ExecutionError> {
        Ok(self
            .withdrawal_statuses
            .lock()
            .get(transfer_id)
            .copied()
            .unwrap_or(WithdrawalStatus::Pending))
    }

    async fn fetch_deposit_address(
        &self,
        asset: &AssetId,
        _network: &str,
        _cancel: &CancellationToken,
    ) -> Result<DepositAddress, ExecutionError> {
        Ok(DepositAddress {
            address: format!("mock-addr-{}", asset.as_str()),
            memo: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_instrument::Symbol;
    use rust_decimal_macros::dec;

    fn ticker(symbol: Symbol, bid: Decimal, ask: Decimal) -> Ticker {
        Ticker {
            exchange: ExchangeId::Mock,
            symbol,
            bid,
            ask,
            last: (bid + ask) / Decimal::TWO,
            bid_depth_top_n: vec![(bid, dec!(1))],
            ask_depth_top_n: vec![(ask, dec!(1))],
            quote_volume_24h: dec!(0),
            observed_at: now_ms(),
        }
    }

    #[tokio::test]
    async fn market_buy_fills_at_ask_with_fee() {
        let client = MockExchangeClient::new(dec!(0.001));
        let symbol = Symbol::new("BTC", "USDT");
        client.seed_ticker(ticker(symbol.clone(), dec!(30000), dec!(30010)));

        let cancel = CancellationToken::new();
        let fill = client
            .market_buy(&symbol, dec!(1), &cancel)
            .await
            .unwrap();

        assert_eq!(fill.filled_price, dec!(30010));
        assert_eq!(fill.fee, dec!(30.01));
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected() {
        let client = MockExchangeClient::new(dec!(0.001));
        let cancel = CancellationToken::new();
        let err = client
            .fetch_ticker(&Symbol::new("ETH", "USDT"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, arbitros_integration::ErrorKind::Rejected);
    }
}
