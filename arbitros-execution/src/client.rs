use crate::{
    error::ExecutionError,
    types::{BalanceMap, DepositAddress, OrderBookTop, OrderFill, Side, Ticker, WithdrawalStatus},
};
use arbitros_instrument::{AssetId, ExchangeId, Symbol};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

/// Normalized operations against one exchange (§4.1). Every method is cancellable via the
/// provided [`CancellationToken`] and enforces its own request pacing; an implementation is
/// safe for concurrent use from multiple callers and does NOT retry internally — retry policy
/// belongs to the caller (the Arbitrage Executor or Signal Dispatcher).
#[async_trait]
pub trait ExchangeClient: Send + Sync + 'static {
    fn exchange(&self) -> ExchangeId;

    async fn fetch_ticker(
        &self,
        symbol: &Symbol,
        cancel: &CancellationToken,
    ) -> Result<Ticker, ExecutionError>;

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<OrderBookTop, ExecutionError>;

    async fn fetch_balance(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BalanceMap, ExecutionError>;

    async fn market_buy(
        &self,
        symbol: &Symbol,
        qty: Decimal,
        cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError>;

    async fn market_sell(
        &self,
        symbol: &Symbol,
        qty: Decimal,
        cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError>;

    async fn market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        qty: Decimal,
        cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        match side {
            Side::Buy => self.market_buy(symbol, qty, cancel).await,
            Side::Sell => self.market_sell(symbol, qty, cancel).await,
        }
    }

    async fn request_withdrawal(
        &self,
        asset: &AssetId,
        amount: Decimal,
        dest_addr: &str,
        network: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, Decimal), ExecutionError>;

    async fn fetch_withdrawal_status(
        &self,
        transfer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<WithdrawalStatus, ExecutionError>;

    async fn fetch_deposit_address(
        &self,
        asset: &AssetId,
        network: &str,
        cancel: &CancellationToken,
    ) -> Result<DepositAddress, ExecutionError>;
}
