use crate::{
    client::ExchangeClient,
    error::ExecutionError,
    types::{BalanceMap, DepositAddress, OrderBookTop, OrderFill, Ticker, WithdrawalStatus},
};
use arbitros_instrument::{AssetId, ExchangeId, Symbol};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Default)]
pub struct OkxConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

/// Live OKX client. OKX's REST/WebSocket wire format is exchange SDK glue, out of scope per
/// §1; this adapter exists to prove out the [`ExchangeClient`] seam against a second venue.
pub struct OkxClient {
    #[allow(dead_code)]
    config: OkxConfig,
}

impl OkxClient {
    pub fn new(config: OkxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExchangeClient for OkxClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    async fn fetch_ticker(&self, _symbol: &Symbol, _cancel: &CancellationToken) -> Result<Ticker, ExecutionError> {
        unimplemented!("OKX market-data wire glue (§1 non-goal)")
    }

    async fn fetch_order_book(
        &self,
        _symbol: &Symbol,
        _depth: usize,
        _cancel: &CancellationToken,
    ) -> Result<OrderBookTop, ExecutionError> {
        unimplemented!("OKX market-data wire glue (§1 non-goal)")
    }

    async fn fetch_balance(&self, _cancel: &CancellationToken) -> Result<BalanceMap, ExecutionError> {
        unimplemented!("OKX account wire glue (§1 non-goal)")
    }

    async fn market_buy(
        &self,
        _symbol: &Symbol,
        _qty: Decimal,
        _cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        unimplemented!("OKX order wire glue (§1 non-goal)")
    }

    async fn market_sell(
        &self,
        _symbol: &Symbol,
        _qty: Decimal,
        _cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        unimplemented!("OKX order wire glue (§1 non-goal)")
    }

    async fn request_withdrawal(
        &self,
        _asset: &AssetId,
        _amount: Decimal,
        _dest_addr: &str,
        _network: &str,
        _cancel: &CancellationToken,
    ) -> Result<(String, Decimal), ExecutionError> {
        unimplemented!("OKX withdrawal wire glue (§1 non-goal)")
    }

    async fn fetch_withdrawal_status(
        &self,
        _transfer_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<WithdrawalStatus, ExecutionError> {
        unimplemented!("OKX withdrawal wire glue (§1 non-goal)")
    }

    async fn fetch_deposit_address(
        &self,
        _asset: &AssetId,
        _network: &str,
        _cancel: &CancellationToken,
    ) -> Result<DepositAddress, ExecutionError> {
        unimplemented!("OKX withdrawal wire glue (§1 non-goal)")
    }
}
