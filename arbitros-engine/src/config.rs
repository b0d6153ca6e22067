use arbitros_integration::ErrorKind;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ConfigError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ConfigError {
    fn invalid(detail: impl Into<String>) -> Self {
        Self { kind: ErrorKind::ConfigInvalid, detail: detail.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_sec: usize,
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundAllocationConfig {
    #[serde(default = "FundAllocationConfig::default_cross_exchange")]
    pub cross_exchange: Decimal,
    #[serde(default = "FundAllocationConfig::default_triangular")]
    pub triangular: Decimal,
}

impl FundAllocationConfig {
    fn default_cross_exchange() -> Decimal {
        Decimal::new(5, 1)
    }

    fn default_triangular() -> Decimal {
        Decimal::new(5, 1)
    }
}

impl Default for FundAllocationConfig {
    fn default() -> Self {
        Self { cross_exchange: Self::default_cross_exchange(), triangular: Self::default_triangular() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntervalsConfig {
    #[serde(default = "IntervalsConfig::default_market_poll_sec")]
    pub market_poll_sec: u64,
    #[serde(default = "IntervalsConfig::default_fast_evolution_min")]
    pub fast_evolution_min: u64,
    #[serde(default = "IntervalsConfig::default_slow_evolution_hr")]
    pub slow_evolution_hr: u64,
    #[serde(default = "IntervalsConfig::default_transfer_poll_sec")]
    pub transfer_poll_sec: u64,
}

impl IntervalsConfig {
    fn default_market_poll_sec() -> u64 {
        5
    }
    fn default_fast_evolution_min() -> u64 {
        3
    }
    fn default_slow_evolution_hr() -> u64 {
        24
    }
    fn default_transfer_poll_sec() -> u64 {
        30
    }
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            market_poll_sec: Self::default_market_poll_sec(),
            fast_evolution_min: Self::default_fast_evolution_min(),
            slow_evolution_hr: Self::default_slow_evolution_hr(),
            transfer_poll_sec: Self::default_transfer_poll_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "GatesConfig::default_display_min_score")]
    pub display_min_score: Decimal,
    #[serde(default = "GatesConfig::default_trading_min_score")]
    pub trading_min_score: Decimal,
    #[serde(default = "GatesConfig::default_min_trades")]
    pub min_trades: u32,
    #[serde(default = "GatesConfig::default_min_win_rate")]
    pub min_win_rate: Decimal,
    #[serde(default = "GatesConfig::default_consec_improvements")]
    pub consec_improvements: u32,
    #[serde(default = "GatesConfig::default_param_reval_hours")]
    pub param_reval_hours: i64,
    #[serde(default = "GatesConfig::default_param_reval_trades")]
    pub param_reval_trades: u32,
}

impl GatesConfig {
    fn default_display_min_score() -> Decimal {
        Decimal::new(40, 0)
    }
    fn default_trading_min_score() -> Decimal {
        Decimal::new(65, 0)
    }
    fn default_min_trades() -> u32 {
        30
    }
    fn default_min_win_rate() -> Decimal {
        Decimal::new(55, 2)
    }
    fn default_consec_improvements() -> u32 {
        3
    }
    fn default_param_reval_hours() -> i64 {
        24
    }
    fn default_param_reval_trades() -> u32 {
        20
    }
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            display_min_score: Self::default_display_min_score(),
            trading_min_score: Self::default_trading_min_score(),
            min_trades: Self::default_min_trades(),
            min_win_rate: Self::default_min_win_rate(),
            consec_improvements: Self::default_consec_improvements(),
            param_reval_hours: Self::default_param_reval_hours(),
            param_reval_trades: Self::default_param_reval_trades(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "SimulationConfig::default_days_per_run")]
    pub days_per_run: u32,
    #[serde(default = "SimulationConfig::default_min_trades_required")]
    pub min_trades_required: u32,
}

impl SimulationConfig {
    fn default_days_per_run() -> u32 {
        7
    }
    fn default_min_trades_required() -> u32 {
        20
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { days_per_run: Self::default_days_per_run(), min_trades_required: Self::default_min_trades_required() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    pub dsn: String,
    #[serde(default = "PersistenceConfig::default_max_connections")]
    pub max_connections: u32,
}

impl PersistenceConfig {
    fn default_max_connections() -> u32 {
        10
    }
}

/// The single configuration object (§6), loaded once at startup from TOML. All fields except
/// `exchanges` and `persistence.dsn` carry sane defaults so an operator's config file only
/// states what differs from them.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchanges: HashMap<String, ExchangeConfig>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "Config::default_min_cross_pct")]
    pub min_cross_pct: Decimal,
    #[serde(default = "Config::default_min_triangular_pct")]
    pub min_triangular_pct: Decimal,
    #[serde(default = "Config::default_close_threshold_pct")]
    pub close_threshold_pct: Decimal,
    pub fund_total: Decimal,
    #[serde(default)]
    pub fund_allocation: FundAllocationConfig,
    #[serde(default)]
    pub intervals: IntervalsConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Config {
    fn default_min_cross_pct() -> Decimal {
        Decimal::new(2, 3)
    }
    fn default_min_triangular_pct() -> Decimal {
        Decimal::new(1, 3)
    }
    fn default_close_threshold_pct() -> Decimal {
        Decimal::new(5, 4)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|err| ConfigError::invalid(err.to_string()))
    }

    /// Startup validation (§7: `config_invalid` is fatal). Checked once, here, rather than
    /// scattered across every component that reads a field off `Config`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchanges.values().all(|e| !e.enabled) {
            return Err(ConfigError::invalid("at least one exchange must be enabled"));
        }
        for (name, exchange) in &self.exchanges {
            if exchange.enabled && (exchange.api_key.is_empty() || exchange.api_secret.is_empty()) {
                return Err(ConfigError::invalid(format!("exchange `{name}` is enabled but missing credentials")));
            }
        }
        if self.symbols.is_empty() {
            return Err(ConfigError::invalid("symbols must not be empty"));
        }
        if self.fund_total <= Decimal::ZERO {
            return Err(ConfigError::invalid("fund_total must be positive"));
        }
        let allocation_sum = self.fund_allocation.cross_exchange + self.fund_allocation.triangular;
        if (allocation_sum - Decimal::ONE).abs() > Decimal::new(1, 6) {
            return Err(ConfigError::invalid(format!("fund_allocation must sum to 1, got {allocation_sum}")));
        }
        if self.gates.trading_min_score < self.gates.display_min_score {
            return Err(ConfigError::invalid("gates.trading_min_score must be >= gates.display_min_score"));
        }
        if self.persistence.dsn.is_empty() {
            return Err(ConfigError::invalid("persistence.dsn must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        fund_total = "10000"
        symbols = ["BTC/USDT"]
        [exchanges.binance]
        api_key = "k"
        api_secret = "s"
        [persistence]
        dsn = "postgres://localhost/arbitros"
        "#
    }

    #[test]
    fn minimal_config_parses_and_validates() {
        let config = Config::from_toml_str(minimal_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.intervals.market_poll_sec, 5);
        assert_eq!(config.gates.trading_min_score, Decimal::new(65, 0));
    }

    #[test]
    fn fund_allocation_not_summing_to_one_is_rejected() {
        let raw = format!(
            "{}\n[fund_allocation]\ncross_exchange = \"0.6\"\ntriangular = \"0.6\"\n",
            minimal_toml()
        );
        let config = Config::from_toml_str(&raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn enabled_exchange_missing_credentials_is_rejected() {
        let raw = r#"
        fund_total = "10000"
        symbols = ["BTC/USDT"]
        [exchanges.binance]
        api_key = ""
        api_secret = ""
        [persistence]
        dsn = "postgres://localhost/arbitros"
        "#;
        let config = Config::from_toml_str(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn all_exchanges_disabled_is_rejected() {
        let raw = r#"
        fund_total = "10000"
        symbols = ["BTC/USDT"]
        [exchanges.binance]
        api_key = "k"
        api_secret = "s"
        enabled = false
        [persistence]
        dsn = "postgres://localhost/arbitros"
        "#;
        let config = Config::from_toml_str(raw).unwrap();
        assert!(config.validate().is_err());
    }
}
