use arbitros_execution::{types::Side, MockExchangeClient};
use arbitros_instrument::Symbol;
use arbitros_integration::time::now_ms;
use arbitros_persistence::WriteChannel;
use arbitros_signal::{DispatcherConfig, SignalDispatcher, SignalIntent, TradeType};
use arbitros_strategy::types::{Lineage, RollingMetrics, Strategy, StrategyParameters, Tier};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

fn trading_tier_strategy() -> Strategy {
    let mut s = Strategy::new(
        "param-change-1".into(),
        "param-change-1".into(),
        "mean_reversion".into(),
        Symbol::new("BTC", "USDT"),
        StrategyParameters::new(),
        Lineage::seed(),
        now_ms(),
    );
    s.tier = Tier::Trading;
    s.metrics = RollingMetrics { score: dec!(90), win_rate: dec!(0.7), consecutive_improvements: 5, trade_count: 200 };
    // Past the time window from the start; only the trade-count gate is exercised below.
    s.last_param_change_at = now_ms() - chrono::Duration::hours(48);
    s
}

/// §8 scenario: a parameter mutation resets `validation_trades_since_change`, which must force
/// every signal back to `validation` until PARAM_REVAL_TRADES (20) validation trades have
/// completed, and the next signal after that clears the gate back to `real`.
#[tokio::test]
async fn param_change_forces_twenty_validation_trades_before_real_resumes() {
    let config = DispatcherConfig::default();
    let dispatcher = SignalDispatcher::new(config, WriteChannel::new(128));
    let symbol = Symbol::new("BTC", "USDT");
    let cancel = CancellationToken::new();
    let client = MockExchangeClient::new(dec!(0.001));

    let mut s = trading_tier_strategy();
    s.mark_parameters_changed(now_ms()); // parameter mutation resets the counter and timestamp
    s.last_param_change_at = now_ms() - chrono::Duration::hours(48); // time gate already satisfied

    for trade_number in 1..=config.param_reval_trades {
        let intent = SignalIntent { side: Side::Buy, price: dec!(30000), quantity: dec!(0.01), confidence: dec!(0.8) };
        let signal = dispatcher.dispatch(&mut s, intent, true, Some(&client), &symbol, &cancel).await.unwrap();
        assert_eq!(signal.trade_type, TradeType::Validation, "trade {trade_number} must still be validation");
        assert_eq!(s.validation_trades_since_change, trade_number);
    }

    let clearing_intent = SignalIntent { side: Side::Buy, price: dec!(30000), quantity: dec!(0.01), confidence: dec!(0.8) };
    let signal = dispatcher.dispatch(&mut s, clearing_intent, true, Some(&client), &symbol, &cancel).await.unwrap();
    assert_eq!(signal.trade_type, TradeType::Real, "once 20 validation trades have landed the gate clears");
}
