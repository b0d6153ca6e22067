use crate::types::{ArbitrageOpportunity, CrossExchangeOpportunity, TriangularOpportunity, TriangularStep};
use arbitros_execution::types::{Side, Ticker};
use arbitros_instrument::{AssetId, Exchange, ExchangeId, Symbol};
use indexmap::IndexMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::{collections::VecDeque, sync::Arc};

/// How many net fee percent a transfer between two exchanges is modeled to cost for a given
/// asset, pending a real on-chain-fee oracle. Centralised here rather than hard-coded per call
/// site, per the same "centralize fee percentages" principle as [`arbitros_instrument::Exchange`].
pub trait TransferCostModel: Send + Sync {
    fn transfer_fee_pct(&self, asset: &AssetId, from: ExchangeId, to: ExchangeId) -> Decimal;
    fn transfer_minutes(&self, asset: &AssetId, from: ExchangeId, to: ExchangeId) -> Decimal;
}

/// Bounded ring of recently detected opportunities per class, retained for at most
/// `capacity` entries (§4.3's "bounded ring of recent opportunities per class").
struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }
}

pub struct OpportunityDetectorConfig {
    pub min_cross_pct: Decimal,
    pub min_tri_pct: Decimal,
    pub base_asset: AssetId,
    pub ring_capacity: usize,
}

impl Default for OpportunityDetectorConfig {
    fn default() -> Self {
        Self {
            min_cross_pct: Decimal::new(2, 3),   // 0.2%
            min_tri_pct: Decimal::new(1, 3),      // 0.1%
            base_asset: AssetId::new_str("USDT"),
            ring_capacity: 512,
        }
    }
}

/// Opportunity Detector (OD, §4.3): rescans the full [`arbitros_data::SnapshotMap`] snapshot
/// on every publish and republishes a ranked opportunity list.
pub struct OpportunityDetector {
    config: OpportunityDetectorConfig,
    exchanges: Vec<Exchange>,
    recent: RwLock<Ring<ArbitrageOpportunity>>,
}

impl OpportunityDetector {
    pub fn new(config: OpportunityDetectorConfig, exchanges: Vec<Exchange>) -> Self {
        let ring_capacity = config.ring_capacity;
        Self {
            config,
            exchanges,
            recent: RwLock::new(Ring::new(ring_capacity)),
        }
    }

    /// Run both scans against one market snapshot and return the ranked, filtered list.
    /// Also records every emitted opportunity into the retained ring.
    pub fn scan(
        &self,
        snapshot: &IndexMap<(ExchangeId, Symbol), Ticker>,
        cost_model: &dyn TransferCostModel,
    ) -> Vec<ArbitrageOpportunity> {
        let mut found = cross_exchange_scan(snapshot, &self.exchanges, self.config.min_cross_pct, cost_model)
            .into_iter()
            .map(ArbitrageOpportunity::CrossExchange)
            .collect::<Vec<_>>();

        for exchange in &self.exchanges {
            found.extend(
                triangular_scan(snapshot, exchange, &self.config.base_asset, self.config.min_tri_pct)
                    .into_iter()
                    .map(ArbitrageOpportunity::Triangular),
            );
        }

        rank(&mut found);

        let mut ring = self.recent.write();
        for opp in &found {
            ring.push(opp.clone());
        }
        found
    }
}

/// Ranks by `net_pct` descending; ties broken by estimated latency (triangular before
/// cross-exchange, §4.3).
fn rank(opportunities: &mut [ArbitrageOpportunity]) {
    opportunities.sort_by(|a, b| {
        b.net_pct()
            .cmp(&a.net_pct())
            .then_with(|| a.estimated_latency_rank().cmp(&b.estimated_latency_rank()))
    });
}

fn cross_exchange_scan(
    snapshot: &IndexMap<(ExchangeId, Symbol), Ticker>,
    exchanges: &[Exchange],
    min_cross_pct: Decimal,
    cost_model: &dyn TransferCostModel,
) -> Vec<CrossExchangeOpportunity> {
    let mut out = Vec::new();

    for a in exchanges {
        for b in exchanges {
            if a.id == b.id {
                continue;
            }
            for symbol in &a.capabilities.symbols {
                if !b.capabilities.supports(symbol) {
                    continue;
                }
                let (Some(ticker_a), Some(ticker_b)) = (
                    snapshot.get(&(a.id, symbol.clone())),
                    snapshot.get(&(b.id, symbol.clone())),
                ) else {
                    continue;
                };

                let ask_a = ticker_a.ask;
                let bid_b = ticker_b.bid;
                if bid_b <= ask_a {
                    continue;
                }

                let gross_pct = (bid_b - ask_a) / ask_a;
                let transfer_fee_pct = cost_model.transfer_fee_pct(&symbol.base, a.id, b.id);
                let net_pct = gross_pct - a.capabilities.taker_fee - b.capabilities.taker_fee - transfer_fee_pct;

                if net_pct >= min_cross_pct {
                    out.push(CrossExchangeOpportunity {
                        symbol: symbol.clone(),
                        buy_exchange: a.id,
                        sell_exchange: b.id,
                        buy_price: ask_a,
                        sell_price: bid_b,
                        net_pct_after_fees_and_transfer: net_pct,
                        est_transfer_minutes: cost_model.transfer_minutes(&symbol.base, a.id, b.id),
                        est_transfer_fee: transfer_fee_pct * ask_a,
                    });
                }
            }
        }
    }

    out
}

/// One edge of the per-exchange asset graph (§4.3): trading `X/Y` at rate `rate` moves
/// `from` units of `from_asset` into `rate * from` units of `to_asset`.
struct Edge {
    from_asset: AssetId,
    to_asset: AssetId,
    symbol: Symbol,
    direction: Side,
    rate: Decimal,
}

fn build_graph(snapshot: &IndexMap<(ExchangeId, Symbol), Ticker>, exchange: ExchangeId) -> Vec<Edge> {
    let mut edges = Vec::new();
    for ((ex, symbol), ticker) in snapshot {
        if *ex != exchange {
            continue;
        }
        // Buy X with Y: spend ask, receive X. Edge Y -> X.
        if !ticker.ask.is_zero() {
            edges.push(Edge {
                from_asset: symbol.quote.clone(),
                to_asset: symbol.base.clone(),
                symbol: symbol.clone(),
                direction: Side::Buy,
                rate: Decimal::ONE / ticker.ask,
            });
        }
        // Sell X for Y: spend X, receive bid. Edge X -> Y.
        edges.push(Edge {
            from_asset: symbol.base.clone(),
            to_asset: symbol.quote.clone(),
            symbol: symbol.clone(),
            direction: Side::Sell,
            rate: ticker.bid,
        });
    }
    edges
}

fn triangular_scan(
    snapshot: &IndexMap<(ExchangeId, Symbol), Ticker>,
    exchange: &Exchange,
    base_asset: &AssetId,
    min_tri_pct: Decimal,
) -> Vec<TriangularOpportunity> {
    let edges = build_graph(snapshot, exchange.id);
    let taker_fee = exchange.capabilities.taker_fee;
    let fee_mult = Decimal::ONE - taker_fee;
    let mut out = Vec::new();

    let first_legs = edges.iter().filter(|e| e.from_asset == *base_asset);
    for leg1 in first_legs {
        let second_legs = edges.iter().filter(|e| e.from_asset == leg1.to_asset);
        for leg2 in second_legs {
            if leg2.to_asset == *base_asset {
                continue; // a length-2 cycle, not length-3
            }
            let third_legs = edges
                .iter()
                .filter(|e| e.from_asset == leg2.to_asset && e.to_asset == *base_asset);
            for leg3 in third_legs {
                let end_amount = leg1.rate * fee_mult * leg2.rate * fee_mult * leg3.rate * fee_mult;
                let net_pct = end_amount - Decimal::ONE;
                if net_pct < min_tri_pct {
                    continue;
                }
                out.push(TriangularOpportunity {
                    exchange: exchange.id,
                    path: [
                        TriangularStep { symbol: leg1.symbol.clone(), direction: leg1.direction, rate: leg1.rate },
                        TriangularStep { symbol: leg2.symbol.clone(), direction: leg2.direction, rate: leg2.rate },
                        TriangularStep { symbol: leg3.symbol.clone(), direction: leg3.direction, rate: leg3.rate },
                    ],
                    expected_end_amount_per_unit_start: end_amount,
                    net_pct,
                });
            }
        }
    }

    out
}

/// Static transfer-cost model keyed by nothing but a flat fee/duration; a real implementation
/// would source these from on-chain network fee estimates. Sufficient for detector tests and
/// for paper environments where transfer behaviour is seeded.
pub struct FlatTransferCostModel {
    pub fee_pct: Decimal,
    pub minutes: Decimal,
}

impl TransferCostModel for FlatTransferCostModel {
    fn transfer_fee_pct(&self, _asset: &AssetId, _from: ExchangeId, _to: ExchangeId) -> Decimal {
        self.fee_pct
    }

    fn transfer_minutes(&self, _asset: &AssetId, _from: ExchangeId, _to: ExchangeId) -> Decimal {
        self.minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitros_instrument::ExchangeCapabilities;
    use arbitros_integration::time::now_ms;
    use rust_decimal_macros::dec;

    fn ticker(exchange: ExchangeId, symbol: Symbol, bid: Decimal, ask: Decimal) -> ((ExchangeId, Symbol), Ticker) {
        (
            (exchange, symbol.clone()),
            Ticker {
                exchange,
                symbol,
                bid,
                ask,
                last: (bid + ask) / Decimal::TWO,
                bid_depth_top_n: vec![],
                ask_depth_top_n: vec![],
                quote_volume_24h: dec!(0),
                observed_at: now_ms(),
            },
        )
    }

    fn exchange(id: ExchangeId, symbols: Vec<Symbol>, taker_fee: Decimal) -> Exchange {
        Exchange::new(
            id,
            ExchangeCapabilities {
                can_withdraw: true,
                can_deposit: true,
                maker_fee: taker_fee,
                taker_fee,
                symbols,
            },
        )
    }

    #[test]
    fn cross_exchange_emits_opportunity_above_threshold() {
        let symbol = Symbol::new("BTC", "USDT");
        let snapshot: IndexMap<_, _> = [
            ticker(ExchangeId::Binance, symbol.clone(), dec!(29990), dec!(30000)),
            ticker(ExchangeId::Okx, symbol.clone(), dec!(30300), dec!(30310)),
        ]
        .into_iter()
        .collect();

        let exchanges = vec![
            exchange(ExchangeId::Binance, vec![symbol.clone()], dec!(0.001)),
            exchange(ExchangeId::Okx, vec![symbol.clone()], dec!(0.001)),
        ];
        let model = FlatTransferCostModel { fee_pct: dec!(0.0005), minutes: dec!(15) };

        let found = cross_exchange_scan(&snapshot, &exchanges, dec!(0.002), &model);
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.buy_exchange, ExchangeId::Binance);
        assert_eq!(opp.sell_exchange, ExchangeId::Okx);
        assert!(opp.net_pct_after_fees_and_transfer >= dec!(0.002));
    }

    #[test]
    fn triangular_matches_worked_example_within_half_a_percent() {
        // BTC/USDT ask=30000, ETH/BTC ask=0.05, ETH/USDT bid=1530, fees 0.1% (§8 scenario 1).
        let snapshot: IndexMap<_, _> = [
            ticker(ExchangeId::Binance, Symbol::new("BTC", "USDT"), dec!(29999), dec!(30000)),
            ticker(ExchangeId::Binance, Symbol::new("ETH", "BTC"), dec!(0.0499), dec!(0.05)),
            ticker(ExchangeId::Binance, Symbol::new("ETH", "USDT"), dec!(1530), dec!(1530.1)),
        ]
        .into_iter()
        .collect();

        let ex = exchange(
            ExchangeId::Binance,
            vec![Symbol::new("BTC", "USDT"), Symbol::new("ETH", "BTC"), Symbol::new("ETH", "USDT")],
            dec!(0.001),
        );

        let found = triangular_scan(&snapshot, &ex, &AssetId::new_str("USDT"), dec!(0.001));
        assert_eq!(found.len(), 1);
        let opp = &found[0];

        let expected_pct = dec!(0.01895);
        let diff = (opp.net_pct - expected_pct).abs();
        assert!(diff < dec!(0.005), "net_pct {} too far from {}", opp.net_pct, expected_pct);
    }

    #[test]
    fn rank_prefers_triangular_on_tie_and_higher_pct_first() {
        let cross = ArbitrageOpportunity::CrossExchange(CrossExchangeOpportunity {
            symbol: Symbol::new("BTC", "USDT"),
            buy_exchange: ExchangeId::Binance,
            sell_exchange: ExchangeId::Okx,
            buy_price: dec!(30000),
            sell_price: dec!(30300),
            net_pct_after_fees_and_transfer: dec!(0.01),
            est_transfer_minutes: dec!(15),
            est_transfer_fee: dec!(10),
        });
        let tri = ArbitrageOpportunity::Triangular(TriangularOpportunity {
            exchange: ExchangeId::Binance,
            path: [
                TriangularStep { symbol: Symbol::new("BTC", "USDT"), direction: Side::Buy, rate: dec!(0.0000333) },
                TriangularStep { symbol: Symbol::new("ETH", "BTC"), direction: Side::Buy, rate: dec!(20) },
                TriangularStep { symbol: Symbol::new("ETH", "USDT"), direction: Side::Sell, rate: dec!(1530) },
            ],
            expected_end_amount_per_unit_start: dec!(1.01),
            net_pct: dec!(0.01),
        });

        let mut found = vec![cross.clone(), tri.clone()];
        rank(&mut found);
        assert_eq!(found[0], tri);
        assert_eq!(found[1], cross);
    }
}
