//! Strategy Pool (SP, §4.6), Simulation Engine (SE, §4.7), Scoring & Gating (SG, §4.8), the
//! Evolution Scheduler (ES, §4.9), and parameter mutation/crossover (§4.10): the half of the
//! Strategy Evolution & Trading Engine that does not itself talk to an exchange. Signal
//! dispatch and paper/real trade_type branching live downstream in `arbitros-signal`, which
//! depends on this crate for `Strategy`, `StrategyPool` and the gating rules.

pub mod evolution;
pub mod genesis;
pub mod mutation;
pub mod pool;
pub mod regime;
pub mod scoring;
pub mod simulation;
pub mod types;

pub use evolution::EvolutionScheduler;
pub use genesis::{seed_pool, STRATEGY_TYPES};
pub use pool::StrategyPool;
pub use regime::MarketRegime;
pub use scoring::{GateConfig, ScoreInputs, ScoreWeights};
pub use simulation::{SimulationConfig, SimulationResult};
pub use types::{Lineage, ParameterSpec, Strategy, StrategyParameters, Tier};
