//! Composition root (§9, §6): configuration loading plus the two periodic drivers — the
//! arbitrage scan/execute loop and the strategy dispatch loop — that [`main`](../src/main.rs)
//! wires against concretely-constructed components at process startup. Kept as a library so
//! the wiring itself is unit-testable and `main.rs` stays a thin entrypoint.

pub mod arbitrage_loop;
pub mod config;
pub mod strategy_loop;

pub use config::Config;
