//! Exchange Adapter (EA, §4.1): a normalized, cancellable, internally rate-limited interface
//! to one exchange's ticker, order book, balance, order and withdrawal operations, with
//! concrete clients for Binance, OKX, Bitget and an in-process [`mock::MockExchangeClient`]
//! test double.

pub mod client;
pub mod error;
pub mod live;
pub mod mock;
pub mod pool;
pub mod types;

pub use client::ExchangeClient;
pub use error::ExecutionError;
pub use mock::MockExchangeClient;
pub use pool::ExchangePool;
