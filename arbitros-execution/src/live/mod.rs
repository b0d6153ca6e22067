pub mod binance;
pub mod bitget;
pub mod okx;
mod sign;

pub use binance::{BinanceClient, BinanceConfig};
pub use bitget::{BitgetClient, BitgetConfig};
pub use okx::{OkxClient, OkxConfig};
