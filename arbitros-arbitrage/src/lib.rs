//! Arbitrage Engine: the Opportunity Detector (OD), Fund Allocator (FA) and Arbitrage
//! Executor (AX) that together turn a market snapshot into executed, capital-accounted trades.

pub mod allocator;
pub mod detector;
pub mod executor;
pub mod types;

pub use allocator::{FundAllocator, FundAllocatorError, ReservationToken};
pub use detector::{FlatTransferCostModel, OpportunityDetector, OpportunityDetectorConfig, TransferCostModel};
pub use executor::{run_task, ExecutorConfig, ExecutorError};
pub use types::{
    ArbitrageOpportunity, ArbitrageTask, CrossExchangeOpportunity, OpportunityClass, PriceDiff,
    StepLogEntry, TaskOutcome, TaskState, Transfer, TriangularOpportunity, TriangularStep,
};
