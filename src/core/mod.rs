//! Core business logic abstractions

pub mod chain;
pub mod config;
pub mod currency;
pub mod error;
pub mod holding;
pub mod log;
pub mod policy;
pub mod price;
pub mod rebalance;
pub mod snapshot;
pub mod store;
pub mod valuation;

// Re-export main types for cleaner imports
pub use currency::{FxRateSource, FxNormalizer};
pub use error::{EngineError, ProviderError, ProviderFailure};
pub use holding::{AssetClass, Holding, NavRecord};
pub use policy::Policy;
pub use price::{PriceQuote, QuoteProvider};
pub use snapshot::SnapshotEngine;
pub use valuation::ValuationSnapshot;
