pub mod fx;
pub mod import;
pub mod policy;
pub mod positions;
pub mod rebalance;
pub mod setup;
pub mod snapshot;
pub mod ui;
