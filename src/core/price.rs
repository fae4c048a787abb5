//! Pricing abstractions and core types

use crate::core::error::ProviderError;
use crate::core::holding::AssetClass;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Whether a price is recent enough to be trusted as today's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
        }
    }
}

/// What a provider is asked to price.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteRequest {
    pub instrument: String,
    pub asset_class: AssetClass,
    /// Currency the holding is quoted in; providers may answer in another one.
    pub currency: String,
}

/// Raw answer from one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuote {
    pub price: Decimal,
    pub currency: String,
    /// Market time of the price when the provider reports one.
    pub as_of: Option<DateTime<Utc>>,
}

/// A price tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub instrument: String,
    pub price: Decimal,
    pub currency: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub freshness: Freshness,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Stable identifier used in routes and on every quote this provider produces.
    fn id(&self) -> &'static str;

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote, ProviderError>;
}
