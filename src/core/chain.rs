//! Ordered provider fallback for price retrieval.
//!
//! Each asset class is routed to a list of providers tried strictly in order.
//! Every attempt is bounded by a timeout and transient failures are retried on
//! the same provider before moving on. Independent instruments are looked up
//! concurrently with a bounded number of in-flight requests.

use crate::core::error::{ProviderAttempt, ProviderFailure};
use crate::core::holding::AssetClass;
use crate::core::price::{Freshness, PriceQuote, QuoteProvider, QuoteRequest};
use crate::providers::util::{with_retry, with_timeout};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub timeout: Duration,
    pub retries: usize,
    pub retry_delay_ms: u64,
    pub max_concurrency: usize,
    /// Quotes whose market time is older than this are flagged stale.
    pub max_quote_age: chrono::Duration,
}

impl Default for ChainSettings {
    fn default() -> Self {
        ChainSettings {
            timeout: Duration::from_secs(10),
            retries: 2,
            retry_delay_ms: 500,
            max_concurrency: 4,
            max_quote_age: chrono::Duration::days(4),
        }
    }
}

pub type QuoteResults = HashMap<QuoteRequest, Result<PriceQuote, ProviderFailure>>;

pub struct PriceChain {
    routes: HashMap<AssetClass, Vec<Arc<dyn QuoteProvider>>>,
    settings: ChainSettings,
}

impl PriceChain {
    pub fn new(settings: ChainSettings) -> Self {
        PriceChain {
            routes: HashMap::new(),
            settings,
        }
    }

    /// Sets the provider order for an asset class, replacing any previous route.
    pub fn with_route(mut self, asset_class: AssetClass, providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        self.routes.insert(asset_class, providers);
        self
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub fn has_route(&self, asset_class: AssetClass) -> bool {
        self.routes
            .get(&asset_class)
            .is_some_and(|providers| !providers.is_empty())
    }

    pub fn route(&self, asset_class: AssetClass) -> Vec<&'static str> {
        self.routes
            .get(&asset_class)
            .map(|providers| providers.iter().map(|p| p.id()).collect())
            .unwrap_or_default()
    }

    /// Fetches a quote, falling back through the routed providers in order.
    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<PriceQuote, ProviderFailure> {
        let mut attempts = Vec::new();
        let providers = self
            .routes
            .get(&request.asset_class)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for provider in providers {
            let id = provider.id();
            let timeout = self.settings.timeout;
            debug!("Requesting {} from {}", request.instrument, id);

            let result = with_retry(
                move || with_timeout(id, timeout, provider.fetch_quote(request)),
                self.settings.retries,
                self.settings.retry_delay_ms,
            )
            .await;

            match result {
                Ok(quote) => {
                    let fetched_at = Utc::now();
                    let freshness = match quote.as_of {
                        Some(as_of) if fetched_at - as_of > self.settings.max_quote_age => {
                            Freshness::Stale
                        }
                        _ => Freshness::Fresh,
                    };
                    if !attempts.is_empty() {
                        info!(
                            "{} priced by fallback provider {} after {} failure(s)",
                            request.instrument,
                            id,
                            attempts.len()
                        );
                    }
                    return Ok(PriceQuote {
                        instrument: request.instrument.clone(),
                        price: quote.price,
                        currency: quote.currency,
                        source: id.to_string(),
                        fetched_at,
                        freshness,
                    });
                }
                Err(error) => {
                    warn!("Provider {} failed for {}: {}", id, request.instrument, error);
                    attempts.push(ProviderAttempt {
                        provider: id.to_string(),
                        error,
                    });
                }
            }
        }

        Err(ProviderFailure {
            instrument: request.instrument.clone(),
            asset_class: request.asset_class,
            attempts,
        })
    }

    /// Prices a batch of instruments. Duplicate requests are fetched once.
    pub async fn get_quotes(&self, requests: impl IntoIterator<Item = QuoteRequest>) -> QuoteResults {
        let unique: HashSet<QuoteRequest> = requests.into_iter().collect();
        debug!(
            "Fetching {} quotes with up to {} in flight",
            unique.len(),
            self.settings.max_concurrency
        );

        stream::iter(unique.into_iter().map(|request| async move {
            let result = self.get_quote(&request).await;
            (request, result)
        }))
        .buffer_unordered(self.settings.max_concurrency.max(1))
        .collect()
        .await
    }
}
