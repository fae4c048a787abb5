use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::error::ProviderError;
use crate::core::price::{ProviderQuote, QuoteProvider, QuoteRequest};
use crate::providers::util::{decimal_from_json, get_text, http_client, positive_price};

pub const ID: &str = "yahoo";

/// Quotes from the Yahoo Finance chart endpoint.
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(ID, timeout)?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct YahooPriceResponse {
    chart: PriceChartResult,
}

#[derive(Deserialize, Debug)]
struct PriceChartResult {
    result: Option<Vec<PriceChartItem>>,
}

#[derive(Deserialize, Debug)]
struct PriceChartItem {
    meta: PriceChartMeta,
}

#[derive(Deserialize, Debug)]
struct PriceChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<serde_json::Number>,
    currency: Option<String>,
    #[serde(alias = "regularMarketTime")]
    regular_market_time: Option<i64>,
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    fn id(&self) -> &'static str {
        ID
    }

    #[instrument(
        name = "YahooPriceFetch",
        skip(self, request),
        fields(symbol = %request.instrument)
    )]
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, request.instrument);
        debug!("Requesting price data from {}", url);

        let body = match get_text(ID, &self.client, &url).await {
            // Unknown symbols come back as 404
            Err(ProviderError::Http { status: 404, .. }) => {
                return Err(ProviderError::NotFound {
                    provider: ID.to_string(),
                    instrument: request.instrument.clone(),
                });
            }
            other => other?,
        };

        let data: YahooPriceResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::malformed(ID, e.to_string()))?;
        let meta = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .map(|item| item.meta)
            .ok_or_else(|| ProviderError::NotFound {
                provider: ID.to_string(),
                instrument: request.instrument.clone(),
            })?;

        let price = positive_price(ID, meta.regular_market_price.as_ref().and_then(decimal_from_json))?;
        let currency = meta
            .currency
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed(ID, "missing currency"))?;

        Ok(ProviderQuote {
            price,
            currency: currency.to_uppercase(),
            as_of: meta
                .regular_market_time
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        })
    }
}
