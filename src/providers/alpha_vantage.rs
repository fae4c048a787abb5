use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::error::ProviderError;
use crate::core::price::{ProviderQuote, QuoteProvider, QuoteRequest};
use crate::providers::util::{get_text, http_client, parse_decimal, positive_price};

pub const ID: &str = "alpha_vantage";

/// `GLOBAL_QUOTE` lookups. The free tier allows a handful of calls per
/// minute, so it answers throttling with an informational body and HTTP 200.
pub struct AlphaVantageProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AlphaVantageProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(AlphaVantageProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: http_client(ID, timeout)?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<HashMap<String, String>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        ID
    }

    #[instrument(
        name = "AlphaVantageFetch",
        skip(self, request),
        fields(symbol = %request.instrument)
    )]
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote, ProviderError> {
        let url = format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, request.instrument, self.api_key
        );
        debug!("Requesting global quote for {}", request.instrument);

        let body = get_text(ID, &self.client, &url).await?;
        let data: GlobalQuoteResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::malformed(ID, e.to_string()))?;

        if data.note.is_some() || data.information.is_some() {
            debug!(
                "Throttled: {}",
                data.note.or(data.information).unwrap_or_default()
            );
            return Err(ProviderError::RateLimited {
                provider: ID.to_string(),
            });
        }

        let not_found = || ProviderError::NotFound {
            provider: ID.to_string(),
            instrument: request.instrument.clone(),
        };
        if let Some(message) = data.error_message {
            debug!("Error message: {}", message);
            return Err(not_found());
        }

        let quote = data
            .global_quote
            .filter(|q| !q.is_empty())
            .ok_or_else(not_found)?;
        let price = positive_price(ID, quote.get("05. price").and_then(|p| parse_decimal(p)))?;
        let as_of = quote
            .get("07. latest trading day")
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());

        // GLOBAL_QUOTE carries no currency; symbols are quoted in their listing currency
        Ok(ProviderQuote {
            price,
            currency: request.currency.to_uppercase(),
            as_of,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::holding::AssetClass;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn create_mock_server(symbol: &str, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .and(query_param("symbol", symbol))
            .and(query_param("apikey", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn request(symbol: &str) -> QuoteRequest {
        QuoteRequest {
            instrument: symbol.to_string(),
            asset_class: AssetClass::Equity,
            currency: "usd".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_quote() {
        let body = r#"{
            "Global Quote": {
                "01. symbol": "IBM",
                "05. price": "170.5400",
                "07. latest trading day": "2024-05-03"
            }
        }"#;
        let mock_server = create_mock_server("IBM", body).await;

        let provider = AlphaVantageProvider::new(&mock_server.uri(), "demo", TIMEOUT).unwrap();
        let quote = provider.fetch_quote(&request("IBM")).await.unwrap();
        assert_eq!(quote.price, dec!(170.54));
        assert_eq!(quote.currency, "USD");
        assert_eq!(
            quote.as_of.unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()
        );
    }

    #[tokio::test]
    async fn test_note_means_rate_limited() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let mock_server = create_mock_server("IBM", body).await;

        let provider = AlphaVantageProvider::new(&mock_server.uri(), "demo", TIMEOUT).unwrap();
        let err = provider.fetch_quote(&request("IBM")).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::RateLimited {
                provider: "alpha_vantage".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_quote_is_not_found() {
        let mock_server = create_mock_server("XXXX", r#"{"Global Quote": {}}"#).await;

        let provider = AlphaVantageProvider::new(&mock_server.uri(), "demo", TIMEOUT).unwrap();
        let err = provider.fetch_quote(&request("XXXX")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_error_message_is_not_found() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        let mock_server = create_mock_server("BAD", body).await;

        let provider = AlphaVantageProvider::new(&mock_server.uri(), "demo", TIMEOUT).unwrap();
        let err = provider.fetch_quote(&request("BAD")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }
}
