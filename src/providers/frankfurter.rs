use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::currency::{FxRate, FxRateSource};
use crate::core::error::ProviderError;
use crate::providers::util::{decimal_from_json, get_text, http_client};

pub const ID: &str = "frankfurter";

/// ECB daily reference rates served as JSON by the Frankfurter API.
pub struct FrankfurterRateSource {
    base_url: String,
    client: reqwest::Client,
}

impl FrankfurterRateSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(FrankfurterRateSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(ID, timeout)?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct RatesResponse {
    base: String,
    /// Publication date; weekends and holidays resolve to the previous fixing.
    date: NaiveDate,
    rates: HashMap<String, serde_json::Number>,
}

#[async_trait]
impl FxRateSource for FrankfurterRateSource {
    fn id(&self) -> &'static str {
        ID
    }

    #[instrument(name = "FrankfurterFetch", skip(self))]
    async fn fetch_rates(
        &self,
        base: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<FxRate>, ProviderError> {
        let day = date.map_or_else(|| "latest".to_string(), |d| d.format("%Y-%m-%d").to_string());
        let url = format!("{}/{}?from={}", self.base_url, day, base.to_uppercase());
        debug!("Requesting reference rates from {}", url);

        let body = get_text(ID, &self.client, &url).await?;
        let data: RatesResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::malformed(ID, e.to_string()))?;

        let mut rates: Vec<FxRate> = data
            .rates
            .iter()
            .filter_map(|(quote, value)| {
                let rate = decimal_from_json(value).filter(|r| !r.is_sign_negative() && !r.is_zero());
                if rate.is_none() {
                    debug!("Skipping unusable rate for {}: {}", quote, value);
                }
                rate.map(|rate| FxRate {
                    base: data.base.to_uppercase(),
                    quote: quote.to_uppercase(),
                    date: data.date,
                    rate,
                })
            })
            .collect();
        rates.sort_by(|a, b| a.quote.cmp(&b.quote));

        if rates.is_empty() {
            return Err(ProviderError::malformed(ID, "no rates in response"));
        }
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_rates_for_date() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2024-05-04"))
            .and(query_param("from", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"amount":1.0,"base":"EUR","date":"2024-05-03","rates":{"USD":1.0765,"GBP":0.8583}}"#,
            ))
            .mount(&mock_server)
            .await;

        let source = FrankfurterRateSource::new(&mock_server.uri(), TIMEOUT).unwrap();
        let rates = source
            .fetch_rates("eur", NaiveDate::from_ymd_opt(2024, 5, 4))
            .await
            .unwrap();

        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].quote, "GBP");
        assert_eq!(rates[1].rate, dec!(1.0765));
        // Keyed by the fixing date, not the requested one
        assert_eq!(rates[1].date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(rates[1].base, "EUR");
    }

    #[tokio::test]
    async fn test_latest_rates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"amount":1.0,"base":"USD","date":"2024-05-03","rates":{"EUR":0.92894}}"#,
            ))
            .mount(&mock_server)
            .await;

        let source = FrankfurterRateSource::new(&mock_server.uri(), TIMEOUT).unwrap();
        let rates = source.fetch_rates("USD", None).await.unwrap();
        assert_eq!(rates[0].rate, dec!(0.92894));
    }

    #[tokio::test]
    async fn test_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"not found"}"#))
            .mount(&mock_server)
            .await;

        let source = FrankfurterRateSource::new(&mock_server.uri(), TIMEOUT).unwrap();
        let err = source.fetch_rates("XXX", None).await.unwrap_err();
        assert_eq!(err, ProviderError::from_status("frankfurter", 404));
    }

    #[tokio::test]
    async fn test_empty_rates_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"amount":1.0,"base":"EUR","date":"2024-05-03","rates":{}}"#,
            ))
            .mount(&mock_server)
            .await;

        let source = FrankfurterRateSource::new(&mock_server.uri(), TIMEOUT).unwrap();
        let err = source.fetch_rates("EUR", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }
}
