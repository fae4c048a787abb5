use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::error::ProviderError;
use crate::core::price::{ProviderQuote, QuoteProvider, QuoteRequest};
use crate::providers::util::{decimal_from_json, get_text, http_client, positive_price};

pub const ID: &str = "coingecko";

/// Namespace prefix of crypto instrument keys, e.g. `CRYPTO:BTC`.
pub const CRYPTO_PREFIX: &str = "CRYPTO:";

const DEFAULT_COIN_IDS: [(&str, &str); 15] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("LINK", "chainlink"),
    ("ADA", "cardano"),
    ("AAVE", "aave"),
    ("INJ", "injective-protocol"),
    ("FIL", "filecoin"),
    ("NEXO", "nexo"),
    ("SUI", "sui"),
    ("PYTH", "pyth-network"),
    ("APTOS", "aptos"),
    ("ENA", "ethena"),
    ("AI16Z", "ai16z"),
    ("EURX", "eurx"),
];

/// Spot prices from CoinGecko's `/simple/price`.
pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    coin_ids: HashMap<String, String>,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    /// `extra_ids` maps ticker symbols to CoinGecko coin ids and overrides the
    /// built-in table.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        extra_ids: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut coin_ids: HashMap<String, String> = DEFAULT_COIN_IDS
            .iter()
            .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
            .collect();
        for (symbol, id) in extra_ids {
            coin_ids.insert(symbol.to_uppercase(), id.clone());
        }

        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            coin_ids,
            client: http_client(ID, timeout)?,
        })
    }

    fn coin_id(&self, instrument: &str) -> Option<&str> {
        let symbol = instrument
            .strip_prefix(CRYPTO_PREFIX)
            .unwrap_or(instrument)
            .to_uppercase();
        self.coin_ids.get(&symbol).map(String::as_str)
    }
}

#[async_trait]
impl QuoteProvider for CoinGeckoProvider {
    fn id(&self) -> &'static str {
        ID
    }

    #[instrument(
        name = "CoinGeckoFetch",
        skip(self, request),
        fields(symbol = %request.instrument)
    )]
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote, ProviderError> {
        let not_found = || ProviderError::NotFound {
            provider: ID.to_string(),
            instrument: request.instrument.clone(),
        };
        let coin_id = self.coin_id(&request.instrument).ok_or_else(not_found)?;
        let vs_currency = request.currency.to_lowercase();

        let mut url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, coin_id, vs_currency
        );
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&x_cg_demo_api_key={key}"));
        }
        debug!("Requesting {} in {}", coin_id, vs_currency);

        let body = get_text(ID, &self.client, &url).await?;
        let data: HashMap<String, HashMap<String, serde_json::Number>> =
            serde_json::from_str(&body).map_err(|e| ProviderError::malformed(ID, e.to_string()))?;

        let price = data
            .get(coin_id)
            .and_then(|prices| prices.get(&vs_currency))
            .ok_or_else(not_found)?;

        Ok(ProviderQuote {
            price: positive_price(ID, decimal_from_json(price))?,
            currency: request.currency.to_uppercase(),
            as_of: None,
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

    fn request(instrument: &str, currency: &str) -> QuoteRequest {
        QuoteRequest {
            instrument: instrument.to_string(),
            asset_class: AssetClass::Crypto,
            currency: currency.to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"bitcoin": {"usd": 50000}}"#),
            )
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri(), None, &HashMap::new(), TIMEOUT).unwrap();
        let quote = provider
            .fetch_quote(&request("CRYPTO:BTC", "USD"))
            .await
            .unwrap();
        assert_eq!(quote.price, dec!(50000));
        assert_eq!(quote.currency, "USD");
    }

    #[tokio::test]
    async fn test_configured_ids_extend_table() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "polkadot"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"polkadot": {"eur": 6.12}}"#),
            )
            .mount(&mock_server)
            .await;

        let extra = HashMap::from([("dot".to_string(), "polkadot".to_string())]);
        let provider = CoinGeckoProvider::new(&mock_server.uri(), None, &extra, TIMEOUT).unwrap();
        let quote = provider
            .fetch_quote(&request("CRYPTO:DOT", "EUR"))
            .await
            .unwrap();
        assert_eq!(quote.price, dec!(6.12));
    }

    #[tokio::test]
    async fn test_unknown_symbol_skips_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri(), None, &HashMap::new(), TIMEOUT).unwrap();
        let err = provider
            .fetch_quote(&request("CRYPTO:NOPE", "EUR"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_currency_in_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ethereum": {}}"#))
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri(), None, &HashMap::new(), TIMEOUT).unwrap();
        let err = provider
            .fetch_quote(&request("CRYPTO:ETH", "CHF"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri(), None, &HashMap::new(), TIMEOUT).unwrap();
        let err = provider
            .fetch_quote(&request("CRYPTO:BTC", "EUR"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::RateLimited {
                provider: "coingecko".to_string()
            }
        );
    }
}
