use crate::core::error::ProviderError;
use rust_decimal::Decimal;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "sleeve/0.1";

/// Retries an async operation while it keeps failing with a transient error
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts, doubled after each rate limit
///
/// # Returns
/// Either the successful result or the last error. Non-transient errors are
/// returned immediately.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    let mut delay = delay_ms;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries || !err.is_transient() {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms...",
                    attempt, retries, err, delay
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if matches!(err, ProviderError::RateLimited { .. }) {
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }
}

/// Bounds a provider call; running past `timeout` counts as a provider failure.
pub async fn with_timeout<Fut, T>(
    provider: &str,
    timeout: Duration,
    operation: Fut,
) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
        }),
    }
}

/// One client per provider, reused across fetches. `timeout` bounds each request.
pub fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::from_reqwest(provider, e))
}

/// Sends a GET and returns the body of a 2xx response.
pub async fn get_text(
    provider: &str,
    client: &reqwest::Client,
    url: &str,
) -> Result<String, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        debug!("{} returned HTTP {} for {}", provider, status, url);
        return Err(ProviderError::from_status(provider, status.as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))
}

/// Parses a decimal the way JSON APIs print them, including exponent notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

pub fn decimal_from_json(value: &serde_json::Number) -> Option<Decimal> {
    parse_decimal(&value.to_string())
}

/// Providers must answer with a strictly positive price.
pub fn positive_price(provider: &str, price: Option<Decimal>) -> Result<Decimal, ProviderError> {
    match price {
        Some(p) if p > Decimal::ZERO => Ok(p),
        Some(p) => Err(ProviderError::malformed(
            provider,
            format!("non-positive price {p}"),
        )),
        None => Err(ProviderError::malformed(provider, "price is not a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ProviderError::Network {
                        provider: "test".to_string(),
                        message: "reset".to_string(),
                    })
                } else {
                    Ok(42)
                }
            },
            3,
            1,
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_errors() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::from_status("test", 404))
            },
            3,
            1,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_retries() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::from_status("test", 503))
            },
            2,
            1,
        )
        .await;
        assert_eq!(result, Err(ProviderError::from_status("test", 503)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_provider_error() {
        let result: Result<(), _> = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(ProviderError::Timeout {
                provider: "slow".to_string()
            })
        );
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1.0765"), Some(dec!(1.0765)));
        assert_eq!(parse_decimal(" 50000 "), Some(dec!(50000)));
        assert_eq!(parse_decimal("1e-5"), Some(dec!(0.00001)));
        assert_eq!(parse_decimal("abc"), None);
    }
}
