use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::error::ProviderError;
use crate::core::price::{ProviderQuote, QuoteProvider, QuoteRequest};

pub const ID: &str = "cash";

/// Cash is worth one unit of its own currency.
pub struct CashProvider;

#[async_trait]
impl QuoteProvider for CashProvider {
    fn id(&self) -> &'static str {
        ID
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote, ProviderError> {
        Ok(ProviderQuote {
            price: Decimal::ONE,
            currency: request.currency.to_uppercase(),
            as_of: None,
        })
    }
}
