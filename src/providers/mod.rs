pub mod alpha_vantage;
pub mod cash;
pub mod coingecko;
pub mod frankfurter;
pub mod util;
pub mod yahoo_finance;

use crate::core::chain::PriceChain;
use crate::core::config::AppConfig;
use crate::core::currency::FxRateSource;
use crate::core::holding::AssetClass;
use crate::core::price::QuoteProvider;
use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Instantiates the provider behind a route id.
fn provider_for(id: &str, config: &AppConfig) -> Result<Arc<dyn QuoteProvider>> {
    let providers = &config.providers;
    let timeout = Duration::from_millis(providers.timeout_ms);
    let provider: Arc<dyn QuoteProvider> = match id {
        yahoo_finance::ID => Arc::new(yahoo_finance::YahooFinanceProvider::new(
            &providers.yahoo.base_url,
            timeout,
        )?),
        alpha_vantage::ID => match &providers.alpha_vantage.api_key {
            Some(key) => Arc::new(alpha_vantage::AlphaVantageProvider::new(
                &providers.alpha_vantage.base_url,
                key,
                timeout,
            )?),
            None => bail!("Provider '{id}' is routed but providers.alpha_vantage.api_key is not set"),
        },
        coingecko::ID => Arc::new(coingecko::CoinGeckoProvider::new(
            &providers.coingecko.base_url,
            providers.coingecko.api_key.as_deref(),
            &providers.coingecko.ids,
            timeout,
        )?),
        cash::ID => Arc::new(cash::CashProvider),
        other => bail!("Unknown price provider '{other}'"),
    };
    Ok(provider)
}

/// Builds the fallback chain from the configured routes.
pub fn build_chain(config: &AppConfig) -> Result<PriceChain> {
    let mut chain = PriceChain::new(config.chain_settings());
    for asset_class in AssetClass::ALL {
        let route = config.route(asset_class);
        debug!("Route for {}: {:?}", asset_class, route);
        let providers = route
            .iter()
            .map(|id| provider_for(id, config))
            .collect::<Result<Vec<_>>>()?;
        chain = chain.with_route(asset_class, providers);
    }
    Ok(chain)
}

pub fn build_fx_source(config: &AppConfig) -> Result<Arc<dyn FxRateSource>> {
    Ok(Arc::new(frankfurter::FrankfurterRateSource::new(
        &config.providers.frankfurter.base_url,
        Duration::from_millis(config.providers.timeout_ms),
    )?))
}
