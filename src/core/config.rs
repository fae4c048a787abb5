use crate::core::chain::ChainSettings;
use crate::core::holding::AssetClass;
use crate::core::valuation::ValuationSettings;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlphaVantageProviderConfig {
    pub base_url: String,
    /// The provider joins the default routes only when a key is set.
    pub api_key: Option<String>,
}

impl Default for AlphaVantageProviderConfig {
    fn default() -> Self {
        AlphaVantageProviderConfig {
            base_url: "https://www.alphavantage.co".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Extra ticker -> coin id mappings, e.g. `DOT: polkadot`.
    #[serde(default)]
    pub ids: HashMap<String, String>,
}

impl Default for CoinGeckoProviderConfig {
    fn default() -> Self {
        CoinGeckoProviderConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            ids: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrankfurterProviderConfig {
    pub base_url: String,
}

impl Default for FrankfurterProviderConfig {
    fn default() -> Self {
        FrankfurterProviderConfig {
            base_url: "https://api.frankfurter.app".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub yahoo: YahooProviderConfig,
    pub alpha_vantage: AlphaVantageProviderConfig,
    pub coingecko: CoinGeckoProviderConfig,
    pub frankfurter: FrankfurterProviderConfig,
    pub timeout_ms: u64,
    pub retries: usize,
    pub retry_delay_ms: u64,
    pub max_concurrency: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: YahooProviderConfig::default(),
            alpha_vantage: AlphaVantageProviderConfig::default(),
            coingecko: CoinGeckoProviderConfig::default(),
            frankfurter: FrankfurterProviderConfig::default(),
            timeout_ms: 10_000,
            retries: 2,
            retry_delay_ms: 500,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ValuationConfig {
    pub nav_classes: Vec<AssetClass>,
    pub nav_max_age_days: i64,
    pub max_quote_age_days: i64,
    pub book_cost_fallback: bool,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        ValuationConfig {
            nav_classes: vec![AssetClass::Fund, AssetClass::Lending],
            nav_max_age_days: 7,
            max_quote_age_days: 4,
            book_cost_fallback: false,
        }
    }
}

fn default_base_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    pub data_path: Option<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Provider order per asset class; classes not listed keep the default route.
    #[serde(default)]
    pub routes: HashMap<AssetClass, Vec<String>>,
    #[serde(default)]
    pub valuation: ValuationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            base_currency: default_base_currency(),
            data_path: None,
            providers: ProvidersConfig::default(),
            routes: HashMap::new(),
            valuation: ValuationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "sleeve", "sleeve")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Provider ids tried in order for `asset_class`.
    pub fn route(&self, asset_class: AssetClass) -> Vec<String> {
        if let Some(route) = self.routes.get(&asset_class) {
            return route.clone();
        }

        let market = || {
            let mut route = Vec::new();
            if self.providers.alpha_vantage.api_key.is_some() {
                route.push("alpha_vantage".to_string());
            }
            route.push("yahoo".to_string());
            route
        };
        match asset_class {
            AssetClass::Crypto => vec!["coingecko".to_string()],
            AssetClass::Cash => vec!["cash".to_string()],
            AssetClass::Lending => vec![],
            AssetClass::Equity
            | AssetClass::Bonds
            | AssetClass::Fund
            | AssetClass::Commodity
            | AssetClass::Other => market(),
        }
    }

    pub fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            timeout: Duration::from_millis(self.providers.timeout_ms),
            retries: self.providers.retries,
            retry_delay_ms: self.providers.retry_delay_ms,
            max_concurrency: self.providers.max_concurrency,
            max_quote_age: chrono::Duration::days(self.valuation.max_quote_age_days),
        }
    }

    pub fn valuation_settings(&self) -> ValuationSettings {
        ValuationSettings {
            base_currency: self.base_currency.to_uppercase(),
            nav_classes: self.valuation.nav_classes.iter().copied().collect(),
            nav_max_age: chrono::Duration::days(self.valuation.nav_max_age_days),
            book_cost_fallback: self.valuation.book_cost_fallback,
        }
    }
}
