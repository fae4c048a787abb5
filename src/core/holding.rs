//! Holdings and externally asserted NAV records.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Asset class of a holding. Every asset class is also a reporting sleeve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetClass {
    Equity,
    Bonds,
    Fund,
    Crypto,
    Commodity,
    Lending,
    Cash,
    Other,
}

impl AssetClass {
    pub const ALL: [AssetClass; 8] = [
        AssetClass::Equity,
        AssetClass::Bonds,
        AssetClass::Fund,
        AssetClass::Crypto,
        AssetClass::Commodity,
        AssetClass::Lending,
        AssetClass::Cash,
        AssetClass::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "Equity",
            AssetClass::Bonds => "Bonds",
            AssetClass::Fund => "Fund",
            AssetClass::Crypto => "Crypto",
            AssetClass::Commodity => "Commodity",
            AssetClass::Lending => "Lending",
            AssetClass::Cash => "Cash",
            AssetClass::Other => "Other",
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for AssetClass {
    /// Upload files carry loose labels, anything unknown lands in `Other`.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "equity" | "stock" | "stocks" | "etf" | "equity etf" => AssetClass::Equity,
            "bonds" | "bond" => AssetClass::Bonds,
            "fund" | "funds" => AssetClass::Fund,
            "crypto" => AssetClass::Crypto,
            "commodity" | "commodities" | "etc" => AssetClass::Commodity,
            "lending" | "p2p" => AssetClass::Lending,
            "cash" => AssetClass::Cash,
            _ => AssetClass::Other,
        }
    }
}

impl FromStr for AssetClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AssetClass::from(s))
    }
}

impl TryFrom<String> for AssetClass {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(AssetClass::from(value.as_str()))
    }
}

impl From<AssetClass> for String {
    fn from(value: AssetClass) -> Self {
        value.as_str().to_string()
    }
}

/// A position in one account, as supplied by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub account: String,
    pub name: String,
    pub instrument: String,
    pub asset_class: AssetClass,
    pub currency: String,
    pub quantity: Decimal,
    /// Total acquisition cost in `currency`.
    #[serde(default)]
    pub book_cost: Option<Decimal>,
}

impl Holding {
    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            bail!("Holding in account '{}' has no instrument key", self.account);
        }
        if self.currency.trim().is_empty() {
            bail!("Holding {} has no currency", self.instrument);
        }
        if self.quantity.is_sign_negative() && !self.quantity.is_zero() {
            bail!(
                "Holding {} has negative quantity {}",
                self.instrument,
                self.quantity
            );
        }
        if let Some(cost) = self.book_cost
            && cost.is_sign_negative()
            && !cost.is_zero()
        {
            bail!("Holding {} has negative book cost {}", self.instrument, cost);
        }
        Ok(())
    }
}

/// A manually asserted net asset value for an instrument on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavRecord {
    pub date: NaiveDate,
    pub instrument: String,
    pub nav: Decimal,
    pub currency: String,
}

impl NavRecord {
    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            bail!("NAV record dated {} has no instrument key", self.date);
        }
        if self.nav <= Decimal::ZERO {
            bail!(
                "NAV for {} on {} must be positive, got {}",
                self.instrument,
                self.date,
                self.nav
            );
        }
        Ok(())
    }
}
