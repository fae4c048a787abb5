//! Combines holdings, quotes, NAV records and FX rates into a valuation.
//!
//! Holdings that cannot be priced stay in the snapshot with the reason, but
//! are excluded from every total and weight.

use crate::core::chain::QuoteResults;
use crate::core::currency::{FxNormalizer, FxRateTable, RateDirection};
use crate::core::error::{EngineError, NormalizationError, ProviderFailure};
use crate::core::holding::{AssetClass, Holding, NavRecord};
use crate::core::price::{Freshness, QuoteRequest};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use thiserror::Error;
use tracing::{debug, warn};

pub const NAV_SOURCE: &str = "nav";
pub const BOOK_COST_SOURCE: &str = "book-cost";

#[derive(Debug, Clone)]
pub struct ValuationSettings {
    pub base_currency: String,
    /// Asset classes whose price is asserted through NAV records.
    pub nav_classes: HashSet<AssetClass>,
    pub nav_max_age: chrono::Duration,
    /// Value unpriceable holdings at book cost, flagged stale.
    pub book_cost_fallback: bool,
}

impl Default for ValuationSettings {
    fn default() -> Self {
        ValuationSettings {
            base_currency: "EUR".to_string(),
            nav_classes: HashSet::from([AssetClass::Fund, AssetClass::Lending]),
            nav_max_age: chrono::Duration::days(7),
            book_cost_fallback: false,
        }
    }
}

/// NAV records indexed by instrument and date.
#[derive(Debug, Clone, Default)]
pub struct NavBook {
    records: HashMap<String, BTreeMap<NaiveDate, NavRecord>>,
}

impl NavBook {
    pub fn insert(&mut self, record: NavRecord) {
        self.records
            .entry(record.instrument.clone())
            .or_default()
            .insert(record.date, record);
    }

    pub fn latest_on_or_before(&self, instrument: &str, date: NaiveDate) -> Option<&NavRecord> {
        self.records
            .get(instrument)
            .and_then(|by_date| by_date.range(..=date).next_back())
            .map(|(_, record)| record)
    }
}

impl FromIterator<NavRecord> for NavBook {
    fn from_iter<I: IntoIterator<Item = NavRecord>>(iter: I) -> Self {
        let mut book = NavBook::default();
        for record in iter {
            book.insert(record);
        }
        book
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    Eod,
    Intraday,
}

impl Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Eod => write!(f, "EOD"),
            SnapshotKind::Intraday => write!(f, "intraday"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnpricedReason {
    #[error("{0}")]
    Provider(ProviderFailure),

    #[error("{0}")]
    Fx(NormalizationError),

    #[error("no NAV record for {instrument} on or before {date}")]
    NoNav { instrument: String, date: NaiveDate },

    #[error("value of {instrument} exceeds the representable range")]
    Overflow { instrument: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedHolding {
    /// Unit price in `price_currency`.
    pub price: Decimal,
    pub price_currency: String,
    pub price_source: String,
    pub freshness: Freshness,
    pub fx_rate: Decimal,
    pub fx_direction: RateDirection,
    pub fx_date: Option<NaiveDate>,
    /// Value in the base currency.
    pub value: Decimal,
    /// Share of the snapshot total.
    #[serde(default)]
    pub weight: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HoldingStatus {
    Priced(PricedHolding),
    Unpriced(UnpricedReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub account: String,
    pub name: String,
    pub instrument: String,
    pub asset_class: AssetClass,
    pub quantity: Decimal,
    pub status: HoldingStatus,
}

impl HoldingValuation {
    pub fn priced(&self) -> Option<&PricedHolding> {
        match &self.status {
            HoldingStatus::Priced(p) => Some(p),
            HoldingStatus::Unpriced(_) => None,
        }
    }

    pub fn unpriced_reason(&self) -> Option<&UnpricedReason> {
        match &self.status {
            HoldingStatus::Priced(_) => None,
            HoldingStatus::Unpriced(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveValuation {
    pub sleeve: AssetClass,
    pub value: Decimal,
    pub weight: Decimal,
    pub holdings: usize,
    pub stale: usize,
}

/// One immutable valuation of the whole portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub kind: SnapshotKind,
    pub date: NaiveDate,
    pub taken_at: DateTime<Utc>,
    pub base_currency: String,
    /// Sum over priced holdings only.
    pub total: Decimal,
    pub sleeves: Vec<SleeveValuation>,
    pub holdings: Vec<HoldingValuation>,
}

impl ValuationSnapshot {
    pub fn sleeve(&self, sleeve: AssetClass) -> Option<&SleeveValuation> {
        self.sleeves.iter().find(|s| s.sleeve == sleeve)
    }

    /// Weight of a sleeve, zero when the portfolio holds nothing in it.
    pub fn weight(&self, sleeve: AssetClass) -> Decimal {
        self.sleeve(sleeve).map_or(Decimal::ZERO, |s| s.weight)
    }

    pub fn unpriced(&self) -> impl Iterator<Item = &HoldingValuation> {
        self.holdings.iter().filter(|h| h.priced().is_none())
    }

    /// Holdings by value, largest first. Unpriced holdings go last.
    pub fn positions(&self) -> Vec<&HoldingValuation> {
        let mut positions: Vec<_> = self.holdings.iter().collect();
        positions.sort_by(|a, b| {
            let value = |h: &HoldingValuation| h.priced().map(|p| p.value);
            value(b).cmp(&value(a))
        });
        positions
    }

    /// True when every holding contributed to the total.
    pub fn is_complete(&self) -> bool {
        self.unpriced().next().is_none()
    }
}

struct ResolvedPrice {
    price: Decimal,
    currency: String,
    source: String,
    freshness: Freshness,
}

pub struct Aggregator<'a> {
    settings: &'a ValuationSettings,
    fx: &'a FxRateTable,
    navs: &'a NavBook,
}

impl<'a> Aggregator<'a> {
    pub fn new(settings: &'a ValuationSettings, fx: &'a FxRateTable, navs: &'a NavBook) -> Self {
        Aggregator { settings, fx, navs }
    }

    fn nav_for(&self, holding: &Holding, date: NaiveDate) -> Option<&'a NavRecord> {
        if !self.settings.nav_classes.contains(&holding.asset_class) {
            return None;
        }
        self.navs.latest_on_or_before(&holding.instrument, date)
    }

    fn request_for(holding: &Holding) -> QuoteRequest {
        QuoteRequest {
            instrument: holding.instrument.clone(),
            asset_class: holding.asset_class,
            currency: holding.currency.clone(),
        }
    }

    /// Market quotes needed for `holdings`; NAV-covered holdings are skipped.
    pub fn quote_requests(&self, holdings: &[Holding], date: NaiveDate) -> Vec<QuoteRequest> {
        holdings
            .iter()
            .filter(|h| self.nav_for(h, date).is_none())
            .map(Self::request_for)
            .collect()
    }

    fn resolve_price(
        &self,
        holding: &Holding,
        quotes: &QuoteResults,
        date: NaiveDate,
    ) -> Result<ResolvedPrice, UnpricedReason> {
        if let Some(nav) = self.nav_for(holding, date) {
            let freshness = if date - nav.date > self.settings.nav_max_age {
                Freshness::Stale
            } else {
                Freshness::Fresh
            };
            return Ok(ResolvedPrice {
                price: nav.nav,
                currency: nav.currency.clone(),
                source: NAV_SOURCE.to_string(),
                freshness,
            });
        }

        let nav_class = self.settings.nav_classes.contains(&holding.asset_class);
        match quotes.get(&Self::request_for(holding)) {
            Some(Ok(quote)) => {
                // Quotes are live; a backfilled date only gets them as a stale stand-in
                let after_date = quote.fetched_at.date_naive() > date
                    && holding.asset_class != AssetClass::Cash;
                Ok(ResolvedPrice {
                    price: quote.price,
                    currency: quote.currency.clone(),
                    source: quote.source.clone(),
                    freshness: if after_date {
                        Freshness::Stale
                    } else {
                        quote.freshness
                    },
                })
            }
            Some(Err(failure)) if nav_class && failure.attempts.is_empty() => {
                Err(UnpricedReason::NoNav {
                    instrument: holding.instrument.clone(),
                    date,
                })
            }
            Some(Err(failure)) => Err(UnpricedReason::Provider(failure.clone())),
            None if nav_class => Err(UnpricedReason::NoNav {
                instrument: holding.instrument.clone(),
                date,
            }),
            None => Err(UnpricedReason::Provider(ProviderFailure {
                instrument: holding.instrument.clone(),
                asset_class: holding.asset_class,
                attempts: vec![],
            })),
        }
    }

    fn price_holding(
        &self,
        holding: &Holding,
        quotes: &QuoteResults,
        date: NaiveDate,
    ) -> Result<PricedHolding, UnpricedReason> {
        let normalizer = FxNormalizer::new(self.fx);
        let resolved = self.resolve_price(holding, quotes, date)?;
        let conversion = normalizer
            .normalize(
                resolved.price,
                &resolved.currency,
                &self.settings.base_currency,
                date,
            )
            .map_err(UnpricedReason::Fx)?;
        let value = holding
            .quantity
            .checked_mul(conversion.amount)
            .ok_or_else(|| UnpricedReason::Overflow {
                instrument: holding.instrument.clone(),
            })?;

        Ok(PricedHolding {
            price: resolved.price,
            price_currency: resolved.currency,
            price_source: resolved.source,
            freshness: resolved.freshness,
            fx_rate: conversion.rate,
            fx_direction: conversion.direction,
            fx_date: conversion.rate_date,
            value,
            weight: Decimal::ZERO,
        })
    }

    /// Last resort: the acquisition cost, converted with the same rate rules.
    fn book_cost_value(&self, holding: &Holding, date: NaiveDate) -> Option<PricedHolding> {
        let cost = holding.book_cost.filter(|c| *c > Decimal::ZERO)?;
        let conversion = FxNormalizer::new(self.fx)
            .normalize(cost, &holding.currency, &self.settings.base_currency, date)
            .ok()?;
        let price = if holding.quantity.is_zero() {
            cost
        } else {
            cost.checked_div(holding.quantity)?
        };

        Some(PricedHolding {
            price,
            price_currency: holding.currency.clone(),
            price_source: BOOK_COST_SOURCE.to_string(),
            freshness: Freshness::Stale,
            fx_rate: conversion.rate,
            fx_direction: conversion.direction,
            fx_date: conversion.rate_date,
            value: conversion.amount,
            weight: Decimal::ZERO,
        })
    }

    pub fn value(
        &self,
        holdings: &[Holding],
        quotes: &QuoteResults,
        kind: SnapshotKind,
        date: NaiveDate,
        taken_at: DateTime<Utc>,
    ) -> Result<ValuationSnapshot, EngineError> {
        let mut valuations = Vec::with_capacity(holdings.len());

        for holding in holdings {
            let status = match self.price_holding(holding, quotes, date) {
                Ok(priced) => HoldingStatus::Priced(priced),
                Err(reason) => {
                    debug!("{} is unpriced: {}", holding.instrument, reason);
                    match self
                        .settings
                        .book_cost_fallback
                        .then(|| self.book_cost_value(holding, date))
                        .flatten()
                    {
                        Some(fallback) => HoldingStatus::Priced(fallback),
                        None => HoldingStatus::Unpriced(reason),
                    }
                }
            };

            valuations.push(HoldingValuation {
                account: holding.account.clone(),
                name: holding.name.clone(),
                instrument: holding.instrument.clone(),
                asset_class: holding.asset_class,
                quantity: holding.quantity,
                status,
            });
        }

        let mut by_sleeve: BTreeMap<AssetClass, (Decimal, usize, usize)> = BTreeMap::new();
        let mut total = Decimal::ZERO;
        for valuation in &mut valuations {
            let Some(priced) = valuation.priced() else {
                continue;
            };
            let (value, stale) = (priced.value, priced.freshness == Freshness::Stale);
            let entry = by_sleeve
                .entry(valuation.asset_class)
                .or_insert((Decimal::ZERO, 0, 0));
            match (total.checked_add(value), entry.0.checked_add(value)) {
                (Some(new_total), Some(sleeve_value)) => {
                    total = new_total;
                    entry.0 = sleeve_value;
                    entry.1 += 1;
                    if stale {
                        entry.2 += 1;
                    }
                }
                _ => {
                    warn!("Total overflows when adding {}", valuation.instrument);
                    valuation.status = HoldingStatus::Unpriced(UnpricedReason::Overflow {
                        instrument: valuation.instrument.clone(),
                    });
                }
            }
        }
        by_sleeve.retain(|_, (_, count, _)| *count > 0);

        let unpriced = valuations.iter().filter(|v| v.priced().is_none()).count();
        if by_sleeve.is_empty() || total <= Decimal::ZERO {
            return Err(EngineError::NoValuationPossible {
                holdings: valuations.len(),
                unpriced,
            });
        }

        let sleeves = by_sleeve
            .into_iter()
            .map(|(sleeve, (value, count, stale))| SleeveValuation {
                sleeve,
                value,
                weight: value / total,
                holdings: count,
                stale,
            })
            .collect();
        for valuation in &mut valuations {
            if let HoldingStatus::Priced(priced) = &mut valuation.status {
                priced.weight = priced.value / total;
            }
        }

        Ok(ValuationSnapshot {
            kind,
            date,
            taken_at,
            base_currency: self.settings.base_currency.clone(),
            total,
            sleeves,
            holdings: valuations,
        })
    }
}
