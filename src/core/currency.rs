//! Currency rates and normalization into the base currency

use crate::core::error::{NormalizationError, ProviderError};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One unit of `base` buys `rate` units of `quote` on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub base: String,
    pub quote: String,
    pub date: NaiveDate,
    pub rate: Decimal,
}

/// Daily reference rates, synced once a day rather than per valuation.
#[async_trait]
pub trait FxRateSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Rates against `base` published for `date`, or the latest when `None`.
    async fn fetch_rates(
        &self,
        base: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<FxRate>, ProviderError>;
}

/// How an amount was converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateDirection {
    Identity,
    Direct,
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: Decimal,
    /// Multiplier applied to the source amount.
    pub rate: Decimal,
    pub rate_date: Option<NaiveDate>,
    pub direction: RateDirection,
}

/// The FX rate graph: (base, quote) -> rates by date.
#[derive(Debug, Clone, Default)]
pub struct FxRateTable {
    pairs: HashMap<(String, String), BTreeMap<NaiveDate, Decimal>>,
}

impl FxRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-positive rates are ignored.
    pub fn insert(&mut self, rate: FxRate) {
        if rate.rate <= Decimal::ZERO {
            return;
        }
        self.pairs
            .entry((rate.base.to_uppercase(), rate.quote.to_uppercase()))
            .or_default()
            .insert(rate.date, rate.rate);
    }

    pub fn len(&self) -> usize {
        self.pairs.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latest rate for the pair dated on or before `on_date`.
    pub fn rate_on_or_before(
        &self,
        base: &str,
        quote: &str,
        on_date: NaiveDate,
    ) -> Option<(NaiveDate, Decimal)> {
        self.pairs
            .get(&(base.to_uppercase(), quote.to_uppercase()))
            .and_then(|rates| rates.range(..=on_date).next_back())
            .map(|(date, rate)| (*date, *rate))
    }
}

impl FromIterator<FxRate> for FxRateTable {
    fn from_iter<I: IntoIterator<Item = FxRate>>(iter: I) -> Self {
        let mut table = FxRateTable::new();
        for rate in iter {
            table.insert(rate);
        }
        table
    }
}

/// Converts amounts between currencies using a direct or an inverted rate.
/// Never triangulates through a third currency and never looks ahead of the
/// requested date.
pub struct FxNormalizer<'a> {
    table: &'a FxRateTable,
}

impl<'a> FxNormalizer<'a> {
    pub fn new(table: &'a FxRateTable) -> Self {
        FxNormalizer { table }
    }

    pub fn normalize(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        on_date: NaiveDate,
    ) -> Result<Conversion, NormalizationError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(Conversion {
                amount,
                rate: Decimal::ONE,
                rate_date: None,
                direction: RateDirection::Identity,
            });
        }

        let direct = self.table.rate_on_or_before(from, to, on_date);
        let inverse = self.table.rate_on_or_before(to, from, on_date);

        // The most recent rate wins, direct on ties
        let chosen = match (direct, inverse) {
            (Some(d), Some(i)) if i.0 > d.0 => Some((i, RateDirection::Inverse)),
            (Some(d), _) => Some((d, RateDirection::Direct)),
            (None, Some(i)) => Some((i, RateDirection::Inverse)),
            (None, None) => None,
        };

        let ((date, rate), direction) = chosen.ok_or_else(|| NormalizationError::MissingRate {
            from: from.to_uppercase(),
            to: to.to_uppercase(),
            date: on_date,
        })?;
        let rate = match direction {
            RateDirection::Inverse => Decimal::ONE / rate,
            _ => rate,
        };
        let amount = amount
            .checked_mul(rate)
            .ok_or_else(|| NormalizationError::Overflow {
                from: from.to_uppercase(),
                to: to.to_uppercase(),
            })?;
        Ok(Conversion {
            amount,
            rate,
            rate_date: Some(date),
            direction,
        })
    }
}
