//! Drift against policy targets and suggested trades. Pure functions over a
//! snapshot and a policy.

use crate::core::holding::AssetClass;
use crate::core::policy::Policy;
use crate::core::valuation::ValuationSnapshot;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "Buy"),
            TradeAction::Sell => write!(f, "Sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveDrift {
    pub sleeve: AssetClass,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    /// Current minus target.
    pub drift: Decimal,
    pub band: Decimal,
}

impl SleeveDrift {
    pub fn out_of_band(&self) -> bool {
        self.drift.abs() > self.band
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSuggestion {
    pub sleeve: AssetClass,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    pub drift: Decimal,
    pub band: Decimal,
    /// Signed amount in base currency; positive buys, negative sells.
    pub trade_value: Decimal,
}

impl RebalanceSuggestion {
    pub fn action(&self) -> TradeAction {
        if self.trade_value.is_sign_negative() {
            TradeAction::Sell
        } else {
            TradeAction::Buy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub date: NaiveDate,
    pub base_currency: String,
    pub total: Decimal,
    pub suggestions: Vec<RebalanceSuggestion>,
    /// Sleeves held but absent from the policy.
    pub unpolicied: Vec<AssetClass>,
}

/// Drift for every policy sleeve, in policy order. Sleeves without holdings
/// count as weight zero.
pub fn drift(snapshot: &ValuationSnapshot, policy: &Policy) -> Vec<SleeveDrift> {
    policy
        .targets()
        .iter()
        .map(|target| {
            let current_weight = snapshot.weight(target.sleeve);
            SleeveDrift {
                sleeve: target.sleeve,
                current_weight,
                target_weight: target.weight,
                drift: current_weight - target.weight,
                band: target.band,
            }
        })
        .collect()
}

pub fn unpolicied(snapshot: &ValuationSnapshot, policy: &Policy) -> Vec<AssetClass> {
    snapshot
        .sleeves
        .iter()
        .map(|s| s.sleeve)
        .filter(|sleeve| policy.target(*sleeve).is_none())
        .collect()
}

/// Trades that bring every out-of-band sleeve back to its target weight.
pub fn suggest(snapshot: &ValuationSnapshot, policy: &Policy) -> RebalanceReport {
    let suggestions = drift(snapshot, policy)
        .into_iter()
        .filter(SleeveDrift::out_of_band)
        .map(|d| RebalanceSuggestion {
            sleeve: d.sleeve,
            current_weight: d.current_weight,
            target_weight: d.target_weight,
            drift: d.drift,
            band: d.band,
            trade_value: -d.drift * snapshot.total,
        })
        .collect();

    RebalanceReport {
        date: snapshot.date,
        base_currency: snapshot.base_currency.clone(),
        total: snapshot.total,
        suggestions,
        unpolicied: unpolicied(snapshot, policy),
    }
}
