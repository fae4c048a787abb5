//! Target allocation policy.
//!
//! Bands are absolute weight fractions: a band of `0.05` on a `0.60` target
//! tolerates weights between `0.55` and `0.65`.

use crate::core::error::PolicyInvalid;
use crate::core::holding::AssetClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Allowed distance of the target weights' sum from 1.0.
pub const WEIGHT_SUM_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveTarget {
    pub sleeve: AssetClass,
    pub weight: Decimal,
    pub band: Decimal,
}

/// Ordered, validated sleeve targets. Only constructible through [`Policy::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    targets: Vec<SleeveTarget>,
}

impl Policy {
    pub fn new(targets: Vec<SleeveTarget>) -> Result<Self, PolicyInvalid> {
        if targets.is_empty() {
            return Err(PolicyInvalid::Empty);
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.sleeve) {
                return Err(PolicyInvalid::DuplicateSleeve(target.sleeve));
            }
            if target.weight < Decimal::ZERO || target.weight > Decimal::ONE {
                return Err(PolicyInvalid::WeightOutOfRange {
                    sleeve: target.sleeve,
                    weight: target.weight,
                });
            }
            if target.band < Decimal::ZERO || target.band > Decimal::ONE {
                return Err(PolicyInvalid::BandOutOfRange {
                    sleeve: target.sleeve,
                    band: target.band,
                });
            }
        }

        let sum: Decimal = targets.iter().map(|t| t.weight).sum();
        if (sum - Decimal::ONE).abs() > WEIGHT_SUM_EPSILON {
            return Err(PolicyInvalid::WeightsDoNotSumToOne { sum });
        }

        Ok(Policy { targets })
    }

    pub fn targets(&self) -> &[SleeveTarget] {
        &self.targets
    }

    pub fn target(&self, sleeve: AssetClass) -> Option<&SleeveTarget> {
        self.targets.iter().find(|t| t.sleeve == sleeve)
    }
}

/// Stored and uploaded policies go back through validation when loaded.
impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawPolicy {
            targets: Vec<SleeveTarget>,
        }

        let raw = RawPolicy::deserialize(deserializer)?;
        Policy::new(raw.targets).map_err(serde::de::Error::custom)
    }
}
