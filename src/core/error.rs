//! Typed failures raised by the valuation engine.

use crate::core::holding::AssetClass;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single attempt against one quote or rate provider.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderError {
    #[error("{provider}: timed out")]
    Timeout { provider: String },

    #[error("{provider}: rate limited")]
    RateLimited { provider: String },

    #[error("{provider}: HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("{provider}: malformed response: {message}")]
    Malformed { provider: String, message: String },

    #[error("{provider}: no quote for {instrument}")]
    NotFound {
        provider: String,
        instrument: String,
    },

    #[error("{provider}: request failed: {message}")]
    Network { provider: String, message: String },
}

impl ProviderError {
    /// Transient failures are retried on the same provider before falling back.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. }
            | ProviderError::RateLimited { .. }
            | ProviderError::Network { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::Malformed { .. } | ProviderError::NotFound { .. } => false,
        }
    }

    /// Maps a transport error from `reqwest` into the provider taxonomy.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
            }
        } else if let Some(status) = err.status() {
            ProviderError::from_status(provider, status.as_u16())
        } else if err.is_decode() {
            ProviderError::Malformed {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else {
            ProviderError::Network {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn from_status(provider: &str, status: u16) -> Self {
        if status == 429 {
            ProviderError::RateLimited {
                provider: provider.to_string(),
            }
        } else {
            ProviderError::Http {
                provider: provider.to_string(),
                status,
            }
        }
    }

    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Malformed {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// One provider tried for an instrument and the last error it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: ProviderError,
}

/// Every provider routed for an instrument failed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{}", describe_failure(.instrument, .asset_class, .attempts))]
pub struct ProviderFailure {
    pub instrument: String,
    pub asset_class: AssetClass,
    pub attempts: Vec<ProviderAttempt>,
}

impl ProviderFailure {
    pub fn attempted(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }
}

fn describe_failure(
    instrument: &str,
    asset_class: &AssetClass,
    attempts: &[ProviderAttempt],
) -> String {
    if attempts.is_empty() {
        return format!("no price provider configured for {instrument} ({asset_class})");
    }
    let errors = attempts
        .iter()
        .map(|a| a.error.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("all providers failed for {instrument}: {errors}")
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NormalizationError {
    #[error("no FX rate for {from}/{to} on or before {date}")]
    MissingRate {
        from: String,
        to: String,
        date: NaiveDate,
    },

    #[error("converting {from} to {to} overflows")]
    Overflow { from: String, to: String },
}

/// Rejected policy input. Nothing is stored when this is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyInvalid {
    #[error("policy has no targets")]
    Empty,

    #[error("target weights sum to {sum}, expected 1.0")]
    WeightsDoNotSumToOne { sum: Decimal },

    #[error("target weight {weight} for {sleeve} is outside [0, 1]")]
    WeightOutOfRange { sleeve: AssetClass, weight: Decimal },

    #[error("band {band} for {sleeve} is outside [0, 1]")]
    BandOutOfRange { sleeve: AssetClass, band: Decimal },

    #[error("{0} appears more than once in the policy")]
    DuplicateSleeve(AssetClass),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no valuation possible: {unpriced} of {holdings} holdings are unpriced")]
    NoValuationPossible { holdings: usize, unpriced: usize },

    #[error("cannot close {date}: date is in the future")]
    FutureDate { date: NaiveDate },

    #[error("no valuation snapshot available yet")]
    NoSnapshot,

    #[error("no rebalancing policy has been set")]
    NoPolicy,

    #[error("invalid policy: {0}")]
    PolicyInvalid(#[from] PolicyInvalid),

    #[error("rejected record: {0}")]
    InvalidRecord(String),

    #[error("FX sync failed: {0}")]
    FxSync(ProviderError),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
