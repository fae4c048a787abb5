//! Typed records on top of the key-value collections.

use crate::core::currency::{FxRate, FxRateTable};
use crate::core::holding::{Holding, NavRecord};
use crate::core::policy::Policy;
use crate::core::store::{KeyValueCollection, Store};
use crate::core::valuation::{NavBook, ValuationSnapshot};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, info};

const CURRENT_KEY: &str = "current";
const POLICY_KEY: &str = "policy";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).with_context(|| format!("Corrupt record at {key}"))
}

fn holding_key(holding: &Holding) -> String {
    format!("{}/{}", holding.account, holding.instrument)
}

fn nav_key(record: &NavRecord) -> String {
    format!("{}/{}", record.instrument, record.date)
}

fn fx_key(rate: &FxRate) -> String {
    format!(
        "{}:{}:{}",
        rate.base.to_uppercase(),
        rate.quote.to_uppercase(),
        rate.date
    )
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct Ledger {
    holdings: Arc<dyn KeyValueCollection>,
    navs: Arc<dyn KeyValueCollection>,
    fx_rates: Arc<dyn KeyValueCollection>,
    snapshots: Arc<dyn KeyValueCollection>,
    state: Arc<dyn KeyValueCollection>,
}

impl Ledger {
    pub fn new(store: &dyn Store) -> Result<Self> {
        Ok(Ledger {
            holdings: store.get_collection("holdings")?,
            navs: store.get_collection("nav_records")?,
            fx_rates: store.get_collection("fx_rates")?,
            snapshots: store.get_collection("eod_snapshots")?,
            state: store.get_collection("state")?,
        })
    }

    fn values<T: DeserializeOwned>(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<T>> {
        entries
            .iter()
            .map(|(key, bytes)| decode(key, bytes))
            .collect()
    }

    /// Replaces every stored holding with `batch` in one write. Nothing
    /// changes when any record is invalid.
    pub async fn replace_holdings(&self, batch: Vec<Holding>) -> Result<usize> {
        for holding in &batch {
            holding.validate()?;
        }
        let entries = batch
            .iter()
            .map(|holding| Ok((holding_key(holding), encode(holding)?)))
            .collect::<Result<Vec<_>>>()?;
        self.holdings.replace_all(entries).await?;
        info!("Replaced holdings with {} records", batch.len());
        Ok(batch.len())
    }

    /// Upserts `batch` by (account, instrument).
    pub async fn append_holdings(&self, batch: Vec<Holding>) -> Result<usize> {
        for holding in &batch {
            holding.validate()?;
        }
        let count = self.write_holdings(batch).await?;
        info!("Upserted {} holdings", count);
        Ok(count)
    }

    async fn write_holdings(&self, batch: Vec<Holding>) -> Result<usize> {
        let count = batch.len();
        for holding in batch {
            self.holdings
                .put(&holding_key(&holding), encode(&holding)?)
                .await?;
        }
        Ok(count)
    }

    pub async fn holdings(&self) -> Result<Vec<Holding>> {
        Self::values(self.holdings.scan_prefix("").await?)
    }

    /// Upserts NAV records by (instrument, date).
    pub async fn upsert_nav(&self, batch: Vec<NavRecord>) -> Result<usize> {
        for record in &batch {
            record.validate()?;
        }
        let count = batch.len();
        for record in batch {
            self.navs.put(&nav_key(&record), encode(&record)?).await?;
        }
        info!("Upserted {} NAV records", count);
        Ok(count)
    }

    pub async fn nav_book(&self) -> Result<NavBook> {
        let records: Vec<NavRecord> = Self::values(self.navs.scan_prefix("").await?)?;
        Ok(records.into_iter().collect())
    }

    pub async fn put_fx_rates(&self, rates: &[FxRate]) -> Result<usize> {
        for rate in rates {
            self.fx_rates.put(&fx_key(rate), encode(rate)?).await?;
        }
        debug!("Stored {} FX rates", rates.len());
        Ok(rates.len())
    }

    pub async fn fx_rates(&self) -> Result<Vec<FxRate>> {
        Self::values(self.fx_rates.scan_prefix("").await?)
    }

    pub async fn fx_table(&self) -> Result<FxRateTable> {
        Ok(self.fx_rates().await?.into_iter().collect())
    }

    pub async fn eod_snapshot(&self, date: NaiveDate) -> Result<Option<ValuationSnapshot>> {
        let key = date_key(date);
        self.snapshots
            .get(&key)
            .await?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }

    pub async fn put_eod_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<()> {
        self.snapshots
            .put(&date_key(snapshot.date), encode(snapshot)?)
            .await
    }

    /// EOD snapshots dated within `[from, to]`, oldest first.
    pub async fn eod_snapshots(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ValuationSnapshot>> {
        Self::values(self.snapshots.range(&date_key(from), &date_key(to)).await?)
    }

    pub async fn latest_eod_snapshot(&self) -> Result<Option<ValuationSnapshot>> {
        let entries = self.snapshots.scan_prefix("").await?;
        entries
            .last()
            .map(|(key, bytes)| decode(key, bytes))
            .transpose()
    }

    pub async fn current(&self) -> Result<Option<ValuationSnapshot>> {
        self.state
            .get(CURRENT_KEY)
            .await?
            .map(|bytes| decode(CURRENT_KEY, &bytes))
            .transpose()
    }

    pub async fn set_current(&self, snapshot: &ValuationSnapshot) -> Result<()> {
        self.state.put(CURRENT_KEY, encode(snapshot)?).await
    }

    pub async fn policy(&self) -> Result<Option<Policy>> {
        self.state
            .get(POLICY_KEY)
            .await?
            .map(|bytes| decode(POLICY_KEY, &bytes))
            .transpose()
    }

    pub async fn set_policy(&self, policy: &Policy) -> Result<()> {
        self.state.put(POLICY_KEY, encode(policy)?).await
    }
}
