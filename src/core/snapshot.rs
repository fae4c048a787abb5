//! Refresh, end-of-day close and history over the stored ledger.
//!
//! A refresh replaces the current pointer and never touches history. An EOD
//! close writes at most one snapshot per date; repeating it is a no-op unless
//! forced. Closes of the same date are serialized, different dates proceed
//! independently.

use crate::core::chain::PriceChain;
use crate::core::currency::FxRateSource;
use crate::core::error::EngineError;
use crate::core::holding::{Holding, NavRecord};
use crate::core::policy::Policy;
use crate::core::rebalance::{self, RebalanceReport, SleeveDrift};
use crate::core::valuation::{Aggregator, SnapshotKind, ValuationSettings, ValuationSnapshot};
use crate::providers::util::{with_retry, with_timeout};
use crate::store::ledger::Ledger;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseOutcome {
    Created,
    /// A snapshot already existed and was returned as stored.
    Unchanged,
    Overwritten,
}

#[derive(Debug, Clone)]
pub struct ClosedSnapshot {
    pub outcome: CloseOutcome,
    pub snapshot: ValuationSnapshot,
}

/// The newest snapshot together with drift against the policy, if one is set.
#[derive(Debug, Clone, Serialize)]
pub struct LatestView {
    pub snapshot: ValuationSnapshot,
    pub drift: Option<Vec<SleeveDrift>>,
}

pub struct SnapshotEngine {
    chain: PriceChain,
    fx_source: Arc<dyn FxRateSource>,
    ledger: Ledger,
    settings: ValuationSettings,
    close_locks: Mutex<HashMap<NaiveDate, Arc<tokio::sync::Mutex<()>>>>,
}

impl SnapshotEngine {
    pub fn new(
        chain: PriceChain,
        fx_source: Arc<dyn FxRateSource>,
        ledger: Ledger,
        settings: ValuationSettings,
    ) -> Self {
        SnapshotEngine {
            chain,
            fx_source,
            ledger,
            settings,
            close_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn base_currency(&self) -> &str {
        &self.settings.base_currency
    }

    pub async fn replace_holdings(&self, batch: Vec<Holding>) -> Result<usize, EngineError> {
        Self::check_holdings(&batch)?;
        Ok(self.ledger.replace_holdings(batch).await?)
    }

    pub async fn append_holdings(&self, batch: Vec<Holding>) -> Result<usize, EngineError> {
        Self::check_holdings(&batch)?;
        Ok(self.ledger.append_holdings(batch).await?)
    }

    pub async fn upsert_nav(&self, batch: Vec<NavRecord>) -> Result<usize, EngineError> {
        for record in &batch {
            record
                .validate()
                .map_err(|e| EngineError::InvalidRecord(e.to_string()))?;
        }
        Ok(self.ledger.upsert_nav(batch).await?)
    }

    fn check_holdings(batch: &[Holding]) -> Result<(), EngineError> {
        for holding in batch {
            holding
                .validate()
                .map_err(|e| EngineError::InvalidRecord(e.to_string()))?;
        }
        Ok(())
    }

    async fn value(&self, kind: SnapshotKind, date: NaiveDate) -> Result<ValuationSnapshot, EngineError> {
        let holdings = self.ledger.holdings().await?;
        let navs = self.ledger.nav_book().await?;
        let fx = self.ledger.fx_table().await?;
        debug!(
            "Valuing {} holdings for {} with {} FX rates",
            holdings.len(),
            date,
            fx.len()
        );

        let aggregator = Aggregator::new(&self.settings, &fx, &navs);
        let quotes = self
            .chain
            .get_quotes(aggregator.quote_requests(&holdings, date))
            .await;
        let snapshot = aggregator.value(&holdings, &quotes, kind, date, Utc::now())?;

        let unpriced = snapshot.unpriced().count();
        if unpriced > 0 {
            warn!(
                "{} of {} holdings could not be priced for {}",
                unpriced,
                snapshot.holdings.len(),
                date
            );
        }
        Ok(snapshot)
    }

    /// Values the portfolio now and stores it as the current pointer.
    pub async fn refresh(&self) -> Result<ValuationSnapshot, EngineError> {
        let today = Utc::now().date_naive();
        let snapshot = self.value(SnapshotKind::Intraday, today).await?;
        self.ledger.set_current(&snapshot).await?;
        info!(
            "Refreshed valuation: {} {}",
            snapshot.total, snapshot.base_currency
        );
        Ok(snapshot)
    }

    fn close_lock(&self, date: NaiveDate) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .close_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(date).or_default())
    }

    /// Drops the lock for `date` once no other close holds or waits on it.
    fn release_close_lock(&self, date: NaiveDate, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .close_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&date);
        }
    }

    /// Records the EOD snapshot for `date`. Past dates are backfilled with
    /// the stored FX rates and NAV records on or before that date. Market
    /// quotes are live, so on a backfill they count as stale.
    pub async fn eod_close(&self, date: NaiveDate, force: bool) -> Result<ClosedSnapshot, EngineError> {
        if date > Utc::now().date_naive() {
            return Err(EngineError::FutureDate { date });
        }

        let lock = self.close_lock(date);
        let result = {
            let _guard = lock.lock().await;
            self.close_locked(date, force).await
        };
        self.release_close_lock(date, lock);
        result
    }

    async fn close_locked(&self, date: NaiveDate, force: bool) -> Result<ClosedSnapshot, EngineError> {
        let existing = self.ledger.eod_snapshot(date).await?;
        if let Some(snapshot) = &existing
            && !force
        {
            debug!("EOD snapshot for {} already exists", date);
            return Ok(ClosedSnapshot {
                outcome: CloseOutcome::Unchanged,
                snapshot: snapshot.clone(),
            });
        }

        let snapshot = self.value(SnapshotKind::Eod, date).await?;
        self.ledger.put_eod_snapshot(&snapshot).await?;

        let outcome = if existing.is_some() {
            CloseOutcome::Overwritten
        } else {
            CloseOutcome::Created
        };
        info!(
            "EOD close for {}: {:?}, total {} {}",
            date, outcome, snapshot.total, snapshot.base_currency
        );
        Ok(ClosedSnapshot { outcome, snapshot })
    }

    /// EOD snapshots within `[from, to]`, oldest first.
    pub async fn history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ValuationSnapshot>, EngineError> {
        if from > to {
            return Ok(vec![]);
        }
        Ok(self.ledger.eod_snapshots(from, to).await?)
    }

    /// The newer of the current pointer and the last EOD snapshot, by
    /// valuation date and then by when it was taken.
    pub async fn latest_snapshot(&self) -> Result<ValuationSnapshot, EngineError> {
        let current = self.ledger.current().await?;
        let eod = self.ledger.latest_eod_snapshot().await?;
        match (current, eod) {
            (Some(c), Some(e)) if (e.date, e.taken_at) > (c.date, c.taken_at) => Ok(e),
            (Some(c), _) => Ok(c),
            (None, Some(e)) => Ok(e),
            (None, None) => Err(EngineError::NoSnapshot),
        }
    }

    pub async fn latest(&self) -> Result<LatestView, EngineError> {
        let snapshot = self.latest_snapshot().await?;
        let drift = self
            .ledger
            .policy()
            .await?
            .map(|policy| rebalance::drift(&snapshot, &policy));
        Ok(LatestView { snapshot, drift })
    }

    pub async fn set_policy(&self, policy: &Policy) -> Result<(), EngineError> {
        self.ledger.set_policy(policy).await?;
        info!("Stored policy with {} sleeves", policy.targets().len());
        Ok(())
    }

    pub async fn policy(&self) -> Result<Policy, EngineError> {
        self.ledger.policy().await?.ok_or(EngineError::NoPolicy)
    }

    pub async fn rebalance_suggestions(&self) -> Result<RebalanceReport, EngineError> {
        let policy = self.policy().await?;
        let snapshot = self.latest_snapshot().await?;
        Ok(rebalance::suggest(&snapshot, &policy))
    }

    /// Pulls reference rates for the base currency and stores them by pair and
    /// rate date.
    pub async fn sync_fx(&self, date: Option<NaiveDate>) -> Result<usize, EngineError> {
        let source = &self.fx_source;
        let id = source.id();
        let base = self.settings.base_currency.as_str();
        let settings = self.chain.settings();
        let timeout = settings.timeout;

        let rates = with_retry(
            move || with_timeout(id, timeout, source.fetch_rates(base, date)),
            settings.retries,
            settings.retry_delay_ms,
        )
        .await
        .map_err(EngineError::FxSync)?;

        let stored = self.ledger.put_fx_rates(&rates).await?;
        info!("Synced {} FX rates for {} from {}", stored, base, id);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain::ChainSettings;
    use crate::core::currency::FxRate;
    use crate::core::error::ProviderError;
    use crate::core::holding::AssetClass;
    use crate::core::policy::SleeveTarget;
    use crate::core::price::{ProviderQuote, QuoteProvider, QuoteRequest};
    use crate::store::KeyValueStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedPrices {
        prices: HashMap<String, Decimal>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteProvider for FixedPrices {
        fn id(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.prices.get(&request.instrument) {
                Some(price) => Ok(ProviderQuote {
                    price: *price,
                    currency: request.currency.clone(),
                    as_of: None,
                }),
                None => Err(ProviderError::NotFound {
                    provider: "fixed".to_string(),
                    instrument: request.instrument.clone(),
                }),
            }
        }
    }

    struct FixedRates;

    #[async_trait]
    impl FxRateSource for FixedRates {
        fn id(&self) -> &'static str {
            "fixed-fx"
        }

        async fn fetch_rates(
            &self,
            base: &str,
            date: Option<NaiveDate>,
        ) -> Result<Vec<FxRate>, ProviderError> {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            Ok(vec![FxRate {
                base: base.to_string(),
                quote: "USD".to_string(),
                date,
                rate: dec!(1.25),
            }])
        }
    }

    fn engine(prices: &[(&str, Decimal)]) -> (SnapshotEngine, Arc<FixedPrices>) {
        let provider = Arc::new(FixedPrices {
            prices: prices
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            calls: AtomicUsize::new(0),
        });
        let chain = PriceChain::new(ChainSettings {
            timeout: Duration::from_secs(1),
            retries: 0,
            retry_delay_ms: 1,
            max_concurrency: 2,
            max_quote_age: chrono::Duration::days(4),
        })
        .with_route(AssetClass::Equity, vec![provider.clone()])
        .with_route(AssetClass::Cash, vec![provider.clone()]);
        let ledger = Ledger::new(&KeyValueStore::in_memory()).unwrap();
        let engine = SnapshotEngine::new(
            chain,
            Arc::new(FixedRates),
            ledger,
            ValuationSettings::default(),
        );
        (engine, provider)
    }

    fn holding(instrument: &str, asset_class: AssetClass, currency: &str, quantity: Decimal) -> Holding {
        Holding {
            account: "Main".to_string(),
            name: instrument.to_string(),
            instrument: instrument.to_string(),
            asset_class,
            currency: currency.to_string(),
            quantity,
            book_cost: None,
        }
    }

    fn days_ago(n: i64) -> NaiveDate {
        Utc::now().date_naive() - chrono::Duration::days(n)
    }

    async fn seeded() -> (SnapshotEngine, Arc<FixedPrices>) {
        let (engine, provider) = engine(&[("VWCE", dec!(100)), ("CASH:EUR", dec!(1))]);
        engine
            .replace_holdings(vec![
                holding("VWCE", AssetClass::Equity, "EUR", dec!(70)),
                holding("CASH:EUR", AssetClass::Cash, "EUR", dec!(3000)),
            ])
            .await
            .unwrap();
        (engine, provider)
    }

    #[tokio::test]
    async fn test_refresh_sets_current_without_history() {
        let (engine, _) = seeded().await;
        let snapshot = engine.refresh().await.unwrap();
        assert_eq!(snapshot.kind, SnapshotKind::Intraday);
        assert_eq!(snapshot.total, dec!(10000));

        let latest = engine.latest().await.unwrap();
        assert_eq!(latest.snapshot, snapshot);
        assert!(latest.drift.is_none());
        assert!(engine
            .history(days_ago(30), Utc::now().date_naive())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_eod_close_is_idempotent() {
        let (engine, provider) = seeded().await;
        let date = days_ago(1);

        let first = engine.eod_close(date, false).await.unwrap();
        assert_eq!(first.outcome, CloseOutcome::Created);
        let calls = provider.calls.load(Ordering::SeqCst);

        let second = engine.eod_close(date, false).await.unwrap();
        assert_eq!(second.outcome, CloseOutcome::Unchanged);
        assert_eq!(second.snapshot, first.snapshot);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);

        let history = engine.history(date, date).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], first.snapshot);
    }

    #[tokio::test]
    async fn test_forced_close_overwrites() {
        let (engine, _) = seeded().await;
        let date = days_ago(2);
        engine.eod_close(date, false).await.unwrap();

        engine
            .append_holdings(vec![holding("CASH:EUR", AssetClass::Cash, "EUR", dec!(5000))])
            .await
            .unwrap();
        let forced = engine.eod_close(date, true).await.unwrap();
        assert_eq!(forced.outcome, CloseOutcome::Overwritten);
        assert_eq!(forced.snapshot.total, dec!(12000));

        let history = engine.history(date, date).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total, dec!(12000));
    }

    #[tokio::test]
    async fn test_future_close_rejected() {
        let (engine, _) = seeded().await;
        let tomorrow = Utc::now().date_naive() + chrono::Duration::days(1);
        let err = engine.eod_close(tomorrow, false).await.unwrap_err();
        assert!(matches!(err, EngineError::FutureDate { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_closes_write_once() {
        let (engine, _) = seeded().await;
        let date = days_ago(3);

        let (a, b) = tokio::join!(engine.eod_close(date, false), engine.eod_close(date, false));
        let mut outcomes = vec![a.unwrap().outcome, b.unwrap().outcome];
        outcomes.sort_by_key(|o| *o == CloseOutcome::Unchanged);
        assert_eq!(outcomes, vec![CloseOutcome::Created, CloseOutcome::Unchanged]);
        assert_eq!(engine.history(date, date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_locks_are_released() {
        let (engine, _) = seeded().await;
        let date = days_ago(3);
        let (a, b) = tokio::join!(engine.eod_close(date, false), engine.eod_close(date, false));
        a.unwrap();
        b.unwrap();
        engine.eod_close(days_ago(4), false).await.unwrap();
        engine.eod_close(days_ago(4), true).await.unwrap();

        assert!(engine.close_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backfilled_close_does_not_shadow_refresh() {
        let (engine, _) = seeded().await;
        let today = Utc::now().date_naive();
        engine.refresh().await.unwrap();
        engine.eod_close(days_ago(30), false).await.unwrap();

        let latest = engine.latest_snapshot().await.unwrap();
        assert_eq!(latest.date, today);
        assert_eq!(latest.kind, SnapshotKind::Intraday);

        // A close for today supersedes the refresh
        let closed = engine.eod_close(today, false).await.unwrap();
        assert_eq!(engine.latest_snapshot().await.unwrap(), closed.snapshot);
    }

    #[tokio::test]
    async fn test_backfilled_close_marks_quotes_stale() {
        let (engine, _) = seeded().await;
        let backfill = engine.eod_close(days_ago(10), false).await.unwrap();
        let today = engine.eod_close(Utc::now().date_naive(), false).await.unwrap();

        assert_eq!(backfill.snapshot.total, dec!(10000));
        assert_eq!(backfill.snapshot.sleeve(AssetClass::Equity).unwrap().stale, 1);
        assert_eq!(backfill.snapshot.sleeve(AssetClass::Cash).unwrap().stale, 0);
        assert_eq!(today.snapshot.sleeve(AssetClass::Equity).unwrap().stale, 0);
    }

    #[tokio::test]
    async fn test_history_is_ascending_and_inclusive() {
        let (engine, _) = seeded().await;
        for n in [1, 5, 3, 4] {
            engine.eod_close(days_ago(n), false).await.unwrap();
        }

        let history = engine.history(days_ago(4), days_ago(1)).await.unwrap();
        let dates: Vec<_> = history.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![days_ago(4), days_ago(3), days_ago(1)]);
        assert!(engine
            .history(days_ago(1), days_ago(4))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_no_valuation_when_everything_unpriced() {
        let (engine, _) = engine(&[]);
        engine
            .replace_holdings(vec![holding("GONE", AssetClass::Equity, "EUR", dec!(1))])
            .await
            .unwrap();
        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, EngineError::NoValuationPossible { .. }));
        assert!(matches!(
            engine.latest().await.unwrap_err(),
            EngineError::NoSnapshot
        ));
    }

    #[tokio::test]
    async fn test_invalid_holdings_rejected() {
        let (engine, _) = seeded().await;
        let err = engine
            .replace_holdings(vec![holding("BAD", AssetClass::Equity, "EUR", dec!(-3))])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord(_)));
        assert_eq!(engine.ledger().holdings().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rebalance_from_latest_snapshot() {
        let (engine, _) = seeded().await;
        assert!(matches!(
            engine.rebalance_suggestions().await.unwrap_err(),
            EngineError::NoPolicy
        ));

        let policy = Policy::new(vec![
            SleeveTarget {
                sleeve: AssetClass::Equity,
                weight: dec!(0.6),
                band: dec!(0.05),
            },
            SleeveTarget {
                sleeve: AssetClass::Cash,
                weight: dec!(0.4),
                band: dec!(0.05),
            },
        ])
        .unwrap();
        engine.set_policy(&policy).await.unwrap();
        engine.refresh().await.unwrap();

        let report = engine.rebalance_suggestions().await.unwrap();
        assert_eq!(report.total, dec!(10000));
        assert_eq!(report.suggestions.len(), 2);
        assert_eq!(report.suggestions[0].trade_value, dec!(-1000));
        assert_eq!(report.suggestions[1].trade_value, dec!(1000));

        let drift = engine.latest().await.unwrap().drift.unwrap();
        assert_eq!(drift[0].drift, dec!(0.1));
    }

    #[tokio::test]
    async fn test_sync_fx_feeds_valuation() {
        let (engine, _) = engine(&[("AAPL", dec!(125))]);
        engine
            .replace_holdings(vec![holding("AAPL", AssetClass::Equity, "USD", dec!(8))])
            .await
            .unwrap();

        let stored = engine.sync_fx(Some(days_ago(1))).await.unwrap();
        assert_eq!(stored, 1);

        // EUR->USD 1.25 is inverted for USD->EUR
        let snapshot = engine.refresh().await.unwrap();
        assert_eq!(snapshot.total, dec!(800));
    }
}
