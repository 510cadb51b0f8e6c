//! Per-indicator update engine: decides between bootstrap, incremental
//! append, and no-op, then merges, trims, and persists the rolling series.

use chrono::{Datelike, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::analyzers::aggregate::OverallAggregator;
use crate::error::{AnalysisResult, Error};
use crate::store::{DocumentStore, IndicatorFilter};
use crate::types::{
    DateBucket, DateRange, Indicator, IndicatorUpdate, UpdateMode, WeightConfig,
};

/// Rolling window sizes for the two series.
pub const MAX_DAILY_ENTRIES: usize = 30;
pub const MAX_MONTHLY_ENTRIES: usize = 6;

/// Counts of entries written by one update; all zero for a no-op.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub new_daily_entries: usize,
    pub new_monthly_entries: usize,
}

impl UpdateOutcome {
    pub fn is_noop(&self) -> bool {
        self.new_daily_entries == 0 && self.new_monthly_entries == 0
    }
}

enum SeriesField {
    Daily,
    Monthly,
}

/// Drives updates for one indicator at a time.
///
/// Updates are serialized per indicator: the batch path and the on-demand
/// recompute path can target the same indicator concurrently, and the
/// persistence step is a read-modify-write, so each update holds that
/// indicator's lock for the whole read+compute+write span.
pub struct IndicatorUpdateEngine {
    store: Arc<dyn DocumentStore>,
    aggregator: OverallAggregator,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndicatorUpdateEngine {
    pub fn new(store: Arc<dyn DocumentStore>, aggregator: OverallAggregator) -> Self {
        Self {
            store,
            aggregator,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one update for the named indicator.
    ///
    /// The indicator document is re-read under the lock so a concurrent
    /// writer's result is always observed before extending it.
    ///
    /// # Errors
    ///
    /// Fails if the indicator or its aggregate does not exist, if the post
    /// collection contains a malformed post, or if persistence fails.
    pub async fn process_update(
        &self,
        name: &str,
        mode: UpdateMode,
    ) -> AnalysisResult<UpdateOutcome> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let indicator = self.load_indicator(name).await?;
        let aggregate = self
            .store
            .load_aggregate(&indicator.aggregate_name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "aggregate",
                name: indicator.aggregate_name.clone(),
            })?;
        let (weights, model_keys) = aggregate.weight_config()?;

        match mode {
            UpdateMode::All => self.recompute_all(&indicator, &model_keys, &weights).await,
            UpdateMode::Daily => {
                let new_results = self
                    .compute_daily_results(&indicator, &model_keys, &weights)
                    .await?;
                self.merge_and_save(&indicator, SeriesField::Daily, new_results)
                    .await
            }
            UpdateMode::Monthly => {
                let new_results = self
                    .compute_monthly_results(&indicator, &model_keys, &weights)
                    .await?;
                self.merge_and_save(&indicator, SeriesField::Monthly, new_results)
                    .await
            }
        }
    }

    /// Rebuilds both series from scratch and replaces them in a single
    /// write, so an interrupted recompute never leaves a cleared series
    /// behind.
    async fn recompute_all(
        &self,
        indicator: &Indicator,
        model_keys: &[String],
        weights: &WeightConfig,
    ) -> AnalysisResult<UpdateOutcome> {
        let daily = self
            .aggregator
            .aggregate_by_window(model_keys, weights, &indicator.filters, DateRange::OneMonth)
            .await?;
        let monthly = self
            .aggregator
            .aggregate_by_window(model_keys, weights, &indicator.filters, DateRange::SixMonths)
            .await?;

        let daily = trim_results(daily, MAX_DAILY_ENTRIES);
        let monthly = trim_results(monthly, MAX_MONTHLY_ENTRIES);
        let outcome = UpdateOutcome {
            new_daily_entries: daily.len(),
            new_monthly_entries: monthly.len(),
        };

        self.store
            .upsert_indicator(&IndicatorUpdate {
                name: indicator.name.clone(),
                results_by_day: Some(daily),
                results_by_month: Some(monthly),
            })
            .await?;
        Ok(outcome)
    }

    /// Bootstrap the past month when the daily series is empty; append one
    /// entry for today when the latest stored day is stale; otherwise
    /// nothing.
    async fn compute_daily_results(
        &self,
        indicator: &Indicator,
        model_keys: &[String],
        weights: &WeightConfig,
    ) -> AnalysisResult<Vec<DateBucket>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        if indicator.results_by_day.is_empty() {
            return self
                .aggregator
                .aggregate_by_window(model_keys, weights, &indicator.filters, DateRange::OneMonth)
                .await;
        }

        if latest_date(&indicator.results_by_day) != Some(today.as_str()) {
            let buckets = self
                .aggregator
                .aggregate_by_window(model_keys, weights, &indicator.filters, DateRange::OneDay)
                .await?;
            let average_score = buckets.first().map(|b| b.average_score).unwrap_or(0.0);
            return Ok(vec![DateBucket {
                date: today,
                average_score,
            }]);
        }

        Ok(Vec::new())
    }

    /// Bootstrap six months when the monthly series is empty; append one
    /// entry for the current month when it is stale and today is not the
    /// 1st (the scheduler closes out the previous month on the 1st).
    async fn compute_monthly_results(
        &self,
        indicator: &Indicator,
        model_keys: &[String],
        weights: &WeightConfig,
    ) -> AnalysisResult<Vec<DateBucket>> {
        let now = Utc::now();
        let current_month = now.format("%Y-%m").to_string();

        if indicator.results_by_month.is_empty() {
            return self
                .aggregator
                .aggregate_by_window(model_keys, weights, &indicator.filters, DateRange::SixMonths)
                .await;
        }

        if now.day() != 1 && latest_date(&indicator.results_by_month) != Some(current_month.as_str())
        {
            let buckets = self
                .aggregator
                .aggregate_by_window(model_keys, weights, &indicator.filters, DateRange::OneMonth)
                .await?;
            let average_score = buckets.last().map(|b| b.average_score).unwrap_or(0.0);
            return Ok(vec![DateBucket {
                date: current_month,
                average_score,
            }]);
        }

        Ok(Vec::new())
    }

    async fn merge_and_save(
        &self,
        indicator: &Indicator,
        field: SeriesField,
        new_results: Vec<DateBucket>,
    ) -> AnalysisResult<UpdateOutcome> {
        if new_results.is_empty() {
            debug!(indicator = %indicator.name, "Series already current, nothing to write");
            return Ok(UpdateOutcome::default());
        }
        let new_entries = new_results.len();

        let (existing, max_entries) = match field {
            SeriesField::Daily => (&indicator.results_by_day, MAX_DAILY_ENTRIES),
            SeriesField::Monthly => (&indicator.results_by_month, MAX_MONTHLY_ENTRIES),
        };
        let mut merged = existing.clone();
        merged.extend(new_results);
        let merged = trim_results(merged, max_entries);

        let update = match field {
            SeriesField::Daily => IndicatorUpdate {
                name: indicator.name.clone(),
                results_by_day: Some(merged),
                results_by_month: None,
            },
            SeriesField::Monthly => IndicatorUpdate {
                name: indicator.name.clone(),
                results_by_day: None,
                results_by_month: Some(merged),
            },
        };
        self.store.upsert_indicator(&update).await?;

        Ok(match field {
            SeriesField::Daily => UpdateOutcome {
                new_daily_entries: new_entries,
                new_monthly_entries: 0,
            },
            SeriesField::Monthly => UpdateOutcome {
                new_daily_entries: 0,
                new_monthly_entries: new_entries,
            },
        })
    }

    async fn load_indicator(&self, name: &str) -> AnalysisResult<Indicator> {
        let filter = IndicatorFilter::Names(vec![name.to_string()]);
        let mut indicators = self.store.load_indicators(Some(&filter)).await?;
        indicators.pop().ok_or_else(|| Error::NotFound {
            kind: "indicator",
            name: name.to_string(),
        })
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("indicator lock registry poisoned");
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Sorts buckets ascending by date and keeps the `max_entries` most recent.
/// Re-sorting on every merge also repairs duplicate or out-of-order entries
/// left by an earlier partial failure.
pub fn trim_results(mut results: Vec<DateBucket>, max_entries: usize) -> Vec<DateBucket> {
    results.sort_by(|a, b| a.date.cmp(&b.date));
    let excess = results.len().saturating_sub(max_entries);
    results.split_off(excess)
}

fn latest_date(entries: &[DateBucket]) -> Option<&str> {
    entries.iter().map(|b| b.date.as_str()).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::normalize::PostNormalizer;
    use crate::store::MemoryStore;
    use crate::types::{Aggregate, ModelWeights, Post};
    use chrono::Duration;
    use serde_json::json;

    fn bucket(date: &str, score: f64) -> DateBucket {
        DateBucket {
            date: date.to_string(),
            average_score: score,
        }
    }

    fn vader_aggregate(name: &str) -> Aggregate {
        Aggregate {
            name: name.to_string(),
            description: String::new(),
            weights: vec![ModelWeights {
                model_name: "vader".to_string(),
                model_weight: 1.0,
                title_sentiment: 1.0,
                selftext_sentiment: 0.0,
                comments_sentiment: 0.0,
            }],
        }
    }

    fn indicator(name: &str, aggregate_name: &str) -> Indicator {
        Indicator {
            name: name.to_string(),
            filters: vec![],
            aggregate_name: aggregate_name.to_string(),
            results_by_day: vec![],
            results_by_month: vec![],
        }
    }

    fn scored_post(id: &str, days_ago: i64, title_score: f64) -> Post {
        Post {
            id: id.to_string(),
            created_at: Utc::now() - Duration::days(days_ago),
            keywords: vec![],
            model_output: serde_json::from_value(json!({
                "vader": { "title_sentiment": title_score }
            }))
            .unwrap(),
        }
    }

    fn engine_with(store: Arc<MemoryStore>) -> IndicatorUpdateEngine {
        let aggregator = OverallAggregator::new(
            store.clone(),
            PostNormalizer::with_defaults().unwrap(),
        );
        IndicatorUpdateEngine::new(store, aggregator)
    }

    #[test]
    fn test_trim_keeps_latest_entries_sorted() {
        let start = chrono::NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        // 35 consecutive days, deliberately newest-first.
        let entries: Vec<DateBucket> = (0..35)
            .rev()
            .map(|offset| {
                bucket(
                    &(start + Duration::days(offset)).format("%Y-%m-%d").to_string(),
                    offset as f64,
                )
            })
            .collect();

        let trimmed = trim_results(entries, 30);

        assert_eq!(trimmed.len(), 30);
        assert_eq!(trimmed.first().unwrap().date, "2026-07-06");
        assert_eq!(trimmed.last().unwrap().date, "2026-08-04");
        for pair in trimmed.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn test_trim_noop_below_limit() {
        let entries = vec![bucket("2026-08-01", 1.0), bucket("2026-08-02", 2.0)];
        assert_eq!(trim_results(entries.clone(), 30), entries);
    }

    #[tokio::test]
    async fn test_daily_bootstrap_fills_window() {
        let store = Arc::new(MemoryStore::new());
        store.insert_aggregate(vader_aggregate("crypto")).await;
        store.insert_indicator(indicator("btc-mood", "crypto")).await;
        store.insert_post(scored_post("a", 2, 0.4)).await;
        let engine = engine_with(store.clone());

        let outcome = engine
            .process_update("btc-mood", UpdateMode::Daily)
            .await
            .unwrap();

        assert_eq!(outcome.new_daily_entries, 31);
        let stored = store.get_indicator("btc-mood").await.unwrap();
        // 31 computed buckets trim down to the 30-entry window.
        assert_eq!(stored.results_by_day.len(), MAX_DAILY_ENTRIES);
        let total: f64 = stored.results_by_day.iter().map(|b| b.average_score).sum();
        assert_eq!(total, 70.0);
    }

    #[tokio::test]
    async fn test_daily_second_run_same_day_is_noop() {
        let store = Arc::new(MemoryStore::new());
        store.insert_aggregate(vader_aggregate("crypto")).await;
        store.insert_indicator(indicator("btc-mood", "crypto")).await;
        let engine = engine_with(store.clone());

        engine
            .process_update("btc-mood", UpdateMode::Daily)
            .await
            .unwrap();
        let before = store.get_indicator("btc-mood").await.unwrap();

        let outcome = engine
            .process_update("btc-mood", UpdateMode::Daily)
            .await
            .unwrap();

        assert!(outcome.is_noop());
        let after = store.get_indicator("btc-mood").await.unwrap();
        assert_eq!(before.results_by_day, after.results_by_day);
    }

    #[tokio::test]
    async fn test_daily_append_when_latest_is_stale() {
        let store = Arc::new(MemoryStore::new());
        store.insert_aggregate(vader_aggregate("crypto")).await;
        let yesterday = (Utc::now() - Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let mut stale = indicator("btc-mood", "crypto");
        stale.results_by_day = vec![bucket(&yesterday, 42.0)];
        store.insert_indicator(stale).await;
        let engine = engine_with(store.clone());

        let outcome = engine
            .process_update("btc-mood", UpdateMode::Daily)
            .await
            .unwrap();

        assert_eq!(outcome.new_daily_entries, 1);
        let stored = store.get_indicator("btc-mood").await.unwrap();
        assert_eq!(stored.results_by_day.len(), 2);
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(stored.results_by_day.last().unwrap().date, today);
    }

    #[tokio::test]
    async fn test_monthly_bootstrap_trims_to_window() {
        let store = Arc::new(MemoryStore::new());
        store.insert_aggregate(vader_aggregate("crypto")).await;
        store.insert_indicator(indicator("btc-mood", "crypto")).await;
        let engine = engine_with(store.clone());

        let outcome = engine
            .process_update("btc-mood", UpdateMode::Monthly)
            .await
            .unwrap();

        assert!(outcome.new_monthly_entries >= 6);
        let stored = store.get_indicator("btc-mood").await.unwrap();
        assert!(stored.results_by_month.len() <= MAX_MONTHLY_ENTRIES);
    }

    #[tokio::test]
    async fn test_monthly_append_when_month_is_stale() {
        // The engine defers monthly appends on the 1st; nothing to assert
        // that day.
        if Utc::now().day() == 1 {
            return;
        }

        let store = Arc::new(MemoryStore::new());
        store.insert_aggregate(vader_aggregate("crypto")).await;
        let mut stale = indicator("btc-mood", "crypto");
        stale.results_by_month = vec![bucket("2026-01", 42.0)];
        store.insert_indicator(stale).await;
        let engine = engine_with(store.clone());

        let outcome = engine
            .process_update("btc-mood", UpdateMode::Monthly)
            .await
            .unwrap();

        assert_eq!(outcome.new_monthly_entries, 1);
        let stored = store.get_indicator("btc-mood").await.unwrap();
        let current_month = Utc::now().format("%Y-%m").to_string();
        assert_eq!(stored.results_by_month.last().unwrap().date, current_month);
    }

    #[tokio::test]
    async fn test_full_recompute_replaces_poisoned_series() {
        let store = Arc::new(MemoryStore::new());
        store.insert_aggregate(vader_aggregate("crypto")).await;
        let mut poisoned = indicator("btc-mood", "crypto");
        // Duplicated, out-of-order garbage from a prior partial failure.
        poisoned.results_by_day = vec![
            bucket("2025-12-31", 99.0),
            bucket("2025-12-31", 99.0),
            bucket("2025-01-01", 1.0),
        ];
        poisoned.results_by_month = vec![bucket("2020-01", 7.0)];
        store.insert_indicator(poisoned).await;
        store.insert_post(scored_post("a", 2, 0.4)).await;
        let engine = engine_with(store.clone());

        engine
            .process_update("btc-mood", UpdateMode::All)
            .await
            .unwrap();

        let stored = store.get_indicator("btc-mood").await.unwrap();
        assert_eq!(stored.results_by_day.len(), MAX_DAILY_ENTRIES);
        assert!(stored.results_by_day.iter().all(|b| b.date.as_str() > "2025-12-31"));
        assert!(stored.results_by_month.len() <= MAX_MONTHLY_ENTRIES);
        assert!(stored.results_by_month.iter().all(|b| b.date != "2020-01"));
    }

    #[tokio::test]
    async fn test_missing_aggregate_fails_that_indicator() {
        let store = Arc::new(MemoryStore::new());
        store.insert_indicator(indicator("btc-mood", "ghost")).await;
        let engine = engine_with(store.clone());

        let result = engine.process_update("btc-mood", UpdateMode::Daily).await;
        assert!(matches!(result, Err(Error::NotFound { kind: "aggregate", .. })));
    }

    #[tokio::test]
    async fn test_unknown_indicator_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone());

        let result = engine.process_update("ghost", UpdateMode::Daily).await;
        assert!(matches!(result, Err(Error::NotFound { kind: "indicator", .. })));
    }
}
