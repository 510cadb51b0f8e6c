//! Data types exchanged with the document store and between pipeline stages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AnalysisResult, Error};

/// Component name -> scalar or list-of-scalars score.
///
/// Values stay as raw JSON because the store is schemaless; the normalizer is
/// the validation boundary for them.
pub type ComponentScores = BTreeMap<String, Value>;

/// Model name -> that model's component scores.
pub type ModelOutput = BTreeMap<String, ComponentScores>;

/// A scored social-media post as stored by the transformation pipeline.
///
/// Read-only to the analysis core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Precomputed keyword list, lower-cased by the ingestion pipeline.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<ModelOutput>,
}

/// One point of a rolling time series: `YYYY-MM-DD` or `YYYY-MM` label plus
/// the average sentiment score for that period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucket {
    pub date: String,
    pub average_score: f64,
}

/// A named, filtered view over the post stream with its rolling series.
///
/// Created externally; mutated only through the update engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    /// Filter keywords; a post must carry all of them (case-insensitive).
    #[serde(default)]
    pub filters: Vec<String>,
    pub aggregate_name: String,
    #[serde(default)]
    pub results_by_day: Vec<DateBucket>,
    #[serde(default)]
    pub results_by_month: Vec<DateBucket>,
}

/// Partial indicator document for merge-by-name upserts. Only the series
/// fields that are `Some` are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_by_day: Option<Vec<DateBucket>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_by_month: Option<Vec<DateBucket>>,
}

/// Per-model weight row as stored inside an aggregate document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub model_name: String,
    pub model_weight: f64,
    pub title_sentiment: f64,
    pub selftext_sentiment: f64,
    pub comments_sentiment: f64,
}

/// A reusable weight configuration shared by indicators. Read-only to the
/// analysis core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub weights: Vec<ModelWeights>,
}

impl Aggregate {
    /// Converts the stored weight rows into a [`WeightConfig`] plus the
    /// ordered list of model keys to evaluate.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if any weight is negative.
    pub fn weight_config(&self) -> AnalysisResult<(WeightConfig, Vec<String>)> {
        let mut config = WeightConfig::default();
        let mut model_keys = Vec::with_capacity(self.weights.len());

        for row in &self.weights {
            let weights = [
                row.model_weight,
                row.title_sentiment,
                row.selftext_sentiment,
                row.comments_sentiment,
            ];
            if weights.iter().any(|w| *w < 0.0) {
                return Err(Error::BadWeightConfig {
                    aggregate: self.name.clone(),
                    reason: format!("negative weight for model '{}'", row.model_name),
                });
            }

            let mut components = BTreeMap::new();
            components.insert("title_sentiment".to_string(), row.title_sentiment);
            components.insert("selftext_sentiment".to_string(), row.selftext_sentiment);
            components.insert("comments_sentiment".to_string(), row.comments_sentiment);

            config
                .component_weights
                .insert(row.model_name.clone(), components);
            config
                .model_weights
                .insert(row.model_name.clone(), row.model_weight);
            model_keys.push(row.model_name.clone());
        }

        Ok((config, model_keys))
    }
}

/// Weights used when combining a normalized post into one score: overall
/// influence per model, plus per-model component weights.
#[derive(Debug, Clone, Default)]
pub struct WeightConfig {
    pub model_weights: BTreeMap<String, f64>,
    pub component_weights: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Lookback window for bucketed aggregation, as days back from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    OneDay,
    OneMonth,
    SixMonths,
}

impl DateRange {
    pub fn days_back(self) -> i64 {
        match self {
            DateRange::OneDay => 0,
            DateRange::OneMonth => 30,
            DateRange::SixMonths => 180,
        }
    }

    /// Windows up to one month bucket by day; anything longer by month.
    pub fn granularity(self) -> Granularity {
        match self {
            DateRange::OneDay | DateRange::OneMonth => Granularity::Daily,
            DateRange::SixMonths => Granularity::Monthly,
        }
    }
}

/// Bucket label granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    pub fn label(self, ts: DateTime<Utc>) -> String {
        match self {
            Granularity::Daily => ts.format("%Y-%m-%d").to_string(),
            Granularity::Monthly => ts.format("%Y-%m").to_string(),
        }
    }

    /// Label-generation step. A month advances by a fixed 30 days, not by
    /// calendar months; persisted `YYYY-MM` labels depend on this stride.
    pub fn stride(self) -> Duration {
        match self {
            Granularity::Daily => Duration::days(1),
            Granularity::Monthly => Duration::days(30),
        }
    }
}

/// Which series an update request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Daily,
    Monthly,
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate_with(rows: Vec<ModelWeights>) -> Aggregate {
        Aggregate {
            name: "crypto".to_string(),
            description: String::new(),
            weights: rows,
        }
    }

    #[test]
    fn test_weight_config_from_rows() {
        let aggregate = aggregate_with(vec![
            ModelWeights {
                model_name: "vader".to_string(),
                model_weight: 0.4,
                title_sentiment: 0.3,
                selftext_sentiment: 0.2,
                comments_sentiment: 0.5,
            },
            ModelWeights {
                model_name: "textblob".to_string(),
                model_weight: 0.6,
                title_sentiment: 0.4,
                selftext_sentiment: 0.4,
                comments_sentiment: 0.2,
            },
        ]);

        let (config, model_keys) = aggregate.weight_config().unwrap();

        assert_eq!(model_keys, vec!["vader", "textblob"]);
        assert_eq!(config.model_weights["vader"], 0.4);
        assert_eq!(config.model_weights["textblob"], 0.6);
        assert_eq!(config.component_weights["vader"]["comments_sentiment"], 0.5);
        assert_eq!(config.component_weights["textblob"]["title_sentiment"], 0.4);
    }

    #[test]
    fn test_weight_config_rejects_negative_weight() {
        let aggregate = aggregate_with(vec![ModelWeights {
            model_name: "vader".to_string(),
            model_weight: -1.0,
            title_sentiment: 0.3,
            selftext_sentiment: 0.2,
            comments_sentiment: 0.5,
        }]);

        assert!(matches!(
            aggregate.weight_config(),
            Err(Error::BadWeightConfig { .. })
        ));
    }

    #[test]
    fn test_date_range_granularity() {
        assert_eq!(DateRange::OneDay.granularity(), Granularity::Daily);
        assert_eq!(DateRange::OneMonth.granularity(), Granularity::Daily);
        assert_eq!(DateRange::SixMonths.granularity(), Granularity::Monthly);
    }

    #[test]
    fn test_granularity_labels() {
        let ts = DateTime::parse_from_rfc3339("2026-08-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Granularity::Daily.label(ts), "2026-08-07");
        assert_eq!(Granularity::Monthly.label(ts), "2026-08");
    }
}
