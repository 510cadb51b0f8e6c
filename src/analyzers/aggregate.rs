//! Aggregates post collections into overall averages and date-bucketed
//! series.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::analyzers::combine::combine;
use crate::analyzers::normalize::PostNormalizer;
use crate::analyzers::utility::mean;
use crate::error::AnalysisResult;
use crate::store::{DocumentStore, PostFilter};
use crate::types::{DateBucket, DateRange, Granularity, Post, WeightConfig};

/// Normalizes and combines every post of a collection, producing either one
/// overall average or a bucketed series over a lookback window.
pub struct OverallAggregator {
    store: Arc<dyn DocumentStore>,
    normalizer: PostNormalizer,
}

impl OverallAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, normalizer: PostNormalizer) -> Self {
        Self { store, normalizer }
    }

    /// Unweighted mean of per-post combined scores over the filtered post
    /// collection; 0.0 when no posts match.
    pub async fn aggregate_overall(
        &self,
        model_keys: &[String],
        weights: &WeightConfig,
        filter: Option<&PostFilter>,
    ) -> AnalysisResult<f64> {
        let posts = self.store.load_posts(filter).await?;
        let mut scores = Vec::with_capacity(posts.len());
        for post in &posts {
            scores.push(self.process_post(post, model_keys, weights)?);
        }
        Ok(mean(&scores))
    }

    /// Buckets the filtered posts by date over `[now - range, now]` and
    /// averages each bucket.
    ///
    /// Every expected label in the window appears in the result, 0.0 when no
    /// post fell into it, in chronological order. Filter keywords are
    /// lower-cased before querying; posts carry lower-cased keyword lists.
    pub async fn aggregate_by_window(
        &self,
        model_keys: &[String],
        weights: &WeightConfig,
        filters: &[String],
        range: DateRange,
    ) -> AnalysisResult<Vec<DateBucket>> {
        let end = Utc::now();
        let start = end - Duration::days(range.days_back());
        let granularity = range.granularity();

        let mut buckets = expected_buckets(start, end, granularity);

        let filter = PostFilter {
            keywords: filters.iter().map(|k| k.to_lowercase()).collect(),
        };
        let posts = self.store.load_posts(Some(&filter)).await?;
        debug!(
            posts = posts.len(),
            ?range,
            "Bucketing posts over lookback window"
        );

        for post in &posts {
            if post.created_at >= start && post.created_at <= end {
                let label = granularity.label(post.created_at);
                let score = self.process_post(post, model_keys, weights)?;
                buckets.entry(label).or_default().push(score);
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(date, scores)| DateBucket {
                date,
                average_score: mean(&scores),
            })
            .collect())
    }

    fn process_post(
        &self,
        post: &Post,
        model_keys: &[String],
        weights: &WeightConfig,
    ) -> AnalysisResult<f64> {
        let normalized = self.normalizer.normalize(post)?;
        combine(&normalized, model_keys, weights)
    }
}

/// Generates every expected bucket label in `[start, end]`, keyed so that
/// lexicographic order is chronological order.
fn expected_buckets(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> BTreeMap<String, Vec<f64>> {
    let mut buckets = BTreeMap::new();
    let mut cursor = start;
    while cursor <= end {
        buckets.insert(granularity.label(cursor), Vec::new());
        cursor = cursor + granularity.stride();
    }
    buckets
}
