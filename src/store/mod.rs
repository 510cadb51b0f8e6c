//! Document store abstraction consumed by the analysis core.
//!
//! The core exchanges structured records with a storage collaborator; the
//! wire protocol belongs to the implementation behind [`DocumentStore`].

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{Aggregate, Indicator, IndicatorUpdate, Post};

/// All-of keyword predicate for post queries.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub keywords: Vec<String>,
}

impl PostFilter {
    /// Every filter keyword must appear in the post's precomputed keyword
    /// list (exact match, not substring).
    pub fn matches(&self, post: &Post) -> bool {
        self.keywords
            .iter()
            .all(|keyword| post.keywords.iter().any(|k| k == keyword))
    }
}

/// Indicator query: by name set, by aggregate, or unfiltered (`None`).
#[derive(Debug, Clone)]
pub enum IndicatorFilter {
    Names(Vec<String>),
    Aggregate(String),
}

impl IndicatorFilter {
    pub fn matches(&self, indicator: &Indicator) -> bool {
        match self {
            IndicatorFilter::Names(names) => names.iter().any(|n| n == &indicator.name),
            IndicatorFilter::Aggregate(aggregate) => &indicator.aggregate_name == aggregate,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_posts(&self, filter: Option<&PostFilter>) -> Result<Vec<Post>, StorageError>;

    async fn load_indicators(
        &self,
        filter: Option<&IndicatorFilter>,
    ) -> Result<Vec<Indicator>, StorageError>;

    async fn load_aggregate(&self, name: &str) -> Result<Option<Aggregate>, StorageError>;

    /// Merge-by-name: inserts the indicator if absent, otherwise replaces
    /// only the series fields present in the update.
    async fn upsert_indicator(&self, update: &IndicatorUpdate) -> Result<(), StorageError>;
}

/// Applies an [`IndicatorUpdate`] to an existing indicator document in place.
pub(crate) fn apply_update(indicator: &mut Indicator, update: &IndicatorUpdate) {
    if let Some(daily) = &update.results_by_day {
        indicator.results_by_day = daily.clone();
    }
    if let Some(monthly) = &update.results_by_month {
        indicator.results_by_month = monthly.clone();
    }
}

/// Materializes a full indicator document from an upsert against a missing
/// name.
pub(crate) fn indicator_from_update(update: &IndicatorUpdate) -> Indicator {
    Indicator {
        name: update.name.clone(),
        filters: Vec::new(),
        aggregate_name: String::new(),
        results_by_day: update.results_by_day.clone().unwrap_or_default(),
        results_by_month: update.results_by_month.clone().unwrap_or_default(),
    }
}
