//! In-process document store used by tests and examples.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentStore, IndicatorFilter, PostFilter, apply_update, indicator_from_update};
use crate::error::StorageError;
use crate::types::{Aggregate, Indicator, IndicatorUpdate, Post};

#[derive(Default)]
struct Collections {
    posts: Vec<Post>,
    indicators: Vec<Indicator>,
    aggregates: Vec<Aggregate>,
}

/// Holds all three collections in memory behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_post(&self, post: Post) {
        self.inner.write().await.posts.push(post);
    }

    pub async fn insert_indicator(&self, indicator: Indicator) {
        self.inner.write().await.indicators.push(indicator);
    }

    pub async fn insert_aggregate(&self, aggregate: Aggregate) {
        self.inner.write().await.aggregates.push(aggregate);
    }

    /// Snapshot of one indicator document, for assertions.
    pub async fn get_indicator(&self, name: &str) -> Option<Indicator> {
        self.inner
            .read()
            .await
            .indicators
            .iter()
            .find(|i| i.name == name)
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_posts(&self, filter: Option<&PostFilter>) -> Result<Vec<Post>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .posts
            .iter()
            .filter(|post| filter.is_none_or(|f| f.matches(post)))
            .cloned()
            .collect())
    }

    async fn load_indicators(
        &self,
        filter: Option<&IndicatorFilter>,
    ) -> Result<Vec<Indicator>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .indicators
            .iter()
            .filter(|indicator| filter.is_none_or(|f| f.matches(indicator)))
            .cloned()
            .collect())
    }

    async fn load_aggregate(&self, name: &str) -> Result<Option<Aggregate>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.aggregates.iter().find(|a| a.name == name).cloned())
    }

    async fn upsert_indicator(&self, update: &IndicatorUpdate) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        match inner.indicators.iter_mut().find(|i| i.name == update.name) {
            Some(indicator) => apply_update(indicator, update),
            None => inner.indicators.push(indicator_from_update(update)),
        }
        Ok(())
    }
}
