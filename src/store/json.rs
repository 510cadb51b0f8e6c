//! File-backed document store: one JSON array per collection under a data
//! directory.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DocumentStore, IndicatorFilter, PostFilter, apply_update, indicator_from_update};
use crate::error::StorageError;
use crate::types::{Aggregate, Indicator, IndicatorUpdate, Post};

const POSTS_FILE: &str = "posts.json";
const INDICATORS_FILE: &str = "indicators.json";
const AGGREGATES_FILE: &str = "aggregates.json";

/// Stores each collection as a JSON file under `dir`. The lock serializes
/// read-modify-write upserts against concurrent readers.
pub struct JsonFileStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    fn read_collection<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StorageError> {
        let path = self.dir.join(file);
        if !Path::new(&path).exists() {
            debug!(path = %path.display(), "Collection file missing, treating as empty");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_collection<T: Serialize>(&self, file: &str, docs: &[T]) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let body = serde_json::to_vec_pretty(docs)?;
        std::fs::write(&path, body)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load_posts(&self, filter: Option<&PostFilter>) -> Result<Vec<Post>, StorageError> {
        let _guard = self.lock.read().await;
        let posts: Vec<Post> = self.read_collection(POSTS_FILE)?;
        Ok(posts
            .into_iter()
            .filter(|post| filter.is_none_or(|f| f.matches(post)))
            .collect())
    }

    async fn load_indicators(
        &self,
        filter: Option<&IndicatorFilter>,
    ) -> Result<Vec<Indicator>, StorageError> {
        let _guard = self.lock.read().await;
        let indicators: Vec<Indicator> = self.read_collection(INDICATORS_FILE)?;
        Ok(indicators
            .into_iter()
            .filter(|indicator| filter.is_none_or(|f| f.matches(indicator)))
            .collect())
    }

    async fn load_aggregate(&self, name: &str) -> Result<Option<Aggregate>, StorageError> {
        let _guard = self.lock.read().await;
        let aggregates: Vec<Aggregate> = self.read_collection(AGGREGATES_FILE)?;
        Ok(aggregates.into_iter().find(|a| a.name == name))
    }

    async fn upsert_indicator(&self, update: &IndicatorUpdate) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;
        let mut indicators: Vec<Indicator> = self.read_collection(INDICATORS_FILE)?;
        match indicators.iter_mut().find(|i| i.name == update.name) {
            Some(indicator) => apply_update(indicator, update),
            None => indicators.push(indicator_from_update(update)),
        }
        self.write_collection(INDICATORS_FILE, &indicators)
    }
}
