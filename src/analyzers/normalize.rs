//! Score normalization: maps each model's native sentiment range onto a
//! common 0-100 scale before scores are combined.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AnalysisResult, Error};
use crate::types::{ComponentScores, ModelOutput, Post};

/// Normalizes one model's raw score values. Implementations must preserve
/// structure: a scalar stays a scalar, a list stays a list.
pub trait NormalizationStrategy: Send + Sync {
    fn normalize(&self, value: &Value) -> AnalysisResult<Value>;
}

/// Min/max scaling of a model's native range onto 0-100, clamped.
pub struct MinMaxStrategy {
    min_value: f64,
    max_value: f64,
}

impl MinMaxStrategy {
    /// # Errors
    ///
    /// Fails when `min_value == max_value`; a degenerate range is a
    /// configuration bug, not a data issue.
    pub fn new(min_value: f64, max_value: f64) -> AnalysisResult<Self> {
        if min_value == max_value {
            return Err(Error::InvalidRange {
                min: min_value,
                max: max_value,
            });
        }
        Ok(Self {
            min_value,
            max_value,
        })
    }

    fn normalize_single(&self, score: f64) -> f64 {
        let scaled = (score - self.min_value) / (self.max_value - self.min_value) * 100.0;
        scaled.clamp(0.0, 100.0)
    }
}

impl NormalizationStrategy for MinMaxStrategy {
    fn normalize(&self, value: &Value) -> AnalysisResult<Value> {
        match value {
            Value::Number(_) => {
                let score = as_score(value)?;
                to_number(self.normalize_single(score))
            }
            Value::Array(items) => {
                let mut normalized = Vec::with_capacity(items.len());
                for item in items {
                    let score = as_score(item)?;
                    normalized.push(to_number(self.normalize_single(score))?);
                }
                Ok(Value::Array(normalized))
            }
            other => Err(Error::InvalidScore {
                value: other.to_string(),
            }),
        }
    }
}

fn as_score(value: &Value) -> AnalysisResult<f64> {
    value.as_f64().ok_or_else(|| Error::InvalidScore {
        value: value.to_string(),
    })
}

fn to_number(score: f64) -> AnalysisResult<Value> {
    serde_json::Number::from_f64(score)
        .map(Value::Number)
        .ok_or_else(|| Error::InvalidScore {
            value: score.to_string(),
        })
}

/// Applies the registered per-model strategy to every model inside one post's
/// `model_output`. Models without a registered strategy pass through
/// unchanged.
pub struct PostNormalizer {
    strategies: BTreeMap<String, Box<dyn NormalizationStrategy>>,
}

impl PostNormalizer {
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Registry with the built-in model ranges: VADER and TextBlob both
    /// report compound scores in [-1, 1].
    pub fn with_defaults() -> AnalysisResult<Self> {
        let mut normalizer = Self::new();
        normalizer.register("vader", Box::new(MinMaxStrategy::new(-1.0, 1.0)?));
        normalizer.register("textblob", Box::new(MinMaxStrategy::new(-1.0, 1.0)?));
        Ok(normalizer)
    }

    /// Registers a strategy for a model. New models are added here, not by
    /// growing a normalizer hierarchy.
    pub fn register(&mut self, model: impl Into<String>, strategy: Box<dyn NormalizationStrategy>) {
        self.strategies.insert(model.into(), strategy);
    }

    /// Returns a copy of `post` with every configured model's scores
    /// normalized.
    ///
    /// # Errors
    ///
    /// Fails with a validation error if the post has no `model_output`
    /// field, or a type error if a configured model carries a non-numeric
    /// score.
    pub fn normalize(&self, post: &Post) -> AnalysisResult<Post> {
        let output = post
            .model_output
            .as_ref()
            .ok_or_else(|| Error::MissingModelOutput {
                post_id: post.id.clone(),
            })?;

        let mut normalized = ModelOutput::new();
        for (model, components) in output {
            match self.strategies.get(model) {
                Some(strategy) => {
                    let mut scores = ComponentScores::new();
                    for (component, value) in components {
                        scores.insert(component.clone(), strategy.normalize(value)?);
                    }
                    normalized.insert(model.clone(), scores);
                }
                None => {
                    normalized.insert(model.clone(), components.clone());
                }
            }
        }

        Ok(Post {
            model_output: Some(normalized),
            ..post.clone()
        })
    }
}
