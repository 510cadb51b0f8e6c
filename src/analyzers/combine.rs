//! Combines a normalized post's per-model component scores into one scalar.

use serde_json::Value;

use crate::error::{AnalysisResult, Error};
use crate::types::{Post, WeightConfig};

/// Reduces a normalized post to a single score using a weight configuration.
///
/// Weighted average of weighted averages: each model's components are
/// averaged under their component weights, then the model scores are averaged
/// under the model weights. Models with zero or absent weight, and models
/// absent from the post, are skipped entirely; zero-weighted components never
/// affect the result. Missing components count as 0 toward their model's
/// average. Returns 0.0 when no model qualifies.
pub fn combine(
    normalized_post: &Post,
    model_keys: &[String],
    weights: &WeightConfig,
) -> AnalysisResult<f64> {
    let output = normalized_post
        .model_output
        .as_ref()
        .ok_or_else(|| Error::MissingModelOutput {
            post_id: normalized_post.id.clone(),
        })?;

    let mut model_scores: Vec<(f64, f64)> = Vec::new();
    let mut total_model_weight = 0.0;

    for model in model_keys {
        let model_weight = weights.model_weights.get(model).copied().unwrap_or(0.0);
        if model_weight == 0.0 {
            continue;
        }
        let Some(scores) = output.get(model) else {
            continue;
        };

        let mut weighted_score = 0.0;
        let mut total_component_weight = 0.0;

        if let Some(components) = weights.component_weights.get(model) {
            for (component, &weight) in components {
                if weight == 0.0 {
                    continue;
                }
                // An absent component contributes 0 but still counts toward
                // the component-weight denominator.
                let score = match scores.get(component) {
                    Some(value) => resolve_score(value)?,
                    None => 0.0,
                };
                weighted_score += score * weight;
                total_component_weight += weight;
            }
        }

        let model_score = if total_component_weight > 0.0 {
            weighted_score / total_component_weight
        } else {
            0.0
        };

        model_scores.push((model_score, model_weight));
        total_model_weight += model_weight;
    }

    if total_model_weight == 0.0 {
        return Ok(0.0);
    }

    let weighted_sum: f64 = model_scores
        .iter()
        .map(|(score, weight)| score * weight)
        .sum();
    Ok(weighted_sum / total_model_weight)
}

/// A list of scores (one per comment) collapses to its arithmetic mean; an
/// empty list scores 0.0. Scalars are used directly.
fn resolve_score(value: &Value) -> AnalysisResult<f64> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(0.0);
            }
            let mut sum = 0.0;
            for item in items {
                sum += item.as_f64().ok_or_else(|| Error::InvalidScore {
                    value: item.to_string(),
                })?;
            }
            Ok(sum / items.len() as f64)
        }
        Value::Number(_) => value.as_f64().ok_or_else(|| Error::InvalidScore {
            value: value.to_string(),
        }),
        other => Err(Error::InvalidScore {
            value: other.to_string(),
        }),
    }
}
