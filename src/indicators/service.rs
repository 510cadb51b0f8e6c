//! Entry points exposed to the scheduler and the recompute trigger layer.

use std::sync::Arc;
use tracing::{error, info};

use crate::analyzers::aggregate::OverallAggregator;
use crate::analyzers::normalize::PostNormalizer;
use crate::error::AnalysisResult;
use crate::indicators::engine::{IndicatorUpdateEngine, UpdateOutcome};
use crate::store::{DocumentStore, IndicatorFilter};
use crate::types::UpdateMode;

/// Front door for indicator updates: the scheduled batch runs and the
/// on-demand recompute requests.
pub struct AnalysisService {
    store: Arc<dyn DocumentStore>,
    engine: IndicatorUpdateEngine,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn DocumentStore>) -> AnalysisResult<Self> {
        let normalizer = PostNormalizer::with_defaults()?;
        let aggregator = OverallAggregator::new(store.clone(), normalizer);
        let engine = IndicatorUpdateEngine::new(store.clone(), aggregator);
        Ok(Self { store, engine })
    }

    /// Runs the given mode over every indicator. Invoked daily by the
    /// external scheduler; `Monthly` is expected on the first of the month
    /// but not enforced here.
    #[tracing::instrument(skip(self))]
    pub async fn run_scheduled(&self, mode: UpdateMode) -> AnalysisResult<()> {
        self.execute(mode, None).await
    }

    /// Full recompute for exactly one indicator. Errors propagate to the
    /// caller instead of being swallowed by the batch policy.
    #[tracing::instrument(skip(self))]
    pub async fn recompute_indicator(&self, name: &str) -> AnalysisResult<UpdateOutcome> {
        self.engine.process_update(name, UpdateMode::All).await
    }

    /// Full recompute for every indicator referencing the aggregate.
    #[tracing::instrument(skip(self))]
    pub async fn recompute_aggregate(&self, aggregate_name: &str) -> AnalysisResult<()> {
        let filter = IndicatorFilter::Aggregate(aggregate_name.to_string());
        self.execute(UpdateMode::All, Some(filter)).await
    }

    /// Batch driver: one indicator failing never aborts the rest of the run.
    async fn execute(
        &self,
        mode: UpdateMode,
        filter: Option<IndicatorFilter>,
    ) -> AnalysisResult<()> {
        let indicators = self.store.load_indicators(filter.as_ref()).await?;
        info!(count = indicators.len(), ?mode, "Processing indicators");

        for indicator in &indicators {
            match self.engine.process_update(&indicator.name, mode).await {
                Ok(outcome) if outcome.is_noop() => {
                    info!(indicator = %indicator.name, "Series already current");
                }
                Ok(outcome) => {
                    info!(
                        indicator = %indicator.name,
                        daily = outcome.new_daily_entries,
                        monthly = outcome.new_monthly_entries,
                        "Indicator updated"
                    );
                }
                Err(e) => {
                    error!(indicator = %indicator.name, error = %e, "Indicator update failed");
                }
            }
        }

        Ok(())
    }
}
