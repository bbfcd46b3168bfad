//! Compression options and configuration.

use std::sync::Arc;
use std::time::Duration;

use super::oracle::SizePolicy;
use super::raster::PageRasterizer;
use super::selector::StrategySelector;
use super::tier::QualityTier;

/// Default overall budget for one compression run.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Options for [`CompressionPipeline`](super::CompressionPipeline).
#[derive(Clone)]
pub struct CompressOptions {
    /// Tier requested by the caller
    pub tier: QualityTier,

    /// Overall time budget across all attempts
    pub deadline: Duration,

    /// Transform pages on the rayon pool
    pub parallel: bool,

    /// Tier → parameter table
    pub selector: StrategySelector,

    /// Acceptance threshold and escalation budget
    pub policy: SizePolicy,

    /// Enables the rasterize strategy
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl CompressOptions {
    /// Create new compress options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested tier.
    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.tier = tier;
        self
    }

    /// Set the requested tier from a user token (unknown tokens mean `medium`).
    pub fn with_tier_token(mut self, token: &str) -> Self {
        self.tier = QualityTier::from_token(token);
        self
    }

    /// Set the overall time budget.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Enable or disable parallel page transforms.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Use a custom tier table.
    pub fn with_selector(mut self, selector: StrategySelector) -> Self {
        self.selector = selector;
        self
    }

    /// Use a custom size policy.
    pub fn with_policy(mut self, policy: SizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable the rasterize strategy.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            tier: QualityTier::default(),
            deadline: DEFAULT_DEADLINE,
            parallel: true,
            selector: StrategySelector::default(),
            policy: SizePolicy::default(),
            rasterizer: None,
        }
    }
}

impl std::fmt::Debug for CompressOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressOptions")
            .field("tier", &self.tier)
            .field("deadline", &self.deadline)
            .field("parallel", &self.parallel)
            .field("policy", &self.policy)
            .field("rasterizer", &self.rasterizer.as_ref().map(|r| r.name()))
            .finish()
    }
}
