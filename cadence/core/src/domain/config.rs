// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Cadence Configuration Types
//
// One YAML document configures every component of the core:
// - context: sequential history bounds and trend bias
// - windowing: adaptive window classification thresholds
// - aggregation: time scales, decay weighting and coherence mix
// - scheduler: batch sizing, concurrency, deadlines and retries
// - calibration: readiness, trust gates and review sampling
// - self_consistency: when a judgment should be repeated

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub windowing: WindowSelectorConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub self_consistency: SelfConsistencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum number of decisions retained per session
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Mean differences within this band classify as a stable trend
    #[serde(default)]
    pub trend_tolerance: f64,

    /// Size of the multiplier offset handed to prompt builders
    #[serde(default = "default_bias_magnitude")]
    pub bias_magnitude: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            trend_tolerance: 0.0,
            bias_magnitude: default_bias_magnitude(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSelectorConfig {
    /// Window used for consistent streams and for streams too short to classify
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    #[serde(default = "default_fast_window_ms")]
    pub fast_window_ms: u64,

    #[serde(default = "default_slow_window_min_ms")]
    pub slow_window_min_ms: u64,

    #[serde(default = "default_slow_window_max_ms")]
    pub slow_window_max_ms: u64,

    #[serde(default = "default_erratic_window_floor_ms")]
    pub erratic_window_floor_ms: u64,

    #[serde(default = "default_erratic_window_cap_ms")]
    pub erratic_window_cap_ms: u64,

    /// Interval coefficient of variation above which a stream is erratic
    #[serde(default = "default_erratic_interval_cv")]
    pub erratic_interval_cv: f64,

    /// Share of score reversals that makes a volatile stream erratic
    #[serde(default = "default_erratic_flip_ratio")]
    pub erratic_flip_ratio: f64,

    /// Mean absolute score change per note that counts as fast change
    #[serde(default = "default_fast_volatility")]
    pub fast_volatility: f64,

    /// Mean absolute score change per note at or below which a stream is consistent
    #[serde(default = "default_consistent_volatility")]
    pub consistent_volatility: f64,

    #[serde(default = "default_consistent_interval_cv")]
    pub consistent_interval_cv: f64,
}

impl Default for WindowSelectorConfig {
    fn default() -> Self {
        Self {
            default_window_ms: default_window_ms(),
            fast_window_ms: default_fast_window_ms(),
            slow_window_min_ms: default_slow_window_min_ms(),
            slow_window_max_ms: default_slow_window_max_ms(),
            erratic_window_floor_ms: default_erratic_window_floor_ms(),
            erratic_window_cap_ms: default_erratic_window_cap_ms(),
            erratic_interval_cv: default_erratic_interval_cv(),
            erratic_flip_ratio: default_erratic_flip_ratio(),
            fast_volatility: default_fast_volatility(),
            consistent_volatility: default_consistent_volatility(),
            consistent_interval_cv: default_consistent_interval_cv(),
        }
    }
}

/// Named aggregation time scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeScale {
    pub name: String,
    pub window_ms: u64,
}

impl TimeScale {
    pub fn new(name: impl Into<String>, window_ms: u64) -> Self {
        Self {
            name: name.into(),
            window_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_scales")]
    pub scales: Vec<TimeScale>,

    /// Weight multiplier per full window length of age (0 < decay <= 1)
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    /// Weight multiplier applied to high-salience notes
    #[serde(default = "default_salience_boost")]
    pub salience_boost: f64,

    /// Boost notes whose observation text is new relative to the previous window
    #[serde(default)]
    pub enable_novelty: bool,

    #[serde(default = "default_novelty_weight")]
    pub novelty_weight: f64,

    #[serde(default)]
    pub coherence_weights: CoherenceWeights,

    /// Window score variance that maps to zero variance coherence
    #[serde(default = "default_variance_normalizer")]
    pub variance_normalizer: f64,

    /// Shorter observation tokens are ignored for text overlap
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            scales: default_scales(),
            decay_factor: default_decay_factor(),
            salience_boost: default_salience_boost(),
            enable_novelty: false,
            novelty_weight: default_novelty_weight(),
            coherence_weights: CoherenceWeights::default(),
            variance_normalizer: default_variance_normalizer(),
            min_token_len: default_min_token_len(),
        }
    }
}

impl AggregationConfig {
    /// Check the parameters that feed window weights and coherence
    pub fn validate_weighting(&self) -> Result<(), String> {
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(format!("decay_factor must be in (0.0, 1.0], got {}", self.decay_factor));
        }
        if !self.salience_boost.is_finite() || self.salience_boost < 1.0 {
            return Err(format!("salience_boost must be at least 1.0, got {}", self.salience_boost));
        }
        if !self.novelty_weight.is_finite() || self.novelty_weight < 0.0 {
            return Err(format!("novelty_weight cannot be negative, got {}", self.novelty_weight));
        }
        if !(self.variance_normalizer > 0.0 && self.variance_normalizer.is_finite()) {
            return Err(format!(
                "variance_normalizer must be positive, got {}",
                self.variance_normalizer
            ));
        }
        self.coherence_weights
            .validate()
            .map_err(|e| format!("coherence_weights: {}", e))
    }
}

/// Mix of the three coherence sub-metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceWeights {
    #[serde(default = "default_direction_weight")]
    pub direction: f64,

    #[serde(default = "default_variance_weight")]
    pub variance: f64,

    #[serde(default = "default_observation_weight")]
    pub observation: f64,
}

impl Default for CoherenceWeights {
    fn default() -> Self {
        Self {
            direction: default_direction_weight(),
            variance: default_variance_weight(),
            observation: default_observation_weight(),
        }
    }
}

impl CoherenceWeights {
    /// Validate that weights are within range and sum to approximately 1.0
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("direction", self.direction),
            ("variance", self.variance),
            ("observation", self.observation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!(
                    "Coherence weight '{}' must be between 0.0 and 1.0, got {}",
                    name, value
                ));
            }
        }
        let sum = self.direction + self.variance + self.observation;
        if (sum - 1.0).abs() > 0.01 {
            return Err(format!(
                "Coherence weights must sum to 1.0, got {:.2} + {:.2} + {:.2} = {:.2}",
                self.direction, self.variance, self.observation, sum
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerMode {
    /// Priority batches, `depends_on` ignored
    General,
    /// Batch size follows observed latency
    LatencyAware,
    /// Dependency chains dispatched strictly in order
    Temporal,
}

impl Default for SchedulerMode {
    fn default() -> Self {
        Self::Temporal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub mode: SchedulerMode,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Longest a ready request may wait before a partial batch is flushed
    #[serde(default = "default_max_wait", with = "humantime_serde")]
    pub max_wait: Duration,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-attempt deadline for a dispatched batch
    #[serde(default, with = "humantime_serde")]
    pub batch_deadline: Option<Duration>,

    #[serde(default = "default_max_batch_retries")]
    pub max_batch_retries: u32,

    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Longest a request may wait in the queue before it fails with
    /// `BatchTimeout`; unset means queued requests wait indefinitely
    #[serde(default, with = "humantime_serde")]
    pub queue_timeout: Option<Duration>,

    /// Completed request ids remembered for dependency resolution
    #[serde(default = "default_dependency_retention")]
    pub dependency_retention: usize,

    #[serde(default)]
    pub latency: LatencyConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::default(),
            max_batch_size: default_max_batch_size(),
            max_wait: default_max_wait(),
            max_concurrency: default_max_concurrency(),
            batch_deadline: None,
            max_batch_retries: default_max_batch_retries(),
            retry_backoff: default_retry_backoff(),
            queue_timeout: None,
            dependency_retention: default_dependency_retention(),
            latency: LatencyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    #[serde(default = "default_target_latency", with = "humantime_serde")]
    pub target_latency: Duration,

    #[serde(default = "default_min_adaptive_batch")]
    pub min_batch_size: usize,

    #[serde(default = "default_max_adaptive_batch")]
    pub max_batch_size: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            target_latency: default_target_latency(),
            min_batch_size: default_min_adaptive_batch(),
            max_batch_size: default_max_adaptive_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Equal-width bins over 0–10 used for Cohen's kappa
    #[serde(default = "default_kappa_bins")]
    pub kappa_bins: usize,

    #[serde(default = "default_min_correlation")]
    pub min_correlation: f64,

    #[serde(default = "default_max_mae")]
    pub max_mae: f64,

    /// Distance from 0 or 10 that marks a score as extreme for review sampling
    #[serde(default = "default_extreme_margin")]
    pub extreme_margin: f64,

    #[serde(default = "default_review_uncertainty")]
    pub uncertainty_threshold: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            kappa_bins: default_kappa_bins(),
            min_correlation: default_min_correlation(),
            max_mae: default_max_mae(),
            extreme_margin: default_extreme_margin(),
            uncertainty_threshold: default_review_uncertainty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfConsistencyConfig {
    #[serde(default = "default_consistency_uncertainty")]
    pub uncertainty_threshold: f64,

    /// Score treated as the pass/fail line for borderline detection
    #[serde(default = "default_pass_score")]
    pub pass_score: f64,

    #[serde(default = "default_borderline_band")]
    pub borderline_band: f64,

    #[serde(default = "default_issue_threshold")]
    pub issue_threshold: usize,

    #[serde(default = "default_max_samples")]
    pub max_samples: u8,
}

impl Default for SelfConsistencyConfig {
    fn default() -> Self {
        Self {
            uncertainty_threshold: default_consistency_uncertainty(),
            pass_score: default_pass_score(),
            borderline_band: default_borderline_band(),
            issue_threshold: default_issue_threshold(),
            max_samples: default_max_samples(),
        }
    }
}

fn default_max_history() -> usize {
    50
}

fn default_bias_magnitude() -> f64 {
    0.05
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_fast_window_ms() -> u64 {
    5_000
}

fn default_slow_window_min_ms() -> u64 {
    20_000
}

fn default_slow_window_max_ms() -> u64 {
    30_000
}

fn default_erratic_window_floor_ms() -> u64 {
    1_000
}

fn default_erratic_window_cap_ms() -> u64 {
    5_000
}

fn default_erratic_interval_cv() -> f64 {
    1.0
}

fn default_erratic_flip_ratio() -> f64 {
    0.5
}

fn default_fast_volatility() -> f64 {
    1.0
}

fn default_consistent_volatility() -> f64 {
    0.25
}

fn default_consistent_interval_cv() -> f64 {
    0.5
}

fn default_scales() -> Vec<TimeScale> {
    vec![
        TimeScale::new("immediate", 100),
        TimeScale::new("short", 1_000),
        TimeScale::new("medium", 10_000),
        TimeScale::new("long", 60_000),
    ]
}

fn default_decay_factor() -> f64 {
    0.9
}

fn default_salience_boost() -> f64 {
    1.5
}

fn default_novelty_weight() -> f64 {
    0.5
}

fn default_variance_normalizer() -> f64 {
    25.0
}

fn default_min_token_len() -> usize {
    3
}

fn default_direction_weight() -> f64 {
    0.4
}

fn default_variance_weight() -> f64 {
    0.3
}

fn default_observation_weight() -> f64 {
    0.3
}

fn default_max_batch_size() -> usize {
    8
}

fn default_max_wait() -> Duration {
    Duration::from_millis(50)
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_batch_retries() -> u32 {
    2
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_dependency_retention() -> usize {
    4096
}

fn default_target_latency() -> Duration {
    Duration::from_secs(2)
}

fn default_min_adaptive_batch() -> usize {
    1
}

fn default_max_adaptive_batch() -> usize {
    32
}

fn default_min_samples() -> usize {
    10
}

fn default_kappa_bins() -> usize {
    5
}

fn default_min_correlation() -> f64 {
    0.7
}

fn default_max_mae() -> f64 {
    1.0
}

fn default_extreme_margin() -> f64 {
    1.5
}

fn default_review_uncertainty() -> f64 {
    0.3
}

fn default_consistency_uncertainty() -> f64 {
    0.3
}

fn default_pass_score() -> f64 {
    6.0
}

fn default_borderline_band() -> f64 {
    1.0
}

fn default_issue_threshold() -> usize {
    5
}

fn default_max_samples() -> u8 {
    5
}

impl CadenceConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CADENCE_CONFIG_PATH environment variable
    /// 2. ./cadence-config.yaml (working directory)
    /// 3. ~/.cadence/config.yaml (user home)
    /// 4. /etc/cadence/config.yaml (Unix only)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CADENCE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./cadence-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cadence").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/cadence/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CADENCE_MAX_CONCURRENCY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: CADENCE_MAX_CONCURRENCY={}", n);
                    self.scheduler.max_concurrency = n;
                }
                _ => tracing::warn!(
                    "Invalid value for CADENCE_MAX_CONCURRENCY: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CADENCE_MIN_SAMPLES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: CADENCE_MIN_SAMPLES={}", n);
                    self.calibration.min_samples = n;
                }
                _ => tracing::warn!(
                    "Invalid value for CADENCE_MIN_SAMPLES: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.context.max_history == 0 {
            anyhow::bail!("context.max_history must be at least 1");
        }
        if self.context.trend_tolerance < 0.0 {
            anyhow::bail!("context.trend_tolerance cannot be negative");
        }
        if !(0.0..1.0).contains(&self.context.bias_magnitude) {
            anyhow::bail!(
                "context.bias_magnitude must be in [0.0, 1.0), got {}",
                self.context.bias_magnitude
            );
        }

        let w = &self.windowing;
        if w.default_window_ms == 0 || w.fast_window_ms == 0 || w.erratic_window_floor_ms == 0 {
            anyhow::bail!("windowing sizes must be greater than zero");
        }
        if w.slow_window_min_ms > w.slow_window_max_ms {
            anyhow::bail!("windowing.slow_window_min_ms cannot exceed slow_window_max_ms");
        }
        if w.erratic_window_floor_ms > w.erratic_window_cap_ms {
            anyhow::bail!("windowing.erratic_window_floor_ms cannot exceed erratic_window_cap_ms");
        }
        if w.consistent_volatility >= w.fast_volatility {
            anyhow::bail!("windowing.consistent_volatility must be below fast_volatility");
        }

        let a = &self.aggregation;
        if a.scales.is_empty() {
            anyhow::bail!("aggregation.scales must contain at least one scale");
        }
        for scale in &a.scales {
            if scale.name.is_empty() {
                anyhow::bail!("aggregation scale name cannot be empty");
            }
            if scale.window_ms == 0 {
                anyhow::bail!("aggregation scale '{}' must have a non-zero window", scale.name);
            }
        }
        let mut names: Vec<&str> = a.scales.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != a.scales.len() {
            anyhow::bail!("aggregation scale names must be unique");
        }
        a.validate_weighting()
            .map_err(|e| anyhow::anyhow!("aggregation.{}", e))?;

        let s = &self.scheduler;
        if s.max_batch_size == 0 {
            anyhow::bail!("scheduler.max_batch_size must be at least 1");
        }
        if s.max_concurrency == 0 {
            anyhow::bail!("scheduler.max_concurrency must be at least 1");
        }
        if s.latency.min_batch_size == 0 {
            anyhow::bail!("scheduler.latency.min_batch_size must be at least 1");
        }
        if s.latency.min_batch_size > s.latency.max_batch_size {
            anyhow::bail!("scheduler.latency.min_batch_size cannot exceed max_batch_size");
        }

        let c = &self.calibration;
        if c.min_samples == 0 {
            anyhow::bail!("calibration.min_samples must be at least 1");
        }
        if c.kappa_bins < 2 {
            anyhow::bail!("calibration.kappa_bins must be at least 2");
        }
        if !(-1.0..=1.0).contains(&c.min_correlation) {
            anyhow::bail!("calibration.min_correlation must be in [-1.0, 1.0]");
        }
        if c.max_mae < 0.0 || c.extreme_margin < 0.0 {
            anyhow::bail!("calibration thresholds cannot be negative");
        }

        if self.self_consistency.max_samples < 2 {
            anyhow::bail!("self_consistency.max_samples must be at least 2");
        }

        Ok(())
    }
}
