//! Pipeline configuration.
//!
//! Loaded from JSON; every field has a default so partial files are fine.

use serde::{Deserialize, Serialize};
use softframe_core::limits;
use softframe_core::{RendererError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Presentation rate cap, applied on top of the display's own limit.
    pub max_fps: u32,
    /// Idle surfaces the pool keeps ready (clamped to 6..=12).
    pub warm_target: usize,
    /// Maximum live pooled surfaces per target size.
    pub pool_hard_cap: usize,
    /// Idle count below which the renderer requests a top-up.
    pub low_water: usize,
    /// Upper bound on one event-queue wait, in milliseconds.
    pub event_wait_timeout_ms: u64,
    /// Fraction of the frame width subtitles may occupy.
    pub subtitle_safe_width: f32,
    /// Options applied to the engine before it is initialized.
    pub engine_options: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut engine_options = BTreeMap::new();
        engine_options.insert("vo".to_string(), "libmpv".to_string());
        engine_options.insert("hwdec".to_string(), "no".to_string());
        engine_options.insert("keep-open".to_string(), "yes".to_string());
        Self {
            max_fps: limits::DEFAULT_MAX_FPS,
            warm_target: limits::DEFAULT_WARM_TARGET,
            pool_hard_cap: limits::DEFAULT_POOL_HARD_CAP,
            low_water: limits::DEFAULT_LOW_WATER,
            event_wait_timeout_ms: 100,
            subtitle_safe_width: 0.9,
            engine_options,
        }
    }
}

impl PipelineConfig {
    /// Parse from JSON bytes and validate.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| RendererError::Config(format!("invalid pipeline config: {}", e)))?;
        Ok(config.validated())
    }

    /// Load from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_json(&data)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| RendererError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Bring out-of-range values back into their legal ranges.
    pub fn validated(mut self) -> Self {
        self.max_fps = self.max_fps.max(1);
        self.warm_target = self
            .warm_target
            .clamp(limits::WARM_TARGET_MIN, limits::WARM_TARGET_MAX);
        self.pool_hard_cap = self.pool_hard_cap.max(self.warm_target);
        self.low_water = self.low_water.min(self.warm_target);
        self.event_wait_timeout_ms = self.event_wait_timeout_ms.clamp(1, 1000);
        if !(0.1..=1.0).contains(&self.subtitle_safe_width) {
            self.subtitle_safe_width = 0.9;
        }
        self
    }

    pub fn event_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.event_wait_timeout_ms)
    }
}
