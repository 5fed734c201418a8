use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::synth::{SearchOptions, TieBreak};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SynthConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// 0 means the fallback repeats until cancelled or out of time.
    #[serde(default = "default_fallback_passes")]
    pub fallback_passes: usize,
    #[serde(default)]
    pub deterministic_only: bool,
    #[serde(default = "default_random_subset")]
    pub random_subset: bool,
    #[serde(default)]
    pub tie_break: TieBreak,
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    #[serde(default = "default_state_limit")]
    pub state_limit: usize,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub history_limit: Option<usize>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            fallback_passes: default_fallback_passes(),
            deterministic_only: false,
            random_subset: default_random_subset(),
            tie_break: TieBreak::default(),
            time_budget_ms: None,
            state_limit: default_state_limit(),
            seed: None,
            history_limit: None,
        }
    }
}

impl SynthConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: SynthConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            max_attempts: self.max_attempts,
            fallback_passes: (self.fallback_passes > 0).then_some(self.fallback_passes),
            deterministic_only: self.deterministic_only,
            random_subset: self.random_subset,
            tie_break: self.tie_break,
            time_budget: self.time_budget_ms.map(Duration::from_millis),
        }
    }
}

fn default_max_attempts() -> usize {
    9999
}

fn default_fallback_passes() -> usize {
    1
}

fn default_random_subset() -> bool {
    true
}

fn default_state_limit() -> usize {
    100_000
}
