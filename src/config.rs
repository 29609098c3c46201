use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_PROJECT_TITLE: &str = "Coded Transcripts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardRule {
    pub pattern: String,
    #[serde(default = "default_match_mode")]
    pub mode: MatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRule {
    pub pattern: String,
    #[serde(default = "default_match_mode")]
    pub mode: MatchMode,
    pub canonical: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub project_title: String,
    pub discard: Vec<DiscardRule>,
    pub overrides: Vec<OverrideRule>,
    /// Curated raw-tag corrections seeded into the run's correction cache.
    pub corrections: BTreeMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_title: DEFAULT_PROJECT_TITLE.to_string(),
            discard: vec![DiscardRule {
                pattern: "na".to_string(),
                mode: MatchMode::Exact,
            }],
            overrides: Vec::new(),
            corrections: BTreeMap::new(),
        }
    }
}

fn default_match_mode() -> MatchMode {
    MatchMode::Exact
}

pub fn load_project_config(path: Option<&Path>) -> Result<ProjectConfig> {
    let Some(path) = path else {
        return Ok(ProjectConfig::default());
    };

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: ProjectConfig = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    info!(
        path = %path.display(),
        discard_rules = config.discard.len(),
        override_rules = config.overrides.len(),
        seeded_corrections = config.corrections.len(),
        "loaded project config"
    );

    Ok(config)
}
