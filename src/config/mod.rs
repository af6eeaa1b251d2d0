use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::mapping::editor::{LengthRule, ValidationRules};

pub const PROJECT_CONFIG_FILE: &str = ".curricula.project.yml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub user_id: Option<String>,
    pub validation: ValidationRules,
    pub lock_approved: bool,
    pub outcomes: Vec<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            validation: ValidationRules::default(),
            lock_approved: false,
            outcomes: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {field} limits: min {min} must be at least 1 and not above max {max}")]
    InvalidLimits {
        field: &'static str,
        min: usize,
        max: usize,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    identity: Option<RawIdentity>,
    #[serde(default)]
    validation: Option<RawValidation>,
    #[serde(default)]
    workflow: Option<RawWorkflow>,
    #[serde(default)]
    outcomes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIdentity {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawValidation {
    #[serde(default)]
    justification: Option<RawLimits>,
    #[serde(default)]
    contribution: Option<RawLimits>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLimits {
    #[serde(default)]
    min: Option<usize>,
    #[serde(default)]
    max: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkflow {
    #[serde(default)]
    lock_approved: Option<bool>,
}

/// Merges the user, nearest project, and repo layers, in that order.
pub fn load_effective_config(
    cwd: &Path,
    repo_config: Option<&Path>,
    user_config: Option<&Path>,
) -> Result<EffectiveConfig, ConfigError> {
    let mut merged = EffectiveConfig::default();

    if let Some(path) = user_config.filter(|path| path.exists()) {
        merge_layer(&mut merged, load_layer(path)?);
    }

    if let Some(path) = find_nearest_project_config(cwd) {
        merge_layer(&mut merged, load_layer(&path)?);
    }

    if let Some(path) = repo_config.filter(|path| path.exists()) {
        merge_layer(&mut merged, load_layer(path)?);
    }

    validate_limits("justification", merged.validation.justification)?;
    validate_limits("contribution", merged.validation.contribution)?;
    Ok(merged)
}

pub fn load_config_file(path: &Path) -> Result<EffectiveConfig, ConfigError> {
    let mut config = EffectiveConfig::default();
    merge_layer(&mut config, load_layer(path)?);
    validate_limits("justification", config.validation.justification)?;
    validate_limits("contribution", config.validation.contribution)?;
    Ok(config)
}

pub fn find_nearest_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn load_layer(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }
    let raw: Option<RawConfig> = serde_yaml::from_str(&content)?;
    Ok(raw.unwrap_or_default())
}

fn merge_layer(merged: &mut EffectiveConfig, layer: RawConfig) {
    if let Some(user_id) = layer.identity.and_then(|identity| identity.user_id) {
        merged.user_id = Some(user_id);
    }
    if let Some(validation) = layer.validation {
        merge_limits(&mut merged.validation.justification, validation.justification);
        merge_limits(&mut merged.validation.contribution, validation.contribution);
    }
    if let Some(lock) = layer.workflow.and_then(|workflow| workflow.lock_approved) {
        merged.lock_approved = lock;
    }
    if let Some(outcomes) = layer.outcomes {
        merge_paths_dedup(&mut merged.outcomes, outcomes);
    }
}

fn merge_limits(rule: &mut LengthRule, raw: Option<RawLimits>) {
    let Some(raw) = raw else {
        return;
    };
    if let Some(min) = raw.min {
        rule.min = min;
    }
    if let Some(max) = raw.max {
        rule.max = max;
    }
}

fn merge_paths_dedup(existing: &mut Vec<String>, incoming: Vec<String>) {
    let mut seen: HashSet<String> = existing.iter().cloned().collect();
    for path in incoming {
        if seen.insert(path.clone()) {
            existing.push(path);
        }
    }
}

fn validate_limits(field: &'static str, rule: LengthRule) -> Result<(), ConfigError> {
    if rule.min == 0 || rule.min > rule.max {
        return Err(ConfigError::InvalidLimits {
            field,
            min: rule.min,
            max: rule.max,
        });
    }
    Ok(())
}

pub fn default_repo_config_yaml() -> String {
    r#"identity:
  user_id: null
validation:
  justification:
    min: 10
    max: 500
  contribution:
    min: 5
    max: 200
workflow:
  lock_approved: false
outcomes: []
"#
    .to_string()
}

pub fn default_global_config_yaml() -> String {
    r#"identity:
  user_id: null
workflow:
  lock_approved: false
"#
    .to_string()
}
