//! Pipeline configuration from YAML

use crate::core::{error::PipelineError, Pipeline};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Top-level pipeline document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name; defaults to the file stem when loaded from disk
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// Initial variable store contents
    #[serde(default)]
    pub variables: HashMap<String, Value>,

    /// Ordered steps
    #[serde(alias = "run")]
    pub steps: Vec<StepConfig>,
}

/// Step as written in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Optional label, target of `jump` and `--from-step`
    #[serde(default)]
    pub id: Option<String>,

    /// Step kind (`shell.run`, `local.set`, `script.start`, `log`, `jump`)
    pub method: String,

    /// Guard
    #[serde(default)]
    pub when: Option<WhenConfig>,

    /// Kind-specific parameters; unknown keys are ignored
    #[serde(default)]
    pub params: Value,

    /// Fail-soft when true
    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub description: Option<String>,
}

/// `when:` accepts a boolean or an expression string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenConfig {
    Bool(bool),
    Expr(String),
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid pipeline file {}", path.display()))?;
        if config.name.is_empty() {
            config.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "pipeline".to_string());
        }
        Ok(config)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate document structure
    ///
    /// Template syntax is checked later by [`PipelineConfig::to_pipeline`].
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.method.trim().is_empty() {
                anyhow::bail!("Step #{} has an empty method", index + 1);
            }
            if let Some(id) = &step.id {
                if id.is_empty() {
                    anyhow::bail!("Step #{} has an empty id", index + 1);
                }
                if !seen_ids.insert(id.as_str()) {
                    anyhow::bail!("Duplicate step ID: {}", id);
                }
            }
        }

        // Literal jump targets must name an existing step
        for step in self.steps.iter().filter(|s| s.method == "jump") {
            let target = step
                .params
                .get("id")
                .and_then(Value::as_str)
                .filter(|t| !t.contains("{{"));
            if let Some(target) = target {
                if !seen_ids.contains(target) {
                    anyhow::bail!(
                        "Jump step {} targets non-existent step '{}'",
                        step.id.as_deref().unwrap_or("(unlabelled)"),
                        target
                    );
                }
            }
        }

        Ok(())
    }

    /// Initial variables as JSON values
    pub fn variables_as_json(&self) -> Result<HashMap<String, serde_json::Value>, PipelineError> {
        self.variables
            .iter()
            .map(|(key, value)| {
                serde_json::to_value(value)
                    .map(|v| (key.clone(), v))
                    .map_err(|e| {
                        PipelineError::Configuration(format!("variable '{}': {}", key, e))
                    })
            })
            .collect()
    }

    /// Compile into a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline, PipelineError> {
        Pipeline::from_config(self)
    }
}
