//! CLI command definitions

use crate::core::{GpuVendor, Platform};
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Variable overrides (key=value); values are read as YAML scalars
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, Value)>,

    /// Override the detected platform
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Override the detected GPU vendor
    #[arg(long)]
    pub gpu: Option<GpuVendor>,

    /// Override the detected CPU architecture
    #[arg(long)]
    pub arch: Option<String>,

    /// Label of the step to start from
    #[arg(long)]
    pub from_step: Option<String>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Don't echo command output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show startup facts
#[derive(Debug, Args, Clone)]
pub struct FactsCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid key=value pair: {}", s))?;
    if key.is_empty() {
        return Err(format!("Empty variable name in: {}", s));
    }
    Ok((key.to_string(), parse_value(raw)))
}

/// `true`, `3` and `1.5` become typed values, everything else stays a string
fn parse_value(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
