//! Step domain model

use crate::core::{
    condition::Guard,
    config::{StepConfig, WhenConfig},
    error::PipelineError,
    state::StepState,
};
use crate::template::value::to_display_string;
use crate::template::{Template, TemplateValue};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Step kinds, keyed by their `method` name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `shell.run`
    RunCommand,
    /// `local.set`
    SetVariable,
    /// `script.start`
    InvokeSubpipeline,
    /// `log`
    Log,
    /// `jump`
    Jump,
}

impl StepKind {
    pub fn method(&self) -> &'static str {
        match self {
            StepKind::RunCommand => "shell.run",
            StepKind::SetVariable => "local.set",
            StepKind::InvokeSubpipeline => "script.start",
            StepKind::Log => "log",
            StepKind::Jump => "jump",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl FromStr for StepKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell.run" => Ok(StepKind::RunCommand),
            "local.set" => Ok(StepKind::SetVariable),
            "script.start" => Ok(StepKind::InvokeSubpipeline),
            "log" => Ok(StepKind::Log),
            "jump" => Ok(StepKind::Jump),
            other => Err(PipelineError::Configuration(format!(
                "unknown step method '{}'",
                other
            ))),
        }
    }
}

/// What happens when a step's dispatch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailPolicy {
    /// Stop the pipeline
    #[default]
    Stop,
    /// Record the failure and continue
    Soft,
}

/// Compiled parameters of a run-command step
#[derive(Debug, Clone)]
pub struct RunCommandParams {
    /// Command lines, run in order
    pub messages: Vec<Template>,
    /// Working directory, relative to the current one
    pub path: Option<Template>,
    /// Virtual-environment handle
    pub venv: Option<Template>,
    pub env: Vec<(String, Template)>,
    /// Precondition; a non-zero exit skips the step
    pub check: Option<Template>,
}

/// Compiled, kind-specific parameters
#[derive(Debug, Clone)]
pub enum StepAction {
    RunCommand(RunCommandParams),
    /// Entries are resolved first and written as one batch
    SetVariable(Vec<(String, TemplateValue)>),
    InvokeSubpipeline {
        uri: Template,
        params: TemplateValue,
    },
    Log {
        text: Template,
    },
    Jump {
        target: Template,
    },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::RunCommand(_) => StepKind::RunCommand,
            StepAction::SetVariable(_) => StepKind::SetVariable,
            StepAction::InvokeSubpipeline { .. } => StepKind::InvokeSubpipeline,
            StepAction::Log { .. } => StepKind::Log,
            StepAction::Jump { .. } => StepKind::Jump,
        }
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Position in the pipeline
    pub index: usize,

    /// Optional label (`id`), unique within the pipeline
    pub label: Option<String>,

    pub description: Option<String>,

    pub guard: Option<Guard>,

    pub action: StepAction,

    pub fail_policy: FailPolicy,

    /// Runtime state
    pub state: StepState,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Messages {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RawRunCommand {
    message: Messages,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    venv: Option<String>,
    #[serde(default)]
    env: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    check: Option<String>,
}

#[derive(Deserialize)]
struct RawInvoke {
    uri: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RawLog {
    text: String,
}

#[derive(Deserialize)]
struct RawJump {
    id: String,
}

impl Step {
    /// Create a step from a step config, compiling every template
    pub fn from_config(index: usize, config: &StepConfig) -> Result<Self, PipelineError> {
        let kind: StepKind = config.method.parse()?;
        let name = config
            .id
            .clone()
            .unwrap_or_else(|| format!("#{} ({})", index + 1, kind));
        let compile = |field: &str, source: &str| {
            Template::parse(source)
                .map_err(|e| PipelineError::template(format!("step {} `{}`", name, field), e))
        };

        let guard = match &config.when {
            None => None,
            Some(WhenConfig::Bool(value)) => Some(Guard::Constant(*value)),
            Some(WhenConfig::Expr(source)) => Some(Guard::Expression(
                Template::parse_expression_or_template(source)
                    .map_err(|e| PipelineError::template(format!("step {} `when`", name), e))?,
            )),
        };

        let action = match kind {
            StepKind::RunCommand => {
                let raw: RawRunCommand = params(&name, config)?;
                let lines = match raw.message {
                    Messages::One(line) => vec![line],
                    Messages::Many(lines) => lines,
                };
                if lines.is_empty() {
                    return Err(PipelineError::Configuration(format!(
                        "step {} has an empty `message` list",
                        name
                    )));
                }
                StepAction::RunCommand(RunCommandParams {
                    messages: lines
                        .iter()
                        .map(|line| compile("message", line))
                        .collect::<Result<_, _>>()?,
                    path: raw.path.as_deref().map(|p| compile("path", p)).transpose()?,
                    venv: raw.venv.as_deref().map(|v| compile("venv", v)).transpose()?,
                    env: raw
                        .env
                        .iter()
                        .map(|(key, value)| -> Result<(String, Template), PipelineError> {
                            Ok((key.clone(), compile("env", &to_display_string(value))?))
                        })
                        .collect::<Result<_, _>>()?,
                    check: raw.check.as_deref().map(|c| compile("check", c)).transpose()?,
                })
            }
            StepKind::SetVariable => {
                let raw: serde_json::Map<String, serde_json::Value> = params(&name, config)?;
                let entries = raw
                    .iter()
                    .map(|(key, value)| {
                        TemplateValue::compile(value)
                            .map(|compiled| (key.clone(), compiled))
                            .map_err(|e| {
                                PipelineError::template(format!("step {} `{}`", name, key), e)
                            })
                    })
                    .collect::<Result<_, _>>()?;
                StepAction::SetVariable(entries)
            }
            StepKind::InvokeSubpipeline => {
                let raw: RawInvoke = params(&name, config)?;
                StepAction::InvokeSubpipeline {
                    uri: compile("uri", &raw.uri)?,
                    params: TemplateValue::compile(&raw.params).map_err(|e| {
                        PipelineError::template(format!("step {} `params`", name), e)
                    })?,
                }
            }
            StepKind::Log => {
                let raw: RawLog = params(&name, config)?;
                StepAction::Log {
                    text: compile("text", &raw.text)?,
                }
            }
            StepKind::Jump => {
                let raw: RawJump = params(&name, config)?;
                StepAction::Jump {
                    target: compile("id", &raw.id)?,
                }
            }
        };

        Ok(Step {
            index,
            label: config.id.clone(),
            description: config.description.clone(),
            guard,
            action,
            fail_policy: if config.continue_on_error {
                FailPolicy::Soft
            } else {
                FailPolicy::Stop
            },
            state: StepState::Pending,
        })
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    /// Label, or position and method for unlabelled steps
    pub fn name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("#{} ({})", self.index + 1, self.kind()),
        }
    }
}

fn params<T: serde::de::DeserializeOwned>(
    name: &str,
    config: &StepConfig,
) -> Result<T, PipelineError> {
    serde_yaml::from_value(config.params.clone()).map_err(|e| {
        PipelineError::Configuration(format!(
            "step {}: invalid params for {}: {}",
            name, config.method, e
        ))
    })
}
