//! Test utilities for scenario tests

use async_trait::async_trait;
use provision::core::{
    config::PipelineConfig, ExecutionContext, GpuVendor, Pipeline, PipelineError,
    PipelineLoader, Platform, StartupFacts, StepState,
};
use provision::execution::{ExecutionEngine, ExecutionEvent, RunReport};
use provision::host::{CommandOutput, CommandRequest, Filesystem, ProcessError, ProcessExecutor};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const ROOT: &str = "/work";

/// Process executor that answers from a script and records every request
#[derive(Clone, Default)]
pub struct MockExecutor {
    /// (substring of the command line, output) pairs; first match wins
    rules: Arc<Mutex<Vec<(String, CommandOutput)>>>,
    requests: Arc<Mutex<Vec<CommandRequest>>>,
    /// Set after the first command, to simulate Ctrl-C mid-run
    abort_after_first: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, pattern: &str, stdout: &str, exit_code: i32) -> Self {
        self.rules.lock().unwrap().push((
            pattern.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
            },
        ));
        self
    }

    pub fn fail(self, pattern: &str, stderr: &str) -> Self {
        self.rules.lock().unwrap().push((
            pattern.to_string(),
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: 1,
            },
        ));
        self
    }

    pub fn abort_after_first_command(&self, flag: Arc<AtomicBool>) {
        *self.abort_after_first.lock().unwrap() = Some(flag);
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.command_line)
            .collect()
    }
}

#[async_trait]
impl ProcessExecutor for MockExecutor {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ProcessError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(flag) = self.abort_after_first.lock().unwrap().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }

        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .find(|(pattern, _)| request.command_line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}

/// Filesystem holding a set of paths; tests add paths between runs
#[derive(Default)]
pub struct InMemoryFs {
    paths: Mutex<HashSet<PathBuf>>,
}

impl InMemoryFs {
    pub fn with(paths: &[&str]) -> Self {
        Self {
            paths: Mutex::new(paths.iter().map(PathBuf::from).collect()),
        }
    }

    pub fn add(&self, path: &str) {
        self.paths.lock().unwrap().insert(PathBuf::from(path));
    }
}

impl Filesystem for InMemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.paths.lock().unwrap().contains(path)
    }
}

/// Sub-pipeline documents keyed by URI
#[derive(Default)]
pub struct InMemoryLoader {
    documents: HashMap<String, String>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, yaml: &str) -> Self {
        self.documents.insert(uri.to_string(), yaml.to_string());
        self
    }
}

impl PipelineLoader for InMemoryLoader {
    fn load(&self, uri: &str, _base_dir: Option<&Path>) -> Result<Pipeline, PipelineError> {
        let yaml = self
            .documents
            .get(uri)
            .ok_or_else(|| PipelineError::Configuration(format!("pipeline {} not found", uri)))?;
        let mut config = PipelineConfig::from_yaml(yaml)
            .map_err(|e| PipelineError::Configuration(format!("{:#}", e)))?;
        if config.name.is_empty() {
            config.name = uri.trim_end_matches(".yaml").to_string();
        }
        config.to_pipeline()
    }
}

pub fn load(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("valid YAML")
        .to_pipeline()
        .expect("valid pipeline")
}

pub fn linux_context() -> ExecutionContext {
    context(Platform::Linux, GpuVendor::Nvidia)
}

pub fn context(platform: Platform, gpu: GpuVendor) -> ExecutionContext {
    ExecutionContext::new(StartupFacts::new(platform, gpu).with_arch("x64"), ROOT)
}

/// Outcome of a scenario run
pub struct TestRun {
    pub pipeline: Pipeline,
    pub ctx: ExecutionContext,
    pub report: RunReport,
    pub events: Vec<ExecutionEvent>,
}

impl TestRun {
    pub fn var(&self, name: &str) -> Option<&serde_json::Value> {
        self.ctx.variables.get(name)
    }

    pub fn step_state(&self, label: &str) -> &StepState {
        let index = self
            .pipeline
            .label_index(label)
            .unwrap_or_else(|| panic!("no step labelled {}", label));
        &self.pipeline.steps[index].state
    }

    pub fn logs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Log { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn engine_with(
    executor: MockExecutor,
    loader: InMemoryLoader,
) -> (ExecutionEngine<MockExecutor>, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let mut engine = ExecutionEngine::new(executor, Arc::new(loader));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));
    (engine, events)
}

/// Run `yaml` with a Linux + NVIDIA context
pub async fn run(yaml: &str, executor: &MockExecutor) -> TestRun {
    run_in(yaml, executor, InMemoryLoader::new(), linux_context()).await
}

pub async fn run_in(
    yaml: &str,
    executor: &MockExecutor,
    loader: InMemoryLoader,
    mut ctx: ExecutionContext,
) -> TestRun {
    let mut pipeline = load(yaml);
    let (engine, events) = engine_with(executor.clone(), loader);
    let report = engine.execute(&mut pipeline, &mut ctx).await;
    let events = events.lock().unwrap().clone();
    TestRun {
        pipeline,
        ctx,
        report,
        events,
    }
}
