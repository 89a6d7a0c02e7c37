//! Execution context - variable store, working directories and facts

use crate::core::error::PipelineError;
use crate::core::facts::StartupFacts;
use crate::host::{Filesystem, LocalFilesystem};
use crate::template::eval::{property, Scope};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Store key that run-command steps write their capture to
pub const INPUT_KEY: &str = "input";

/// Deepest allowed sub-pipeline nesting
pub const MAX_SUBPIPELINE_DEPTH: usize = 16;

/// Name → value map shared by every step of a run
///
/// Keys are only ever added or overwritten, never removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VariableStore {
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a variable; `None` means undefined
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Write a batch of already resolved values
    pub fn set_all<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.values.extend(batch);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// The whole store as an object, exposed to templates as `local`
    pub fn to_object(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

/// Mutable state threaded through a run
///
/// Passed by `&mut` from the engine to each step handler; there is no
/// global state.
pub struct ExecutionContext {
    /// Host facts, read-only
    pub facts: StartupFacts,

    pub variables: VariableStore,

    fs: Arc<dyn Filesystem>,

    /// Working-directory stack; the bottom is the pipeline root
    dirs: Vec<PathBuf>,

    /// Parameters of each active sub-pipeline, innermost last
    args: Vec<Value>,

    /// Nesting depth, 0 for the top-level pipeline
    depth: usize,
}

impl ExecutionContext {
    pub fn new(facts: StartupFacts, root: impl Into<PathBuf>) -> Self {
        Self {
            facts,
            variables: VariableStore::new(),
            fs: Arc::new(LocalFilesystem),
            dirs: vec![root.into()],
            args: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_variables(mut self, variables: VariableStore) -> Self {
        self.variables = variables;
        self
    }

    /// Directory commands currently run in
    pub fn current_dir(&self) -> &Path {
        self.dirs.last().map(PathBuf::as_path).unwrap_or(Path::new("."))
    }

    /// Enter `path`, relative to the current directory unless absolute
    pub fn push_dir(&mut self, path: impl AsRef<Path>) {
        let next = self.current_dir().join(path);
        self.dirs.push(next);
    }

    /// Leave the innermost directory; the root is never popped
    pub fn pop_dir(&mut self) {
        if self.dirs.len() > 1 {
            self.dirs.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Parameters of the innermost sub-pipeline, `null` at top level
    pub fn args(&self) -> Value {
        self.args.last().cloned().unwrap_or(Value::Null)
    }

    /// Start a nested pipeline with `args` as its parameters
    pub fn enter_subpipeline(&mut self, args: Value) -> Result<(), PipelineError> {
        if self.depth >= MAX_SUBPIPELINE_DEPTH {
            return Err(PipelineError::Configuration(format!(
                "sub-pipeline nesting exceeds {} levels",
                MAX_SUBPIPELINE_DEPTH
            )));
        }
        self.depth += 1;
        self.args.push(args);
        Ok(())
    }

    pub fn leave_subpipeline(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
            self.args.pop();
        }
    }
}

impl Scope for ExecutionContext {
    fn lookup(&self, name: &str) -> Value {
        match name {
            "platform" => Value::String(self.facts.platform.to_string()),
            "gpu" => Value::String(self.facts.gpu.to_string()),
            "arch" => Value::String(self.facts.arch.clone()),
            "local" => self.variables.to_object(),
            "args" => self.args(),
            "cwd" => Value::String(self.current_dir().display().to_string()),
            other => self.variables.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    fn lookup_member(&self, root: &str, name: &str) -> Value {
        match root {
            "local" => self.variables.get(name).cloned().unwrap_or(Value::Null),
            other => property(&self.lookup(other), name),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.fs.exists(&self.current_dir().join(path))
    }
}
