//! Host collaborators: process execution and filesystem queries
//!
//! The engine only talks to the outside world through the traits in this
//! module, so scenario tests can swap in scripted implementations.

pub mod shell;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use shell::{OutputLine, OutputSink, ShellExecutor};

/// Error types for process execution
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn shell for `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fully resolved command line, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Shell command line
    pub command_line: String,

    /// Working directory
    pub cwd: PathBuf,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,

    /// Virtual-environment handle, relative to `cwd`
    pub venv: Option<String>,
}

impl CommandRequest {
    pub fn new(command_line: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command_line: command_line.into(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            venv: None,
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was terminated by a signal
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` lines of combined stdout and stderr
    pub fn tail(&self, lines: usize) -> String {
        let combined: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .collect();
        let start = combined.len().saturating_sub(lines);
        combined[start..].join("\n")
    }
}

/// Trait for running external commands
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ProcessError>;
}

/// Filesystem queries used by `exists()` in templates
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
