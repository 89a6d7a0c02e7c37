//! Shell-backed process executor

use crate::host::{CommandOutput, CommandRequest, ProcessError, ProcessExecutor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// A line of output from a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Callback receiving output lines as they are produced
pub type OutputSink = Arc<dyn Fn(OutputLine) + Send + Sync>;

/// Runs command lines through the platform shell
///
/// `/bin/sh -c` on Unix, `%COMSPEC% /C` on Windows. A venv
/// handle is interpreted as a directory relative to the command's working
/// directory whose `bin` (`Scripts` on Windows) is prepended to `PATH`.
#[derive(Clone, Default)]
pub struct ShellExecutor {
    sink: Option<OutputSink>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream every output line to `sink` while the command runs
    pub fn with_output_sink(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn command(&self, request: &CommandRequest) -> Command {
        let (shell, flag) = shell();
        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(&request.command_line)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(venv) = &request.venv {
            let root = request.cwd.join(venv);
            cmd.env("PATH", venv_path(&venv_bin_dir(&root)));
            cmd.env("VIRTUAL_ENV", &root);
            cmd.env_remove("PYTHONHOME");
        }

        cmd
    }
}

#[async_trait]
impl ProcessExecutor for ShellExecutor {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ProcessError> {
        debug!(
            "Running `{}` in {}",
            request.command_line,
            request.cwd.display()
        );

        let mut child = self
            .command(request)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: request.command_line.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = self.sink.clone();

        let (stdout, stderr) = tokio::join!(
            collect_lines(stdout, sink.clone(), OutputLine::Stdout),
            collect_lines(stderr, sink, OutputLine::Stderr),
        );
        let io_error = |source: std::io::Error| ProcessError::Io {
            command: request.command_line.clone(),
            source,
        };
        let stdout = stdout.map_err(io_error)?;
        let stderr = stderr.map_err(io_error)?;

        let status = child.wait().await.map_err(io_error)?;
        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!("`{}` exited with code {}", request.command_line, exit_code);
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

async fn collect_lines<R>(
    reader: Option<R>,
    sink: Option<OutputSink>,
    wrap: fn(String) -> OutputLine,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    // Output is not guaranteed to be UTF-8 (Windows code pages, Latin-1 file names)
    let mut captured = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']).to_string();
        captured.push_str(&line);
        captured.push('\n');
        if let Some(sink) = &sink {
            sink(wrap(line));
        }
    }

    Ok(captured)
}

#[cfg(windows)]
fn shell() -> (String, &'static str) {
    (
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string()),
        "/C",
    )
}

#[cfg(not(windows))]
fn shell() -> (String, &'static str) {
    ("/bin/sh".to_string(), "-c")
}

fn venv_bin_dir(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts")
    } else {
        root.join("bin")
    }
}

fn venv_path(bin: &Path) -> std::ffi::OsString {
    let mut paths = vec![bin.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| bin.as_os_str().to_os_string())
}
