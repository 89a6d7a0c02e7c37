//! Startup facts about the host: platform, GPU vendor, CPU architecture
//!
//! Facts are detected once before a run and are read-only afterwards.
//! Each can be overridden from the command line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::process::Command;
use tracing::debug;

/// Operating system family, named the way pipeline guards spell it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Win32,
    Linux,
    Darwin,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Win32
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Win32 => "win32",
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "win32" | "windows" => Ok(Platform::Win32),
            "linux" => Ok(Platform::Linux),
            "darwin" | "macos" => Ok(Platform::Darwin),
            other => Err(format!(
                "unknown platform '{}' (expected win32, linux or darwin)",
                other
            )),
        }
    }
}

/// GPU vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Apple,
    None,
}

impl GpuVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Apple => "apple",
            GpuVendor::None => "none",
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nvidia" => Ok(GpuVendor::Nvidia),
            "amd" => Ok(GpuVendor::Amd),
            "apple" => Ok(GpuVendor::Apple),
            "none" | "" => Ok(GpuVendor::None),
            other => Err(format!(
                "unknown gpu vendor '{}' (expected nvidia, amd, apple or none)",
                other
            )),
        }
    }
}

/// Facts visible to templates as `platform`, `gpu` and `arch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupFacts {
    pub platform: Platform,
    pub gpu: GpuVendor,
    pub arch: String,
}

impl StartupFacts {
    pub fn new(platform: Platform, gpu: GpuVendor) -> Self {
        Self {
            platform,
            gpu,
            arch: current_arch(),
        }
    }

    /// Inspect the host
    pub async fn detect() -> Self {
        let platform = Platform::current();
        let arch = current_arch();

        let gpu = if tool_responds("nvidia-smi", &["-L"]).await {
            GpuVendor::Nvidia
        } else if platform == Platform::Darwin && arch == "arm64" {
            GpuVendor::Apple
        } else if tool_responds("rocm-smi", &["--showproductname"]).await {
            GpuVendor::Amd
        } else {
            GpuVendor::None
        };

        debug!("Detected platform={} gpu={} arch={}", platform, gpu, arch);
        Self { platform, gpu, arch }
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }
}

/// CPU architecture, spelled `x64` / `arm64` like the guards expect
fn current_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "x64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" => "ia32".to_string(),
        other => other.to_string(),
    }
}

/// True when `program` runs and exits successfully
async fn tool_responds(program: &str, args: &[&str]) -> bool {
    match Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!("{} not available: {}", program, e);
            false
        }
    }
}
