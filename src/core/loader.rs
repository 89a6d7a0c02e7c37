//! Sub-pipeline sources

use crate::core::{config::PipelineConfig, error::PipelineError, Pipeline};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves a `script.start` URI to a compiled pipeline
pub trait PipelineLoader: Send + Sync {
    /// Load `uri`, relative to `base_dir` (the invoking pipeline's directory)
    fn load(&self, uri: &str, base_dir: Option<&Path>) -> Result<Pipeline, PipelineError>;
}

/// Loads pipeline documents from YAML files
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    /// Used when the invoking pipeline has no source directory
    root: Option<PathBuf>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, uri: &str, base_dir: Option<&Path>) -> PathBuf {
        let path = Path::new(uri);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match base_dir.or(self.root.as_deref()) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Load a pipeline file, recording its directory for nested URIs
    pub fn load_path(&self, path: &Path) -> Result<Pipeline, PipelineError> {
        let config = PipelineConfig::from_file(path)
            .map_err(|e| PipelineError::Configuration(format!("{:#}", e)))?;
        let pipeline = config.to_pipeline()?;
        let cwd = std::env::current_dir().map_err(|e| {
            PipelineError::Configuration(format!("cannot resolve {}: {}", path.display(), e))
        })?;
        Ok(pipeline.with_source_dir(source_dir_of(path, &cwd)))
    }
}

/// Absolute directory holding `path`; a bare file name lives in `cwd`
fn source_dir_of(path: &Path, cwd: &Path) -> PathBuf {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let dir = cwd.join(parent);
    // drops `.` segments
    dir.components().collect()
}

impl PipelineLoader for FileLoader {
    fn load(&self, uri: &str, base_dir: Option<&Path>) -> Result<Pipeline, PipelineError> {
        let path = self.resolve(uri, base_dir);
        debug!("Loading sub-pipeline {} from {}", uri, path.display());
        self.load_path(&path)
    }
}
