//! Subcommands and the flags they share.

pub mod batch;
pub mod config;
pub mod highlight;
pub mod models;
pub mod serve;

use std::path::{Path, PathBuf};

use clap::Args;
use thiserror::Error;
use tracing::{debug, warn};

use refmark_core::{Pipeline, RefmarkConfig, RefmarkError};

/// The document was processed but contained no codes.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotFound(pub String);

/// Flags overriding the extraction rule.
#[derive(Args, Debug, Clone, Default)]
pub struct PatternArgs {
    /// Literal label preceding a code
    #[arg(long)]
    pub marker: Option<String>,

    /// Regex character class body for code characters
    #[arg(long)]
    pub charset: Option<String>,

    /// Literal delimiter ending a code
    #[arg(long)]
    pub terminator: Option<String>,
}

impl PatternArgs {
    pub fn apply(&self, config: &mut RefmarkConfig) {
        config.pattern = config.pattern.clone().with_overrides(
            self.marker.as_deref(),
            self.charset.as_deref(),
            self.terminator.as_deref(),
        );
    }
}

/// Load the explicit config file, else the default one if present, else defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<RefmarkConfig> {
    if let Some(path) = path {
        debug!("Loading config from {}", path);
        return RefmarkConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        debug!("Loading config from {}", default_path.display());
        return Ok(RefmarkConfig::from_file(&default_path)?);
    }

    Ok(RefmarkConfig::default())
}

/// Point the config at a model directory: the flag wins, then a configured
/// directory that exists, then the managed download location.
pub fn resolve_model_dir(config: &mut RefmarkConfig, model_dir: Option<PathBuf>) {
    let dir = match model_dir {
        Some(dir) => dir,
        None if config.models.model_dir.exists() => return,
        None => models::default_model_dir(),
    };
    debug!("Using models from {}", dir.display());
    config.models.model_dir = dir;
}

/// Build a pipeline. When the OCR backend cannot load, PDF text layers are
/// still searched and inputs that need OCR fail with the load error.
pub fn build_pipeline(config: RefmarkConfig, text_only: bool) -> anyhow::Result<Pipeline> {
    if text_only {
        return Ok(Pipeline::new(config)?);
    }

    match Pipeline::from_config(config.clone()) {
        Ok(pipeline) => Ok(pipeline),
        Err(RefmarkError::Ocr(e)) => {
            warn!("OCR unavailable ({}); only PDF text layers can be searched", e);
            Ok(Pipeline::new(config)?.with_ocr_unavailable(e.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
