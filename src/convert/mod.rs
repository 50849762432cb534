//! Model conversion is delegated to an outside tool. The pipeline only needs
//! the [`Converter`] capability; [`ExternalConverter`] runs a configured
//! program (Blender by default) as a child process.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ConverterConfig;
use crate::error::{PublishError, Result};

/// What a successful conversion left on disk
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Directory holding the converted model files
    pub model_dir: PathBuf,
}

#[async_trait]
pub trait Converter: Send + Sync {
    /// Converts `source` into a model directory at `target_dir` named `asset_name`.
    async fn convert(&self, source: &Path, target_dir: &Path, asset_name: &str) -> Result<ConversionOutput>;
}

/// Runs an external conversion program.
///
/// Every argument has `{source}`, `{target}` and `{name}` replaced before the
/// program is spawned.
pub struct ExternalConverter {
    program: String,
    args: Vec<String>,
}

impl ExternalConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn render_args(&self, source: &Path, target_dir: &Path, asset_name: &str) -> Vec<String> {
        let source = source.to_string_lossy();
        let target = target_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{target}", &target)
                    .replace("{name}", asset_name)
            })
            .collect()
    }
}

#[async_trait]
impl Converter for ExternalConverter {
    async fn convert(&self, source: &Path, target_dir: &Path, asset_name: &str) -> Result<ConversionOutput> {
        if !source.is_file() {
            return Err(PublishError::Conversion(format!(
                "Source model not found: {}",
                source.display()
            )));
        }
        if let Some(parent) = target_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.render_args(source, target_dir, asset_name);
        info!("Converting {} with {}", source.display(), self.program);
        debug!("Converter arguments: {:?}", args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| PublishError::Conversion(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PublishError::Conversion(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if !target_dir.is_dir() {
            return Err(PublishError::Conversion(format!(
                "{} finished but produced no model directory at {}",
                self.program,
                target_dir.display()
            )));
        }

        Ok(ConversionOutput { model_dir: target_dir.to_path_buf() })
    }
}
