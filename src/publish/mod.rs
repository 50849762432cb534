//! # Publish Orchestrator
//!
//! Drives one asset through the pipeline:
//!
//! 1. convert the source model into `models/<name>/`, and optionally write the
//!    demo world to `scene.output`
//! 2. load the metadata record, before anything destructive happens
//! 3. package the model directory into `models/<name>.zip`
//! 4. upload the archive; 201 means success
//! 5. remove the local `models` and `textures` directories, whatever the
//!    upload outcome was
//! 6. after a successful upload, merge the metadata into the remote catalog
//!
//! Any error before step 4 aborts without touching the network. Non-201
//! responses are reported in the [`PublishReport`], not raised.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{Settings, WorkspaceConfig};
use crate::convert::Converter;
use crate::error::{PublishError, Result};
use crate::fileserver::{
    FileserverResponse, IndexClient, MetadataRecord, Provenance, Uploader, WriteMode,
};
use crate::package::{self, Archive};
use crate::scene;

/// One publish run as requested on the command line
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Source model file
    pub model: PathBuf,
    /// Asset name; defaults to the model's file stem
    pub name: Option<String>,
    /// Metadata file; defaults to `metadata.json` next to the model
    pub metadata: Option<PathBuf>,
    /// Overrides the configured provenance tag
    pub source: Option<String>,
    /// Overrides the configured scale
    pub scale: Option<f64>,
    /// Also write the demo world
    pub demo_scene: bool,
}

impl PublishRequest {
    /// The asset name, which doubles as a directory under `models/`, so it
    /// must be a single plain path component.
    pub fn asset_name(&self) -> Result<String> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .model
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .ok_or_else(|| PublishError::Config(format!(
                    "Cannot derive an asset name from {}",
                    self.model.display()
                )))?,
        };

        if name.trim().is_empty() {
            return Err(PublishError::Config("Asset name must not be empty".to_string()));
        }
        if name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(PublishError::Config(format!(
                "Asset name must not contain path separators or be '.' or '..', got: {}",
                name
            )));
        }
        Ok(name)
    }

    pub fn metadata_path(&self) -> PathBuf {
        match &self.metadata {
            Some(path) => path.clone(),
            None => self
                .model
                .parent()
                .map(|dir| dir.join("metadata.json"))
                .unwrap_or_else(|| PathBuf::from("metadata.json")),
        }
    }
}

/// Outcome of a remote step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded(StatusCode),
    Failed { status: StatusCode, body: String },
    /// Not attempted because an earlier step failed
    Skipped,
}

impl StepOutcome {
    fn from_response(response: FileserverResponse) -> Self {
        if response.is_created() {
            StepOutcome::Succeeded(response.status)
        } else {
            StepOutcome::Failed { status: response.status, body: response.body }
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, StepOutcome::Succeeded(_))
    }
}

/// What happened to one asset
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub asset_name: String,
    pub archive: Archive,
    pub upload: StepOutcome,
    pub metadata: StepOutcome,
}

impl PublishReport {
    pub fn succeeded(&self) -> bool {
        self.upload.succeeded() && self.metadata.succeeded()
    }
}

/// Runs the publish pipeline against one fileserver.
pub struct Publisher<C> {
    converter: C,
    uploader: Uploader,
    index: IndexClient,
    workspace: WorkspaceConfig,
    provenance: Provenance,
    scene_template: PathBuf,
    scene_output: PathBuf,
}

impl<C: Converter> Publisher<C> {
    pub fn new(settings: &Settings, converter: C) -> Result<Self> {
        let mode = if settings.index.conditional_writes {
            WriteMode::Conditional { max_attempts: settings.index.max_attempts }
        } else {
            WriteMode::LastWriterWins
        };

        Ok(Self {
            converter,
            uploader: Uploader::new(settings.fileserver(), settings.upload_timeout())?,
            index: IndexClient::new(
                settings.fileserver(),
                &settings.index.path,
                settings.index_timeout(),
                mode,
            )?,
            workspace: settings.workspace.clone(),
            provenance: Provenance {
                source: settings.publish.source.clone(),
                scale: settings.publish.scale,
            },
            scene_template: settings.scene.template.clone(),
            scene_output: settings.scene.output.clone(),
        })
    }

    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishReport> {
        let asset_name = request.asset_name()?;
        let provenance = Provenance {
            source: request.source.clone().unwrap_or_else(|| self.provenance.source.clone()),
            scale: match request.scale {
                Some(scale) => check_scale(scale)?,
                None => self.provenance.scale,
            },
        };
        let models_dir = &self.workspace.models_dir;
        info!("Publishing {} as '{}'", request.model.display(), asset_name);

        let target_dir = models_dir.join(&asset_name);
        self.converter.convert(&request.model, &target_dir, &asset_name).await?;
        info!("Converted '{}'", asset_name);

        if request.demo_scene {
            scene::write_demo_world(&self.scene_template, &self.scene_output, &asset_name)?;
        }

        let metadata = load_metadata(&request.metadata_path())?;

        let archive = package::package_model(models_dir, &asset_name)?;
        info!("Packaged '{}'", asset_name);

        // The local workspace goes away once the upload has been attempted,
        // even if it failed or never got an answer.
        let upload = self.upload_with_progress(&asset_name, &archive).await;
        cleanup_workspace(&self.workspace);
        let upload = StepOutcome::from_response(upload?);

        if !upload.succeeded() {
            warn!("Upload of '{}' failed: {:?}", asset_name, upload);
            return Ok(PublishReport {
                asset_name,
                archive,
                upload,
                metadata: StepOutcome::Skipped,
            });
        }
        info!("Uploaded '{}'", asset_name);

        let response = self
            .index
            .publish_metadata(&asset_name, metadata, &provenance)
            .await
            .map_err(|e| {
                error!("'{}' is uploaded but missing from the catalog: {}", asset_name, e);
                e
            })?;

        let metadata = StepOutcome::from_response(response);
        if metadata.succeeded() {
            info!("Catalog entry for '{}' published", asset_name);
        } else {
            error!("'{}' is uploaded but the catalog write failed: {:?}", asset_name, metadata);
        }

        Ok(PublishReport { asset_name, archive, upload, metadata })
    }

    async fn upload_with_progress(&self, asset_name: &str, archive: &Archive) -> Result<FileserverResponse> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("Uploading {}...", archive.file_name));

        let result = self.uploader.upload(asset_name, archive).await;
        match &result {
            Ok(response) => pb.finish_with_message(format!("Upload answered {}", response.status)),
            Err(_) => pb.finish_with_message("Upload failed"),
        }
        result
    }
}

/// Accepts a scale factor only if it is finite and positive, since the
/// catalog stores it as a JSON number.
pub fn check_scale(scale: f64) -> Result<f64> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(PublishError::Config(format!("Scale must be a positive number, got: {}", scale)))
    }
}

/// Reads the metadata record, which must be a JSON object.
pub fn load_metadata(path: &Path) -> Result<MetadataRecord> {
    let invalid = |reason: String| PublishError::InvalidMetadata { path: path.to_path_buf(), reason };

    let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    match serde_json::from_str::<Value>(&content).map_err(|e| invalid(e.to_string()))? {
        Value::Object(record) => Ok(record),
        other => Err(invalid(format!("expected a JSON object, found {}", json_kind(&other)))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Removes the local working directories. Missing directories are fine.
pub fn cleanup_workspace(workspace: &WorkspaceConfig) {
    for dir in [&workspace.models_dir, &workspace.textures_dir] {
        match fs::remove_dir_all(dir) {
            Ok(()) => info!("Removed {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
        }
    }
}
