use std::time::Duration;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, info};

use super::{FileserverConfig, FileserverResponse, API_KEY_HEADER};
use crate::error::Result;
use crate::package::Archive;

/// Sends packaged archives to the fileserver.
///
/// The server is asked to extract the archive into place and delete the
/// uploaded zip afterwards (`extract=true&clean=true`).
pub struct Uploader {
    client: Client,
    config: FileserverConfig,
    timeout: Duration,
}

impl Uploader {
    pub fn new(config: FileserverConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config, timeout })
    }

    /// Uploads `archive` into the server directory for `destination`.
    ///
    /// Only transport failures (including the timeout) are errors; any HTTP
    /// status comes back in the [`FileserverResponse`].
    pub async fn upload(&self, destination: &str, archive: &Archive) -> Result<FileserverResponse> {
        let url = format!(
            "{}?extract=true&clean=true",
            self.config.endpoint(&FileserverConfig::asset_path(destination))
        );

        let bytes = tokio::fs::read(&archive.path).await?;
        info!("Uploading {} ({} bytes) to {}", archive.file_name, bytes.len(), url);

        let part = Part::bytes(bytes)
            .file_name(archive.file_name.clone())
            .mime_str("application/zip")?;
        let form = Form::new().part("files", part);

        let response = self.client
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key())
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await?;

        let response = FileserverResponse::read(response).await?;
        debug!("Upload of {} answered {}", archive.file_name, response.status);
        Ok(response)
    }
}
