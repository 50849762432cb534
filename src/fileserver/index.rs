use std::time::Duration;
use reqwest::header::{ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{FileserverConfig, FileserverResponse, API_KEY_HEADER};
use crate::error::{PublishError, Result};

/// Arbitrary JSON fields describing one asset
pub type MetadataRecord = Map<String, Value>;

/// The remote catalog: asset name → metadata record
pub type Catalog = Map<String, Value>;

/// Version of the catalog as seen by the last fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogVersion {
    /// The catalog did not exist yet (404)
    Missing,
    /// The server sent this `ETag` with the catalog
    Tagged(String),
    /// The server sent no `ETag`; writes cannot be guarded
    Untagged,
}

/// A fetched catalog together with the version it was read at.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub catalog: Catalog,
    pub version: CatalogVersion,
}

/// How catalog writes deal with concurrent publishers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Plain PUT; a concurrent publisher's entries can be silently lost
    LastWriterWins,
    /// PUT guarded by `If-Match` / `If-None-Match: *`, retried on 412
    Conditional { max_attempts: u32 },
}

/// Fields the pipeline stamps onto every published record
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source: String,
    pub scale: f64,
}

/// Reads and rewrites the remote catalog document.
pub struct IndexClient {
    client: Client,
    config: FileserverConfig,
    index_path: String,
    timeout: Duration,
    mode: WriteMode,
}

impl IndexClient {
    pub fn new(config: FileserverConfig, index_path: &str, timeout: Duration, mode: WriteMode) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            index_path: index_path.to_string(),
            timeout,
            mode,
        })
    }

    fn index_url(&self) -> String {
        self.config.endpoint(&self.index_path)
    }

    /// Fetches the catalog. A 404 means nothing has been published yet and
    /// yields an empty catalog.
    pub async fn fetch_index(&self) -> Result<IndexSnapshot> {
        let response = self.client
            .get(self.index_url())
            .header(API_KEY_HEADER, self.config.api_key())
            .timeout(self.timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let version = match response.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
                    Some(tag) => CatalogVersion::Tagged(tag.to_string()),
                    None => CatalogVersion::Untagged,
                };
                let catalog: Catalog = serde_json::from_str(&response.text().await?)?;
                debug!("Fetched catalog with {} entries ({:?})", catalog.len(), version);
                Ok(IndexSnapshot { catalog, version })
            }
            StatusCode::NOT_FOUND => {
                info!("Catalog does not exist yet, starting from an empty one");
                Ok(IndexSnapshot { catalog: Catalog::new(), version: CatalogVersion::Missing })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PublishError::UnexpectedStatus { status: status.as_u16(), body })
            }
        }
    }

    /// Replaces the whole remote catalog with `snapshot.catalog`.
    ///
    /// In conditional mode the write only succeeds if the catalog is still at
    /// `snapshot.version`; otherwise the server answers 412.
    pub async fn write_index(&self, snapshot: &IndexSnapshot) -> Result<FileserverResponse> {
        let body = serde_json::to_string(&snapshot.catalog)?;

        let mut request = self.client
            .put(self.index_url())
            .header(API_KEY_HEADER, self.config.api_key())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.timeout);

        if let WriteMode::Conditional { .. } = self.mode {
            request = match &snapshot.version {
                CatalogVersion::Tagged(tag) => request.header(IF_MATCH, tag.as_str()),
                CatalogVersion::Missing => request.header(IF_NONE_MATCH, "*"),
                CatalogVersion::Untagged => {
                    warn!("Fileserver sent no ETag for the catalog; writing without a precondition");
                    request
                }
            };
        }

        let response = request.body(body).send().await?;
        Ok(FileserverResponse::read(response).await?)
    }

    /// Merges `metadata` into the catalog under `asset_name` and writes the
    /// catalog back.
    ///
    /// `source`, `scale` and `url` are overwritten on the record. The write
    /// response is returned as is; only a conflict that outlasts every retry
    /// becomes an error.
    pub async fn publish_metadata(
        &self,
        asset_name: &str,
        metadata: MetadataRecord,
        provenance: &Provenance,
    ) -> Result<FileserverResponse> {
        let record = self.stamp(asset_name, metadata, provenance);
        let max_attempts = match self.mode {
            WriteMode::LastWriterWins => 1,
            WriteMode::Conditional { max_attempts } => max_attempts.max(1),
        };

        for attempt in 1..=max_attempts {
            let mut snapshot = self.fetch_index().await?;
            snapshot.catalog.insert(asset_name.to_string(), Value::Object(record.clone()));

            let response = self.write_index(&snapshot).await?;
            if response.status != StatusCode::PRECONDITION_FAILED {
                info!("Catalog write for '{}' answered {}", asset_name, response.status);
                return Ok(response);
            }

            if self.mode == WriteMode::LastWriterWins {
                return Ok(response);
            }
            warn!(
                "Catalog changed while publishing '{}' (attempt {}/{}), retrying",
                asset_name, attempt, max_attempts
            );
        }

        Err(PublishError::IndexConflict {
            asset: asset_name.to_string(),
            attempts: max_attempts,
        })
    }

    fn stamp(&self, asset_name: &str, mut metadata: MetadataRecord, provenance: &Provenance) -> MetadataRecord {
        metadata.insert("source".to_string(), Value::String(provenance.source.clone()));
        metadata.insert("scale".to_string(), serde_json::json!(provenance.scale));
        metadata.insert("url".to_string(), Value::String(self.config.asset_url(asset_name)));
        metadata
    }
}
