//! # Fileserver Module
//!
//! HTTP clients for the remote asset fileserver: the multipart archive
//! [`Uploader`] and the catalog [`IndexClient`]. Both take an explicit
//! [`FileserverConfig`] instead of reading the environment, so tests can point
//! them at a local fake server.

use reqwest::StatusCode;

mod index;
mod upload;

pub use index::{Catalog, CatalogVersion, IndexClient, IndexSnapshot, MetadataRecord, Provenance, WriteMode};
pub use upload::Uploader;

/// Header carrying the fileserver API key on every request
pub const API_KEY_HEADER: &str = "X-Fileserver-API-Key";

/// Base URL and credentials of the fileserver.
#[derive(Debug, Clone)]
pub struct FileserverConfig {
    base_url: String,
    api_key: String,
}

impl FileserverConfig {
    /// The base URL is stored with exactly one trailing slash so that
    /// endpoint paths can be appended directly.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Joins a server-relative path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Directory an asset is extracted into on the server, e.g. `models/my%20model/`.
    pub fn asset_path(asset_name: &str) -> String {
        format!("models/{}/", urlencoding::encode(asset_name))
    }

    /// Public download URL of a published asset, zipped on the fly by the server.
    pub fn asset_url(&self, asset_name: &str) -> String {
        format!("{}?zip=true", self.endpoint(&Self::asset_path(asset_name)))
    }
}

/// Raw status and body of a fileserver response, left for the caller to interpret.
#[derive(Debug, Clone)]
pub struct FileserverResponse {
    pub status: StatusCode,
    pub body: String,
}

impl FileserverResponse {
    pub(crate) async fn read(response: reqwest::Response) -> reqwest::Result<Self> {
        let status = response.status();
        let body = response.text().await?;
        Ok(Self { status, body })
    }

    /// The fileserver signals a completed upload or catalog write with 201.
    pub fn is_created(&self) -> bool {
        self.status == StatusCode::CREATED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_url_escapes_name() {
        let config = FileserverConfig::new("http://files.example.test/", "key");
        assert_eq!(
            config.asset_url("my model"),
            "http://files.example.test/models/my%20model/?zip=true"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let bare = FileserverConfig::new("http://files.example.test", "key");
        let doubled = FileserverConfig::new("http://files.example.test//", "key");
        assert_eq!(bare.endpoint("/index.json"), "http://files.example.test/index.json");
        assert_eq!(doubled.endpoint("index.json"), "http://files.example.test/index.json");
    }

    #[test]
    fn test_asset_path_escapes_reserved_characters() {
        assert_eq!(FileserverConfig::asset_path("cat"), "models/cat/");
        assert_eq!(FileserverConfig::asset_path("a/b?c"), "models/a%2Fb%3Fc/");
    }
}
