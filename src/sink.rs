use std::fs;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::{DEFAULT_TOKEN_ENV, SinkConfig};
use crate::error::ChunkerError;

pub const CSV_CONTENT_TYPE: &str = "text/csv";
const GCS_ENDPOINT: &str = "https://storage.googleapis.com";
pub trait BlobSink {
    fn put(&mut self, name: &str, body: &[u8], content_type: &str) -> Result<(), ChunkerError>;
}
pub trait SinkConnector {
    type Sink: BlobSink;

    fn describe(&self) -> String;
    fn connect(&self) -> Result<Self::Sink, ChunkerError>;
}

#[derive(Debug, Clone)]
pub struct GcsConnector {
    bucket: String,
    token_env: String,
    endpoint: String,
}

impl GcsConnector {
    pub fn new(bucket: &str, token_env: Option<&str>, endpoint: Option<&str>) -> Self {
        Self {
            bucket: bucket.to_string(),
            token_env: token_env.unwrap_or(DEFAULT_TOKEN_ENV).to_string(),
            endpoint: endpoint
                .unwrap_or(GCS_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

impl SinkConnector for GcsConnector {
    type Sink = GcsSink;

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    fn connect(&self) -> Result<GcsSink, ChunkerError> {
        // Tokens are short-lived; re-read on every reconnect.
        let token = std::env::var(&self.token_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ChunkerError::Storage(format!(
                    "unable to get storage client: {} is not set; export an OAuth2 access token \
                     with storage write scope (e.g. `gcloud auth print-access-token`) or set \
                     sink.token_env to the variable that holds one",
                    self.token_env
                ))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("census-chunker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ChunkerError::Storage(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| ChunkerError::Storage(err.to_string()))?;

        let bucket_url = format!("{}/storage/v1/b/{}", self.endpoint, self.bucket);
        let response = client
            .get(&bucket_url)
            .bearer_auth(&token)
            .send()
            .map_err(|err| ChunkerError::Storage(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "bucket lookup failed".to_string());
            return Err(ChunkerError::StorageStatus { status, message });
        }
        debug!(bucket = %self.bucket, "storage bucket ready");

        Ok(GcsSink {
            client,
            token,
            upload_url: format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket),
        })
    }
}

pub struct GcsSink {
    client: Client,
    token: String,
    upload_url: String,
}

impl BlobSink for GcsSink {
    fn put(&mut self, name: &str, body: &[u8], content_type: &str) -> Result<(), ChunkerError> {
        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("uploadType", "media"), ("name", name)])
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type)
            .body(body.to_vec())
            .send()
            .map_err(|err| ChunkerError::Storage(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "upload failed".to_string());
            return Err(ChunkerError::StorageStatus { status, message });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LocalDirConnector {
    root: Utf8PathBuf,
}

impl LocalDirConnector {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SinkConnector for LocalDirConnector {
    type Sink = LocalDirSink;

    fn describe(&self) -> String {
        format!("file://{}", self.root)
    }

    fn connect(&self) -> Result<LocalDirSink, ChunkerError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| ChunkerError::Storage(format!("create {}: {err}", self.root)))?;
        Ok(LocalDirSink {
            root: self.root.clone(),
        })
    }
}

pub struct LocalDirSink {
    root: Utf8PathBuf,
}

impl LocalDirSink {
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl BlobSink for LocalDirSink {
    fn put(&mut self, name: &str, body: &[u8], _content_type: &str) -> Result<(), ChunkerError> {
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(ChunkerError::Storage(format!("invalid blob name {name:?}")));
        }
        let mut temp = tempfile::Builder::new()
            .prefix("census-chunker-blob")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| ChunkerError::Storage(err.to_string()))?;
        temp.write_all(body)
            .map_err(|err| ChunkerError::Storage(err.to_string()))?;
        temp.persist(self.root.join(name).as_std_path())
            .map_err(|err| ChunkerError::Storage(err.to_string()))?;
        Ok(())
    }
}
#[derive(Debug, Clone)]
pub enum ConfiguredConnector {
    Gcs(GcsConnector),
    Local(LocalDirConnector),
}

impl ConfiguredConnector {
    pub fn from_config(config: &SinkConfig) -> Self {
        match config {
            SinkConfig::Gcs {
                bucket,
                token_env,
                endpoint,
            } => ConfiguredConnector::Gcs(GcsConnector::new(
                bucket,
                token_env.as_deref(),
                endpoint.as_deref(),
            )),
            SinkConfig::Local { root } => {
                ConfiguredConnector::Local(LocalDirConnector::new(root.as_str()))
            }
        }
    }
}

pub enum ConfiguredSink {
    Gcs(GcsSink),
    Local(LocalDirSink),
}

impl BlobSink for ConfiguredSink {
    fn put(&mut self, name: &str, body: &[u8], content_type: &str) -> Result<(), ChunkerError> {
        match self {
            ConfiguredSink::Gcs(sink) => sink.put(name, body, content_type),
            ConfiguredSink::Local(sink) => sink.put(name, body, content_type),
        }
    }
}

impl SinkConnector for ConfiguredConnector {
    type Sink = ConfiguredSink;

    fn describe(&self) -> String {
        match self {
            ConfiguredConnector::Gcs(connector) => connector.describe(),
            ConfiguredConnector::Local(connector) => connector.describe(),
        }
    }

    fn connect(&self) -> Result<ConfiguredSink, ChunkerError> {
        match self {
            ConfiguredConnector::Gcs(connector) => connector.connect().map(ConfiguredSink::Gcs),
            ConfiguredConnector::Local(connector) => {
                connector.connect().map(ConfiguredSink::Local)
            }
        }
    }
}
