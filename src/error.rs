use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ChunkerError {
    #[error("configuration error: {0}")]
    #[diagnostic(help("check the geography levels and numeric settings in census-chunker.json"))]
    Configuration(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("invalid geography code: {0}")]
    InvalidGeographyCode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NOMIS request failed: {0}")]
    Fetch(String),

    #[error("NOMIS returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("failed to decode CSV page: {0}")]
    Csv(String),

    #[error("storage request failed: {0}")]
    Storage(String),

    #[error("storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("failed on all {attempts} attempts, could not write output {blob}")]
    #[diagnostic(help("chunks before this one are recorded in the progress file; rerun to resume"))]
    UploadExhausted {
        blob: String,
        attempts: u32,
        #[source]
        source: Box<ChunkerError>,
    },

    #[error("progress file error: {0}")]
    Progress(String),
}

impl ChunkerError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ChunkerError::Fetch(_)
                | ChunkerError::FetchStatus { .. }
                | ChunkerError::Storage(_)
                | ChunkerError::StorageStatus { .. }
                | ChunkerError::UploadExhausted { .. }
        )
    }
}
