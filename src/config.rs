use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{AgeCategory, DatasetId};
use crate::error::ChunkerError;

pub const DEFAULT_CONFIG_FILE: &str = "census-chunker.json";
pub const DEFAULT_API_BASE: &str = "https://www.nomisweb.co.uk/api/v01";
pub const DEFAULT_DATASET_ID: &str = "NM_2010_1";
pub const DEFAULT_GEOGRAPHY_LEVEL: &str = "2011 output areas";
pub const DEFAULT_CHUNK_ROW_THRESHOLD: u64 = 500_000;
pub const DEFAULT_PAGE_STRIDE: u64 = 25_000;
pub const DEFAULT_MAX_UPLOAD_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_UNIT_SECS: u64 = 10;
pub const DEFAULT_BLOB_SUFFIX: &str = "CensusPop_LMA_ages";
pub const DEFAULT_PROGRESS_PATH: &str = "progress.txt";
pub const DEFAULT_BUCKET: &str = "pipeline-stream-population-estimates";
pub const DEFAULT_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub geography_levels: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub age_categories: Option<Vec<AgeCategory>>,
    #[serde(default)]
    pub chunk_row_threshold: Option<u64>,
    #[serde(default)]
    pub page_stride: Option<u64>,
    #[serde(default)]
    pub max_upload_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_unit_secs: Option<u64>,
    #[serde(default)]
    pub blob_suffix: Option<String>,
    #[serde(default)]
    pub progress_path: Option<String>,
    #[serde(default)]
    pub sink: Option<SinkConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Gcs {
        bucket: String,
        #[serde(default)]
        token_env: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
    Local {
        root: String,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Gcs {
            bucket: DEFAULT_BUCKET.to_string(),
            token_env: None,
            endpoint: None,
        }
    }
}

// The threshold is a whole number of strides, so chunk
// `k` covers offsets `[k * threshold, (k + 1) * threshold)` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_row_threshold: u64,
    pub page_stride: u64,
}

impl ChunkPlan {
    pub fn new(chunk_row_threshold: u64, page_stride: u64) -> Result<Self, ChunkerError> {
        if page_stride == 0 {
            return Err(ChunkerError::Configuration(
                "page_stride must be greater than zero".to_string(),
            ));
        }
        if chunk_row_threshold < page_stride || chunk_row_threshold % page_stride != 0 {
            return Err(ChunkerError::Configuration(format!(
                "chunk_row_threshold ({chunk_row_threshold}) must be a positive multiple of page_stride ({page_stride})"
            )));
        }
        Ok(Self {
            chunk_row_threshold,
            page_stride,
        })
    }

    pub fn resume_offset(&self, chunk_index: u64) -> u64 {
        chunk_index * self.chunk_row_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub api_base: String,
    pub dataset_id: DatasetId,
    pub geography_levels: Vec<String>,
    pub fields: Vec<String>,
    pub age_categories: Vec<AgeCategory>,
    pub plan: ChunkPlan,
    pub retry: RetryPolicy,
    pub blob_suffix: String,
    pub progress_path: Utf8PathBuf,
    pub sink: SinkConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ChunkerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ChunkerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ChunkerError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ChunkerError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let dataset_id: DatasetId = config
            .dataset_id
            .as_deref()
            .unwrap_or(DEFAULT_DATASET_ID)
            .parse()?;

        let geography_levels = config
            .geography_levels
            .unwrap_or_else(|| vec![DEFAULT_GEOGRAPHY_LEVEL.to_string()]);
        if geography_levels.is_empty() {
            return Err(ChunkerError::Configuration(
                "at least one geography level is required".to_string(),
            ));
        }

        let fields = config.fields.unwrap_or_else(default_fields);
        if fields.is_empty() || fields.iter().any(|field| field.trim().is_empty()) {
            return Err(ChunkerError::Configuration(
                "field list must be non-empty and contain no blank names".to_string(),
            ));
        }

        let age_categories = config.age_categories.unwrap_or_else(default_age_categories);
        if age_categories.is_empty() {
            return Err(ChunkerError::Configuration(
                "at least one age category is required".to_string(),
            ));
        }

        let plan = ChunkPlan::new(
            config
                .chunk_row_threshold
                .unwrap_or(DEFAULT_CHUNK_ROW_THRESHOLD),
            config.page_stride.unwrap_or(DEFAULT_PAGE_STRIDE),
        )?;

        let max_attempts = config
            .max_upload_attempts
            .unwrap_or(DEFAULT_MAX_UPLOAD_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ChunkerError::Configuration(
                "max_upload_attempts must be at least 1".to_string(),
            ));
        }
        let retry = RetryPolicy {
            max_attempts,
            backoff_unit: Duration::from_secs(
                config.backoff_unit_secs.unwrap_or(DEFAULT_BACKOFF_UNIT_SECS),
            ),
        };

        let blob_suffix = config
            .blob_suffix
            .unwrap_or_else(|| DEFAULT_BLOB_SUFFIX.to_string());
        if blob_suffix.is_empty() || blob_suffix.contains('/') {
            return Err(ChunkerError::Configuration(format!(
                "invalid blob suffix: {blob_suffix:?}"
            )));
        }

        Ok(ResolvedConfig {
            schema_version,
            api_base: config
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            dataset_id,
            geography_levels,
            fields,
            age_categories,
            plan,
            retry,
            blob_suffix,
            progress_path: Utf8PathBuf::from(
                config
                    .progress_path
                    .unwrap_or_else(|| DEFAULT_PROGRESS_PATH.to_string()),
            ),
            sink: config.sink.unwrap_or_default(),
        })
    }
}

pub fn default_fields() -> Vec<String> {
    [
        "DATE",
        "DATE_NAME",
        "DATE_CODE",
        "DATE_TYPE",
        "DATE_TYPECODE",
        "DATE_SORTORDER",
        "GEOGRAPHY",
        "GEOGRAPHY_NAME",
        "GEOGRAPHY_CODE",
        "GEOGRAPHY_TYPE",
        "GEOGRAPHY_TYPECODE",
        "GEOGRAPHY_SORTORDER",
        "GENDER",
        "GENDER_NAME",
        "GENDER_CODE",
        "GENDER_TYPE",
        "GENDER_TYPECODE",
        "GENDER_SORTORDER",
        "C_AGE",
        "C_AGE_NAME",
        "C_AGE_CODE",
        "C_AGE_TYPE",
        "C_AGE_TYPECODE",
        "C_AGE_SORTORDER",
        "MEASURES",
        "MEASURES_NAME",
        "OBS_VALUE",
        "OBS_STATUS",
        "OBS_STATUS_NAME",
        "OBS_CONF",
        "OBS_CONF_NAME",
        "URN",
        "RECORD_OFFSET",
        "RECORD_COUNT",
    ]
    .iter()
    .map(|field| field.to_string())
    .collect()
}

pub fn default_age_categories() -> Vec<AgeCategory> {
    [
        (201, "Aged 0 to 15"),
        (202, "Aged 16+"),
        (203, "Aged 16 to 64"),
        (250, "Aged 16 to 24"),
        (204, "Aged 16 to 17"),
        (205, "Aged 18 to 24"),
        (206, "Aged 18 to 21"),
        (207, "Aged 25 to 49"),
        (208, "Aged 50 to 64"),
        (209, "Aged 65+"),
    ]
    .iter()
    .map(|(code, label)| AgeCategory {
        code: *code,
        label: label.to_string(),
    })
    .collect()
}
