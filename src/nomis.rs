use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::DatasetId;
use crate::error::ChunkerError;

#[derive(Debug, Clone, Deserialize)]
pub struct SdmxDocument {
    pub structure: SdmxStructure,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdmxStructure {
    #[serde(default)]
    pub codelists: SdmxCodelists,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SdmxCodelists {
    #[serde(default)]
    pub codelist: Vec<SdmxCodelist>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SdmxCodelist {
    #[serde(default)]
    pub code: Vec<SdmxCode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdmxCode {
    pub value: Value,
    #[serde(default)]
    pub description: Option<SdmxText>,
    #[serde(default)]
    pub annotations: Option<SdmxAnnotations>,
    #[serde(default)]
    pub parentcode: Option<Value>,
}

impl SdmxCode {
    pub fn value_text(&self) -> String {
        value_text(&self.value)
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_ref().map(|text| text.value.as_str())
    }

    pub fn annotation(&self, title: &str) -> Option<String> {
        self.annotations
            .as_ref()?
            .annotation
            .iter()
            .find(|annotation| annotation.annotationtitle == title)
            .map(|annotation| value_text(&annotation.annotationtext))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdmxText {
    pub value: String,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SdmxAnnotations {
    #[serde(default)]
    pub annotation: Vec<SdmxAnnotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdmxAnnotation {
    pub annotationtitle: String,
    pub annotationtext: Value,
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub type CsvBody = Box<dyn Read + Send>;

pub trait NomisClient: Send + Sync {
    fn geography_definition(&self, dataset: &DatasetId) -> Result<SdmxDocument, ChunkerError>;
    fn geography_children(
        &self,
        dataset: &DatasetId,
        parent_code: &str,
    ) -> Result<SdmxDocument, ChunkerError>;
    fn open_csv(&self, url: &str) -> Result<CsvBody, ChunkerError>;
}

#[derive(Clone)]
pub struct NomisHttpClient {
    client: Client,
    base_url: String,
}

impl NomisHttpClient {
    pub fn new(base_url: &str) -> Result<Self, ChunkerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("census-chunker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ChunkerError::Fetch(err.to_string()))?,
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        // Pages of 25k rows can take minutes to stream.
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| ChunkerError::Fetch(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> Result<Response, ChunkerError> {
        debug!(url, "NOMIS request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ChunkerError::Fetch(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NOMIS request failed".to_string());
            return Err(ChunkerError::FetchStatus { status, message });
        }
        Ok(response)
    }

    fn get_sdmx(&self, url: &str) -> Result<SdmxDocument, ChunkerError> {
        let body = read_body(self.get(url)?)?;
        serde_json::from_reader(body).map_err(|err| {
            ChunkerError::DataIntegrity(format!("malformed SDMX document from {url}: {err}"))
        })
    }
}

impl NomisClient for NomisHttpClient {
    fn geography_definition(&self, dataset: &DatasetId) -> Result<SdmxDocument, ChunkerError> {
        let url = format!(
            "{}/dataset/{}/geography.def.sdmx.json",
            self.base_url, dataset
        );
        self.get_sdmx(&url)
    }

    fn geography_children(
        &self,
        dataset: &DatasetId,
        parent_code: &str,
    ) -> Result<SdmxDocument, ChunkerError> {
        let url = format!(
            "{}/dataset/{}/geography/{}.def.sdmx.json",
            self.base_url, dataset, parent_code
        );
        self.get_sdmx(&url)
    }

    fn open_csv(&self, url: &str) -> Result<CsvBody, ChunkerError> {
        read_body(self.get(url)?)
    }
}

fn read_body(response: Response) -> Result<CsvBody, ChunkerError> {
    let gzipped = response
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);
    if gzipped {
        Ok(Box::new(GzDecoder::new(response)))
    } else {
        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_child_code_with_numeric_annotation() {
        let raw = r#"{
            "structure": {
                "codelists": {
                    "codelist": [{
                        "code": [{
                            "annotations": {
                                "annotation": [
                                    {"annotationtext": "2011 output areas", "annotationtitle": "TypeName"},
                                    {"annotationtext": 299, "annotationtitle": "TypeCode"},
                                    {"annotationtext": "E00174208", "annotationtitle": "GeogCode"}
                                ]
                            },
                            "parentcode": 1228931073,
                            "description": {"value": "E00174208", "lang": "en"},
                            "value": 1254265842
                        }]
                    }]
                }
            }
        }"#;
        let doc: SdmxDocument = serde_json::from_str(raw).unwrap();
        let code = &doc.structure.codelists.codelist[0].code[0];
        assert_eq!(code.value_text(), "1254265842");
        assert_eq!(code.description_text(), Some("E00174208"));
        assert_eq!(code.annotation("TypeName").as_deref(), Some("2011 output areas"));
        assert_eq!(code.annotation("TypeCode").as_deref(), Some("299"));
        assert_eq!(code.annotation("Missing"), None);
    }
}
