use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ChunkerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = ChunkerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !dataset_id_regex().is_match(&normalized) {
            return Err(ChunkerError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeographyCode(String);

impl GeographyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for GeographyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeographyCode {
    type Err = ChunkerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !geography_code_regex().is_match(trimmed) {
            return Err(ChunkerError::InvalidGeographyCode(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeCategory {
    pub code: u32,
    pub label: String,
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRange {
    pub dataset_id: DatasetId,
    pub geo_range_start: GeographyCode,
    pub geo_range_end: GeographyCode,
    pub fields: Vec<String>,
    pub age_categories: Vec<AgeCategory>,
}

impl QueryRange {
    pub fn geography_expr(&self) -> String {
        format!("{}...{}", self.geo_range_start, self.geo_range_end)
    }

    pub fn age_param(&self) -> String {
        self.age_categories
            .iter()
            .map(|age| age.code.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn select_param(&self) -> String {
        self.fields.join(",")
    }

    pub fn data_url(&self, api_base: &str) -> String {
        format!(
            "{}/dataset/{}.data.csv?date=latest&geography={}&c_age={}&select={}",
            api_base.trim_end_matches('/'),
            self.dataset_id,
            self.geography_expr(),
            self.age_param(),
            self.select_param()
        )
    }
}

pub fn blob_name(chunk_index: u64, suffix: &str) -> String {
    format!("{chunk_index}_{suffix}.csv")
}

fn dataset_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^NM_\d+_\d+$").expect("dataset id pattern is valid"))
}

fn geography_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").expect("geography code pattern is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_uses_contiguous_range() {
        let query = QueryRange {
            dataset_id: "nm_2010_1".parse().unwrap(),
            geo_range_start: "E00000001".parse().unwrap(),
            geo_range_end: "W00010265".parse().unwrap(),
            fields: vec!["GEOGRAPHY_CODE".to_string(), "OBS_VALUE".to_string()],
            age_categories: vec![
                AgeCategory {
                    code: 201,
                    label: "Aged 0 to 15".to_string(),
                },
                AgeCategory {
                    code: 250,
                    label: "Aged 16 to 24".to_string(),
                },
            ],
        };

        assert_eq!(
            query.data_url("https://www.nomisweb.co.uk/api/v01/"),
            "https://www.nomisweb.co.uk/api/v01/dataset/NM_2010_1.data.csv?date=latest\
             &geography=E00000001...W00010265&c_age=201,250&select=GEOGRAPHY_CODE,OBS_VALUE"
        );
    }

    #[test]
    fn blob_names_are_indexed() {
        assert_eq!(blob_name(7, "CensusPop_LMA_ages"), "7_CensusPop_LMA_ages.csv");
    }
}
