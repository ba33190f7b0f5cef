use assert_matches::assert_matches;

use census_chunker::domain::{DatasetId, GeographyCode, blob_name};
use census_chunker::error::ChunkerError;

#[test]
fn parse_dataset_id_valid() {
    let id: DatasetId = " nm_2010_1 ".parse().unwrap();
    assert_eq!(id.as_str(), "NM_2010_1");
}

#[test]
fn parse_dataset_id_invalid() {
    let err = "NM2010".parse::<DatasetId>().unwrap_err();
    assert_matches!(err, ChunkerError::InvalidDatasetId(_));
}

#[test]
fn geography_codes_sort_lexicographically() {
    let mut codes: Vec<GeographyCode> = ["W00010265", "E00174208", "E00000001"]
        .iter()
        .map(|code| code.parse().unwrap())
        .collect();
    codes.sort();
    assert_eq!(codes[0].as_str(), "E00000001");
    assert_eq!(codes[2].as_str(), "W00010265");
    assert_eq!(codes[0].width(), 9);
}

#[test]
fn parse_geography_code_invalid() {
    let err = "E00-0001".parse::<GeographyCode>().unwrap_err();
    assert_matches!(err, ChunkerError::InvalidGeographyCode(_));
}

#[test]
fn blob_name_format() {
    assert_eq!(blob_name(0, "CensusPop_LMA_ages"), "0_CensusPop_LMA_ages.csv");
}
