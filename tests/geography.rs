use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;

use census_chunker::domain::DatasetId;
use census_chunker::error::ChunkerError;
use census_chunker::geography::GeographyResolver;
use census_chunker::nomis::{CsvBody, NomisClient, SdmxDocument};

struct FixtureNomis {
    definition: String,
    children: HashMap<String, String>,
    child_calls: Mutex<Vec<String>>,
}

impl FixtureNomis {
    fn new(definition: &str, children: &[(&str, &str)]) -> Self {
        Self {
            definition: definition.to_string(),
            children: children
                .iter()
                .map(|(code, body)| (code.to_string(), body.to_string()))
                .collect(),
            child_calls: Mutex::new(Vec::new()),
        }
    }

    fn standard() -> Self {
        Self::new(
            &fs::read_to_string("tests/fixtures/geography_def.json").unwrap(),
            &[(
                "TYPE299",
                &fs::read_to_string("tests/fixtures/geography_children_TYPE299.json").unwrap(),
            )],
        )
    }
}

impl NomisClient for FixtureNomis {
    fn geography_definition(&self, _dataset: &DatasetId) -> Result<SdmxDocument, ChunkerError> {
        Ok(serde_json::from_str(&self.definition).unwrap())
    }

    fn geography_children(
        &self,
        _dataset: &DatasetId,
        parent_code: &str,
    ) -> Result<SdmxDocument, ChunkerError> {
        self.child_calls.lock().unwrap().push(parent_code.to_string());
        let body = self
            .children
            .get(parent_code)
            .ok_or_else(|| ChunkerError::FetchStatus {
                status: 404,
                message: parent_code.to_string(),
            })?;
        Ok(serde_json::from_str(body).unwrap())
    }

    fn open_csv(&self, _url: &str) -> Result<CsvBody, ChunkerError> {
        Err(ChunkerError::Fetch("not used".to_string()))
    }
}

fn dataset() -> DatasetId {
    "NM_2010_1".parse().unwrap()
}

fn levels(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn child(code: &str, type_name: &str) -> String {
    format!(
        r#"{{"annotations": {{"annotation": [{{"annotationtext": "{type_name}", "annotationtitle": "TypeName"}}]}},
            "description": {{"value": "{code}"}}, "value": 1}}"#
    )
}

fn children_doc(children: &[String]) -> String {
    format!(
        r#"{{"structure": {{"codelists": {{"codelist": [{{"code": [{}]}}]}}}}}}"#,
        children.join(",")
    )
}

#[test]
fn resolves_sorted_unique_codes() {
    let nomis = FixtureNomis::standard();
    let resolved = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 output areas"]))
        .unwrap();

    let codes: Vec<&str> = resolved.codes.iter().map(|code| code.as_str()).collect();
    assert_eq!(codes, vec!["E00000001", "E00000003", "E00174208", "W00010265"]);
    assert_eq!(resolved.first().as_str(), "E00000001");
    assert_eq!(resolved.last().as_str(), "W00010265");
    assert_eq!(resolved.range_expr(), "E00000001...W00010265");
    assert_eq!(resolved.parents[0].code, "TYPE299");
    assert_eq!(*nomis.child_calls.lock().unwrap(), vec!["TYPE299"]);
}

#[test]
fn returns_exactly_the_children_of_one_parent() {
    let children: Vec<String> = (0..25)
        .rev()
        .map(|i| child(&format!("E{:08}", i * 7), "2011 output areas"))
        .collect();
    let definition = fs::read_to_string("tests/fixtures/geography_def.json").unwrap();
    let nomis = FixtureNomis::new(&definition, &[("TYPE299", &children_doc(&children))]);

    let resolved = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 output areas"]))
        .unwrap();

    let expected: Vec<String> = (0..25).map(|i| format!("E{:08}", i * 7)).collect();
    let codes: Vec<String> = resolved.codes.iter().map(|code| code.to_string()).collect();
    assert_eq!(codes, expected);
    assert_eq!(resolved.range_expr(), "E00000000...E00000168");
}

#[test]
fn unknown_level_is_configuration_error() {
    let nomis = FixtureNomis::standard();
    let err = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 Output Areas"]))
        .unwrap_err();
    assert_matches!(err, ChunkerError::Configuration(_));
    assert!(nomis.child_calls.lock().unwrap().is_empty());
}

#[test]
fn ambiguous_level_is_configuration_error() {
    let definition = r#"{"structure": {"codelists": {"codelist": [{"code": [
        {"description": {"value": "2011 output areas"}, "value": "TYPE299"},
        {"description": {"value": "2011 output areas"}, "value": "TYPE300"}
    ]}]}}}"#;
    let nomis = FixtureNomis::new(definition, &[]);
    let err = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 output areas"]))
        .unwrap_err();
    assert_matches!(err, ChunkerError::Configuration(_));
}

#[test]
fn mixed_hierarchy_is_data_integrity_error() {
    let children = vec![
        child("E00000001", "2011 output areas"),
        child("E01000001", "2011 super output areas - lower layer"),
    ];
    let definition = fs::read_to_string("tests/fixtures/geography_def.json").unwrap();
    let nomis = FixtureNomis::new(&definition, &[("TYPE299", &children_doc(&children))]);
    let err = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 output areas"]))
        .unwrap_err();
    assert_matches!(err, ChunkerError::DataIntegrity(_));
}

#[test]
fn multiple_codelists_is_data_integrity_error() {
    let body = format!(
        r#"{{"structure": {{"codelists": {{"codelist": [{{"code": [{}]}}, {{"code": []}}]}}}}}}"#,
        child("E00000001", "2011 output areas")
    );
    let definition = fs::read_to_string("tests/fixtures/geography_def.json").unwrap();
    let nomis = FixtureNomis::new(&definition, &[("TYPE299", &body)]);
    let err = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 output areas"]))
        .unwrap_err();
    assert_matches!(err, ChunkerError::DataIntegrity(_));
}

#[test]
fn mixed_code_widths_are_rejected() {
    let children = vec![
        child("E00000001", "2011 output areas"),
        child("E0000002", "2011 output areas"),
    ];
    let definition = fs::read_to_string("tests/fixtures/geography_def.json").unwrap();
    let nomis = FixtureNomis::new(&definition, &[("TYPE299", &children_doc(&children))]);
    let err = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["2011 output areas"]))
        .unwrap_err();
    assert_matches!(err, ChunkerError::DataIntegrity(_));
}

#[test]
fn several_levels_are_merged() {
    let definition = fs::read_to_string("tests/fixtures/geography_def.json").unwrap();
    let output_areas = children_doc(&[child("E00000009", "2011 output areas")]);
    let countries = children_doc(&[
        child("E92000001", "countries"),
        child("W92000004", "countries"),
    ]);
    let nomis = FixtureNomis::new(
        &definition,
        &[("TYPE299", &output_areas), ("TYPE499", &countries)],
    );

    let resolved = GeographyResolver::new(&nomis)
        .resolve(&dataset(), &levels(&["countries", "2011 output areas"]))
        .unwrap();
    assert_eq!(resolved.codes.len(), 3);
    assert_eq!(resolved.range_expr(), "E00000009...W92000004");
    assert_eq!(*nomis.child_calls.lock().unwrap(), vec!["TYPE499", "TYPE299"]);
}
