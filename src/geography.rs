use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::domain::{DatasetId, GeographyCode};
use crate::error::ChunkerError;
use crate::nomis::{NomisClient, SdmxCode, SdmxDocument};

const TYPE_NAME_ANNOTATION: &str = "TypeName";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentGeography {
    pub level: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedGeography {
    pub parents: Vec<ParentGeography>,
    pub codes: Vec<GeographyCode>,
}

impl ResolvedGeography {
    pub fn first(&self) -> &GeographyCode {
        &self.codes[0]
    }

    pub fn last(&self) -> &GeographyCode {
        &self.codes[self.codes.len() - 1]
    }

    // NOMIS takes contiguous ranges only, so every code between the first and
    // last one is queried whether or not it was discovered here.
    pub fn range_expr(&self) -> String {
        format!("{}...{}", self.first(), self.last())
    }
}

pub struct GeographyResolver<'a, C: NomisClient> {
    client: &'a C,
}

impl<'a, C: NomisClient> GeographyResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn resolve(
        &self,
        dataset: &DatasetId,
        levels: &[String],
    ) -> Result<ResolvedGeography, ChunkerError> {
        let definition = self.client.geography_definition(dataset)?;
        let parents = select_parents(&definition, levels)?;
        info!(
            dataset = %dataset,
            parents = ?parents,
            "geographies selected"
        );

        let mut codes = BTreeSet::new();
        for parent in &parents {
            let children = self.client.geography_children(dataset, &parent.code)?;
            for code in child_codes(&children, &parent.level)? {
                codes.insert(code);
            }
        }

        let codes: Vec<GeographyCode> = codes.into_iter().collect();
        if codes.is_empty() {
            return Err(ChunkerError::DataIntegrity(format!(
                "no child geographies returned for {}",
                levels.join(", ")
            )));
        }
        check_fixed_width(&codes)?;

        let resolved = ResolvedGeography { parents, codes };
        info!(
            unique_codes = resolved.codes.len(),
            first_five = ?head(&resolved.codes),
            last_five = ?tail(&resolved.codes),
            range = %resolved.range_expr(),
            "geography range resolved"
        );
        Ok(resolved)
    }
}

pub fn select_parents(
    definition: &SdmxDocument,
    levels: &[String],
) -> Result<Vec<ParentGeography>, ChunkerError> {
    let codelist = definition
        .structure
        .codelists
        .codelist
        .first()
        .ok_or_else(|| {
            ChunkerError::DataIntegrity("geography definition has no codelist".to_string())
        })?;

    let mut found = Vec::new();
    for level in levels {
        let matches: Vec<&SdmxCode> = codelist
            .code
            .iter()
            .filter(|code| code.description_text() == Some(level.as_str()))
            .collect();
        match matches.as_slice() {
            [single] => found.push(ParentGeography {
                level: level.clone(),
                code: single.value_text(),
            }),
            [] => {
                return Err(ChunkerError::Configuration(format!(
                    "geography level {level:?} not found in dataset definition"
                )));
            }
            many => {
                return Err(ChunkerError::Configuration(format!(
                    "geography level {level:?} is ambiguous: {} codes match",
                    many.len()
                )));
            }
        }
    }

    if found.len() != levels.len() {
        return Err(ChunkerError::Configuration(format!(
            "wanted {} geographies, found {}",
            levels.len(),
            found.len()
        )));
    }
    Ok(found)
}

pub fn child_codes(
    children: &SdmxDocument,
    level: &str,
) -> Result<Vec<GeographyCode>, ChunkerError> {
    let codelists = &children.structure.codelists.codelist;
    if codelists.len() != 1 {
        return Err(ChunkerError::DataIntegrity(format!(
            "expected exactly one codelist under {level:?}, got {}",
            codelists.len()
        )));
    }

    codelists[0]
        .code
        .iter()
        .map(|child| {
            let area = child.annotation(TYPE_NAME_ANNOTATION).ok_or_else(|| {
                ChunkerError::DataIntegrity(format!(
                    "child geography {} has no {TYPE_NAME_ANNOTATION} annotation",
                    child.value_text()
                ))
            })?;
            if area != level {
                return Err(ChunkerError::DataIntegrity(format!(
                    "this is supposed to be {level}, got {area} (code {})",
                    child.value_text()
                )));
            }
            let code = child.description_text().ok_or_else(|| {
                ChunkerError::DataIntegrity(format!(
                    "child geography {} has no description",
                    child.value_text()
                ))
            })?;
            code.parse::<GeographyCode>()
                .map_err(|_| ChunkerError::DataIntegrity(format!("malformed geography code {code:?}")))
        })
        .collect()
}

fn check_fixed_width(codes: &[GeographyCode]) -> Result<(), ChunkerError> {
    let width = codes[0].width();
    if let Some(odd) = codes.iter().find(|code| code.width() != width) {
        return Err(ChunkerError::DataIntegrity(format!(
            "geography codes are not fixed width: {} vs {}",
            codes[0], odd
        )));
    }
    Ok(())
}

fn head(codes: &[GeographyCode]) -> Vec<&str> {
    codes.iter().take(5).map(GeographyCode::as_str).collect()
}

fn tail(codes: &[GeographyCode]) -> Vec<&str> {
    let skip = codes.len().saturating_sub(5);
    codes.iter().skip(skip).map(GeographyCode::as_str).collect()
}
