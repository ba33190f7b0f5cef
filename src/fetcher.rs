use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::error::ChunkerError;
use crate::nomis::NomisClient;

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub offset: u64,
    pub rows: Vec<StringRecord>,
    pub exhausted: bool,
}

pub struct PagedFetcher<'a, C: NomisClient> {
    client: &'a C,
    data_url: String,
    fields: Vec<String>,
}

impl<'a, C: NomisClient> PagedFetcher<'a, C> {
    pub fn new(client: &'a C, data_url: String, fields: Vec<String>) -> Self {
        Self {
            client,
            data_url,
            fields,
        }
    }

    pub fn page_url(&self, offset: u64) -> String {
        format!("{}&RecordOffset={offset}", self.data_url)
    }

    pub fn fetch(&self, offset: u64) -> Result<Page, ChunkerError> {
        let url = self.page_url(offset);
        let body = self.client.open_csv(&url)?;
        let rows = decode_rows(body, &self.fields)?;
        debug!(offset, rows = rows.len(), "page fetched");
        Ok(Page {
            offset,
            exhausted: rows.is_empty(),
            rows,
        })
    }
}

pub fn decode_rows<R: Read>(body: R, fields: &[String]) -> Result<Vec<StringRecord>, ChunkerError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(body);

    let headers = reader
        .headers()
        .map_err(page_error)?
        .clone();
    // An empty body has no header row at all.
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    if !headers.iter().eq(fields.iter().map(String::as_str)) {
        return Err(ChunkerError::DataIntegrity(format!(
            "page columns {:?} do not match requested fields {:?}",
            headers.iter().collect::<Vec<_>>(),
            fields
        )));
    }

    reader
        .records()
        .map(|record| record.map_err(page_error))
        .collect()
}

// The body is streamed, so a dropped connection surfaces as a csv io error.
fn page_error(err: csv::Error) -> ChunkerError {
    if err.is_io_error() {
        ChunkerError::Fetch(err.to_string())
    } else {
        ChunkerError::Csv(err.to_string())
    }
}
