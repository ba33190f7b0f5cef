use std::time::{Duration, Instant};

use chrono::Utc;
use csv::StringRecord;
use serde::Serialize;
use tracing::{info, warn};

use crate::accumulator::{Accumulator, ChunkBuffer};
use crate::config::ResolvedConfig;
use crate::domain::{GeographyCode, QueryRange};
use crate::error::ChunkerError;
use crate::fetcher::PagedFetcher;
use crate::geography::{GeographyResolver, ResolvedGeography};
use crate::nomis::NomisClient;
use crate::progress::{FileProgressStore, ProgressStore};
use crate::sink::SinkConnector;
use crate::uploader::ChunkUploader;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dataset_id: String,
    pub geography_query: String,
    pub resumed_from_chunk: Option<u64>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub chunks: Vec<ChunkSummary>,
    pub rows_written: u64,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub index: u64,
    pub blob: String,
    pub rows: usize,
    pub bytes: usize,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub dataset_id: String,
    pub levels: Vec<String>,
    pub code_count: usize,
    pub first_code: String,
    pub last_code: String,
    pub geography_query: String,
    pub data_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub progress_path: String,
    pub last_completed_chunk: Option<u64>,
    pub next_chunk: u64,
    pub next_offset: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResult {
    pub progress_path: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Fetch,
    Upload,
    Done,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct Pipeline<C: NomisClient> {
    config: ResolvedConfig,
    client: C,
}

impl<C: NomisClient> Pipeline<C> {
    pub fn new(config: ResolvedConfig, client: C) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn resolve_query(
        &self,
        sink: &dyn ProgressSink,
    ) -> Result<(ResolvedGeography, QueryRange), ChunkerError> {
        sink.event(ProgressEvent {
            phase: Phase::Resolve,
            message: format!(
                "resolving {} for {}",
                self.config.geography_levels.join(", "),
                self.config.dataset_id
            ),
            elapsed: None,
        });
        let geography = GeographyResolver::new(&self.client)
            .resolve(&self.config.dataset_id, &self.config.geography_levels)?;
        let query = query_for_codes(
            &self.config,
            geography.first().clone(),
            geography.last().clone(),
        );
        Ok((geography, query))
    }

    pub fn resolve(&self, sink: &dyn ProgressSink) -> Result<ResolveResult, ChunkerError> {
        let (geography, query) = self.resolve_query(sink)?;
        Ok(ResolveResult {
            dataset_id: self.config.dataset_id.to_string(),
            levels: self.config.geography_levels.clone(),
            code_count: geography.codes.len(),
            first_code: geography.first().to_string(),
            last_code: geography.last().to_string(),
            geography_query: query.geography_expr(),
            data_url: query.data_url(&self.config.api_base),
        })
    }

    pub fn run<K: SinkConnector, P: ProgressStore>(
        &self,
        connector: K,
        progress: &P,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, ChunkerError> {
        let started = Instant::now();
        let started_at = Utc::now().to_rfc3339();

        let (_, query) = self.resolve_query(sink)?;
        self.run_query(&query, connector, progress, sink)
            .map(|mut summary| {
                summary.started_at = started_at;
                summary.elapsed_secs = started.elapsed().as_secs_f64();
                summary
            })
    }
    pub fn run_query<K: SinkConnector, P: ProgressStore>(
        &self,
        query: &QueryRange,
        connector: K,
        progress: &P,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, ChunkerError> {
        let started = Instant::now();
        let started_at = Utc::now().to_rfc3339();
        let plan = self.config.plan;

        let resumed_from_chunk = progress.load()?;
        let mut chunk_index = resumed_from_chunk.map(|last| last + 1).unwrap_or(0);
        let start_offset = plan.resume_offset(chunk_index);
        if let Some(last) = resumed_from_chunk {
            warn!(
                last_completed_chunk = last,
                chunk_index,
                offset = start_offset,
                "resuming from progress file"
            );
        }
        info!(chunk_index, offset = start_offset, "starting");

        let fetcher = PagedFetcher::new(
            &self.client,
            query.data_url(&self.config.api_base),
            query.fields.clone(),
        );
        let mut uploader = ChunkUploader::connect(
            connector,
            self.config.retry,
            &query.fields,
            &self.config.blob_suffix,
        )?;
        let offset_column = query.fields.iter().position(|field| field == "RECORD_OFFSET");

        let mut accumulator = Accumulator::new(plan, start_offset);
        let mut offset = start_offset;
        let mut chunks = Vec::new();
        let mut rows_written = 0u64;

        loop {
            sink.event(ProgressEvent {
                phase: Phase::Fetch,
                message: format!("fetching offset {offset}"),
                elapsed: Some(started.elapsed()),
            });
            let page = fetcher.fetch(offset)?;
            if page.exhausted {
                info!(offset, "empty page, uploading final csv");
            }
            accumulator.push(page);

            if accumulator.ready() {
                let buffer = accumulator.buffer();
                log_chunk_bounds(chunk_index, offset, buffer, offset_column);
                sink.event(ProgressEvent {
                    phase: Phase::Upload,
                    message: format!("writing chunk {chunk_index} ({} rows)", buffer.len()),
                    elapsed: Some(started.elapsed()),
                });

                let receipt = uploader.upload(chunk_index, buffer)?;
                // Only after the blob is confirmed.
                progress.save(chunk_index)?;

                rows_written += receipt.rows as u64;
                chunks.push(ChunkSummary {
                    index: chunk_index,
                    blob: receipt.blob,
                    rows: receipt.rows,
                    bytes: receipt.bytes,
                    attempts: receipt.attempts,
                });
                chunk_index += 1;
                accumulator.clear();
            }

            if accumulator.is_exhausted() {
                break;
            }
            offset += plan.page_stride;
        }

        let elapsed = started.elapsed();
        sink.event(ProgressEvent {
            phase: Phase::Done,
            message: format!("{} chunks, {rows_written} rows", chunks.len()),
            elapsed: Some(elapsed),
        });
        info!(
            chunks = chunks.len(),
            rows = rows_written,
            elapsed_secs = elapsed.as_secs_f64(),
            "completion time for complete run"
        );

        Ok(RunSummary {
            dataset_id: query.dataset_id.to_string(),
            geography_query: query.geography_expr(),
            resumed_from_chunk,
            start_offset,
            end_offset: offset,
            chunks,
            rows_written,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            elapsed_secs: elapsed.as_secs_f64(),
        })
    }
}

pub fn status(config: &ResolvedConfig, store: &FileProgressStore) -> Result<StatusResult, ChunkerError> {
    let last_completed_chunk = store.load()?;
    let next_chunk = last_completed_chunk.map(|last| last + 1).unwrap_or(0);
    Ok(StatusResult {
        progress_path: store.path().to_string(),
        last_completed_chunk,
        next_chunk,
        next_offset: config.plan.resume_offset(next_chunk),
    })
}

pub fn reset(store: &FileProgressStore) -> Result<ResetResult, ChunkerError> {
    let removed = store.clear()?;
    if removed {
        info!(path = %store.path(), "progress file removed");
    }
    Ok(ResetResult {
        progress_path: store.path().to_string(),
        removed,
    })
}

pub fn query_for_codes(
    config: &ResolvedConfig,
    first: GeographyCode,
    last: GeographyCode,
) -> QueryRange {
    QueryRange {
        dataset_id: config.dataset_id.clone(),
        geo_range_start: first,
        geo_range_end: last,
        fields: config.fields.clone(),
        age_categories: config.age_categories.clone(),
    }
}

fn log_chunk_bounds(
    chunk_index: u64,
    offset: u64,
    buffer: &ChunkBuffer,
    offset_column: Option<usize>,
) {
    let cell = |row: Option<&StringRecord>| {
        offset_column
            .and_then(|column| row.and_then(|row| row.get(column)))
            .map(str::to_string)
    };
    info!(
        chunk_index,
        offset,
        rows = buffer.len(),
        first_record_offset = ?cell(buffer.rows.first()),
        last_record_offset = ?cell(buffer.rows.last()),
        "starting write"
    );
}
