use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{ProgressEvent, ProgressSink, ResetResult, ResolveResult, RunSummary, StatusResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_resolve(result: &ResolveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reset(result: &ResetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "[{:?} +{:.1}s] {}",
                event.phase,
                elapsed.as_secs_f64(),
                event.message
            ),
            None => eprintln!("[{:?}] {}", event.phase, event.message),
        }
    }
}

pub fn print_run_summary(result: &RunSummary) {
    println!("dataset:        {}", result.dataset_id);
    println!("geography:      {}", result.geography_query);
    if let Some(last) = result.resumed_from_chunk {
        println!("resumed after:  chunk {last}");
    }
    println!(
        "offsets:        {} .. {}",
        result.start_offset, result.end_offset
    );
    for chunk in &result.chunks {
        println!(
            "  {} rows={} bytes={} attempts={}",
            chunk.blob, chunk.rows, chunk.bytes, chunk.attempts
        );
    }
    println!("rows written:   {}", result.rows_written);
    println!("elapsed:        {:.1}s", result.elapsed_secs);
}

pub fn print_resolve_summary(result: &ResolveResult) {
    println!("dataset:        {}", result.dataset_id);
    println!("levels:         {}", result.levels.join(", "));
    println!("unique codes:   {}", result.code_count);
    println!("query range:    {}", result.geography_query);
    println!("data url:       {}", result.data_url);
}

pub fn print_status_summary(result: &StatusResult) {
    match result.last_completed_chunk {
        Some(last) => println!("{}: last completed chunk {last}", result.progress_path),
        None => println!("{}: no progress recorded", result.progress_path),
    }
    println!(
        "next run starts at chunk {}, offset {}",
        result.next_chunk, result.next_offset
    );
}

pub fn print_reset_summary(result: &ResetResult) {
    if result.removed {
        println!("removed {}", result.progress_path);
    } else {
        println!("nothing to remove at {}", result.progress_path);
    }
}
