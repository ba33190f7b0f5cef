use std::thread;

use csv::{StringRecord, WriterBuilder};
use tracing::{info, warn};

use crate::accumulator::ChunkBuffer;
use crate::config::RetryPolicy;
use crate::domain::blob_name;
use crate::error::ChunkerError;
use crate::sink::{BlobSink, CSV_CONTENT_TYPE, SinkConnector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub blob: String,
    pub rows: usize,
    pub bytes: usize,
    pub attempts: u32,
}

pub struct ChunkUploader<K: SinkConnector> {
    connector: K,
    sink: K::Sink,
    retry: RetryPolicy,
    header: StringRecord,
    suffix: String,
}

impl<K: SinkConnector> ChunkUploader<K> {
    pub fn connect(
        connector: K,
        retry: RetryPolicy,
        fields: &[String],
        suffix: &str,
    ) -> Result<Self, ChunkerError> {
        let sink = connector.connect()?;
        info!(sink = %connector.describe(), "storage client connected");
        Ok(Self {
            connector,
            sink,
            retry,
            header: StringRecord::from(fields.to_vec()),
            suffix: suffix.to_string(),
        })
    }

    pub fn upload(
        &mut self,
        chunk_index: u64,
        buffer: &ChunkBuffer,
    ) -> Result<UploadReceipt, ChunkerError> {
        let blob = blob_name(chunk_index, &self.suffix);
        let body = encode_chunk(&self.header, buffer)?;

        let mut attempt = 1u32;
        loop {
            info!(blob = %blob, attempt, "attempting to upload output");
            match self.sink.put(&blob, &body, CSV_CONTENT_TYPE) {
                Ok(()) => {
                    info!(blob = %blob, rows = buffer.len(), bytes = body.len(), "write successful");
                    return Ok(UploadReceipt {
                        blob,
                        rows: buffer.len(),
                        bytes: body.len(),
                        attempts: attempt,
                    });
                }
                Err(err) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        blob = %blob,
                        attempt,
                        error = %err,
                        backoff_secs = delay.as_secs(),
                        "upload failed, backing off"
                    );
                    thread::sleep(delay);
                    warn!(sink = %self.connector.describe(), "getting new storage client");
                    self.sink = self.connector.connect()?;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(ChunkerError::UploadExhausted {
                        blob,
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }
        }
    }
}

pub fn encode_chunk(header: &StringRecord, buffer: &ChunkBuffer) -> Result<Vec<u8>, ChunkerError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|err| ChunkerError::Csv(err.to_string()))?;
    for row in &buffer.rows {
        writer
            .write_record(row)
            .map_err(|err| ChunkerError::Csv(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| ChunkerError::Csv(err.to_string()))
}
