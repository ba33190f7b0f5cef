pub mod accumulator;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod geography;
pub mod nomis;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod uploader;
