pub mod bench;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod exchange;
pub mod playlist;
pub mod scratch;
pub mod segment;
pub mod summary;
pub mod timing;

#[cfg(test)]
pub(crate) mod test_utils;

pub use bench::Benchmark;
pub use client::create_client;
pub use config::{BenchConfig, USER_AGENT};
pub use downloader::{SegmentDownloader, SegmentOutcome};
pub use error::BenchError;
pub use exchange::ExchangeReport;
pub use playlist::{HttpManifestSource, ManifestSource, PlaylistPoller, PollOutcome};
pub use segment::{SegmentDescriptor, SegmentKind};
pub use summary::ResultSummary;
pub use timing::{TimingRecorder, TimingSample};
