//! Consumer side of the pipeline: ranged segment downloads.

use reqwest::Client;
use reqwest::header::RANGE;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::exchange;
use crate::scratch::ScratchFile;
use crate::segment::{SegmentDescriptor, SegmentKind};
use crate::summary::ResultSummary;

/// What happened to one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    Recorded,
    Skipped,
}

/// Downloads queued segments one at a time and collects their timings.
#[derive(Debug)]
pub struct SegmentDownloader {
    client: Client,
    scratch: Option<ScratchFile>,
    summary: ResultSummary,
}

impl SegmentDownloader {
    pub fn new(client: Client, config: &BenchConfig) -> Result<Self, BenchError> {
        let scratch = if config.scratch_file {
            Some(ScratchFile::create()?)
        } else {
            None
        };

        Ok(Self {
            client,
            scratch,
            summary: ResultSummary::new(),
        })
    }

    /// Drains the queue until the poller closes it, returning the collected samples.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<SegmentDescriptor>,
    ) -> Result<ResultSummary, BenchError> {
        while let Some(descriptor) = rx.recv().await {
            self.download(&descriptor).await?;
        }

        info!(samples = self.summary.len(), "Segment queue drained");
        Ok(self.summary)
    }

    /// Fetches one segment. Network trouble and error statuses skip it; only
    /// local failures are returned as errors.
    pub async fn download(
        &mut self,
        descriptor: &SegmentDescriptor,
    ) -> Result<SegmentOutcome, BenchError> {
        let range = descriptor.range_header();
        let span = descriptor.span().to_string();
        let kind = match descriptor.kind {
            SegmentKind::Init => "init",
            SegmentKind::Media => "segment",
        };

        let request = self
            .client
            .get(descriptor.uri.as_str())
            .header(RANGE, range.as_str())
            .build()
            .map_err(|e| BenchError::request(descriptor.uri.as_str(), "segment", e))?;
        debug!(uri = %descriptor.uri, range = %range, "Requesting segment");

        let in_flight = match exchange::send(&self.client, request).await {
            Ok(in_flight) => in_flight,
            Err(e) => {
                warn!(
                    uri = %descriptor.uri,
                    range = %span,
                    error = %e,
                    "Segment request failed, skipping"
                );
                return Ok(SegmentOutcome::Skipped);
            }
        };

        let status = in_flight.status();
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                uri = %descriptor.uri,
                range = %span,
                "Segment request returned an error status, skipping"
            );
            return Ok(SegmentOutcome::Skipped);
        }

        let report = match in_flight.drain(self.scratch.as_mut()).await {
            Ok(report) => report,
            Err(e @ BenchError::Network { .. }) => {
                warn!(
                    uri = %descriptor.uri,
                    range = %span,
                    error = %e,
                    "Segment body read failed, skipping"
                );
                return Ok(SegmentOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        report.log(kind, Some(&span), descriptor.nominal_duration);
        self.summary.add(report.sample);
        Ok(SegmentOutcome::Recorded)
    }

    #[cfg(test)]
    fn summary(&self) -> &ResultSummary {
        &self.summary
    }
}
