//! Session-wide aggregation of exchange timings.

use std::time::Duration;
use tracing::info;

use crate::timing::TimingSample;

/// Emits one structured record carrying every timing field of `$sample`.
macro_rules! log_sample_fields {
    ($sample:expr, $count:expr, $message:literal) => {{
        let s: &TimingSample = $sample;
        info!(
            samples = $count,
            dns_lookup = ?s.dns_lookup,
            tcp_connection = ?s.tcp_connection,
            tls_handshake = ?s.tls_handshake,
            server_processing = ?s.server_processing,
            content_transfer = ?s.content_transfer,
            name_lookup = ?s.name_lookup,
            connect = ?s.connect,
            pretransfer = ?s.pretransfer,
            start_transfer = ?s.start_transfer,
            total = ?s.total,
            $message
        );
    }};
}

/// Append-only collection of timing samples, one per completed exchange.
///
/// Minimums and maximums are seeded from the first sample rather than from
/// zero, so an all-positive field never reports a fabricated zero minimum.
#[derive(Debug, Default, Clone)]
pub struct ResultSummary {
    samples: Vec<TimingSample>,
}

impl ResultSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: TimingSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn minimums(&self) -> Option<TimingSample> {
        self.fold(Duration::min)
    }

    pub fn maximums(&self) -> Option<TimingSample> {
        self.fold(Duration::max)
    }

    /// Integer-truncated mean of every field, `None` when nothing was recorded.
    pub fn averages(&self) -> Option<TimingSample> {
        let count = self.samples.len() as u128;
        if count == 0 {
            return None;
        }

        let mut sums = [0u128; TimingSample::FIELD_COUNT];
        for sample in &self.samples {
            for (sum, value) in sums.iter_mut().zip(sample.to_array()) {
                *sum += value.as_nanos();
            }
        }

        Some(TimingSample::from_array(sums.map(|sum| {
            let mean = sum / count;
            Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX))
        })))
    }

    fn fold(&self, pick: fn(Duration, Duration) -> Duration) -> Option<TimingSample> {
        let (first, rest) = self.samples.split_first()?;
        Some(
            rest.iter()
                .fold(*first, |acc, sample| acc.zip_with(sample, pick)),
        )
    }

    /// Logs the minimums, maximums and averages records.
    pub fn log_summary(&self) {
        let (Some(min), Some(max), Some(avg)) = (self.minimums(), self.maximums(), self.averages())
        else {
            info!("No exchanges completed; no results to report");
            return;
        };

        let count = self.len();
        log_sample_fields!(&min, count, "Results Minimums");
        log_sample_fields!(&max, count, "Results Maximums");
        log_sample_fields!(&avg, count, "Results Averages");
    }
}
