//! One timed HTTP exchange: send, drain, report.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{field, info, warn};

use crate::error::BenchError;
use crate::scratch::ScratchFile;
use crate::timing::{TimingRecorder, TimingSample};

const X_CACHE: &str = "x-cache";
/// Upper bound on the buffer reserved from a declared `Content-Length`.
const MAX_PREALLOCATION: usize = 1 << 20;

/// Response whose headers arrived but whose body is still on the wire.
#[derive(Debug)]
pub struct InFlight {
    response: Response,
    recorder: TimingRecorder,
    first_byte: Instant,
}

/// Sends `request` with phase timing active until the response headers arrive.
pub async fn send(client: &Client, request: Request) -> Result<InFlight, BenchError> {
    let recorder = TimingRecorder::start();
    let response = recorder.scope(client.execute(request)).await?;
    let first_byte = Instant::now();

    Ok(InFlight {
        response,
        recorder,
        first_byte,
    })
}

impl InFlight {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Reads the whole body into memory.
    pub async fn into_bytes(self) -> Result<(Bytes, ExchangeReport), BenchError> {
        let capacity = self
            .response
            .content_length()
            .map_or(0, |len| usize::try_from(len).unwrap_or(usize::MAX))
            .min(MAX_PREALLOCATION);
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut report = self.meta();
        let mut stream = self.response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        let done = Instant::now();
        report.bytes = buffer.len() as u64;
        report.sample = self.recorder.finish(self.first_byte, done);
        Ok((buffer.freeze(), report))
    }

    /// Reads the body to EOF, handing each chunk to `scratch` when given and
    /// dropping it otherwise.
    pub async fn drain(
        self,
        mut scratch: Option<&mut ScratchFile>,
    ) -> Result<ExchangeReport, BenchError> {
        if let Some(scratch) = scratch.as_deref_mut() {
            scratch.reset().await?;
        }

        let mut report = self.meta();
        let mut stream = self.response.bytes_stream();
        let mut bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes += chunk.len() as u64;
            if let Some(scratch) = scratch.as_deref_mut() {
                scratch.write(&chunk).await?;
            }
        }

        let done = Instant::now();
        if let Some(scratch) = scratch {
            scratch.flush().await?;
        }

        report.bytes = bytes;
        report.sample = self.recorder.finish(self.first_byte, done);
        Ok(report)
    }

    fn meta(&self) -> ExchangeReport {
        let cache_status = self
            .response
            .headers()
            .get(X_CACHE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        ExchangeReport {
            url: self.response.url().to_string(),
            status: self.response.status(),
            bytes: 0,
            cache_status,
            remote_addr: self.response.remote_addr(),
            sample: TimingSample::default(),
        }
    }
}

/// Outcome of a fully drained exchange.
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    /// Final URL after redirects
    pub url: String,
    pub status: StatusCode,
    /// Body bytes as received on the wire
    pub bytes: u64,
    /// Value of the `X-Cache` response header, if any
    pub cache_status: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub sample: TimingSample,
}

impl ExchangeReport {
    /// Throughput of the content-transfer phase in megabits per second.
    pub fn transfer_rate(&self) -> f64 {
        let secs = self.sample.content_transfer.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 * 8.0 / secs / 1_000_000.0
        } else {
            0.0
        }
    }

    pub fn transfer_rate_display(&self) -> String {
        format!("{:.2} Mb/s", self.transfer_rate())
    }

    /// Whether the exchange took at least `nominal` from request start to EOF.
    pub fn is_slow(&self, nominal: Duration) -> bool {
        self.sample.total >= nominal
    }

    /// Logs the exchange, at WARN when it was slower than `nominal`.
    pub fn log(&self, kind: &'static str, range: Option<&str>, nominal: Duration) {
        macro_rules! exchange_event {
            ($level:ident, $message:literal) => {{
                let s = &self.sample;
                $level!(
                    kind,
                    url = %self.url,
                    range,
                    status = self.status.as_u16(),
                    bytes = self.bytes,
                    nominal_duration = ?nominal,
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
                    x_cache = self.cache_status.as_deref(),
                    transfer_rate = %self.transfer_rate_display(),
                    connected_to = self.remote_addr.map(field::display),
                    $message
                );
            }};
        }

        if self.is_slow(nominal) {
            exchange_event!(warn, "Download took longer than the nominal duration");
        } else {
            exchange_event!(info, "Download completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(bytes: u64, transfer: Duration, total: Duration) -> ExchangeReport {
        ExchangeReport {
            url: "http://127.0.0.1/seg.ts".to_string(),
            status: StatusCode::PARTIAL_CONTENT,
            bytes,
            cache_status: Some("HIT".to_string()),
            remote_addr: None,
            sample: TimingSample {
                content_transfer: transfer,
                total,
                ..TimingSample::default()
            },
        }
    }

    #[tokio::test]
    async fn oversized_content_length_fails_on_the_body_not_the_allocation() {
        let addr = crate::test_utils::spawn_raw_origin(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 1000000000000000\r\n\r\nshort",
        ])
        .await;
        let client = crate::client::create_client(&crate::BenchConfig::default()).unwrap();
        let request = client
            .get(format!("http://{addr}/index.m3u8"))
            .build()
            .unwrap();

        let in_flight = send(&client, request).await.unwrap();
        assert_eq!(in_flight.status(), StatusCode::OK);
        let err = in_flight.into_bytes().await.unwrap_err();
        assert!(matches!(err, BenchError::Network { .. }));
    }

    #[test]
    fn transfer_rate_is_megabits_per_second() {
        let r = report(1_000_000, Duration::from_secs(2), Duration::from_secs(3));
        assert!((r.transfer_rate() - 4.0).abs() < f64::EPSILON);
        assert_eq!(r.transfer_rate_display(), "4.00 Mb/s");
    }

    #[test]
    fn instant_transfer_reports_zero_rate() {
        let r = report(512, Duration::ZERO, Duration::ZERO);
        assert_eq!(r.transfer_rate_display(), "0.00 Mb/s");
    }

    #[test]
    fn slow_threshold_is_inclusive_and_uses_fractional_duration() {
        let r = report(10, Duration::from_millis(100), Duration::from_millis(3_900));
        assert!(!r.is_slow(Duration::from_secs_f64(3.96)));
        assert!(r.is_slow(Duration::from_millis(3_900)));
        assert!(r.is_slow(Duration::from_secs(3)));
    }

    #[test]
    fn logging_handles_missing_optional_fields() {
        crate::test_utils::init_tracing();
        let mut r = report(10, Duration::from_millis(1), Duration::from_millis(2));
        r.cache_status = None;
        r.log("segment", None, Duration::from_secs(4));
        r.log("segment", Some("0-9"), Duration::ZERO);
    }
}
