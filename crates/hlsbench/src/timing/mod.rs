//! Phase-level timing for single HTTP exchanges.
//!
//! A [`TimingRecorder`] is created when an exchange starts and is made visible
//! to the shared client hooks through a task-local slot while the request
//! future runs. The hooks ([`TimedResolver`], [`ConnectTimingLayer`] and
//! [`TlsStartMarker`]) stamp the phases they observe into whichever recorder
//! is current, so one process-wide client can serve the poller and the
//! downloader concurrently.
//!
//! Exchanges served by a pooled connection never hit the hooks; their DNS,
//! TCP and TLS phases are zero and the connection milestones collapse onto
//! the request start.

mod connector;
mod resolver;
mod tls;

pub use connector::{ConnectTimingLayer, TimedConnect};
pub use resolver::TimedResolver;
pub use tls::TlsStartMarker;

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

tokio::task_local! {
    static CURRENT_EXCHANGE: TimingRecorder;
}

/// Timings of one completed HTTP exchange.
///
/// The first five fields are the durations of each phase; the last five are
/// cumulative milestones measured from the start of the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingSample {
    pub dns_lookup: Duration,
    pub tcp_connection: Duration,
    pub tls_handshake: Duration,
    pub server_processing: Duration,
    pub content_transfer: Duration,

    pub name_lookup: Duration,
    pub connect: Duration,
    pub pretransfer: Duration,
    pub start_transfer: Duration,
    pub total: Duration,
}

impl TimingSample {
    pub const FIELD_COUNT: usize = 10;

    pub const FIELD_NAMES: [&'static str; Self::FIELD_COUNT] = [
        "dns_lookup",
        "tcp_connection",
        "tls_handshake",
        "server_processing",
        "content_transfer",
        "name_lookup",
        "connect",
        "pretransfer",
        "start_transfer",
        "total",
    ];

    pub fn to_array(&self) -> [Duration; Self::FIELD_COUNT] {
        [
            self.dns_lookup,
            self.tcp_connection,
            self.tls_handshake,
            self.server_processing,
            self.content_transfer,
            self.name_lookup,
            self.connect,
            self.pretransfer,
            self.start_transfer,
            self.total,
        ]
    }

    pub fn from_array(values: [Duration; Self::FIELD_COUNT]) -> Self {
        let [
            dns_lookup,
            tcp_connection,
            tls_handshake,
            server_processing,
            content_transfer,
            name_lookup,
            connect,
            pretransfer,
            start_transfer,
            total,
        ] = values;
        Self {
            dns_lookup,
            tcp_connection,
            tls_handshake,
            server_processing,
            content_transfer,
            name_lookup,
            connect,
            pretransfer,
            start_transfer,
            total,
        }
    }

    /// Combines two samples field by field.
    pub fn zip_with(&self, other: &Self, f: impl Fn(Duration, Duration) -> Duration) -> Self {
        let a = self.to_array();
        let b = other.to_array();
        Self::from_array(std::array::from_fn(|i| f(a[i], b[i])))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    DnsStart,
    DnsDone,
    ConnectStart,
    TlsStart,
    ConnectDone,
}

/// Instants stamped by the client hooks during one exchange.
#[derive(Debug, Default, Clone, Copy)]
struct PhaseMarks {
    dns_start: Option<Instant>,
    dns_done: Option<Instant>,
    connect_start: Option<Instant>,
    tls_start: Option<Instant>,
    connect_done: Option<Instant>,
}

impl PhaseMarks {
    fn stamp(&mut self, phase: Phase, at: Instant) {
        // Starts keep the earliest stamp so redirects and racing connection
        // attempts do not shorten a phase; completions keep the latest.
        match phase {
            Phase::DnsStart => {
                self.dns_start.get_or_insert(at);
            }
            Phase::ConnectStart => {
                self.connect_start.get_or_insert(at);
            }
            Phase::TlsStart => {
                self.tls_start.get_or_insert(at);
            }
            Phase::DnsDone => self.dns_done = Some(at),
            Phase::ConnectDone => self.connect_done = Some(at),
        }
    }

    fn sample(&self, started: Instant, first_byte: Instant, done: Instant) -> TimingSample {
        let name_lookup_at = self
            .dns_done
            .or(self.connect_start)
            .unwrap_or(started)
            .max(started);
        let connect_at = self
            .tls_start
            .or(self.connect_done)
            .unwrap_or(name_lookup_at)
            .max(name_lookup_at);
        let pretransfer_at = self.connect_done.unwrap_or(connect_at).max(connect_at);
        let start_transfer_at = first_byte.max(pretransfer_at);
        let total_at = done.max(start_transfer_at);

        let dns_lookup = match (self.dns_start, self.dns_done) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        };

        TimingSample {
            dns_lookup,
            tcp_connection: connect_at - name_lookup_at,
            tls_handshake: pretransfer_at - connect_at,
            server_processing: start_transfer_at - pretransfer_at,
            content_transfer: total_at - start_transfer_at,

            name_lookup: name_lookup_at - started,
            connect: connect_at - started,
            pretransfer: pretransfer_at - started,
            start_transfer: start_transfer_at - started,
            total: total_at - started,
        }
    }
}

#[derive(Debug)]
struct RecorderInner {
    started: Instant,
    marks: Mutex<PhaseMarks>,
}

/// Collects phase stamps for one HTTP exchange.
#[derive(Debug, Clone)]
pub struct TimingRecorder {
    inner: Arc<RecorderInner>,
}

impl TimingRecorder {
    /// Starts timing a new exchange now.
    pub fn start() -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                started: Instant::now(),
                marks: Mutex::new(PhaseMarks::default()),
            }),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.inner.started
    }

    /// Runs `fut` with this recorder installed as the current exchange.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT_EXCHANGE.scope(self.clone(), fut).await
    }

    /// The recorder of the exchange driving the current task, if any.
    pub(crate) fn current() -> Option<Self> {
        CURRENT_EXCHANGE.try_with(Clone::clone).ok()
    }

    pub(crate) fn mark(&self, phase: Phase) {
        self.mark_at(phase, Instant::now());
    }

    pub(crate) fn mark_at(&self, phase: Phase, at: Instant) {
        self.inner.marks.lock().stamp(phase, at);
    }

    /// Finalizes the sample once the first response byte arrived at
    /// `first_byte` and the body was fully drained at `done`.
    pub fn finish(&self, first_byte: Instant, done: Instant) -> TimingSample {
        let marks = *self.inner.marks.lock();
        marks.sample(self.inner.started, first_byte, done)
    }
}
