use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::SocketAddr;
use tracing::trace;

use super::{Phase, TimingRecorder};

/// DNS resolver that stamps lookup start and completion into the current exchange.
///
/// Resolution itself goes through the system resolver via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimedResolver;

impl Resolve for TimedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        // Captured eagerly: the lookup future may be polled from a background task.
        let recorder = TimingRecorder::current();
        Box::pin(async move {
            if let Some(recorder) = &recorder {
                recorder.mark(Phase::DnsStart);
            }

            // The port is filled in by the connector.
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), 0))
                .await?
                .collect();

            if let Some(recorder) = &recorder {
                recorder.mark(Phase::DnsDone);
            }
            trace!(host = name.as_str(), resolved = addrs.len(), "Resolved host");

            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
