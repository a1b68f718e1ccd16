use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{error, info};
use url::Url;

use crate::client::create_client;
use crate::config::BenchConfig;
use crate::downloader::SegmentDownloader;
use crate::error::BenchError;
use crate::playlist::{HttpManifestSource, ManifestSource, PlaylistPoller};
use crate::summary::ResultSummary;

/// Benchmark session over one media playlist.
#[derive(Debug)]
pub struct Benchmark {
    config: BenchConfig,
    client: Client,
}

impl Benchmark {
    pub fn new(config: BenchConfig) -> Result<Self, BenchError> {
        let client = create_client(&config)?;
        Ok(Self { config, client })
    }

    /// Runs the session against `playlist_url` until the stream closes or the
    /// recording budget is spent.
    pub async fn run(&self, playlist_url: &str) -> Result<ResultSummary, BenchError> {
        let url = parse_playlist_url(playlist_url)?;
        let source = HttpManifestSource::new(self.client.clone());
        self.run_with_source(source, url).await
    }

    /// Like [`Benchmark::run`], with manifests supplied by `source`.
    pub async fn run_with_source<S>(
        &self,
        source: S,
        url: Url,
    ) -> Result<ResultSummary, BenchError>
    where
        S: ManifestSource + 'static,
    {
        if self.config.queue_capacity == 0 {
            return Err(BenchError::Configuration {
                reason: "queue capacity must be at least 1".to_string(),
            });
        }

        let downloader = SegmentDownloader::new(self.client.clone(), &self.config)?;
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);

        info!(url = %url, "Starting benchmark");
        let poller = PlaylistPoller::new(source, url, &self.config);
        let mut polling = tokio::spawn(poller.run(tx));
        let downloading = downloader.run(rx);
        tokio::pin!(downloading);

        // A fatal poller error ends the session at once; otherwise the
        // downloader drains whatever the poller queued before closing.
        tokio::select! {
            joined = &mut polling => match joined.map_err(poller_panicked)? {
                Ok(outcome) => {
                    info!(?outcome, "Playlist polling finished");
                    downloading.await
                }
                Err(e) => {
                    error!(error = %e, "Playlist polling failed");
                    Err(e)
                }
            },
            summary = &mut downloading => {
                let summary = match summary {
                    Ok(summary) => summary,
                    Err(e) => {
                        polling.abort();
                        return Err(e);
                    }
                };
                let outcome = polling.await.map_err(poller_panicked)??;
                info!(?outcome, "Playlist polling finished");
                Ok(summary)
            }
        }
    }
}

fn poller_panicked(e: tokio::task::JoinError) -> BenchError {
    BenchError::internal(format!("playlist poller task failed: {e}"))
}

fn parse_playlist_url(input: &str) -> Result<Url, BenchError> {
    let url = Url::parse(input).map_err(|e| BenchError::invalid_url(input, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BenchError::invalid_url(
            input,
            format!("unsupported scheme `{other}`"),
        )),
    }
}
