//! Playlist polling: fetch, parse, discover new segments, pace.

use async_trait::async_trait;
use bytes::Bytes;
use m3u8_rs::{ByteRange, Map, MediaPlaylist, parse_playlist_res};
use reqwest::Client;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::exchange;
use crate::segment::{SegmentDescriptor, range_fits, translate_uri};

/// Threshold for the slow-fetch warning on manifest requests.
const MANIFEST_NOMINAL_DURATION: Duration = Duration::from_secs(1);

/// Source of raw manifest bytes.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, BenchError>;
}

/// Fetches manifests over HTTP, timing and logging each exchange like a segment.
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: Client,
}

impl HttpManifestSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &Url) -> Result<Bytes, BenchError> {
        let request = self
            .client
            .get(url.clone())
            .build()
            .map_err(|e| BenchError::request(url.as_str(), "playlist", e))?;

        let in_flight = exchange::send(&self.client, request).await?;
        let status = in_flight.status();
        if !status.is_success() {
            return Err(BenchError::http_status(status, url.as_str(), "playlist"));
        }

        let (body, report) = in_flight.into_bytes().await?;
        report.log("playlist", None, MANIFEST_NOMINAL_DURATION);
        Ok(body)
    }
}

/// Why the poller stopped producing descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The manifest carried `#EXT-X-ENDLIST`
    StreamClosed,
    /// The recording budget elapsed
    BudgetExhausted,
    /// The downloader hung up before the stream ended
    ConsumerGone,
}

/// Parses manifest bytes, accepting only media playlists.
pub fn parse_media_playlist(body: &[u8], url: &Url) -> Result<MediaPlaylist, BenchError> {
    match parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(playlist)) => Ok(playlist),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(BenchError::NotMediaPlaylist {
            url: url.to_string(),
        }),
        Err(e) => Err(BenchError::playlist(format!(
            "failed to parse playlist {url}: {e}"
        ))),
    }
}

/// Bounded FIFO set of segment identities; the oldest entries are evicted first.
#[derive(Debug)]
struct SeenSegments {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenSegments {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records `identity`, returning `false` when it was already present.
    fn insert(&mut self, identity: String) -> bool {
        if self.set.contains(&identity) {
            return false;
        }

        self.set.insert(identity.clone());
        self.order.push_back(identity);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

/// Remembers what earlier polls already emitted so a sliding live window only
/// yields its new entries.
#[derive(Debug)]
pub struct SegmentTracker {
    seen: SeenSegments,
    last_map: Option<String>,
}

impl SegmentTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: SeenSegments::new(capacity),
            last_map: None,
        }
    }

    /// Descriptors for every entry of `playlist` not emitted before, in
    /// manifest order, with a new initialization segment ahead of the first
    /// entry that uses it.
    ///
    /// Entries whose URI cannot be resolved are logged and skipped.
    pub fn discover(
        &mut self,
        playlist: &MediaPlaylist,
        playlist_url: &Url,
    ) -> Vec<SegmentDescriptor> {
        let target_duration = Duration::from_secs(playlist.target_duration);
        let playlist_level_map = parse_playlist_level_map(playlist);

        let mut descriptors = Vec::new();
        let mut last_uri: Option<&str> = None;
        let mut range_ends: HashMap<&str, u64> = HashMap::new();

        for (idx, segment) in playlist.segments.iter().enumerate() {
            let msn = playlist.media_sequence + idx as u64;

            // An entry with a byte range but no URI continues the previous resource.
            let uri = if segment.uri.trim().is_empty() {
                match (&segment.byte_range, last_uri) {
                    (Some(_), Some(previous)) => previous,
                    _ => {
                        warn!(msn, "Skipping segment with empty URI");
                        continue;
                    }
                }
            } else {
                segment.uri.as_str()
            };
            last_uri = Some(uri);

            let (length, offset) = match &segment.byte_range {
                Some(ByteRange { length, offset }) => {
                    let offset = offset
                        .or_else(|| range_ends.get(uri).copied())
                        .unwrap_or(0);
                    range_ends.insert(uri, offset.saturating_add(*length));
                    (*length, offset)
                }
                None => (0, 0),
            };
            if !range_fits(length, offset) {
                warn!(
                    msn,
                    uri,
                    length,
                    offset,
                    "Skipping segment with out-of-range byte range"
                );
                continue;
            }

            let resolved = match translate_uri(playlist_url, uri) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(msn, uri, error = %e, "Skipping segment with unresolvable URI");
                    continue;
                }
            };

            let nominal = Duration::try_from_secs_f64(f64::from(segment.duration))
                .unwrap_or(Duration::ZERO);
            let descriptor = SegmentDescriptor::new(resolved, nominal, length, offset);
            if !self.seen.insert(descriptor.identity()) {
                continue;
            }

            // The map goes out only ahead of a segment that is itself new.
            let map = segment.map.as_ref().or(playlist_level_map.as_ref());
            if let Some(init) = map.and_then(|m| self.new_map(m, playlist_url, target_duration)) {
                descriptors.push(init);
            }
            descriptors.push(descriptor);
        }

        descriptors
    }

    /// Descriptor for `map` when it differs from the last emitted map.
    fn new_map(
        &mut self,
        map: &Map,
        playlist_url: &Url,
        target_duration: Duration,
    ) -> Option<SegmentDescriptor> {
        let (length, offset) = map
            .byte_range
            .as_ref()
            .map(|range| (range.length, range.offset.unwrap_or(0)))
            .unwrap_or((0, 0));
        if !range_fits(length, offset) {
            warn!(
                uri = %map.uri,
                length,
                offset,
                "Skipping initialization segment with out-of-range byte range"
            );
            return None;
        }

        let resolved = match translate_uri(playlist_url, &map.uri) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(
                    uri = %map.uri,
                    error = %e,
                    "Skipping initialization segment with unresolvable URI"
                );
                return None;
            }
        };

        let descriptor = SegmentDescriptor::init(resolved, target_duration, length, offset);
        let identity = descriptor.identity();
        if self.last_map.as_deref() == Some(identity.as_str()) {
            return None;
        }

        debug!(uri = %descriptor.uri, "New initialization segment");
        self.last_map = Some(identity);
        Some(descriptor)
    }
}

/// Reads an `EXT-X-MAP` placed before the first segment.
///
/// m3u8-rs only attaches a map to `MediaSegment::map` inside the segment tag
/// region; one declared earlier ends up in `unknown_tags` as `X-MAP`.
fn parse_playlist_level_map(playlist: &MediaPlaylist) -> Option<Map> {
    let ext = playlist
        .unknown_tags
        .iter()
        .rev()
        .find(|t| t.tag == "X-MAP")?;
    let rest = ext.rest.as_deref()?;

    let mut uri = None;
    let mut byte_range = None;

    for part in split_attributes(rest) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        if key.trim().eq_ignore_ascii_case("URI") {
            uri = Some(value.to_string());
        } else if key.trim().eq_ignore_ascii_case("BYTERANGE") {
            let (length, offset) = value.split_once('@').unwrap_or((value, ""));
            if let Ok(length) = length.trim().parse::<u64>() {
                byte_range = Some(ByteRange {
                    length,
                    offset: offset.trim().parse::<u64>().ok(),
                });
            }
        }
    }

    Some(Map {
        uri: uri?,
        byte_range,
        other_attributes: HashMap::new(),
    })
}

/// Splits an attribute list on commas outside quoted strings.
fn split_attributes(rest: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(rest[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(rest[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty())
}

/// Producer side of the pipeline.
///
/// Polls the manifest until it is closed or the recording budget runs out,
/// pushing newly discovered descriptors into the queue. Dropping the sender
/// on return closes the queue.
pub struct PlaylistPoller<S> {
    source: S,
    url: Url,
    recording_budget: Option<Duration>,
    retry_delay: Duration,
    tracker: SegmentTracker,
}

impl<S: ManifestSource> PlaylistPoller<S> {
    pub fn new(source: S, url: Url, config: &BenchConfig) -> Self {
        Self {
            source,
            url,
            recording_budget: config.recording_budget.filter(|b| !b.is_zero()),
            retry_delay: config.poll_retry_delay,
            tracker: SegmentTracker::new(config.seen_segments_capacity),
        }
    }

    pub async fn run(
        mut self,
        tx: mpsc::Sender<SegmentDescriptor>,
    ) -> Result<PollOutcome, BenchError> {
        let started = Instant::now();
        info!(url = %self.url, budget = ?self.recording_budget, "Starting playlist polling");

        loop {
            if self.budget_exhausted(started) {
                info!(elapsed = ?started.elapsed(), "Recording budget exhausted");
                return Ok(PollOutcome::BudgetExhausted);
            }

            let body = match self.source.fetch(&self.url).await {
                Ok(body) => body,
                Err(e) if e.is_retryable() => {
                    warn!(
                        url = %self.url,
                        error = %e,
                        retry_in = ?self.retry_delay,
                        "Playlist fetch failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let playlist = parse_media_playlist(&body, &self.url)?;
            let descriptors = self.tracker.discover(&playlist, &self.url);
            debug!(
                media_sequence = playlist.media_sequence,
                entries = playlist.segments.len(),
                new = descriptors.len(),
                "Playlist refreshed"
            );

            for descriptor in descriptors {
                if self.budget_exhausted(started) {
                    info!(elapsed = ?started.elapsed(), "Recording budget exhausted");
                    return Ok(PollOutcome::BudgetExhausted);
                }
                if tx.send(descriptor).await.is_err() {
                    warn!("Segment queue closed by the downloader, stopping playlist polling");
                    return Ok(PollOutcome::ConsumerGone);
                }
            }

            if playlist.end_list {
                info!(url = %self.url, "Playlist closed, stopping");
                return Ok(PollOutcome::StreamClosed);
            }

            let target_duration = Duration::from_secs(playlist.target_duration);
            let pause = if target_duration.is_zero() {
                self.retry_delay
            } else {
                target_duration
            };
            tokio::time::sleep(pause).await;
        }
    }

    fn budget_exhausted(&self, started: Instant) -> bool {
        self.recording_budget
            .is_some_and(|budget| started.elapsed() >= budget)
    }
}
