use std::fmt;
use std::time::Duration;
use url::Url;

use crate::BenchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Initialization (`EXT-X-MAP`) segment
    Init,
    /// Ordinary media segment
    Media,
}

/// One fetch target discovered in a media playlist.
///
/// `byte_offset` and `byte_length` describe the half-open range
/// `[byte_offset, byte_offset + byte_length)`; a zero length means the whole
/// resource from `byte_offset` onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    pub uri: String,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub nominal_duration: Duration,
    pub kind: SegmentKind,
}

impl SegmentDescriptor {
    pub fn new(
        uri: impl Into<String>,
        nominal_duration: Duration,
        byte_length: u64,
        byte_offset: u64,
    ) -> Self {
        Self {
            uri: uri.into(),
            byte_offset,
            byte_length,
            nominal_duration,
            kind: SegmentKind::Media,
        }
    }

    pub fn init(
        uri: impl Into<String>,
        nominal_duration: Duration,
        byte_length: u64,
        byte_offset: u64,
    ) -> Self {
        Self {
            kind: SegmentKind::Init,
            ..Self::new(uri, nominal_duration, byte_length, byte_offset)
        }
    }

    pub fn range_start(&self) -> u64 {
        self.byte_offset
    }

    /// Last byte of the range (inclusive), `None` for a whole-resource descriptor.
    pub fn range_end(&self) -> Option<u64> {
        (self.byte_length > 0).then(|| self.byte_offset.saturating_add(self.byte_length - 1))
    }

    /// Value of the `Range` header sent for this segment.
    pub fn range_header(&self) -> String {
        match self.range_end() {
            Some(end) => format!("bytes={}-{}", self.range_start(), end),
            None => format!("bytes={}-", self.range_start()),
        }
    }

    /// Inclusive byte span used in log output, e.g. `100-149` or `0-`.
    pub fn span(&self) -> ByteSpan {
        ByteSpan {
            start: self.range_start(),
            end: self.range_end(),
        }
    }

    /// Identity used to recognise the same entry across playlist refreshes.
    pub(crate) fn identity(&self) -> String {
        format!("{}|{}", self.uri, self.range_header())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: u64,
    pub end: Option<u64>,
}

impl fmt::Display for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// Whether the inclusive end of `[offset, offset + length)` is addressable.
pub(crate) fn range_fits(length: u64, offset: u64) -> bool {
    length == 0 || offset.checked_add(length - 1).is_some()
}

/// Resolves a playlist entry URI against the playlist URL and percent-decodes the result.
pub fn translate_uri(playlist_url: &Url, segment_uri: &str) -> Result<String, BenchError> {
    let resolved = if segment_uri.starts_with("http://") || segment_uri.starts_with("https://") {
        Url::parse(segment_uri)
    } else {
        playlist_url.join(segment_uri)
    }
    .map_err(|e| BenchError::invalid_url(segment_uri, e.to_string()))?;

    let decoded = urlencoding::decode(resolved.as_str())
        .map_err(|e| BenchError::invalid_url(resolved.as_str(), e.to_string()))?;
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist_url() -> Url {
        Url::parse("https://host/path/index.m3u8").unwrap()
    }

    #[test]
    fn range_header_is_inclusive() {
        let segment = SegmentDescriptor::new("https://host/a.ts", Duration::from_secs(4), 50, 100);
        assert_eq!(segment.range_start(), 100);
        assert_eq!(segment.range_end(), Some(149));
        assert_eq!(segment.range_header(), "bytes=100-149");
        assert_eq!(segment.span().to_string(), "100-149");
    }

    #[test]
    fn single_byte_range() {
        let segment = SegmentDescriptor::new("https://host/a.ts", Duration::ZERO, 1, 0);
        assert_eq!(segment.range_header(), "bytes=0-0");
    }

    #[test]
    fn whole_resource_sends_open_ended_range() {
        let segment = SegmentDescriptor::new("https://host/a.ts", Duration::from_secs(4), 0, 0);
        assert_eq!(segment.range_end(), None);
        assert_eq!(segment.range_header(), "bytes=0-");
        assert_eq!(segment.span().to_string(), "0-");
    }

    #[test]
    fn init_segments_are_tagged() {
        let segment =
            SegmentDescriptor::init("https://host/init.mp4", Duration::from_secs(6), 720, 0);
        assert_eq!(segment.kind, SegmentKind::Init);
        assert_eq!(segment.range_header(), "bytes=0-719");
    }

    #[test]
    fn range_end_saturates_at_the_last_addressable_byte() {
        let segment = SegmentDescriptor::new("https://host/a.ts", Duration::ZERO, u64::MAX, 10);
        assert_eq!(segment.range_end(), Some(u64::MAX));
        assert!(!range_fits(u64::MAX, 10));
        assert!(range_fits(u64::MAX, 1));
        assert!(range_fits(0, u64::MAX));
    }

    #[test]
    fn identity_distinguishes_byte_ranges_of_one_resource() {
        let first = SegmentDescriptor::new("https://host/all.ts", Duration::ZERO, 10, 0);
        let second = SegmentDescriptor::new("https://host/all.ts", Duration::ZERO, 10, 10);
        assert_ne!(first.identity(), second.identity());
    }

    #[test]
    fn relative_uri_resolves_against_playlist_directory() {
        assert_eq!(
            translate_uri(&playlist_url(), "seg1.ts").unwrap(),
            "https://host/path/seg1.ts"
        );
        assert_eq!(
            translate_uri(&playlist_url(), "../other/seg2.ts").unwrap(),
            "https://host/other/seg2.ts"
        );
        assert_eq!(
            translate_uri(&playlist_url(), "/root.ts").unwrap(),
            "https://host/root.ts"
        );
    }

    #[test]
    fn absolute_uri_is_kept() {
        assert_eq!(
            translate_uri(&playlist_url(), "http://cdn.example/live/seg9.ts?token=abc").unwrap(),
            "http://cdn.example/live/seg9.ts?token=abc"
        );
    }

    #[test]
    fn resolved_uri_is_percent_decoded() {
        assert_eq!(
            translate_uri(&playlist_url(), "seg%201.ts?sig=a%3Db").unwrap(),
            "https://host/path/seg 1.ts?sig=a=b"
        );
    }

    #[test]
    fn undecodable_uri_is_rejected() {
        let err = translate_uri(&playlist_url(), "seg%FF.ts").unwrap_err();
        assert!(matches!(err, BenchError::InvalidUrl { .. }));
    }

    #[test]
    fn unparseable_absolute_uri_is_rejected() {
        assert!(translate_uri(&playlist_url(), "http://[::1").is_err());
    }
}
