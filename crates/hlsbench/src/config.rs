use std::time::Duration;

/// User agent attached to every outbound request.
pub const USER_AGENT: &str = concat!("HLS-Benchmark-tool/", env!("CARGO_PKG_VERSION"));

/// Capacity of the queue between the playlist poller and the segment downloader.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configurable options for a benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Overall timeout for a single HTTP exchange, zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection), zero disables it
    pub connect_timeout: Duration,

    /// Duration to keep idle connections alive before closing
    pub pool_idle_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Maximum number of descriptors waiting for the downloader
    pub queue_capacity: usize,

    /// Delay before retrying a manifest fetch that failed transiently.
    /// Also paces polling when a manifest advertises a zero target duration.
    pub poll_retry_delay: Duration,

    /// Stop polling once this much wall-clock time has elapsed since the first poll.
    /// `None` records until the playlist is closed.
    pub recording_budget: Option<Duration>,

    /// Write each segment body to an anonymous temporary file instead of dropping it
    pub scratch_file: bool,

    /// How many segment identities to remember when suppressing entries
    /// already emitted by an earlier poll of a sliding live window
    pub seen_segments_capacity: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            follow_redirects: true,
            user_agent: USER_AGENT.to_owned(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_retry_delay: Duration::from_secs(3),
            recording_budget: None,
            scratch_file: false,
            seen_segments_capacity: 1024,
        }
    }
}

impl BenchConfig {
    /// Sets the recording budget; a zero duration means "unset".
    pub fn with_recording_budget(mut self, budget: Duration) -> Self {
        self.recording_budget = Some(budget).filter(|b| !b.is_zero());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_tool_name_and_version() {
        assert!(USER_AGENT.starts_with("HLS-Benchmark-tool/"));
        assert_eq!(
            USER_AGENT.trim_start_matches("HLS-Benchmark-tool/"),
            env!("CARGO_PKG_VERSION")
        );
        assert_eq!(BenchConfig::default().user_agent, USER_AGENT);
    }

    #[test]
    fn zero_budget_is_unset() {
        let config = BenchConfig::default().with_recording_budget(Duration::ZERO);
        assert_eq!(config.recording_budget, None);

        let config = BenchConfig::default().with_recording_budget(Duration::from_secs(170));
        assert_eq!(config.recording_budget, Some(Duration::from_secs(170)));
    }
}
