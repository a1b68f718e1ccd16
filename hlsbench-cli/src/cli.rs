use clap::Parser;
use hlsbench_engine::BenchConfig;
use hlsbench_engine::config::DEFAULT_QUEUE_CAPACITY;
use std::time::Duration;

use crate::duration::parse_duration;

#[derive(Parser, Debug)]
#[command(
    name = "hlsbench",
    author,
    version,
    about = "Benchmark HTTP delivery of an HLS media playlist"
)]
pub struct Args {
    /// Media playlist URL to poll
    #[arg(value_name = "URL")]
    pub url: String,

    /// Stop recording after this long, e.g. 2m50s, 90s or 1h (0 records until the stream ends)
    #[arg(short, long, value_name = "DUR", value_parser = parse_duration, default_value = "0")]
    pub duration: Duration,

    /// Write segment bodies to an anonymous temporary file instead of discarding them
    #[arg(long)]
    pub scratch_file: bool,

    /// Overall timeout per HTTP exchange in seconds (0 disables it)
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub timeout: u64,

    /// Connection timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub connect_timeout: u64,

    /// Maximum number of segments waiting to be downloaded
    #[arg(long, value_name = "N", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit log records as JSON
    #[arg(long)]
    pub json: bool,
}

impl Args {
    pub fn to_config(&self) -> BenchConfig {
        BenchConfig {
            timeout: Duration::from_secs(self.timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            queue_capacity: self.queue_capacity,
            scratch_file: self.scratch_file,
            ..BenchConfig::default()
        }
        .with_recording_budget(self.duration)
    }
}
