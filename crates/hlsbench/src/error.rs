use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("failed to build {operation} request for {url}: {source}")]
    Request {
        url: String,
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {source}")]
    Tls {
        #[from]
        source: rustls::Error,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("not a valid media playlist: {url}")]
    NotMediaPlaylist { url: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl BenchError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn request(
        url: impl Into<String>,
        operation: &'static str,
        source: reqwest::Error,
    ) -> Self {
        Self::Request {
            url: url.into(),
            operation,
            source,
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether the failed operation may succeed if attempted again.
    ///
    /// Transport failures and overloaded-server statuses are retryable; anything
    /// that says the input itself is unusable is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidUrl { .. }
            | Self::Request { .. }
            | Self::Io { .. }
            | Self::Tls { .. }
            | Self::Playlist { .. }
            | Self::NotMediaPlaylist { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => false,
        }
    }
}
