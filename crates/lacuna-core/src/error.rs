//! Common error type for provider fetches

/// Error from talking to an external bibliographic API.
///
/// The worker loop keys its queue handling off these variants: transient
/// errors leave the queue entry untouched for the next pass, permanent ones
/// drop the current source from the entry.
#[derive(Debug)]
pub enum FetchError {
    /// Network-level failure without a usable HTTP status (DNS, reset, timeout)
    Network(String),
    /// Non-2xx HTTP status that is not retryable
    Http { status: u16, message: String },
    /// Retry budget exhausted on a retryable status
    RetryExhausted { status: u16, attempts: u32 },
    /// Provider signalled rate/quota exhaustion (429 or quota feedback)
    RateLimited { status: u16 },
    /// The resource does not exist at this provider (404/410)
    PermanentSource { status: u16 },
    /// No usable identifiers (or malformed ones) for the chosen source
    InvalidRequest(String),
    /// No active API key available for this auth key and source
    NoCredentials(String),
    /// Provider payload could not be parsed
    Parse(String),
    /// Unusable config or meta-cache (database unreachable, schema broken).
    /// Nothing batch-local can recover this; the loop must abort.
    Fatal(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::RetryExhausted { status, attempts } => {
                write!(f, "HTTP {status} after {attempts} retries")
            }
            Self::RateLimited { status } => write!(f, "rate limited (HTTP {status})"),
            Self::PermanentSource { status } => {
                write!(f, "permanently unavailable (HTTP {status})")
            }
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::NoCredentials(msg) => write!(f, "no credentials: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create from a reqwest error, stripping the URL so API endpoints and
    /// query strings don't leak into logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let status = e.status();
        let message = e.without_url().to_string();
        match status {
            Some(s) => Self::from_status(s.as_u16(), message),
            None => Self::Network(message),
        }
    }

    /// Classify an HTTP status into the matching variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            404 | 410 => Self::PermanentSource { status },
            429 => Self::RateLimited { status },
            _ => Self::Http { status, message },
        }
    }

    /// True when retrying the same source later cannot help, so the source
    /// should be dropped from the queue entry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::PermanentSource { .. } | Self::InvalidRequest(_)
        )
    }

    /// True when the same request may succeed on a later pass.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RetryExhausted { .. } | Self::RateLimited { .. }
        )
    }

    /// True when the whole run must abort rather than continue with the
    /// next batch or source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
