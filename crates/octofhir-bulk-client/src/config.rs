//! Client configuration and the pre-flight validation machinery.
//!
//! Validation is a pure function over the assembled configuration: it
//! produces every violation in one pass, and the builder aggregates them —
//! sorted by path — into a single configuration error before any I/O.

use std::time::Duration;

/// Configuration for the async export protocol (polling behavior).
#[derive(Debug, Clone)]
pub struct AsyncConfig {
    /// Upper bound on cumulative transient-error responses during polling
    /// before the export fails. The budget is never reset by a subsequent
    /// success.
    pub max_transient_errors: u32,

    /// Delay between status polls when the server sends no `Retry-After`.
    pub min_polling_delay: Duration,

    /// Ceiling applied to any server-suggested polling delay.
    pub max_polling_delay: Duration,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            max_transient_errors: 3,
            min_polling_delay: Duration::from_secs(1),
            max_polling_delay: Duration::from_secs(60),
        }
    }
}

impl AsyncConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transient-error budget.
    #[must_use]
    pub fn with_max_transient_errors(mut self, max: u32) -> Self {
        self.max_transient_errors = max;
        self
    }

    /// Sets the delay used when `Retry-After` is absent.
    #[must_use]
    pub fn with_min_polling_delay(mut self, delay: Duration) -> Self {
        self.min_polling_delay = delay;
        self
    }

    /// Sets the ceiling for server-suggested delays.
    #[must_use]
    pub fn with_max_polling_delay(mut self, delay: Duration) -> Self {
        self.max_polling_delay = delay;
        self
    }
}

/// Configuration for the underlying HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Transport-level retries on socket failures (connect errors, read
    /// timeouts). Does not retry on HTTP status codes.
    pub retry_count: u32,

    /// Per-request read timeout.
    pub socket_timeout: Duration,

    /// Connection-pool ceiling per host. A warning is emitted when this is
    /// below the download worker count.
    pub max_connections_per_route: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            socket_timeout: Duration::from_secs(30),
            max_connections_per_route: 16,
        }
    }
}

impl HttpClientConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the socket-level retry count.
    #[must_use]
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the per-request read timeout.
    #[must_use]
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Sets the per-host connection-pool ceiling.
    #[must_use]
    pub fn with_max_connections_per_route(mut self, max: usize) -> Self {
        self.max_connections_per_route = max;
        self
    }
}

/// A single validation violation: the configuration path that failed and a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    /// Path of the offending option (e.g. `auth_config.client_id`).
    pub path: String,
    /// Why the option is invalid.
    pub message: String,
}

impl ConstraintViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Formats a violation set into the aggregated error message: one line per
/// violation, sorted by path.
#[must_use]
pub fn format_violations(title: &str, violations: &[ConstraintViolation]) -> String {
    let mut sorted: Vec<&ConstraintViolation> = violations.iter().collect();
    sorted.sort_by(|a, b| (&a.path, &a.message).cmp(&(&b.path, &b.message)));
    let lines: Vec<String> = sorted.iter().map(ToString::to_string).collect();
    format!("{title}\n{}", lines.join("\n"))
}
