//! `Retry-After` header parsing.

use std::time::Duration;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// IMF-fixdate, the required HTTP-date format (RFC 7231 §7.1.1.1).
static IMF_FIXDATE: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// A parsed `Retry-After` value: either delta-seconds or an absolute
/// HTTP-date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryValue {
    /// Wait for the given duration.
    After(Duration),
    /// Wait until the given instant.
    At(OffsetDateTime),
}

impl RetryValue {
    /// Parses an HTTP `Retry-After` header value.
    ///
    /// Returns `None` for values that are neither non-negative
    /// delta-seconds nor an HTTP-date; an unparseable hint is treated as
    /// absent.
    #[must_use]
    pub fn parse_http_value(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Self::After(Duration::from_secs(seconds)));
        }
        PrimitiveDateTime::parse(value, IMF_FIXDATE)
            .ok()
            .map(|dt| Self::At(dt.assume_utc()))
    }

    /// The wait this value implies relative to `now`, saturating at zero.
    #[must_use]
    pub fn delay_from(&self, now: OffsetDateTime) -> Duration {
        match self {
            Self::After(duration) => *duration,
            Self::At(at) => {
                let delta = *at - now;
                delta.try_into().unwrap_or(Duration::ZERO)
            }
        }
    }

    /// The wait this value implies from the current time.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay_from(OffsetDateTime::now_utc())
    }
}
