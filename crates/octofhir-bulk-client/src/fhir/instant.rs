//! The FHIR `instant` type: UTC, millisecond precision.
//!
//! Output always renders as `yyyy-MM-ddTHH:mm:ss.SSSZ`. Input accepts any
//! RFC 3339 offset and normalizes to UTC at millisecond precision. Manifest
//! `transaction_time` values are additionally accepted as epoch milliseconds,
//! either as a JSON number or as a string of digits, matching what bulk
//! export servers emit in the wild.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

static FHIR_INSTANT_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// A FHIR instant: a UTC timestamp with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FhirInstant(OffsetDateTime);

/// An instant string (or epoch value) that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("Failed to parse FHIR instant from: {0}")]
pub struct InstantParseError(pub String);

impl FhirInstant {
    /// Creates an instant from a datetime, normalizing to UTC and truncating
    /// to millisecond precision.
    #[must_use]
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(truncate_to_millis(datetime.to_offset(UtcOffset::UTC)))
    }

    /// The current time as a FHIR instant.
    #[must_use]
    pub fn now() -> Self {
        Self::new(OffsetDateTime::now_utc())
    }

    /// Creates an instant from epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is outside the representable range.
    pub fn from_unix_millis(millis: i64) -> Result<Self, InstantParseError> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .map(Self::new)
            .map_err(|_| InstantParseError(millis.to_string()))
    }

    /// The wrapped datetime (always UTC).
    #[must_use]
    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    /// Epoch milliseconds of this instant.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

impl From<OffsetDateTime> for FhirInstant {
    fn from(value: OffsetDateTime) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for FhirInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(FHIR_INSTANT_FORMAT).map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for FhirInstant {
    type Err = InstantParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(millis) = s.parse::<i64>() {
            return Self::from_unix_millis(millis);
        }
        OffsetDateTime::parse(s, &Rfc3339)
            .map(Self::new)
            .map_err(|_| InstantParseError(s.to_string()))
    }
}

/// Formats a datetime as a FHIR instant string (UTC, millisecond precision).
#[must_use]
pub fn format_fhir_instant(instant: &FhirInstant) -> String {
    instant.to_string()
}

/// Parses a FHIR instant string, accepting any RFC 3339 offset.
///
/// # Errors
///
/// Returns an error if the string is not a valid instant.
pub fn parse_fhir_instant(s: &str) -> Result<FhirInstant, InstantParseError> {
    FhirInstant::from_str(s)
}

impl Serialize for FhirInstant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FhirInstant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(InstantVisitor)
    }
}

struct InstantVisitor;

impl serde::de::Visitor<'_> for InstantVisitor {
    type Value = FhirInstant;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a FHIR instant string or epoch milliseconds")
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        FhirInstant::from_unix_millis(v).map_err(E::custom)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        i64::try_from(v)
            .map_err(|_| E::custom(InstantParseError(v.to_string())))
            .and_then(|millis| FhirInstant::from_unix_millis(millis).map_err(E::custom))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        FhirInstant::from_str(v).map_err(E::custom)
    }
}

fn truncate_to_millis(value: OffsetDateTime) -> OffsetDateTime {
    let nanos = value.nanosecond() - value.nanosecond() % 1_000_000;
    value
        .replace_nanosecond(nanos)
        .expect("truncated nanosecond is always in range")
}
