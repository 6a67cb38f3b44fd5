use chrono::DateTime;
use derive_more::{Add, AddAssign, Display, FromStr, Sub, SubAssign};
use serde::{Deserialize, Deserializer, Serialize, de};

/// Seconds in one UTC day.
const DAY_SECS: u64 = 86_400;

///
/// Timestamp
/// (in seconds)
///
/// The descending sort key of the remote ledger. Wire payloads carry it as
/// either an integer or an RFC3339 string; both decode through
/// [`Timestamp::parse_flexible`].
///

#[derive(
    Add,
    AddAssign,
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    Eq,
    FromStr,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Sub,
    SubAssign,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Self = Self(u64::MIN);
    pub const MAX: Self = Self(u64::MAX);

    /// Construct from seconds.
    #[must_use]
    pub const fn from_seconds(secs: u64) -> Self {
        Self(secs)
    }

    /// Construct from milliseconds (truncate to seconds).
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms / 1_000)
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn parse_rfc3339(s: &str) -> Result<Self, String> {
        let dt =
            DateTime::parse_from_rfc3339(s).map_err(|e| format!("timestamp parse error: {e}"))?;
        let ts = dt.timestamp();
        if ts < 0 {
            return Err("timestamp before epoch".to_string());
        }

        Ok(Self(ts as u64))
    }

    pub fn parse_flexible(s: &str) -> Result<Self, String> {
        // Try integer seconds
        if let Ok(n) = s.parse::<u64>() {
            return Ok(Self(n));
        }

        // Try RFC3339
        Self::parse_rfc3339(s)
    }

    /// Start of the UTC day containing this timestamp.
    #[must_use]
    pub const fn day_start(self) -> Self {
        Self(self.0 / DAY_SECS * DAY_SECS)
    }

    #[must_use]
    pub const fn saturating_add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FlexibleVisitor;

        impl de::Visitor<'_> for FlexibleVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("integer seconds or an RFC3339 string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                Ok(Timestamp(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                u64::try_from(v)
                    .map(Timestamp)
                    .map_err(|_| E::custom("timestamp before epoch"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
                Timestamp::parse_flexible(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(FlexibleVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_integer_forms() {
        let a = Timestamp::parse_flexible("1700000000").expect("integer form should parse");
        let b = Timestamp::parse_rfc3339("2023-11-14T22:13:20Z").expect("rfc3339 should parse");

        assert_eq!(a, b);
        assert_eq!(a.get(), 1_700_000_000);
    }

    #[test]
    fn rejects_pre_epoch_rfc3339() {
        let err = Timestamp::parse_rfc3339("1969-12-31T00:00:00Z")
            .expect_err("pre-epoch timestamps must be rejected");

        assert!(err.contains("before epoch"));
    }

    #[test]
    fn day_start_truncates_to_utc_midnight() {
        let t = Timestamp::from_seconds(1_700_000_000);

        assert_eq!(t.day_start().get() % 86_400, 0);
        assert!(t.day_start() <= t);
    }

    #[test]
    fn deserializes_from_number_and_string() {
        let n: Timestamp = serde_json::from_str("1700000000").expect("number form");
        let s: Timestamp = serde_json::from_str("\"2023-11-14T22:13:20Z\"").expect("string form");

        assert_eq!(n, s);
    }
}
