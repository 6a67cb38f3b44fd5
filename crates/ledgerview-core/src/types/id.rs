use derive_more::{Display, FromStr};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::str::FromStr as _;
use ulid::Ulid;

///
/// RecordId
///
/// Server-assigned ledger record identifier (ULID). Immutable for the life
/// of the record; the descending-order tie-break within equal timestamps.
///

#[derive(Clone, Copy, Debug, Display, Eq, FromStr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RecordId(Ulid);

impl RecordId {
    pub const MIN: Self = Self(Ulid::from_bytes([0x00; 16]));
    pub const MAX: Self = Self(Ulid::from_bytes([0xFF; 16]));

    #[must_use]
    pub const fn nil() -> Self {
        Self(Ulid::nil())
    }

    #[must_use]
    pub const fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        Ulid::from_str(&s)
            .map(Self)
            .map_err(|_| de::Error::custom("invalid ulid string"))
    }
}

///
/// CorrelationId
/// Tags a tentative optimistic patch until its authoritative confirmation.
///

#[derive(Clone, Copy, Debug, Display, Eq, FromStr, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct CorrelationId(Ulid);

impl CorrelationId {
    #[must_use]
    pub const fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }

    /// Derive the next correlation id from a monotonically increasing counter.
    #[must_use]
    pub const fn from_counter(counter: u128) -> Self {
        Self(Ulid::from_parts(0, counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_round_trips_through_json() {
        let id = RecordId::from_parts(1_700_000_000_000, 42);
        let json = serde_json::to_string(&id).expect("serialize");
        let back: RecordId = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(id, back);
    }

    #[test]
    fn record_id_rejects_malformed_strings() {
        let err = serde_json::from_str::<RecordId>("\"not-a-ulid\"")
            .expect_err("malformed ulid must fail to decode");

        assert!(err.to_string().contains("invalid ulid"));
    }

    #[test]
    fn correlation_ids_from_counter_are_ordered() {
        assert!(CorrelationId::from_counter(1) < CorrelationId::from_counter(2));
    }
}
