//! EGTS timestamps
//!
//! Navigation and record times are sent as seconds since
//! 2010-01-01T00:00:00 UTC.

use chrono::{
    DateTime,
    Utc,
};

use crate::EncodeError;

/// The EGTS epoch (2010-01-01T00:00:00Z) as a unix timestamp.
pub const EPOCH_UNIX_SECONDS: i64 = 1_262_304_000;

/// Seconds since the EGTS epoch.
///
/// The raw wire value is kept, so decoding and re-encoding a timestamp is
/// lossless.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub const fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn as_seconds(&self) -> u32 {
        self.0
    }

    /// Fails if `time` is before the epoch or too far after it for 32 bits.
    pub fn from_utc(time: DateTime<Utc>) -> Result<Self, EncodeError> {
        let seconds = time.timestamp() - EPOCH_UNIX_SECONDS;
        u32::try_from(seconds).map(Self).map_err(|_| {
            EncodeError::FieldOutOfRange {
                field: "time",
                value: seconds,
                max: u32::MAX.into(),
            }
        })
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(EPOCH_UNIX_SECONDS + i64::from(self.0), 0)
            .expect("every u32 offset from the EGTS epoch is a valid chrono timestamp")
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(value: Timestamp) -> Self {
        value.to_utc()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{
        TimeZone,
        Utc,
    };

    use super::Timestamp;
    use crate::EncodeError;

    #[test]
    fn epoch_is_start_of_2010() {
        assert_eq!(
            Timestamp::EPOCH.to_utc(),
            Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn it_converts_reference_navigation_time() {
        let time = Timestamp::from_seconds(0x10013fd5);
        assert_eq!(
            time.to_utc(),
            Utc.with_ymd_and_hms(2018, 7, 5, 20, 8, 53).unwrap()
        );
        assert_eq!(Timestamp::from_utc(time.to_utc()).unwrap(), time);
    }

    #[test]
    fn it_rejects_times_before_the_epoch() {
        let time = Utc.with_ymd_and_hms(2009, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(
            Timestamp::from_utc(time),
            Err(EncodeError::FieldOutOfRange {
                field: "time",
                value: -1,
                ..
            })
        ));
    }
}
