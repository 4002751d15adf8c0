//! Position data (`EGTS_SR_POS_DATA`)

use bytes::BufMut;

use super::{
    Subrecord,
    SubrecordData,
    SubrecordPayload,
    SubrecordType,
};
use crate::{
    DecodeError,
    EncodeError,
    Timestamp,
    util::{
        Cursor,
        bits::{
            BitLayout,
            field,
        },
        put_u24_le,
    },
};

const POSITION_FLAGS: BitLayout<8> = BitLayout::new([
    field("ALTE", 1),
    field("LOHS", 1),
    field("LAHS", 1),
    field("MV", 1),
    field("BB", 1),
    field("CS", 1),
    field("FIX", 1),
    field("VLD", 1),
]);

const MAX_SPEED: u16 = 0x3fff;
const MAX_DIRECTION: u16 = 0x1ff;
const MAX_U24: u32 = 0xff_ffff;

/// A navigation fix reported by a terminal
#[derive(Clone, Debug, PartialEq)]
pub struct PositionData {
    pub navigation_time: Timestamp,

    pub latitude: Latitude,

    pub longitude: Longitude,

    pub flags: PositionFlags,

    pub speed: Speed,

    /// Heading in degrees clockwise from north.
    ///
    /// A 9 bit field, so encoding accepts up to 511 even though terminals
    /// only send 0 to 359. On the wire this is split into a high bit in the
    /// speed field and a low byte.
    pub direction: u16,

    /// Sign of [`altitude`][Self::altitude]. Sent even if there is no
    /// altitude.
    pub altitude_negative: bool,

    /// Distance travelled in 0.1 km, 24 bits
    pub odometer: u32,

    /// Bit mask of digital inputs 1 to 8
    pub digital_inputs: u8,

    /// Why this position was recorded (e.g. timer, distance, ignition).
    pub source: u8,

    /// Altitude above sea level in meters, 24 bits
    pub altitude: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PositionFlags {
    /// Vehicle is moving
    pub moving: bool,

    /// Position was stored in the terminal's black box and is sent late
    pub black_box: bool,

    /// `false`: WGS-84, `true`: PZ-90.02
    pub coordinate_system: bool,

    /// 3D fix
    pub fix_3d: bool,

    /// Navigation data is valid
    pub valid: bool,
}

/// Latitude as a 32 bit fraction of 90°
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Latitude {
    pub raw: u32,
    pub south: bool,
}

impl Latitude {
    pub const fn from_raw(raw: u32, south: bool) -> Self {
        Self { raw, south }
    }

    /// Converts from degrees, truncating towards zero.
    pub fn from_degrees(degrees: f64) -> Result<Self, EncodeError> {
        let (raw, south) = degrees_to_raw("latitude", degrees, 90.0)?;
        Ok(Self { raw, south })
    }

    pub fn degrees(&self) -> f64 {
        raw_to_degrees(self.raw, self.south, 90.0)
    }
}

/// Longitude as a 32 bit fraction of 180°
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Longitude {
    pub raw: u32,
    pub west: bool,
}

impl Longitude {
    pub const fn from_raw(raw: u32, west: bool) -> Self {
        Self { raw, west }
    }

    /// Converts from degrees, truncating towards zero.
    pub fn from_degrees(degrees: f64) -> Result<Self, EncodeError> {
        let (raw, west) = degrees_to_raw("longitude", degrees, 180.0)?;
        Ok(Self { raw, west })
    }

    pub fn degrees(&self) -> f64 {
        raw_to_degrees(self.raw, self.west, 180.0)
    }
}

fn degrees_to_raw(
    field: &'static str,
    degrees: f64,
    range: f64,
) -> Result<(u32, bool), EncodeError> {
    if !degrees.is_finite() || degrees.abs() > range {
        return Err(EncodeError::CoordinateOutOfRange { field, degrees });
    }

    let raw = (degrees.abs() / range * f64::from(u32::MAX)).trunc() as u32;
    Ok((raw, degrees < 0.0))
}

fn raw_to_degrees(raw: u32, negative: bool, range: f64) -> f64 {
    let degrees = f64::from(raw) / f64::from(u32::MAX) * range;
    if negative {
        -degrees
    }
    else {
        degrees
    }
}

/// Speed in 0.1 km/h, 14 bits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Speed(u16);

impl Speed {
    pub const fn from_raw(tenths_km_per_hour: u16) -> Self {
        Self(tenths_km_per_hour)
    }

    pub fn from_km_per_hour(km_per_hour: f64) -> Result<Self, EncodeError> {
        let tenths = (km_per_hour * 10.0).round();
        if !(0.0..=f64::from(MAX_SPEED)).contains(&tenths) {
            return Err(EncodeError::FieldOutOfRange {
                field: "speed",
                value: tenths as i64,
                max: MAX_SPEED.into(),
            });
        }
        Ok(Self(tenths as u16))
    }

    pub fn as_raw(&self) -> u16 {
        self.0
    }

    pub fn km_per_hour(&self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl SubrecordPayload for PositionData {
    const SUBRECORD_TYPE: SubrecordType = SubrecordType::POS_DATA;

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let navigation_time = Timestamp::from_seconds(cursor.read_u32_le()?);
        let latitude = cursor.read_u32_le()?;
        let longitude = cursor.read_u32_le()?;
        let [alte, lohs, lahs, mv, bb, cs, fix, vld] = POSITION_FLAGS.unpack(cursor.read_u8()?);

        // DIRH(1) ALTS(1) SPD(14)
        let speed = cursor.read_u16_le()?;
        let direction_low = cursor.read_u8()?;
        let odometer = cursor.read_u24_le()?;
        let digital_inputs = cursor.read_u8()?;
        let source = cursor.read_u8()?;

        let altitude = if alte != 0 {
            Some(cursor.read_u24_le()?)
        }
        else {
            None
        };

        Ok(Self {
            navigation_time,
            latitude: Latitude::from_raw(latitude, lahs != 0),
            longitude: Longitude::from_raw(longitude, lohs != 0),
            flags: PositionFlags {
                moving: mv != 0,
                black_box: bb != 0,
                coordinate_system: cs != 0,
                fix_3d: fix != 0,
                valid: vld != 0,
            },
            speed: Speed(speed & MAX_SPEED),
            direction: ((speed >> 15) << 8) | u16::from(direction_low),
            altitude_negative: speed & 0x4000 != 0,
            odometer,
            digital_inputs,
            source,
            altitude,
        })
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), EncodeError> {
        EncodeError::check_range("speed", self.speed.0.into(), MAX_SPEED.into())?;
        EncodeError::check_range("direction", self.direction.into(), MAX_DIRECTION.into())?;
        EncodeError::check_range("odometer", self.odometer.into(), MAX_U24.into())?;
        if let Some(altitude) = self.altitude {
            EncodeError::check_range("altitude", altitude.into(), MAX_U24.into())?;
        }

        let flags = POSITION_FLAGS.pack([
            self.altitude.is_some().into(),
            self.longitude.west.into(),
            self.latitude.south.into(),
            self.flags.moving.into(),
            self.flags.black_box.into(),
            self.flags.coordinate_system.into(),
            self.flags.fix_3d.into(),
            self.flags.valid.into(),
        ])?;

        let speed = ((self.direction >> 8) << 15)
            | (u16::from(self.altitude_negative) << 14)
            | self.speed.0;

        buffer.put_u32_le(self.navigation_time.as_seconds());
        buffer.put_u32_le(self.latitude.raw);
        buffer.put_u32_le(self.longitude.raw);
        buffer.put_u8(flags);
        buffer.put_u16_le(speed);
        buffer.put_u8((self.direction & 0xff) as u8);
        put_u24_le(buffer, self.odometer);
        buffer.put_u8(self.digital_inputs);
        buffer.put_u8(self.source);
        if let Some(altitude) = self.altitude {
            put_u24_le(buffer, altitude);
        }

        Ok(())
    }
}

impl From<PositionData> for SubrecordData {
    fn from(value: PositionData) -> Self {
        Self::PositionData(value)
    }
}

impl From<PositionData> for Subrecord {
    fn from(value: PositionData) -> Self {
        Self::from_payload(value)
    }
}
