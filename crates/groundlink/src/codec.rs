// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Telemetry packet codec.
//
// Every frame is `[category][tick LE32][fields LE32...]`. The payload width is
// fixed per category, so frames carry no length prefix. Decoding is safe:
// malformed input returns Err, never panics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Per-frame decode errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// First byte is not a known category.
    #[error("unknown category: 0x{0:02x}")]
    UnknownCategory(u8),

    /// Fewer bytes than the category's fixed frame length.
    #[error("truncated {category:?} packet: expected {expected} bytes, got {actual}")]
    TruncatedPacket {
        /// `None` when not even the category byte was present.
        category: Option<Category>,
        expected: usize,
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Category byte + LE32 tick.
pub const HEADER_SIZE: usize = 5;

/// Every payload field is 4 bytes on the wire.
pub const FIELD_SIZE: usize = 4;

pub const CAT_ORIENTATION_POSITION: u8 = 0x00;
pub const CAT_POSITION: u8 = 0x01;
pub const CAT_FLIGHT_MODE: u8 = 0x02;
pub const CAT_BATTERY_VOLTAGE: u8 = 0x03;
pub const CAT_AIRSPEED: u8 = 0x04;

/// Sample sequence number. Wraps to 0 after `u32::MAX`.
pub type TickStamp = u32;

// ---------------------------------------------------------------------------
// Schema table
// ---------------------------------------------------------------------------

/// Wire type of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    F32,
    U32,
}

const ORIENTATION_FIELDS: &[FieldKind] = &[FieldKind::F32, FieldKind::F32, FieldKind::F32];
const POSITION_FIELDS: &[FieldKind] = &[
    FieldKind::F32,
    FieldKind::F32,
    FieldKind::F32,
    FieldKind::F32,
];
const FLIGHT_MODE_FIELDS: &[FieldKind] = &[FieldKind::U32];
const BATTERY_VOLTAGE_FIELDS: &[FieldKind] = &[FieldKind::F32];
const AIRSPEED_FIELDS: &[FieldKind] = &[FieldKind::F32];

/// Packet category. Each value owns exactly one fixed payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    OrientationPosition = CAT_ORIENTATION_POSITION,
    Position = CAT_POSITION,
    FlightMode = CAT_FLIGHT_MODE,
    BatteryVoltage = CAT_BATTERY_VOLTAGE,
    Airspeed = CAT_AIRSPEED,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::OrientationPosition,
        Category::Position,
        Category::FlightMode,
        Category::BatteryVoltage,
        Category::Airspeed,
    ];

    pub fn from_u8(v: u8) -> Result<Self, CodecError> {
        match v {
            CAT_ORIENTATION_POSITION => Ok(Self::OrientationPosition),
            CAT_POSITION => Ok(Self::Position),
            CAT_FLIGHT_MODE => Ok(Self::FlightMode),
            CAT_BATTERY_VOLTAGE => Ok(Self::BatteryVoltage),
            CAT_AIRSPEED => Ok(Self::Airspeed),
            _ => Err(CodecError::UnknownCategory(v)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OrientationPosition => "orientation",
            Self::Position => "position",
            Self::FlightMode => "flight_mode",
            Self::BatteryVoltage => "battery_voltage",
            Self::Airspeed => "airspeed",
        }
    }

    /// Payload field layout, in wire order.
    pub fn fields(self) -> &'static [FieldKind] {
        match self {
            Self::OrientationPosition => ORIENTATION_FIELDS,
            Self::Position => POSITION_FIELDS,
            Self::FlightMode => FLIGHT_MODE_FIELDS,
            Self::BatteryVoltage => BATTERY_VOLTAGE_FIELDS,
            Self::Airspeed => AIRSPEED_FIELDS,
        }
    }

    pub fn payload_len(self) -> usize {
        self.fields().len() * FIELD_SIZE
    }

    /// Total bytes of a frame of this category.
    pub fn frame_len(self) -> usize {
        HEADER_SIZE + self.payload_len()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Attitude sample. Angle units are chosen by the producer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub tick: TickStamp,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Position sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub tick: TickStamp,
    pub altitude: f32,
    pub gps_lat: f32,
    pub gps_lng: f32,
    /// Laser rangefinder distance.
    pub laser: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightMode {
    pub tick: TickStamp,
    pub mode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryVoltage {
    pub tick: TickStamp,
    pub volts: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Airspeed {
    pub tick: TickStamp,
    pub meters_per_second: f32,
}

/// A decoded (or to-be-encoded) telemetry record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Orientation(Orientation),
    Position(Position),
    FlightMode(FlightMode),
    BatteryVoltage(BatteryVoltage),
    Airspeed(Airspeed),
}

impl Telemetry {
    pub fn category(&self) -> Category {
        match self {
            Self::Orientation(_) => Category::OrientationPosition,
            Self::Position(_) => Category::Position,
            Self::FlightMode(_) => Category::FlightMode,
            Self::BatteryVoltage(_) => Category::BatteryVoltage,
            Self::Airspeed(_) => Category::Airspeed,
        }
    }

    pub fn tick(&self) -> TickStamp {
        match self {
            Self::Orientation(r) => r.tick,
            Self::Position(r) => r.tick,
            Self::FlightMode(r) => r.tick,
            Self::BatteryVoltage(r) => r.tick,
            Self::Airspeed(r) => r.tick,
        }
    }
}

impl From<Orientation> for Telemetry {
    fn from(r: Orientation) -> Self {
        Self::Orientation(r)
    }
}

impl From<Position> for Telemetry {
    fn from(r: Position) -> Self {
        Self::Position(r)
    }
}

impl From<FlightMode> for Telemetry {
    fn from(r: FlightMode) -> Self {
        Self::FlightMode(r)
    }
}

impl From<BatteryVoltage> for Telemetry {
    fn from(r: BatteryVoltage) -> Self {
        Self::BatteryVoltage(r)
    }
}

impl From<Airspeed> for Telemetry {
    fn from(r: Airspeed) -> Self {
        Self::Airspeed(r)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Encoded, immutable frame ready for transmission.
///
/// Clones share the same buffer, so the relay fans a message out to many
/// sessions without copying the bytes. Each session copies it once when
/// handing it to its transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Message(Arc<[u8]>);

impl Message {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Category byte of the frame, if it is a known one.
    pub fn category(&self) -> Option<Category> {
        self.0.first().and_then(|b| Category::from_u8(*b).ok())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("category", &self.category())
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

struct FrameWriter {
    category: Category,
    buf: Vec<u8>,
}

impl FrameWriter {
    fn new(category: Category, tick: TickStamp) -> Self {
        let mut buf = Vec::with_capacity(category.frame_len());
        buf.push(category.as_u8());
        buf.extend_from_slice(&tick.to_le_bytes());
        Self { category, buf }
    }

    fn f32(mut self, v: f32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn finish(self) -> Message {
        debug_assert_eq!(self.buf.len(), self.category.frame_len());
        Message::from(self.buf)
    }
}

/// Encode a record into a fixed-length frame.
pub fn encode(record: &Telemetry) -> Message {
    let w = FrameWriter::new(record.category(), record.tick());
    match record {
        Telemetry::Orientation(r) => w.f32(r.roll).f32(r.pitch).f32(r.yaw),
        Telemetry::Position(r) => w.f32(r.altitude).f32(r.gps_lat).f32(r.gps_lng).f32(r.laser),
        Telemetry::FlightMode(r) => w.u32(r.mode),
        Telemetry::BatteryVoltage(r) => w.f32(r.volts),
        Telemetry::Airspeed(r) => w.f32(r.meters_per_second),
    }
    .finish()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Cursor over a frame whose length was already validated.
struct FrameReader<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            off: HEADER_SIZE,
        }
    }

    fn u32(&mut self) -> u32 {
        let b = self.buf;
        let o = self.off;
        self.off += FIELD_SIZE;
        u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(self.u32())
    }
}

/// Decode a frame. Bytes past the category's frame length are ignored.
pub fn decode(buf: &[u8]) -> Result<Telemetry, CodecError> {
    let Some(&first) = buf.first() else {
        return Err(CodecError::TruncatedPacket {
            category: None,
            expected: HEADER_SIZE,
            actual: 0,
        });
    };

    let category = Category::from_u8(first)?;
    let expected = category.frame_len();
    if buf.len() < expected {
        return Err(CodecError::TruncatedPacket {
            category: Some(category),
            expected,
            actual: buf.len(),
        });
    }

    let tick = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    let mut r = FrameReader::new(&buf[..expected]);

    let record = match category {
        Category::OrientationPosition => Telemetry::Orientation(Orientation {
            tick,
            roll: r.f32(),
            pitch: r.f32(),
            yaw: r.f32(),
        }),
        Category::Position => Telemetry::Position(Position {
            tick,
            altitude: r.f32(),
            gps_lat: r.f32(),
            gps_lng: r.f32(),
            laser: r.f32(),
        }),
        Category::FlightMode => Telemetry::FlightMode(FlightMode {
            tick,
            mode: r.u32(),
        }),
        Category::BatteryVoltage => Telemetry::BatteryVoltage(BatteryVoltage {
            tick,
            volts: r.f32(),
        }),
        Category::Airspeed => Telemetry::Airspeed(Airspeed {
            tick,
            meters_per_second: r.f32(),
        }),
    };

    Ok(record)
}
