//! Boxed "any value" support for raw fields.
//!
//! Raw-scalar and raw-array fields carry values whose concrete type is only
//! known at runtime. Instead of an open-ended dynamic type check, the wire
//! supports a closed tagged union over the registered primitive kinds:
//! [`RawValue`]. Anything outside the union is rejected at encode time with
//! `UnsupportedRawKind`.
//!
//! The two temporal kinds use signed 64-bit tick counts (one tick = 100 ns) so
//! negative spans and pre-epoch instants survive the trip.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::blob::BinaryBlob;
use crate::error::Result;

/// Ticks per second for [`TickDuration`] and [`Timestamp`] (100 ns ticks).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const NANOS_PER_TICK: i64 = 100;

/// A signed span of time in 100 ns ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TickDuration {
    ticks: i64,
}

impl TickDuration {
    /// Construct from a raw tick count.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// Raw tick count.
    pub const fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Convert from a std duration, saturating on overflow.
    pub fn from_std(d: std::time::Duration) -> Self {
        let ticks = (d.as_nanos() / NANOS_PER_TICK as u128).min(i64::MAX as u128);
        Self {
            ticks: ticks as i64,
        }
    }

    /// Convert to a std duration; `None` for negative spans.
    pub fn to_std(&self) -> Option<std::time::Duration> {
        u64::try_from(self.ticks)
            .ok()
            .map(|t| std::time::Duration::from_nanos(t * NANOS_PER_TICK as u64))
    }
}

/// An absolute UTC instant in 100 ns ticks since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    ticks: i64,
}

impl Timestamp {
    /// Construct from a raw tick count since the Unix epoch.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// Raw tick count since the Unix epoch.
    pub const fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Convert from a system time, saturating outside the representable range.
    pub fn from_system_time(t: SystemTime) -> Self {
        let ticks = match t.duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_nanos() / NANOS_PER_TICK as u128).min(i64::MAX as u128) as i64,
            Err(e) => {
                let before = (e.duration().as_nanos() / NANOS_PER_TICK as u128).min(i64::MAX as u128);
                -(before as i64)
            }
        };
        Self { ticks }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

macro_rules! raw_kinds {
    ($(($scalar:ident, $list:ident, $ty:ty, $add:ident, $read:ident)),+ $(,)?) => {
        /// Discriminant of a [`RawValue`], used to find its wire tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RawKind {
            $($scalar, $list,)+
        }

        impl RawKind {
            /// Human-readable kind name for diagnostics.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$scalar => stringify!($scalar),
                      Self::$list => stringify!($list),)+
                }
            }
        }

        /// A value carried by a raw-scalar or raw-array field.
        ///
        /// Closed union: one variant per registered built-in scalar plus the
        /// derived homogeneous list of each.
        #[derive(Debug, Clone, PartialEq)]
        pub enum RawValue {
            $($scalar($ty), $list(Vec<$ty>),)+
        }

        impl RawValue {
            /// The kind discriminant of this value.
            pub fn kind(&self) -> RawKind {
                match self {
                    $(Self::$scalar(_) => RawKind::$scalar,
                      Self::$list(_) => RawKind::$list,)+
                }
            }
        }

        /// Write a raw value's body (the tag is the caller's concern).
        pub(crate) fn write_value(blob: &mut BinaryBlob, value: &RawValue) {
            match value {
                $(
                    RawValue::$scalar(v) => write_scalar_body!(blob, v, $add),
                    RawValue::$list(items) => {
                        blob.add_u16(items.len() as u16);
                        for v in items {
                            write_scalar_body!(blob, v, $add);
                        }
                    }
                )+
            }
        }

        /// Read a raw value's body for a known kind.
        pub(crate) fn read_value(kind: RawKind, blob: &mut BinaryBlob) -> Result<RawValue> {
            Ok(match kind {
                $(
                    RawKind::$scalar => RawValue::$scalar(read_scalar_body!(blob, $read)),
                    RawKind::$list => {
                        let count = blob.read_u16()? as usize;
                        let mut items = Vec::with_capacity(count);
                        for _ in 0..count {
                            items.push(read_scalar_body!(blob, $read));
                        }
                        RawValue::$list(items)
                    }
                )+
            })
        }
    };
}

macro_rules! write_scalar_body {
    ($blob:ident, $v:ident, add_string) => {
        $blob.add_string($v)
    };
    ($blob:ident, $v:ident, add_ticks) => {
        $blob.add_i64($v.ticks())
    };
    ($blob:ident, $v:ident, $add:ident) => {
        $blob.$add(*$v)
    };
}

macro_rules! read_scalar_body {
    ($blob:ident, read_string) => {
        $blob.read_string()?
    };
    ($blob:ident, read_duration_ticks) => {
        TickDuration::from_ticks($blob.read_i64()?)
    };
    ($blob:ident, read_timestamp_ticks) => {
        Timestamp::from_ticks($blob.read_i64()?)
    };
    ($blob:ident, $read:ident) => {
        $blob.$read()?
    };
}

raw_kinds! {
    (U8, U8List, u8, add_u8, read_u8),
    (I8, I8List, i8, add_i8, read_i8),
    (U16, U16List, u16, add_u16, read_u16),
    (I16, I16List, i16, add_i16, read_i16),
    (U32, U32List, u32, add_u32, read_u32),
    (I32, I32List, i32, add_i32, read_i32),
    (U64, U64List, u64, add_u64, read_u64),
    (I64, I64List, i64, add_i64, read_i64),
    (F32, F32List, f32, add_f32, read_f32),
    (Str, StrList, String, add_string, read_string),
    (Duration, DurationList, TickDuration, add_ticks, read_duration_ticks),
    (Timestamp, TimestampList, Timestamp, add_ticks, read_timestamp_ticks),
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for RawValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for RawValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_body_round_trip() {
        let values = [
            RawValue::U8(200),
            RawValue::I32(-77),
            RawValue::U64(u64::MAX),
            RawValue::F32(1.25),
            RawValue::Str("szilva".to_string()),
            RawValue::Duration(TickDuration::from_ticks(-1500)),
            RawValue::Timestamp(Timestamp::from_ticks(638_000_000_000)),
        ];
        for v in values {
            let mut blob = BinaryBlob::with_capacity(64);
            write_value(&mut blob, &v);
            let back = read_value(v.kind(), &mut blob).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn test_list_body_round_trip() {
        let v = RawValue::StrList(vec!["alma".into(), "".into(), "korte".into()]);
        let mut blob = BinaryBlob::with_capacity(64);
        write_value(&mut blob, &v);
        assert_eq!(read_value(RawKind::StrList, &mut blob).unwrap(), v);
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(RawValue::I32(1).kind(), RawKind::I32);
        assert_eq!(RawValue::I32List(vec![]).kind(), RawKind::I32List);
        assert_eq!(RawKind::Str.name(), "Str");
    }

    #[test]
    fn test_tick_duration_std_conversion() {
        let d = TickDuration::from_std(std::time::Duration::from_millis(1));
        assert_eq!(d.ticks(), 10_000);
        assert_eq!(d.to_std().unwrap(), std::time::Duration::from_millis(1));
        assert!(TickDuration::from_ticks(-1).to_std().is_none());
    }

    #[test]
    fn test_timestamp_epoch_is_zero() {
        let t = Timestamp::from_system_time(std::time::UNIX_EPOCH);
        assert_eq!(t.ticks(), 0);
    }
}
