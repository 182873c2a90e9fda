//! Ordering field domains
//!
//! Bound discovery and partitioning bisect the value space of the ordering
//! field. Each supported field kind provides an [`OrderingDomain`] that maps
//! its values onto a dense, totally ordered integer space (an *ordinal*), so
//! the search and split algorithms only ever deal with integers:
//!
//! - integer: the value itself
//! - float: IEEE-754 total order over finite values
//! - timestamp: UTC milliseconds since the Unix epoch
//! - string: lexicographic rank among bounded printable-ASCII strings
//!
//! Two adjacent ordinals have no representable value between them, which is
//! what makes an interval "indivisible".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FilterError, Result};

pub mod string;

pub use string::StringDomain;

/// Kind of values held by the ordering field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Float,
    Timestamp,
    String,
}

/// A value of the ordering field's domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

/// Value-to-ordinal strategy for one field kind.
pub trait OrderingDomain: Send + Sync {
    /// Kind of values this domain handles.
    fn kind(&self) -> FieldKind;

    /// Inclusive ordinal range covering every representable value.
    fn ordinal_range(&self) -> (i128, i128);

    /// Map a value to its ordinal.
    ///
    /// Values that are not exactly representable map to the largest
    /// representable ordinal below them.
    fn to_ordinal(&self, value: &Bound) -> Result<i128>;

    /// Map an ordinal in [`OrderingDomain::ordinal_range`] back to a value.
    fn from_ordinal(&self, ordinal: i128) -> Bound;

    /// Floor midpoint of two ordinals, `lo <= mid <= hi`.
    fn midpoint(&self, lo: i128, hi: i128) -> i128 {
        lo + (hi - lo) / 2
    }
}

/// Build the domain strategy for a field kind.
///
/// `string_max_length` only applies to [`FieldKind::String`].
pub fn domain_for(kind: FieldKind, string_max_length: usize) -> Result<Box<dyn OrderingDomain>> {
    Ok(match kind {
        FieldKind::Integer => Box::new(IntegerDomain),
        FieldKind::Float => Box::new(FloatDomain),
        FieldKind::Timestamp => Box::new(TimestampDomain),
        FieldKind::String => Box::new(StringDomain::new(string_max_length)?),
    })
}

/* ========================= Bound ========================= */

impl Bound {
    /// Kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            Bound::Integer(_) => FieldKind::Integer,
            Bound::Float(_) => FieldKind::Float,
            Bound::Timestamp(_) => FieldKind::Timestamp,
            Bound::String(_) => FieldKind::String,
        }
    }

    /// Read a bound out of a BSON value, if the value has an ordering kind.
    pub fn from_bson(value: &Bson) -> Option<Bound> {
        match value {
            Bson::Int32(v) => Some(Bound::Integer(i64::from(*v))),
            Bson::Int64(v) => Some(Bound::Integer(*v)),
            Bson::Double(v) => Some(Bound::Float(*v)),
            Bson::DateTime(dt) => Utc
                .timestamp_millis_opt(dt.timestamp_millis())
                .single()
                .map(Bound::Timestamp),
            Bson::String(s) => Some(Bound::String(s.clone())),
            _ => None,
        }
    }

    /// Convert to the BSON value used in query documents.
    pub fn to_bson(&self) -> Bson {
        match self {
            Bound::Integer(v) => Bson::Int64(*v),
            Bound::Float(v) => Bson::Double(*v),
            Bound::Timestamp(ts) => {
                Bson::DateTime(bson::DateTime::from_millis(ts.timestamp_millis()))
            }
            Bound::String(s) => Bson::String(s.clone()),
        }
    }

    /// Compare two bounds of the same comparable family.
    ///
    /// Integers and floats compare numerically with each other, as search
    /// backends do. Other mixed kinds are incomparable.
    pub fn compare(&self, other: &Bound) -> Option<Ordering> {
        match (self, other) {
            (Bound::Integer(a), Bound::Integer(b)) => Some(a.cmp(b)),
            (Bound::Float(a), Bound::Float(b)) => a.partial_cmp(b),
            (Bound::Integer(a), Bound::Float(b)) => (*a as f64).partial_cmp(b),
            (Bound::Float(a), Bound::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Bound::Timestamp(a), Bound::Timestamp(b)) => Some(a.cmp(b)),
            (Bound::String(a), Bound::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Bound {
    /// Literal form used inside filter expressions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Integer(v) => write!(f, "{v}"),
            // Debug keeps a '.' or exponent so the literal reads back as a float
            Bound::Float(v) => write!(f, "{v:?}"),
            Bound::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Bound::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/* ========================= FieldKind ========================= */

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Timestamp => "timestamp",
            FieldKind::String => "string",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "long" => Ok(FieldKind::Integer),
            "float" | "double" => Ok(FieldKind::Float),
            "timestamp" | "date" | "datetime" => Ok(FieldKind::Timestamp),
            "string" => Ok(FieldKind::String),
            _ => Err(ConfigError::InvalidValue {
                field: "partition.field_kind".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

fn domain_mismatch(kind: FieldKind, value: &Bound) -> crate::error::ExportError {
    FilterError::DomainMismatch {
        kind: kind.to_string(),
        value: value.to_string(),
    }
    .into()
}

/* ========================= Numeric and time domains ========================= */

/// Signed 64-bit integers; one ordinal per integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerDomain;

impl OrderingDomain for IntegerDomain {
    fn kind(&self) -> FieldKind {
        FieldKind::Integer
    }

    fn ordinal_range(&self) -> (i128, i128) {
        (i128::from(i64::MIN), i128::from(i64::MAX))
    }

    fn to_ordinal(&self, value: &Bound) -> Result<i128> {
        match value {
            Bound::Integer(v) => Ok(i128::from(*v)),
            other => Err(domain_mismatch(self.kind(), other)),
        }
    }

    fn from_ordinal(&self, ordinal: i128) -> Bound {
        let (lo, hi) = self.ordinal_range();
        Bound::Integer(ordinal.clamp(lo, hi) as i64)
    }
}

/// Finite doubles in IEEE-754 total order.
///
/// Bisection happens over the bit patterns, so intervals close in a bounded
/// number of steps even across many orders of magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatDomain;

impl FloatDomain {
    fn bits_to_ordinal(value: f64) -> i64 {
        let bits = value.to_bits() as i64;
        if bits < 0 { bits ^ i64::MAX } else { bits }
    }

    fn ordinal_to_value(ordinal: i64) -> f64 {
        let bits = if ordinal < 0 { ordinal ^ i64::MAX } else { ordinal };
        f64::from_bits(bits as u64)
    }
}

impl OrderingDomain for FloatDomain {
    fn kind(&self) -> FieldKind {
        FieldKind::Float
    }

    fn ordinal_range(&self) -> (i128, i128) {
        (
            i128::from(Self::bits_to_ordinal(f64::MIN)),
            i128::from(Self::bits_to_ordinal(f64::MAX)),
        )
    }

    fn to_ordinal(&self, value: &Bound) -> Result<i128> {
        let v = match value {
            Bound::Float(v) if !v.is_nan() => *v,
            Bound::Integer(v) => *v as f64,
            other => return Err(domain_mismatch(self.kind(), other)),
        };
        let (lo, hi) = self.ordinal_range();
        Ok(i128::from(Self::bits_to_ordinal(v)).clamp(lo, hi))
    }

    fn from_ordinal(&self, ordinal: i128) -> Bound {
        let (lo, hi) = self.ordinal_range();
        Bound::Float(Self::ordinal_to_value(ordinal.clamp(lo, hi) as i64))
    }
}

/// UTC timestamps at millisecond precision, years 1 through 9999.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampDomain;

impl TimestampDomain {
    /// 0001-01-01T00:00:00.000Z
    const MIN_MILLIS: i64 = -62_135_596_800_000;
    /// 9999-12-31T23:59:59.999Z
    const MAX_MILLIS: i64 = 253_402_300_799_999;
}

impl OrderingDomain for TimestampDomain {
    fn kind(&self) -> FieldKind {
        FieldKind::Timestamp
    }

    fn ordinal_range(&self) -> (i128, i128) {
        (i128::from(Self::MIN_MILLIS), i128::from(Self::MAX_MILLIS))
    }

    fn to_ordinal(&self, value: &Bound) -> Result<i128> {
        match value {
            Bound::Timestamp(ts) => {
                let (lo, hi) = self.ordinal_range();
                Ok(i128::from(ts.timestamp_millis()).clamp(lo, hi))
            }
            other => Err(domain_mismatch(self.kind(), other)),
        }
    }

    fn from_ordinal(&self, ordinal: i128) -> Bound {
        let (lo, hi) = self.ordinal_range();
        let millis = ordinal.clamp(lo, hi) as i64;
        // Every clamped millisecond value is a valid chrono timestamp.
        let ts = Utc.timestamp_millis_opt(millis).single().unwrap_or_default();
        Bound::Timestamp(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_range_matches_calendar_limits() {
        let domain = TimestampDomain;
        let (lo, hi) = domain.ordinal_range();
        assert_eq!(
            domain.from_ordinal(lo).to_string(),
            "0001-01-01T00:00:00.000Z"
        );
        assert_eq!(
            domain.from_ordinal(hi).to_string(),
            "9999-12-31T23:59:59.999Z"
        );
    }

    #[test]
    fn test_float_ordinals_preserve_order() {
        let domain = FloatDomain;
        let values = [f64::MIN, -1.5, -0.0, 0.0, 1e-300, 2.5, 1e300, f64::MAX];
        let ordinals: Vec<i128> = values
            .iter()
            .map(|v| domain.to_ordinal(&Bound::Float(*v)).unwrap())
            .collect();
        assert!(ordinals.windows(2).all(|w| w[0] < w[1]));

        for v in values {
            let back = domain.from_ordinal(domain.to_ordinal(&Bound::Float(v)).unwrap());
            assert_eq!(back, Bound::Float(v));
        }
    }

    #[test]
    fn test_integer_domain_rejects_strings() {
        let domain = IntegerDomain;
        assert!(domain.to_ordinal(&Bound::String("x".into())).is_err());
        assert_eq!(domain.to_ordinal(&Bound::Integer(-7)).unwrap(), -7);
    }

    #[test]
    fn test_bound_literals() {
        assert_eq!(Bound::Integer(42).to_string(), "42");
        assert_eq!(Bound::Float(1.0).to_string(), "1.0");
        assert_eq!(Bound::String("o'brien".into()).to_string(), "'o''brien'");
    }

    #[test]
    fn test_bound_bson_roundtrip_kinds() {
        assert_eq!(Bound::from_bson(&Bson::Int32(3)), Some(Bound::Integer(3)));
        assert_eq!(Bound::from_bson(&Bson::Boolean(true)), None);

        let ts = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let bson = Bound::Timestamp(ts).to_bson();
        assert_eq!(Bound::from_bson(&bson), Some(Bound::Timestamp(ts)));
    }

    #[test]
    fn test_field_kind_parsing() {
        assert_eq!("Timestamp".parse::<FieldKind>().unwrap(), FieldKind::Timestamp);
        assert_eq!("long".parse::<FieldKind>().unwrap(), FieldKind::Integer);
        assert!("geo".parse::<FieldKind>().is_err());
    }
}
