//! Typed decoding of raw column values
//!
//! Every semantic type a row accessor can return implements
//! [`FromDatabaseValue`]. The trait is sealed, so the set of conversions is
//! closed: each one either produces a value or reports that the raw value
//! cannot be represented. NULL never reaches these functions; the row
//! accessors deal with it first.

use super::value::DatabaseValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

mod sealed {
    pub trait Sealed {}
}

/// Conversion from a non-NULL raw value to a semantic type
pub trait FromDatabaseValue: Sized + sealed::Sealed {
    /// Name reported in type conversion errors
    const TYPE_NAME: &'static str;

    /// Convert the raw value, or `None` when it has no representation in `Self`
    fn from_database_value(value: &DatabaseValue) -> Option<Self>;
}

macro_rules! decodes {
    ($($ty:ty => $name:literal, |$v:ident| $body:expr;)+) => {
        $(
            impl sealed::Sealed for $ty {}

            impl FromDatabaseValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_database_value($v: &DatabaseValue) -> Option<Self> {
                    $body
                }
            }
        )+
    };
}

decodes! {
    String => "string", |v| v.as_str().map(str::to_string);
    i32 => "i32", |v| v.as_integer().and_then(|n| i32::try_from(n).ok());
    i64 => "i64", |v| v.as_integer();
    f64 => "f64", |v| v.as_double();
    bool => "bool", |v| v.as_bool();
    Vec<u8> => "bytes", |v| v.as_bytes().map(<[u8]>::to_vec);
    Decimal => "decimal", |v| decimal_from(v);
    NaiveDateTime => "timestamp", |v| timestamp_from(v);
    TimeDelta => "duration", |v| duration_from(v);
    Uuid => "guid", |v| uuid_from(v);
}

fn decimal_from(value: &DatabaseValue) -> Option<Decimal> {
    match value {
        DatabaseValue::Int(_) | DatabaseValue::Long(_) => value.as_integer().map(Decimal::from),
        DatabaseValue::Float(_) | DatabaseValue::Double(_) => {
            value.as_double().and_then(|f| Decimal::try_from(f).ok())
        }
        DatabaseValue::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn timestamp_from(value: &DatabaseValue) -> Option<NaiveDateTime> {
    match value {
        DatabaseValue::Timestamp(ts) => Some(*ts),
        // Unix seconds, as produced by SQLite's unixepoch()
        DatabaseValue::Int(_) | DatabaseValue::Long(_) => value
            .as_integer()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|dt| dt.naive_utc()),
        DatabaseValue::String(s) => parse_timestamp(s.trim()),
        _ => None,
    }
}

/// Parse the text layouts SQLite's date functions produce and accept.
pub(crate) fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    if let Some(parsed) = LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
    {
        return Some(parsed);
    }
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Some(with_offset.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn duration_from(value: &DatabaseValue) -> Option<TimeDelta> {
    match value {
        DatabaseValue::Int(_) | DatabaseValue::Long(_) => {
            value.as_integer().map(TimeDelta::microseconds)
        }
        DatabaseValue::String(s) => parse_duration(s.trim()),
        _ => None,
    }
}

/// Parse `[-][d.]hh:mm:ss[.ffffff]`.
pub(crate) fn parse_duration(text: &str) -> Option<TimeDelta> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut parts = body.split(':');
    let (head, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((days, hours)) => (parse_digits(days)?, parse_digits(hours)?),
        None => (0, parse_digits(head)?),
    };
    let minutes = parse_digits(minutes)?;
    let (whole_seconds, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (parse_digits(whole)?, fraction_micros(fraction)?),
        None => (parse_digits(seconds)?, 0),
    };
    if hours > 23 || minutes > 59 || whole_seconds > 59 {
        return None;
    }

    let total_seconds = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + whole_seconds)?;
    let micros = total_seconds.checked_mul(1_000_000)?.checked_add(fraction)?;
    Some(TimeDelta::microseconds(if negative { -micros } else { micros }))
}

fn parse_digits(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn fraction_micros(text: &str) -> Option<i64> {
    if text.is_empty() || text.len() > 7 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Pad to seven digits (100ns ticks), then drop to microseconds.
    let ticks: i64 = format!("{:0<7}", text).parse().ok()?;
    Some(ticks / 10)
}

fn uuid_from(value: &DatabaseValue) -> Option<Uuid> {
    match value {
        DatabaseValue::String(s) => Uuid::parse_str(s.trim()).ok(),
        DatabaseValue::Bytes(b) => Uuid::from_slice(b).ok(),
        _ => None,
    }
}

/// How a decoded timestamp should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateTimeKind {
    /// No zone information
    #[default]
    Unspecified,
    /// Coordinated universal time
    Utc,
    /// The local time zone of the reader
    Local,
}

/// A decoded timestamp labelled with the interpretation the caller asked for.
///
/// The label never shifts the value; it only records how it should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    value: NaiveDateTime,
    kind: DateTimeKind,
}

impl Timestamp {
    /// Label a wall-clock value
    pub fn new(value: NaiveDateTime, kind: DateTimeKind) -> Self {
        Self { value, kind }
    }

    /// The wall-clock value as stored
    pub fn naive(&self) -> NaiveDateTime {
        self.value
    }

    /// The interpretation label
    pub fn kind(&self) -> DateTimeKind {
        self.kind
    }

    /// The value as a UTC instant, when it is labelled UTC
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        match self.kind {
            DateTimeKind::Utc => Some(self.value.and_utc()),
            _ => None,
        }
    }
}

/// An enum decodable from a column by case name or discriminant.
///
/// Implement it with [`db_enum!`](crate::db_enum).
pub trait DbEnum: Sized + Copy + 'static {
    /// Name reported in invalid value errors
    const TYPE_NAME: &'static str;

    /// Every case with its exact name and discriminant
    const VARIANTS: &'static [(&'static str, i64, Self)];

    /// Case whose name equals `name` exactly
    fn from_name(name: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(case, _, _)| *case == name)
            .map(|(_, _, value)| *value)
    }

    /// Case whose discriminant equals `ordinal`
    fn from_ordinal(ordinal: i64) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(_, discriminant, _)| *discriminant == ordinal)
            .map(|(_, _, value)| *value)
    }
}

/// Implement [`DbEnum`] for a fieldless enum.
///
/// ```
/// use rust_scoped_db::{db_enum, DbEnum};
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Status {
///     Unknown,
///     Active,
///     Suspended = 10,
/// }
///
/// db_enum!(Status { Unknown, Active, Suspended });
///
/// assert_eq!(Status::from_name("Active"), Some(Status::Active));
/// assert_eq!(Status::from_ordinal(10), Some(Status::Suspended));
/// assert_eq!(Status::from_name("active"), None);
/// ```
#[macro_export]
macro_rules! db_enum {
    ($ty:ident { $($case:ident),+ $(,)? }) => {
        impl $crate::DbEnum for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);
            const VARIANTS: &'static [(&'static str, i64, Self)] =
                &[$((stringify!($case), $ty::$case as i64, $ty::$case)),+];
        }
    };
}
