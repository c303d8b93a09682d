//! Decoded BACnet property values

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::types::ObjectIdentifier;

/// Octet value meaning "unspecified" in dates and times
pub const UNSPECIFIED: u8 = 0xFF;

/// A property value after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString(BitString),
    Enumerated(u32),
    Date(Date),
    Time(Time),
    ObjectIdentifier(ObjectIdentifier),
    /// Elements of an array or list property, in order
    List(Vec<Value>),
    /// Context-tagged primitive found inside a constructed value
    Context { tag: u8, data: Vec<u8> },
    /// Items enclosed by an opening/closing tag pair
    Constructed { tag: u8, items: Vec<Value> },
    /// Composite value kept as the flat sequence of its items
    Sequence(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in mismatch messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Unsigned(_) => "Unsigned",
            Value::Signed(_) => "Integer",
            Value::Real(_) => "Real",
            Value::Double(_) => "Double",
            Value::OctetString(_) => "OctetString",
            Value::CharacterString(_) => "CharacterString",
            Value::BitString(_) => "BitString",
            Value::Enumerated(_) => "Enumerated",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::ObjectIdentifier(_) => "ObjectIdentifier",
            Value::List(_) => "List",
            Value::Context { .. } => "Context",
            Value::Constructed { .. } => "Constructed",
            Value::Sequence(_) => "Sequence",
        }
    }

    /// Convert to JSON for display
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::json!(*b),
            Value::Unsigned(u) => serde_json::json!(*u),
            Value::Signed(s) => serde_json::json!(*s),
            Value::Real(r) => serde_json::json!(*r),
            Value::Double(d) => serde_json::json!(*d),
            Value::OctetString(bytes) => serde_json::json!(hex(bytes)),
            Value::CharacterString(s) => serde_json::json!(s),
            Value::BitString(bits) => serde_json::json!(bits.to_string()),
            Value::Enumerated(e) => serde_json::json!(*e),
            Value::Date(d) => serde_json::json!(d.to_string()),
            Value::Time(t) => serde_json::json!(t.to_string()),
            Value::ObjectIdentifier(oid) => {
                serde_json::json!({
                    "type": oid.object_type.to_string(),
                    "instance": oid.instance
                })
            }
            Value::List(items) | Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Context { tag, data } => {
                serde_json::json!({ "context": tag, "data": hex(data) })
            }
            Value::Constructed { tag, items } => {
                let items: Vec<serde_json::Value> = items.iter().map(Value::to_json).collect();
                serde_json::json!({ "context": tag, "items": items })
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Unsigned(u) => write!(f, "{}", u),
            Value::Signed(s) => write!(f, "{}", s),
            Value::Real(r) => write!(f, "{}", r),
            Value::Double(d) => write!(f, "{}", d),
            Value::OctetString(bytes) => write!(f, "0x{}", hex(bytes)),
            Value::CharacterString(s) => f.write_str(s),
            Value::BitString(bits) => write!(f, "{}", bits),
            Value::Enumerated(e) => write!(f, "enum({})", e),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::List(items) | Value::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Context { tag, data } => write!(f, "[{}]0x{}", tag, hex(data)),
            Value::Constructed { tag, items } => write!(f, "[{}]{}", tag, Value::List(items.clone())),
        }
    }
}

/// Ordered bits of a BACnet bit string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitString {
    pub bits: Vec<bool>,
}

impl BitString {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for BitString {
    type Err = ();

    /// Parses a string of `0` and `1` characters, first bit first
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(BitString::new)
    }
}

/// BACnet date: year offset from 1900, month, day, day of week (1 = Monday)
///
/// Any octet may be [`UNSPECIFIED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.year == UNSPECIFIED {
            f.write_str("*")?;
        } else {
            write!(f, "{}", 1900 + u16::from(self.year))?;
        }
        f.write_str("-")?;
        fmt_octet(f, self.month)?;
        f.write_str("-")?;
        fmt_octet(f, self.day)
    }
}

impl FromStr for Date {
    type Err = ();

    /// Parses `YYYY-MM-DD`, any field may be `*`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(year), Some(month), Some(day), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(());
        };

        let year = match year {
            "*" => UNSPECIFIED,
            y => {
                let y: u16 = y.parse().map_err(|_| ())?;
                if !(1900..=2154).contains(&y) {
                    return Err(());
                }
                (y - 1900) as u8
            }
        };
        let month = parse_octet(month, 1..=12)?;
        let day = parse_octet(day, 1..=31)?;

        let weekday = if year == UNSPECIFIED || month == UNSPECIFIED || day == UNSPECIFIED {
            UNSPECIFIED
        } else {
            NaiveDate::from_ymd_opt(1900 + i32::from(year), u32::from(month), u32::from(day))
                .ok_or(())?
                .weekday()
                .number_from_monday() as u8
        };

        Ok(Date {
            year,
            month,
            day,
            weekday,
        })
    }
}

/// BACnet time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_octet(f, self.hour)?;
        f.write_str(":")?;
        fmt_octet(f, self.minute)?;
        f.write_str(":")?;
        fmt_octet(f, self.second)?;
        f.write_str(".")?;
        fmt_octet(f, self.hundredths)
    }
}

impl FromStr for Time {
    type Err = ();

    /// Parses `HH:MM[:SS[.hh]]`, any field may be `*`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (clock, hundredths) = match s.split_once('.') {
            Some((clock, hundredths)) => (clock, parse_octet(hundredths, 0..=99)?),
            None => (s, 0),
        };

        let mut parts = clock.split(':');
        let hour = parse_octet(parts.next().ok_or(())?, 0..=23)?;
        let minute = parse_octet(parts.next().ok_or(())?, 0..=59)?;
        let second = match parts.next() {
            Some(second) => parse_octet(second, 0..=59)?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(());
        }

        Ok(Time {
            hour,
            minute,
            second,
            hundredths,
        })
    }
}

fn parse_octet(s: &str, range: std::ops::RangeInclusive<u8>) -> Result<u8, ()> {
    if s == "*" {
        return Ok(UNSPECIFIED);
    }
    let v: u8 = s.parse().map_err(|_| ())?;
    if range.contains(&v) { Ok(v) } else { Err(()) }
}

fn fmt_octet(f: &mut fmt::Formatter<'_>, v: u8) -> fmt::Result {
    if v == UNSPECIFIED {
        f.write_str("*")
    } else {
        write!(f, "{:02}", v)
    }
}

/// Lower-case hex rendering of a byte string
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse an even-length hex string (no prefix)
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
