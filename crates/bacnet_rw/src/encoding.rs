//! Application-tag codec for property values (ASHRAE 135 clause 20.2)
//!
//! A property value travels as one or more tagged items. Each item starts with
//! an initial octet carrying the tag number (high nibble, 15 = extended), the
//! class bit (0x08 = context specific) and a length/value/type field:
//! - 0..=4: content length
//! - 5: extended length follows (254 = two octets, 255 = four octets)
//! - 6 / 7: opening / closing tag (context class only)
//!
//! Application Boolean carries its value in the length field.

use crate::datatype::{AtomicKind, Datatype};
use crate::error::DecodeError;
use crate::types::ObjectIdentifier;
use crate::value::{BitString, Date, Time, Value};

/// Application tag numbers
pub mod tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const UNSIGNED: u8 = 2;
    pub const SIGNED: u8 = 3;
    pub const REAL: u8 = 4;
    pub const DOUBLE: u8 = 5;
    pub const OCTET_STRING: u8 = 6;
    pub const CHARACTER_STRING: u8 = 7;
    pub const BIT_STRING: u8 = 8;
    pub const ENUMERATED: u8 = 9;
    pub const DATE: u8 = 10;
    pub const TIME: u8 = 11;
    pub const OBJECT_IDENTIFIER: u8 = 12;
}

const CONTEXT_CLASS: u8 = 0x08;
const CHARSET_UTF8: u8 = 0;
const CHARSET_ISO_8859_1: u8 = 5;

/// Encoded bytes of a property value
///
/// Built by the request builder for writes and carried in read acks. The
/// bytes are interpreted only once a datatype is known.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Any(Vec<u8>);

impl Any {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode a value with application tags
    pub fn encode(value: &Value) -> Self {
        let mut buf = Vec::new();
        encode_value(&mut buf, value);
        Self(buf)
    }

    /// Decode the contents as an instance of `datatype`
    ///
    /// Atomic datatypes require exactly one item with the matching
    /// application tag. Arrays and lists decode every item as an element.
    /// Composite values are returned as the flat sequence of their items.
    pub fn decode_as(&self, datatype: &Datatype) -> Result<Value, DecodeError> {
        let mut reader = Reader::new(&self.0);

        let value = match datatype {
            Datatype::Atomic(kind) => reader.read_atomic(*kind)?,
            Datatype::Array(element) | Datatype::List(element) => {
                let mut items = Vec::new();
                while !reader.at_end() {
                    items.push(match element.as_ref() {
                        Datatype::Atomic(kind) => reader.read_atomic(*kind)?,
                        _ => reader.read_item()?,
                    });
                }
                Value::List(items)
            }
            Datatype::Composite(_) => Value::Sequence(reader.read_all()?),
        };

        reader.finish()?;
        Ok(value)
    }

    /// Decode every item without a datatype to guide it
    pub fn decode_items(&self) -> Result<Vec<Value>, DecodeError> {
        Reader::new(&self.0).read_all()
    }

    /// Decode a single item without a datatype to guide it
    pub fn decode_single(&self) -> Result<Value, DecodeError> {
        let mut reader = Reader::new(&self.0);
        let value = reader.read_item()?;
        reader.finish()?;
        Ok(value)
    }
}

impl From<Vec<u8>> for Any {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoder
// ─────────────────────────────────────────────────────────────────────────────

fn write_initial(buf: &mut Vec<u8>, number: u8, class: u8, lvt: u8) {
    if number < 15 {
        buf.push((number << 4) | class | lvt);
    } else {
        buf.push(0xF0 | class | lvt);
        buf.push(number);
    }
}

fn write_tag(buf: &mut Vec<u8>, number: u8, context: bool, len: usize) {
    let class = if context { CONTEXT_CLASS } else { 0 };
    if len < 5 {
        write_initial(buf, number, class, len as u8);
    } else {
        write_initial(buf, number, class, 5);
        if len < 254 {
            buf.push(len as u8);
        } else if len <= u16::MAX as usize {
            buf.push(254);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            buf.push(255);
            buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

fn write_primitive(buf: &mut Vec<u8>, number: u8, content: &[u8]) {
    write_tag(buf, number, false, content.len());
    buf.extend_from_slice(content);
}

fn unsigned_bytes(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

fn signed_bytes(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut skip = 0;
    // drop redundant sign octets
    while skip < 7 {
        let (head, next) = (bytes[skip], bytes[skip + 1]);
        if (head == 0x00 && next & 0x80 == 0) || (head == 0xFF && next & 0x80 != 0) {
            skip += 1;
        } else {
            break;
        }
    }
    bytes[skip..].to_vec()
}

fn bit_string_bytes(bits: &BitString) -> Vec<u8> {
    let used = bits.bits.len() % 8;
    let unused = if used == 0 { 0 } else { 8 - used };
    let mut out = vec![unused as u8];
    for chunk in bits.bits.chunks(8) {
        let mut octet = 0u8;
        for (i, bit) in chunk.iter().enumerate() {
            if *bit {
                octet |= 0x80 >> i;
            }
        }
        out.push(octet);
    }
    out
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => write_primitive(buf, tag::NULL, &[]),
        Value::Boolean(b) => write_initial(buf, tag::BOOLEAN, 0, u8::from(*b)),
        Value::Unsigned(v) => write_primitive(buf, tag::UNSIGNED, &unsigned_bytes(*v)),
        Value::Signed(v) => write_primitive(buf, tag::SIGNED, &signed_bytes(*v)),
        Value::Real(v) => write_primitive(buf, tag::REAL, &v.to_be_bytes()),
        Value::Double(v) => write_primitive(buf, tag::DOUBLE, &v.to_be_bytes()),
        Value::OctetString(bytes) => write_primitive(buf, tag::OCTET_STRING, bytes),
        Value::CharacterString(s) => {
            let mut content = Vec::with_capacity(s.len() + 1);
            content.push(CHARSET_UTF8);
            content.extend_from_slice(s.as_bytes());
            write_primitive(buf, tag::CHARACTER_STRING, &content);
        }
        Value::BitString(bits) => write_primitive(buf, tag::BIT_STRING, &bit_string_bytes(bits)),
        Value::Enumerated(v) => {
            write_primitive(buf, tag::ENUMERATED, &unsigned_bytes(u64::from(*v)))
        }
        Value::Date(d) => {
            write_primitive(buf, tag::DATE, &[d.year, d.month, d.day, d.weekday])
        }
        Value::Time(t) => {
            write_primitive(buf, tag::TIME, &[t.hour, t.minute, t.second, t.hundredths])
        }
        Value::ObjectIdentifier(oid) => {
            write_primitive(buf, tag::OBJECT_IDENTIFIER, &oid.to_u32().to_be_bytes())
        }
        Value::List(items) | Value::Sequence(items) => {
            for item in items {
                encode_value(buf, item);
            }
        }
        Value::Context { tag, data } => {
            write_tag(buf, *tag, true, data.len());
            buf.extend_from_slice(data);
        }
        Value::Constructed { tag, items } => {
            write_initial(buf, *tag, CONTEXT_CLASS, 6);
            for item in items {
                encode_value(buf, item);
            }
            write_initial(buf, *tag, CONTEXT_CLASS, 7);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Content of the given length follows
    Primitive(usize),
    /// Application Boolean, value in the header
    Boolean(bool),
    Opening,
    Closing,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    number: u8,
    context: bool,
    shape: Shape,
}

impl Header {
    fn describe(&self) -> String {
        match (self.context, self.shape) {
            (_, Shape::Opening) => format!("opening tag {}", self.number),
            (_, Shape::Closing) => format!("closing tag {}", self.number),
            (true, _) => format!("context tag {}", self.number),
            (false, _) => application_name(self.number).to_string(),
        }
    }
}

fn application_name(number: u8) -> &'static str {
    match number {
        tag::NULL => "Null",
        tag::BOOLEAN => "Boolean",
        tag::UNSIGNED => "Unsigned",
        tag::SIGNED => "Integer",
        tag::REAL => "Real",
        tag::DOUBLE => "Double",
        tag::OCTET_STRING => "OctetString",
        tag::CHARACTER_STRING => "CharacterString",
        tag::BIT_STRING => "BitString",
        tag::ENUMERATED => "Enumerated",
        tag::DATE => "Date",
        tag::TIME => "Time",
        tag::OBJECT_IDENTIFIER => "ObjectIdentifier",
        _ => "reserved application tag",
    }
}

/// Deepest nesting of opening tags a reply may carry
pub const MAX_NESTING: usize = 32;

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(DecodeError::TrailingData(self.data.len() - self.pos))
        }
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn header(&mut self) -> Result<Header, DecodeError> {
        let start = self.pos;
        let initial = self.byte()?;
        let context = initial & CONTEXT_CLASS != 0;
        let number = match initial >> 4 {
            15 => self.byte()?,
            n => n,
        };
        let lvt = initial & 0x07;

        let shape = match lvt {
            0..=4 if !context && number == tag::BOOLEAN => match lvt {
                0 => Shape::Boolean(false),
                1 => Shape::Boolean(true),
                _ => return Err(DecodeError::InvalidTag(start)),
            },
            0..=4 => Shape::Primitive(usize::from(lvt)),
            5 => {
                let len = match self.byte()? {
                    254 => {
                        let b = self.take(2)?;
                        usize::from(u16::from_be_bytes([b[0], b[1]]))
                    }
                    255 => {
                        let b = self.take(4)?;
                        u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
                    }
                    n => usize::from(n),
                };
                Shape::Primitive(len)
            }
            6 if context => Shape::Opening,
            7 if context => Shape::Closing,
            _ => return Err(DecodeError::InvalidTag(start)),
        };

        Ok(Header {
            number,
            context,
            shape,
        })
    }

    fn read_all(&mut self) -> Result<Vec<Value>, DecodeError> {
        let mut items = Vec::new();
        while !self.at_end() {
            items.push(self.read_item()?);
        }
        Ok(items)
    }

    /// Read one item of whatever kind comes next
    fn read_item(&mut self) -> Result<Value, DecodeError> {
        let header = self.header()?;
        match header.shape {
            Shape::Opening => {
                if self.depth >= MAX_NESTING {
                    return Err(DecodeError::NestingTooDeep(MAX_NESTING));
                }
                self.depth += 1;
                let mut items = Vec::new();
                loop {
                    if self.at_end() {
                        return Err(DecodeError::UnbalancedTag(header.number));
                    }
                    let mark = self.pos;
                    let next = self.header()?;
                    if next.shape == Shape::Closing {
                        if next.number != header.number {
                            return Err(DecodeError::UnbalancedTag(next.number));
                        }
                        break;
                    }
                    self.pos = mark;
                    items.push(self.read_item()?);
                }
                self.depth -= 1;
                Ok(Value::Constructed {
                    tag: header.number,
                    items,
                })
            }
            Shape::Closing => Err(DecodeError::UnbalancedTag(header.number)),
            Shape::Boolean(b) => Ok(Value::Boolean(b)),
            Shape::Primitive(len) if header.context => Ok(Value::Context {
                tag: header.number,
                data: self.take(len)?.to_vec(),
            }),
            Shape::Primitive(len) => {
                let content = self.take(len)?;
                decode_application(header.number, content)
            }
        }
    }

    /// Read one item that must carry the application tag of `kind`
    fn read_atomic(&mut self, kind: AtomicKind) -> Result<Value, DecodeError> {
        let header = self.header()?;
        if header.context || header.number != kind.application_tag() {
            return Err(DecodeError::TagMismatch {
                expected: kind.name().to_string(),
                found: header.describe(),
            });
        }
        match header.shape {
            Shape::Boolean(b) => Ok(Value::Boolean(b)),
            Shape::Primitive(len) => {
                let content = self.take(len)?;
                decode_application(header.number, content)
            }
            Shape::Opening | Shape::Closing => Err(DecodeError::TagMismatch {
                expected: kind.name().to_string(),
                found: header.describe(),
            }),
        }
    }
}

fn fixed<const N: usize>(content: &[u8], what: &'static str) -> Result<[u8; N], DecodeError> {
    content
        .try_into()
        .map_err(|_| DecodeError::InvalidEncoding(what))
}

fn decode_unsigned(content: &[u8], what: &'static str) -> Result<u64, DecodeError> {
    if content.is_empty() || content.len() > 8 {
        return Err(DecodeError::InvalidEncoding(what));
    }
    Ok(content.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_signed(content: &[u8]) -> Result<i64, DecodeError> {
    if content.is_empty() || content.len() > 8 {
        return Err(DecodeError::InvalidEncoding("Integer"));
    }
    let fill = if content[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut bytes = [fill; 8];
    bytes[8 - content.len()..].copy_from_slice(content);
    Ok(i64::from_be_bytes(bytes))
}

fn decode_application(number: u8, content: &[u8]) -> Result<Value, DecodeError> {
    Ok(match number {
        tag::NULL => {
            if !content.is_empty() {
                return Err(DecodeError::InvalidEncoding("Null"));
            }
            Value::Null
        }
        tag::UNSIGNED => Value::Unsigned(decode_unsigned(content, "Unsigned")?),
        tag::SIGNED => Value::Signed(decode_signed(content)?),
        tag::REAL => Value::Real(f32::from_be_bytes(fixed(content, "Real")?)),
        tag::DOUBLE => Value::Double(f64::from_be_bytes(fixed(content, "Double")?)),
        tag::OCTET_STRING => Value::OctetString(content.to_vec()),
        tag::CHARACTER_STRING => {
            let (charset, text) = content
                .split_first()
                .ok_or(DecodeError::InvalidEncoding("CharacterString"))?;
            match *charset {
                CHARSET_UTF8 => Value::CharacterString(
                    String::from_utf8(text.to_vec())
                        .map_err(|_| DecodeError::InvalidEncoding("CharacterString"))?,
                ),
                CHARSET_ISO_8859_1 => {
                    Value::CharacterString(text.iter().map(|b| char::from(*b)).collect())
                }
                other => return Err(DecodeError::UnsupportedCharset(other)),
            }
        }
        tag::BIT_STRING => {
            let (unused, octets) = content
                .split_first()
                .ok_or(DecodeError::InvalidEncoding("BitString"))?;
            if *unused > 7 || (octets.is_empty() && *unused != 0) {
                return Err(DecodeError::InvalidEncoding("BitString"));
            }
            let count = octets.len() * 8 - usize::from(*unused);
            let bits = (0..count)
                .map(|i| octets[i / 8] & (0x80 >> (i % 8)) != 0)
                .collect();
            Value::BitString(BitString::new(bits))
        }
        tag::ENUMERATED => {
            let v = decode_unsigned(content, "Enumerated")?;
            Value::Enumerated(u32::try_from(v).map_err(|_| DecodeError::InvalidEncoding("Enumerated"))?)
        }
        tag::DATE => {
            let [year, month, day, weekday] = fixed(content, "Date")?;
            Value::Date(Date {
                year,
                month,
                day,
                weekday,
            })
        }
        tag::TIME => {
            let [hour, minute, second, hundredths] = fixed(content, "Time")?;
            Value::Time(Time {
                hour,
                minute,
                second,
                hundredths,
            })
        }
        tag::OBJECT_IDENTIFIER => Value::ObjectIdentifier(ObjectIdentifier::from_u32(
            u32::from_be_bytes(fixed(content, "ObjectIdentifier")?),
        )),
        _ => return Err(DecodeError::InvalidEncoding("reserved application tag")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{BINARY_PV, Datatype};
    use crate::types::ObjectType;

    #[test]
    fn test_known_encodings() {
        assert_eq!(Any::encode(&Value::Null).as_bytes(), &[0x00]);
        assert_eq!(Any::encode(&Value::Boolean(true)).as_bytes(), &[0x11]);
        assert_eq!(Any::encode(&Value::Unsigned(72)).as_bytes(), &[0x21, 72]);
        assert_eq!(Any::encode(&Value::Unsigned(256)).as_bytes(), &[0x22, 0x01, 0x00]);
        assert_eq!(Any::encode(&Value::Signed(-1)).as_bytes(), &[0x31, 0xFF]);
        assert_eq!(Any::encode(&Value::Signed(128)).as_bytes(), &[0x32, 0x00, 0x80]);
        assert_eq!(
            Any::encode(&Value::Real(72.5)).as_bytes(),
            &[0x44, 0x42, 0x91, 0x00, 0x00]
        );
        assert_eq!(Any::encode(&Value::Enumerated(1)).as_bytes(), &[0x91, 0x01]);
        assert_eq!(
            Any::encode(&Value::CharacterString("Hi".into())).as_bytes(),
            &[0x73, 0x00, b'H', b'i']
        );
        assert_eq!(
            Any::encode(&Value::ObjectIdentifier(ObjectIdentifier::new(ObjectType::AnalogInput, 1)))
                .as_bytes(),
            &[0xC4, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_extended_length() {
        let text = "x".repeat(300);
        let any = Any::encode(&Value::CharacterString(text.clone()));
        assert_eq!(&any.as_bytes()[..4], &[0x75, 254, 0x01, 0x2D]);
        let decoded = any
            .decode_as(&Datatype::Atomic(AtomicKind::CharacterString))
            .unwrap();
        assert_eq!(decoded, Value::CharacterString(text));
    }

    #[test]
    fn test_atomic_values_survive_encoding() {
        let cases = [
            (Value::Real(72.5), AtomicKind::Real),
            (Value::Double(-0.125), AtomicKind::Double),
            (Value::Signed(-40_000), AtomicKind::Integer),
            (Value::Unsigned(u64::from(u32::MAX) + 1), AtomicKind::Unsigned),
            (Value::Boolean(false), AtomicKind::Boolean),
            (Value::Enumerated(1), AtomicKind::Enumerated(&BINARY_PV)),
            (Value::BitString("1011000001".parse().unwrap()), AtomicKind::BitString),
            (Value::OctetString(vec![1, 2, 3, 4, 5, 6]), AtomicKind::OctetString),
            (Value::Date("2024-06-30".parse().unwrap()), AtomicKind::Date),
            (Value::Time("08:15:00".parse().unwrap()), AtomicKind::Time),
        ];
        for (value, kind) in cases {
            let decoded = Any::encode(&value).decode_as(&Datatype::Atomic(kind)).unwrap();
            assert_eq!(decoded, value, "{}", kind.name());
        }
    }

    #[test]
    fn test_atomic_tag_mismatch() {
        let any = Any::encode(&Value::Unsigned(3));
        let err = any.decode_as(&Datatype::Atomic(AtomicKind::Real)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TagMismatch {
                expected: "Real".into(),
                found: "Unsigned".into()
            }
        );
    }

    #[test]
    fn test_trailing_and_truncated() {
        let mut bytes = Any::encode(&Value::Real(1.0)).into_bytes();
        bytes.push(0x00);
        let err = Any::from_bytes(bytes)
            .decode_as(&Datatype::Atomic(AtomicKind::Real))
            .unwrap_err();
        assert_eq!(err, DecodeError::TrailingData(1));

        let err = Any::from_bytes(vec![0x44, 0x42])
            .decode_as(&Datatype::Atomic(AtomicKind::Real))
            .unwrap_err();
        assert_eq!(err, DecodeError::Truncated);
    }

    #[test]
    fn test_array_decodes_elements() {
        let list = Value::List(vec![
            Value::CharacterString("off".into()),
            Value::CharacterString("on".into()),
        ]);
        let datatype = Datatype::Array(Box::new(Datatype::Atomic(AtomicKind::CharacterString)));
        assert_eq!(Any::encode(&list).decode_as(&datatype).unwrap(), list);
    }

    #[test]
    fn test_constructed_items() {
        let value = Value::Sequence(vec![
            Value::Constructed {
                tag: 0,
                items: vec![Value::Time("06:00".parse().unwrap()), Value::Real(21.0)],
            },
            Value::Context { tag: 1, data: vec![0x05] },
        ]);
        let any = Any::encode(&value);
        assert_eq!(any.as_bytes()[0], 0x0E);
        let decoded = any.decode_as(&Datatype::Composite("BACnetTest")).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_unbalanced_constructed() {
        let err = Any::from_bytes(vec![0x0E, 0x21, 0x01]).decode_items().unwrap_err();
        assert_eq!(err, DecodeError::UnbalancedTag(0));

        let err = Any::from_bytes(vec![0x0F]).decode_items().unwrap_err();
        assert_eq!(err, DecodeError::UnbalancedTag(0));
    }

    #[test]
    fn test_nesting_limit() {
        let err = Any::from_bytes(vec![0x0E; 200_000])
            .decode_as(&Datatype::Composite("BACnetTest"))
            .unwrap_err();
        assert_eq!(err, DecodeError::NestingTooDeep(MAX_NESTING));

        let mut bytes = vec![0x0E; MAX_NESTING];
        bytes.extend(vec![0x0F; MAX_NESTING]);
        let decoded = Any::from_bytes(bytes)
            .decode_as(&Datatype::Composite("BACnetTest"))
            .unwrap();
        assert!(matches!(decoded, Value::Sequence(items) if items.len() == 1));
    }

    #[test]
    fn test_latin1_character_string() {
        let any = Any::from_bytes(vec![0x73, 0x05, 0xE9, b'A']);
        assert_eq!(
            any.decode_single().unwrap(),
            Value::CharacterString("\u{e9}A".into())
        );
        let any = Any::from_bytes(vec![0x72, 0x03, b'A']);
        assert_eq!(any.decode_single().unwrap_err(), DecodeError::UnsupportedCharset(3));
    }
}
