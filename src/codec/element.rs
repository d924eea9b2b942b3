//! The decoded TLV value: [`Element`], plus the integer and composite
//! encode/decode helpers shared by every message kind in `crate::message`.

use bytes::{Bytes, BytesMut};

use super::{length, tag};

#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Integer(i64),
    Boolean(bool),
    OctetString(Bytes),
    Null,
    /// A universal-class composite, used for nested structures within a
    /// message body (e.g. the optional auth sub-object on Client-Hello).
    Sequence(Vec<Element>),
    /// An application-tagged top-level frame. The children are empty for
    /// content-free messages (Keepalive, Server-Shutdown).
    Message(tag::Tag, Vec<Element>),
}

#[derive(Debug)]
pub enum Error {
    InvalidBoolean,
    InvalidInteger,
    InvalidNull,
    UnknownUniversalTag(u8),
    TruncatedChild,
    TrailingBytes,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidBoolean => write!(f, "boolean element is not exactly one byte"),
            Error::InvalidInteger => write!(f, "integer element is empty or longer than 8 bytes"),
            Error::InvalidNull => write!(f, "null element carried a nonempty value"),
            Error::UnknownUniversalTag(t) => write!(f, "unknown universal tag {t:#04x}"),
            Error::TruncatedChild => write!(f, "composite ended mid-child"),
            Error::TrailingBytes => {
                write!(f, "composite declared length exceeds its children's encoded size")
            },
        }
    }
}

impl std::error::Error for Error {}

impl Element {
    /// Decodes the value bytes of a single outer TLV frame, given its tag.
    pub(crate) fn decode(raw_tag: u8, value: Bytes) -> Result<Self, Error> {
        if tag::is_application(raw_tag) {
            let children = decode_children(&value)?;
            return Ok(Element::Message(tag::Tag(raw_tag), children));
        }

        match tag::type_number(raw_tag) {
            tag::UNIVERSAL_BOOLEAN => {
                if value.len() != 1 {
                    return Err(Error::InvalidBoolean);
                }
                Ok(Element::Boolean(value[0] != 0))
            },
            tag::UNIVERSAL_INTEGER => Ok(Element::Integer(decode_integer(&value)?)),
            tag::UNIVERSAL_OCTET_STRING => Ok(Element::OctetString(value)),
            tag::UNIVERSAL_NULL => {
                if !value.is_empty() {
                    return Err(Error::InvalidNull);
                }
                Ok(Element::Null)
            },
            tag::UNIVERSAL_SEQUENCE => Ok(Element::Sequence(decode_children(&value)?)),
            other => Err(Error::UnknownUniversalTag(other)),
        }
    }

    /// Appends the full TLV encoding of this element to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Element::Integer(v) => write_tlv(dst, tag::UNIVERSAL_INTEGER, &encode_integer(*v)),
            Element::Boolean(b) => {
                write_tlv(dst, tag::UNIVERSAL_BOOLEAN, &[if *b { 1 } else { 0 }])
            },
            Element::OctetString(b) => write_tlv(dst, tag::UNIVERSAL_OCTET_STRING, b),
            Element::Null => write_tlv(dst, tag::UNIVERSAL_NULL, &[]),
            Element::Sequence(children) => {
                let body = encode_children(children);
                write_tlv(dst, tag::UNIVERSAL_SEQUENCE, &body);
            },
            Element::Message(t, children) => {
                let body = encode_children(children);
                write_tlv(dst, t.byte(), &body);
            },
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Element::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Element::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_octet_string(&self) -> Option<&Bytes> {
        match self {
            Element::OctetString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Element]> {
        match self {
            Element::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<(tag::Tag, &[Element])> {
        match self {
            Element::Message(t, v) => Some((*t, v)),
            _ => None,
        }
    }
}

fn write_tlv(dst: &mut BytesMut, raw_tag: u8, value: &[u8]) {
    dst.reserve(1 + 9 + value.len());
    dst.extend_from_slice(&[raw_tag]);
    length::encode(value.len() as u64, dst);
    dst.extend_from_slice(value);
}

fn encode_children(children: &[Element]) -> BytesMut {
    let mut buf = BytesMut::new();
    for child in children {
        child.encode(&mut buf);
    }
    buf
}

/// Decodes a complete, already-buffered composite value into its children,
/// erroring if the declared outer length doesn't exactly cover whole
/// children: a composite whose declared length does not match the sum of
/// its children's serialized sizes is rejected.
pub(crate) fn decode_children(mut buf: &[u8]) -> Result<Vec<Element>, Error> {
    let mut children = Vec::new();

    while !buf.is_empty() {
        let raw_tag = buf[0];
        let (len, len_consumed) = length::decode(&buf[1..]).map_err(|_| Error::TruncatedChild)?;
        let header = 1 + len_consumed;
        let len = len as usize;

        if buf.len() < header + len {
            return Err(Error::TruncatedChild);
        }

        let value = Bytes::copy_from_slice(&buf[header..header + len]);
        children.push(Element::decode(raw_tag, value)?);
        buf = &buf[header + len..];
    }

    Ok(children)
}

/// Encodes a signed integer as two's-complement big-endian, minimum length.
pub fn encode_integer(v: i64) -> Vec<u8> {
    if v == 0 {
        return vec![0];
    }

    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let b = bytes[start];
        let next = bytes[start + 1];
        let redundant_positive = b == 0x00 && next & 0x80 == 0;
        let redundant_negative = b == 0xFF && next & 0x80 != 0;
        if redundant_positive || redundant_negative {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

/// Decodes a two's-complement big-endian integer of up to 8 bytes.
pub fn decode_integer(buf: &[u8]) -> Result<i64, Error> {
    if buf.is_empty() || buf.len() > 8 {
        return Err(Error::InvalidInteger);
    }

    let mut v: i64 = if buf[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in buf {
        v = (v << 8) | b as i64;
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trip() {
        for v in [0i64, 1, -1, 127, 128, -128, -129, i64::MAX, i64::MIN] {
            let enc = encode_integer(v);
            assert_eq!(decode_integer(&enc).unwrap(), v);
        }
    }

    #[test]
    fn element_round_trip_scalars() {
        for el in [
            Element::Integer(42),
            Element::Integer(-1),
            Element::Boolean(true),
            Element::Boolean(false),
            Element::OctetString(Bytes::from_static(b"hello")),
            Element::OctetString(Bytes::new()),
            Element::Null,
        ] {
            let mut buf = BytesMut::new();
            el.encode(&mut buf);
            let raw_tag = buf[0];
            let (len, consumed) = length::decode(&buf[1..]).unwrap();
            let value = buf[1 + consumed..1 + consumed + len as usize].to_vec();
            let decoded = Element::decode(raw_tag, Bytes::from(value)).unwrap();
            assert_eq!(decoded, el);
        }
    }

    #[test]
    fn nested_sequence_round_trip() {
        let el = Element::Sequence(vec![
            Element::Integer(1),
            Element::OctetString(Bytes::from_static(b"tube")),
            Element::Sequence(vec![Element::Boolean(true)]),
        ]);
        let mut buf = BytesMut::new();
        el.encode(&mut buf);
        let raw_tag = buf[0];
        let (len, consumed) = length::decode(&buf[1..]).unwrap();
        let value = buf[1 + consumed..1 + consumed + len as usize].to_vec();
        let decoded = Element::decode(raw_tag, Bytes::from(value)).unwrap();
        assert_eq!(decoded, el);
    }

    #[test]
    fn empty_octet_string_distinct_from_absent_field() {
        let present_empty = Element::Sequence(vec![Element::OctetString(Bytes::new())]);
        let absent = Element::Sequence(vec![]);
        assert_ne!(present_empty, absent);
    }
}
