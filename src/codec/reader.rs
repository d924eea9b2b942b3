//! Async TLV frame reader: an explicit state enum so a partial read never
//! loses progress, and a manual `Error` enum distinguishing framing
//! problems from I/O.

use std::{error, fmt, io};

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec;

use super::element::{self, Element};

/// Default ceiling on a single element's declared length.
pub const DEFAULT_MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

#[derive(Debug)]
enum State {
    ReadTag,
    ReadLengthPrefix { tag: u8 },
    ReadLongLength { tag: u8, prefix_len: u8 },
    ReadValue { tag: u8, len: usize },
}

/// A decoder for a stream of TLV frames. One [`Element`] per call.
#[derive(Debug)]
pub struct Decoder {
    state: State,
    max_len: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder {
    pub fn with_max_len(max_len: usize) -> Self {
        Self { state: State::ReadTag, max_len }
    }
}

impl codec::Decoder for Decoder {
    type Item = Element;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::ReadTag => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let tag = src.get_u8();
                    self.state = State::ReadLengthPrefix { tag };
                },
                State::ReadLengthPrefix { tag } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let prefix = src[0];
                    if prefix & 0x80 == 0 {
                        src.advance(1);
                        self.state = State::ReadValue { tag, len: prefix as usize };
                    } else {
                        let n = prefix & 0x7F;
                        if n == 0 || n as usize > 8 {
                            self.state = State::ReadTag;
                            return Err(Error::MalformedLength);
                        }
                        src.advance(1);
                        self.state = State::ReadLongLength { tag, prefix_len: n };
                    }
                },
                State::ReadLongLength { tag, prefix_len } => {
                    let n = prefix_len as usize;
                    if src.len() < n {
                        return Ok(None);
                    }

                    let mut len: u64 = 0;
                    for i in 0..n {
                        len = (len << 8) | src[i] as u64;
                    }
                    src.advance(n);

                    if len > self.max_len as u64 {
                        self.state = State::ReadTag;
                        return Err(Error::LengthOverflow);
                    }
                    self.state = State::ReadValue { tag, len: len as usize };
                },
                State::ReadValue { tag, len } => {
                    if src.len() < len {
                        src.reserve((len - src.len()).min(16_384));
                        return Ok(None);
                    }

                    let value: Bytes = src.split_to(len).freeze();
                    self.state = State::ReadTag;
                    return Ok(Some(Element::decode(tag, value)?));
                },
            }
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    MalformedLength,
    LengthOverflow,
    Element(element::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::MalformedLength => write!(f, "malformed length field"),
            Error::LengthOverflow => write!(f, "element length exceeds the configured ceiling"),
            Error::Element(e) => write!(f, "{e}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<element::Error> for Error {
    fn from(value: element::Error) -> Self {
        Self::Element(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;
    use tokio_util::codec::FramedRead;

    use crate::codec::tag::Tag;
    use crate::codec::writer;

    #[tokio::test]
    async fn round_trip_through_framed() {
        let el = Element::Message(
            Tag::JOB_REQUEST,
            vec![Element::Integer(7), Element::OctetString(Bytes::from_static(b"J1"))],
        );

        let mut buf = BytesMut::new();
        {
            use tokio_util::codec::Encoder;
            writer::Encoder::default().encode(el.clone(), &mut buf).unwrap();
        }

        let mut framed = FramedRead::new(buf.as_ref(), Decoder::default());
        let decoded = framed.next().await.unwrap().unwrap();
        assert_eq!(decoded, el);
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn length_ceiling_rejected_before_reading_body() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[Tag::JOB_REQUEST.byte(), 0x84, 0x7F, 0xFF, 0xFF, 0xFF]);

        let mut framed = FramedRead::new(buf.as_ref(), Decoder::with_max_len(1024));
        assert!(matches!(
            framed.next().await.unwrap().unwrap_err(),
            Error::LengthOverflow
        ));
    }

    #[tokio::test]
    async fn partial_read_does_not_advance_frame() {
        let mut full = BytesMut::new();
        {
            use tokio_util::codec::Encoder;
            writer::Encoder::default()
                .encode(Element::OctetString(Bytes::from_static(b"hello world")), &mut full)
                .unwrap();
        }

        let mut decoder = Decoder::default();
        let mut partial = full.split_to(full.len() - 1);
        {
            use tokio_util::codec::Decoder as _;
            assert!(decoder.decode(&mut partial).unwrap().is_none());
            partial.extend_from_slice(&full);
            let el = decoder.decode(&mut partial).unwrap().unwrap();
            assert_eq!(el, Element::OctetString(Bytes::from_static(b"hello world")));
        }
    }
}
