//! Tag/Length/Value codec (C1): self-describing binary framing for every
//! message on the control and stat channels.

pub mod element;
pub mod length;
pub mod reader;
pub mod tag;
pub mod writer;

pub use element::Element;
pub use tag::Tag;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{self, Framed};

pub fn framed<T: AsyncRead + AsyncWrite>(stream: T) -> Framed<T, Codec> {
    Framed::new(stream, Codec::default())
}

pub fn framed_with_max_len<T: AsyncRead + AsyncWrite>(
    stream: T,
    max_len: usize,
) -> Framed<T, Codec> {
    Framed::new(stream, Codec::with_max_len(max_len))
}

#[derive(Debug, Default)]
pub struct Codec {
    d: reader::Decoder,
    e: writer::Encoder,
}

impl Codec {
    pub fn with_max_len(max_len: usize) -> Self {
        Self { d: reader::Decoder::with_max_len(max_len), e: writer::Encoder::default() }
    }
}

impl codec::Decoder for Codec {
    type Item = Element;
    type Error = reader::Error;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.d.decode(src)
    }
}

impl codec::Encoder<Element> for Codec {
    type Error = writer::Error;

    fn encode(&mut self, item: Element, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        self.e.encode(item, dst)
    }
}
