//! Async TLV frame writer.
//!
//! An [`Element::encode`] call is atomic from the receiver's perspective:
//! the full frame is built in one pass before anything is appended to
//! `dst`, so a serialization failure never leaves a half-frame behind.

use std::{error, fmt, io};

use bytes::BytesMut;
use tokio_util::codec;

use super::element::Element;

#[derive(Debug, Default)]
pub struct Encoder {}

impl codec::Encoder<Element> for Encoder {
    type Error = Error;

    fn encode(&mut self, item: Element, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
