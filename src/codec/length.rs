//! Short/long form LENGTH encoding.
//!
//! Lengths up to 127 use a single byte. Longer lengths use a first byte
//! `0x80 | n` followed by `n` big-endian length bytes.

use bytes::{BufMut, BytesMut};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The buffer ended before a complete length field could be read.
    Truncated,
    /// The long-form byte count was zero or exceeded 8 bytes.
    Malformed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated length field"),
            Error::Malformed => write!(f, "malformed length field"),
        }
    }
}

impl std::error::Error for Error {}

/// Decodes a length field from the start of `buf`, which must already
/// contain the complete field. Returns the decoded length and the number of
/// bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(u64, usize), Error> {
    let prefix = *buf.first().ok_or(Error::Truncated)?;

    if prefix & 0x80 == 0 {
        return Ok((prefix as u64, 1));
    }

    let n = (prefix & 0x7F) as usize;
    if n == 0 || n > 8 {
        return Err(Error::Malformed);
    }
    if buf.len() < 1 + n {
        return Err(Error::Truncated);
    }

    let mut len: u64 = 0;
    for &b in &buf[1..1 + n] {
        len = (len << 8) | b as u64;
    }
    Ok((len, 1 + n))
}

/// Appends the short- or long-form encoding of `len` to `dst`.
pub fn encode(len: u64, dst: &mut BytesMut) {
    if len <= 127 {
        dst.put_u8(len as u8);
        return;
    }

    let bytes = len.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    let significant = &bytes[first_nonzero..];

    dst.put_u8(0x80 | significant.len() as u8);
    dst.put_slice(significant);
}
