//! Message catalogue (C2): typed, versioned messages carried inside the
//! envelope's application-tagged body.

pub mod class_transfer;
pub mod codes;
pub mod envelope;
pub mod fleet;
pub mod hello;
pub mod job;
pub mod stat;
pub mod status;

pub use envelope::{Body, Envelope, MessageId};

use crate::codec::{tag::Tag, Element};

#[derive(Debug)]
pub enum Error {
    /// The application tag on an inbound frame does not name a known
    /// message kind. The tag is preserved for logging.
    UnknownTag(Tag),
    /// A field failed validation (missing, wrong type, or out of range).
    InvalidField { field: &'static str, reason: String },
    /// A composite carried fewer children than any known arity for its
    /// message kind.
    WrongArity { expected_one_of: &'static [usize], got: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownTag(t) => write!(f, "unknown message type {:#04x}", t.byte()),
            Error::InvalidField { field, reason } => write!(f, "field `{field}`: {reason}"),
            Error::WrongArity { expected_one_of, got } => {
                write!(f, "expected {expected_one_of:?} children, got {got}")
            },
        }
    }
}

impl std::error::Error for Error {}

/// Fetches the child at `idx`, erroring with a named field if absent.
pub(crate) fn child<'a>(
    children: &'a [Element],
    idx: usize,
    field: &'static str,
) -> Result<&'a Element, Error> {
    children.get(idx).ok_or_else(|| Error::InvalidField {
        field,
        reason: "missing positional child".into(),
    })
}

pub(crate) fn child_integer(children: &[Element], idx: usize, field: &'static str) -> Result<i64, Error> {
    child(children, idx, field)?.as_integer().ok_or_else(|| Error::InvalidField {
        field,
        reason: "expected an integer".into(),
    })
}

pub(crate) fn child_u32(children: &[Element], idx: usize, field: &'static str) -> Result<u32, Error> {
    let v = child_integer(children, idx, field)?;
    u32::try_from(v).map_err(|_| Error::InvalidField {
        field,
        reason: format!("{v} does not fit in u32"),
    })
}

pub(crate) fn child_u64(children: &[Element], idx: usize, field: &'static str) -> Result<u64, Error> {
    let v = child_integer(children, idx, field)?;
    u64::try_from(v).map_err(|_| Error::InvalidField {
        field,
        reason: format!("{v} does not fit in u64"),
    })
}

pub(crate) fn child_bool(children: &[Element], idx: usize, field: &'static str) -> Result<bool, Error> {
    child(children, idx, field)?.as_boolean().ok_or_else(|| Error::InvalidField {
        field,
        reason: "expected a boolean".into(),
    })
}

pub(crate) fn child_bytes<'a>(
    children: &'a [Element],
    idx: usize,
    field: &'static str,
) -> Result<&'a bytes::Bytes, Error> {
    child(children, idx, field)?.as_octet_string().ok_or_else(|| Error::InvalidField {
        field,
        reason: "expected an octet string".into(),
    })
}

pub(crate) fn child_string(children: &[Element], idx: usize, field: &'static str) -> Result<String, Error> {
    let bytes = child_bytes(children, idx, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidField {
        field,
        reason: "not valid utf-8".into(),
    })
}
