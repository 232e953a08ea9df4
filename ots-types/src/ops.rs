//! Proof operations
//!
//! Every edge of a timestamp DAG is labelled with an [`Op`], a pure function
//! from the parent message to the child message.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, FormatError, Result};
use crate::primitives::HashAlgorithm;
use std::cmp::Ordering;
use std::fmt;

/// Largest message any operation may produce.
pub const MAX_MSG_LENGTH: usize = 4096;

/// Largest payload of a binary operation.
pub const MAX_ARG_LENGTH: usize = 4096;

pub const TAG_APPEND: u8 = 0xf0;
pub const TAG_PREPEND: u8 = 0xf1;
pub const TAG_REVERSE: u8 = 0xf2;
pub const TAG_HEXLIFY: u8 = 0xf3;

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Replace the message with its hash
    Hash(HashAlgorithm),
    /// Suffix the message with the payload
    Append(Vec<u8>),
    /// Prefix the message with the payload
    Prepend(Vec<u8>),
    /// Reverse the message bytes (deprecated, still parsed)
    Reverse,
    /// Lowercase hex encoding of the message
    Hexlify,
}

impl Op {
    pub fn sha256() -> Self {
        Op::Hash(HashAlgorithm::Sha256)
    }

    pub fn append(arg: impl Into<Vec<u8>>) -> Result<Self> {
        let op = Op::Append(arg.into());
        op.validate()?;
        Ok(op)
    }

    pub fn prepend(arg: impl Into<Vec<u8>>) -> Result<Self> {
        let op = Op::Prepend(arg.into());
        op.validate()?;
        Ok(op)
    }

    pub fn tag(&self) -> u8 {
        match self {
            Op::Hash(alg) => alg.tag(),
            Op::Append(_) => TAG_APPEND,
            Op::Prepend(_) => TAG_PREPEND,
            Op::Reverse => TAG_REVERSE,
            Op::Hexlify => TAG_HEXLIFY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Hash(alg) => alg.name(),
            Op::Append(_) => "append",
            Op::Prepend(_) => "prepend",
            Op::Reverse => "reverse",
            Op::Hexlify => "hexlify",
        }
    }

    /// Payload of a binary operation
    pub fn arg(&self) -> Option<&[u8]> {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => Some(arg),
            _ => None,
        }
    }

    /// Check payload bounds of binary operations.
    pub fn validate(&self) -> Result<()> {
        if let Some(arg) = self.arg() {
            if arg.is_empty() || arg.len() > MAX_ARG_LENGTH {
                return Err(Error::InvariantViolation(format!(
                    "{} payload of {} bytes, must be 1..={}",
                    self.name(),
                    arg.len(),
                    MAX_ARG_LENGTH
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            Op::Hash(alg) => alg.hash(msg),
            Op::Append(arg) => [msg, arg.as_slice()].concat(),
            Op::Prepend(arg) => [arg.as_slice(), msg].concat(),
            Op::Reverse => msg.iter().rev().copied().collect(),
            Op::Hexlify => hex::encode(msg).into_bytes(),
        }
    }

    pub fn serialize(&self, w: &mut ByteWriter) {
        w.write_u8(self.tag());
        if let Some(arg) = self.arg() {
            w.write_varbytes(arg);
        }
    }

    /// Parse the remainder of an operation whose tag byte was already read.
    pub fn deserialize_with_tag(r: &mut ByteReader<'_>, tag: u8) -> Result<Self> {
        match tag {
            TAG_APPEND => Ok(Op::Append(r.read_varbytes(1, MAX_ARG_LENGTH)?.to_vec())),
            TAG_PREPEND => Ok(Op::Prepend(r.read_varbytes(1, MAX_ARG_LENGTH)?.to_vec())),
            TAG_REVERSE => Ok(Op::Reverse),
            TAG_HEXLIFY => Ok(Op::Hexlify),
            other => HashAlgorithm::from_tag(other)
                .map(Op::Hash)
                .ok_or_else(|| FormatError::UnknownOpTag(other).into()),
        }
    }

    pub fn deserialize(r: &mut ByteReader<'_>) -> Result<Self> {
        let tag = r.read_u8()?;
        Self::deserialize_with_tag(r, tag)
    }
}

impl From<HashAlgorithm> for Op {
    fn from(alg: HashAlgorithm) -> Self {
        Op::Hash(alg)
    }
}

// Canonical order: by tag, then by payload. Serialization relies on it.
impl Ord for Op {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag()
            .cmp(&other.tag())
            .then_with(|| self.arg().cmp(&other.arg()))
    }
}

impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arg() {
            Some(arg) => write!(f, "{} {}", self.name(), hex::encode(arg)),
            None => f.write_str(self.name()),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self)
    }
}
