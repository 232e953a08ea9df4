//! Core types and wire format for OpenTimestamps proofs
//!
//! This crate defines the operations, attestations and typed digests that
//! make up a timestamp proof, and the byte-level codec they serialize with.

pub mod attestation;
pub mod codec;
pub mod error;
pub mod ops;
pub mod primitives;

pub use attestation::{Attestation, Chain, UnknownAttestation};
pub use codec::{ByteReader, ByteWriter};
pub use error::{Error, FormatError, Result};
pub use ops::Op;
pub use primitives::{Digest, HashAlgorithm};
