//! Verification of blockchain attestations
//!
//! Verification replays the proof from the subject digest, collects every
//! blockchain attestation it reaches and checks each one against the block
//! header supplied by the caller. Fetching headers is left to the caller so
//! this module stays free of I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ots_types::{Attestation, Chain, Digest};

use crate::detached::DetachedTimestampFile;
use crate::timestamp::Timestamp;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Timestamp has no blockchain attestation")]
    NoBlockchainAttestation,

    #[error("File digest {actual} does not match timestamped digest {expected}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Expected a 32 byte digest for {chain} block {height}, got {len} bytes")]
    InvalidDigestLength { chain: Chain, height: u64, len: usize },

    #[error("Digest does not match merkle root of {chain} block {height}")]
    MerkleRootMismatch { chain: Chain, height: u64 },

    #[error("Block header for {chain} block {height} unavailable: {reason}")]
    HeaderUnavailable {
        chain: Chain,
        height: u64,
        reason: String,
    },

    #[error("None of {} blockchain attestations verified", .failures.len())]
    AllFailed { failures: Vec<FailedAnchor> },
}

/// The parts of a block header a timestamp is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Merkle root in internal byte order
    pub merkle_root: Vec<u8>,
    /// Block time, seconds since the Unix epoch
    pub time: u64,
}

/// A blockchain attestation together with the message that reached it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Anchor {
    pub chain: Chain,
    pub height: u64,
    pub msg: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedAnchor {
    pub chain: Chain,
    pub height: u64,
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAnchor {
    pub chain: Chain,
    pub height: u64,
    pub reason: String,
}

/// Outcome of a successful verification.
///
/// At least one anchor verified; `failed` lists the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Earliest block time among the verified anchors
    pub time: u64,
    pub verified: Vec<VerifiedAnchor>,
    pub failed: Vec<FailedAnchor>,
}

impl Verification {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    /// The anchor establishing [`Verification::time`]
    pub fn earliest(&self) -> Option<&VerifiedAnchor> {
        self.verified.iter().min_by_key(|a| (a.time, a.height))
    }
}

/// Every distinct blockchain anchor reached by replaying `timestamp` from `subject`.
pub fn anchors(timestamp: &Timestamp, subject: &[u8]) -> Vec<Anchor> {
    let mut out = Vec::new();
    replay(timestamp, subject.to_vec(), &mut out);
    out.sort();
    out.dedup();
    out
}

fn replay(node: &Timestamp, msg: Vec<u8>, out: &mut Vec<Anchor>) {
    for attestation in node.attestations() {
        if let Attestation::Blockchain { chain, height } = attestation {
            out.push(Anchor {
                chain: *chain,
                height: *height,
                msg: msg.clone(),
            });
        }
    }
    for (op, child) in node.ops() {
        replay(child, op.apply(&msg), out);
    }
}

/// Check one anchor against its block header, returning the block time.
pub fn verify_against_header(anchor: &Anchor, header: &BlockHeader) -> Result<u64, VerificationError> {
    if anchor.msg.len() != 32 {
        return Err(VerificationError::InvalidDigestLength {
            chain: anchor.chain,
            height: anchor.height,
            len: anchor.msg.len(),
        });
    }
    if anchor.msg != header.merkle_root {
        return Err(VerificationError::MerkleRootMismatch {
            chain: anchor.chain,
            height: anchor.height,
        });
    }
    Ok(header.time)
}

/// Verify `timestamp` as a proof for `subject`.
///
/// `lookup` supplies block headers. Anchors whose lookup or check fails are
/// reported in [`Verification::failed`]; the call only fails when no anchor
/// verifies.
pub fn verify_timestamp<F>(
    timestamp: &Timestamp,
    subject: &[u8],
    mut lookup: F,
) -> Result<Verification, VerificationError>
where
    F: FnMut(Chain, u64) -> Result<BlockHeader, VerificationError>,
{
    let anchors = anchors(timestamp, subject);
    if anchors.is_empty() {
        return Err(VerificationError::NoBlockchainAttestation);
    }

    let mut verified = Vec::new();
    let mut failed = Vec::new();
    for anchor in &anchors {
        let result = lookup(anchor.chain, anchor.height)
            .and_then(|header| verify_against_header(anchor, &header));
        match result {
            Ok(time) => verified.push(VerifiedAnchor {
                chain: anchor.chain,
                height: anchor.height,
                time,
            }),
            Err(e) => failed.push(FailedAnchor {
                chain: anchor.chain,
                height: anchor.height,
                reason: e.to_string(),
            }),
        }
    }

    match verified.iter().map(|a| a.time).min() {
        Some(time) => Ok(Verification {
            time,
            verified,
            failed,
        }),
        None => Err(VerificationError::AllFailed { failures: failed }),
    }
}

/// Verify a detached proof for a file whose digest is `subject`.
pub fn verify_file<F>(
    file: &DetachedTimestampFile,
    subject: &Digest,
    lookup: F,
) -> Result<Verification, VerificationError>
where
    F: FnMut(Chain, u64) -> Result<BlockHeader, VerificationError>,
{
    if !file.matches(subject) {
        return Err(VerificationError::DigestMismatch {
            expected: hex::encode(file.file_digest()),
            actual: subject.to_hex(),
        });
    }
    verify_timestamp(file.timestamp(), subject.as_bytes(), lookup)
}
