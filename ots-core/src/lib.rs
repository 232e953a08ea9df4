//! Core proof logic for OpenTimestamps-style timestamps
//!
//! This crate provides:
//! - The timestamp proof DAG and its binary codec
//! - Detached `.ots` files
//! - Merkle aggregation of many digests under one commitment
//! - Privacy nonces
//! - Verification of blockchain attestations against block headers

pub mod detached;
pub mod merkle;
pub mod nonce;
pub mod timestamp;
pub mod verify;

pub use detached::{DetachedTimestampFile, HEADER_MAGIC, MAJOR_VERSION};
pub use merkle::make_merkle_tree;
pub use nonce::NonceGenerator;
pub use timestamp::{PendingTarget, Timestamp, RECURSION_LIMIT};
pub use verify::{
    verify_file, verify_timestamp, BlockHeader, Verification, VerificationError, VerifiedAnchor,
};
