//! Privacy nonces for stamped digests
//!
//! A calendar only ever sees the merkle tip, but a single-file stamp would
//! otherwise reveal the file digest itself. Appending fresh randomness and
//! hashing again breaks that link.

use ots_types::{Op, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::timestamp::Timestamp;

/// Bytes of randomness appended to each digest before aggregation.
pub const NONCE_LEN: usize = 16;

/// OS-seeded nonce source; `Send`, so it can live across await points.
pub struct NonceGenerator {
    rng: StdRng,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn generate(&mut self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill_bytes(&mut nonce);
        nonce
    }

    /// An `append(nonce)` edge hiding the digest from the calendar
    pub fn nonce_op(&mut self) -> Result<Op> {
        Op::append(self.generate().to_vec())
    }

    /// Extend `node` with `append(nonce) + sha256` and return the new leaf.
    pub fn blind<'a>(&mut self, node: &'a mut Timestamp) -> Result<&'a mut Timestamp> {
        node.add_op(self.nonce_op()?)?.add_op(Op::sha256())
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
