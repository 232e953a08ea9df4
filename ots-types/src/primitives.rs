//! Hash algorithms and typed digests

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// Hash functions usable both as file hash and as unary proof operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Ripemd160,
    Sha256,
    Keccak256,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Sha1,
        HashAlgorithm::Ripemd160,
        HashAlgorithm::Sha256,
        HashAlgorithm::Keccak256,
    ];

    /// Wire tag of the operation
    pub fn tag(&self) -> u8 {
        match self {
            HashAlgorithm::Sha1 => 0x02,
            HashAlgorithm::Ripemd160 => 0x03,
            HashAlgorithm::Sha256 => 0x08,
            HashAlgorithm::Keccak256 => 0x67,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.tag() == tag)
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Ripemd160 => "ripemd160",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Keccak256 => "keccak256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(name))
    }

    /// Output length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Ripemd160 => 20,
            HashAlgorithm::Sha256 | HashAlgorithm::Keccak256 => 32,
        }
    }

    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => digest_of::<sha1::Sha1>(data),
            HashAlgorithm::Ripemd160 => digest_of::<ripemd::Ripemd160>(data),
            HashAlgorithm::Sha256 => digest_of::<sha2::Sha256>(data),
            HashAlgorithm::Keccak256 => digest_of::<sha3::Keccak256>(data),
        }
    }

    /// Hash everything readable from `reader` without buffering it whole.
    pub fn hash_reader<R: Read>(&self, reader: R) -> std::io::Result<Vec<u8>> {
        match self {
            HashAlgorithm::Sha1 => digest_reader::<sha1::Sha1, R>(reader),
            HashAlgorithm::Ripemd160 => digest_reader::<ripemd::Ripemd160, R>(reader),
            HashAlgorithm::Sha256 => digest_reader::<sha2::Sha256, R>(reader),
            HashAlgorithm::Keccak256 => digest_reader::<sha3::Keccak256, R>(reader),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn digest_of<D: sha2::Digest>(data: &[u8]) -> Vec<u8> {
    D::digest(data).to_vec()
}

fn digest_reader<D: sha2::Digest, R: Read>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// A digest bound to the algorithm that produced it.
///
/// The byte length always matches [`HashAlgorithm::digest_len`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    pub fn from_slice(algorithm: HashAlgorithm, slice: &[u8]) -> Result<Self> {
        if slice.len() != algorithm.digest_len() {
            return Err(Error::InvalidDigestLength {
                algorithm: algorithm.name(),
                expected: algorithm.digest_len(),
                actual: slice.len(),
            });
        }
        Ok(Self {
            algorithm,
            bytes: slice.to_vec(),
        })
    }

    /// Hash `data` with `algorithm`
    pub fn of(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            bytes: algorithm.hash(data),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(algorithm: HashAlgorithm, s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_slice(algorithm, &bytes)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, hex::encode(&self.bytes[..8]))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Serialize, Deserialize)]
struct DigestRepr {
    algorithm: HashAlgorithm,
    digest: String,
}

// Serialized as {"algorithm": "sha256", "digest": "<hex>"}
impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        DigestRepr {
            algorithm: self.algorithm,
            digest: self.to_hex(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = DigestRepr::deserialize(deserializer)?;
        Self::from_hex(repr.algorithm, &repr.digest).map_err(serde::de::Error::custom)
    }
}
