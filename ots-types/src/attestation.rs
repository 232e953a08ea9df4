//! Terminal attestations of a timestamp proof

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, FormatError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const TAG_SIZE: usize = 8;

/// Upper bound on the serialized payload of any attestation.
pub const MAX_PAYLOAD_SIZE: usize = 8192;

pub const MAX_URI_LENGTH: usize = 1000;

const ALLOWED_URI_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._/:";

pub const PENDING_TAG: [u8; TAG_SIZE] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];
pub const BITCOIN_TAG: [u8; TAG_SIZE] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];
pub const LITECOIN_TAG: [u8; TAG_SIZE] = [0x06, 0x86, 0x9a, 0x0d, 0x73, 0xd7, 0x1b, 0x45];

/// Blockchains whose block headers can anchor a timestamp
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Litecoin,
}

impl Chain {
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        match self {
            Chain::Bitcoin => BITCOIN_TAG,
            Chain::Litecoin => LITECOIN_TAG,
        }
    }

    pub fn from_tag(tag: &[u8; TAG_SIZE]) -> Option<Self> {
        match *tag {
            BITCOIN_TAG => Some(Chain::Bitcoin),
            LITECOIN_TAG => Some(Chain::Litecoin),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "Bitcoin",
            Chain::Litecoin => "Litecoin",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Attestation {
    /// Not yet anchored; the calendar at `uri` can be asked for the rest.
    Pending { uri: String },
    /// The message equals the merkle root of block `height` on `chain`.
    Blockchain { chain: Chain, height: u64 },
    /// Unrecognized tag, kept byte for byte.
    Unknown(UnknownAttestation),
}

/// Tag and raw payload of an attestation this version does not understand.
///
/// Only built through [`Attestation::unknown`] or parsing, so the tag is
/// never one of the known ones.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnknownAttestation {
    tag: [u8; TAG_SIZE],
    payload: Vec<u8>,
}

impl UnknownAttestation {
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl Attestation {
    pub fn pending(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        check_uri(uri.as_bytes())?;
        Ok(Attestation::Pending { uri })
    }

    pub fn bitcoin(height: u64) -> Self {
        Attestation::Blockchain {
            chain: Chain::Bitcoin,
            height,
        }
    }

    /// An attestation with an unrecognized `tag`.
    ///
    /// Known tags are rejected; they must go through their typed variants.
    pub fn unknown(tag: [u8; TAG_SIZE], payload: impl Into<Vec<u8>>) -> Result<Self> {
        if tag == PENDING_TAG || Chain::from_tag(&tag).is_some() {
            return Err(Error::InvariantViolation(format!(
                "attestation tag {} is not unknown",
                hex::encode(tag)
            )));
        }
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::InvariantViolation(format!(
                "attestation payload of {} bytes exceeds {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        Ok(Attestation::Unknown(UnknownAttestation { tag, payload }))
    }

    pub fn tag(&self) -> [u8; TAG_SIZE] {
        match self {
            Attestation::Pending { .. } => PENDING_TAG,
            Attestation::Blockchain { chain, .. } => chain.tag(),
            Attestation::Unknown(unknown) => unknown.tag,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Attestation::Pending { .. })
    }

    pub fn is_blockchain(&self) -> bool {
        matches!(self, Attestation::Blockchain { .. })
    }

    fn payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        match self {
            Attestation::Pending { uri } => w.write_varbytes(uri.as_bytes()),
            Attestation::Blockchain { height, .. } => w.write_varuint(*height),
            Attestation::Unknown(unknown) => w.write_bytes(&unknown.payload),
        }
        w.into_inner()
    }

    pub fn serialize(&self, w: &mut ByteWriter) {
        w.write_bytes(&self.tag());
        w.write_varbytes(&self.payload());
    }

    pub fn deserialize(r: &mut ByteReader<'_>) -> Result<Self> {
        let tag = r.read_fixed::<TAG_SIZE>()?;
        let payload = r.read_varbytes(0, MAX_PAYLOAD_SIZE)?;
        let mut inner = ByteReader::new(payload);

        let attestation = if tag == PENDING_TAG {
            let uri = inner.read_varbytes(0, MAX_URI_LENGTH)?;
            check_uri(uri)?;
            Attestation::Pending {
                // check_uri admits ASCII only
                uri: String::from_utf8_lossy(uri).into_owned(),
            }
        } else if let Some(chain) = Chain::from_tag(&tag) {
            Attestation::Blockchain {
                chain,
                height: inner.read_varuint()?,
            }
        } else {
            return Ok(Attestation::Unknown(UnknownAttestation {
                tag,
                payload: payload.to_vec(),
            }));
        };
        inner.assert_eof()?;
        Ok(attestation)
    }
}

fn check_uri(uri: &[u8]) -> Result<()> {
    if uri.len() > MAX_URI_LENGTH {
        return Err(FormatError::InvalidUri(format!("longer than {} bytes", MAX_URI_LENGTH)).into());
    }
    if let Some(bad) = uri.iter().find(|c| !ALLOWED_URI_CHARS.contains(*c)) {
        return Err(FormatError::InvalidUri(format!("forbidden character 0x{:02x}", bad)).into());
    }
    Ok(())
}

// Tag first, then the natural order of each kind's fields.
impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| match (self, other) {
            (Attestation::Pending { uri: a }, Attestation::Pending { uri: b }) => a.cmp(b),
            (
                Attestation::Blockchain { height: a, .. },
                Attestation::Blockchain { height: b, .. },
            ) => a.cmp(b),
            (a, b) => a.payload().cmp(&b.payload()),
        })
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "PendingAttestation('{}')", uri),
            Attestation::Blockchain { chain, height } => {
                write!(f, "{}BlockHeaderAttestation({})", chain, height)
            }
            Attestation::Unknown(unknown) => write!(
                f,
                "UnknownAttestation({}, {})",
                hex::encode(unknown.tag),
                hex::encode(&unknown.payload)
            ),
        }
    }
}
