//! Detached `.ots` proof files
//!
//! Layout: magic header, major version varuint, file hash tag, file digest,
//! then the serialized timestamp rooted at that digest.

use std::io::Read;

use ots_types::{ByteReader, ByteWriter, Digest, Error, FormatError, HashAlgorithm, Result};

use crate::timestamp::Timestamp;

pub const HEADER_MAGIC: &[u8] =
    b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";

pub const MAJOR_VERSION: u64 = 1;

/// A timestamp for a file that is stored separately from the file itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    file_hash_op: HashAlgorithm,
    timestamp: Timestamp,
}

impl DetachedTimestampFile {
    /// Wrap an existing timestamp whose root is a file digest.
    pub fn new(file_hash_op: HashAlgorithm, timestamp: Timestamp) -> Result<Self> {
        if timestamp.msg().len() != file_hash_op.digest_len() {
            return Err(Error::InvalidDigestLength {
                algorithm: file_hash_op.name(),
                expected: file_hash_op.digest_len(),
                actual: timestamp.msg().len(),
            });
        }
        Ok(Self {
            file_hash_op,
            timestamp,
        })
    }

    pub fn from_digest(digest: &Digest) -> Self {
        Self {
            file_hash_op: digest.algorithm(),
            timestamp: Timestamp::new(digest.as_bytes()),
        }
    }

    pub fn hash_data(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self::from_digest(&Digest::of(algorithm, data))
    }

    /// Hash a file's content while streaming it.
    pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: R) -> std::io::Result<Self> {
        let bytes = algorithm.hash_reader(reader)?;
        Ok(Self {
            file_hash_op: algorithm,
            timestamp: Timestamp::new(bytes),
        })
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.file_hash_op
    }

    pub fn file_digest(&self) -> &[u8] {
        self.timestamp.msg()
    }

    /// True if `digest` is the digest this file timestamps.
    pub fn matches(&self, digest: &Digest) -> bool {
        digest.algorithm() == self.file_hash_op && digest.as_bytes() == self.file_digest()
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn timestamp_mut(&mut self) -> &mut Timestamp {
        &mut self.timestamp
    }

    pub fn into_timestamp(self) -> Timestamp {
        self.timestamp
    }

    pub fn serialize(&self, w: &mut ByteWriter) -> Result<()> {
        // Serialize the body first so a failure leaves `w` untouched.
        let body = self.timestamp.to_bytes()?;
        w.write_bytes(HEADER_MAGIC);
        w.write_varuint(MAJOR_VERSION);
        w.write_u8(self.file_hash_op.tag());
        w.write_bytes(self.file_digest());
        w.write_bytes(&body);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new();
        self.serialize(&mut w)?;
        Ok(w.into_inner())
    }

    /// Parse a complete `.ots` file; trailing bytes are an error.
    pub fn deserialize(r: &mut ByteReader<'_>) -> Result<Self> {
        if r.remaining() < HEADER_MAGIC.len() || r.read_bytes(HEADER_MAGIC.len())? != HEADER_MAGIC {
            return Err(FormatError::BadMagic.into());
        }

        let version = r.read_varuint()?;
        if version != MAJOR_VERSION {
            return Err(FormatError::UnsupportedVersion(version).into());
        }

        let tag = r.read_u8()?;
        let file_hash_op = HashAlgorithm::from_tag(tag).ok_or(FormatError::UnknownHashTag(tag))?;
        let digest = r.read_bytes(file_hash_op.digest_len())?;
        let timestamp = Timestamp::deserialize(r, digest)?;
        r.assert_eof()?;

        Ok(Self {
            file_hash_op,
            timestamp,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut ByteReader::new(bytes))
    }
}
