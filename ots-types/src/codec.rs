//! Stream reader and writer for the binary proof grammar
//!
//! Integers are unsigned LEB128 varints; byte strings are prefixed by their
//! varint length.

use crate::error::{FormatError, Result};

/// Cursor over a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(FormatError::Truncated {
                needed: n,
                available: self.remaining(),
            }
            .into());
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_varuint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let low = u64::from(byte & 0x7f);
            if shift >= 64 || (shift == 63 && low > 1) {
                return Err(FormatError::VaruintOverflow.into());
            }
            value |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a length-prefixed byte string whose length lies in `min..=max`.
    pub fn read_varbytes(&mut self, min: usize, max: usize) -> Result<&'a [u8]> {
        let len = self.read_varuint()?;
        if len < min as u64 || len > max as u64 {
            return Err(FormatError::LengthOutOfRange { len, min, max }.into());
        }
        self.read_bytes(len as usize)
    }

    pub fn assert_eof(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(FormatError::TrailingBytes.into());
        }
        Ok(())
    }
}

/// Sink collecting serialized bytes.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_varuint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn write_varbytes(&mut self, bytes: &[u8]) {
        self.write_varuint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
