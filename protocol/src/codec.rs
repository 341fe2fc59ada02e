//! # Wire Codec
//!
//! Every call input, every stored record and every serialized group uses
//! the same two-part byte format:
//!
//! - **varint**: a length-style integer. Values below `0xFD` take one byte;
//!   larger values are tagged `0xFD` (u16), `0xFE` (u32) or `0xFF` (u64),
//!   little-endian. Decoding rejects non-canonical encodings.
//! - **varbytes**: a varint length followed by that many bytes.
//! - **varuint**: an unsigned integer written as varbytes of its minimal
//!   little-endian two's-complement form. Zero is the empty string; 128
//!   needs a trailing sign byte (`80 00`).
//!
//! [`Sink`] builds byte strings, [`Source`] reads them back without copying.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended before a complete value could be read.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A varint used a wider form than its value requires.
    #[error("non-canonical varint encoding")]
    NonCanonicalVarInt,

    /// A varuint does not fit in 64 bits.
    #[error("varuint overflows u64")]
    VarUintOverflow,

    /// A varuint carried the sign bit.
    #[error("varuint is negative")]
    NegativeVarUint,

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A length does not fit in the platform's address space.
    #[error("length {0} does not fit in usize")]
    LengthOverflow(u64),

    /// Bytes were left over after the last expected field.
    #[error("{0} trailing bytes after end of input")]
    TrailingBytes(usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Append-only byte builder.
#[derive(Debug, Default, Clone)]
pub struct Sink {
    buf: Vec<u8>,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    /// Append raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_var_int(&mut self, value: u64) -> &mut Self {
        if value < 0xFD {
            self.buf.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buf.push(0xFD);
            self.buf.extend_from_slice(&(value as u16).to_le_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buf.push(0xFE);
            self.buf.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.buf.push(0xFF);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
        self
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_var_int(bytes.len() as u64);
        self.write_raw(bytes)
    }

    pub fn write_var_uint(&mut self, value: u64) -> &mut Self {
        let encoded = encode_uint_bytes(value);
        self.write_var_bytes(&encoded)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Minimal little-endian two's-complement bytes of a non-negative integer.
fn encode_uint_bytes(value: u64) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    if bytes.last().is_some_and(|b| b & 0x80 != 0) {
        bytes.push(0);
    }
    bytes
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Zero-copy reader over a byte slice.
#[derive(Debug, Clone)]
pub struct Source<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Source<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Succeeds only when every byte has been consumed.
    pub fn finish(&self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    pub fn read_raw(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_raw(1)?[0])
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn read_var_int(&mut self) -> CodecResult<u64> {
        let tag = self.read_u8()?;
        let (value, min) = match tag {
            0xFD => {
                let b = self.read_raw(2)?;
                (u64::from(u16::from_le_bytes([b[0], b[1]])), 0xFD)
            }
            0xFE => {
                let b = self.read_raw(4)?;
                (
                    u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                    u64::from(u16::MAX) + 1,
                )
            }
            0xFF => {
                let b = self.read_raw(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                (u64::from_le_bytes(arr), u64::from(u32::MAX) + 1)
            }
            small => return Ok(u64::from(small)),
        };
        if value < min {
            return Err(CodecError::NonCanonicalVarInt);
        }
        Ok(value)
    }

    pub fn read_var_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_var_int()?;
        let len = usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.read_raw(len)
    }

    pub fn read_var_uint(&mut self) -> CodecResult<u64> {
        let bytes = self.read_var_bytes()?;
        decode_uint_bytes(bytes)
    }
}

fn decode_uint_bytes(bytes: &[u8]) -> CodecResult<u64> {
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    if last & 0x80 != 0 {
        return Err(CodecError::NegativeVarUint);
    }
    if bytes.len() > 9 || (bytes.len() == 9 && last != 0) {
        return Err(CodecError::VarUintOverflow);
    }
    let mut arr = [0u8; 8];
    let n = bytes.len().min(8);
    arr[..n].copy_from_slice(&bytes[..n]);
    Ok(u64::from_le_bytes(arr))
}
