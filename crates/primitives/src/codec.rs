//! Byte-level reader shared by the instruction and container decoders.

/// Errors produced while decoding bytecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("unknown opcode {0:#04x} at byte {1}")]
    UnknownOpcode(u8, usize),
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    #[error("numeric constant operand of {0} bytes exceeds 32")]
    OversizedConst(usize),
    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),
}

/// A cursor over a byte slice with big-endian primitive readers.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset, used in error positions.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Fails unless every input byte has been consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.is_empty() { Ok(()) } else { Err(DecodeError::TrailingBytes(self.buf.len() - self.pos)) }
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        let bytes = self.bytes(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(DecodeError::InvalidBool(b)),
        }
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::UnexpectedEof(self.pos))?;
        let slice = self.buf.get(self.pos..end).ok_or(DecodeError::UnexpectedEof(self.buf.len()))?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads a `u16`-length-prefixed byte string.
    pub fn byte_string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u16()? as usize;
        Ok(self.bytes(len)?.to_vec())
    }
}

/// Appends a `u16`-length-prefixed byte string.
pub(crate) fn write_byte_string(out: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}
