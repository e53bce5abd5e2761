use super::{Kind, HEADER_SIZE, MAGIC, VERSION};
use crate::error::DecodeError;
use crate::object::{DType, Element};

/// Bounds-checked cursor over a serialized record
///
/// Every read checks the remaining length first, so corrupt dimensions or
/// truncated input surface as a [`DecodeError`] and never as an
/// out-of-bounds read or an oversized allocation.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read the file header and the kind and dtype tags
    pub(crate) fn header(&mut self) -> Result<(Kind, DType), DecodeError> {
        let header = self.take(HEADER_SIZE)?;
        if &header[0..8] != MAGIC {
            return Err(DecodeError::InvalidMagic);
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let kind = self.u8()?;
        let kind = Kind::from_u8(kind).ok_or(DecodeError::InvalidKind(kind))?;
        let dtype = self.u8()?;
        let dtype = DType::from_u8(dtype).ok_or(DecodeError::InvalidDType(dtype))?;
        Ok((kind, dtype))
    }

    pub fn dim(&mut self) -> Result<usize, DecodeError> {
        usize::try_from(self.u64()?).map_err(|_| DecodeError::SizeOverflow)
    }

    /// Read a buffer of exactly `len` elements
    pub fn buffer<T: Element>(&mut self, len: usize) -> Result<Vec<T>, DecodeError> {
        let expected = len
            .checked_mul(T::DTYPE.element_size())
            .ok_or(DecodeError::SizeOverflow)?;

        let actual = self.u64()?;
        if actual != expected as u64 {
            return Err(DecodeError::DataSizeMismatch {
                expected: expected as u64,
                actual,
            });
        }

        Ok(self
            .take(expected)?
            .chunks_exact(T::DTYPE.element_size())
            .map(T::read_le)
            .collect())
    }

    /// Read a buffer of however many elements its length prefix announces
    pub fn buffer_any<T: Element>(&mut self) -> Result<Vec<T>, DecodeError> {
        let size = T::DTYPE.element_size();
        let actual = self.u64()?;
        let n_bytes = usize::try_from(actual).map_err(|_| DecodeError::SizeOverflow)?;
        if n_bytes % size != 0 {
            return Err(DecodeError::DataSizeMismatch {
                expected: (n_bytes - n_bytes % size) as u64,
                actual,
            });
        }

        Ok(self.take(n_bytes)?.chunks_exact(size).map(T::read_le).collect())
    }

    /// Skip a buffer, returning its length in bytes
    pub fn skip_buffer(&mut self) -> Result<usize, DecodeError> {
        let n_bytes = usize::try_from(self.u64()?).map_err(|_| DecodeError::SizeOverflow)?;
        self.take(n_bytes)?;
        Ok(n_bytes)
    }

    /// Check that the whole input was consumed
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_past_the_end_are_truncation() {
        let bytes = [1, 2, 3];
        let mut r = Reader::new(&bytes);
        assert_eq!(
            r.u64(),
            Err(DecodeError::Truncated {
                needed: 8,
                remaining: 3
            })
        );
    }

    #[test]
    fn huge_length_prefix_does_not_allocate() {
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 8]);
        let mut r = Reader::new(&bytes);
        assert!(r.buffer_any::<f64>().is_err());
    }

    #[test]
    fn buffer_length_must_match() {
        let mut bytes = 8_u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1.5_f64.to_le_bytes());

        assert_eq!(Reader::new(&bytes).buffer::<f64>(1), Ok(vec![1.5]));
        assert_eq!(
            Reader::new(&bytes).buffer::<f64>(2),
            Err(DecodeError::DataSizeMismatch {
                expected: 16,
                actual: 8
            })
        );
        assert!(Reader::new(&bytes).buffer::<f32>(2).is_ok());
    }
}
