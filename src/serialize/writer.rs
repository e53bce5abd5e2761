use super::{Kind, HEADER_SIZE, MAGIC, VERSION};
use crate::object::{DType, Element};

/// Little-endian record builder
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Start a record with the file header, kind and dtype tags
    pub(crate) fn new(kind: Kind, dtype: DType) -> Self {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 2);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
        buf.push(kind as u8);
        buf.push(dtype as u8);
        Writer { buf }
    }

    pub fn put_u64(&mut self, x: u64) {
        self.buf.extend_from_slice(&x.to_le_bytes());
    }

    /// A dimension, always stored as a u64
    pub fn put_dim(&mut self, x: usize) {
        self.put_u64(x as u64);
    }

    /// A payload buffer: its length in bytes, then the elements
    pub fn put_buffer<T: Element>(&mut self, xs: &[T]) {
        self.put_u64((xs.len() * T::DTYPE.element_size()) as u64);
        self.buf.reserve(xs.len() * T::DTYPE.element_size());
        for &x in xs {
            x.write_le(&mut self.buf);
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}
