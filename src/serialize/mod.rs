//! Binary serialization of arrays
//!
//! Every record is self-describing and little-endian:
//!
//! ```text
//! magic     8 bytes   b"TICKARR\0"
//! version   u32
//! flags     u32       reserved, zero
//! kind      u8        dense or sparse, 1d or 2d
//! dtype     u8        element type tag
//! dims      u64 * k   size, or rows and cols
//! buffers             each a u64 byte length followed by the elements
//! ```
//!
//! Dense records carry one buffer of values. Sparse 1D records carry the
//! indices and the values; sparse 2D records carry the row offsets, the
//! column indices and the values, in that order.
//!
//! Decoding always produces freshly allocated shared arrays with a reference
//! count of one.

mod reader;
pub use reader::Reader;

mod writer;
pub use writer::Writer;

use std::fmt;
use std::path::Path;

use crate::error::{DecodeError, Error};
use crate::lang::{ArrayResult, Signal};
use crate::object::{
    Array, Array2d, DType, Dense, Element, Index, SharedArray, SharedArray2d, SharedSparseArray,
    SharedSparseArray2d, SparseArray, SparseArray2d, VArray,
};

/// Magic bytes identifying an array record
pub const MAGIC: &[u8; 8] = b"TICKARR\0";

/// Current format version
pub const VERSION: u32 = 1;

/// Header size in bytes (magic + version + flags)
pub const HEADER_SIZE: usize = 16;

/// Shape of a serialized record
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Kind {
    Dense1d = 0x01,
    Dense2d = 0x02,
    Sparse2d = 0x03,
    Sparse1d = 0x04,
}

impl Kind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        use strum::IntoEnumIterator;
        Kind::iter().find(|k| *k as u8 == tag)
    }
}

/// Types that can be written as a record
pub trait Encode {
    const KIND: Kind;
    type Elem: Element;

    /// Write dimensions and payload buffers
    fn encode_body(&self, w: &mut Writer);
}

/// Types that can be read back from a record
pub trait Decode: Sized {
    const KIND: Kind;
    type Elem: Element;

    /// Read dimensions and payload buffers
    fn decode_body(r: &mut Reader) -> ArrayResult<Self>;
}

pub fn serialize<E: Encode + ?Sized>(x: &E) -> Vec<u8> {
    let mut w = Writer::new(E::KIND, <E::Elem as Element>::DTYPE);
    x.encode_body(&mut w);
    w.finish()
}

/// Decode a record, which must hold exactly one value of type `D`
pub fn deserialize<D: Decode>(bytes: &[u8]) -> ArrayResult<D> {
    let mut r = Reader::new(bytes);
    let (kind, dtype) = r.header()?;

    if kind != D::KIND {
        return DecodeError::KindMismatch {
            expected: D::KIND.into(),
            found: kind.into(),
        }
        .into();
    }

    let expected = <D::Elem as Element>::DTYPE;
    if dtype != expected {
        return DecodeError::DTypeMismatch {
            expected,
            found: dtype,
        }
        .into();
    }

    let value = D::decode_body(&mut r)?;
    r.finish()?;
    Ok(value)
}

pub fn to_file<E: Encode + ?Sized>(path: impl AsRef<Path>, x: &E) -> ArrayResult<()> {
    let path = path.as_ref();
    let bytes = serialize(x);
    std::fs::write(path, &bytes)?;
    log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

pub fn from_file<D: Decode>(path: impl AsRef<Path>) -> ArrayResult<D> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());
    deserialize(&bytes)
}

/// What a record holds, read from its header and dimensions only
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    pub kind: Kind,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub nnz: Option<usize>,
}

impl fmt::Display for RecordInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        write!(f, "{} {} [{}]", self.kind, self.dtype, shape.join(" x "))?;
        if let Some(nnz) = self.nnz {
            write!(f, " nnz={nnz}")?;
        }
        Ok(())
    }
}

/// Read the kind, dtype and shape of a record without decoding its values
pub fn inspect(bytes: &[u8]) -> ArrayResult<RecordInfo> {
    let mut r = Reader::new(bytes);
    let (kind, dtype) = r.header()?;

    let info = match kind {
        Kind::Dense1d => RecordInfo {
            kind,
            dtype,
            shape: vec![r.dim()?],
            nnz: None,
        },
        Kind::Dense2d => RecordInfo {
            kind,
            dtype,
            shape: vec![r.dim()?, r.dim()?],
            nnz: None,
        },
        Kind::Sparse1d => {
            let shape = vec![r.dim()?];
            let nnz = r.skip_buffer()? / DType::U32.element_size();
            r.skip_buffer()?;
            RecordInfo {
                kind,
                dtype,
                shape,
                nnz: Some(nnz),
            }
        }
        Kind::Sparse2d => {
            let shape = vec![r.dim()?, r.dim()?];
            r.skip_buffer()?;
            let nnz = r.skip_buffer()? / DType::U32.element_size();
            RecordInfo {
                kind,
                dtype,
                shape,
                nnz: Some(nnz),
            }
        }
    };
    Ok(info)
}

fn encode_dense1d<T: Element, D: Dense<T> + ?Sized>(x: &D, w: &mut Writer) {
    w.put_dim(x.len());
    x.with_slice(|values| w.put_buffer(values));
}

fn encode_dense2d<T: Element, D: Dense<T> + ?Sized>(x: &D, shape: (usize, usize), w: &mut Writer) {
    w.put_dim(shape.0);
    w.put_dim(shape.1);
    x.with_slice(|values| w.put_buffer(values));
}

macro_rules! impl_encode_dense1d {
    ( $( $ty:ident ),* ) => {
        $(
            impl<T: Element> Encode for $ty<T> {
                const KIND: Kind = Kind::Dense1d;
                type Elem = T;

                fn encode_body(&self, w: &mut Writer) {
                    encode_dense1d(self, w)
                }
            }
        )*
    };
}

impl_encode_dense1d!(Array, SharedArray, VArray);

impl<T: Element> Encode for Array2d<T> {
    const KIND: Kind = Kind::Dense2d;
    type Elem = T;

    fn encode_body(&self, w: &mut Writer) {
        encode_dense2d(self, self.shape(), w)
    }
}

impl<T: Element> Encode for SharedArray2d<T> {
    const KIND: Kind = Kind::Dense2d;
    type Elem = T;

    fn encode_body(&self, w: &mut Writer) {
        encode_dense2d(self, self.shape(), w)
    }
}

impl<T: Element> Encode for SparseArray<T> {
    const KIND: Kind = Kind::Sparse1d;
    type Elem = T;

    fn encode_body(&self, w: &mut Writer) {
        w.put_dim(self.size());
        self.indices().with_slice(|x| w.put_buffer(x));
        self.values().with_slice(|x| w.put_buffer(x));
    }
}

impl<T: Element> Encode for SharedSparseArray<T> {
    const KIND: Kind = Kind::Sparse1d;
    type Elem = T;

    fn encode_body(&self, w: &mut Writer) {
        self.view().encode_body(w)
    }
}

impl<T: Element> Encode for SparseArray2d<T> {
    const KIND: Kind = Kind::Sparse2d;
    type Elem = T;

    fn encode_body(&self, w: &mut Writer) {
        w.put_dim(self.n_rows());
        w.put_dim(self.n_cols());
        self.row_indices().with_slice(|x| w.put_buffer(x));
        self.indices().with_slice(|x| w.put_buffer(x));
        self.values().with_slice(|x| w.put_buffer(x));
    }
}

impl<T: Element> Encode for SharedSparseArray2d<T> {
    const KIND: Kind = Kind::Sparse2d;
    type Elem = T;

    fn encode_body(&self, w: &mut Writer) {
        self.view().encode_body(w)
    }
}

impl<T: Element> Decode for SharedArray<T> {
    const KIND: Kind = Kind::Dense1d;
    type Elem = T;

    fn decode_body(r: &mut Reader) -> ArrayResult<Self> {
        let len = r.dim()?;
        Ok(SharedArray::from(r.buffer::<T>(len)?))
    }
}

impl<T: Element> Decode for VArray<T> {
    const KIND: Kind = Kind::Dense1d;
    type Elem = T;

    fn decode_body(r: &mut Reader) -> ArrayResult<Self> {
        <SharedArray<T> as Decode>::decode_body(r).map(VArray::from)
    }
}

impl<T: Element> Decode for SharedArray2d<T> {
    const KIND: Kind = Kind::Dense2d;
    type Elem = T;

    fn decode_body(r: &mut Reader) -> ArrayResult<Self> {
        let n_rows = r.dim()?;
        let n_cols = r.dim()?;
        let len = n_rows
            .checked_mul(n_cols)
            .ok_or(DecodeError::SizeOverflow)?;
        SharedArray2d::from_shared(n_rows, n_cols, SharedArray::from(r.buffer::<T>(len)?))
    }
}

impl<T: Element> Decode for SharedSparseArray<T> {
    const KIND: Kind = Kind::Sparse1d;
    type Elem = T;

    fn decode_body(r: &mut Reader) -> ArrayResult<Self> {
        let size = r.dim()?;
        let indices = r.buffer_any::<Index>()?;
        let values = r.buffer::<T>(indices.len())?;

        SharedSparseArray::from_parts(size, SharedArray::from(indices), SharedArray::from(values))
            .map_err(structure_error)
    }
}

impl<T: Element> Decode for SharedSparseArray2d<T> {
    const KIND: Kind = Kind::Sparse2d;
    type Elem = T;

    fn decode_body(r: &mut Reader) -> ArrayResult<Self> {
        let n_rows = r.dim()?;
        let n_cols = r.dim()?;
        let n_offsets = n_rows.checked_add(1).ok_or(DecodeError::SizeOverflow)?;

        let row_indices = r.buffer::<Index>(n_offsets)?;
        let indices = r.buffer_any::<Index>()?;
        let values = r.buffer::<T>(indices.len())?;

        SharedSparseArray2d::from_parts(
            n_rows,
            n_cols,
            SharedArray::from(row_indices),
            SharedArray::from(indices),
            SharedArray::from(values),
        )
        .map_err(structure_error)
    }
}

/// Invalid sparse structure in a record is malformed input
fn structure_error(e: Signal) -> Signal {
    match e {
        Signal::Error(Error::InvalidSparse(msg)) => DecodeError::Structure(msg).into(),
        e => e,
    }
}
