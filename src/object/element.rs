use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub};

/// Element type tag
///
/// Identifies the numeric type stored in an array. The discriminant doubles
/// as the tag written by the serializer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum DType {
    F64 = 0x01,
    F32 = 0x02,
    I64 = 0x03,
    U64 = 0x04,
    I32 = 0x05,
    U32 = 0x06,
    I16 = 0x07,
    U16 = 0x08,
}

impl DType {
    /// Size in bytes of a single element
    pub fn element_size(self) -> usize {
        match self {
            DType::I16 | DType::U16 => 2,
            DType::F32 | DType::I32 | DType::U32 => 4,
            DType::F64 | DType::I64 | DType::U64 => 8,
        }
    }

    /// Try to convert from a u8 tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        use strum::IntoEnumIterator;
        DType::iter().find(|d| *d as u8 == tag)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F64 | DType::F32)
    }
}

/// Numeric array element
///
/// Everything an array needs from its element type: arithmetic for the
/// vector kernels, a promoted accumulator for sums and a little-endian byte
/// encoding for the serializer.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Display
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + MulAssign
{
    const DTYPE: DType;

    /// Accumulator type used by `sum`
    type Promoted: Element;

    fn promote(self) -> Self::Promoted;
    fn abs(self) -> Self;

    /// `self + rhs`, wrapping around on integer overflow
    fn add_wrapping(self, rhs: Self) -> Self;

    /// `self * rhs`, wrapping around on integer overflow
    fn mul_wrapping(self, rhs: Self) -> Self;

    fn write_le(self, out: &mut Vec<u8>);

    /// Read one element from exactly `DTYPE.element_size()` bytes
    fn read_le(bytes: &[u8]) -> Self;

    fn from_f64(x: f64) -> Self;
    fn to_f64(self) -> f64;
}

macro_rules! register_element {
    ( $ty:ty => $dtype:ident, $promoted:ty, abs: $abs:expr, add: $add:expr, mul: $mul:expr ) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$dtype;
            type Promoted = $promoted;

            #[inline]
            fn promote(self) -> Self::Promoted {
                self as $promoted
            }

            #[inline]
            fn abs(self) -> Self {
                let f: fn($ty) -> $ty = $abs;
                f(self)
            }

            #[inline]
            fn add_wrapping(self, rhs: Self) -> Self {
                let f: fn($ty, $ty) -> $ty = $add;
                f(self, rhs)
            }

            #[inline]
            fn mul_wrapping(self, rhs: Self) -> Self {
                let f: fn($ty, $ty) -> $ty = $mul;
                f(self, rhs)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }

            fn from_f64(x: f64) -> Self {
                x as $ty
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

register_element!(f64 => F64, f64, abs: |x| x.abs(), add: |a, b| a + b, mul: |a, b| a * b);
register_element!(f32 => F32, f64, abs: |x| x.abs(), add: |a, b| a + b, mul: |a, b| a * b);
register_element!(i64 => I64, i64, abs: |x| x.wrapping_abs(), add: |a, b| a.wrapping_add(b), mul: |a, b| a.wrapping_mul(b));
register_element!(u64 => U64, u64, abs: |x| x, add: |a, b| a.wrapping_add(b), mul: |a, b| a.wrapping_mul(b));
register_element!(i32 => I32, i64, abs: |x| x.wrapping_abs(), add: |a, b| a.wrapping_add(b), mul: |a, b| a.wrapping_mul(b));
register_element!(u32 => U32, u64, abs: |x| x, add: |a, b| a.wrapping_add(b), mul: |a, b| a.wrapping_mul(b));
register_element!(i16 => I16, i64, abs: |x| x.wrapping_abs(), add: |a, b| a.wrapping_add(b), mul: |a, b| a.wrapping_mul(b));
register_element!(u16 => U16, u64, abs: |x| x, add: |a, b| a.wrapping_add(b), mul: |a, b| a.wrapping_mul(b));
