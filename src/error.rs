use crate::lang::Signal;
use crate::object::DType;

use core::fmt;

#[macro_export]
macro_rules! internal_err {
    () => {
        $crate::error::Error::Internal(None, std::file!(), std::line!()).into()
    };
    ( $x:expr ) => {
        $crate::error::Error::Internal(Some($x.to_string()), std::file!(), std::line!()).into()
    };
}

#[macro_export]
macro_rules! err {
    ( $x:expr ) => {
        $crate::error::Error::Other($x.to_string()).into()
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    // range errors
    IndexOutOfRange { index: usize, len: usize },
    RangeOutOfBounds { start: usize, end: usize, len: usize },
    ShapeMismatch { expected: usize, found: usize },
    ShapeOverflow { n_rows: usize, n_cols: usize },
    StaleView,

    // ownership
    OwnershipViolation(&'static str),

    // sparse structure
    InvalidSparse(String),

    // serialization
    Decode(DecodeError),
    Io(String),

    // parallel execution
    WorkerPanicked(String),

    Other(String),
    Internal(Option<String>, &'static str, u32),
}

impl Error {
    fn as_str(&self) -> String {
        match self {
            Error::IndexOutOfRange { index, len } => {
                format!("index {index} is out of range for an array of size {len}")
            }
            Error::RangeOutOfBounds { start, end, len } => {
                format!("range [{start}, {end}) is invalid for an array of size {len}")
            }
            Error::ShapeMismatch { expected, found } => {
                format!("size mismatch, expected {expected} elements but found {found}")
            }
            Error::ShapeOverflow { n_rows, n_cols } => {
                format!("shape {n_rows} x {n_cols} has more elements than fit in memory")
            }
            Error::StaleView => {
                "view refers to storage that has since been freed or reallocated".to_string()
            }
            Error::OwnershipViolation(msg) => format!("ownership violation: {msg}"),
            Error::InvalidSparse(msg) => format!("invalid sparse structure: {msg}"),
            Error::Decode(e) => format!("decode failed: {e}"),
            Error::Io(msg) => format!("i/o failure: {msg}"),
            Error::WorkerPanicked(msg) => format!("worker thread panicked: {msg}"),
            Error::Other(s) => s.to_string(),
            Error::Internal(None, file, line) => format!("Internal Error ({file}:{line})"),
            Error::Internal(Some(msg), file, line) => {
                format!("Internal Error ({file}:{line})\n{msg}")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.as_str())
    }
}

impl std::error::Error for Error {}

impl From<Error> for Signal {
    fn from(val: Error) -> Self {
        Signal::Error(val)
    }
}

impl<T> From<Error> for Result<T, Signal> {
    fn from(val: Error) -> Self {
        Err(Signal::Error(val))
    }
}

impl From<&str> for Signal {
    fn from(msg: &str) -> Self {
        Signal::Error(Error::Other(msg.to_string()))
    }
}

impl From<std::io::Error> for Signal {
    fn from(e: std::io::Error) -> Self {
        Signal::Error(Error::Io(e.to_string()))
    }
}

/// Failures while reading a serialized record
///
/// Always recoverable: malformed input is expected and must be handled by
/// the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    InvalidMagic,
    UnsupportedVersion(u32),
    InvalidKind(u8),
    InvalidDType(u8),
    KindMismatch { expected: &'static str, found: &'static str },
    DTypeMismatch { expected: DType, found: DType },
    Truncated { needed: usize, remaining: usize },
    SizeOverflow,
    DataSizeMismatch { expected: u64, actual: u64 },
    TrailingBytes(usize),
    Structure(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidMagic => write!(f, "invalid magic bytes, not an array record"),
            DecodeError::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            DecodeError::InvalidKind(tag) => write!(f, "invalid record kind tag: 0x{tag:02X}"),
            DecodeError::InvalidDType(tag) => write!(f, "invalid dtype tag: 0x{tag:02X}"),
            DecodeError::KindMismatch { expected, found } => {
                write!(f, "expected a {expected} record, found {found}")
            }
            DecodeError::DTypeMismatch { expected, found } => {
                write!(f, "expected elements of type {expected}, found {found}")
            }
            DecodeError::Truncated { needed, remaining } => write!(
                f,
                "unexpected end of input, needed {needed} bytes but only {remaining} remain"
            ),
            DecodeError::SizeOverflow => write!(f, "declared dimensions overflow"),
            DecodeError::DataSizeMismatch { expected, actual } => write!(
                f,
                "data size mismatch: expected {expected} bytes, got {actual}"
            ),
            DecodeError::TrailingBytes(n) => write!(f, "{n} unexpected trailing bytes"),
            DecodeError::Structure(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<DecodeError> for Signal {
    fn from(e: DecodeError) -> Self {
        Signal::Error(Error::Decode(e))
    }
}

impl<T> From<DecodeError> for Result<T, Signal> {
    fn from(e: DecodeError) -> Self {
        Err(Signal::Error(Error::Decode(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let e = Error::RangeOutOfBounds { start: 3, end: 1, len: 5 };
        assert_eq!(
            e.to_string(),
            "Error: range [3, 1) is invalid for an array of size 5"
        );

        let e = Error::Decode(DecodeError::InvalidKind(0xff));
        assert_eq!(e.to_string(), "Error: decode failed: invalid record kind tag: 0xFF");
    }

    #[test]
    fn macros_produce_signals() {
        let r: Result<(), Signal> = err!("boom");
        assert_eq!(r, Err(Signal::Error(Error::Other("boom".to_string()))));

        let r: Result<(), Signal> = internal_err!();
        assert!(matches!(r, Err(Signal::Error(Error::Internal(None, _, _)))));
    }
}
