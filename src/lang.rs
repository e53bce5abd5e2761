use core::fmt;

use crate::error::Error;

/// Non-local outcomes of an operation
///
/// Errors and cancellation travel along the same `Result` channel but stay
/// distinguishable: an interrupt is the expected result of a deliberate
/// external request, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Error(Error),
    Interrupt,
}

pub type ArrayResult<T> = Result<T, Signal>;

impl Signal {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Signal::Interrupt)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Error(e) => write!(f, "{e}"),
            Signal::Interrupt => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for Signal {}

impl<T> From<Signal> for Result<T, Signal> {
    fn from(value: Signal) -> Self {
        Err(value)
    }
}
