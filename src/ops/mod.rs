//! Vector backends
//!
//! Elementary kernels over raw numeric buffers. Arrays never loop over their
//! elements themselves; they hand their slices to the backend selected for
//! the process.

mod naive;
pub use naive::Naive;

mod unrolled;
pub use unrolled::Unrolled;

use std::sync::OnceLock;

use crate::object::Element;

/// Environment variable consulted for the default backend
pub const BACKEND_ENV_VAR: &str = "TICK_ARRAY_BACKEND";

/// Elementary vector kernels
///
/// Buffers passed together are expected to have the same length; kernels
/// only touch the common prefix.
pub trait VectorOps {
    fn dot<T: Element>(&self, x: &[T], y: &[T]) -> T;
    fn sum<T: Element>(&self, x: &[T]) -> T::Promoted;
    fn abs_sum<T: Element>(&self, x: &[T]) -> T::Promoted;
    fn scale<T: Element>(&self, alpha: T, x: &mut [T]);
    fn fill<T: Element>(&self, alpha: T, x: &mut [T]);

    /// `y += alpha * x`
    fn axpy<T: Element>(&self, alpha: T, x: &[T], y: &mut [T]);
}

#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Naive,
    Unrolled,
}

impl VectorOps for BackendKind {
    fn dot<T: Element>(&self, x: &[T], y: &[T]) -> T {
        match self {
            BackendKind::Naive => Naive.dot(x, y),
            BackendKind::Unrolled => Unrolled.dot(x, y),
        }
    }

    fn sum<T: Element>(&self, x: &[T]) -> T::Promoted {
        match self {
            BackendKind::Naive => Naive.sum(x),
            BackendKind::Unrolled => Unrolled.sum(x),
        }
    }

    fn abs_sum<T: Element>(&self, x: &[T]) -> T::Promoted {
        match self {
            BackendKind::Naive => Naive.abs_sum(x),
            BackendKind::Unrolled => Unrolled.abs_sum(x),
        }
    }

    fn scale<T: Element>(&self, alpha: T, x: &mut [T]) {
        match self {
            BackendKind::Naive => Naive.scale(alpha, x),
            BackendKind::Unrolled => Unrolled.scale(alpha, x),
        }
    }

    fn fill<T: Element>(&self, alpha: T, x: &mut [T]) {
        match self {
            BackendKind::Naive => Naive.fill(alpha, x),
            BackendKind::Unrolled => Unrolled.fill(alpha, x),
        }
    }

    fn axpy<T: Element>(&self, alpha: T, x: &[T], y: &mut [T]) {
        match self {
            BackendKind::Naive => Naive.axpy(alpha, x, y),
            BackendKind::Unrolled => Unrolled.axpy(alpha, x, y),
        }
    }
}

/// The process-wide vector backend
///
/// The first call fixes the backend for the lifetime of the process: `x` if
/// given, otherwise the value of `TICK_ARRAY_BACKEND`, otherwise the naive
/// backend. Later calls return the fixed choice and ignore `x`.
pub fn vector_backend(x: Option<BackendKind>) -> BackendKind {
    static VECTOR_BACKEND: OnceLock<BackendKind> = OnceLock::new();
    *VECTOR_BACKEND.get_or_init(|| {
        let kind = x.or_else(backend_from_env).unwrap_or_default();
        log::debug!("using the {kind} vector backend");
        kind
    })
}

fn backend_from_env() -> Option<BackendKind> {
    let value = std::env::var(BACKEND_ENV_VAR).ok()?;
    match value.parse() {
        Ok(kind) => Some(kind),
        Err(_) => {
            log::warn!("ignoring unknown {BACKEND_ENV_VAR} value '{value}'");
            None
        }
    }
}
