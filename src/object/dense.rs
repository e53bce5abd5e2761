use std::sync::Arc;

use super::{Array, Element, Role, SparseArray, Storage};
use crate::error::Error;
use crate::lang::ArrayResult;
use crate::ops::{vector_backend, VectorOps};

/// Dense, contiguous numeric data
///
/// Implemented by every handle onto a dense buffer (owning arrays, views,
/// shared and resizable arrays, and their 2D counterparts). A handle only
/// describes *where* its elements live: the `[offset, offset + len)` range of
/// a [`Storage`]. Everything else, from element access to the vector kernels,
/// is provided on top of that.
///
/// Mutation goes through `&self`: handles alias, and writing through any of
/// them is observed by all the others.
pub trait Dense<T: Element> {
    fn storage(&self) -> &Arc<Storage<T>>;
    fn offset(&self) -> usize;
    fn len(&self) -> usize;

    /// Epoch observed when this handle started aliasing someone else's
    /// storage, `None` for handles that own (or co-own) it
    fn view_epoch(&self) -> Option<u64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_view(&self) -> bool {
        self.view_epoch().is_some()
    }

    /// Check that a view still refers to live storage
    ///
    /// A view is invalidated when its owner frees or reallocates the
    /// underlying buffer.
    fn validate(&self) -> ArrayResult<()> {
        match self.view_epoch() {
            Some(epoch) if epoch != self.storage().epoch() => Error::StaleView.into(),
            _ => Ok(()),
        }
    }

    /// Borrow the elements immutably for the duration of `f`
    ///
    /// # Panics
    ///
    /// With `costly-checks` enabled, panics when called on a stale view.
    fn with_slice<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[T]) -> R,
    {
        check_live::<T, Self>(self);
        let start = self.offset();
        self.storage().with_range(start..start + self.len(), f)
    }

    /// Borrow the elements mutably for the duration of `f`
    ///
    /// Only waits on borrows of overlapping elements: handles onto disjoint
    /// parts of one buffer write concurrently.
    ///
    /// # Panics
    ///
    /// With `costly-checks` enabled, panics when called on a stale view.
    fn with_slice_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut [T]) -> R,
    {
        check_live::<T, Self>(self);
        let start = self.offset();
        self.storage().with_range_mut(start..start + self.len(), f)
    }

    /// Get a single element
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range, like slice indexing.
    fn get(&self, index: usize) -> T {
        self.with_slice(|x| x[index])
    }

    /// Get a single element, reporting out-of-range indices as an error
    fn checked_get(&self, index: usize) -> ArrayResult<T> {
        self.validate()?;
        self.with_slice(|x| x.get(index).copied()).ok_or_else(|| {
            Error::IndexOutOfRange {
                index,
                len: self.len(),
            }
            .into()
        })
    }

    /// Set a single element
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range, like slice indexing.
    fn set(&self, index: usize, value: T) {
        self.with_slice_mut(|x| x[index] = value)
    }

    fn to_vec(&self) -> Vec<T> {
        self.with_slice(|x| x.to_vec())
    }

    /// Whether both handles alias the same storage
    fn shares_storage_with<D: Dense<T> + ?Sized>(&self, other: &D) -> bool {
        Arc::ptr_eq(self.storage(), other.storage())
    }

    fn fill(&self, value: T) {
        self.with_slice_mut(|x| vector_backend(None).fill(value, x))
    }

    fn init_to_zero(&self) {
        self.fill(T::default())
    }

    /// Multiply every element by `alpha`
    fn scale(&self, alpha: T) {
        self.with_slice_mut(|x| vector_backend(None).scale(alpha, x))
    }

    fn sum(&self) -> T::Promoted {
        self.with_slice(|x| vector_backend(None).sum(x))
    }

    /// Sum of absolute values
    fn abs_sum(&self) -> T::Promoted {
        self.with_slice(|x| vector_backend(None).abs_sum(x))
    }

    /// Squared euclidean norm
    fn norm_sq(&self) -> T {
        self.with_slice(|x| vector_backend(None).dot(x, x))
    }

    fn dot<D: Dense<T> + ?Sized>(&self, other: &D) -> ArrayResult<T> {
        check_same_len(self.len(), other.len())?;
        Ok(self.with_slice(|x| other.with_slice(|y| vector_backend(None).dot(x, y))))
    }

    /// Dot product against a sparse array
    ///
    /// Runs in the number of non-zeros of `other`, independent of
    /// `self.len()`. Sparse indices outside `[0, self.len())` are a range
    /// error.
    fn dot_sparse(&self, other: &SparseArray<T>) -> ArrayResult<T> {
        other.dot_dense(self)
    }

    /// `self += alpha * x`
    fn mult_incr<D: Dense<T> + ?Sized>(&self, x: &D, alpha: T) -> ArrayResult<()> {
        check_same_len(self.len(), x.len())?;

        // both sides would claim the same elements
        if self.shares_storage_with(x) {
            let x = x.to_vec();
            self.with_slice_mut(|y| vector_backend(None).axpy(alpha, &x, y));
        } else {
            x.with_slice(|x| self.with_slice_mut(|y| vector_backend(None).axpy(alpha, x, y)));
        }
        Ok(())
    }

    /// Overwrite all elements with those of `other`
    fn copy_from<D: Dense<T> + ?Sized>(&self, other: &D) -> ArrayResult<()> {
        check_same_len(self.len(), other.len())?;
        if self.shares_storage_with(other) {
            let x = other.to_vec();
            self.with_slice_mut(|y| y.copy_from_slice(&x));
        } else {
            other.with_slice(|x| self.with_slice_mut(|y| y.copy_from_slice(x)));
        }
        Ok(())
    }

    /// A view onto all elements
    ///
    /// Never copies: writing through the view is observed through `self`.
    fn view(&self) -> Array<T> {
        Array::from_parts(
            Arc::clone(self.storage()),
            self.offset(),
            self.len(),
            Role::View {
                epoch: self.storage().epoch(),
            },
        )
    }

    /// A view onto elements `[start, end)`
    ///
    /// With `costly-checks` enabled, `start > end` or `end > len()` is a
    /// range error. Without, the range is taken as given and a bad range
    /// surfaces as a panic on first access.
    fn view_range(&self, start: usize, end: usize) -> ArrayResult<Array<T>> {
        check_range(start, end, self.len())?;
        Ok(Array::from_parts(
            Arc::clone(self.storage()),
            self.offset() + start,
            end.saturating_sub(start),
            Role::View {
                epoch: self.storage().epoch(),
            },
        ))
    }
}

fn check_same_len(expected: usize, found: usize) -> ArrayResult<()> {
    if expected != found {
        return Error::ShapeMismatch { expected, found }.into();
    }
    Ok(())
}

#[cfg(feature = "costly-checks")]
pub(crate) fn check_range(start: usize, end: usize, len: usize) -> ArrayResult<()> {
    if start > end || end > len {
        return Error::RangeOutOfBounds { start, end, len }.into();
    }
    Ok(())
}

#[cfg(not(feature = "costly-checks"))]
pub(crate) fn check_range(_start: usize, _end: usize, _len: usize) -> ArrayResult<()> {
    Ok(())
}

#[cfg(feature = "costly-checks")]
fn check_live<T: Element, D: Dense<T> + ?Sized>(array: &D) {
    if let Err(e) = array.validate() {
        panic!("{e}")
    }
}

#[cfg(not(feature = "costly-checks"))]
fn check_live<T: Element, D: Dense<T> + ?Sized>(_array: &D) {}
