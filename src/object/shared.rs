use std::fmt;
use std::sync::Arc;

use super::{Dense, Element, Storage};

/// Shared Array
///
/// A reference-counted handle onto array storage. Every clone is one more
/// owner; the storage is freed when the last owner goes away, whether that
/// owner lives on this side of the host boundary (a `SharedArray` being
/// dropped) or on the other (a [`HostRef`](super::HostRef) being released).
/// Both paths decrement the same counter.
///
/// Cloning never copies data. Use [`SharedArray::from_copy`] for that.
///
/// ```
/// use tick_array::object::{Dense, SharedArray};
///
/// let a = SharedArray::<f64>::new(3);
/// let b = a.clone();
/// b.set(1, 4.0);
///
/// assert_eq!(a.get(1), 4.0);
/// assert_eq!(a.ref_count(), 2);
/// ```
///
pub struct SharedArray<T: Element> {
    storage: Arc<Storage<T>>,
}

impl<T: Element> SharedArray<T> {
    /// Allocate zeroed storage of `n` elements with a reference count of one
    pub fn new(n: usize) -> Self {
        SharedArray::from(vec![T::default(); n])
    }

    /// Copy the elements of any dense handle, view or not, into new storage
    pub fn from_copy<D: Dense<T> + ?Sized>(array: &D) -> Self {
        SharedArray::from(array.to_vec())
    }

    /// Wrap storage whose owner count already accounts for this handle
    pub(crate) fn from_storage(storage: Arc<Storage<T>>) -> Self {
        SharedArray { storage }
    }

    /// Number of owners of the underlying storage, on either side of the
    /// host boundary
    pub fn ref_count(&self) -> usize {
        self.storage.owners()
    }

    /// Whether both handles point at the same storage
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl<T: Element> Dense<T> for SharedArray<T> {
    fn storage(&self) -> &Arc<Storage<T>> {
        &self.storage
    }

    fn offset(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        self.storage.size()
    }

    fn view_epoch(&self) -> Option<u64> {
        None
    }
}

impl<T: Element> Clone for SharedArray<T> {
    fn clone(&self) -> Self {
        self.storage.acquire();
        SharedArray::from_storage(Arc::clone(&self.storage))
    }
}

impl<T: Element> Drop for SharedArray<T> {
    fn drop(&mut self) {
        if let Err(e) = self.storage.release() {
            log::error!("{e}");
        }
    }
}

impl<T: Element> From<Vec<T>> for SharedArray<T> {
    fn from(value: Vec<T>) -> Self {
        SharedArray::from_storage(Storage::owned(value))
    }
}

impl<T: Element> FromIterator<T> for SharedArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        SharedArray::from(iter.into_iter().collect::<Vec<T>>())
    }
}

impl<T: Element> PartialEq for SharedArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.with_slice(|x| other.with_slice(|y| x == y))
    }
}

impl<T: Element> fmt::Debug for SharedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArray")
            .field("ref_count", &self.ref_count())
            .field("data", &self.to_vec())
            .finish()
    }
}
