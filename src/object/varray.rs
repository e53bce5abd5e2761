use std::fmt;
use std::sync::Arc;

use super::storage::Buffer;
use super::{Dense, Element, SharedArray, Storage};

/// Resizable Shared Array
///
/// A [`SharedArray`] whose logical size can change after construction.
/// Storage is allocated with some spare capacity; shrinking only lowers the
/// logical size and never gives memory back.
///
/// Resizing happens in place on the shared storage: every clone of a
/// `VArray`, and every `SharedArray` obtained from it, observes the new size.
/// Views taken before a reallocation are stale afterwards.
///
/// ```
/// use tick_array::object::{Dense, VArray};
///
/// let a = VArray::<i32>::new(0);
/// for i in 0..5 {
///     a.append1(i);
/// }
///
/// assert_eq!(a.to_vec(), vec![0, 1, 2, 3, 4]);
/// assert!(a.capacity() >= 5);
/// ```
///
#[derive(Clone, PartialEq)]
pub struct VArray<T: Element> {
    shared: SharedArray<T>,
}

impl<T: Element> VArray<T> {
    pub fn new(n: usize) -> Self {
        VArray {
            shared: SharedArray::new(n),
        }
    }

    /// Number of elements the storage can hold without reallocating
    pub fn capacity(&self) -> usize {
        self.shared.storage().capacity()
    }

    pub fn as_shared(&self) -> &SharedArray<T> {
        &self.shared
    }

    pub fn into_shared(self) -> SharedArray<T> {
        self.shared
    }

    pub fn ref_count(&self) -> usize {
        self.shared.ref_count()
    }

    /// Change the logical size
    ///
    /// Within capacity this only moves the logical end, so shrinking and
    /// growing back restores the elements that were there. Past capacity the
    /// storage is reallocated to `max(new_size, 2 * capacity)` elements. With
    /// `preserve`, the first `min(size, new_size)` elements are carried over;
    /// without, the new contents are zeroed.
    pub fn set_size(&self, new_size: usize, preserve: bool) {
        let storage = self.shared.storage();
        let mut buffer = storage.write();

        let capacity = buffer.len();
        if new_size <= capacity {
            storage.set_size(new_size);
            return;
        }

        let new_capacity = new_size.max(capacity.saturating_mul(2));
        let mut data = vec![T::default(); new_capacity];
        if preserve {
            let kept = storage.size().min(new_size);
            data[..kept].copy_from_slice(&buffer.as_slice()[..kept]);
        }

        *buffer = Buffer::from_vec(data);
        storage.set_size(new_size);
        storage.bump_epoch();
        log::debug!("reallocated varray from {capacity} to {new_capacity} elements");
    }

    /// Append a single element
    pub fn append1(&self, value: T) {
        let n = self.len();
        self.set_size(n + 1, true);
        self.set(n, value);
    }

    /// Append all elements of `other`, which may alias `self`
    pub fn append<D: Dense<T> + ?Sized>(&self, other: &D) {
        let tail = other.to_vec();
        let n = self.len();
        self.set_size(n + tail.len(), true);
        self.with_slice_mut(|x| x[n..].copy_from_slice(&tail));
    }
}

impl<T: Element> Dense<T> for VArray<T> {
    fn storage(&self) -> &Arc<Storage<T>> {
        self.shared.storage()
    }

    fn offset(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        self.shared.len()
    }

    fn view_epoch(&self) -> Option<u64> {
        None
    }
}

impl<T: Element> From<SharedArray<T>> for VArray<T> {
    fn from(shared: SharedArray<T>) -> Self {
        VArray { shared }
    }
}

impl<T: Element> From<Vec<T>> for VArray<T> {
    fn from(value: Vec<T>) -> Self {
        VArray::from(SharedArray::from(value))
    }
}

impl<T: Element> fmt::Debug for VArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VArray")
            .field("capacity", &self.capacity())
            .field("ref_count", &self.ref_count())
            .field("data", &self.to_vec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_then_shrink_preserves_prefix() {
        let original = vec![1.0, 2.0, 3.0, 4.0];
        for k in [5, 8, 9, 100] {
            for j in 0..=k {
                let a = VArray::from(original.clone());
                a.set_size(k, true);
                a.set_size(j, true);

                let kept = original.len().min(j);
                assert_eq!(a.len(), j);
                assert_eq!(a.to_vec()[..kept], original[..kept]);
            }
        }
    }

    #[test]
    fn shrink_then_grow_within_capacity_restores() {
        let a = VArray::from(vec![1, 2, 3, 4, 5]);
        a.set_size(2, true);
        assert_eq!(a.to_vec(), vec![1, 2]);
        assert_eq!(a.capacity(), 5);

        a.set_size(5, true);
        assert_eq!(a.to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn growth_is_geometric() {
        let a = VArray::<u16>::new(4);
        a.set_size(5, true);
        assert_eq!(a.capacity(), 8);
        a.set_size(100, true);
        assert_eq!(a.capacity(), 100);
    }

    #[test]
    fn growth_without_preserve_zeroes() {
        let a = VArray::from(vec![7, 7, 7]);
        a.set_size(10, false);
        assert_eq!(a.to_vec(), vec![0; 10]);
    }

    #[test]
    fn resize_is_seen_by_all_holders() {
        let a = VArray::from(vec![1.0, 2.0]);
        let b = a.clone();
        let shared = a.as_shared().clone();
        assert_eq!(a.ref_count(), 3);

        a.append(&SharedArray::from(vec![3.0, 4.0, 5.0]));
        assert_eq!(b.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(shared.len(), 5);
        assert_eq!(shared.sum(), 15.0);
    }

    #[test]
    fn reallocation_invalidates_views() {
        let a = VArray::from(vec![1, 2]);
        let v = a.view();
        a.set_size(1, true);
        assert!(v.validate().is_ok());

        a.set_size(3, true);
        assert!(v.validate().is_err());
    }

    #[test]
    fn append_self() {
        let a = VArray::from(vec![1, 2, 3]);
        a.append(&a.clone());
        assert_eq!(a.to_vec(), vec![1, 2, 3, 1, 2, 3]);
    }
}
