use std::fmt;
use std::sync::Arc;

use super::{Dense, Element, SharedArray, Storage};
use crate::error::Error;
use crate::lang::ArrayResult;

/// Whether an [`Array`] owns its storage or merely aliases it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Frees the storage when dropped
    Owner,
    /// Aliases storage owned elsewhere; `epoch` is the storage epoch at the
    /// time the view was taken
    View { epoch: u64 },
}

/// Array
///
/// A flat buffer with caller-visible ownership. An owning array allocates
/// zero-initialized storage and frees it when it goes out of scope; a view
/// aliases a range of another array's storage, never copies and never frees.
///
/// Views do not extend their owner's lifetime: once the owner is dropped,
/// a view is stale. With `costly-checks` enabled, touching a stale view
/// panics, and [`Dense::validate`] reports it as an error.
///
/// Cloning an array always copies its elements into a new owning array,
/// whether the source owns its data or is a view. This is the only implicit
/// copy.
///
/// ```
/// use tick_array::object::{Array, Dense};
///
/// let a = Array::from(vec![1.0, 2.0, 3.0, 4.0]);
/// let v = a.view_range(1, 3).unwrap();
/// v.set(0, 20.0);
///
/// assert_eq!(a.to_vec(), vec![1.0, 20.0, 3.0, 4.0]);
/// assert!(v.is_view());
/// ```
///
pub struct Array<T: Element> {
    storage: Arc<Storage<T>>,
    offset: usize,
    len: usize,
    role: Role,
}

impl<T: Element> Array<T> {
    /// Create an owning, zero-initialized array of `n` elements
    pub fn new(n: usize) -> Self {
        Array::from(vec![T::default(); n])
    }

    pub(crate) fn from_parts(storage: Arc<Storage<T>>, offset: usize, len: usize, role: Role) -> Self {
        Array {
            storage,
            offset,
            len,
            role,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    /// Hand this array's storage over to a new [`SharedArray`]
    ///
    /// Zero copy: the storage changes owner, and `self` turns into a view of
    /// the now shared storage. Writing through either handle is observed
    /// through the other. The shared array starts with a reference count of
    /// one.
    ///
    /// Only an owning array can give its storage away. Calling this on a
    /// view is an ownership violation and leaves the view untouched.
    ///
    /// ```
    /// use tick_array::object::{Array, Dense};
    ///
    /// let mut a = Array::from(vec![1, 2, 3]);
    /// let shared = a.release_to_shared().unwrap();
    /// shared.set(0, 10);
    ///
    /// assert!(a.is_view());
    /// assert_eq!(a.get(0), 10);
    /// assert_eq!(shared.ref_count(), 1);
    /// ```
    ///
    pub fn release_to_shared(&mut self) -> ArrayResult<SharedArray<T>> {
        if self.role != Role::Owner {
            return Error::OwnershipViolation("only an owning array can release its storage")
                .into();
        }

        self.role = Role::View {
            epoch: self.storage.epoch(),
        };
        log::debug!("released {} elements to shared ownership", self.len);
        Ok(SharedArray::from_storage(Arc::clone(&self.storage)))
    }
}

impl<T: Element> Dense<T> for Array<T> {
    fn storage(&self) -> &Arc<Storage<T>> {
        &self.storage
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn len(&self) -> usize {
        self.len
    }

    fn view_epoch(&self) -> Option<u64> {
        match self.role {
            Role::Owner => None,
            Role::View { epoch } => Some(epoch),
        }
    }
}

impl<T: Element> Drop for Array<T> {
    fn drop(&mut self) {
        if self.role == Role::Owner {
            if let Err(e) = self.storage.release() {
                log::error!("{e}");
            }
        }
    }
}

impl<T: Element> Clone for Array<T> {
    /// Deep copy into a new owning array
    fn clone(&self) -> Self {
        Array::from(self.to_vec())
    }
}

impl<T: Element> Default for Array<T> {
    fn default() -> Self {
        Array::new(0)
    }
}

impl<T: Element> From<Vec<T>> for Array<T> {
    /// Take ownership of `value` without copying
    fn from(value: Vec<T>) -> Self {
        let len = value.len();
        Array::from_parts(Storage::owned(value), 0, len, Role::Owner)
    }
}

impl<T: Element> From<&[T]> for Array<T> {
    fn from(value: &[T]) -> Self {
        Array::from(value.to_vec())
    }
}

impl<T: Element> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Array::from(iter.into_iter().collect::<Vec<T>>())
    }
}

impl<T: Element> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.with_slice(|x| other.with_slice(|y| x == y))
    }
}

impl<T: Element> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("role", &self.role)
            .field("offset", &self.offset)
            .field("data", &self.to_vec())
            .finish()
    }
}

impl<T: Element> fmt::Display for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_slice(|x| {
            write!(f, "[")?;
            for (i, xi) in x.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{xi}")?;
            }
            write!(f, "]")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Signal;

    #[test]
    fn new_is_zeroed() {
        for n in [0, 1, 7, 128] {
            let a = Array::<f64>::new(n);
            assert_eq!(a.len(), n);
            assert!(a.is_owner());
            assert!(a.to_vec().iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn views_alias_storage() {
        let a: Array<i32> = (0..10).collect();
        for (i, j) in [(0, 0), (0, 10), (3, 7), (9, 10), (10, 10)] {
            let v = a.view_range(i, j).unwrap();
            assert_eq!(v.len(), j - i);
            for k in 0..v.len() {
                v.set(k, -(k as i32));
                assert_eq!(a.get(i + k), -(k as i32));
            }
        }
    }

    #[test]
    fn integer_reductions_wrap() {
        let a = Array::from(vec![i64::MAX, 1]);
        assert_eq!(a.sum(), i64::MIN);

        let b = Array::from(vec![u32::MAX; 3]);
        b.mult_incr(&Array::from(vec![1, 2, 3]), 1).unwrap();
        assert_eq!(b.to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn views_of_views_compose_offsets() {
        let a = Array::from(vec![0, 1, 2, 3, 4, 5, 6, 7]);
        let v = a.view_range(2, 7).unwrap();
        let w = v.view_range(1, 3).unwrap();
        assert_eq!(w.to_vec(), vec![3, 4]);
        w.fill(0);
        assert_eq!(a.to_vec(), vec![0, 1, 2, 0, 0, 5, 6, 7]);
    }

    #[test]
    fn clone_copies_even_views() {
        let a = Array::from(vec![1.0, 2.0, 3.0]);
        let v = a.view();
        let c = v.clone();
        assert!(c.is_owner());

        c.set(0, 100.0);
        assert_eq!(a.get(0), 1.0);
        assert_eq!(c, Array::from(vec![100.0, 2.0, 3.0]));
    }

    #[test]
    fn release_to_shared_never_copies() {
        let mut a = Array::from(vec![1.0, 2.0, 3.0]);
        let shared = a.release_to_shared().unwrap();
        assert!(a.is_view());
        assert!(a.shares_storage_with(&shared));

        shared.set(2, 30.0);
        assert_eq!(a.get(2), 30.0);
        a.set(0, 10.0);
        assert_eq!(shared.get(0), 10.0);
    }

    #[test]
    fn release_to_shared_survives_former_owner() {
        let mut a = Array::from(vec![5_u16, 6]);
        let shared = a.release_to_shared().unwrap();
        drop(a);
        assert_eq!(shared.to_vec(), vec![5, 6]);
        assert_eq!(shared.ref_count(), 1);
    }

    #[test]
    fn release_to_shared_on_view_fails() {
        let a = Array::from(vec![1, 2, 3]);
        for mut v in [a.view(), a.view_range(0, 1).unwrap(), a.view_range(1, 1).unwrap()] {
            let result = v.release_to_shared();
            assert!(matches!(
                result,
                Err(Signal::Error(Error::OwnershipViolation(_)))
            ));
            assert!(v.is_view());
        }

        let mut a = Array::from(vec![1, 2, 3]);
        let _shared = a.release_to_shared().unwrap();
        assert!(a.release_to_shared().is_err());
    }

    #[test]
    fn kernels_delegate_to_backend() {
        let a = Array::from(vec![1.0, 2.0, 3.0]);
        let b = Array::from(vec![4.0, 5.0, 6.0]);
        assert_eq!(a.dot(&b), Ok(32.0));
        assert_eq!(a.sum(), 6.0);
        assert_eq!(a.norm_sq(), 14.0);

        a.mult_incr(&b, 2.0).unwrap();
        assert_eq!(a.to_vec(), vec![9.0, 12.0, 15.0]);

        a.scale(-1.0);
        assert_eq!(a.abs_sum(), 36.0);

        a.init_to_zero();
        assert_eq!(a.sum(), 0.0);
    }

    #[test]
    fn mult_incr_with_self_alias() {
        let a = Array::from(vec![1, 2, 3]);
        a.mult_incr(&a.view(), 2).unwrap();
        assert_eq!(a.to_vec(), vec![3, 6, 9]);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let a = Array::from(vec![1.0, 2.0, 3.0]);
        let b = Array::from(vec![1.0, 2.0]);
        assert_eq!(
            a.dot(&b),
            Err(Signal::Error(Error::ShapeMismatch {
                expected: 3,
                found: 2
            }))
        );
    }

    #[test]
    fn checked_get_reports_range() {
        let a = Array::from(vec![1, 2]);
        assert_eq!(a.checked_get(1), Ok(2));
        assert_eq!(
            a.checked_get(2),
            Err(Signal::Error(Error::IndexOutOfRange { index: 2, len: 2 }))
        );
    }

    #[cfg(feature = "costly-checks")]
    #[test]
    fn invalid_view_ranges_are_range_errors() {
        let a = Array::<f32>::new(4);
        for (i, j) in [(3, 2), (0, 5), (5, 5)] {
            assert_eq!(
                a.view_range(i, j).unwrap_err(),
                Signal::Error(Error::RangeOutOfBounds {
                    start: i,
                    end: j,
                    len: 4
                })
            );
        }
    }

    #[cfg(feature = "costly-checks")]
    #[test]
    fn views_go_stale_when_owner_drops() {
        let a = Array::from(vec![1.0, 2.0]);
        let v = a.view();
        assert_eq!(v.validate(), Ok(()));
        drop(a);
        assert_eq!(v.validate(), Err(Signal::Error(Error::StaleView)));
    }

    #[cfg(feature = "costly-checks")]
    #[test]
    #[should_panic(expected = "freed or reallocated")]
    fn stale_view_access_panics() {
        let a = Array::from(vec![1.0, 2.0]);
        let v = a.view();
        drop(a);
        v.get(0);
    }

    #[test]
    fn display() {
        let a = Array::from(vec![1, 2, 3]);
        assert_eq!(a.to_string(), "[1, 2, 3]");
    }
}
