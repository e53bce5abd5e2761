use std::fmt;
use std::sync::Arc;

use super::{Array, Dense, Element, SharedArray, Storage};
use crate::error::Error;
use crate::lang::ArrayResult;

/// Row-major 2D array
///
/// An [`Array`] together with a shape. Ownership follows the wrapped array:
/// an owning `Array2d` frees its storage on drop, a view aliases someone
/// else's. Cloning copies.
///
/// ```
/// use tick_array::object::{Array2d, Dense};
///
/// let a = Array2d::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
/// let row = a.view_row(1).unwrap();
/// row.set(0, 40);
///
/// assert_eq!(a.get2(1, 0), 40);
/// assert_eq!(row.to_vec(), vec![40, 5, 6]);
/// ```
///
#[derive(Clone)]
pub struct Array2d<T: Element> {
    array: Array<T>,
    n_rows: usize,
    n_cols: usize,
}

impl<T: Element> Array2d<T> {
    /// Create an owning, zero-initialized `n_rows` by `n_cols` array
    ///
    /// A shape whose element count overflows `usize` is an error.
    pub fn new(n_rows: usize, n_cols: usize) -> ArrayResult<Self> {
        Ok(Array2d {
            array: Array::new(checked_len(n_rows, n_cols)?),
            n_rows,
            n_cols,
        })
    }

    /// Take ownership of row-major `data`
    pub fn from_vec(n_rows: usize, n_cols: usize, data: Vec<T>) -> ArrayResult<Self> {
        Array2d::from_array(n_rows, n_cols, Array::from(data))
    }

    pub(crate) fn from_array(n_rows: usize, n_cols: usize, array: Array<T>) -> ArrayResult<Self> {
        check_shape(n_rows, n_cols, array.len())?;
        Ok(Array2d {
            array,
            n_rows,
            n_cols,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn as_array(&self) -> &Array<T> {
        &self.array
    }

    pub fn is_owner(&self) -> bool {
        self.array.is_owner()
    }

    pub fn get2(&self, row: usize, col: usize) -> T {
        self.get(flat_index(row, col, self.n_rows, self.n_cols))
    }

    pub fn set2(&self, row: usize, col: usize, value: T) {
        self.set(flat_index(row, col, self.n_rows, self.n_cols), value)
    }

    /// A 1D view onto row `i`
    pub fn view_row(&self, i: usize) -> ArrayResult<Array<T>> {
        row_range(i, self.n_rows, self.n_cols).and_then(|(s, e)| self.view_range(s, e))
    }

    /// A 2D view onto the whole array
    pub fn view2d(&self) -> Array2d<T> {
        Array2d {
            array: self.array.view(),
            n_rows: self.n_rows,
            n_cols: self.n_cols,
        }
    }

    /// Hand the storage over to a new [`SharedArray2d`] without copying
    ///
    /// See [`Array::release_to_shared`].
    pub fn release_to_shared(&mut self) -> ArrayResult<SharedArray2d<T>> {
        let shared = self.array.release_to_shared()?;
        Ok(SharedArray2d {
            shared,
            n_rows: self.n_rows,
            n_cols: self.n_cols,
        })
    }
}

impl<T: Element> Dense<T> for Array2d<T> {
    fn storage(&self) -> &Arc<Storage<T>> {
        self.array.storage()
    }

    fn offset(&self) -> usize {
        self.array.offset()
    }

    fn len(&self) -> usize {
        self.array.len()
    }

    fn view_epoch(&self) -> Option<u64> {
        self.array.view_epoch()
    }
}

impl<T: Element> PartialEq for Array2d<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.array == other.array
    }
}

impl<T: Element> fmt::Debug for Array2d<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array2d")
            .field("n_rows", &self.n_rows)
            .field("n_cols", &self.n_cols)
            .field("array", &self.array)
            .finish()
    }
}

/// Reference-counted row-major 2D array
///
/// The 2D counterpart of [`SharedArray`]: clones share storage and the last
/// one to go frees it.
#[derive(Clone, PartialEq)]
pub struct SharedArray2d<T: Element> {
    shared: SharedArray<T>,
    n_rows: usize,
    n_cols: usize,
}

impl<T: Element> SharedArray2d<T> {
    pub fn new(n_rows: usize, n_cols: usize) -> ArrayResult<Self> {
        Ok(SharedArray2d {
            shared: SharedArray::new(checked_len(n_rows, n_cols)?),
            n_rows,
            n_cols,
        })
    }

    /// Copy a 2D array, view or not, into new shared storage
    pub fn from_copy(array: &Array2d<T>) -> Self {
        SharedArray2d {
            shared: SharedArray::from_copy(array),
            n_rows: array.n_rows,
            n_cols: array.n_cols,
        }
    }

    /// Give a shape to a shared array of `n_rows * n_cols` elements
    pub fn from_shared(n_rows: usize, n_cols: usize, shared: SharedArray<T>) -> ArrayResult<Self> {
        check_shape(n_rows, n_cols, shared.len())?;
        Ok(SharedArray2d {
            shared,
            n_rows,
            n_cols,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn as_shared(&self) -> &SharedArray<T> {
        &self.shared
    }

    pub fn ref_count(&self) -> usize {
        self.shared.ref_count()
    }

    pub fn get2(&self, row: usize, col: usize) -> T {
        self.get(flat_index(row, col, self.n_rows, self.n_cols))
    }

    pub fn set2(&self, row: usize, col: usize, value: T) {
        self.set(flat_index(row, col, self.n_rows, self.n_cols), value)
    }

    pub fn view_row(&self, i: usize) -> ArrayResult<Array<T>> {
        row_range(i, self.n_rows, self.n_cols).and_then(|(s, e)| self.view_range(s, e))
    }

    pub fn view2d(&self) -> Array2d<T> {
        Array2d {
            array: self.view(),
            n_rows: self.n_rows,
            n_cols: self.n_cols,
        }
    }
}

impl<T: Element> Dense<T> for SharedArray2d<T> {
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

impl<T: Element> fmt::Debug for SharedArray2d<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArray2d")
            .field("n_rows", &self.n_rows)
            .field("n_cols", &self.n_cols)
            .field("shared", &self.shared)
            .finish()
    }
}

/// Number of elements of an `n_rows` by `n_cols` array
pub(crate) fn checked_len(n_rows: usize, n_cols: usize) -> ArrayResult<usize> {
    n_rows.checked_mul(n_cols).ok_or_else(|| {
        Error::ShapeOverflow { n_rows, n_cols }.into()
    })
}

fn check_shape(n_rows: usize, n_cols: usize, len: usize) -> ArrayResult<()> {
    let expected = checked_len(n_rows, n_cols)?;
    if expected != len {
        return Error::ShapeMismatch {
            expected,
            found: len,
        }
        .into();
    }
    Ok(())
}

fn row_range(i: usize, n_rows: usize, n_cols: usize) -> ArrayResult<(usize, usize)> {
    if i >= n_rows {
        return Error::IndexOutOfRange {
            index: i,
            len: n_rows,
        }
        .into();
    }
    Ok((i * n_cols, (i + 1) * n_cols))
}

#[cfg(feature = "costly-checks")]
fn flat_index(row: usize, col: usize, n_rows: usize, n_cols: usize) -> usize {
    if row >= n_rows {
        panic!("{}", Error::IndexOutOfRange { index: row, len: n_rows });
    }
    if col >= n_cols {
        panic!("{}", Error::IndexOutOfRange { index: col, len: n_cols });
    }
    row * n_cols + col
}

#[cfg(not(feature = "costly-checks"))]
fn flat_index(row: usize, col: usize, _n_rows: usize, n_cols: usize) -> usize {
    row * n_cols + col
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Signal;

    #[test]
    fn new_is_zeroed_and_shaped() {
        let a = Array2d::<f64>::new(3, 4).unwrap();
        assert_eq!(a.shape(), (3, 4));
        assert_eq!(a.len(), 12);
        assert_eq!(a.abs_sum(), 0.0);
    }

    #[test]
    fn overflowing_shapes_are_rejected() {
        let huge = usize::MAX / 2 + 1;
        assert!(matches!(
            Array2d::<u8>::new(huge, 2),
            Err(Signal::Error(Error::ShapeOverflow { .. }))
        ));
        assert!(SharedArray2d::<f64>::new(2, huge).is_err());
        assert!(Array2d::<u8>::from_vec(huge, 2, vec![]).is_err());
    }

    #[test]
    fn disjoint_rows_write_concurrently() {
        let a = Array2d::<u64>::new(4, 3).unwrap();
        // each writer holds its row until every other writer holds theirs
        let barrier = std::sync::Barrier::new(4);
        std::thread::scope(|s| {
            for i in 0..4 {
                let row = a.view_row(i).unwrap();
                let barrier = &barrier;
                s.spawn(move || {
                    row.with_slice_mut(|x| {
                        barrier.wait();
                        x.fill(i as u64 + 1);
                    })
                });
            }
        });
        assert_eq!(a.to_vec(), vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn from_vec_checks_shape() {
        assert_eq!(
            Array2d::from_vec(2, 2, vec![1, 2, 3]).unwrap_err(),
            Signal::Error(Error::ShapeMismatch {
                expected: 4,
                found: 3
            })
        );
        assert!(Array2d::<i32>::from_vec(0, 5, vec![]).is_ok());
    }

    #[test]
    fn rows_alias_storage() {
        let a = Array2d::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        for i in 0..a.n_rows() {
            let row = a.view_row(i).unwrap();
            assert!(row.is_view());
            assert_eq!(row.len(), 2);
            row.scale(10.0);
        }
        assert_eq!(a.to_vec(), vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        assert_eq!(a.get2(2, 1), 60.0);
    }

    #[test]
    fn row_out_of_range() {
        let a = Array2d::<u32>::new(2, 2).unwrap();
        assert_eq!(
            a.view_row(2).unwrap_err(),
            Signal::Error(Error::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn zero_column_rows_are_empty() {
        let a = Array2d::<f32>::new(3, 0).unwrap();
        assert!(a.view_row(2).unwrap().is_empty());
    }

    #[test]
    fn release_to_shared_keeps_shape() {
        let mut a = Array2d::from_vec(2, 2, vec![1, 2, 3, 4]).unwrap();
        let shared = a.release_to_shared().unwrap();
        assert_eq!(shared.shape(), (2, 2));
        assert!(!a.is_owner());

        shared.set2(0, 1, 20);
        assert_eq!(a.get2(0, 1), 20);

        let mut view = a.view2d();
        assert!(view.release_to_shared().is_err());
    }

    #[test]
    fn shared_from_copy_detaches() {
        let a = Array2d::from_vec(1, 3, vec![1, 2, 3]).unwrap();
        let b = SharedArray2d::from_copy(&a);
        b.set2(0, 0, 100);
        assert_eq!(a.get2(0, 0), 1);
        assert_eq!(b.view_row(0).unwrap().to_vec(), vec![100, 2, 3]);
    }

    #[test]
    fn clone_is_deep() {
        let a = Array2d::from_vec(1, 2, vec![1, 2]).unwrap();
        let b = a.view2d().clone();
        assert!(b.is_owner());
        b.set2(0, 0, 9);
        assert_eq!(a.get2(0, 0), 1);
        assert_eq!(b, Array2d::from_vec(1, 2, vec![9, 2]).unwrap());
    }

    #[cfg(feature = "costly-checks")]
    #[test]
    #[should_panic]
    fn column_out_of_range_panics() {
        let a = Array2d::<u32>::new(2, 2).unwrap();
        a.get2(0, 2);
    }
}
