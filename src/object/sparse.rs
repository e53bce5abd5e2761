use std::fmt;

use hashbrown::HashMap;

use super::{Array, Array2d, Dense, Element, SharedArray};
use crate::error::Error;
use crate::lang::ArrayResult;

/// Type of sparse column indices and row offsets
pub type Index = u32;

/// Read access to the index buffers of a sparse array
///
/// Sparse structure is validated once, when the array is built, and cannot be
/// written afterwards. Values stay writable through `values()`.
///
/// ```compile_fail
/// use tick_array::object::{Dense, SparseArray};
///
/// let x = SparseArray::new(4, vec![1, 3], vec![1.0, 2.0]).unwrap();
/// x.indices().set(0, 3);
/// ```
pub struct ReadOnly<'a, D>(&'a D);

impl<D: Dense<Index>> ReadOnly<'_, D> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range, like slice indexing.
    pub fn get(&self, index: usize) -> Index {
        self.0.get(index)
    }

    pub fn to_vec(&self) -> Vec<Index> {
        self.0.to_vec()
    }

    pub fn with_slice<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[Index]) -> R,
    {
        self.0.with_slice(f)
    }
}

impl<D: Dense<Index>> fmt::Debug for ReadOnly<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

/// Sparse 1D array
///
/// Non-zero `values` at strictly increasing `indices` within `[0, size)`.
/// Usually obtained as a row of a [`SparseArray2d`], in which case both
/// buffers are views onto the matrix's storage.
#[derive(Clone, PartialEq)]
pub struct SparseArray<T: Element> {
    size: usize,
    indices: Array<Index>,
    values: Array<T>,
}

impl<T: Element> SparseArray<T> {
    pub fn new(size: usize, indices: Vec<Index>, values: impl Into<Array<T>>) -> ArrayResult<Self> {
        let values = values.into();
        check_sparse(size, &indices, values.len())?;

        Ok(SparseArray {
            size,
            indices: Array::from(indices),
            values,
        })
    }

    /// Logical (dense) length
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn indices(&self) -> ReadOnly<'_, Array<Index>> {
        ReadOnly(&self.indices)
    }

    pub fn values(&self) -> &Array<T> {
        &self.values
    }

    /// Dot product against a dense array, in `O(nnz)`
    ///
    /// Each stored index must address an element of `dense`, otherwise the
    /// product is a range error.
    pub fn dot_dense<D: Dense<T> + ?Sized>(&self, dense: &D) -> ArrayResult<T> {
        self.indices.with_slice(|idx| {
            self.values
                .with_slice(|val| dense.with_slice(|x| sparse_dot(idx, val, x)))
        })
    }

    pub fn to_dense(&self) -> Array<T> {
        let dense = Array::new(self.size);
        dense.with_slice_mut(|x| {
            self.indices.with_slice(|idx| {
                self.values.with_slice(|val| {
                    for (&j, &v) in idx.iter().zip(val) {
                        x[j as usize] = v;
                    }
                })
            })
        });
        dense
    }

    /// Hand both buffers over to a [`SharedSparseArray`] without copying
    ///
    /// Both buffers must be owned by this array. Nothing is released if
    /// either of them is a view.
    pub fn release_to_shared(&mut self) -> ArrayResult<SharedSparseArray<T>> {
        if !(self.indices.is_owner() && self.values.is_owner()) {
            return Error::OwnershipViolation("only an owning sparse array can release its storage")
                .into();
        }

        Ok(SharedSparseArray {
            size: self.size,
            indices: self.indices.release_to_shared()?,
            values: self.values.release_to_shared()?,
        })
    }
}

impl<T: Element> fmt::Debug for SparseArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseArray")
            .field("size", &self.size)
            .field("indices", &self.indices.to_vec())
            .field("values", &self.values.to_vec())
            .finish()
    }
}

/// Reference-counted sparse 1D array
///
/// Clones share both buffers.
#[derive(Clone, PartialEq)]
pub struct SharedSparseArray<T: Element> {
    size: usize,
    indices: SharedArray<Index>,
    values: SharedArray<T>,
}

impl<T: Element> SharedSparseArray<T> {
    pub fn from_copy(array: &SparseArray<T>) -> Self {
        SharedSparseArray {
            size: array.size,
            indices: SharedArray::from_copy(&array.indices),
            values: SharedArray::from_copy(&array.values),
        }
    }

    pub(crate) fn from_parts(
        size: usize,
        indices: SharedArray<Index>,
        values: SharedArray<T>,
    ) -> ArrayResult<Self> {
        indices.with_slice(|idx| check_sparse(size, idx, values.len()))?;
        Ok(SharedSparseArray {
            size,
            indices,
            values,
        })
    }

    pub(crate) fn into_parts(self) -> (SharedArray<Index>, SharedArray<T>) {
        (self.indices, self.values)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn indices(&self) -> ReadOnly<'_, SharedArray<Index>> {
        ReadOnly(&self.indices)
    }

    pub fn values(&self) -> &SharedArray<T> {
        &self.values
    }

    pub fn ref_count(&self) -> usize {
        self.values.ref_count()
    }

    /// A borrowed sparse array aliasing the shared buffers
    pub fn view(&self) -> SparseArray<T> {
        SparseArray {
            size: self.size,
            indices: self.indices.view(),
            values: self.values.view(),
        }
    }

    pub fn dot_dense<D: Dense<T> + ?Sized>(&self, dense: &D) -> ArrayResult<T> {
        self.view().dot_dense(dense)
    }
}

impl<T: Element> fmt::Debug for SharedSparseArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSparseArray")
            .field("size", &self.size)
            .field("ref_count", &self.ref_count())
            .field("indices", &self.indices.to_vec())
            .field("values", &self.values.to_vec())
            .finish()
    }
}

/// Compressed sparse row matrix
///
/// Row `i` stores its entries at positions `row_indices[i]..row_indices[i + 1]`
/// of `indices` (column indices, strictly increasing within the row) and
/// `values`. Each of the three buffers follows the ownership rules of
/// [`Array`]. Cloning copies all three.
///
/// ```
/// use tick_array::object::{Array, Dense, SparseArray2d};
///
/// let m = SparseArray2d::new(
///     2,
///     3,
///     vec![0, 1, 3],
///     vec![2, 0, 1],
///     vec![5.0, 1.0, 2.0],
/// )
/// .unwrap();
///
/// let x = Array::from(vec![1.0, 10.0, 100.0]);
/// assert_eq!(m.dot_rows(&x).unwrap().to_vec(), vec![500.0, 21.0]);
/// ```
///
#[derive(Clone, PartialEq)]
pub struct SparseArray2d<T: Element> {
    n_rows: usize,
    n_cols: usize,
    row_indices: Array<Index>,
    indices: Array<Index>,
    values: Array<T>,
}

impl<T: Element> SparseArray2d<T> {
    /// Build a matrix from its three buffers
    ///
    /// The structure buffers are taken by value: once validated, no handle
    /// outside the matrix can write to them.
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        row_indices: Vec<Index>,
        indices: Vec<Index>,
        values: impl Into<Array<T>>,
    ) -> ArrayResult<Self> {
        let values = values.into();
        validate_csr(n_rows, n_cols, &row_indices, &indices, values.len())
            .map_err(Error::InvalidSparse)?;

        Ok(SparseArray2d {
            n_rows,
            n_cols,
            row_indices: Array::from(row_indices),
            indices: Array::from(indices),
            values,
        })
    }

    /// Build a matrix from `(row, col, value)` triplets in any order
    ///
    /// Values given more than once for the same coordinate are summed.
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        triplets: &[(usize, usize, T)],
    ) -> ArrayResult<Self> {
        let mut entries: HashMap<(usize, usize), T> = HashMap::with_capacity(triplets.len());
        for &(i, j, v) in triplets {
            if i >= n_rows || j >= n_cols {
                return Error::InvalidSparse(format!(
                    "entry ({i}, {j}) outside of a {n_rows}x{n_cols} matrix"
                ))
                .into();
            }
            let entry = entries.entry((i, j)).or_default();
            *entry = entry.add_wrapping(v);
        }

        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_unstable_by_key(|&(coord, _)| coord);

        let nnz = to_index(entries.len())?;
        let mut row_indices = vec![0; n_rows + 1];
        let mut indices = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for ((i, j), v) in entries {
            row_indices[i + 1] += 1;
            indices.push(to_index(j)?);
            values.push(v);
        }
        for i in 0..n_rows {
            row_indices[i + 1] += row_indices[i];
        }
        debug_assert_eq!(row_indices[n_rows], nnz);

        SparseArray2d::new(n_rows, n_cols, row_indices, indices, values)
    }

    pub(crate) fn from_parts_unchecked(
        n_rows: usize,
        n_cols: usize,
        row_indices: Array<Index>,
        indices: Array<Index>,
        values: Array<T>,
    ) -> Self {
        SparseArray2d {
            n_rows,
            n_cols,
            row_indices,
            indices,
            values,
        }
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

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_indices(&self) -> ReadOnly<'_, Array<Index>> {
        ReadOnly(&self.row_indices)
    }

    pub fn indices(&self) -> ReadOnly<'_, Array<Index>> {
        ReadOnly(&self.indices)
    }

    pub fn values(&self) -> &Array<T> {
        &self.values
    }

    /// Row `i` as a sparse array aliasing this matrix's buffers
    pub fn view_row(&self, i: usize) -> ArrayResult<SparseArray<T>> {
        if i >= self.n_rows {
            return Error::IndexOutOfRange {
                index: i,
                len: self.n_rows,
            }
            .into();
        }

        let (start, end) = self
            .row_indices
            .with_slice(|rows| (rows[i] as usize, rows[i + 1] as usize));

        Ok(SparseArray {
            size: self.n_cols,
            indices: self.indices.view_range(start, end)?,
            values: self.values.view_range(start, end)?,
        })
    }

    /// A matrix aliasing all three buffers
    pub fn view(&self) -> SparseArray2d<T> {
        SparseArray2d::from_parts_unchecked(
            self.n_rows,
            self.n_cols,
            self.row_indices.view(),
            self.indices.view(),
            self.values.view(),
        )
    }

    /// Matrix-vector product: the dot product of every row with `dense`
    pub fn dot_rows<D: Dense<T> + ?Sized>(&self, dense: &D) -> ArrayResult<Array<T>> {
        if dense.len() != self.n_cols {
            return Error::ShapeMismatch {
                expected: self.n_cols,
                found: dense.len(),
            }
            .into();
        }

        let out = Array::new(self.n_rows);
        for i in 0..self.n_rows {
            out.set(i, self.view_row(i)?.dot_dense(dense)?);
        }
        Ok(out)
    }

    pub fn to_dense(&self) -> ArrayResult<Array2d<T>> {
        let dense = Array2d::new(self.n_rows, self.n_cols)?;
        self.row_indices.with_slice(|rows| {
            self.indices.with_slice(|cols| {
                self.values.with_slice(|vals| {
                    dense.with_slice_mut(|x| {
                        for i in 0..self.n_rows {
                            for k in rows[i] as usize..rows[i + 1] as usize {
                                x[i * self.n_cols + cols[k] as usize] = vals[k];
                            }
                        }
                    })
                })
            })
        });
        Ok(dense)
    }

    /// Hand all three buffers over to a [`SharedSparseArray2d`] without
    /// copying
    ///
    /// Every buffer must be owned by this matrix. Nothing is released if any
    /// of them is a view.
    pub fn release_to_shared(&mut self) -> ArrayResult<SharedSparseArray2d<T>> {
        if !(self.row_indices.is_owner() && self.indices.is_owner() && self.values.is_owner()) {
            return Error::OwnershipViolation("only an owning sparse array can release its storage")
                .into();
        }

        Ok(SharedSparseArray2d {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            row_indices: self.row_indices.release_to_shared()?,
            indices: self.indices.release_to_shared()?,
            values: self.values.release_to_shared()?,
        })
    }
}

impl<T: Element> fmt::Debug for SparseArray2d<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseArray2d")
            .field("n_rows", &self.n_rows)
            .field("n_cols", &self.n_cols)
            .field("row_indices", &self.row_indices.to_vec())
            .field("indices", &self.indices.to_vec())
            .field("values", &self.values.to_vec())
            .finish()
    }
}

/// Reference-counted compressed sparse row matrix
///
/// Clones share all three buffers.
#[derive(Clone, PartialEq)]
pub struct SharedSparseArray2d<T: Element> {
    n_rows: usize,
    n_cols: usize,
    row_indices: SharedArray<Index>,
    indices: SharedArray<Index>,
    values: SharedArray<T>,
}

impl<T: Element> SharedSparseArray2d<T> {
    pub fn from_copy(matrix: &SparseArray2d<T>) -> Self {
        SharedSparseArray2d {
            n_rows: matrix.n_rows,
            n_cols: matrix.n_cols,
            row_indices: SharedArray::from_copy(&matrix.row_indices),
            indices: SharedArray::from_copy(&matrix.indices),
            values: SharedArray::from_copy(&matrix.values),
        }
    }

    pub(crate) fn from_parts(
        n_rows: usize,
        n_cols: usize,
        row_indices: SharedArray<Index>,
        indices: SharedArray<Index>,
        values: SharedArray<T>,
    ) -> ArrayResult<Self> {
        row_indices
            .with_slice(|rows| {
                indices.with_slice(|cols| validate_csr(n_rows, n_cols, rows, cols, values.len()))
            })
            .map_err(Error::InvalidSparse)?;

        Ok(SharedSparseArray2d {
            n_rows,
            n_cols,
            row_indices,
            indices,
            values,
        })
    }

    /// Row offsets, column indices and values
    pub(crate) fn into_parts(self) -> (SharedArray<Index>, SharedArray<Index>, SharedArray<T>) {
        (self.row_indices, self.indices, self.values)
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

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_indices(&self) -> ReadOnly<'_, SharedArray<Index>> {
        ReadOnly(&self.row_indices)
    }

    pub fn indices(&self) -> ReadOnly<'_, SharedArray<Index>> {
        ReadOnly(&self.indices)
    }

    pub fn values(&self) -> &SharedArray<T> {
        &self.values
    }

    pub fn ref_count(&self) -> usize {
        self.values.ref_count()
    }

    /// A borrowed matrix aliasing the shared buffers
    pub fn view(&self) -> SparseArray2d<T> {
        SparseArray2d::from_parts_unchecked(
            self.n_rows,
            self.n_cols,
            self.row_indices.view(),
            self.indices.view(),
            self.values.view(),
        )
    }

    pub fn view_row(&self, i: usize) -> ArrayResult<SparseArray<T>> {
        self.view().view_row(i)
    }
}

impl<T: Element> fmt::Debug for SharedSparseArray2d<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSparseArray2d")
            .field("n_rows", &self.n_rows)
            .field("n_cols", &self.n_cols)
            .field("ref_count", &self.ref_count())
            .field("row_indices", &self.row_indices.to_vec())
            .field("indices", &self.indices.to_vec())
            .field("values", &self.values.to_vec())
            .finish()
    }
}

fn sparse_dot<T: Element>(indices: &[Index], values: &[T], x: &[T]) -> ArrayResult<T> {
    let mut acc = T::default();
    for (&j, &v) in indices.iter().zip(values) {
        let j = j as usize;
        let xj = x.get(j).ok_or(Error::IndexOutOfRange {
            index: j,
            len: x.len(),
        })?;
        acc = acc.add_wrapping(xj.mul_wrapping(v));
    }
    Ok(acc)
}

pub(crate) fn to_index(n: usize) -> ArrayResult<Index> {
    Index::try_from(n).map_err(|_| Error::InvalidSparse(format!("{n} does not fit a sparse index")).into())
}

/// Check a sparse 1D structure of `size` holding `nnz` values
fn check_sparse(size: usize, indices: &[Index], nnz: usize) -> ArrayResult<()> {
    if indices.len() != nnz {
        return Error::ShapeMismatch {
            expected: indices.len(),
            found: nnz,
        }
        .into();
    }
    check_row(indices, size).map_err(|e| Error::InvalidSparse(e).into())
}

/// Check that `indices` is strictly increasing and within `[0, size)`
fn check_row(indices: &[Index], size: usize) -> Result<(), String> {
    for (k, &j) in indices.iter().enumerate() {
        if j as usize >= size {
            return Err(format!("index {j} out of range for size {size}"));
        }
        if k > 0 && indices[k - 1] >= j {
            return Err(format!(
                "indices not strictly increasing at position {k} ({} then {j})",
                indices[k - 1]
            ));
        }
    }
    Ok(())
}

/// Check the structure of a compressed sparse row matrix with `nnz` values
pub(crate) fn validate_csr(
    n_rows: usize,
    n_cols: usize,
    row_indices: &[Index],
    indices: &[Index],
    nnz: usize,
) -> Result<(), String> {
    if row_indices.len() != n_rows + 1 {
        return Err(format!(
            "expected {} row offsets, found {}",
            n_rows + 1,
            row_indices.len()
        ));
    }
    if indices.len() != nnz {
        return Err(format!(
            "{} column indices for {nnz} values",
            indices.len()
        ));
    }
    if row_indices[0] != 0 {
        return Err(format!("first row offset is {}, not 0", row_indices[0]));
    }
    if row_indices[n_rows] as usize != nnz {
        return Err(format!(
            "last row offset is {}, not the number of values {nnz}",
            row_indices[n_rows]
        ));
    }

    if let Some(i) = row_indices.windows(2).position(|w| w[0] > w[1]) {
        return Err(format!("row offsets decrease at row {i}"));
    }

    for (i, w) in row_indices.windows(2).enumerate() {
        check_row(&indices[w[0] as usize..w[1] as usize], n_cols)
            .map_err(|e| format!("row {i}: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Signal;

    fn example() -> SparseArray2d<f64> {
        SparseArray2d::new(
            4,
            6,
            vec![0, 2, 4, 7, 8],
            vec![0, 1, 1, 3, 2, 3, 4, 5],
            vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0],
        )
        .unwrap()
    }

    #[test]
    fn row_dot_products() {
        let m = example();
        let x = Array::from(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let expected = [50.0, 220.0, 740.0, 480.0];
        for (i, e) in expected.iter().enumerate() {
            let row = m.view_row(i).unwrap();
            assert_eq!(row.dot_dense(&x), Ok(*e));
            assert_eq!(x.dot_sparse(&row), Ok(*e));
        }
        assert_eq!(m.dot_rows(&x).unwrap().to_vec(), expected.to_vec());
    }

    #[test]
    fn rows_alias_matrix() {
        let m = example();
        let row = m.view_row(2).unwrap();
        assert_eq!(row.nnz(), 3);
        assert!(row.values().is_view());
        assert_eq!(row.indices().to_vec(), vec![2, 3, 4]);

        row.values().scale(0.0);
        assert_eq!(m.values().sum(), 10.0 + 20.0 + 30.0 + 40.0 + 80.0);
    }

    #[test]
    fn index_beyond_dense_is_range_error() {
        let row = SparseArray::new(10, vec![1, 8], vec![1.0, 1.0]).unwrap();
        let x = Array::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            row.dot_dense(&x),
            Err(Signal::Error(Error::IndexOutOfRange { index: 8, len: 3 }))
        );
    }

    #[test]
    fn invalid_structures_are_rejected() {
        let cases: Vec<(Vec<Index>, Vec<Index>, Vec<f64>)> = vec![
            (vec![0, 2], vec![0], vec![1.0]),
            (vec![1, 1], vec![0], vec![1.0]),
            (vec![0, 2, 1], vec![0, 1], vec![1.0, 2.0]),
            (vec![0, 2], vec![1, 1], vec![1.0, 2.0]),
            (vec![0, 2], vec![1, 0], vec![1.0, 2.0]),
            (vec![0, 1], vec![3], vec![1.0]),
            (vec![0, 1], vec![0], vec![1.0, 2.0]),
        ];
        for (rows, cols, vals) in cases {
            let n_rows = rows.len() - 1;
            let result = SparseArray2d::new(n_rows, 3, rows, cols, vals);
            assert!(matches!(
                result,
                Err(Signal::Error(Error::InvalidSparse(_)))
            ));
        }
    }

    #[test]
    fn empty_shapes() {
        let m = SparseArray2d::<f32>::new(0, 5, vec![0], vec![], vec![]).unwrap();
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.to_dense().unwrap().shape(), (0, 5));

        let m = SparseArray2d::<f32>::new(3, 0, vec![0, 0, 0, 0], vec![], vec![]).unwrap();
        assert!(m.view_row(1).unwrap().values().is_empty());
    }

    #[test]
    fn triplets_sum_duplicates() {
        let m = SparseArray2d::from_triplets(
            3,
            3,
            &[(2, 0, 1), (0, 2, 5), (0, 0, 1), (2, 0, 2), (1, 1, 7)],
        )
        .unwrap();
        assert_eq!(m.row_indices().to_vec(), vec![0, 2, 3, 4]);
        assert_eq!(m.indices().to_vec(), vec![0, 2, 1, 0]);
        assert_eq!(m.values().to_vec(), vec![1, 5, 7, 3]);

        assert!(SparseArray2d::from_triplets(2, 2, &[(0, 2, 1)]).is_err());

        let m = SparseArray2d::from_triplets(1, 1, &[(0, 0, u16::MAX), (0, 0, 2)]).unwrap();
        assert_eq!(m.values().to_vec(), vec![1]);
    }

    #[test]
    fn structure_reads_through_read_only() {
        let m = example();
        let rows = m.row_indices();
        assert_eq!(rows.len(), 5);
        assert!(!rows.is_empty());
        assert_eq!(rows.get(3), 7);
        assert_eq!(m.indices().with_slice(|x| x.iter().sum::<Index>()), 19);
        assert_eq!(format!("{:?}", m.view_row(0).unwrap().indices()), "[0, 1]");

        // values stay writable, the structure is untouched
        m.view().values().fill(1.0);
        assert_eq!(m.indices().to_vec(), vec![0, 1, 1, 3, 2, 3, 4, 5]);
        assert_eq!(m.dot_rows(&Array::from(vec![1.0; 6])).unwrap().to_vec(), vec![2.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn to_dense_rejects_overflowing_shapes() {
        let m = SparseArray2d::<f64>::new(2, usize::MAX, vec![0, 0, 0], vec![], vec![]).unwrap();
        assert!(matches!(
            m.to_dense(),
            Err(Signal::Error(Error::ShapeOverflow { .. }))
        ));
    }

    #[test]
    fn sparse1d_release_and_share() {
        let mut x = SparseArray::new(6, vec![1, 4], vec![2, 3]).unwrap();
        let shared = x.release_to_shared().unwrap();
        assert_eq!(shared.ref_count(), 1);
        assert_eq!((shared.size(), shared.nnz()), (6, 2));
        assert_eq!(shared.indices().to_vec(), vec![1, 4]);

        shared.values().set(1, 30);
        assert_eq!(x.values().get(1), 30);
        assert_eq!(shared.dot_dense(&Array::from(vec![1; 6])), Ok(32));
        assert_eq!(shared.view().to_dense().to_vec(), vec![0, 2, 0, 0, 30, 0]);

        let other = shared.clone();
        assert_eq!(other.ref_count(), 2);

        let mut row = example().view_row(1).unwrap();
        assert!(matches!(
            row.release_to_shared(),
            Err(Signal::Error(Error::OwnershipViolation(_)))
        ));
        let copy = SharedSparseArray::from_copy(&row);
        copy.values().fill(0.0);
        assert_eq!(row.values().to_vec(), vec![30.0, 40.0]);
    }

    #[test]
    fn sparse1d_structure_is_validated() {
        assert!(matches!(
            SparseArray::new(3, vec![0, 3], vec![1.0, 1.0]),
            Err(Signal::Error(Error::InvalidSparse(_)))
        ));
        assert!(matches!(
            SparseArray::new(3, vec![1, 1], vec![1.0, 1.0]),
            Err(Signal::Error(Error::InvalidSparse(_)))
        ));
        assert!(matches!(
            SparseArray::new(3, vec![1], vec![1.0, 1.0]),
            Err(Signal::Error(Error::ShapeMismatch { .. }))
        ));
        assert!(SparseArray::<f64>::new(0, vec![], vec![]).is_ok());
    }

    #[test]
    fn to_dense_matches_rows() {
        let m = example();
        let d = m.to_dense().unwrap();
        assert_eq!(d.view_row(0).unwrap().to_vec(), vec![10.0, 20.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(d.get2(3, 5), 80.0);
        assert_eq!(m.view_row(1).unwrap().to_dense().to_vec(), d.view_row(1).unwrap().to_vec());
    }

    #[test]
    fn release_to_shared_needs_owned_buffers() {
        let mut m = example();
        let mut view = m.view();
        assert!(matches!(
            view.release_to_shared(),
            Err(Signal::Error(Error::OwnershipViolation(_)))
        ));

        let shared = m.release_to_shared().unwrap();
        assert_eq!(shared.ref_count(), 1);
        shared.values().set(0, -1.0);
        assert_eq!(m.values().get(0), -1.0);
        assert_eq!(shared.view_row(0).unwrap().values().to_vec(), vec![-1.0, 20.0]);
    }

    #[test]
    fn shared_from_copy_detaches() {
        let m = example();
        let shared = SharedSparseArray2d::from_copy(&m.view());
        shared.values().fill(0.0);
        assert_eq!(m.values().get(7), 80.0);
        assert_eq!(shared.shape(), (4, 6));
        assert_eq!(shared.nnz(), 8);
    }
}
