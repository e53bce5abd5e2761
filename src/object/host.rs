//! Host boundary
//!
//! Hooks for a binding layer that hands arrays to, and receives arrays from,
//! a host environment with its own garbage collector.
//!
//! * Host memory is aliased, never copied, with [`Array::from_foreign`]. The
//!   host keeps ownership: native handles must not outlive it.
//! * Shared storage crosses to the host as a [`HostRef`]. A host reference
//!   counts as one owner, exactly like a [`SharedArray`], and decrements the
//!   same counter, so storage is freed once whichever side lets go last.
//! * Every shared type has its host reference: [`HostRef2d`] for
//!   [`SharedArray2d`], [`SparseHostRef`] and [`SparseHostRef2d`] for the
//!   sparse arrays, and a plain [`HostRef`] for [`VArray`]. Multi-buffer
//!   references hold one [`HostRef`] per buffer.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use super::{
    checked_len, Array, Array2d, Dense, Element, Index, Role, SharedArray, SharedArray2d,
    SharedSparseArray, SharedSparseArray2d, Storage, VArray,
};
use crate::lang::ArrayResult;

/// One host-held reference to shared storage
///
/// Not `Clone`: every `HostRef` stands for one unit of the owner count.
/// Use [`HostRef::retain`] to hand out another one. A `HostRef` must be
/// given back with [`HostRef::release`] or [`HostRef::to_shared`]; dropping
/// it leaks the reference.
#[must_use = "dropping a HostRef leaks its reference"]
pub struct HostRef<T: Element> {
    ptr: NonNull<Storage<T>>,
}

unsafe impl<T: Element> Send for HostRef<T> {}
unsafe impl<T: Element> Sync for HostRef<T> {}

impl<T: Element> SharedArray<T> {
    /// Turn this handle into a host reference, keeping the owner count
    pub fn into_host(self) -> HostRef<T> {
        let storage = Arc::clone(self.storage());
        storage.acquire();
        drop(self);

        // SAFETY: Arc::into_raw never returns null
        let ptr = unsafe { NonNull::new_unchecked(Arc::into_raw(storage) as *mut Storage<T>) };
        HostRef { ptr }
    }
}

impl<T: Element> HostRef<T> {
    fn storage(&self) -> &Storage<T> {
        // SAFETY: a live HostRef holds one strong count on the allocation
        unsafe { self.ptr.as_ref() }
    }

    /// Increment the owner count, returning the new reference
    pub fn retain(&self) -> HostRef<T> {
        // SAFETY: as above; the new strong count belongs to the returned ref
        unsafe { Arc::increment_strong_count(self.ptr.as_ptr() as *const Storage<T>) };
        self.storage().acquire();
        HostRef { ptr: self.ptr }
    }

    /// Decrement the owner count, freeing the storage if this was the last
    /// owner on either side
    ///
    /// Returns whether the storage was freed.
    pub fn release(self) -> ArrayResult<bool> {
        // SAFETY: takes back the strong count owned by self
        let storage = unsafe { Arc::from_raw(self.ptr.as_ptr() as *const Storage<T>) };
        storage.release()
    }

    /// Hand this reference back to native code
    pub fn to_shared(self) -> SharedArray<T> {
        // SAFETY: the strong and owner counts move over to the SharedArray
        let storage = unsafe { Arc::from_raw(self.ptr.as_ptr() as *const Storage<T>) };
        SharedArray::from_storage(storage)
    }

    /// Hand this reference back to native code as a resizable array
    pub fn to_varray(self) -> VArray<T> {
        VArray::from(self.to_shared())
    }

    pub fn ref_count(&self) -> usize {
        self.storage().owners()
    }

    pub fn len(&self) -> usize {
        self.storage().size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opaque pointer for a binding layer to store
    pub fn into_raw(self) -> *const c_void {
        self.ptr.as_ptr() as *const c_void
    }

    /// Rebuild a reference from [`HostRef::into_raw`]
    ///
    /// # Safety
    ///
    /// `ptr` must come from `HostRef::<T>::into_raw`, with the same `T`, and
    /// each pointer obtained that way may be turned back into a `HostRef`
    /// once.
    pub unsafe fn from_raw(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr as *mut Storage<T>).map(|ptr| HostRef { ptr })
    }
}

impl<T: Element> VArray<T> {
    /// Turn this handle into a host reference, keeping the owner count
    ///
    /// The host sees the size at the time of each call; resizing through
    /// other native handles stays visible.
    pub fn into_host(self) -> HostRef<T> {
        self.into_shared().into_host()
    }
}

/// One host-held reference to a [`SharedArray2d`]
#[must_use = "dropping a HostRef2d leaks its reference"]
pub struct HostRef2d<T: Element> {
    inner: HostRef<T>,
    n_rows: usize,
    n_cols: usize,
}

impl<T: Element> SharedArray2d<T> {
    /// Turn this handle into a host reference, keeping the owner count
    pub fn into_host(self) -> HostRef2d<T> {
        let (n_rows, n_cols) = self.shape();
        HostRef2d {
            inner: self.as_shared().clone().into_host(),
            n_rows,
            n_cols,
        }
    }
}

impl<T: Element> HostRef2d<T> {
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn ref_count(&self) -> usize {
        self.inner.ref_count()
    }

    pub fn retain(&self) -> HostRef2d<T> {
        HostRef2d {
            inner: self.inner.retain(),
            n_rows: self.n_rows,
            n_cols: self.n_cols,
        }
    }

    /// See [`HostRef::release`]
    pub fn release(self) -> ArrayResult<bool> {
        self.inner.release()
    }

    /// Hand this reference back to native code
    ///
    /// Fails if the storage no longer holds `n_rows * n_cols` elements, in
    /// which case the reference is released.
    pub fn to_shared(self) -> ArrayResult<SharedArray2d<T>> {
        SharedArray2d::from_shared(self.n_rows, self.n_cols, self.inner.to_shared())
    }
}

/// One host-held reference to a [`SharedSparseArray`]
#[must_use = "dropping a SparseHostRef leaks its references"]
pub struct SparseHostRef<T: Element> {
    size: usize,
    indices: HostRef<Index>,
    values: HostRef<T>,
}

impl<T: Element> SharedSparseArray<T> {
    /// Turn this handle into a host reference, keeping the owner counts of
    /// both buffers
    pub fn into_host(self) -> SparseHostRef<T> {
        let size = self.size();
        let (indices, values) = self.into_parts();
        SparseHostRef {
            size,
            indices: indices.into_host(),
            values: values.into_host(),
        }
    }
}

impl<T: Element> SparseHostRef<T> {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn ref_count(&self) -> usize {
        self.values.ref_count()
    }

    pub fn retain(&self) -> SparseHostRef<T> {
        SparseHostRef {
            size: self.size,
            indices: self.indices.retain(),
            values: self.values.retain(),
        }
    }

    /// Release both buffers, returning whether the values were freed
    pub fn release(self) -> ArrayResult<bool> {
        let indices = self.indices.release();
        let values = self.values.release();
        indices?;
        values
    }

    /// Hand this reference back to native code, checking the structure
    pub fn to_shared(self) -> ArrayResult<SharedSparseArray<T>> {
        SharedSparseArray::from_parts(self.size, self.indices.to_shared(), self.values.to_shared())
    }
}

/// One host-held reference to a [`SharedSparseArray2d`]
#[must_use = "dropping a SparseHostRef2d leaks its references"]
pub struct SparseHostRef2d<T: Element> {
    n_rows: usize,
    n_cols: usize,
    row_indices: HostRef<Index>,
    indices: HostRef<Index>,
    values: HostRef<T>,
}

impl<T: Element> SharedSparseArray2d<T> {
    /// Turn this handle into a host reference, keeping the owner counts of
    /// all three buffers
    pub fn into_host(self) -> SparseHostRef2d<T> {
        let (n_rows, n_cols) = self.shape();
        let (row_indices, indices, values) = self.into_parts();
        SparseHostRef2d {
            n_rows,
            n_cols,
            row_indices: row_indices.into_host(),
            indices: indices.into_host(),
            values: values.into_host(),
        }
    }
}

impl<T: Element> SparseHostRef2d<T> {
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn ref_count(&self) -> usize {
        self.values.ref_count()
    }

    pub fn retain(&self) -> SparseHostRef2d<T> {
        SparseHostRef2d {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            row_indices: self.row_indices.retain(),
            indices: self.indices.retain(),
            values: self.values.retain(),
        }
    }

    /// Release all three buffers, returning whether the values were freed
    pub fn release(self) -> ArrayResult<bool> {
        let row_indices = self.row_indices.release();
        let indices = self.indices.release();
        let values = self.values.release();
        row_indices?;
        indices?;
        values
    }

    /// Hand this reference back to native code, checking the structure
    pub fn to_shared(self) -> ArrayResult<SharedSparseArray2d<T>> {
        SharedSparseArray2d::from_parts(
            self.n_rows,
            self.n_cols,
            self.row_indices.to_shared(),
            self.indices.to_shared(),
            self.values.to_shared(),
        )
    }
}

impl<T: Element> Array<T> {
    /// Alias `len` elements of host memory, without copying
    ///
    /// The result is a view: it never frees the memory and cannot be released
    /// to shared ownership. Copy it with [`SharedArray::from_copy`] to keep
    /// the data beyond the host's lifetime.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` elements, not be
    /// accessed through other means while native handles use it, and outlive
    /// the returned array and every view taken from it.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null and `len` is not zero.
    pub unsafe fn from_foreign(ptr: *mut T, len: usize) -> Self {
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None if len == 0 => NonNull::dangling(),
            None => panic!("null host pointer for {len} elements"),
        };
        let storage = Storage::foreign(ptr, len);
        let epoch = storage.epoch();
        Array::from_parts(storage, 0, len, Role::View { epoch })
    }
}

impl<T: Element> Array2d<T> {
    /// Alias a row-major `n_rows` by `n_cols` block of host memory
    ///
    /// # Safety
    ///
    /// See [`Array::from_foreign`], for `n_rows * n_cols` elements.
    pub unsafe fn from_foreign(ptr: *mut T, n_rows: usize, n_cols: usize) -> ArrayResult<Self> {
        let len = checked_len(n_rows, n_cols)?;
        Array2d::from_array(n_rows, n_cols, Array::from_foreign(ptr, len))
    }
}

macro_rules! host_hooks {
    ( $( $ty:ty => $retain:ident, $release:ident );* $(;)? ) => {
        $(
            /// Retain a host reference, returning the new one or null
            ///
            /// # Safety
            ///
            /// `ptr` must be a live host reference of this element type.
            #[no_mangle]
            pub unsafe extern "C" fn $retain(ptr: *const c_void) -> *const c_void {
                match HostRef::<$ty>::from_raw(ptr) {
                    Some(host) => {
                        let other = host.retain();
                        let _ = host.into_raw();
                        other.into_raw()
                    }
                    None => std::ptr::null(),
                }
            }

            /// Release a host reference: 1 if this freed the storage, 0 if
            /// not, -1 on error
            ///
            /// # Safety
            ///
            /// `ptr` must be a live host reference of this element type and is
            /// no longer valid afterwards.
            #[no_mangle]
            pub unsafe extern "C" fn $release(ptr: *const c_void) -> i32 {
                let Some(host) = HostRef::<$ty>::from_raw(ptr) else {
                    return -1;
                };
                match host.release() {
                    Ok(freed) => freed as i32,
                    Err(e) => {
                        log::error!("{e}");
                        -1
                    }
                }
            }
        )*
    };
}

host_hooks! {
    f64 => tick_array_retain_f64, tick_array_release_f64;
    f32 => tick_array_retain_f32, tick_array_release_f32;
    i64 => tick_array_retain_i64, tick_array_release_i64;
    u64 => tick_array_retain_u64, tick_array_release_u64;
    i32 => tick_array_retain_i32, tick_array_release_i32;
    u32 => tick_array_retain_u32, tick_array_release_u32;
    i16 => tick_array_retain_i16, tick_array_release_i16;
    u16 => tick_array_retain_u16, tick_array_release_u16;
}
