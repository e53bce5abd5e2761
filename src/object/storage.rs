use std::mem::ManuallyDrop;
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock, RwLockWriteGuard};

use crate::error::Error;
use crate::lang::ArrayResult;

/// Backing memory of an array
///
/// Either memory allocated on this side of the boundary, or memory owned by
/// the host environment that is only aliased here. Both are held as raw
/// parts so that disjoint ranges can be handed out to different threads at
/// the same time.
pub(crate) enum Buffer<T> {
    Owned {
        ptr: NonNull<T>,
        len: usize,
        capacity: usize,
    },
    Foreign {
        ptr: NonNull<T>,
        len: usize,
    },
}

// Element ranges are only ever reached through `Storage::with_range{,_mut}`,
// whose claims keep a mutable range from overlapping any other live range.
// Foreign buffers are only constructed through `Array::from_foreign`, whose
// contract makes the host responsible for keeping the memory alive and
// unaliased for as long as any native handle exists.
unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Send + Sync> Sync for Buffer<T> {}

impl<T> Buffer<T> {
    pub(crate) fn from_vec(data: Vec<T>) -> Self {
        let mut data = ManuallyDrop::new(data);
        Buffer::Owned {
            ptr: NonNull::new(data.as_mut_ptr()).unwrap_or(NonNull::dangling()),
            len: data.len(),
            capacity: data.capacity(),
        }
    }

    fn ptr(&self) -> NonNull<T> {
        match self {
            Buffer::Owned { ptr, .. } | Buffer::Foreign { ptr, .. } => *ptr,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Buffer::Owned { len, .. } | Buffer::Foreign { len, .. } => *len,
        }
    }

    /// All elements, for callers holding the buffer exclusively
    pub(crate) fn as_slice(&mut self) -> &[T] {
        // SAFETY: `&mut self` rules out any other live range
        unsafe { std::slice::from_raw_parts(self.ptr().as_ptr(), self.len()) }
    }

    /// First element of `range`
    ///
    /// # Panics
    ///
    /// Panics if `range` does not lie within the buffer, like slice indexing.
    fn range_start(&self, range: &Range<usize>) -> *mut T {
        if range.start > range.end || range.end > self.len() {
            panic!(
                "range {}..{} out of bounds for a buffer of {} elements",
                range.start,
                range.end,
                self.len()
            );
        }
        // SAFETY: in bounds, checked above
        unsafe { self.ptr().as_ptr().add(range.start) }
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        if let Buffer::Owned { ptr, len, capacity } = *self {
            // SAFETY: the parts were taken from a Vec in `from_vec`
            unsafe { drop(Vec::from_raw_parts(ptr.as_ptr(), len, capacity)) }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Claim {
    range: Range<usize>,
    access: Access,
}

impl Claim {
    fn conflicts_with(&self, other: &Claim) -> bool {
        let overlaps = self.range.start < other.range.end && other.range.start < self.range.end;
        overlaps && (self.access == Access::Exclusive || other.access == Access::Exclusive)
    }
}

/// Element ranges currently borrowed from a buffer
///
/// Any number of shared claims may overlap; an exclusive claim overlaps
/// nothing. Disjoint claims never wait on each other.
#[derive(Default)]
struct Claims {
    active: Mutex<Vec<Claim>>,
    released: Condvar,
}

impl Claims {
    fn claim(&self, range: Range<usize>, access: Access) -> ClaimGuard<'_> {
        let claim = Claim { range, access };
        let mut active = self.active.lock();
        while active.iter().any(|c| c.conflicts_with(&claim)) {
            self.released.wait(&mut active);
        }
        active.push(claim.clone());
        ClaimGuard {
            claims: self,
            claim,
        }
    }
}

struct ClaimGuard<'a> {
    claims: &'a Claims,
    claim: Claim,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.claims.active.lock();
        if let Some(i) = active.iter().position(|c| *c == self.claim) {
            active.swap_remove(i);
        }
        drop(active);
        self.claims.released.notify_all();
    }
}

/// Array Storage
///
/// The single allocation every handle (owner, view or shared pointer) points
/// at. Two counts are at play:
///
/// * the `Arc` around a `Storage` keeps this header alive for as long as any
///   handle, view or host reference points at it,
/// * `owners` counts the handles that *own* the buffer. When it drops to zero
///   the buffer is freed, exactly once, whichever side released last.
///
/// Every free or reallocation bumps `epoch`, which views snapshot on creation
/// so that stale views can be detected.
///
/// Element access claims only the range it touches: handles onto disjoint
/// ranges of one buffer, such as the rows of a matrix, read and write
/// concurrently. Freeing and reallocating take the whole buffer and wait for
/// outstanding ranges.
pub struct Storage<T> {
    buffer: RwLock<Buffer<T>>,
    claims: Claims,
    owners: AtomicUsize,
    size: AtomicUsize,
    epoch: AtomicU64,
}

impl<T> Storage<T> {
    fn with_buffer(buffer: Buffer<T>, owners: usize) -> Arc<Self> {
        let size = buffer.len();
        Arc::new(Storage {
            buffer: RwLock::new(buffer),
            claims: Claims::default(),
            owners: AtomicUsize::new(owners),
            size: AtomicUsize::new(size),
            epoch: AtomicU64::new(0),
        })
    }

    /// Storage owned by a single handle
    pub(crate) fn owned(data: Vec<T>) -> Arc<Self> {
        Storage::with_buffer(Buffer::from_vec(data), 1)
    }

    /// Storage aliasing host memory, owned by nobody on this side
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` elements for as long
    /// as the returned storage is reachable.
    pub(crate) unsafe fn foreign(ptr: NonNull<T>, len: usize) -> Arc<Self> {
        Storage::with_buffer(Buffer::Foreign { ptr, len }, 0)
    }

    /// Number of handles currently owning the buffer
    pub fn owners(&self) -> usize {
        self.owners.load(Ordering::Acquire)
    }

    /// Logical number of elements
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Number of allocated elements, at least `size()`
    pub fn capacity(&self) -> usize {
        self.buffer.read_recursive().len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn is_foreign(&self) -> bool {
        matches!(*self.buffer.read_recursive(), Buffer::Foreign { .. })
    }

    /// Borrow elements `range` for the duration of `f`
    ///
    /// Waits while another thread writes an overlapping range.
    pub(crate) fn with_range<F, R>(&self, range: Range<usize>, f: F) -> R
    where
        F: FnOnce(&[T]) -> R,
    {
        let buffer = self.buffer.read_recursive();
        let start = buffer.range_start(&range);
        let _claim = self.claims.claim(range.clone(), Access::Shared);
        // SAFETY: the claim keeps writers off `range` and the read guard keeps
        // the buffer from being freed or reallocated until `f` returns
        f(unsafe { std::slice::from_raw_parts(start, range.len()) })
    }

    /// Mutably borrow elements `range` for the duration of `f`
    ///
    /// Waits while another thread reads or writes an overlapping range.
    pub(crate) fn with_range_mut<F, R>(&self, range: Range<usize>, f: F) -> R
    where
        F: FnOnce(&mut [T]) -> R,
    {
        let buffer = self.buffer.read_recursive();
        let start = buffer.range_start(&range);
        let _claim = self.claims.claim(range.clone(), Access::Exclusive);
        // SAFETY: the exclusive claim keeps every other borrow off `range`,
        // and the read guard keeps the buffer in place until `f` returns
        f(unsafe { std::slice::from_raw_parts_mut(start, range.len()) })
    }

    /// The whole buffer, for freeing or reallocating
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Buffer<T>> {
        self.buffer.write()
    }

    pub(crate) fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Release);
    }

    pub(crate) fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Register one more owning handle
    pub(crate) fn acquire(&self) {
        self.owners.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one owning handle, freeing the buffer if it was the last
    ///
    /// Returns whether this call freed the buffer. Releasing storage that has
    /// no owners left is an ownership violation rather than a second free.
    pub(crate) fn release(&self) -> ArrayResult<bool> {
        let previous = self
            .owners
            .fetch_update(Ordering::Release, Ordering::Relaxed, |n| n.checked_sub(1))
            .map_err(|_| Error::OwnershipViolation("release of storage with no remaining owners"))?;

        if previous != 1 {
            return Ok(false);
        }

        fence(Ordering::Acquire);
        let freed = {
            let mut buffer = self.buffer.write();
            let freed = buffer.len();
            *buffer = Buffer::from_vec(Vec::new());
            freed
        };
        self.set_size(0);
        self.bump_epoch();
        log::trace!("freed array storage of {freed} elements");
        Ok(true)
    }
}

impl<T> std::fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("owners", &self.owners())
            .field("size", &self.size())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Signal;
    use std::sync::Barrier;

    #[test]
    fn release_frees_exactly_once() {
        let storage = Storage::owned(vec![1.0, 2.0, 3.0]);
        storage.acquire();
        assert_eq!(storage.owners(), 2);

        assert_eq!(storage.release(), Ok(false));
        assert_eq!(storage.size(), 3);

        assert_eq!(storage.release(), Ok(true));
        assert_eq!(storage.size(), 0);
        assert_eq!(storage.capacity(), 0);
        assert_eq!(storage.epoch(), 1);

        assert!(matches!(
            storage.release(),
            Err(Signal::Error(Error::OwnershipViolation(_)))
        ));
        assert_eq!(storage.epoch(), 1);
    }

    #[test]
    fn concurrent_release_frees_once() {
        let storage = Storage::owned(vec![0_u32; 64]);
        for _ in 0..7 {
            storage.acquire();
        }

        let freed: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| storage.release().unwrap() as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(freed, 1);
        assert_eq!(storage.owners(), 0);
    }

    #[test]
    fn disjoint_writers_run_together() {
        let storage = Storage::owned(vec![0_u32; 16]);
        // every writer waits inside its borrow for all the others
        let barrier = Barrier::new(4);
        std::thread::scope(|s| {
            for i in 0..4 {
                let (storage, barrier) = (&storage, &barrier);
                s.spawn(move || {
                    storage.with_range_mut(4 * i..4 * (i + 1), |x| {
                        barrier.wait();
                        x.fill(i as u32);
                    })
                });
            }
        });
        let expected: Vec<u32> = (0..16).map(|k| k / 4).collect();
        assert_eq!(storage.with_range(0..16, |x| x.to_vec()), expected);
    }

    #[test]
    fn overlapping_writers_take_turns() {
        let storage = Storage::owned(vec![0_u64; 8]);
        let inside = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for range in [0..5, 3..8, 4..6] {
                let (storage, inside) = (&storage, &inside);
                s.spawn(move || {
                    for _ in 0..200 {
                        storage.with_range_mut(range.clone(), |x| {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            x.iter_mut().for_each(|xi| *xi += 1);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                    }
                });
            }
        });
        assert_eq!(
            storage.with_range(0..8, |x| x.to_vec()),
            vec![200, 200, 200, 400, 600, 400, 200, 200]
        );
    }

    #[test]
    fn shared_borrows_overlap() {
        let storage = Storage::owned(vec![1_i32, 2, 3]);
        let total = storage.with_range(0..3, |x| {
            storage.with_range(1..3, |y| x.iter().sum::<i32>() + y.iter().sum::<i32>())
        });
        assert_eq!(total, 11);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn ranges_past_the_end_panic() {
        let storage = Storage::owned(vec![0_u16; 2]);
        storage.with_range(1..3, |x| x.len());
    }
}
