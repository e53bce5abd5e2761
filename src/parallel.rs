//! Parallel execution helpers
//!
//! Fan work over an index range out to a fixed number of OS threads, created
//! for the duration of one call. `[0, n_indices)` is cut into contiguous,
//! near-equal chunks, one per worker, and each worker calls the user function
//! on its indices in order.
//!
//! Workers poll an [`InterruptFlag`] before every index. A worker that sees
//! the flag, returns an error or panics stops early and records why in its
//! own slot; nothing unwinds across threads. Once every worker has joined,
//! the dispatcher reports a single outcome: cancellation if the flag is
//! raised or any worker stopped on it, else the error of the first failing
//! chunk.
//!
//! Helpers must not be nested: a worker must not call another helper.

use std::any::Any;
use std::ops::Range;

use crate::error::Error;
use crate::interrupt::InterruptFlag;
use crate::lang::{ArrayResult, Signal};
use crate::object::{Dense, Element, SharedArray};

/// Split `[0, n_indices)` into at most `n_threads` contiguous chunks
///
/// Chunk sizes differ by at most one, larger chunks first. No chunk is
/// empty, so there are fewer chunks than threads when there are fewer
/// indices than threads.
pub fn partition(n_threads: usize, n_indices: usize) -> Vec<Range<usize>> {
    let n_chunks = n_threads.max(1).min(n_indices);
    if n_chunks == 0 {
        return vec![];
    }

    let base = n_indices / n_chunks;
    let rem = n_indices % n_chunks;

    let mut start = 0;
    (0..n_chunks)
        .map(|i| {
            let len = base + usize::from(i < rem);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// How a single worker's chunk ended
enum Outcome {
    Done,
    Interrupted,
    Failed(Signal),
}

/// A thread count and the flag its workers poll
#[derive(Debug, Clone, Copy)]
pub struct Pool<'a> {
    n_threads: usize,
    interrupt: &'a InterruptFlag,
}

impl Pool<'static> {
    /// Workers polling the process-wide interrupt flag
    ///
    /// `n_threads == 0` uses the available parallelism of the machine.
    pub fn new(n_threads: usize) -> Self {
        let n_threads = match n_threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };

        Pool {
            n_threads,
            interrupt: InterruptFlag::global(),
        }
    }
}

impl<'a> Pool<'a> {
    /// Poll `interrupt` instead of the process-wide flag
    pub fn with_interrupt<'b>(self, interrupt: &'b InterruptFlag) -> Pool<'b> {
        Pool {
            n_threads: self.n_threads,
            interrupt,
        }
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Call `f` on every index, discarding results
    pub fn run<F>(&self, n_indices: usize, f: F) -> ArrayResult<()>
    where
        F: Fn(usize) -> ArrayResult<()> + Sync,
    {
        let chunks = partition(self.n_threads, n_indices)
            .into_iter()
            .map(|range| (range, ()))
            .collect();

        self.dispatch(chunks, |range, ()| self.drive(range, &f))
    }

    /// Call `f` on every index, collecting results in index order
    pub fn map<R, F>(&self, n_indices: usize, f: F) -> ArrayResult<Vec<R>>
    where
        R: Send,
        F: Fn(usize) -> ArrayResult<R> + Sync,
    {
        let mut slots: Vec<Option<R>> = (0..n_indices).map(|_| None).collect();
        let chunks = split_chunks(partition(self.n_threads, n_indices), &mut slots);

        self.dispatch(chunks, |range, out| {
            let start = range.start;
            self.drive(range, |i| {
                out[i - start] = Some(f(i)?);
                Ok(())
            })
        })?;

        slots
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or_else(|| internal_err!("parallel map left a result slot empty"))
    }

    /// Call `f` on every index, collecting results in index order into a
    /// [`SharedArray`]
    ///
    /// Workers write straight into disjoint ranges of the result, which stays
    /// claimed for writing until all of them have joined: `f` must not read
    /// it.
    pub fn map_array<T, F>(&self, n_indices: usize, f: F) -> ArrayResult<SharedArray<T>>
    where
        T: Element,
        F: Fn(usize) -> ArrayResult<T> + Sync,
    {
        let out = SharedArray::new(n_indices);
        out.with_slice_mut(|buffer| {
            let chunks = split_chunks(partition(self.n_threads, n_indices), buffer);
            self.dispatch(chunks, |range, chunk| {
                let start = range.start;
                self.drive(range, |i| {
                    chunk[i - start] = f(i)?;
                    Ok(())
                })
            })
        })?;
        Ok(out)
    }

    /// Map every index and fold the results with `reduce`
    ///
    /// `reduce` must be associative and `init` its identity: each worker
    /// folds its chunk starting from `init`, and the per-chunk results are
    /// then folded in chunk order.
    pub fn map_reduce<R, F, G>(&self, n_indices: usize, init: R, map: F, reduce: G) -> ArrayResult<R>
    where
        R: Clone + Send,
        F: Fn(usize) -> ArrayResult<R> + Sync,
        G: Fn(R, R) -> R + Sync,
    {
        let ranges = partition(self.n_threads, n_indices);
        let mut partials = vec![Some(init.clone()); ranges.len()];
        let chunks = ranges.into_iter().zip(partials.iter_mut()).collect();

        self.dispatch(chunks, |range, acc: &mut Option<R>| {
            self.drive(range, |i| {
                let value = map(i)?;
                *acc = acc.take().map(|a| reduce(a, value));
                Ok(())
            })
        })?;

        Ok(partials.into_iter().flatten().fold(init, &reduce))
    }

    /// Map every index and add up the results
    pub fn map_additive_reduce<T, F>(&self, n_indices: usize, f: F) -> ArrayResult<T>
    where
        T: Element,
        F: Fn(usize) -> ArrayResult<T> + Sync,
    {
        self.map_reduce(n_indices, T::default(), f, T::add_wrapping)
    }

    /// Run one worker's chunk, stopping at the first interrupt or error
    fn drive<F>(&self, range: Range<usize>, mut f: F) -> Outcome
    where
        F: FnMut(usize) -> ArrayResult<()>,
    {
        for i in range {
            if self.interrupt.is_raised() {
                return Outcome::Interrupted;
            }
            match f(i) {
                Ok(()) => (),
                Err(Signal::Interrupt) => return Outcome::Interrupted,
                Err(e) => return Outcome::Failed(e),
            }
        }
        Outcome::Done
    }

    /// Spawn one worker per chunk, join them all and report a single outcome
    fn dispatch<S, F>(&self, chunks: Vec<(Range<usize>, S)>, work: F) -> ArrayResult<()>
    where
        S: Send,
        F: Fn(Range<usize>, S) -> Outcome + Sync,
    {
        log::debug!(
            "dispatching {} chunks over {} threads",
            chunks.len(),
            self.n_threads
        );

        let work = &work;
        let outcomes: Vec<Outcome> = std::thread::scope(|s| {
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|(range, state)| s.spawn(move || work(range, state)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        Outcome::Failed(Error::WorkerPanicked(panic_message(payload)).into())
                    })
                })
                .collect()
        });

        self.conclude(outcomes)
    }

    fn conclude(&self, outcomes: Vec<Outcome>) -> ArrayResult<()> {
        let interrupted = outcomes.iter().any(|o| matches!(o, Outcome::Interrupted));
        if interrupted || self.interrupt.is_raised() {
            log::warn!("parallel execution cancelled by interrupt");
            return Signal::Interrupt.into();
        }

        match outcomes.into_iter().find_map(|o| match o {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn split_chunks<X>(ranges: Vec<Range<usize>>, mut rest: &mut [X]) -> Vec<(Range<usize>, &mut [X])> {
    let mut chunks = Vec::with_capacity(ranges.len());
    for range in ranges {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        chunks.push((range, head));
        rest = tail;
    }
    chunks
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// [`Pool::run`] on `n_threads` workers polling the process-wide flag
pub fn parallel_run<F>(n_threads: usize, n_indices: usize, f: F) -> ArrayResult<()>
where
    F: Fn(usize) -> ArrayResult<()> + Sync,
{
    Pool::new(n_threads).run(n_indices, f)
}

/// [`Pool::map`] on `n_threads` workers polling the process-wide flag
pub fn parallel_map<R, F>(n_threads: usize, n_indices: usize, f: F) -> ArrayResult<Vec<R>>
where
    R: Send,
    F: Fn(usize) -> ArrayResult<R> + Sync,
{
    Pool::new(n_threads).map(n_indices, f)
}

/// [`Pool::map_array`] on `n_threads` workers polling the process-wide flag
pub fn parallel_map_array<T, F>(n_threads: usize, n_indices: usize, f: F) -> ArrayResult<SharedArray<T>>
where
    T: Element,
    F: Fn(usize) -> ArrayResult<T> + Sync,
{
    Pool::new(n_threads).map_array(n_indices, f)
}

/// [`Pool::map_reduce`] on `n_threads` workers polling the process-wide flag
pub fn parallel_map_reduce<R, F, G>(
    n_threads: usize,
    n_indices: usize,
    init: R,
    map: F,
    reduce: G,
) -> ArrayResult<R>
where
    R: Clone + Send,
    F: Fn(usize) -> ArrayResult<R> + Sync,
    G: Fn(R, R) -> R + Sync,
{
    Pool::new(n_threads).map_reduce(n_indices, init, map, reduce)
}

/// [`Pool::map_additive_reduce`] on `n_threads` workers polling the
/// process-wide flag
pub fn parallel_map_additive_reduce<T, F>(n_threads: usize, n_indices: usize, f: F) -> ArrayResult<T>
where
    T: Element,
    F: Fn(usize) -> ArrayResult<T> + Sync,
{
    Pool::new(n_threads).map_additive_reduce(n_indices, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn thread_counts(n: usize) -> [usize; 4] {
        [1, 2, n.max(1), n + 5]
    }

    #[test]
    fn partition_is_contiguous_and_balanced() {
        for n_threads in [1, 2, 3, 8, 20] {
            for n in [0, 1, 5, 16, 17, 100] {
                let ranges = partition(n_threads, n);
                assert_eq!(ranges.len(), n_threads.min(n));
                assert_eq!(ranges.first().map_or(0, |r| r.start), 0);
                assert_eq!(ranges.last().map_or(0, |r| r.end), n);
                for w in ranges.windows(2) {
                    assert_eq!(w[0].end, w[1].start);
                    assert!(w[0].len() >= w[1].len());
                    assert!(w[0].len() - w[1].len() <= 1);
                }
            }
        }
    }

    #[test]
    fn zero_threads_means_available_parallelism() {
        assert!(Pool::new(0).n_threads() >= 1);
        assert_eq!(Pool::new(3).n_threads(), 3);
    }

    #[test]
    fn map_preserves_order() {
        let flag = InterruptFlag::new();
        for n in [0, 1, 7, 100] {
            let expected: Vec<u64> = (0..n).map(|i| (i * i) as u64).collect();
            for n_threads in thread_counts(n) {
                let pool = Pool::new(n_threads).with_interrupt(&flag);
                let result = pool.map(n, |i| Ok((i * i) as u64)).unwrap();
                assert_eq!(result, expected);
            }
        }
    }

    #[test]
    fn map_array_preserves_order() {
        let flag = InterruptFlag::new();
        for n in [0, 1, 7, 100] {
            for n_threads in thread_counts(n) {
                let pool = Pool::new(n_threads).with_interrupt(&flag);
                let result = pool.map_array(n, |i| Ok(i as f64 / 2.0)).unwrap();
                assert_eq!(result.ref_count(), 1);
                assert_eq!(result.to_vec(), (0..n).map(|i| i as f64 / 2.0).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn run_visits_every_index_once() {
        let flag = InterruptFlag::new();
        let out = SharedArray::<u32>::new(50);
        let pool = Pool::new(4).with_interrupt(&flag);
        pool.run(50, |i| {
            out.set(i, out.get(i) + 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(out.to_vec(), vec![1; 50]);
    }

    #[test]
    fn reduce_folds_in_index_order() {
        let flag = InterruptFlag::new();
        let expected: String = (0..30).map(|i| format!("{i},")).collect();
        for n_threads in thread_counts(30) {
            let pool = Pool::new(n_threads).with_interrupt(&flag);
            let result = pool
                .map_reduce(30, String::new(), |i| Ok(format!("{i},")), |a, b| a + &b)
                .unwrap();
            assert_eq!(result, expected);
        }
    }

    #[test]
    fn additive_reduce() {
        let flag = InterruptFlag::new();
        let pool = Pool::new(3).with_interrupt(&flag);
        assert_eq!(pool.map_additive_reduce(101, |i| Ok(i as i64)), Ok(5050));
        assert_eq!(pool.map_additive_reduce(0, |i| Ok(i as f32)), Ok(0.0));
        assert_eq!(pool.map_additive_reduce(4, |_| Ok(u16::MAX)), Ok(u16::MAX - 3));
    }

    #[test]
    fn raised_flag_cancels_before_any_work() {
        let flag = InterruptFlag::new();
        flag.raise();
        let calls = AtomicUsize::new(0);
        let pool = Pool::new(4).with_interrupt(&flag);

        let result = pool.map(100, |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(i)
        });
        assert_eq!(result, Err(Signal::Interrupt));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn interrupt_mid_run_is_reported_once() {
        let flag = InterruptFlag::new();
        let calls = AtomicUsize::new(0);
        let pool = Pool::new(4).with_interrupt(&flag);

        let result = pool.run(10_000, |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            if i == 10 {
                flag.raise();
            }
            Ok(())
        });
        assert_eq!(result, Err(Signal::Interrupt));
        assert!(calls.load(Ordering::SeqCst) < 10_000);
    }

    #[test]
    fn worker_interrupt_signal_is_cancellation() {
        let flag = InterruptFlag::new();
        let pool = Pool::new(2).with_interrupt(&flag);
        let result = pool.map(10, |i| if i == 7 { Err(Signal::Interrupt) } else { Ok(i) });
        assert_eq!(result, Err(Signal::Interrupt));
    }

    #[test]
    fn first_failing_chunk_wins() {
        let flag = InterruptFlag::new();
        let pool = Pool::new(4).with_interrupt(&flag);
        let result = pool.run(100, |i| match i {
            3 | 77 => err!(format!("bad index {i}")),
            _ => Ok(()),
        });
        assert_eq!(result, Err(Signal::Error(Error::Other("bad index 3".to_string()))));
    }

    #[test]
    fn interrupt_takes_priority_over_errors() {
        let flag = InterruptFlag::new();
        let pool = Pool::new(2).with_interrupt(&flag);
        let result = pool.run(10, |i| match i {
            0 => err!("bad"),
            _ => {
                flag.raise();
                Ok(())
            }
        });
        assert_eq!(result, Err(Signal::Interrupt));
    }

    #[test]
    fn panics_become_errors() {
        let flag = InterruptFlag::new();
        let pool = Pool::new(3).with_interrupt(&flag);
        let result = pool.map(30, |i| {
            if i == 25 {
                panic!("boom at {i}");
            }
            Ok(i)
        });
        assert!(matches!(
            result,
            Err(Signal::Error(Error::WorkerPanicked(msg))) if msg.contains("boom at 25")
        ));
    }
}
