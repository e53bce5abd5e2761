use super::{Naive, VectorOps};
use crate::object::Element;

const LANES: usize = 4;

/// Four independent accumulators per loop
///
/// Breaks the dependency chain of the naive loops so the compiler can keep
/// several multiply-adds in flight and vectorize. Results match the naive
/// backend up to floating point reassociation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrolled;

fn reduce<T: Element>(acc: [T; LANES]) -> T {
    (acc[0].add_wrapping(acc[1])).add_wrapping(acc[2].add_wrapping(acc[3]))
}

impl VectorOps for Unrolled {
    fn dot<T: Element>(&self, x: &[T], y: &[T]) -> T {
        let n = x.len().min(y.len());
        let (x, y) = (&x[..n], &y[..n]);

        let xs = x.chunks_exact(LANES);
        let ys = y.chunks_exact(LANES);
        let tail: T = Naive.dot(xs.remainder(), ys.remainder());

        let mut acc = [T::default(); LANES];
        for (a, b) in xs.zip(ys) {
            acc[0] = acc[0].add_wrapping(a[0].mul_wrapping(b[0]));
            acc[1] = acc[1].add_wrapping(a[1].mul_wrapping(b[1]));
            acc[2] = acc[2].add_wrapping(a[2].mul_wrapping(b[2]));
            acc[3] = acc[3].add_wrapping(a[3].mul_wrapping(b[3]));
        }

        reduce(acc).add_wrapping(tail)
    }

    fn sum<T: Element>(&self, x: &[T]) -> T::Promoted {
        let xs = x.chunks_exact(LANES);
        let tail = Naive.sum(xs.remainder());

        let mut acc = [T::Promoted::default(); LANES];
        for a in xs {
            acc[0] = acc[0].add_wrapping(a[0].promote());
            acc[1] = acc[1].add_wrapping(a[1].promote());
            acc[2] = acc[2].add_wrapping(a[2].promote());
            acc[3] = acc[3].add_wrapping(a[3].promote());
        }

        reduce(acc).add_wrapping(tail)
    }

    fn abs_sum<T: Element>(&self, x: &[T]) -> T::Promoted {
        let xs = x.chunks_exact(LANES);
        let tail = Naive.abs_sum(xs.remainder());

        let mut acc = [T::Promoted::default(); LANES];
        for a in xs {
            acc[0] = acc[0].add_wrapping(a[0].abs().promote());
            acc[1] = acc[1].add_wrapping(a[1].abs().promote());
            acc[2] = acc[2].add_wrapping(a[2].abs().promote());
            acc[3] = acc[3].add_wrapping(a[3].abs().promote());
        }

        reduce(acc).add_wrapping(tail)
    }

    fn scale<T: Element>(&self, alpha: T, x: &mut [T]) {
        let mut xs = x.chunks_exact_mut(LANES);
        for a in xs.by_ref() {
            a[0] = a[0].mul_wrapping(alpha);
            a[1] = a[1].mul_wrapping(alpha);
            a[2] = a[2].mul_wrapping(alpha);
            a[3] = a[3].mul_wrapping(alpha);
        }
        Naive.scale(alpha, xs.into_remainder());
    }

    fn fill<T: Element>(&self, alpha: T, x: &mut [T]) {
        x.fill(alpha);
    }

    fn axpy<T: Element>(&self, alpha: T, x: &[T], y: &mut [T]) {
        let n = x.len().min(y.len());
        let (x, y) = (&x[..n], &mut y[..n]);

        let xs = x.chunks_exact(LANES);
        let x_tail = xs.remainder();
        let mut ys = y.chunks_exact_mut(LANES);
        for (b, a) in ys.by_ref().zip(xs) {
            b[0] = b[0].add_wrapping(alpha.mul_wrapping(a[0]));
            b[1] = b[1].add_wrapping(alpha.mul_wrapping(a[1]));
            b[2] = b[2].add_wrapping(alpha.mul_wrapping(a[2]));
            b[3] = b[3].add_wrapping(alpha.mul_wrapping(a[3]));
        }
        Naive.axpy(alpha, x_tail, ys.into_remainder());
    }
}
