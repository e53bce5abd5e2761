use super::VectorOps;
use crate::object::Element;

/// Straight loops, one element at a time
///
/// Integer arithmetic wraps on overflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct Naive;

impl VectorOps for Naive {
    fn dot<T: Element>(&self, x: &[T], y: &[T]) -> T {
        let mut result = T::default();
        for (xi, yi) in x.iter().zip(y) {
            result = result.add_wrapping(xi.mul_wrapping(*yi));
        }
        result
    }

    fn sum<T: Element>(&self, x: &[T]) -> T::Promoted {
        x.iter().fold(T::Promoted::default(), |acc, xi| acc.add_wrapping(xi.promote()))
    }

    fn abs_sum<T: Element>(&self, x: &[T]) -> T::Promoted {
        x.iter().fold(T::Promoted::default(), |acc, xi| {
            acc.add_wrapping(xi.abs().promote())
        })
    }

    fn scale<T: Element>(&self, alpha: T, x: &mut [T]) {
        for xi in x.iter_mut() {
            *xi = xi.mul_wrapping(alpha);
        }
    }

    fn fill<T: Element>(&self, alpha: T, x: &mut [T]) {
        for xi in x.iter_mut() {
            *xi = alpha;
        }
    }

    fn axpy<T: Element>(&self, alpha: T, x: &[T], y: &mut [T]) {
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi = yi.add_wrapping(alpha.mul_wrapping(*xi));
        }
    }
}
