//! Bernoulli function B(x) = x / (e^x - 1) used by the exponential-fitting
//! flux discretizations.
//!
//! The functions are generic over [`DualNum`] so they can be differentiated
//! by the external Newton solver. Near the removable singularity at x = 0 a
//! Taylor expansion is used; elsewhere `exp_m1` keeps the quotient free of
//! cancellation.

use num_dual::DualNum;

/// Below this |x| the Taylor branch is used.
const SERIES_THRESHOLD: f64 = 1e-2;

/// Above this |x| `e^x` is close to overflow and B takes its limits
/// B(x) = 0, B(-x) = x.
const ASYMPTOTIC_THRESHOLD: f64 = 700.0;

/// Taylor expansion of B(x) around 0, accurate to O(x^10).
#[inline]
fn bernoulli_series<T: DualNum<f64>>(x: T) -> T {
    let x2 = x.clone() * x.clone();
    // 1 - x/2 + x^2/12 - x^4/720 + x^6/30240 - x^8/1209600
    let even = T::from(1.0)
        + x2.clone()
            * (T::from(1.0 / 12.0)
                + x2.clone()
                    * (T::from(-1.0 / 720.0)
                        + x2.clone() * (T::from(1.0 / 30240.0) - x2 * (1.0 / 1_209_600.0))));
    even - x * 0.5
}

/// Bernoulli function B(x).
#[inline]
pub fn bernoulli<T: DualNum<f64>>(x: T) -> T {
    if x.re().abs() < SERIES_THRESHOLD {
        bernoulli_series(x)
    } else if x.re() > ASYMPTOTIC_THRESHOLD {
        T::from(0.0)
    } else if x.re() < -ASYMPTOTIC_THRESHOLD {
        -x
    } else {
        x.clone() / x.exp_m1()
    }
}

/// The pair `(B(x), B(-x))`.
///
/// Both values are computed so that `B(-x) - B(x) = x` holds to machine
/// precision, including at and around x = 0.
#[inline]
pub fn bernoulli_pm<T: DualNum<f64>>(x: T) -> (T, T) {
    if x.re().abs() < SERIES_THRESHOLD {
        let bp = bernoulli_series(x.clone());
        let bm = bp.clone() + x;
        (bp, bm)
    } else if x.re() > ASYMPTOTIC_THRESHOLD {
        (T::from(0.0), x)
    } else if x.re() < -ASYMPTOTIC_THRESHOLD {
        (-x, T::from(0.0))
    } else {
        let bp = x.clone() / x.clone().exp_m1();
        let bm = -x.clone() / (-x).exp_m1();
        (bp, bm)
    }
}

/// Derivative B'(x) = B(x) (1 - B(-x)) / x, with a series branch near zero.
#[inline]
pub fn bernoulli_derivative<T: DualNum<f64>>(x: T) -> T {
    if x.re().abs() < SERIES_THRESHOLD {
        let x2 = x.clone() * x.clone();
        // -1/2 + x/6 - x^3/180 + x^5/5040
        T::from(-0.5) + x.clone() * (T::from(1.0 / 6.0) - x2.clone() * (1.0 / 180.0) + x2.clone() * x2 * (1.0 / 5040.0))
    } else if x.re() > ASYMPTOTIC_THRESHOLD {
        T::from(0.0)
    } else if x.re() < -ASYMPTOTIC_THRESHOLD {
        T::from(-1.0)
    } else {
        let (bp, bm) = bernoulli_pm(x.clone());
        bp * (T::from(1.0) - bm) / x
    }
}
