//! Small statistics primitives shared by the analysis modules.
//!
//! Quantiles use the R-7 definition (linear interpolation between order
//! statistics), which is what the bucketing thresholds and percentile trims
//! are specified against. The chi-square upper-tail probability is computed
//! from the regularized incomplete gamma function.

/// Compute a single quantile from unsorted data.
///
/// The input is copied and sorted; use [`quantile_sorted`] when computing
/// several quantiles of the same distribution.
///
/// # Panics
///
/// Panics if `data` is empty or `p` is outside [0, 1].
#[must_use]
pub fn quantile(data: &[f64], p: f64) -> f64 {
    assert!(!data.is_empty(), "Cannot compute quantile of empty slice");
    let mut sorted = data.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, p)
}

/// Compute a quantile from data already sorted ascending.
///
/// Uses the R-7 definition: `h = (n - 1) * p`, linearly interpolating
/// between the surrounding order statistics.
///
/// # Panics
///
/// Panics if `sorted` is empty or `p` is outside [0, 1].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty(), "Cannot compute quantile of empty slice");
    assert!(
        (0.0..=1.0).contains(&p),
        "Quantile probability must be in [0, 1]"
    );

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let h = (n - 1) as f64 * p;
    let h_floor = h.floor() as usize;
    let h_frac = h - h.floor();

    if h_floor >= n - 1 {
        return sorted[n - 1];
    }
    if h_frac == 0.0 {
        return sorted[h_floor];
    }
    sorted[h_floor] + h_frac * (sorted[h_floor + 1] - sorted[h_floor])
}

/// Arithmetic mean; `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Median via the R-7 quantile; `None` for an empty slice.
#[must_use]
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(quantile(data, 0.5))
}

/// Upper-tail probability of the chi-square distribution:
/// `P(X >= x)` for `X ~ χ²(df)`.
///
/// Computed as `Q(df/2, x/2)`, the regularized upper incomplete gamma
/// function, via the standard series / continued-fraction split.
///
/// # Panics
///
/// Panics if `df` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn chi_square_survival(x: f64, df: u32) -> f64 {
    assert!(df > 0, "chi-square requires at least one degree of freedom");
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(f64::from(df) / 2.0, x / 2.0)
}

/// Regularized upper incomplete gamma function Q(a, x).
fn gamma_q(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        // Series converges fastest here; Q = 1 - P.
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_cont_fraction(a, x)
    }
}

const GAMMA_EPS: f64 = 1e-14;
const GAMMA_MAX_ITER: usize = 300;

/// Lower regularized incomplete gamma P(a, x) by series expansion.
fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut term = 1.0 / a;
    let mut sum = term;
    let mut ap = a;
    for _ in 0..GAMMA_MAX_ITER {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * GAMMA_EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

/// Upper regularized incomplete gamma Q(a, x) by Lentz's continued fraction.
#[allow(clippy::cast_precision_loss)]
fn gamma_q_cont_fraction(a: f64, x: f64) -> f64 {
    let tiny = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / tiny;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=GAMMA_MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < tiny {
            d = tiny;
        }
        c = b + an / c;
        if c.abs() < tiny {
            c = tiny;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < GAMMA_EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Natural log of the gamma function (Lanczos approximation, g = 5).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COEFFS {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}
