//! One-dimensional piecewise-cubic interpolants over a strictly increasing knot vector.
//!
//! Every method is reduced to per-segment polynomial coefficients
//! `y(u) = a + b·t + c·t² + d·t³` with `t = u - knot[i]`, so evaluation and
//! differentiation share one code path.

/// Interpolation method for a single coordinate channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveMethod {
    /// Exact piecewise-linear.
    Linear,
    /// Natural cubic spline (zero second derivative at both ends).
    NaturalCubic,
    /// Akima spline. Requires at least 5 knots.
    Akima,
}

/// Piecewise cubic polynomial over `knots`.
#[derive(Debug, Clone)]
pub struct Interpolant {
    knots: Vec<f32>,
    coeffs: Vec<[f32; 4]>,
}

impl Interpolant {
    /// Builds an interpolant. `knots` must be strictly increasing and the same length as
    /// `values` (at least 2). Akima silently degrades to natural cubic below 5 knots and
    /// natural cubic degrades to linear below 3.
    pub fn new(knots: &[f32], values: &[f32], method: CurveMethod) -> Self {
        debug_assert_eq!(knots.len(), values.len());
        debug_assert!(knots.len() >= 2);

        let n = knots.len();
        let method = match method {
            CurveMethod::Akima if n < 5 => CurveMethod::NaturalCubic,
            CurveMethod::NaturalCubic if n < 3 => CurveMethod::Linear,
            m => m,
        };

        let coeffs = match method {
            CurveMethod::Linear => linear_coeffs(knots, values),
            CurveMethod::NaturalCubic => natural_cubic_coeffs(knots, values),
            CurveMethod::Akima => akima_coeffs(knots, values),
        };

        Self {
            knots: knots.to_vec(),
            coeffs,
        }
    }

    /// Parameter range covered by the knots.
    pub fn domain(&self) -> (f32, f32) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    fn segment(&self, u: f32) -> (usize, f32) {
        let last = self.coeffs.len() - 1;
        let i = match self
            .knots
            .binary_search_by(|k| k.partial_cmp(&u).unwrap_or(std::cmp::Ordering::Less))
        {
            Ok(i) => i.min(last),
            Err(0) => 0,
            Err(i) => (i - 1).min(last),
        };
        (i, u - self.knots[i])
    }

    /// Value at `u` (clamped to the domain).
    pub fn eval(&self, u: f32) -> f32 {
        let (lo, hi) = self.domain();
        let (i, t) = self.segment(u.clamp(lo, hi));
        let [a, b, c, d] = self.coeffs[i];
        a + t * (b + t * (c + t * d))
    }

    /// First derivative at `u` (clamped to the domain).
    pub fn derivative(&self, u: f32) -> f32 {
        let (lo, hi) = self.domain();
        let (i, t) = self.segment(u.clamp(lo, hi));
        let [_, b, c, d] = self.coeffs[i];
        b + t * (2.0 * c + t * 3.0 * d)
    }
}

fn linear_coeffs(x: &[f32], y: &[f32]) -> Vec<[f32; 4]> {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| {
            let h = xs[1] - xs[0];
            [ys[0], (ys[1] - ys[0]) / h, 0.0, 0.0]
        })
        .collect()
}

/// Converts endpoint values + endpoint derivatives into polynomial coefficients.
fn hermite(y0: f32, y1: f32, t0: f32, t1: f32, h: f32) -> [f32; 4] {
    let m = (y1 - y0) / h;
    [
        y0,
        t0,
        (3.0 * m - 2.0 * t0 - t1) / h,
        (t0 + t1 - 2.0 * m) / (h * h),
    ]
}

fn natural_cubic_coeffs(x: &[f32], y: &[f32]) -> Vec<[f32; 4]> {
    let n = x.len();
    let h: Vec<f32> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Second derivatives M[1..n-1] via the Thomas algorithm; M[0] = M[n-1] = 0.
    let mut m = vec![0.0f32; n];
    if n > 2 {
        let inner = n - 2;
        let mut diag = vec![0.0f32; inner];
        let mut rhs = vec![0.0f32; inner];
        for k in 0..inner {
            let i = k + 1;
            diag[k] = 2.0 * (h[i - 1] + h[i]);
            rhs[k] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
        }
        for k in 1..inner {
            let w = h[k] / diag[k - 1];
            diag[k] -= w * h[k];
            rhs[k] -= w * rhs[k - 1];
        }
        m[inner] = rhs[inner - 1] / diag[inner - 1];
        for k in (0..inner - 1).rev() {
            m[k + 1] = (rhs[k] - h[k + 1] * m[k + 2]) / diag[k];
        }
    }

    (0..n - 1)
        .map(|i| {
            let slope = (y[i + 1] - y[i]) / h[i];
            [
                y[i],
                slope - h[i] * (2.0 * m[i] + m[i + 1]) / 6.0,
                m[i] / 2.0,
                (m[i + 1] - m[i]) / (6.0 * h[i]),
            ]
        })
        .collect()
}

fn akima_coeffs(x: &[f32], y: &[f32]) -> Vec<[f32; 4]> {
    let n = x.len();

    // Secant slopes padded with two extrapolated values on each side:
    // s[k + 2] is the slope of segment k.
    let mut s = vec![0.0f32; n + 3];
    for k in 0..n - 1 {
        s[k + 2] = (y[k + 1] - y[k]) / (x[k + 1] - x[k]);
    }
    s[1] = 2.0 * s[2] - s[3];
    s[0] = 2.0 * s[1] - s[2];
    s[n + 1] = 2.0 * s[n] - s[n - 1];
    s[n + 2] = 2.0 * s[n + 1] - s[n];

    let tangents: Vec<f32> = (0..n)
        .map(|i| {
            let (m0, m1, m2, m3) = (s[i], s[i + 1], s[i + 2], s[i + 3]);
            let w1 = (m3 - m2).abs();
            let w2 = (m1 - m0).abs();
            if w1 + w2 < 1e-9 {
                0.5 * (m1 + m2)
            } else {
                (w1 * m1 + w2 * m2) / (w1 + w2)
            }
        })
        .collect();

    (0..n - 1)
        .map(|i| hermite(y[i], y[i + 1], tangents[i], tangents[i + 1], x[i + 1] - x[i]))
        .collect()
}
