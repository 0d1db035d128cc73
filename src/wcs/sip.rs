//! Simple Imaging Polynomial (SIP) distortion.
//!
//! SIP corrections act on pixel offsets `(u, v)` from `CRPIX`, before the
//! linear `CD` transform:
//!
//! ```text
//! u' = u + Σ A_pq · u^p · v^q     (0 ≤ p+q ≤ A_ORDER)
//! v' = v + Σ B_pq · u^p · v^q
//! ```
//!
//! The inverse uses `AP`/`BP` when the header carries them:
//!
//! ```text
//! u = u' + Σ AP_pq · u'^p · v'^q
//! v = v' + Σ BP_pq · u'^p · v'^q
//! ```
//!
//! and otherwise solves the forward polynomial by fixed-point iteration.

use crate::header::Header;

const MAX_INVERSE_ITERATIONS: usize = 50;
const INVERSE_TOLERANCE: f64 = 1e-10;

/// One SIP correction polynomial.
#[derive(Debug, Clone, PartialEq)]
pub struct SipPolynomial {
    pub order: u32,
    /// Flat coefficient vector; use [`coeff_index`] to access.
    pub coeffs: Vec<f64>,
}

impl SipPolynomial {
    pub fn zero(order: u32) -> Self {
        Self {
            order,
            coeffs: vec![0.0; num_coeffs(order)],
        }
    }

    /// Read `{prefix}_ORDER` and every `{prefix}_p_q` present in the header.
    ///
    /// Absent coefficients are zero. Returns `None` when the order keyword is missing.
    pub fn from_header(header: &Header, prefix: &str) -> Option<Self> {
        let order = header.get_i64(&format!("{prefix}_ORDER"))?;
        let order = u32::try_from(order).ok()?;
        let mut poly = Self::zero(order);
        for (p, q) in term_pairs(order) {
            if let Some(c) = header.get_f64(&format!("{prefix}_{p}_{q}")) {
                poly.coeffs[coeff_index(p, q)] = c;
            }
        }
        Some(poly)
    }

    pub fn set(&mut self, p: u32, q: u32, value: f64) {
        self.coeffs[coeff_index(p, q)] = value;
    }

    #[inline]
    pub fn eval(&self, u: f64, v: f64) -> f64 {
        eval_poly(&self.coeffs, self.order, u, v)
    }
}

/// Forward and (optional) inverse SIP polynomials for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Sip {
    pub a: SipPolynomial,
    pub b: SipPolynomial,
    pub ap: Option<SipPolynomial>,
    pub bp: Option<SipPolynomial>,
}

impl Sip {
    /// Parse SIP keywords. `A_ORDER` and `B_ORDER` are both required;
    /// `AP`/`BP` are used only when both are present.
    pub fn from_header(header: &Header) -> Option<Self> {
        let a = SipPolynomial::from_header(header, "A")?;
        let b = SipPolynomial::from_header(header, "B")?;
        let (ap, bp) = match (
            SipPolynomial::from_header(header, "AP"),
            SipPolynomial::from_header(header, "BP"),
        ) {
            (Some(ap), Some(bp)) => (Some(ap), Some(bp)),
            _ => (None, None),
        };
        Some(Self { a, b, ap, bp })
    }

    /// Pixel offset from `CRPIX` → distorted offset fed to the `CD` matrix.
    pub fn distort(&self, u: f64, v: f64) -> (f64, f64) {
        (u + self.a.eval(u, v), v + self.b.eval(u, v))
    }

    /// Distorted offset → pixel offset from `CRPIX`.
    pub fn undistort(&self, ud: f64, vd: f64) -> (f64, f64) {
        if let (Some(ap), Some(bp)) = (&self.ap, &self.bp) {
            return (ud + ap.eval(ud, vd), vd + bp.eval(ud, vd));
        }

        let (mut u, mut v) = (ud, vd);
        for _ in 0..MAX_INVERSE_ITERATIONS {
            let nu = ud - self.a.eval(u, v);
            let nv = vd - self.b.eval(u, v);
            let converged =
                (nu - u).abs() < INVERSE_TOLERANCE && (nv - v).abs() < INVERSE_TOLERANCE;
            u = nu;
            v = nv;
            if converged {
                break;
            }
        }
        (u, v)
    }
}

// ── Polynomial term helpers ─────────────────────────────────────────────────

/// Number of coefficients for terms (p, q) with 0 ≤ p+q ≤ order.
pub fn num_coeffs(order: u32) -> usize {
    ((order + 1) * (order + 2) / 2) as usize
}

/// Map (p, q) to a flat index.
///
/// Terms are enumerated by increasing sum, then decreasing p:
///   sum=0: (0,0)=0
///   sum=1: (1,0)=1, (0,1)=2
///   sum=2: (2,0)=3, (1,1)=4, (0,2)=5
pub fn coeff_index(p: u32, q: u32) -> usize {
    let s = p + q;
    (s * (s + 1) / 2 + (s - p)) as usize
}

/// Enumerate all (p, q) pairs for the given order, in [`coeff_index`] order.
pub fn term_pairs(order: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity(num_coeffs(order));
    for s in 0..=order {
        for p in (0..=s).rev() {
            pairs.push((p, s - p));
        }
    }
    pairs
}

fn eval_poly(coeffs: &[f64], order: u32, u: f64, v: f64) -> f64 {
    let mut result = 0.0;
    let mut idx = 0;
    for s in 0..=order {
        for p in (0..=s).rev() {
            let q = s - p;
            let c = coeffs[idx];
            if c != 0.0 {
                result += c * u.powi(p as i32) * v.powi(q as i32);
            }
            idx += 1;
        }
    }
    result
}
