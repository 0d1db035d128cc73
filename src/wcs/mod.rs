//! Celestial world-coordinate system read from a frame header.
//!
//! Supports the gnomonic (`TAN`) projection with optional SIP distortion,
//! which covers the plate solutions written by astrometry.net and the TESS
//! full-frame images. The linear part is taken from `CDi_j`, falling back to
//! `PCi_j × CDELTi` and finally to `CDELTi` with `CROTA2`.
//!
//! Pixel coordinates are 0-indexed: `x` is the column, `y` the row.

pub mod projection;
pub mod sip;

use tracing::debug;

use crate::header::Header;
use projection::{cd_inverse, inverse_tan_project, mat2_mul, tan_project};
use sip::Sip;

/// A celestial TAN(-SIP) world-coordinate solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    /// Reference pixel (FITS 1-indexed convention).
    pub crpix: [f64; 2],
    /// Reference sky position (RA, Dec) in degrees.
    pub crval: [f64; 2],
    /// Linear transform, degrees per pixel, in header axis order.
    pub cd: [[f64; 2]; 2],
    cd_inv: [[f64; 2]; 2],
    /// `true` when axis 1 is declination.
    lat_first: bool,
    pub sip: Option<Sip>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AxisKind {
    Ra,
    Dec,
}

/// Parse a `CTYPEi` value; only equatorial TAN and TAN-SIP are accepted.
fn parse_ctype(ctype: &str) -> Option<(AxisKind, bool)> {
    let ctype = ctype.trim().to_ascii_uppercase();
    let (axis, proj) = ctype.split_at(ctype.len().min(4));
    let kind = match axis.trim_end_matches('-') {
        "RA" => AxisKind::Ra,
        "DEC" => AxisKind::Dec,
        _ => return None,
    };
    let proj = proj.trim_start_matches('-');
    match proj {
        "TAN" => Some((kind, false)),
        "TAN-SIP" => Some((kind, true)),
        _ => None,
    }
}

impl Wcs {
    /// Build a celestial WCS from header keywords.
    ///
    /// Returns `None` when the header carries no usable celestial solution.
    pub fn from_header(header: &Header) -> Option<Self> {
        let (Some(c1), Some(c2)) = (header.get_str("CTYPE1"), header.get_str("CTYPE2")) else {
            debug!("Header has no CTYPE1/CTYPE2");
            return None;
        };
        let (Some((k1, sip1)), Some((k2, sip2))) = (parse_ctype(c1), parse_ctype(c2)) else {
            debug!(ctype1 = c1, ctype2 = c2, "Unsupported celestial projection");
            return None;
        };
        let lat_first = match (k1, k2) {
            (AxisKind::Ra, AxisKind::Dec) => false,
            (AxisKind::Dec, AxisKind::Ra) => true,
            _ => {
                debug!(ctype1 = c1, ctype2 = c2, "CTYPE axes are not an RA/Dec pair");
                return None;
            }
        };

        let crpix = [header.get_f64("CRPIX1")?, header.get_f64("CRPIX2")?];
        let crval = if lat_first {
            [header.get_f64("CRVAL2")?, header.get_f64("CRVAL1")?]
        } else {
            [header.get_f64("CRVAL1")?, header.get_f64("CRVAL2")?]
        };

        let Some(cd) = linear_transform(header) else {
            debug!("Header has no CD, PC/CDELT or CDELT keywords");
            return None;
        };
        let Some(cd_inv) = cd_inverse(&cd) else {
            debug!(?cd, "Singular linear transform");
            return None;
        };

        let sip = if sip1 || sip2 {
            let sip = Sip::from_header(header);
            if sip.is_none() {
                debug!("CTYPE declares SIP but A_ORDER/B_ORDER are missing; ignoring distortion");
            }
            sip
        } else {
            None
        };

        Some(Self {
            crpix,
            crval,
            cd,
            cd_inv,
            lat_first,
            sip,
        })
    }

    /// Build a distortion-free RA/Dec TAN solution.
    pub fn tan(crpix: [f64; 2], crval: [f64; 2], cd: [[f64; 2]; 2]) -> Option<Self> {
        let cd_inv = cd_inverse(&cd)?;
        Some(Self {
            crpix,
            crval,
            cd,
            cd_inv,
            lat_first: false,
            sip: None,
        })
    }

    /// Sky position (degrees) → 0-indexed pixel `(x, y)`.
    ///
    /// Returns `None` for points on or behind the tangent plane.
    pub fn world_to_pixel(&self, ra_deg: f64, dec_deg: f64) -> Option<(f64, f64)> {
        let (xi, eta) = tan_project(
            ra_deg.to_radians(),
            dec_deg.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )?;
        let (xi, eta) = (xi.to_degrees(), eta.to_degrees());
        let (w1, w2) = if self.lat_first { (eta, xi) } else { (xi, eta) };

        let (ud, vd) = mat2_mul(&self.cd_inv, w1, w2);
        let (u, v) = match &self.sip {
            Some(sip) => sip.undistort(ud, vd),
            None => (ud, vd),
        };
        Some((u + self.crpix[0] - 1.0, v + self.crpix[1] - 1.0))
    }

    /// 0-indexed pixel `(x, y)` → sky position (RA, Dec) in degrees.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x + 1.0 - self.crpix[0];
        let v = y + 1.0 - self.crpix[1];
        let (ud, vd) = match &self.sip {
            Some(sip) => sip.distort(u, v),
            None => (u, v),
        };
        let (w1, w2) = mat2_mul(&self.cd, ud, vd);
        let (xi, eta) = if self.lat_first { (w2, w1) } else { (w1, w2) };
        let (ra, dec) = inverse_tan_project(
            xi.to_radians(),
            eta.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        );
        (ra.to_degrees(), dec.to_degrees())
    }
}

/// `CDi_j`, else `PCi_j × CDELTi`, else `CDELTi` with `CROTA2`.
fn linear_transform(header: &Header) -> Option<[[f64; 2]; 2]> {
    let has_cd = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"]
        .iter()
        .any(|k| header.contains(k));
    if has_cd {
        let cd = |k: &str| header.get_f64(k).unwrap_or(0.0);
        return Some([[cd("CD1_1"), cd("CD1_2")], [cd("CD2_1"), cd("CD2_2")]]);
    }

    let cdelt1 = header.get_f64("CDELT1")?;
    let cdelt2 = header.get_f64("CDELT2")?;

    let has_pc = ["PC1_1", "PC1_2", "PC2_1", "PC2_2"]
        .iter()
        .any(|k| header.contains(k));
    if has_pc {
        // PC defaults to the identity matrix
        let pc = |k: &str, d: f64| header.get_f64(k).unwrap_or(d);
        return Some([
            [cdelt1 * pc("PC1_1", 1.0), cdelt1 * pc("PC1_2", 0.0)],
            [cdelt2 * pc("PC2_1", 0.0), cdelt2 * pc("PC2_2", 1.0)],
        ]);
    }

    let (sin_r, cos_r) = header.get_f64("CROTA2").unwrap_or(0.0).to_radians().sin_cos();
    Some([
        [cdelt1 * cos_r, -cdelt2 * sin_r],
        [cdelt1 * sin_r, cdelt2 * cos_r],
    ])
}
