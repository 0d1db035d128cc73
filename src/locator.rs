//! Locating a sky position on a frame, and the aperture geometry that has to
//! fit around it.

use tracing::debug;

use crate::error::{PhotometryError, Result};
use crate::extractor::FrameRejection;
use crate::header::Header;
use crate::target::SkyCoord;
use crate::wcs::Wcs;

/// Inner background radius as a multiple of the aperture radius.
pub const INNER_ANNULUS_FACTOR: f64 = 1.6;
/// Outer background radius as a multiple of the aperture radius.
pub const OUTER_ANNULUS_FACTOR: f64 = 2.2;

/// Aperture radius, background annulus and centroid window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureGeometry {
    /// Aperture radius in pixels.
    pub r: f64,
    /// Half-width of the square centroid window in pixels.
    pub box_w: usize,
}

impl Default for ApertureGeometry {
    fn default() -> Self {
        Self { r: 3.0, box_w: 10 }
    }
}

impl ApertureGeometry {
    pub fn new(r: f64, box_w: usize) -> Self {
        Self { r, box_w }
    }

    /// Inner radius of the background annulus.
    pub fn r_in(&self) -> f64 {
        INNER_ANNULUS_FACTOR * self.r
    }

    /// Outer radius of the background annulus.
    pub fn r_out(&self) -> f64 {
        OUTER_ANNULUS_FACTOR * self.r
    }

    /// Area of the photometric aperture, `π r²`.
    pub fn aperture_area(&self) -> f64 {
        std::f64::consts::PI * self.r * self.r
    }

    /// The background annulus must fit inside the centroid window.
    pub fn validate(&self) -> Result<()> {
        if !(self.r.is_finite() && self.r > 0.0) {
            return Err(PhotometryError::InvalidConfig(format!(
                "aperture radius must be positive, got {}",
                self.r
            )));
        }
        if self.r_out() > self.box_w as f64 {
            return Err(PhotometryError::ApertureOutOfBox {
                r_out: self.r_out(),
                box_w: self.box_w,
            });
        }
        Ok(())
    }
}

/// Predicted position of a star on a frame (0-indexed, `x` = column, `y` = row).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPosition {
    pub x: f64,
    pub y: f64,
}

/// Converts sky coordinates to pixel positions through each frame's WCS.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameLocator;

impl FrameLocator {
    pub fn new() -> Self {
        Self
    }

    /// Predicted pixel position of `coord` on the frame described by `header`.
    ///
    /// Frames without a celestial solution are rejected, not treated as errors.
    pub fn locate(
        &self,
        header: &Header,
        coord: &SkyCoord,
    ) -> std::result::Result<PixelPosition, FrameRejection> {
        let wcs = Wcs::from_header(header).ok_or(FrameRejection::NoCelestialWcs)?;
        let (x, y) = wcs
            .world_to_pixel(coord.ra_deg, coord.dec_deg)
            .ok_or(FrameRejection::BehindTangentPlane)?;
        if !(x.is_finite() && y.is_finite()) {
            return Err(FrameRejection::NonFinitePosition);
        }
        debug!(x, y, "Located star");
        Ok(PixelPosition { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_radii() {
        let g = ApertureGeometry::new(5.0, 20);
        assert!((g.r_in() - 8.0).abs() < 1e-12);
        assert!((g.r_out() - 11.0).abs() < 1e-12);
        assert!((g.aperture_area() - 25.0 * std::f64::consts::PI).abs() < 1e-12);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_geometry_annulus_outside_box() {
        // r_out = 22 > box_w = 20
        let g = ApertureGeometry::new(10.0, 20);
        let err = g.validate().unwrap_err();
        assert!(matches!(err, PhotometryError::ApertureOutOfBox { box_w: 20, .. }));

        assert!(ApertureGeometry::new(0.0, 20).validate().is_err());
        assert!(ApertureGeometry::new(5.0, 12).validate().is_ok());
    }

    #[test]
    fn test_locate_requires_wcs() {
        let locator = FrameLocator::new();
        let coord = SkyCoord::new(10.0, 20.0);
        assert_eq!(
            locator.locate(&Header::new(), &coord),
            Err(FrameRejection::NoCelestialWcs)
        );

        let header = Header::new()
            .with("CTYPE1", "RA---TAN")
            .with("CTYPE2", "DEC--TAN")
            .with("CRPIX1", 1.0)
            .with("CRPIX2", 1.0)
            .with("CRVAL1", 10.0)
            .with("CRVAL2", 20.0)
            .with("CDELT1", -1.0e-3)
            .with("CDELT2", 1.0e-3);
        let pos = locator.locate(&header, &coord).unwrap();
        assert!(pos.x.abs() < 1e-9 && pos.y.abs() < 1e-9);
    }
}
