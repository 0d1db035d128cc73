//! Circular apertures and background annuli over a pixel grid.
//!
//! Pixel `(row, col)` covers `[col − 0.5, col + 0.5] × [row − 0.5, row + 0.5]`,
//! so integer coordinates are pixel centres. Aperture sums weight every pixel
//! by its overlap with the circle according to [`ApertureMethod`].

use ndarray::ArrayView2;

/// How a pixel's overlap with a circle is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApertureMethod {
    /// Exact geometric area of the circle/pixel intersection.
    #[default]
    Exact,
    /// Fraction of `subpixels × subpixels` sample points inside the circle.
    Subpixel { subpixels: usize },
    /// 1 if the pixel centre is inside the circle, else 0.
    Center,
}

impl ApertureMethod {
    pub const DEFAULT_SUBPIXELS: usize = 10;

    pub fn subpixel() -> Self {
        ApertureMethod::Subpixel {
            subpixels: Self::DEFAULT_SUBPIXELS,
        }
    }

    /// Fraction of the pixel spanning `[xmin, xmax] × [ymin, ymax]` (relative to
    /// the circle centre) covered by a circle of radius `r`.
    pub fn pixel_weight(self, xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
        let pixel_area = (xmax - xmin) * (ymax - ymin);
        match self {
            ApertureMethod::Exact => circular_overlap(xmin, ymin, xmax, ymax, r) / pixel_area,
            ApertureMethod::Subpixel { subpixels } => {
                subpixel_overlap(xmin, ymin, xmax, ymax, r, subpixels.max(1))
            }
            ApertureMethod::Center => subpixel_overlap(xmin, ymin, xmax, ymax, r, 1),
        }
    }
}

/// Pixels whose footprint may touch a circle of radius `r` at `(x, y)`,
/// clipped to an image of `shape = (rows, cols)`.
fn bounding_box(
    x: f64,
    y: f64,
    r: f64,
    shape: (usize, usize),
) -> Option<(usize, usize, usize, usize)> {
    let (rows, cols) = shape;
    let row_lo = (y - r + 0.5).floor().max(0.0);
    let row_hi = (y + r + 0.5).ceil().min(rows as f64);
    let col_lo = (x - r + 0.5).floor().max(0.0);
    let col_hi = (x + r + 0.5).ceil().min(cols as f64);
    if !(row_lo < row_hi && col_lo < col_hi) {
        return None;
    }
    Some((row_lo as usize, row_hi as usize, col_lo as usize, col_hi as usize))
}

/// Circular aperture centred at `(x, y)` (x = column, y = row).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularAperture {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl CircularAperture {
    pub fn new(x: f64, y: f64, r: f64) -> Self {
        Self { x, y, r }
    }

    /// Geometric area, `π r²`.
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.r * self.r
    }

    /// Visit every pixel with positive weight as `(row, col, weight)`.
    pub fn for_each_weight(
        &self,
        shape: (usize, usize),
        method: ApertureMethod,
        mut f: impl FnMut(usize, usize, f64),
    ) {
        let Some((r0, r1, c0, c1)) = bounding_box(self.x, self.y, self.r, shape) else {
            return;
        };
        for row in r0..r1 {
            let ymin = row as f64 - 0.5 - self.y;
            for col in c0..c1 {
                let xmin = col as f64 - 0.5 - self.x;
                let w = method.pixel_weight(xmin, ymin, xmin + 1.0, ymin + 1.0, self.r);
                if w > 0.0 {
                    f(row, col, w);
                }
            }
        }
    }

    /// Weighted sum of pixel values inside the aperture.
    pub fn sum(&self, data: &ArrayView2<f64>, method: ApertureMethod) -> f64 {
        let mut total = 0.0;
        self.for_each_weight(data.dim(), method, |row, col, w| {
            total += w * data[[row, col]];
        });
        total
    }
}

/// Background annulus centred at `(x, y)` between `r_in` and `r_out`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularAnnulus {
    pub x: f64,
    pub y: f64,
    pub r_in: f64,
    pub r_out: f64,
}

impl CircularAnnulus {
    pub fn new(x: f64, y: f64, r_in: f64, r_out: f64) -> Self {
        Self { x, y, r_in, r_out }
    }

    /// Values of the pixels whose centres fall inside the annulus.
    pub fn values(&self, data: &ArrayView2<f64>) -> Vec<f64> {
        let mut values = Vec::new();
        let Some((r0, r1, c0, c1)) = bounding_box(self.x, self.y, self.r_out, data.dim()) else {
            return values;
        };
        let (r_in_sq, r_out_sq) = (self.r_in * self.r_in, self.r_out * self.r_out);
        for row in r0..r1 {
            let dy = row as f64 - self.y;
            for col in c0..c1 {
                let dx = col as f64 - self.x;
                let d_sq = dx * dx + dy * dy;
                if d_sq < r_out_sq && d_sq >= r_in_sq {
                    values.push(data[[row, col]]);
                }
            }
        }
        values
    }
}

// ── Overlap geometry ────────────────────────────────────────────────────────

fn subpixel_overlap(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64, subpixels: usize) -> f64 {
    let dx = (xmax - xmin) / subpixels as f64;
    let dy = (ymax - ymin) / subpixels as f64;
    let r_sq = r * r;
    let mut inside = 0usize;
    for i in 0..subpixels {
        let y = ymin + (i as f64 + 0.5) * dy;
        for j in 0..subpixels {
            let x = xmin + (j as f64 + 0.5) * dx;
            if x * x + y * y < r_sq {
                inside += 1;
            }
        }
    }
    inside as f64 / (subpixels * subpixels) as f64
}

/// Area of the intersection of the rectangle `[xmin, xmax] × [ymin, ymax]`
/// with a circle of radius `r` at the origin.
///
/// Rectangles straddling an axis are split so that every piece lies in one
/// quadrant and can be reflected into the first.
pub fn circular_overlap(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
    if xmin >= 0.0 {
        if ymin >= 0.0 {
            overlap_first_quadrant(xmin, ymin, xmax, ymax, r)
        } else if ymax <= 0.0 {
            overlap_first_quadrant(-ymax, xmin, -ymin, xmax, r)
        } else {
            circular_overlap(xmin, ymin, xmax, 0.0, r) + circular_overlap(xmin, 0.0, xmax, ymax, r)
        }
    } else if xmax <= 0.0 {
        if ymin >= 0.0 {
            overlap_first_quadrant(-xmax, ymin, -xmin, ymax, r)
        } else if ymax <= 0.0 {
            overlap_first_quadrant(-xmax, -ymax, -xmin, -ymin, r)
        } else {
            circular_overlap(xmin, ymin, xmax, 0.0, r) + circular_overlap(xmin, 0.0, xmax, ymax, r)
        }
    } else {
        circular_overlap(xmin, ymin, 0.0, ymax, r) + circular_overlap(0.0, ymin, xmax, ymax, r)
    }
}

/// Overlap for a rectangle with `0 ≤ xmin < xmax`, `0 ≤ ymin < ymax`.
fn overlap_first_quadrant(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
    let r_sq = r * r;
    if xmin * xmin + ymin * ymin >= r_sq {
        return 0.0;
    }
    if xmax * xmax + ymax * ymax <= r_sq {
        return (xmax - xmin) * (ymax - ymin);
    }

    let chord = |a: f64| (r_sq - a * a).max(0.0).sqrt();
    let lower_right_inside = xmax * xmax + ymin * ymin < r_sq;
    let upper_left_inside = xmin * xmin + ymax * ymax < r_sq;

    match (lower_right_inside, upper_left_inside) {
        (true, true) => {
            // only the upper-right corner is cut off
            let (x1, y1) = (chord(ymax), ymax);
            let (x2, y2) = (xmax, chord(xmax));
            (xmax - xmin) * (ymax - ymin) - triangle_area(x1, y1, x2, y2, xmax, ymax)
                + arc_segment_area(x1, y1, x2, y2, r)
        }
        (true, false) => {
            // circle crosses the left and right edges
            let (x1, y1) = (xmin, chord(xmin));
            let (x2, y2) = (xmax, chord(xmax));
            arc_segment_area(x1, y1, x2, y2, r)
                + triangle_area(x1, y1, x1, ymin, xmax, ymin)
                + triangle_area(x1, y1, x2, ymin, x2, y2)
        }
        (false, true) => {
            // circle crosses the bottom and top edges
            let (x1, y1) = (chord(ymin), ymin);
            let (x2, y2) = (chord(ymax), ymax);
            arc_segment_area(x1, y1, x2, y2, r)
                + triangle_area(x1, y1, xmin, y1, xmin, y2)
                + triangle_area(x1, y1, xmin, y2, x2, y2)
        }
        (false, false) => {
            // only the lower-left corner is inside
            let (x1, y1) = (chord(ymin), ymin);
            let (x2, y2) = (xmin, chord(xmin));
            arc_segment_area(x1, y1, x2, y2, r) + triangle_area(x1, y1, x2, y2, xmin, ymin)
        }
    }
}

/// Area between a chord and its arc.
fn arc_segment_area(x1: f64, y1: f64, x2: f64, y2: f64, r: f64) -> f64 {
    let a = ((x2 - x1) * (x2 - x1) + (y2 - y1) * (y2 - y1)).sqrt();
    let theta = 2.0 * (0.5 * a / r).min(1.0).asin();
    0.5 * r * r * (theta - theta.sin())
}

fn triangle_area(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> f64 {
    0.5 * (x1 * (y2 - y3) + x2 * (y3 - y1) + x3 * (y1 - y2)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::f64::consts::PI;

    #[test]
    fn test_full_and_empty_pixels() {
        assert!((circular_overlap(-0.5, -0.5, 0.5, 0.5, 5.0) - 1.0).abs() < 1e-12);
        assert_eq!(circular_overlap(10.0, 10.0, 11.0, 11.0, 5.0), 0.0);
    }

    #[test]
    fn test_quarter_circle() {
        // a square enclosing one quadrant of the circle
        let a = circular_overlap(0.0, 0.0, 3.0, 3.0, 2.0);
        assert!((a - PI).abs() < 1e-12, "got {a}");
    }

    #[test]
    fn test_exact_sum_of_ones_is_area() {
        let data = Array2::<f64>::ones((40, 40));
        for &(x, y, r) in &[(20.0, 20.0, 5.0), (19.3, 20.7, 3.3), (20.5, 20.5, 7.25)] {
            let ap = CircularAperture::new(x, y, r);
            let sum = ap.sum(&data.view(), ApertureMethod::Exact);
            assert!((sum - ap.area()).abs() < 1e-9, "({x}, {y}, {r}): {sum} vs {}", ap.area());
        }
    }

    #[test]
    fn test_subpixel_and_center_approximate_area() {
        let data = Array2::<f64>::ones((40, 40));
        let ap = CircularAperture::new(20.2, 19.6, 5.0);
        let sub = ap.sum(&data.view(), ApertureMethod::subpixel());
        assert!((sub - ap.area()).abs() / ap.area() < 0.01, "{sub}");
        let centre = ap.sum(&data.view(), ApertureMethod::Center);
        assert!((centre - ap.area()).abs() / ap.area() < 0.1, "{centre}");
        assert_eq!(centre.fract(), 0.0);
    }

    #[test]
    fn test_aperture_clipped_at_edge() {
        let data = Array2::<f64>::ones((20, 20));
        // centre of pixel (0, 0): the aperture's left half falls off the image
        let ap = CircularAperture::new(-0.5, 10.0, 3.0);
        let sum = ap.sum(&data.view(), ApertureMethod::Exact);
        assert!((sum - 0.5 * ap.area()).abs() < 1e-9, "{sum}");
    }

    #[test]
    fn test_annulus_values() {
        let mut data = Array2::<f64>::zeros((30, 30));
        for ((row, col), v) in data.indexed_iter_mut() {
            let d = ((row as f64 - 15.0).powi(2) + (col as f64 - 15.0).powi(2)).sqrt();
            *v = if d < 4.0 { 100.0 } else { 50.0 };
        }
        let annulus = CircularAnnulus::new(15.0, 15.0, 6.0, 9.0);
        let values = annulus.values(&data.view());
        assert!(!values.is_empty());
        assert!(values.iter().all(|&v| v == 50.0));
        let expected = PI * (81.0 - 36.0);
        assert!((values.len() as f64 - expected).abs() / expected < 0.1);
    }
}
