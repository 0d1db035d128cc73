//! Locating and reading frame files.
//!
//! [`search_files`] is always available. [`FitsFrameSource`] reads FITS
//! images through cfitsio and needs the `fits` feature.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Recursively find files under `root` whose names match `pattern`
/// (shell glob, e.g. `*.fits` or `*.fz`), sorted by path.
pub fn search_files(root: impl AsRef<Path>, pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let full = root.join("**").join(pattern);
    let full = full
        .to_str()
        .with_context(|| format!("Non UTF-8 search path: {}", full.display()))?;

    let mut paths = Vec::new();
    for entry in glob::glob(full).with_context(|| format!("Invalid file pattern: {pattern}"))? {
        let path = entry.context("Failed to read directory entry")?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// HDU holding the image: tile-compressed `.fz` files keep it in extension 1.
pub fn image_hdu_index(path: &Path) -> usize {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("fz") => 1,
        _ => 0,
    }
}

#[cfg(feature = "fits")]
pub use reader::FitsFrameSource;

#[cfg(feature = "fits")]
mod reader {
    use std::path::{Path, PathBuf};

    use anyhow::{bail, Context};
    use fitsio::hdu::{FitsHdu, HduInfo};
    use fitsio::FitsFile;
    use ndarray::Array2;
    use tracing::debug;

    use super::image_hdu_index;
    use crate::frame::{Frame, FrameSource};
    use crate::header::{Header, HeaderValue};
    use crate::telescope::KeywordMap;
    use crate::wcs::sip::term_pairs;

    /// World-coordinate keywords read from every frame.
    const WCS_KEYWORDS: &[&str] = &[
        "CTYPE1", "CTYPE2", "CRPIX1", "CRPIX2", "CRVAL1", "CRVAL2", "CD1_1", "CD1_2", "CD2_1",
        "CD2_2", "PC1_1", "PC1_2", "PC2_1", "PC2_2", "CDELT1", "CDELT2", "CROTA2",
    ];

    const SIP_PREFIXES: [&str; 4] = ["A", "B", "AP", "BP"];

    /// Frames read from FITS files, in the order given.
    #[derive(Debug, Clone)]
    pub struct FitsFrameSource {
        paths: Vec<PathBuf>,
        keywords: Vec<String>,
    }

    impl FitsFrameSource {
        pub fn new(paths: Vec<PathBuf>) -> Self {
            Self {
                paths,
                keywords: Vec::new(),
            }
        }

        /// Also read the keywords a telescope's header fields live in.
        pub fn with_keyword_map(mut self, map: &KeywordMap) -> Self {
            for kw in [&map.exposure, &map.obstime, &map.instrument, &map.readout, &map.gain] {
                self.keywords.push(kw.clone());
            }
            self
        }

        /// Also read arbitrary extra keywords.
        pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.keywords.extend(keywords.into_iter().map(Into::into));
            self
        }

        pub fn paths(&self) -> &[PathBuf] {
            &self.paths
        }
    }

    fn read_value(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<HeaderValue> {
        if let Ok(v) = hdu.read_key::<f64>(fptr, key) {
            return Some(HeaderValue::Float(v));
        }
        hdu.read_key::<String>(fptr, key).ok().map(HeaderValue::Str)
    }

    fn read_header(hdu: &FitsHdu, fptr: &mut FitsFile, extra: &[String]) -> Header {
        let mut header = Header::new();
        for key in WCS_KEYWORDS.iter().copied().chain(extra.iter().map(String::as_str)) {
            if let Some(v) = read_value(hdu, fptr, key) {
                header.insert(key, v);
            }
        }
        for prefix in SIP_PREFIXES {
            let order_key = format!("{prefix}_ORDER");
            let Ok(order) = hdu.read_key::<i64>(fptr, &order_key) else {
                continue;
            };
            header.insert(&order_key, order);
            let Ok(order) = u32::try_from(order) else {
                continue;
            };
            for (p, q) in term_pairs(order) {
                let key = format!("{prefix}_{p}_{q}");
                if let Ok(c) = hdu.read_key::<f64>(fptr, &key) {
                    header.insert(&key, c);
                }
            }
        }
        header
    }

    fn read_frame(path: &Path, keywords: &[String]) -> anyhow::Result<Frame> {
        let mut fptr = FitsFile::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;
        let ext = image_hdu_index(path);
        let hdu = fptr
            .hdu(ext)
            .with_context(|| format!("Failed to access HDU {ext} of {}", path.display()))?;

        let shape = match &hdu.info {
            HduInfo::ImageInfo { shape, .. } => shape.clone(),
            _ => bail!("HDU {ext} of {} is not an image", path.display()),
        };
        // shape is [NAXIS2, NAXIS1] = [rows, cols]
        let (rows, cols) = match shape.as_slice() {
            [rows, cols] => (*rows, *cols),
            other => bail!("Expected a 2-D image, got shape {other:?}"),
        };

        let pixels: Vec<f64> = hdu
            .read_image(&mut fptr)
            .context("Failed to read image data")?;
        let data = Array2::from_shape_vec((rows, cols), pixels)
            .context("Pixel count does not match image shape")?;
        let header = read_header(&hdu, &mut fptr, keywords);

        debug!(path = %path.display(), rows, cols, cards = header.len(), "Loaded FITS frame");
        Ok(Frame::new(path.display().to_string(), data, header))
    }

    impl FrameSource for FitsFrameSource {
        fn len(&self) -> usize {
            self.paths.len()
        }

        fn frame_id(&self, index: usize) -> String {
            self.paths
                .get(index)
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        }

        fn load(&self, index: usize) -> anyhow::Result<Frame> {
            let path = self
                .paths
                .get(index)
                .with_context(|| format!("frame index {index} out of range"))?;
            read_frame(path, &self.keywords)
        }
    }
}
