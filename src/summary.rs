//! Photometric precision summary appended to a per-instrument text file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PhotometryError, Result};

/// One line of `rms_{instrument}.txt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionSummary {
    pub aperture_radius: f64,
    /// Scatter of the final normalized flux.
    pub std: f64,
    /// Scatter of the binned normalized flux.
    pub std_binned: f64,
    pub median_snr_target: f64,
    pub median_snr_reference: f64,
    pub median_snr_differential: f64,
}

impl PrecisionSummary {
    /// `"{r} {std} {std_binned} {snr_target} {snr_ref} {snr_diff}"`
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.aperture_radius,
            self.std,
            self.std_binned,
            self.median_snr_target,
            self.median_snr_reference,
            self.median_snr_differential
        )
    }

    /// Append this summary to `<dir>/rms_{instrument}.txt`, creating the
    /// directory and file as needed. Returns the file path.
    pub fn append_to(&self, dir: &Path, instrument: &str) -> Result<PathBuf> {
        let path = dir.join(format!("rms_{instrument}.txt"));
        let wrap = |source: std::io::Error| PhotometryError::Summary {
            path: path.display().to_string(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(wrap)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(wrap)?;
        writeln!(file, "{}", self.to_line()).map_err(wrap)?;

        info!(path = %path.display(), "Photometric precision appended");
        Ok(path)
    }
}
