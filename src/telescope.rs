//! Per-telescope header keyword mapping.
//!
//! Every telescope names its exposure, timing, and detector keywords
//! differently. The mapping is a small semicolon-delimited table with one
//! column per telescope and one row per canonical field:
//!
//! ```text
//! field;Huntsman;TESS
//! exposure;EXPTIME;EXPOSURE
//! obstime;DATE-OBS;TSTART
//! instrument;INSTRUME;CAMERA
//! readout;READNOIS;READNOIA
//! gain;EGAIN;GAINA
//! exposure_unit;s;d
//! ```
//!
//! The table is validated when it is loaded, so a missing field or an
//! unknown telescope is reported up front instead of on the first frame.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::error;

use crate::error::{PhotometryError, Result};
use crate::header::{observation_time_days, Header, HeaderFields, SECONDS_PER_DAY};

/// Telescope used when none is configured.
pub const DEFAULT_TELESCOPE: &str = "TESS";

const BUILTIN_TABLE: &str = include_str!("../data/telescope_keywords.csv");

const REQUIRED_FIELDS: [&str; 5] = ["exposure", "obstime", "instrument", "readout", "gain"];

/// Unit of the exposure keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureUnit {
    Days,
    Seconds,
}

impl ExposureUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "day" | "days" => Some(ExposureUnit::Days),
            "s" | "sec" | "seconds" => Some(ExposureUnit::Seconds),
            _ => None,
        }
    }

    fn to_days(self, value: f64) -> f64 {
        match self {
            ExposureUnit::Days => value,
            ExposureUnit::Seconds => value / SECONDS_PER_DAY,
        }
    }
}

/// Header keywords for one telescope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMap {
    pub telescope: String,
    pub exposure: String,
    pub obstime: String,
    pub instrument: String,
    pub readout: String,
    pub gain: String,
    pub exposure_unit: ExposureUnit,
}

impl KeywordMap {
    /// Resolve the canonical fields from a frame header.
    ///
    /// Logs an error naming the first absent or unparseable keyword and
    /// returns `None`; never panics.
    pub fn resolve(&self, header: &Header) -> Option<HeaderFields> {
        let lookup = |keyword: &str| {
            let value = header.get(keyword);
            if value.is_none() {
                error!(
                    telescope = %self.telescope,
                    keyword,
                    "Header keyword does not exist"
                );
            }
            value
        };
        let numeric = |keyword: &str| {
            let value = lookup(keyword)?.as_f64();
            if value.is_none() {
                error!(telescope = %self.telescope, keyword, "Header keyword is not numeric");
            }
            value
        };

        let exposure = numeric(&self.exposure)?;
        let obstime = lookup(&self.obstime)?;
        let observation_time = match observation_time_days(obstime) {
            Some(t) => t,
            None => {
                error!(
                    telescope = %self.telescope,
                    keyword = %self.obstime,
                    value = %obstime,
                    "Observation time is neither numeric nor an ISO-8601 date"
                );
                return None;
            }
        };
        let instrument = lookup(&self.instrument)?.to_string();
        let readout_noise = numeric(&self.readout)?;
        let gain = numeric(&self.gain)?;

        Some(HeaderFields {
            exposure_days: self.exposure_unit.to_days(exposure),
            observation_time,
            instrument,
            readout_noise,
            gain,
        })
    }

    /// [`resolve`](Self::resolve), substituting `default` when a keyword is missing.
    pub fn resolve_or(&self, header: &Header, default: HeaderFields) -> HeaderFields {
        self.resolve(header).unwrap_or(default)
    }
}

/// Validated telescope → keyword mapping.
#[derive(Debug, Clone)]
pub struct TelescopeKeywords {
    maps: BTreeMap<String, KeywordMap>,
}

impl TelescopeKeywords {
    /// The keyword table shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_reader(BUILTIN_TABLE.as_bytes())
    }

    /// Load a keyword table from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open keyword table: {}", path.display()))?;
        Self::from_reader(file)
    }

    /// Parse and validate a semicolon-delimited keyword table.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| PhotometryError::KeywordTable(e.to_string()))?
            .clone();
        let telescopes: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
        if telescopes.is_empty() {
            return Err(PhotometryError::KeywordTable(
                "table has no telescope columns".into(),
            ));
        }

        // field name -> keyword per telescope column
        let mut rows: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in rdr.records() {
            let record = record.map_err(|e| PhotometryError::KeywordTable(e.to_string()))?;
            let Some(field) = record.get(0) else {
                continue;
            };
            let values = record.iter().skip(1).map(str::to_string).collect();
            rows.insert(field.to_ascii_lowercase(), values);
        }

        let mut maps = BTreeMap::new();
        for (col, telescope) in telescopes.iter().enumerate() {
            let keyword = |field: &str| -> Result<String> {
                let kw = rows
                    .get(field)
                    .and_then(|v| v.get(col))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                if kw.is_empty() {
                    return Err(PhotometryError::KeywordTable(format!(
                        "telescope '{telescope}' has no keyword for field '{field}'"
                    )));
                }
                Ok(kw)
            };

            for field in REQUIRED_FIELDS {
                keyword(field)?;
            }

            let exposure_unit = match rows.get("exposure_unit").and_then(|v| v.get(col)) {
                None => ExposureUnit::Days,
                Some(u) => ExposureUnit::parse(u).ok_or_else(|| {
                    PhotometryError::KeywordTable(format!(
                        "telescope '{telescope}' has unknown exposure unit '{u}'"
                    ))
                })?,
            };

            maps.insert(
                telescope.clone(),
                KeywordMap {
                    telescope: telescope.clone(),
                    exposure: keyword("exposure")?,
                    obstime: keyword("obstime")?,
                    instrument: keyword("instrument")?,
                    readout: keyword("readout")?,
                    gain: keyword("gain")?,
                    exposure_unit,
                },
            );
        }

        Ok(Self { maps })
    }

    /// Keyword map for a telescope.
    pub fn keywords_for(&self, telescope: &str) -> Result<&KeywordMap> {
        self.maps
            .get(telescope)
            .ok_or_else(|| PhotometryError::UnknownTelescope {
                name: telescope.to_string(),
                known: self.telescopes().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn telescopes(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }
}
