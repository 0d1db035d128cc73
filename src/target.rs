//! Sky positions of the stars to measure.
//!
//! Name resolution is a collaborator: anything implementing
//! [`TargetResolver`] can turn an identifier into coordinates. The crate
//! ships [`TargetCatalog`], a lookup table read from a CSV file with
//! `id,ra_deg,dec_deg` columns.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;

use crate::error::{PhotometryError, Result};

/// ICRS position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyCoord {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self { ra_deg, dec_deg }
    }
}

/// A named star and its position.
#[derive(Debug, Clone, PartialEq)]
pub struct StarTarget {
    pub id: String,
    pub coord: SkyCoord,
}

impl StarTarget {
    pub fn new(id: impl Into<String>, ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            id: id.into(),
            coord: SkyCoord::new(ra_deg, dec_deg),
        }
    }
}

/// Resolves a star identifier to a position.
pub trait TargetResolver {
    fn resolve(&self, id: &str) -> Result<StarTarget>;
}

/// Star positions loaded from a CSV table.
#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    stars: HashMap<String, SkyCoord>,
}

impl TargetCatalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open target catalog: {}", path.display()))?;
        Self::from_reader(file)
    }

    /// Parse `id,ra_deg,dec_deg` rows; the first row is a header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut stars = HashMap::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.context("Malformed target catalog row")?;
            let field = |i: usize, name: &str| -> anyhow::Result<f64> {
                let raw = record.get(i).unwrap_or("");
                raw.parse()
                    .with_context(|| format!("row {}: invalid {name} '{raw}'", line + 1))
            };
            let Some(id) = record.get(0).filter(|s| !s.is_empty()) else {
                continue;
            };
            let coord = SkyCoord::new(field(1, "ra_deg")?, field(2, "dec_deg")?);
            stars.insert(id.to_string(), coord);
        }
        Ok(Self { stars })
    }

    pub fn insert(&mut self, target: StarTarget) {
        self.stars.insert(target.id, target.coord);
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }
}

impl TargetResolver for TargetCatalog {
    fn resolve(&self, id: &str) -> Result<StarTarget> {
        self.stars
            .get(id)
            .map(|coord| StarTarget {
                id: id.to_string(),
                coord: *coord,
            })
            .ok_or_else(|| PhotometryError::UnknownStar {
                star: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "id,ra_deg,dec_deg\n\
                         # WASP-12 field\n\
                         WASP-12,97.6364,29.6723\n\
                         ref-1, 97.70, 29.60\n";

    #[test]
    fn test_catalog_lookup() {
        let cat = TargetCatalog::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(cat.len(), 2);
        let t = cat.resolve("ref-1").unwrap();
        assert_eq!(t.coord, SkyCoord::new(97.70, 29.60));
        assert!(matches!(
            cat.resolve("WASP-19"),
            Err(PhotometryError::UnknownStar { .. })
        ));
    }

    #[test]
    fn test_catalog_bad_row() {
        let table = "id,ra_deg,dec_deg\nX,abc,1.0\n";
        assert!(TargetCatalog::from_reader(table.as_bytes()).is_err());
    }
}
