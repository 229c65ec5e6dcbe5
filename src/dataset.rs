//! Dataset utilities for loading, generating, and writing observation files.
//!
//! The on-disk format is plain text with one observation per line and
//! exactly two whitespace-separated floating-point fields:
//!
//! ```text
//! 12.500000 3.250000
//! 0.000000 99.999000
//! ```

use crate::constants::dataset::{FIELDS_PER_LINE, GENERATED_RANGE};
use crate::error::{KmeansError, Result};
use crate::vector::{Coordinates, Observations};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// An in-memory dataset of 2-D observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub observations: Observations,
}

impl Dataset {
    /// Load a dataset from a text file.
    ///
    /// # Errors
    ///
    /// Returns `KmeansError::Io` if the file cannot be read and
    /// `KmeansError::Dataset` if any line is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Parse a dataset from any buffered reader.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut observations = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != FIELDS_PER_LINE {
                return Err(KmeansError::dataset(
                    line_no,
                    format!(
                        "expected {} fields, found {}",
                        FIELDS_PER_LINE,
                        fields.len()
                    ),
                ));
            }

            let components = fields
                .iter()
                .map(|f| {
                    f.parse::<f64>().map_err(|e| {
                        KmeansError::dataset(line_no, format!("invalid number '{}': {}", f, e))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            observations.push(Coordinates::new(components));
        }

        Ok(Self { observations })
    }

    /// Generate `n_points` observations uniform in `[0, 100)²`.
    pub fn generate(n_points: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let observations = (0..n_points)
            .map(|_| Coordinates::random(&mut rng, FIELDS_PER_LINE, GENERATED_RANGE))
            .collect();
        Self { observations }
    }

    /// Write the dataset in the text format accepted by [`Dataset::load`].
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for point in &self.observations {
            let line: Vec<String> = point.as_slice().iter().map(|c| format!("{:.6}", c)).collect();
            writeln!(writer, "{}", line.join(" "))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Returns true if the dataset holds no observations.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Consume the dataset, returning its observations.
    pub fn into_observations(self) -> Observations {
        self.observations
    }
}
