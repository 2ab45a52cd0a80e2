//! Submission table assembly.
//!
//! A submission is a two-column table, `Image_Label,EncodedPixels`, with one
//! row per composite key `"<imageId>_<className>"` in template order. Image
//! identifiers may themselves contain underscores, so keys are split at the
//! last one.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::config::EnsembleConfig;
use crate::core::constants::{KEY_COLUMN, RLE_COLUMN};
use crate::core::{BinaryMask, SegError, SegResult};
use crate::processors::encode_mask;

/// A per-class prediction handed to the table builder.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassPrediction {
    /// A binary mask still to be encoded.
    Mask(BinaryMask),
    /// An already encoded run-length string, emitted verbatim.
    Encoded(String),
}

/// Ordered composite keys that define the rows of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionTemplate {
    keys: Vec<String>,
}

impl SubmissionTemplate {
    /// Creates a template from keys in submission order.
    pub fn from_keys<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads a template from CSV text.
    ///
    /// The header must contain an `Image_Label` column; every other column is
    /// ignored. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if the header lacks the key column or a
    /// row is too short, and an IO error if reading fails.
    pub fn from_csv_reader<R: BufRead>(reader: R) -> SegResult<Self> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(SegError::invalid_input("submission template is empty")),
        };
        let key_index = header
            .trim_start_matches('\u{feff}')
            .split(',')
            .position(|column| column.trim() == KEY_COLUMN)
            .ok_or_else(|| {
                SegError::invalid_input(format!(
                    "template header '{}' has no {} column",
                    header, KEY_COLUMN
                ))
            })?;

        let mut keys = Vec::new();
        for (row, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let key = line.split(',').nth(key_index).ok_or_else(|| {
                SegError::invalid_input(format!(
                    "template row {} has no {} field: '{}'",
                    row + 1,
                    KEY_COLUMN,
                    line
                ))
            })?;
            keys.push(key.trim().to_string());
        }

        debug!("Loaded submission template with {} keys", keys.len());
        Ok(Self { keys })
    }

    /// Reads a template from a CSV file.
    pub fn from_csv_path(path: &Path) -> SegResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Composite keys in submission order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of rows the submission will have.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the template has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One submission row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    /// Composite key, `"<imageId>_<className>"`.
    pub key: String,
    /// Run-length encoding, empty for an empty or missing mask.
    pub encoded_pixels: String,
}

/// The finished submission, rows in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionTable {
    rows: Vec<SubmissionRow>,
}

impl SubmissionTable {
    /// Rows in template order.
    pub fn rows(&self) -> &[SubmissionRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows with a non-empty encoding.
    pub fn non_empty(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| !row.encoded_pixels.is_empty())
            .count()
    }

    /// Looks up the encoding for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.key == key)
            .map(|row| row.encoded_pixels.as_str())
    }

    /// Writes the table as CSV with an `Image_Label,EncodedPixels` header.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> SegResult<()> {
        writeln!(writer, "{},{}", KEY_COLUMN, RLE_COLUMN)?;
        for row in &self.rows {
            writeln!(writer, "{},{}", row.key, row.encoded_pixels)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the table to a CSV file.
    pub fn write_csv_path(&self, path: &Path) -> SegResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

/// Builds submission tables from per-image, per-class predictions.
#[derive(Debug, Clone)]
pub struct SubmissionBuilder {
    class_names: Vec<String>,
}

impl SubmissionBuilder {
    /// Creates a builder for the given class names, in channel order.
    pub fn new<S: Into<String>>(class_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            class_names: class_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Class names in channel order.
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Assembles one row per template key.
    ///
    /// Keys whose image has no prediction, whose class is unknown, or that
    /// have no `_` separator produce an empty encoding and a warning.
    ///
    /// # Errors
    ///
    /// Returns an encoding error, with image and channel context, if a mask
    /// contains values other than 0 and 1.
    pub fn build(
        &self,
        template: &SubmissionTemplate,
        predictions: &HashMap<String, Vec<ClassPrediction>>,
    ) -> SegResult<SubmissionTable> {
        let mut rows = Vec::with_capacity(template.len());
        let mut missing = 0usize;

        for key in template.keys() {
            let encoded_pixels = match self.lookup(key, predictions) {
                Some((image_id, channel, prediction)) => match prediction {
                    ClassPrediction::Encoded(rle) => rle.clone(),
                    ClassPrediction::Mask(mask) => {
                        encode_mask(mask.view()).map_err(|e| match e {
                            SegError::Encoding { message, .. } => SegError::encoding(
                                format!("image '{}' channel {}", image_id, channel),
                                message,
                            ),
                            other => other,
                        })?
                    }
                },
                None => {
                    missing += 1;
                    String::new()
                }
            };
            rows.push(SubmissionRow {
                key: key.clone(),
                encoded_pixels,
            });
        }

        debug!(
            "Built submission with {} rows ({} without predictions)",
            rows.len(),
            missing
        );
        Ok(SubmissionTable { rows })
    }

    fn lookup<'a>(
        &self,
        key: &'a str,
        predictions: &'a HashMap<String, Vec<ClassPrediction>>,
    ) -> Option<(&'a str, usize, &'a ClassPrediction)> {
        let Some((image_id, class_name)) = key.rsplit_once('_') else {
            warn!("Malformed submission key '{}': no '_' separator", key);
            return None;
        };
        let Some(channel) = self.class_names.iter().position(|c| c == class_name) else {
            warn!("Unknown class '{}' in submission key '{}'", class_name, key);
            return None;
        };
        let Some(per_class) = predictions.get(image_id) else {
            warn!("No prediction for image '{}', emitting empty mask", image_id);
            return None;
        };
        match per_class.get(channel) {
            Some(prediction) => Some((image_id, channel, prediction)),
            None => {
                warn!(
                    "Image '{}' has {} class predictions, class '{}' is missing",
                    image_id,
                    per_class.len(),
                    class_name
                );
                None
            }
        }
    }
}

/// Artifact file names derived from the run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Submission CSV file name.
    pub submission: String,
    /// Raw mean predictions file name.
    pub raw_means: String,
}

impl ArtifactNames {
    /// Derives artifact names for a run.
    ///
    /// `config_stem` is the stem of the training configuration file. The
    /// thresholds in the submission name are taken from the first class.
    pub fn new(config_stem: &str, config: &EnsembleConfig) -> Self {
        let folds = config.fold_tag();
        let use_best = if config.checkpoint.is_best() {
            "True"
        } else {
            "False"
        };
        let (top, bottom) = config
            .decisions
            .get(0)
            .map(|p| (p.top, p.bottom))
            .unwrap_or((0.0, 0.0));
        let areas = config
            .decisions
            .min_areas()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join("-");

        Self {
            submission: format!(
                "sub_{}_kfolds{}_top{:02}_minarea{}_bottom{:02}_usebest_{}.csv",
                config_stem,
                folds,
                tenths(top),
                areas,
                tenths(bottom),
                use_best
            ),
            raw_means: format!("preds_{}_kfolds{}_usebest_{}.json", config_stem, folds, use_best),
        }
    }
}

fn tenths(value: f32) -> u32 {
    (value * 10.0 + 1e-4).max(0.0) as u32
}
