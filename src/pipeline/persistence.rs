//! Raw mean persistence.
//!
//! When decisions are skipped the mean probability maps are written as a JSON
//! object keyed by image identifier, so thresholds can be tuned offline
//! without rerunning inference.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

use crate::core::{ProbabilityMap, SegResult};

/// Mean probability maps keyed by image identifier.
pub type RawMeans = BTreeMap<String, ProbabilityMap>;

/// Serializes raw means to a writer.
pub fn write_raw_means<W: Write>(means: &RawMeans, mut writer: W) -> SegResult<()> {
    serde_json::to_writer(&mut writer, means)?;
    writer.flush()?;
    Ok(())
}

/// Deserializes raw means from a reader.
pub fn read_raw_means<R: Read>(reader: R) -> SegResult<RawMeans> {
    Ok(serde_json::from_reader(reader)?)
}

/// Writes raw means to a file.
pub fn save_raw_means(means: &RawMeans, path: &Path) -> SegResult<()> {
    let file = std::fs::File::create(path)?;
    write_raw_means(means, std::io::BufWriter::new(file))?;
    info!("Saved {} mean maps to {}", means.len(), path.display());
    Ok(())
}

/// Reads raw means from a file.
pub fn load_raw_means(path: &Path) -> SegResult<RawMeans> {
    let file = std::fs::File::open(path)?;
    read_raw_means(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SegError;
    use ndarray::Array3;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preds.json");

        let mut means = RawMeans::new();
        means.insert(
            "a.jpg".to_string(),
            Array3::from_shape_fn((2, 3, 4), |(c, y, x)| (c * 12 + y * 4 + x) as f32 / 32.0),
        );
        means.insert("b.jpg".to_string(), Array3::zeros((2, 3, 4)));

        save_raw_means(&means, &path).unwrap();
        assert_eq!(load_raw_means(&path).unwrap(), means);
    }

    #[test]
    fn test_malformed_input_is_serialization_error() {
        let err = read_raw_means("{\"a.jpg\": [1, 2]}".as_bytes()).unwrap_err();
        assert!(matches!(err, SegError::Serialization(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_raw_means(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SegError::Io(_)));
    }
}
