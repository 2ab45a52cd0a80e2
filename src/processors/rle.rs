//! Run-length encoding of binary masks in the submission format.
//!
//! Pixels are scanned in column-major (Fortran) order: down each column
//! before moving to the next one. The encoding lists `start length` pairs for
//! every maximal foreground run, with 1-based starts in ascending order,
//! separated by single spaces. An all-background mask encodes to `""`.

use ndarray::{Array2, ArrayView2, ShapeBuilder};

use crate::core::{BinaryMask, SegError, SegResult};

/// Encodes a binary mask.
///
/// # Errors
///
/// Returns an encoding error naming the first column-major offset (1-based)
/// whose value is neither 0 nor 1.
pub fn encode_mask(mask: ArrayView2<'_, u8>) -> SegResult<String> {
    let total = mask.len();
    let mut runs: Vec<String> = Vec::new();
    let mut run_start: Option<usize> = None;

    for (offset, &value) in mask.t().iter().enumerate() {
        match value {
            0 => {
                if let Some(start) = run_start.take() {
                    runs.push(format!("{} {}", start + 1, offset - start));
                }
            }
            1 => {
                if run_start.is_none() {
                    run_start = Some(offset);
                }
            }
            other => {
                return Err(SegError::encoding(
                    "mask",
                    format!(
                        "value {} at column-major offset {} is not 0 or 1",
                        other,
                        offset + 1
                    ),
                ));
            }
        }
    }
    if let Some(start) = run_start {
        runs.push(format!("{} {}", start + 1, total - start));
    }

    Ok(runs.join(" "))
}

/// Decodes a run-length string into a `(height, width)` mask.
///
/// Runs must have positive starts and lengths, appear in ascending order
/// without overlapping, and end inside the mask. Touching runs are accepted
/// and simply merge. The empty string decodes to an all-zero mask.
///
/// # Errors
///
/// Returns an encoding error describing the first malformed run.
pub fn decode_rle(rle: &str, shape: (usize, usize)) -> SegResult<BinaryMask> {
    let (height, width) = shape;
    let total = height * width;
    let mut flat = vec![0u8; total];

    let tokens: Vec<&str> = rle.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return Err(SegError::encoding(
            "run-length string",
            format!("expected start/length pairs, got {} tokens", tokens.len()),
        ));
    }

    let mut prev_end = 0usize;
    for (idx, pair) in tokens.chunks_exact(2).enumerate() {
        let start = parse_token(pair[0], idx)?;
        let length = parse_token(pair[1], idx)?;
        if start == 0 || length == 0 {
            return Err(SegError::encoding(
                "run-length string",
                format!("run {} has zero start or length ({} {})", idx, start, length),
            ));
        }

        let begin = start - 1;
        if begin < prev_end {
            return Err(SegError::encoding(
                "run-length string",
                format!("run {} starting at {} overlaps the previous run", idx, start),
            ));
        }
        let end = begin
            .checked_add(length)
            .filter(|&end| end <= total)
            .ok_or_else(|| {
                SegError::encoding(
                    "run-length string",
                    format!(
                        "run {} ({} {}) exceeds the {} pixels of a {}x{} mask",
                        idx, start, length, total, height, width
                    ),
                )
            })?;

        flat[begin..end].fill(1);
        prev_end = end;
    }

    let mask = Array2::from_shape_vec((height, width).f(), flat)?;
    Ok(mask.as_standard_layout().into_owned())
}

fn parse_token(token: &str, run: usize) -> SegResult<usize> {
    token.parse::<usize>().map_err(|e| {
        SegError::encoding(
            "run-length string",
            format!("run {} has invalid number '{}': {}", run, token, e),
        )
    })
}
