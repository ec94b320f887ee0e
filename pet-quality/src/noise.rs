//! Block-wise noise estimation over a tissue mask.
//!
//! Small blocks of tissue are assumed to have a locally flat true
//! activity, so the spread of their calibrated values approximates
//! the acquisition noise.

use ndarray::{s, Array2, ArrayView2};

/// Crop a slice and its mask to the centered region whose dimensions
/// are the largest multiples of `block`.
///
/// Returns `None` if the cropped region would be empty.
pub fn crop_center<'a>(
    slice: &'a Array2<f64>,
    mask: &'a Array2<bool>,
    block: usize,
) -> Option<(ArrayView2<'a, f64>, ArrayView2<'a, bool>)> {
    if block == 0 {
        return None;
    }
    let (rows, columns) = slice.dim();
    let target_rows = rows / block * block;
    let target_columns = columns / block * block;
    if target_rows == 0 || target_columns == 0 {
        return None;
    }

    let r0 = (rows - target_rows) / 2;
    let c0 = (columns - target_columns) / 2;
    Some((
        slice.slice(s![r0..r0 + target_rows, c0..c0 + target_columns]),
        mask.slice(s![r0..r0 + target_rows, c0..c0 + target_columns]),
    ))
}

/// Population standard deviation of the masked values of a block,
/// if at least `min_valid` pixels are masked.
fn block_std(block: ArrayView2<f64>, mask: ArrayView2<bool>, min_valid: usize) -> Option<f64> {
    let values: Vec<f64> = block
        .iter()
        .zip(mask.iter())
        .filter(|(_, m)| **m)
        .map(|(&v, _)| v)
        .collect();
    if values.is_empty() || values.len() < min_valid {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Compute the noise samples of one calibrated slice.
///
/// The centered crop of the slice is split into non-overlapping
/// `block` x `block` tiles, visited in row-major order.
/// Each tile with at least `min_valid` masked pixels contributes the
/// standard deviation of those pixels; other tiles are discarded.
///
/// # Panics
///
/// Panics if `slice` and `mask` have different shapes.
pub fn block_noise(
    slice: &Array2<f64>,
    mask: &Array2<bool>,
    block: usize,
    min_valid: usize,
) -> Vec<f64> {
    assert_eq!(slice.dim(), mask.dim(), "slice and mask shapes differ");

    let Some((slice, mask)) = crop_center(slice, mask, block) else {
        return Vec::new();
    };

    let (rows, columns) = slice.dim();
    let mut samples = Vec::new();
    for i in 0..rows / block {
        for j in 0..columns / block {
            let (r, c) = (i * block, j * block);
            let values = slice.slice(s![r..r + block, c..c + block]);
            let valid = mask.slice(s![r..r + block, c..c + block]);
            if let Some(std) = block_std(values, valid, min_valid) {
                samples.push(std);
            }
        }
    }
    samples
}
