//! Conversion of stored pixel values into SUV.

use crate::image::{PetImage, PixelData};
use ndarray::Array2;
use snafu::{ensure, Snafu};

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum CalibrateError {
    #[snafu(display("Missing pixel data"))]
    MissingPixelData,

    #[snafu(display("Unreadable pixel data: {}", message))]
    UnreadablePixelData { message: String },

    #[snafu(display(
        "Pixel data is {}x{}, but the image declares {}x{}",
        got_rows,
        got_columns,
        rows,
        columns
    ))]
    PixelDataShape {
        rows: usize,
        columns: usize,
        got_rows: usize,
        got_columns: usize,
    },
}

pub type Result<T, E = CalibrateError> = std::result::Result<T, E>;

/// Description of a modality rescale function,
/// defined by a _rescale slope_ and _rescale intercept_.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rescale {
    /// the rescale slope
    pub slope: f64,
    /// the rescale intercept
    pub intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Rescale::new(1., 0.)
    }
}

impl Rescale {
    /// Create a new rescale function.
    #[inline]
    pub fn new(slope: f64, intercept: f64) -> Self {
        Rescale { slope, intercept }
    }

    /// Obtain the rescale function declared by an image.
    ///
    /// Absent or malformed values fall back to the identity:
    /// slope 1 (also replacing a zero slope) and intercept 0.
    pub fn of_image(image: &PetImage) -> Self {
        let slope = lenient_number(image.rescale_slope.as_deref())
            .filter(|s| *s != 0.)
            .unwrap_or(1.);
        let intercept = lenient_number(image.rescale_intercept.as_deref()).unwrap_or(0.);
        Rescale { slope, intercept }
    }

    /// Apply the rescale function to a value.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        self.slope * value + self.intercept
    }
}

fn lenient_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Convert the stored values of an image into SUV.
///
/// The pixel data must be decoded and have the declared dimensions,
/// when those are present.
pub fn calibrate_slice(image: &PetImage, suv_factor: f64) -> Result<Array2<f64>> {
    let pixels = match &image.pixel_data {
        PixelData::Decoded(pixels) => pixels,
        PixelData::Missing => return MissingPixelDataSnafu.fail(),
        PixelData::Unreadable(message) => {
            return UnreadablePixelDataSnafu {
                message: message.as_str(),
            }
            .fail()
        }
    };

    let (got_rows, got_columns) = pixels.dim();
    if let Some((rows, columns)) = image.dimensions() {
        let (rows, columns) = (rows as usize, columns as usize);
        ensure!(
            (rows, columns) == (got_rows, got_columns),
            PixelDataShapeSnafu {
                rows,
                columns,
                got_rows,
                got_columns,
            }
        );
    }

    let rescale = Rescale::of_image(image);
    Ok(pixels.mapv(|v| rescale.apply(f64::from(v)) * suv_factor))
}

/// Select the pixels with a value strictly above `threshold`.
pub fn tissue_mask(slice: &Array2<f64>, threshold: f64) -> Array2<bool> {
    slice.mapv(|v| v > threshold)
}

/// Number of selected pixels in a mask.
pub fn mask_count(mask: &Array2<bool>) -> usize {
    mask.iter().filter(|&&m| m).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn image_with(pixels: Array2<f32>) -> PetImage {
        let mut image = PetImage::new("1");
        let (rows, columns) = pixels.dim();
        image.rows = Some(rows as u32);
        image.columns = Some(columns as u32);
        image.pixel_data = PixelData::Decoded(pixels);
        image
    }

    #[test]
    fn identity_rescale_times_factor() {
        let mut image = image_with(array![[10., 0.], [1., 2.]]);
        image.rescale_slope = Some("1".to_string());
        image.rescale_intercept = Some("0".to_string());

        let slice = calibrate_slice(&image, 2.).unwrap();
        assert_eq!(slice, array![[20., 0.], [2., 4.]]);
    }

    #[test]
    fn missing_rescale_defaults_to_identity() {
        let image = image_with(array![[10.]]);
        assert_eq!(Rescale::of_image(&image), Rescale::new(1., 0.));
        assert_eq!(calibrate_slice(&image, 2.).unwrap(), array![[20.]]);
    }

    #[test]
    fn malformed_rescale_defaults_to_identity() {
        let mut image = image_with(array![[10.]]);
        image.rescale_slope = Some("0".to_string());
        image.rescale_intercept = Some("abc".to_string());
        assert_eq!(Rescale::of_image(&image), Rescale::default());

        image.rescale_slope = Some(" 0.5 ".to_string());
        image.rescale_intercept = Some("-1".to_string());
        assert_eq!(Rescale::of_image(&image), Rescale::new(0.5, -1.));
        assert_eq!(calibrate_slice(&image, 3.).unwrap(), array![[12.]]);
    }

    #[test]
    fn pixel_data_must_be_available() {
        let mut image = PetImage::new("1");
        assert_eq!(
            calibrate_slice(&image, 1.),
            Err(CalibrateError::MissingPixelData)
        );

        image.pixel_data = PixelData::Unreadable("unsupported transfer syntax".to_string());
        let err = calibrate_slice(&image, 1.).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unreadable pixel data: unsupported transfer syntax"
        );
    }

    #[test]
    fn pixel_data_must_match_dimensions() {
        let mut image = image_with(Array2::zeros((4, 4)));
        image.columns = Some(5);
        assert!(matches!(
            calibrate_slice(&image, 1.),
            Err(CalibrateError::PixelDataShape { columns: 5, got_columns: 4, .. })
        ));
    }

    #[test]
    fn mask_is_strictly_above_threshold() {
        let slice = array![[0.07, 0.08], [1.0, 0.0]];
        let mask = tissue_mask(&slice, 0.07);
        assert_eq!(mask, array![[false, true], [true, false]]);
        assert_eq!(mask_count(&mask), 2);
    }
}
