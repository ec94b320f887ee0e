//! The per-instance record consumed by the evaluation.
//!
//! Attributes are kept as the optional textual values found in the
//! data set. Interpretation and defaulting happen in the stage which
//! consumes each attribute: dosing fields in [`decay`](crate::decay),
//! rescale fields in [`calibrate`](crate::calibrate).

use ndarray::Array2;

/// Pixel data of a single image slice, before any rescaling.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// Decoded stored values of the first frame, `rows x columns`
    Decoded(Array2<f32>),
    /// The data set has no pixel data
    Missing,
    /// Pixel data is present but could not be decoded
    Unreadable(String),
}

/// The first item of the _Radiopharmaceutical Information Sequence_.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadiopharmaceuticalInfo {
    /// _Radiopharmaceutical Start Time_ (TM)
    pub start_time: Option<String>,
    /// _Radionuclide Half Life_ in seconds (DS)
    pub half_life: Option<String>,
    /// _Radionuclide Total Dose_ in Becquerel (DS)
    pub total_dose: Option<String>,
}

/// A PET image slice with the attributes relevant to the quality metric.
#[derive(Debug, Clone, PartialEq)]
pub struct PetImage {
    /// Identifier of the instance, used in messages
    pub id: String,
    /// _Rows_
    pub rows: Option<u32>,
    /// _Columns_
    pub columns: Option<u32>,
    /// _Number of Frames_ (IS)
    pub number_of_frames: Option<String>,
    /// _Rescale Slope_ (DS)
    pub rescale_slope: Option<String>,
    /// _Rescale Intercept_ (DS)
    pub rescale_intercept: Option<String>,
    /// _Patient's Weight_ in kilograms (DS)
    pub patient_weight: Option<String>,
    /// Radiopharmaceutical dosing, if the sequence is present and not empty
    pub radiopharmaceutical: Option<RadiopharmaceuticalInfo>,
    /// _Acquisition Time_ (TM)
    pub acquisition_time: Option<String>,
    /// _Series Time_ (TM)
    pub series_time: Option<String>,
    /// The pixel grid
    pub pixel_data: PixelData,
}

impl PetImage {
    /// Create an image record with no attributes and no pixel data.
    pub fn new(id: impl Into<String>) -> Self {
        PetImage {
            id: id.into(),
            rows: None,
            columns: None,
            number_of_frames: None,
            rescale_slope: None,
            rescale_intercept: None,
            patient_weight: None,
            radiopharmaceutical: None,
            acquisition_time: None,
            series_time: None,
            pixel_data: PixelData::Missing,
        }
    }

    /// The declared number of frames, if present and an integer.
    pub fn frames(&self) -> Option<i64> {
        self.number_of_frames
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
    }

    /// Whether the image declares more than one frame.
    pub fn is_multi_frame(&self) -> bool {
        self.frames().map_or(false, |n| n > 1)
    }

    /// The declared rows and columns,
    /// if both are present and positive.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.rows, self.columns) {
            (Some(rows), Some(columns)) if rows > 0 && columns > 0 => Some((rows, columns)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count() {
        let mut image = PetImage::new("1");
        assert_eq!(image.frames(), None);
        assert!(!image.is_multi_frame());

        image.number_of_frames = Some("1 ".to_string());
        assert!(!image.is_multi_frame());

        image.number_of_frames = Some("4".to_string());
        assert_eq!(image.frames(), Some(4));
        assert!(image.is_multi_frame());

        image.number_of_frames = Some("many".to_string());
        assert!(!image.is_multi_frame());
    }

    #[test]
    fn dimensions_must_be_positive() {
        let mut image = PetImage::new("1");
        image.rows = Some(128);
        assert_eq!(image.dimensions(), None);
        image.columns = Some(0);
        assert_eq!(image.dimensions(), None);
        image.columns = Some(64);
        assert_eq!(image.dimensions(), Some((128, 64)));
    }
}
