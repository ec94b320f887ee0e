//! Utility module for building a [`PetImage`] from a DICOM object.
//!
//! Attributes relevant to the quality metric are copied as text
//! and interpreted later by the evaluation,
//! so a malformed value in one attribute never prevents
//! reading the others.

use crate::image::{PetImage, PixelData, RadiopharmaceuticalInfo};
use dicom_core::{DataDictionary, Tag};
use dicom_dictionary_std::tags;
use dicom_object::{FileDicomObject, InMemDicomObject};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use snafu::{ensure, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum DecodeSliceError {
    #[snafu(display("Could not decode pixel data"))]
    DecodePixelData { source: dicom_pixeldata::Error },

    #[snafu(display("Could not convert pixel data"))]
    ConvertPixelData { source: dicom_pixeldata::Error },

    #[snafu(display("Unsupported SamplesPerPixel {}", spp))]
    UnsupportedSamplesPerPixel { spp: u16 },

    #[snafu(display(
        "Pixel data holds {} samples, fewer than a {}x{} frame",
        len,
        rows,
        columns
    ))]
    IncompleteFrame {
        len: usize,
        rows: usize,
        columns: usize,
    },

    #[snafu(display("Invalid shape for ndarray"))]
    Shape { source: ndarray::ShapeError },
}

/// Get the text value of an attribute, if present and not empty.
///
/// Surrounding whitespace and null padding are removed.
pub fn text<D>(obj: &InMemDicomObject<D>, tag: Tag) -> Option<String>
where
    D: DataDictionary + Clone,
{
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|e| e.to_str().ok())
        .map(|v| {
            v.trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string()
        })
        .filter(|v| !v.is_empty())
}

/// Get an attribute as an unsigned integer, if present and convertible
pub fn unsigned<D>(obj: &InMemDicomObject<D>, tag: Tag) -> Option<u32>
where
    D: DataDictionary + Clone,
{
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<u32>().ok())
}

/// Get an attribute as a signed integer, if present and convertible
pub fn signed<D>(obj: &InMemDicomObject<D>, tag: Tag) -> Option<i32>
where
    D: DataDictionary + Clone,
{
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<i32>().ok())
}

/// Get the first item of the RadiopharmaceuticalInformationSequence,
/// if present and not empty
pub fn radiopharmaceutical<D>(obj: &InMemDicomObject<D>) -> Option<RadiopharmaceuticalInfo>
where
    D: DataDictionary + Clone,
{
    let sequence = obj
        .element_opt(tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE)
        .ok()
        .flatten()?;
    let item = sequence.value().items()?.first()?;
    Some(RadiopharmaceuticalInfo {
        start_time: text(item, tags::RADIOPHARMACEUTICAL_START_TIME),
        half_life: text(item, tags::RADIONUCLIDE_HALF_LIFE),
        total_dose: text(item, tags::RADIONUCLIDE_TOTAL_DOSE),
    })
}

/// Collect the attributes of a PET image, without its pixel data.
pub fn pet_image_attributes<D>(id: impl Into<String>, obj: &InMemDicomObject<D>) -> PetImage
where
    D: DataDictionary + Clone,
{
    PetImage {
        id: id.into(),
        rows: unsigned(obj, tags::ROWS),
        columns: unsigned(obj, tags::COLUMNS),
        number_of_frames: text(obj, tags::NUMBER_OF_FRAMES),
        rescale_slope: text(obj, tags::RESCALE_SLOPE),
        rescale_intercept: text(obj, tags::RESCALE_INTERCEPT),
        patient_weight: text(obj, tags::PATIENT_WEIGHT),
        radiopharmaceutical: radiopharmaceutical(obj),
        acquisition_time: text(obj, tags::ACQUISITION_TIME),
        series_time: text(obj, tags::SERIES_TIME),
        pixel_data: PixelData::Missing,
    }
}

/// Decode the stored values of the first frame of an image.
///
/// The modality LUT is not applied,
/// the rescale function is applied during calibration.
pub fn decode_first_frame<D>(
    obj: &FileDicomObject<InMemDicomObject<D>>,
) -> Result<ndarray::Array2<f32>, DecodeSliceError>
where
    D: DataDictionary + Clone,
{
    let decoded = obj.decode_pixel_data().context(DecodePixelDataSnafu)?;

    let spp = decoded.samples_per_pixel();
    ensure!(spp == 1, UnsupportedSamplesPerPixelSnafu { spp });

    let rows = decoded.rows() as usize;
    let columns = decoded.columns() as usize;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let values = decoded
        .to_ndarray_with_options::<f32>(&options)
        .context(ConvertPixelDataSnafu)?;
    ensure!(
        values.len() >= rows * columns,
        IncompleteFrameSnafu {
            len: values.len(),
            rows,
            columns,
        }
    );

    let frame: Vec<f32> = values.iter().take(rows * columns).copied().collect();
    ndarray::Array2::from_shape_vec((rows, columns), frame).context(ShapeSnafu)
}

/// Build a complete [`PetImage`] from a DICOM file object.
///
/// Pixel data which cannot be decoded is recorded as unreadable
/// instead of failing.
pub fn pet_image<D>(id: impl Into<String>, obj: &FileDicomObject<InMemDicomObject<D>>) -> PetImage
where
    D: DataDictionary + Clone,
{
    let mut image = pet_image_attributes(id, obj);
    image.pixel_data = if obj.element_opt(tags::PIXEL_DATA).ok().flatten().is_none() {
        PixelData::Missing
    } else {
        match decode_first_frame(obj) {
            Ok(frame) => PixelData::Decoded(frame),
            Err(e) => PixelData::Unreadable(snafu::Report::from_error(e).to_string()),
        }
    };
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::DataSetSequence;
    use dicom_core::{DataElement, PrimitiveValue, VR};

    fn pet_object() -> InMemDicomObject {
        let dosing = InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::RADIOPHARMACEUTICAL_START_TIME,
                VR::TM,
                PrimitiveValue::from("090000.00"),
            ),
            DataElement::new(
                tags::RADIONUCLIDE_HALF_LIFE,
                VR::DS,
                PrimitiveValue::from("6586.2"),
            ),
            DataElement::new(
                tags::RADIONUCLIDE_TOTAL_DOSE,
                VR::DS,
                PrimitiveValue::from("370000000 "),
            ),
        ]);

        InMemDicomObject::from_element_iter([
            DataElement::new(tags::PATIENT_WEIGHT, VR::DS, PrimitiveValue::from("70.5")),
            DataElement::new(tags::SERIES_TIME, VR::TM, PrimitiveValue::from("095500")),
            DataElement::new(tags::ACQUISITION_TIME, VR::TM, PrimitiveValue::from("100000")),
            DataElement::new(
                tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![dosing]),
            ),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(128_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(96_u16)),
            DataElement::new(tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from("0.25")),
        ])
    }

    #[test]
    fn collects_attributes() {
        let image = pet_image_attributes("1.2.3", &pet_object());

        assert_eq!(image.id, "1.2.3");
        assert_eq!(image.rows, Some(128));
        assert_eq!(image.columns, Some(96));
        assert_eq!(image.rescale_slope.as_deref(), Some("0.25"));
        assert_eq!(image.rescale_intercept, None);
        assert_eq!(image.number_of_frames, None);
        assert_eq!(image.patient_weight.as_deref(), Some("70.5"));
        assert_eq!(image.acquisition_time.as_deref(), Some("100000"));
        assert_eq!(image.series_time.as_deref(), Some("095500"));
        assert_eq!(image.pixel_data, PixelData::Missing);

        let dosing = image.radiopharmaceutical.unwrap();
        assert_eq!(dosing.start_time.as_deref(), Some("090000.00"));
        assert_eq!(dosing.half_life.as_deref(), Some("6586.2"));
        assert_eq!(dosing.total_dose.as_deref(), Some("370000000"));
    }

    #[test]
    fn empty_sequence_is_missing() {
        let mut obj = pet_object();
        obj.put(DataElement::new(
            tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE,
            VR::SQ,
            DataSetSequence::<InMemDicomObject>::from(Vec::new()),
        ));
        assert_eq!(radiopharmaceutical(&obj), None);

        let empty = InMemDicomObject::new_empty();
        let image = pet_image_attributes("x", &empty);
        assert_eq!(image.radiopharmaceutical, None);
        assert_eq!(image.patient_weight, None);
        assert_eq!(image.rows, None);
    }

    #[test]
    fn suv_factor_from_attributes() {
        let image = pet_image_attributes("1.2.3", &pet_object());
        let suv = crate::decay::suv_factor(&image, None).unwrap();
        assert_eq!(suv.meta.elapsed_s, 3600.);
        assert_eq!(suv.meta.patient_weight_kg, 70.5);
    }
}
