//! Body-weight SUV conversion factor with radiotracer decay correction.
//!
//! The factor converts an activity concentration in Bq/ml
//! into a body-weight standardized uptake value:
//!
//! ```text
//! k = weight_g / (total_dose * exp(-ln(2) / half_life * Δt))
//! ```
//!
//! where `Δt` is the time elapsed between the radiopharmaceutical
//! injection and the start of the acquisition.

use crate::image::PetImage;
use chrono::NaiveTime;
use serde::{Serialize, Serializer};
use snafu::{ensure, OptionExt, Snafu};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum SuvError {
    #[snafu(display("Missing PatientWeight (0010,1030)"))]
    MissingPatientWeight,

    #[snafu(display("Invalid PatientWeight `{}`", value))]
    InvalidPatientWeight { value: String },

    #[snafu(display("Missing RadiopharmaceuticalInformationSequence (0054,0016)"))]
    MissingRadiopharmaceuticalInformation,

    #[snafu(display("Missing RadionuclideHalfLife or RadionuclideTotalDose"))]
    MissingRadionuclideInformation,

    #[snafu(display(
        "Invalid radionuclide information: half life `{}`, total dose `{}`",
        half_life,
        total_dose
    ))]
    InvalidRadionuclideInformation {
        half_life: String,
        total_dose: String,
    },

    #[snafu(display("Missing AcquisitionTime/SeriesTime"))]
    MissingAcquisitionTime,

    #[snafu(display("Missing RadiopharmaceuticalStartTime"))]
    MissingInjectionTime,

    #[snafu(display(
        "Time between injection ({}) and acquisition ({}) is {} s, beyond the bound of {} s",
        injection_time,
        acquisition_time,
        elapsed,
        bound
    ))]
    ElapsedTimeOutOfBounds {
        injection_time: NaiveTime,
        acquisition_time: NaiveTime,
        elapsed: f64,
        bound: f64,
    },

    #[snafu(display("SUV factor {} is not a positive finite number", factor))]
    DegenerateFactor { factor: f64 },
}

pub type Result<T, E = SuvError> = std::result::Result<T, E>;

/// Parse a DICOM time in either `HH:MM:SS[.frac]` or `HHMMSS[.frac]` form.
///
/// Fractional seconds are truncated.
/// Returns `None` if the text is empty, malformed or out of range.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let whole = value.trim().split('.').next()?;
    if whole.contains(':') {
        return NaiveTime::parse_from_str(whole, "%H:%M:%S").ok();
    }

    if whole.len() < 6 || !whole.bytes().take(6).all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::parse_from_str(&whole[..6], "%H%M%S").ok()
}

fn serialize_time<S>(time: &NaiveTime, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(time)
}

/// The dosing information of a series, already validated.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DosingContext {
    /// Patient body weight in kilograms
    pub weight_kg: f64,
    /// Injected activity at the injection time, in Becquerel
    pub total_dose_bq: f64,
    /// Radionuclide half life, in seconds
    pub half_life_s: f64,
    /// Radiopharmaceutical start time
    pub injection_time: NaiveTime,
    /// Acquisition (or series) start time
    pub acquisition_time: NaiveTime,
}

impl DosingContext {
    /// Seconds from injection to acquisition.
    /// Negative if the acquisition time is earlier in the day.
    pub fn elapsed_seconds(&self) -> f64 {
        self.acquisition_time
            .signed_duration_since(self.injection_time)
            .num_seconds() as f64
    }

    /// Compute the SUV factor and its audit record.
    pub fn suv_factor(&self) -> Result<SuvFactor> {
        let elapsed = self.elapsed_seconds();
        let activity = decay_corrected_activity(self.total_dose_bq, self.half_life_s, elapsed);
        let factor = self.weight_kg * 1000. / activity;
        ensure!(
            factor.is_finite() && factor > 0.,
            DegenerateFactorSnafu { factor }
        );

        Ok(SuvFactor {
            factor,
            meta: SuvMeta {
                patient_weight_kg: self.weight_kg,
                total_dose_bq: self.total_dose_bq,
                half_life_s: self.half_life_s,
                elapsed_s: elapsed,
                activity_at_acquisition_bq: activity,
                acquisition_time: self.acquisition_time,
                injection_time: self.injection_time,
            },
        })
    }
}

/// Activity remaining after `elapsed` seconds of decay.
pub fn decay_corrected_activity(total_dose_bq: f64, half_life_s: f64, elapsed_s: f64) -> f64 {
    let lambda = std::f64::consts::LN_2 / half_life_s;
    total_dose_bq * (-lambda * elapsed_s).exp()
}

/// Inputs and intermediate values of an SUV factor computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuvMeta {
    #[serde(rename = "PatientWeight_kg")]
    pub patient_weight_kg: f64,
    #[serde(rename = "Ainj_Bq")]
    pub total_dose_bq: f64,
    #[serde(rename = "HalfLife_s")]
    pub half_life_s: f64,
    #[serde(rename = "Delta_t_s")]
    pub elapsed_s: f64,
    #[serde(rename = "Ainj_START_Bq")]
    pub activity_at_acquisition_bq: f64,
    #[serde(rename = "AcqTime", serialize_with = "serialize_time")]
    pub acquisition_time: NaiveTime,
    #[serde(rename = "InjTime", serialize_with = "serialize_time")]
    pub injection_time: NaiveTime,
}

/// A body-weight SUV conversion factor, in g/Bq.
#[derive(Debug, Clone, PartialEq)]
pub struct SuvFactor {
    pub factor: f64,
    pub meta: SuvMeta,
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.)
}

/// Gather and validate the dosing information of an image.
///
/// Attributes are checked in a fixed order and the first one
/// missing or invalid is reported.
pub fn dosing_context(image: &PetImage) -> Result<DosingContext> {
    let weight = image
        .patient_weight
        .as_deref()
        .context(MissingPatientWeightSnafu)?;
    let weight_kg = positive(parse_number(weight))
        .context(InvalidPatientWeightSnafu { value: weight })?;

    let radiopharmaceutical = image
        .radiopharmaceutical
        .as_ref()
        .context(MissingRadiopharmaceuticalInformationSnafu)?;

    let (half_life, total_dose) = match (
        radiopharmaceutical.half_life.as_deref(),
        radiopharmaceutical.total_dose.as_deref(),
    ) {
        (Some(h), Some(d)) => (h, d),
        _ => return MissingRadionuclideInformationSnafu.fail(),
    };
    let (half_life_s, total_dose_bq) = positive(parse_number(half_life))
        .zip(positive(parse_number(total_dose)))
        .context(InvalidRadionuclideInformationSnafu {
            half_life,
            total_dose,
        })?;

    let acquisition_time = image
        .acquisition_time
        .as_deref()
        .and_then(parse_time)
        .or_else(|| image.series_time.as_deref().and_then(parse_time))
        .context(MissingAcquisitionTimeSnafu)?;

    let injection_time = radiopharmaceutical
        .start_time
        .as_deref()
        .and_then(parse_time)
        .context(MissingInjectionTimeSnafu)?;

    Ok(DosingContext {
        weight_kg,
        total_dose_bq,
        half_life_s,
        injection_time,
        acquisition_time,
    })
}

/// Compute the SUV factor of a series from its first image.
///
/// If `max_elapsed_seconds` is given, an injection to acquisition
/// interval larger than the bound in absolute value is rejected.
pub fn suv_factor(image: &PetImage, max_elapsed_seconds: Option<f64>) -> Result<SuvFactor> {
    let dosing = dosing_context(image)?;

    if let Some(bound) = max_elapsed_seconds {
        let elapsed = dosing.elapsed_seconds();
        ensure!(
            elapsed.abs() <= bound,
            ElapsedTimeOutOfBoundsSnafu {
                injection_time: dosing.injection_time,
                acquisition_time: dosing.acquisition_time,
                elapsed,
                bound,
            }
        );
    }

    let suv = dosing.suv_factor()?;
    debug!(
        "SUV factor {} from instance {} (Δt = {} s)",
        suv.factor, image.id, suv.meta.elapsed_s
    );
    Ok(suv)
}
