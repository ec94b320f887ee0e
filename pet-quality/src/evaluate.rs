//! Evaluation of the quality metric over a whole series.
//!
//! The stages run in a fixed order and the first failure
//! ends the evaluation of the series:
//! configuration, first instance, dynamic series policy, dimensions,
//! SUV factor, then each slice in instance order.
//! No partial result is produced from a subset of the slices.

use crate::calibrate::{calibrate_slice, mask_count, tissue_mask, CalibrateError};
use crate::config::{ConfigError, QualityConfig};
use crate::decay::{suv_factor, SuvError};
use crate::gni::gni;
use crate::image::PetImage;
use crate::noise::block_noise;
use crate::provider::ImageProvider;
use crate::result::{FailureKind, QualityParams, QualityReport, QualityResult};
use crate::series::{pet_candidates, select_series, Series};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::{debug, info, warn};

#[derive(Debug, Snafu)]
enum EvaluateError {
    #[snafu(display("Invalid configuration: {}", source))]
    InvalidConfig { source: ConfigError },

    #[snafu(display("Series has no instances"))]
    NoInstances,

    #[snafu(display("Could not read first instance {}: {}", id, message))]
    LoadFirstInstance { id: String, message: String },

    #[snafu(display("Could not read instance {}: {}", id, message))]
    LoadInstance { id: String, message: String },

    #[snafu(display("Invalid image dimensions {}x{} in series", rows, columns))]
    InvalidDimensions { rows: u32, columns: u32 },

    #[snafu(display("Could not compute SUV factor: {}", source))]
    Suv { source: SuvError },

    #[snafu(display(
        "Inconsistent dimensions in instance {}: {}x{}, expected {}x{}",
        id,
        rows,
        columns,
        expected_rows,
        expected_columns
    ))]
    InconsistentDimensions {
        id: String,
        rows: u32,
        columns: u32,
        expected_rows: u32,
        expected_columns: u32,
    },

    #[snafu(display("Pixel data not available for instance {}: {}", id, source))]
    Calibrate { id: String, source: CalibrateError },

    #[snafu(display("No valid noise blocks"))]
    NoNoiseBlocks,

    #[snafu(display("Could not compute GNI"))]
    UndefinedGni,
}

impl EvaluateError {
    fn kind(&self) -> FailureKind {
        match self {
            EvaluateError::InvalidConfig { .. } => FailureKind::Configuration,
            EvaluateError::NoNoiseBlocks | EvaluateError::UndefinedGni => FailureKind::Computation,
            _ => FailureKind::Data,
        }
    }
}


/// Running totals over the slices of a series.
#[derive(Debug, Default)]
struct NoiseAccumulator {
    samples: Vec<f64>,
    masked: usize,
    total: usize,
    slices: usize,
}

impl NoiseAccumulator {
    fn add_slice(
        &mut self,
        image: &PetImage,
        (rows, columns): (u32, u32),
        suv: f64,
        config: &QualityConfig,
    ) -> Result<(), EvaluateError> {
        let slice = calibrate_slice(image, suv).context(CalibrateSnafu {
            id: image.id.as_str(),
        })?;
        let (got_rows, got_columns) = slice.dim();
        ensure!(
            (got_rows, got_columns) == (rows as usize, columns as usize),
            InconsistentDimensionsSnafu {
                id: image.id.as_str(),
                rows: got_rows as u32,
                columns: got_columns as u32,
                expected_rows: rows,
                expected_columns: columns,
            }
        );
        let mask = tissue_mask(&slice, config.threshold);
        self.masked += mask_count(&mask);
        self.total += mask.len();
        self.slices += 1;
        self.samples.extend(block_noise(
            &slice,
            &mask,
            config.block_size,
            config.min_valid,
        ));
        Ok(())
    }

    fn coverage_pct(&self) -> f64 {
        if self.total == 0 {
            0.
        } else {
            100. * self.masked as f64 / self.total as f64
        }
    }
}

/// Evaluate the quality metric of one series.
///
/// Retrieval failures, invalid data and an unusable configuration
/// are all reported in the returned [`QualityResult`].
pub fn evaluate_series<P>(provider: &P, series: &Series, config: &QualityConfig) -> QualityResult
where
    P: ImageProvider + ?Sized,
{
    if !config.enabled {
        debug!("Quality metrics disabled, skipping series {}", series.uid);
        return QualityResult::Disabled;
    }

    match run(provider, series, config) {
        Ok(result) => {
            match &result {
                QualityResult::Ok(report) => info!(
                    "Series {}: GNI {} over {} blocks in {} slices ({:.1}% coverage)",
                    series.uid, report.gni, report.noise_blocks, report.slices, report.coverage_pct
                ),
                other => debug!("Series {}: {}", series.uid, other.status()),
            }
            result
        }
        Err(e) => {
            warn!("Series {}: {}", series.uid, e);
            QualityResult::failure(e.kind(), e.to_string())
        }
    }
}

fn run<P>(
    provider: &P,
    series: &Series,
    config: &QualityConfig,
) -> Result<QualityResult, EvaluateError>
where
    P: ImageProvider + ?Sized,
{
    config.validate().context(InvalidConfigSnafu)?;

    let (first_ref, rest) = series.instances.split_first().context(NoInstancesSnafu)?;
    let first = provider
        .load_image(first_ref)
        .map_err(|e| EvaluateError::LoadFirstInstance {
            id: first_ref.id.clone(),
            message: e.to_string(),
        })?;

    if config.skip_dynamic && first.is_multi_frame() {
        let frames = first.frames().unwrap_or_default();
        debug!(
            "Series {} is dynamic ({} frames in {})",
            series.uid, frames, first.id
        );
        return Ok(QualityResult::skipped_dynamic(frames));
    }

    let (rows, columns) = first.dimensions().context(InvalidDimensionsSnafu {
        rows: first.rows.unwrap_or(0),
        columns: first.columns.unwrap_or(0),
    })?;

    let suv = suv_factor(&first, config.max_elapsed_seconds).context(SuvSnafu)?;

    let mut noise = NoiseAccumulator::default();
    noise.add_slice(&first, (rows, columns), suv.factor, config)?;
    drop(first);

    for instance in rest {
        let image = provider
            .load_image(instance)
            .map_err(|e| EvaluateError::LoadInstance {
                id: instance.id.clone(),
                message: e.to_string(),
            })?;

        // a missing dimension is taken to be the series dimension
        let slice_rows = image.rows.filter(|&r| r > 0).unwrap_or(rows);
        let slice_columns = image.columns.filter(|&c| c > 0).unwrap_or(columns);
        ensure!(
            (slice_rows, slice_columns) == (rows, columns),
            InconsistentDimensionsSnafu {
                id: instance.id.as_str(),
                rows: slice_rows,
                columns: slice_columns,
                expected_rows: rows,
                expected_columns: columns,
            }
        );

        noise.add_slice(&image, (rows, columns), suv.factor, config)?;
    }

    ensure!(!noise.samples.is_empty(), NoNoiseBlocksSnafu);
    let gni = gni(&noise.samples, config.bins).context(UndefinedGniSnafu)?;

    Ok(QualityResult::Ok(QualityReport {
        gni,
        coverage_pct: noise.coverage_pct(),
        slices: noise.slices,
        noise_blocks: noise.samples.len(),
        params: QualityParams::from(config),
        suv_meta: suv.meta,
    }))
}

/// The series chosen for a study and the outcome of its evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyEvaluation {
    pub series: Series,
    pub result: QualityResult,
}

/// Select the PET series of a study and evaluate it.
///
/// Returns `Ok(None)` if the study has no non-empty PET series.
/// Only a failure to list the series of the study is returned as an error.
pub fn evaluate_study<P>(
    provider: &P,
    study: &str,
    config: &QualityConfig,
) -> Result<Option<StudyEvaluation>, P::Error>
where
    P: ImageProvider + ?Sized,
{
    let candidates = pet_candidates(provider.list_series(study)?);
    let Some(series) = select_series(&candidates) else {
        debug!("Study {} has no PET series", study);
        return Ok(None);
    };

    let result = evaluate_series(provider, series, config);
    Ok(Some(StudyEvaluation {
        series: series.clone(),
        result,
    }))
}
