//! This crate computes the global noise index (GNI),
//! an image quality metric of PET series.
//!
//! For each study, one PET series is chosen
//! by reconstruction protocol and number of instances.
//! Each slice of the series is converted to SUV (body weight),
//! a tissue mask is taken by thresholding,
//! and the standard deviation of small pixel blocks
//! inside the mask is collected as a noise sample.
//! The GNI is the center of the most populated bin
//! of the histogram of all noise samples.
//!
//! Series and images are obtained through an [`ImageProvider`].
//! [`DirectoryProvider`] indexes a directory of DICOM files.
//!
//! # Example
//!
//! ```no_run
//! use dicom_pet_quality::{evaluate_study, DirectoryProvider, QualityConfig};
//!
//! let provider = DirectoryProvider::scan("studies/")?;
//! let config = QualityConfig::new();
//! for study in provider.studies() {
//!     if let Some(evaluation) = evaluate_study(&provider, &study.uid, &config)? {
//!         println!(
//!             "{}: {} ({:?})",
//!             evaluation.series.uid,
//!             evaluation.result.status(),
//!             evaluation.result.gni()
//!         );
//!     }
//! }
//! # Ok::<(), dicom_pet_quality::fs::Error>(())
//! ```
//!
//! Evaluation never fails as such:
//! every outcome, including missing data and unusable parameters,
//! is described by a [`QualityResult`].

pub mod attribute;
pub mod calibrate;
pub mod config;
pub mod decay;
pub mod evaluate;
pub mod fs;
pub mod gni;
pub mod image;
pub mod noise;
pub mod provider;
pub mod result;
pub mod series;

pub use crate::config::{Bins, ConfigError, QualityConfig};
pub use crate::decay::{parse_time, suv_factor, SuvError, SuvFactor, SuvMeta};
pub use crate::evaluate::{evaluate_series, evaluate_study, StudyEvaluation};
pub use crate::fs::{DirectoryProvider, StudyInfo};
pub use crate::image::{PetImage, PixelData, RadiopharmaceuticalInfo};
pub use crate::provider::ImageProvider;
pub use crate::result::{FailureKind, QualityFailure, QualityParams, QualityReport, QualityResult};
pub use crate::series::{pet_candidates, select_series, InstanceRef, Series};
