//! Evaluation parameters for the quality metric.
//!
//! All thresholds and switches are held in one [`QualityConfig`] value
//! which is passed explicitly to the evaluation functions.

use serde::{Serialize, Serializer};
use snafu::{ensure, Snafu};
use std::fmt;
use std::str::FromStr;

use crate::gni::MAX_BINS;

/// Default SUV threshold for the tissue mask.
pub const DEFAULT_THRESHOLD: f64 = 0.07;
/// Default block side length, in pixels.
pub const DEFAULT_BLOCK_SIZE: usize = 6;
/// Default minimum number of masked pixels per block.
pub const DEFAULT_MIN_VALID: usize = 12;
/// Default bound on the injection to acquisition interval (12 hours).
pub const DEFAULT_MAX_ELAPSED_SECONDS: f64 = 12. * 3600.;

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum ConfigError {
    #[snafu(display("SUV threshold must be a finite number, got {}", value))]
    InvalidThreshold { value: f64 },

    #[snafu(display("Block size must be a positive integer"))]
    ZeroBlockSize,

    #[snafu(display(
        "Minimum valid pixels must be between 1 and {} for block size {}, got {}",
        block_size * block_size,
        block_size,
        min_valid
    ))]
    InvalidMinValid { min_valid: usize, block_size: usize },

    #[snafu(display("Histogram bin count must be positive"))]
    ZeroBinCount,

    #[snafu(display("Histogram bin count must be at most {}, got {}", max, count))]
    TooManyBins { count: usize, max: usize },

    #[snafu(display("Elapsed time bound must be a positive number of seconds, got {}", value))]
    InvalidElapsedBound { value: f64 },
}

/// Could not parse a histogram binning rule
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display(
    "Unrecognized histogram bins `{}` (expected a positive count or one of auto, fd, sturges, sqrt, rice, scott)",
    value
))]
pub struct ParseBinsError {
    value: String,
}

/// Histogram binning rule for the noise sample histogram.
///
/// The automatic rules derive a bin width from the samples
/// in the same way as `numpy.histogram_bin_edges`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Bins {
    /// A fixed number of equal-width bins
    Count(usize),
    /// Maximum of the Sturges and Freedman-Diaconis bin counts
    Auto,
    /// Freedman-Diaconis estimator, robust to outliers
    Fd,
    /// Sturges' formula
    Sturges,
    /// Square root of the sample count
    Sqrt,
    /// Rice rule
    Rice,
    /// Scott's normal reference rule
    Scott,
}

impl Default for Bins {
    fn default() -> Self {
        Bins::Fd
    }
}

impl fmt::Display for Bins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bins::Count(n) => write!(f, "{}", n),
            Bins::Auto => f.write_str("auto"),
            Bins::Fd => f.write_str("fd"),
            Bins::Sturges => f.write_str("sturges"),
            Bins::Sqrt => f.write_str("sqrt"),
            Bins::Rice => f.write_str("rice"),
            Bins::Scott => f.write_str("scott"),
        }
    }
}

impl FromStr for Bins {
    type Err = ParseBinsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(count) = s.parse::<usize>() {
            ensure!(count > 0, ParseBinsSnafu { value: s });
            return Ok(Bins::Count(count));
        }
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Bins::Auto),
            "fd" => Ok(Bins::Fd),
            "sturges" => Ok(Bins::Sturges),
            "sqrt" => Ok(Bins::Sqrt),
            "rice" => Ok(Bins::Rice),
            "scott" => Ok(Bins::Scott),
            _ => ParseBinsSnafu { value: s }.fail(),
        }
    }
}

impl Serialize for Bins {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Bins::Count(n) => serializer.serialize_u64(*n as u64),
            rule => serializer.collect_str(rule),
        }
    }
}

/// Parameters of a quality evaluation.
///
/// The default value reproduces the settings of the clinical pipeline:
/// an SUV threshold of 0.07, 6x6 blocks with at least 12 valid pixels,
/// Freedman-Diaconis binning, and dynamic series skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityConfig {
    /// Whether quality metrics are computed at all
    pub enabled: bool,
    /// Calibrated value above which a pixel belongs to the tissue mask
    pub threshold: f64,
    /// Side length of the square noise blocks, in pixels
    pub block_size: usize,
    /// Minimum number of masked pixels for a block to be used
    pub min_valid: usize,
    /// Histogram binning rule for the GNI
    pub bins: Bins,
    /// Whether multi-frame (dynamic) series are skipped
    pub skip_dynamic: bool,
    /// Maximum absolute time between injection and acquisition,
    /// or `None` to accept any interval
    pub max_elapsed_seconds: Option<f64>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            block_size: DEFAULT_BLOCK_SIZE,
            min_valid: DEFAULT_MIN_VALID,
            bins: Bins::Fd,
            skip_dynamic: true,
            max_elapsed_seconds: Some(DEFAULT_MAX_ELAPSED_SECONDS),
        }
    }
}

impl QualityConfig {
    /// Create a configuration with the default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn the metric on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the tissue mask threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the block side length and the minimum valid pixel count.
    pub fn with_blocks(mut self, block_size: usize, min_valid: usize) -> Self {
        self.block_size = block_size;
        self.min_valid = min_valid;
        self
    }

    /// Set the histogram binning rule.
    pub fn with_bins(mut self, bins: Bins) -> Self {
        self.bins = bins;
        self
    }

    /// Choose whether dynamic series are skipped.
    pub fn skip_dynamic(mut self, skip: bool) -> Self {
        self.skip_dynamic = skip;
        self
    }

    /// Set the bound on the injection to acquisition interval.
    pub fn with_max_elapsed_seconds(mut self, bound: Option<f64>) -> Self {
        self.max_elapsed_seconds = bound;
        self
    }

    /// Check that all parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.threshold.is_finite(),
            InvalidThresholdSnafu {
                value: self.threshold
            }
        );
        ensure!(self.block_size > 0, ZeroBlockSizeSnafu);
        ensure!(
            self.min_valid > 0 && self.min_valid <= self.block_size * self.block_size,
            InvalidMinValidSnafu {
                min_valid: self.min_valid,
                block_size: self.block_size,
            }
        );
        ensure!(self.bins != Bins::Count(0), ZeroBinCountSnafu);
        if let Bins::Count(count) = self.bins {
            ensure!(
                count <= MAX_BINS,
                TooManyBinsSnafu {
                    count,
                    max: MAX_BINS
                }
            );
        }
        if let Some(bound) = self.max_elapsed_seconds {
            ensure!(
                bound.is_finite() && bound > 0.,
                InvalidElapsedBoundSnafu { value: bound }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = QualityConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.block_size, 6);
        assert_eq!(config.min_valid, 12);
        assert_eq!(config.bins, Bins::Fd);
    }

    #[test]
    fn rejects_bad_parameters() {
        let config = QualityConfig::new().with_blocks(0, 1);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBlockSize));

        let config = QualityConfig::new().with_blocks(4, 17);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMinValid { min_valid: 17, .. })
        ));
        // exactly block² is allowed
        assert_eq!(QualityConfig::new().with_blocks(4, 16).validate(), Ok(()));

        let config = QualityConfig::new().with_bins(Bins::Count(usize::MAX));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyBins { max: MAX_BINS, .. })
        ));

        let config = QualityConfig::new().with_threshold(f64::NAN);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));

        let config = QualityConfig::new().with_max_elapsed_seconds(Some(-1.));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidElapsedBound { .. })
        ));
        assert_eq!(
            QualityConfig::new()
                .with_max_elapsed_seconds(None)
                .validate(),
            Ok(())
        );
    }

    #[test]
    fn parse_bins() {
        assert_eq!("fd".parse(), Ok(Bins::Fd));
        assert_eq!(" Sturges ".parse(), Ok(Bins::Sturges));
        assert_eq!("auto".parse(), Ok(Bins::Auto));
        assert_eq!("25".parse(), Ok(Bins::Count(25)));
        assert!("0".parse::<Bins>().is_err());
        assert!("doane".parse::<Bins>().is_err());
        assert!("".parse::<Bins>().is_err());

        assert_eq!(Bins::Count(25).to_string(), "25");
        assert_eq!(Bins::Scott.to_string(), "scott");
    }
}
