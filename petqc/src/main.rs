//! A CLI tool for computing the global noise index (GNI)
//! of the PET studies in a directory of DICOM files.
//!
//! One JSON document is produced per study,
//! describing the selected PET series and its quality metric.
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use dicom_pet_quality::{
    evaluate_series, pet_candidates, select_series, Bins, DirectoryProvider, ImageProvider,
    QualityConfig, QualityResult, Series, StudyEvaluation, StudyInfo,
};
use serde::Serialize;
use snafu::{Report, ResultExt, Snafu, Whatever};
use tracing::{debug, error, info, warn, Level};

/// Compute the PET image quality metric of DICOM studies
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// Directory containing the DICOM files
    dir: PathBuf,

    /// Directory to write one JSON file per study
    /// (default is to print all documents to stdout)
    #[arg(short = 'o', long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Only evaluate studies whose description contains this text
    #[arg(long = "study-description", env = "STUDY_DESCRIPTION", default_value = "")]
    study_description: String,

    /// Whether to compute quality metrics
    #[arg(
        long = "quality-metrics",
        env = "QUALITY_METRICS_ENABLED",
        default_value = "true",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    quality_metrics: bool,

    /// SUV threshold of the tissue mask
    #[arg(long = "thr-suv", env = "QUALITY_THR_SUV", default_value = "0.07")]
    thr_suv: f64,

    /// Side length of the noise blocks, in pixels
    #[arg(long = "block", env = "QUALITY_BLOCK", default_value = "6")]
    block: usize,

    /// Minimum number of tissue pixels in a noise block
    #[arg(long = "min-valid", env = "QUALITY_MIN_VALID", default_value = "12")]
    min_valid: usize,

    /// Histogram bins: a number,
    /// or one of auto, fd, sturges, sqrt, rice, scott
    #[arg(long = "bins", env = "QUALITY_BINS", default_value = "fd")]
    bins: Bins,

    /// Whether to skip dynamic (multi-frame) series
    #[arg(
        long = "skip-dynamic",
        env = "SKIP_DYNAMIC_PET",
        default_value = "true",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    skip_dynamic: bool,

    /// Maximum time between injection and acquisition, in seconds
    #[arg(long = "max-elapsed", default_value = "43200", conflicts_with = "no_elapsed_bound")]
    max_elapsed: f64,

    /// Accept any time between injection and acquisition
    #[arg(long = "no-elapsed-bound")]
    no_elapsed_bound: bool,

    /// Print more information about the evaluation
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl App {
    fn config(&self) -> QualityConfig {
        QualityConfig::new()
            .enabled(self.quality_metrics)
            .with_threshold(self.thr_suv)
            .with_blocks(self.block, self.min_valid)
            .with_bins(self.bins)
            .skip_dynamic(self.skip_dynamic)
            .with_max_elapsed_seconds((!self.no_elapsed_bound).then_some(self.max_elapsed))
    }
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Could not scan {}", path.display()))]
    Scan {
        path: PathBuf,
        source: dicom_pet_quality::fs::Error,
    },

    #[snafu(display("Could not create output directory {}", path.display()))]
    CreateOutDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not serialize document"))]
    Serialize { source: serde_json::Error },

    #[snafu(display("Could not write {}", path.display()))]
    WriteDocument {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct PatientDoc<'a> {
    patient_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StudyDoc<'a> {
    study_instance_uid: &'a str,
    study_description: &'a str,
}

#[derive(Debug, Serialize)]
struct SeriesDoc<'a> {
    series_instance_uid: &'a str,
    modality: &'a str,
    series_number: Option<i32>,
}

#[derive(Debug, Serialize)]
struct InstanceDoc<'a> {
    sop_instance_uid: Option<&'a str>,
    dicom_tags: serde_json::Value,
}

/// The output document of one study
#[derive(Debug, Serialize)]
struct StudyDocument<'a> {
    patient: PatientDoc<'a>,
    study: StudyDoc<'a>,
    series: SeriesDoc<'a>,
    first_instance: InstanceDoc<'a>,
    pet_quality: &'a QualityResult,
}

fn main() {
    run().unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-2);
    });
}

fn run() -> Result<(), Error> {
    let app = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if app.verbose { Level::DEBUG } else { Level::INFO })
            .with_writer(std::io::stderr)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    let config = app.config();
    if let Err(e) = config.validate() {
        // reported in each study document
        warn!("{}", e);
    }

    let provider = DirectoryProvider::scan(&app.dir).context(ScanSnafu { path: &app.dir })?;

    if let Some(out_dir) = &app.out_dir {
        std::fs::create_dir_all(out_dir).context(CreateOutDirSnafu { path: out_dir })?;
    }

    let mut written = 0;
    for study in provider.studies() {
        if !study.matches_description(&app.study_description) {
            debug!("Skipping study {} ({:?})", study.uid, study.description);
            continue;
        }

        let series = match provider.list_series(&study.uid) {
            Ok(series) => pet_candidates(series),
            Err(e) => {
                warn!("Study {}: {}", study.uid, Report::from_error(e));
                continue;
            }
        };
        let Some(series) = select_series(&series) else {
            debug!("Study {} has no PET series", study.uid);
            continue;
        };

        let path = app
            .out_dir
            .as_ref()
            .map(|out_dir| out_dir.join(file_name(study, series)));
        if let Some(path) = path.as_ref().filter(|p| p.exists()) {
            info!("{} already exists, skipping", path.display());
            continue;
        }

        let evaluation = StudyEvaluation {
            series: series.clone(),
            result: evaluate_series(&provider, series, &config),
        };
        let document = study_document(&provider, study, &evaluation);
        let json = serde_json::to_string_pretty(&document).context(SerializeSnafu)?;

        match path {
            Some(path) => {
                std::fs::write(&path, json).context(WriteDocumentSnafu { path: &path })?;
                debug!("Written {}", path.display());
            }
            None => println!("{}", json),
        }
        written += 1;
    }

    info!("{} PET documents exported", written);
    Ok(())
}

fn study_document<'a>(
    provider: &'a DirectoryProvider,
    study: &'a StudyInfo,
    evaluation: &'a StudyEvaluation,
) -> StudyDocument<'a> {
    let series = &evaluation.series;
    let first = series.instances.first();

    let dicom_tags = match first.map(|instance| provider.open_header(instance)) {
        Some(Ok(header)) => dicom_json::to_value(&*header).unwrap_or_else(|e| {
            warn!("Could not convert header to JSON: {}", e);
            serde_json::Value::Null
        }),
        Some(Err(e)) => {
            warn!("{}", Report::from_error(e));
            serde_json::Value::Null
        }
        None => serde_json::Value::Null,
    };

    StudyDocument {
        patient: PatientDoc {
            patient_name: study.patient_name.as_deref(),
        },
        study: StudyDoc {
            study_instance_uid: &study.uid,
            study_description: &study.description,
        },
        series: SeriesDoc {
            series_instance_uid: &series.uid,
            modality: &series.modality,
            series_number: series.number,
        },
        first_instance: InstanceDoc {
            sop_instance_uid: first.and_then(|instance| provider.sop_instance_uid(instance)),
            dicom_tags,
        },
        pet_quality: &evaluation.result,
    }
}

/// `Serie{NNN}_PET_{patient}_{study}.json`,
/// with `NA` in place of an unknown series number.
fn file_name(study: &StudyInfo, series: &Series) -> String {
    let number = match series.number {
        Some(n) if n >= 0 => format!("{:03}", n),
        _ => "NA".to_string(),
    };
    format!(
        "Serie{}_PET_{}_{}.json",
        number,
        sanitize(study.patient_name.as_deref().unwrap_or("NA")),
        sanitize(&study.uid)
    )
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use dicom_pet_quality::InstanceRef;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }

    fn series(number: Option<i32>) -> Series {
        Series {
            uid: "1.2.3.4".to_string(),
            modality: "PT".to_string(),
            description: "PET-AC".to_string(),
            number,
            instances: vec![InstanceRef::new("a.dcm")],
        }
    }

    #[test]
    fn output_file_names() {
        let study = StudyInfo {
            uid: "1.2.3".to_string(),
            description: "PET-CT".to_string(),
            patient_name: Some("Doe^Jane".to_string()),
        };
        assert_eq!(
            file_name(&study, &series(Some(7))),
            "Serie007_PET_Doe^Jane_1.2.3.json"
        );
        assert_eq!(
            file_name(&study, &series(None)),
            "SerieNA_PET_Doe^Jane_1.2.3.json"
        );

        let study = StudyInfo {
            patient_name: Some("a/b".to_string()),
            ..study
        };
        assert_eq!(
            file_name(&study, &series(Some(1204))),
            "Serie1204_PET_a_b_1.2.3.json"
        );
    }

    #[test]
    fn config_from_arguments() {
        let app = App::parse_from(["petqc", "data", "--bins", "50", "--block", "8"]);
        let config = app.config();
        assert_eq!(config.bins, Bins::Count(50));
        assert_eq!(config.block_size, 8);
        assert_eq!(config.min_valid, 12);
        assert_eq!(config.max_elapsed_seconds, Some(43200.));
        assert!(config.enabled);

        let app = App::parse_from(["petqc", "data", "--skip-dynamic", "0", "--no-elapsed-bound"]);
        let config = app.config();
        assert!(!config.skip_dynamic);
        assert!(config.enabled);
        assert_eq!(config.max_elapsed_seconds, None);
    }

    #[test]
    fn boolean_settings_take_a_value() {
        let app = App::try_parse_from([
            "petqc",
            "data",
            "--skip-dynamic",
            "false",
            "--quality-metrics",
            "no",
        ])
        .unwrap();
        let config = app.config();
        assert!(!config.skip_dynamic);
        assert!(!config.enabled);

        let app =
            App::try_parse_from(["petqc", "data", "--quality-metrics", "1", "--skip-dynamic", "yes"])
                .unwrap();
        let config = app.config();
        assert!(config.enabled);
        assert!(config.skip_dynamic);

        assert!(App::try_parse_from(["petqc", "data", "--skip-dynamic", "maybe"]).is_err());
    }
}
