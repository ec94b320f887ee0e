//! An [`ImageProvider`] over a directory tree of DICOM files.
//!
//! Headers are read once when scanning,
//! pixel data is only read when an image is loaded.

use crate::attribute::{pet_image, signed, text};
use crate::image::PetImage;
use crate::provider::ImageProvider;
use crate::series::{InstanceRef, Series};
use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject, OpenFileOptions};
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Could not access directory {}", path.display()))]
    ReadRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unknown study {}", uid))]
    UnknownStudy { uid: String },

    #[snafu(display("Unknown instance {}", id))]
    UnknownInstance { id: String },

    #[snafu(display("Could not open DICOM file {}", path.display()))]
    OpenFile {
        path: PathBuf,
        source: dicom_object::ReadError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Identification of a study found in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyInfo {
    /// _Study Instance UID_
    pub uid: String,
    /// _Study Description_, empty if absent
    pub description: String,
    /// _Patient's Name_, if present
    pub patient_name: Option<String>,
}

impl StudyInfo {
    /// Whether the study description contains `filter`, ignoring case.
    ///
    /// An empty filter matches every study.
    pub fn matches_description(&self, filter: &str) -> bool {
        let filter = filter.trim();
        filter.is_empty()
            || self
                .description
                .to_lowercase()
                .contains(&filter.to_lowercase())
    }
}

#[derive(Debug)]
struct InstanceEntry {
    path: PathBuf,
    sop_instance_uid: Option<String>,
}

#[derive(Debug)]
struct SeriesEntry {
    series: Series,
    // file of each instance, parallel to `series.instances`
    paths: Vec<PathBuf>,
}

/// Series and images indexed from the DICOM files under a directory.
#[derive(Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
    studies: Vec<StudyInfo>,
    series: HashMap<String, Vec<Series>>,
    instances: HashMap<String, InstanceEntry>,
}

impl DirectoryProvider {
    /// Index all DICOM files under `root`.
    ///
    /// Files which cannot be read as DICOM,
    /// or which have no study or series instance UID,
    /// are skipped with a warning.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::metadata(root).context(ReadRootSnafu { path: root })?;

        let mut studies: BTreeMap<String, StudyInfo> = BTreeMap::new();
        let mut series: BTreeMap<String, BTreeMap<String, SeriesEntry>> = BTreeMap::new();
        let mut instances = HashMap::new();

        let files = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Could not walk directory: {}", e);
                    None
                }
            })
            .filter(|entry| !entry.file_type().is_dir());

        for file in files {
            let path = file.into_path();
            let header = match OpenFileOptions::new()
                .read_until(tags::PIXEL_DATA)
                .open_file(&path)
            {
                Ok(header) => header,
                Err(e) => {
                    warn!(
                        "Skipping {}: {}",
                        path.display(),
                        snafu::Report::from_error(e)
                    );
                    continue;
                }
            };

            let (Some(study_uid), Some(series_uid)) = (
                text(&header, tags::STUDY_INSTANCE_UID),
                text(&header, tags::SERIES_INSTANCE_UID),
            ) else {
                warn!("Skipping {}: no study or series instance UID", path.display());
                continue;
            };

            studies
                .entry(study_uid.clone())
                .or_insert_with(|| StudyInfo {
                    uid: study_uid.clone(),
                    description: text(&header, tags::STUDY_DESCRIPTION).unwrap_or_default(),
                    patient_name: text(&header, tags::PATIENT_NAME),
                });

            let entry = series
                .entry(study_uid)
                .or_default()
                .entry(series_uid.clone())
                .or_insert_with(|| SeriesEntry {
                    series: Series {
                        uid: series_uid,
                        modality: text(&header, tags::MODALITY).unwrap_or_default(),
                        description: text(&header, tags::SERIES_DESCRIPTION).unwrap_or_default(),
                        number: signed(&header, tags::SERIES_NUMBER),
                        instances: Vec::new(),
                    },
                    paths: Vec::new(),
                });

            let id = path.to_string_lossy().into_owned();
            entry.series.instances.push(InstanceRef {
                id: id.clone(),
                instance_number: signed(&header, tags::INSTANCE_NUMBER),
            });
            entry.paths.push(path.clone());
            instances.insert(
                id,
                InstanceEntry {
                    path,
                    sop_instance_uid: text(&header, tags::SOP_INSTANCE_UID),
                },
            );
        }

        let series: HashMap<_, _> = series
            .into_iter()
            .map(|(study, entries)| {
                let mut list: Vec<Series> = entries.into_values().map(order_instances).collect();
                list.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.uid.cmp(&b.uid)));
                (study, list)
            })
            .collect();

        debug!(
            "Indexed {} instances in {} studies under {}",
            instances.len(),
            studies.len(),
            root.display()
        );

        Ok(DirectoryProvider {
            root: root.to_path_buf(),
            studies: studies.into_values().collect(),
            series,
            instances,
        })
    }

    /// The directory which was scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The studies found, ordered by study instance UID.
    pub fn studies(&self) -> &[StudyInfo] {
        &self.studies
    }

    /// The path of the file holding an instance.
    pub fn path_of(&self, instance: &InstanceRef) -> Option<&Path> {
        self.instances
            .get(&instance.id)
            .map(|entry| entry.path.as_path())
    }

    /// The _SOP Instance UID_ of an instance, if recorded in its file.
    pub fn sop_instance_uid(&self, instance: &InstanceRef) -> Option<&str> {
        self.instances
            .get(&instance.id)
            .and_then(|entry| entry.sop_instance_uid.as_deref())
    }

    /// Read the attributes of an instance, without its pixel data.
    pub fn open_header(&self, instance: &InstanceRef) -> Result<DefaultDicomObject> {
        let path = self.resolve(instance)?;
        OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .context(OpenFileSnafu { path })
    }

    fn resolve(&self, instance: &InstanceRef) -> Result<&Path> {
        self.path_of(instance).context(UnknownInstanceSnafu {
            id: instance.id.as_str(),
        })
    }
}

/// Sort instances by instance number, then by path.
/// Instances without a number come last.
fn order_instances(entry: SeriesEntry) -> Series {
    let SeriesEntry { mut series, paths } = entry;
    let mut instances: Vec<(InstanceRef, PathBuf)> =
        series.instances.into_iter().zip(paths).collect();
    instances.sort_by(|(a, pa), (b, pb)| {
        let key = |i: &InstanceRef| (i.instance_number.is_none(), i.instance_number);
        key(a).cmp(&key(b)).then_with(|| pa.cmp(pb))
    });
    series.instances = instances.into_iter().map(|(i, _)| i).collect();
    series
}

impl ImageProvider for DirectoryProvider {
    type Error = Error;

    fn list_series(&self, study: &str) -> Result<Vec<Series>> {
        self.series
            .get(study)
            .cloned()
            .context(UnknownStudySnafu { uid: study })
    }

    fn load_image(&self, instance: &InstanceRef) -> Result<PetImage> {
        let path = self.resolve(instance)?;
        let obj = open_file(path).context(OpenFileSnafu { path })?;
        Ok(pet_image(instance.id.as_str(), &obj))
    }
}
