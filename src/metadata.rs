use log::debug;
use uuid::Uuid;

use crate::options::UidRoots;

pub const DEFAULT_PATIENT_NAME: &str = "DefaultDicomStackPatient";
pub const DEFAULT_PATIENT_ID: &str = "DefaultDicomStackPatientID";
pub const DEFAULT_SERIES_DESCRIPTION: &str = "Series generated by dicom-stack";
pub const DEFAULT_INSTANCE_NUMBER: u32 = 1;

/// Longest UID allowed by the UI value representation.
const MAX_UID_LEN: usize = 64;

/// Descriptive attributes written into every file of a series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DicomMetadata {
    pub patient_name: String,
    pub patient_id: String,
    pub study_uid: String,
    pub series_uid: String,
    pub series_description: String,
    pub instance_uid: String,
    pub instance_number: u32,
}

/// Field-wise overrides applied on top of generated defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataOverrides {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub study_uid: Option<String>,
    pub series_uid: Option<String>,
    pub series_description: Option<String>,
    pub instance_uid: Option<String>,
    pub instance_number: Option<u32>,
}

/// Resolves the metadata of a write call.
#[derive(Clone, Debug, Default)]
pub struct MetadataPolicy {
    uid_roots: UidRoots,
}

impl MetadataPolicy {
    pub fn new(uid_roots: UidRoots) -> Self {
        Self { uid_roots }
    }

    /// Use `metadata` verbatim, or fresh defaults when it is `None`.
    pub fn resolve(&self, metadata: Option<&DicomMetadata>) -> DicomMetadata {
        match metadata {
            Some(metadata) => metadata.clone(),
            None => self.defaults(),
        }
    }

    /// Merge `overrides` over fresh defaults, field by field.
    pub fn merge(&self, overrides: &MetadataOverrides) -> DicomMetadata {
        let defaults = self.defaults();
        DicomMetadata {
            patient_name: overrides
                .patient_name
                .clone()
                .unwrap_or(defaults.patient_name),
            patient_id: overrides.patient_id.clone().unwrap_or(defaults.patient_id),
            study_uid: overrides.study_uid.clone().unwrap_or(defaults.study_uid),
            series_uid: overrides.series_uid.clone().unwrap_or(defaults.series_uid),
            series_description: overrides
                .series_description
                .clone()
                .unwrap_or(defaults.series_description),
            instance_uid: overrides
                .instance_uid
                .clone()
                .unwrap_or(defaults.instance_uid),
            instance_number: overrides
                .instance_number
                .unwrap_or(defaults.instance_number),
        }
    }

    /// Default metadata with newly generated study, series and instance UIDs.
    pub fn defaults(&self) -> DicomMetadata {
        let metadata = DicomMetadata {
            patient_name: DEFAULT_PATIENT_NAME.to_string(),
            patient_id: DEFAULT_PATIENT_ID.to_string(),
            study_uid: generate_uid(&self.uid_roots.study),
            series_uid: generate_uid(&self.uid_roots.series),
            series_description: DEFAULT_SERIES_DESCRIPTION.to_string(),
            instance_uid: self.instance_uid(),
            instance_number: DEFAULT_INSTANCE_NUMBER,
        };
        debug!(
            "generated study {} and series {}",
            metadata.study_uid, metadata.series_uid
        );
        metadata
    }

    pub fn instance_uid(&self) -> String {
        generate_uid(&self.uid_roots.instance)
    }
}

/// Generate a UID below `root` from a random 128-bit UUID.
///
/// The result is cut to 64 characters when the root is long; the UUID
/// digits never start with zero, so truncation keeps the UID well formed.
pub fn generate_uid(root: &str) -> String {
    let root = root.trim_end_matches('.');
    let mut uid = format!("{root}.{}", Uuid::new_v4().as_u128());
    uid.truncate(MAX_UID_LEN);
    uid
}
