use std::path::PathBuf;

use thiserror::Error;

use crate::slice_record::SliceDefect;

#[derive(Debug, Error)]
pub enum DicomStackError {
    #[error("Cannot find {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Carries the scanned directory when there is one
    #[error(
        "No DICOM files found{}",
        .0.as_ref().map(|dir| format!(" in {}", dir.display())).unwrap_or_default()
    )]
    EmptyInput(Option<PathBuf>),

    #[error(
        "File {} is from a different series ({other_series}) than file {} ({first_series})",
        .other.display(), .first.display()
    )]
    SeriesMismatch {
        first: PathBuf,
        first_series: String,
        other: PathBuf,
        other_series: String,
    },

    #[error(
        "Slice {} (x, y, c = {other_dim:?}) does not match the dimensions of slice {} (x, y, c = {first_dim:?})",
        .other.display(), .first.display()
    )]
    DimensionMismatch {
        first: PathBuf,
        first_dim: (usize, usize, usize),
        other: PathBuf,
        other_dim: (usize, usize, usize),
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Image has {0} channels, only single-channel images are supported")]
    UnsupportedChannels(usize),

    #[error("Invalid slice {}: {defect}", .path.display())]
    InvalidSlice { path: PathBuf, defect: SliceDefect },

    #[error("Could not decode pixel data of {}: {reason}", .path.display())]
    PayloadDecodeFailure { path: PathBuf, reason: String },

    #[error("Could not allocate a volume of {dim:?} voxels")]
    ResizeFailure { dim: (usize, usize, usize, usize) },

    #[error("Failed to set {tag}: {reason}")]
    TagWriteFailure { tag: &'static str, reason: String },

    #[error("Failed to write file {}: {reason}", .path.display())]
    PersistFailure { path: PathBuf, reason: String },

    #[error(
        "Writing slice {index} to {} failed after {written} files were written: {source}",
        .path.display()
    )]
    PartialWriteFailure {
        index: usize,
        path: PathBuf,
        written: usize,
        #[source]
        source: Box<DicomStackError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DicomStackError {
    /// Converts a defective slice record into the matching error variant.
    pub(crate) fn from_defect(path: PathBuf, defect: SliceDefect) -> Self {
        match defect {
            SliceDefect::NotMonochrome { samples_per_pixel, .. } => {
                Self::UnsupportedChannels(samples_per_pixel)
            }
            SliceDefect::InvalidDimensions { .. } | SliceDefect::InvalidSpacing { .. } => {
                Self::InvalidGeometry(format!("{}: {defect}", path.display()))
            }
            defect => Self::InvalidSlice { path, defect },
        }
    }
}

pub type Result<T, E = DicomStackError> = std::result::Result<T, E>;
