use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::object::{InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use log::debug;
use thiserror::Error;

use crate::error::{DicomStackError, Result};
use crate::volume::Spacing;

/// Why a file could not be used as a slice.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SliceDefect {
    #[error("could not read file ({0})")]
    Unreadable(String),

    #[error("missing attribute {0}")]
    MissingTag(&'static str),

    #[error("attribute {0} could not be parsed")]
    Unparseable(&'static str),

    #[error("negative instance number {0}")]
    NegativeInstanceNumber(i64),

    #[error("not a monochrome image ({photometric}, {samples_per_pixel} samples per pixel)")]
    NotMonochrome {
        photometric: String,
        samples_per_pixel: usize,
    },

    #[error("invalid dimensions ({nx}, {ny}, {nz})")]
    InvalidDimensions { nx: i64, ny: i64, nz: i64 },

    #[error("invalid {attribute}: {value}")]
    InvalidSpacing { attribute: &'static str, value: f64 },
}

/// Geometry and series identity of one probed slice file.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceInfo {
    pub series_uid: String,
    pub instance_number: i32,
    pub nx: usize,
    pub ny: usize,
    /// Frames carried by the file
    pub nz: usize,
    pub nc: usize,
    pub spacing: Spacing,
}

impl SliceInfo {
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nc)
    }
}

/// One candidate slice file, probed once and never modified afterwards.
///
/// Probing only reads the attributes in front of the pixel data; the pixels
/// are decoded later from [`SliceRecord::path`].
#[derive(Clone, Debug)]
pub struct SliceRecord {
    path: PathBuf,
    probe: Result<SliceInfo, SliceDefect>,
}

impl SliceRecord {
    /// Probe the file at `path`. Never fails: defects are recorded on the
    /// returned record.
    pub fn probe(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = match OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(&path)
        {
            Ok(obj) => Self::from_object(path, &obj),
            Err(e) => Self {
                path,
                probe: Err(SliceDefect::Unreadable(e.to_string())),
            },
        };
        if let Some(defect) = record.defect() {
            debug!("{} is not a valid slice: {defect}", record.path.display());
        }
        record
    }

    /// Build a record from an object that is already in memory.
    pub fn from_object(path: impl Into<PathBuf>, obj: &InMemDicomObject) -> Self {
        Self {
            path: path.into(),
            probe: Self::inspect(obj),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_valid(&self) -> bool {
        self.probe.is_ok()
    }

    pub fn defect(&self) -> Option<&SliceDefect> {
        self.probe.as_ref().err()
    }

    pub fn info(&self) -> Option<&SliceInfo> {
        self.probe.as_ref().ok()
    }

    /// The slice info, or the error this record's defect maps to.
    pub fn require(&self) -> Result<&SliceInfo> {
        self.probe
            .as_ref()
            .map_err(|defect| DicomStackError::from_defect(self.path.clone(), defect.clone()))
    }

    fn inspect(obj: &InMemDicomObject) -> Result<SliceInfo, SliceDefect> {
        let series_uid = string(obj, tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?;

        let instance_number: i64 = int(obj, tags::INSTANCE_NUMBER, "InstanceNumber")?;
        if instance_number < 0 {
            return Err(SliceDefect::NegativeInstanceNumber(instance_number));
        }
        let instance_number = i32::try_from(instance_number)
            .map_err(|_| SliceDefect::Unparseable("InstanceNumber"))?;

        let photometric = string(
            obj,
            tags::PHOTOMETRIC_INTERPRETATION,
            "PhotometricInterpretation",
        )?;
        let samples_per_pixel = match obj.element_opt(tags::SAMPLES_PER_PIXEL) {
            Ok(Some(elem)) => elem
                .to_int::<usize>()
                .map_err(|_| SliceDefect::Unparseable("SamplesPerPixel"))?,
            _ => 1,
        };
        if samples_per_pixel != 1 || !photometric.starts_with("MONOCHROME") {
            return Err(SliceDefect::NotMonochrome {
                photometric,
                samples_per_pixel,
            });
        }

        let ny: i64 = int(obj, tags::ROWS, "Rows")?;
        let nx: i64 = int(obj, tags::COLUMNS, "Columns")?;
        let nz: i64 = match obj.element_opt(tags::NUMBER_OF_FRAMES) {
            Ok(Some(elem)) => elem
                .to_int()
                .map_err(|_| SliceDefect::Unparseable("NumberOfFrames"))?,
            _ => 1,
        };
        if nx < 1 || ny < 1 || nz < 1 {
            return Err(SliceDefect::InvalidDimensions { nx, ny, nz });
        }

        let pixel_spacing = floats(obj, tags::PIXEL_SPACING, "PixelSpacing")?;
        // PixelSpacing is (row spacing, column spacing); x runs along a row
        let ux = match pixel_spacing.as_slice() {
            [single] => *single,
            [_, column, ..] => *column,
            [] => return Err(SliceDefect::Unparseable("PixelSpacing")),
        };
        if !(ux > 0.0) {
            return Err(SliceDefect::InvalidSpacing {
                attribute: "PixelSpacing",
                value: ux,
            });
        }

        let ratio = height_width_ratio(obj, &pixel_spacing)?;
        let uy = ux * ratio;
        if !(uy > 0.0) {
            return Err(SliceDefect::InvalidSpacing {
                attribute: "PixelAspectRatio",
                value: ratio,
            });
        }

        let uz = float(obj, tags::SLICE_THICKNESS, "SliceThickness")?;
        if !(uz > 0.0) {
            return Err(SliceDefect::InvalidSpacing {
                attribute: "SliceThickness",
                value: uz,
            });
        }

        Ok(SliceInfo {
            series_uid,
            instance_number,
            nx: nx as usize,
            ny: ny as usize,
            nz: nz as usize,
            nc: samples_per_pixel,
            spacing: (ux, uy, uz),
        })
    }
}

/// Pixel height over pixel width, from PixelAspectRatio when present,
/// otherwise from the two PixelSpacing values, otherwise square.
fn height_width_ratio(obj: &InMemDicomObject, pixel_spacing: &[f64]) -> Result<f64, SliceDefect> {
    if let Ok(Some(elem)) = obj.element_opt(tags::PIXEL_ASPECT_RATIO) {
        let ratio = elem
            .to_multi_float64()
            .map_err(|_| SliceDefect::Unparseable("PixelAspectRatio"))?;
        return match ratio.as_slice() {
            [vertical, horizontal, ..] if *horizontal != 0.0 => Ok(vertical / horizontal),
            _ => Err(SliceDefect::Unparseable("PixelAspectRatio")),
        };
    }
    Ok(match pixel_spacing {
        [row, column, ..] if *column > 0.0 => row / column,
        _ => 1.0,
    })
}

fn string(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<String, SliceDefect> {
    let value = obj
        .element(tag)
        .map_err(|_| SliceDefect::MissingTag(name))?
        .to_str()
        .map_err(|_| SliceDefect::Unparseable(name))?;
    Ok(value.trim_end_matches(['\0', ' ']).trim().to_string())
}

fn int(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<i64, SliceDefect> {
    obj.element(tag)
        .map_err(|_| SliceDefect::MissingTag(name))?
        .to_int::<i64>()
        .map_err(|_| SliceDefect::Unparseable(name))
}

fn float(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<f64, SliceDefect> {
    obj.element(tag)
        .map_err(|_| SliceDefect::MissingTag(name))?
        .to_float64()
        .map_err(|_| SliceDefect::Unparseable(name))
}

fn floats(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<Vec<f64>, SliceDefect> {
    obj.element(tag)
        .map_err(|_| SliceDefect::MissingTag(name))?
        .to_multi_float64()
        .map_err(|_| SliceDefect::Unparseable(name))
}
