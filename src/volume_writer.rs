use crate::{
    error::{DicomStackError, Result},
    metadata::{DicomMetadata, MetadataPolicy},
    options::WriteOptions,
    volume::{Spacing, Volume},
};

use dicom::{
    core::{DataElement, PrimitiveValue, VR, dicom_value},
    object::{FileMetaTableBuilder, InMemDicomObject},
};
use dicom_dictionary_std::{tags, uids};
use log::{debug, error, info};
use ndarray::{ArrayView3, Axis, s};
use std::path::{Path, PathBuf};

/// Longest value allowed by the DS value representation.
const MAX_DS_LEN: usize = 16;
const MAX_UID_LEN: usize = 64;

pub struct VolumeWriter;

impl VolumeWriter {
    /// Write a volume as a directory of single-frame files.
    ///
    /// Files are named `<index>.<extension>` with the index zero-padded to
    /// `ceil(log10(nz))` digits, and numbered 1..=nz along the z axis. Every
    /// file shares the study and series identity of `metadata` (or of freshly
    /// generated defaults) and gets its own SOP instance UID.
    ///
    /// # Errors
    ///
    /// Fails on multi-channel or empty volumes and when the target is not an
    /// existing directory. A failed slice aborts the write with
    /// [`DicomStackError::PartialWriteFailure`]; files written before it are
    /// left in place.
    pub fn write_to_directory(
        path: impl AsRef<Path>,
        volume: &Volume,
        metadata: Option<&DicomMetadata>,
        options: &WriteOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        Self::write_series(path, volume, metadata, options)
            .inspect_err(|e| error!("write_to_directory: {e}"))
    }

    /// Write the whole volume into one file, one frame per z-slice.
    pub fn write_to_file(
        path: impl AsRef<Path>,
        volume: &Volume,
        metadata: Option<&DicomMetadata>,
        options: &WriteOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let result = Self::check_writable(volume).and_then(|()| {
            let metadata = MetadataPolicy::new(options.uid_roots.clone()).resolve(metadata);
            let frames = volume.data().index_axis(Axis(3), 0);
            Self::serialize(path, frames, volume.spacing(), &metadata)
        });
        result.inspect_err(|e| error!("write_to_file: {e}"))
    }

    /// Number of digits needed to zero-pad `count` slice indices.
    pub fn filename_width(count: usize) -> usize {
        let mut width = 0;
        let mut capacity: usize = 1;
        while capacity < count {
            capacity = capacity.saturating_mul(10);
            width += 1;
        }
        width
    }

    pub fn slice_filename(index: usize, width: usize, extension: &str) -> String {
        format!("{index:0width$}.{extension}")
    }

    fn write_series(
        path: &Path,
        volume: &Volume,
        metadata: Option<&DicomMetadata>,
        options: &WriteOptions,
    ) -> Result<()> {
        Self::check_writable(volume)?;
        if !path.exists() {
            return Err(DicomStackError::InputNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(DicomStackError::NotADirectory(path.to_path_buf()));
        }

        let policy = MetadataPolicy::new(options.uid_roots.clone());
        let mut metadata = policy.resolve(metadata);

        let (_, _, nz, _) = volume.dim();
        let width = Self::filename_width(nz);

        for index in 0..nz {
            let file = path.join(Self::slice_filename(index, width, &options.extension));
            let frames = volume.data().slice(s![.., .., index..index + 1, 0]);

            metadata.instance_uid = policy.instance_uid();
            metadata.instance_number = u32::try_from(index + 1).map_err(|_| {
                DicomStackError::InvalidGeometry(format!("too many slices: {nz}"))
            })?;

            Self::serialize(&file, frames, volume.spacing(), &metadata).map_err(|source| {
                DicomStackError::PartialWriteFailure {
                    index,
                    path: file.clone(),
                    written: index,
                    source: Box::new(source),
                }
            })?;
            debug!("wrote slice {index} to {}", file.display());
        }

        info!(
            "wrote {nz} slices of series {} to {}",
            metadata.series_uid,
            path.display()
        );
        Ok(())
    }

    fn check_writable(volume: &Volume) -> Result<()> {
        let (nx, ny, nz, nc) = volume.dim();
        if nc != 1 {
            return Err(DicomStackError::UnsupportedChannels(nc));
        }
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(DicomStackError::InvalidGeometry(format!(
                "cannot write an empty volume ({nx}, {ny}, {nz})"
            )));
        }
        Ok(())
    }

    /// Serialize `frames`, shaped (x, y, z), into one explicit VR little
    /// endian file with 8-bit samples.
    fn serialize(
        path: &Path,
        frames: ArrayView3<'_, f32>,
        spacing: Spacing,
        metadata: &DicomMetadata,
    ) -> Result<()> {
        let object = Self::build_object(frames, spacing, metadata)?;

        let file_object = object
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(metadata.instance_uid.as_str()),
            )
            .map_err(|e| DicomStackError::TagWriteFailure {
                tag: "FileMetaInformation",
                reason: e.to_string(),
            })?;

        file_object
            .write_to_file(path)
            .map_err(|e| DicomStackError::PersistFailure {
                path: PathBuf::from(path),
                reason: e.to_string(),
            })
    }

    fn build_object(
        frames: ArrayView3<'_, f32>,
        spacing: Spacing,
        metadata: &DicomMetadata,
    ) -> Result<InMemDicomObject> {
        let (nx, ny, nz) = frames.dim();
        let (ux, uy, uz) = spacing;

        let rows = u16::try_from(ny).map_err(|_| too_large("Rows", ny))?;
        let columns = u16::try_from(nx).map_err(|_| too_large("Columns", nx))?;

        let slice_location = uz * (f64::from(metadata.instance_number) - 1.0);
        let (vertical, horizontal) = aspect_ratio(ux, uy);

        let mut pixel_data = Vec::with_capacity(nx * ny * nz);
        for frame in frames.axis_iter(Axis(2)) {
            pixel_data.extend(Volume::plane_to_u8(&frame));
        }
        // OB values have even length
        if pixel_data.len() % 2 == 1 {
            pixel_data.push(0);
        }

        let mut object = InMemDicomObject::new_empty();
        object.put(DataElement::new(
            tags::IMAGE_TYPE,
            VR::CS,
            dicom_value!(Strs, ["DERIVED", "SECONDARY"]),
        ));
        object.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
        ));
        object.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(uid("SOPInstanceUID", &metadata.instance_uid)?),
        ));
        object.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("OT")));
        object.put(DataElement::new(
            tags::SERIES_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from(metadata.series_description.as_str()),
        ));
        object.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from(metadata.patient_name.as_str()),
        ));
        object.put(DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from(metadata.patient_id.as_str()),
        ));
        object.put(DataElement::new(
            tags::SLICE_THICKNESS,
            VR::DS,
            PrimitiveValue::from(decimal_string("SliceThickness", uz)?),
        ));
        object.put(DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(uid("StudyInstanceUID", &metadata.study_uid)?),
        ));
        object.put(DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(uid("SeriesInstanceUID", &metadata.series_uid)?),
        ));
        object.put(DataElement::new(
            tags::INSTANCE_NUMBER,
            VR::IS,
            PrimitiveValue::from(metadata.instance_number.to_string()),
        ));
        object.put(DataElement::new(
            tags::SLICE_LOCATION,
            VR::DS,
            PrimitiveValue::from(decimal_string("SliceLocation", slice_location)?),
        ));
        object.put(DataElement::new(
            tags::SAMPLES_PER_PIXEL,
            VR::US,
            PrimitiveValue::from(1_u16),
        ));
        object.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ));
        object.put(DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from(nz.to_string()),
        ));
        object.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)));
        object.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns)));
        // row spacing first
        object.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            dicom_value!(
                Strs,
                [
                    decimal_string("PixelSpacing", uy)?,
                    decimal_string("PixelSpacing", ux)?
                ]
            ),
        ));
        object.put(DataElement::new(
            tags::PIXEL_ASPECT_RATIO,
            VR::IS,
            dicom_value!(Strs, [vertical.to_string(), horizontal.to_string()]),
        ));
        object.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)));
        object.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)));
        object.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)));
        object.put(DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            PrimitiveValue::from(0_u16),
        ));
        object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(pixel_data),
        ));

        Ok(object)
    }
}

fn too_large(tag: &'static str, value: usize) -> DicomStackError {
    DicomStackError::TagWriteFailure {
        tag,
        reason: format!("{value} does not fit in 16 bits"),
    }
}

fn uid<'a>(tag: &'static str, value: &'a str) -> Result<&'a str> {
    let well_formed = !value.is_empty()
        && value.len() <= MAX_UID_LEN
        && value.chars().all(|c| c.is_ascii_digit() || c == '.');
    if well_formed {
        Ok(value)
    } else {
        Err(DicomStackError::TagWriteFailure {
            tag,
            reason: format!("{value:?} is not a valid UID"),
        })
    }
}

/// Format `value` as a DS string: fixed point, trailing zeros trimmed.
fn decimal_string(tag: &'static str, value: f64) -> Result<String> {
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    let text = match trimmed {
        "" | "-" => "0",
        text => text,
    };
    if value.is_finite() && text.len() <= MAX_DS_LEN {
        Ok(text.to_string())
    } else {
        Err(DicomStackError::TagWriteFailure {
            tag,
            reason: format!("{value} cannot be written as a decimal string"),
        })
    }
}

/// Integer pair `vertical\horizontal` proportional to `uy:ux`.
fn aspect_ratio(ux: f64, uy: f64) -> (u64, u64) {
    let vertical = ((uy * 1e6).round() as u64).max(1);
    let horizontal = ((ux * 1e6).round() as u64).max(1);
    let divisor = gcd(vertical, horizontal);
    (vertical / divisor, horizontal / divisor)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice_record::SliceRecord;

    #[test]
    fn filename_width_matches_slice_count() {
        assert_eq!(VolumeWriter::filename_width(1), 0);
        assert_eq!(VolumeWriter::filename_width(9), 1);
        assert_eq!(VolumeWriter::filename_width(10), 1);
        assert_eq!(VolumeWriter::filename_width(11), 2);
        assert_eq!(VolumeWriter::filename_width(100), 2);
        assert_eq!(VolumeWriter::filename_width(150), 3);
    }

    #[test]
    fn slice_filenames_are_zero_padded() {
        assert_eq!(VolumeWriter::slice_filename(7, 3, "dcm"), "007.dcm");
        assert_eq!(VolumeWriter::slice_filename(149, 3, "dcm"), "149.dcm");
        assert_eq!(VolumeWriter::slice_filename(0, 0, "dcm"), "0.dcm");
    }

    #[test]
    fn decimal_strings() {
        assert_eq!(decimal_string("X", 2.5).unwrap(), "2.5");
        assert_eq!(decimal_string("X", 3.0).unwrap(), "3");
        assert_eq!(decimal_string("X", 0.0).unwrap(), "0");
        assert_eq!(decimal_string("X", 0.333_333_33).unwrap(), "0.333333");
        assert!(decimal_string("X", 1e20).is_err());
        assert!(decimal_string("X", f64::NAN).is_err());
    }

    #[test]
    fn aspect_ratio_is_reduced() {
        assert_eq!(aspect_ratio(0.5, 0.5), (1, 1));
        assert_eq!(aspect_ratio(0.5, 0.75), (3, 2));
        assert_eq!(aspect_ratio(1.0, 0.25), (1, 4));
    }

    #[test]
    fn malformed_uid_is_a_tag_failure() {
        assert!(uid("StudyInstanceUID", "1.2.3").is_ok());
        assert!(matches!(
            uid("StudyInstanceUID", "1.2.abc"),
            Err(DicomStackError::TagWriteFailure {
                tag: "StudyInstanceUID",
                ..
            })
        ));
        assert!(uid("StudyInstanceUID", "").is_err());
    }

    #[test]
    fn built_object_probes_back() {
        let mut volume = Volume::zeros((3, 2, 1, 1), (0.5, 0.75, 2.0)).unwrap();
        volume.data_mut()[[2, 1, 0, 0]] = 1.0;
        let metadata = DicomMetadata {
            instance_number: 4,
            ..MetadataPolicy::default().resolve(None)
        };
        let frames = volume.data().index_axis(Axis(3), 0);
        let object = VolumeWriter::build_object(frames, volume.spacing(), &metadata).unwrap();

        let record = SliceRecord::from_object("x.dcm", &object);
        let info = record.info().unwrap();
        assert_eq!((info.nx, info.ny, info.nz, info.nc), (3, 2, 1, 1));
        assert_eq!(info.instance_number, 4);
        assert_eq!(info.series_uid, metadata.series_uid);
        let (ux, uy, uz) = info.spacing;
        assert_eq!((ux, uz), (0.5, 2.0));
        assert!((uy - 0.75).abs() < 1e-9);

        let location = object.element(tags::SLICE_LOCATION).unwrap().to_float64().unwrap();
        assert_eq!(location, 6.0);
        let pixels = object.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
        assert_eq!(pixels.as_ref(), &[0, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn multichannel_volume_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::zeros((2, 2, 2, 3), (1.0, 1.0, 1.0)).unwrap();
        assert!(matches!(
            VolumeWriter::write_to_directory(dir.path(), &volume, None, &WriteOptions::new()),
            Err(DicomStackError::UnsupportedChannels(3))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::zeros((2, 2, 2, 1), (1.0, 1.0, 1.0)).unwrap();
        assert!(matches!(
            VolumeWriter::write_to_directory(
                dir.path().join("absent"),
                &volume,
                None,
                &WriteOptions::new()
            ),
            Err(DicomStackError::InputNotFound(_))
        ));
    }

    #[test]
    fn bad_metadata_aborts_on_first_slice() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::zeros((2, 2, 3, 1), (1.0, 1.0, 1.0)).unwrap();
        let metadata = DicomMetadata {
            series_uid: "not-a-uid".to_string(),
            ..MetadataPolicy::default().resolve(None)
        };
        match VolumeWriter::write_to_directory(
            dir.path(),
            &volume,
            Some(&metadata),
            &WriteOptions::new(),
        ) {
            Err(DicomStackError::PartialWriteFailure {
                index,
                written,
                source,
                ..
            }) => {
                assert_eq!((index, written), (0, 0));
                assert!(matches!(
                    *source,
                    DicomStackError::TagWriteFailure {
                        tag: "SeriesInstanceUID",
                        ..
                    }
                ));
            }
            other => panic!("expected a partial write failure, got {other:?}"),
        }
    }
}
