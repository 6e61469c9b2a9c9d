use crate::{
    enums::{SampleScaling, TieBreak},
    error::{DicomStackError, Result},
    options::ReadOptions,
    series::SeriesValidator,
    slice_record::{SliceInfo, SliceRecord},
    volume::Volume,
};

use dicom::{
    object::open_file,
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, PixelRepresentation},
};
use log::{debug, error, info};
use ndarray::{Array4, Axis, Zip, s};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from a directory of single-slice files
    ///
    /// Every entry carrying the configured extension is a candidate slice;
    /// other entries are skipped. Slices are stacked by ascending instance
    /// number regardless of their order on disk.
    ///
    /// # Errors
    ///
    /// Returns error if the directory is missing or empty, if any candidate is
    /// not a valid slice, if the slices do not form one consistently shaped
    /// series, or if any pixel data cannot be decoded.
    pub fn load_from_directory(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Volume> {
        let mut volume = Volume::default();
        Self::read_directory_into(path, &mut volume, options)?;
        Ok(volume)
    }

    /// Like [`VolumeLoader::load_from_directory`], writing into `volume`.
    ///
    /// `volume` is only replaced once the whole series has been read; on
    /// error it is left untouched.
    pub fn read_directory_into(
        path: impl AsRef<Path>,
        volume: &mut Volume,
        options: &ReadOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        Self::scan_directory(path, options)
            .and_then(|records| Self::assemble_into(records, volume, options))
            .inspect_err(|e| error!("read_directory_into: {e}"))
    }

    /// Load a volume from an explicit list of slice files
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        options: &ReadOptions,
    ) -> Result<Volume> {
        let records: Vec<_> = paths
            .iter()
            .map(|path| SliceRecord::probe(path.as_ref()))
            .collect();
        Self::assemble_volume(records, options)
            .inspect_err(|e| error!("load_from_file_paths: {e}"))
    }

    /// Load every frame of a single, possibly multi-frame, file
    pub fn load_from_file(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Volume> {
        let path = path.as_ref();
        let result = if path.exists() {
            Self::assemble_volume(vec![SliceRecord::probe(path)], options)
        } else {
            Err(DicomStackError::InputNotFound(path.to_path_buf()))
        };
        result.inspect_err(|e| error!("load_from_file: {e}"))
    }

    /// Validate, order and stack already probed slices
    pub fn assemble(records: Vec<SliceRecord>, options: &ReadOptions) -> Result<Volume> {
        Self::assemble_volume(records, options).inspect_err(|e| error!("assemble: {e}"))
    }

    fn assemble_volume(records: Vec<SliceRecord>, options: &ReadOptions) -> Result<Volume> {
        let mut volume = Volume::default();
        Self::assemble_into(records, &mut volume, options)?;
        Ok(volume)
    }

    fn scan_directory(path: &Path, options: &ReadOptions) -> Result<Vec<SliceRecord>> {
        if !path.exists() {
            return Err(DicomStackError::InputNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(DicomStackError::NotADirectory(path.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && options.matches_extension(path))
            .collect();

        if paths.is_empty() {
            return Err(DicomStackError::EmptyInput(Some(path.to_path_buf())));
        }

        // only for stable diagnostics; z order comes from the instance numbers
        paths.sort();
        debug!("found {} candidate slices in {}", paths.len(), path.display());

        Ok(paths.into_iter().map(SliceRecord::probe).collect())
    }

    fn assemble_into(
        records: Vec<SliceRecord>,
        destination: &mut Volume,
        options: &ReadOptions,
    ) -> Result<()> {
        let geometry = SeriesValidator::validate(&records)?;

        let mut slices = records
            .iter()
            .map(|record| record.require().map(|info| (record.path(), info)))
            .collect::<Result<Vec<_>>>()?;

        let nz = slices.iter().map(|(_, info)| info.nz).sum();
        let mut volume = Volume::zeros(
            (geometry.nx, geometry.ny, nz, geometry.nc),
            geometry.spacing,
        )?;

        Self::sort_slices(&mut slices, options.tie_break);

        let mut z_offset = 0;
        for (path, info) in slices {
            let (pixels, bits_stored) = Self::decode_frames(path, info)?;
            let scale = Self::sample_scale(options.scaling, bits_stored);

            for (frame_index, frame) in pixels.axis_iter(Axis(0)).enumerate() {
                // (rows, columns) is (y, x)
                let frame = frame.index_axis(Axis(2), 0);
                let mut plane = volume
                    .data_mut()
                    .slice_mut(s![.., .., z_offset + frame_index, 0]);
                Zip::from(&mut plane)
                    .and(frame.t())
                    .for_each(|voxel, &sample| *voxel = sample as f32 * scale);
            }

            debug!(
                "copied {} (instance {}) to z = {z_offset}",
                path.display(),
                info.instance_number
            );
            z_offset += info.nz;
        }

        info!(
            "assembled volume of {:?} voxels from {} files",
            volume.dim(),
            records.len()
        );
        *destination = volume;
        Ok(())
    }

    fn sort_slices(slices: &mut [(&Path, &SliceInfo)], tie_break: TieBreak) {
        match tie_break {
            TieBreak::Path => slices.sort_by(|a, b| {
                a.1.instance_number
                    .cmp(&b.1.instance_number)
                    .then_with(|| a.0.cmp(b.0))
            }),
            TieBreak::None => slices.sort_by_key(|(_, info)| info.instance_number),
        }
    }

    /// Decode all frames of `path` as stored values, shaped
    /// (frames, rows, columns, samples).
    ///
    /// Signed samples are shifted by `2^(BitsStored - 1)` so the grid is
    /// always unsigned with `BitsStored` bits of depth.
    fn decode_frames(path: &Path, info: &SliceInfo) -> Result<(Array4<u32>, u16)> {
        let decode_failure = |reason: String| DicomStackError::PayloadDecodeFailure {
            path: path.to_path_buf(),
            reason,
        };

        let dicom_object = open_file(path).map_err(|e| decode_failure(e.to_string()))?;
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| decode_failure(e.to_string()))?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let pixels = pixel_data
            .to_ndarray_with_options::<i32>(&options)
            .map_err(|e| decode_failure(e.to_string()))?;

        let expected = (info.nz, info.ny, info.nx, info.nc);
        if pixels.dim() != expected {
            return Err(decode_failure(format!(
                "decoded shape {:?} differs from the expected {expected:?}",
                pixels.dim()
            )));
        }

        let bits_stored = pixel_data.bits_stored();
        let signed = pixel_data.pixel_representation() == PixelRepresentation::Signed;
        let offset = if signed {
            1_i32 << (bits_stored.clamp(1, 16) - 1)
        } else {
            0
        };
        // 8-bit samples come back as unsigned bytes whatever their representation
        let signed_bytes = signed && pixel_data.bits_allocated() == 8;
        let samples = pixels
            .iter()
            .map(|&sample| {
                let sample = if signed_bytes {
                    i32::from(sample as u8 as i8)
                } else {
                    sample
                };
                u32::try_from(sample + offset)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                decode_failure(format!("sample outside the {bits_stored}-bit range"))
            })?;
        let grid = Array4::from_shape_vec(pixels.raw_dim(), samples)
            .map_err(|e| decode_failure(e.to_string()))?;

        Ok((grid, bits_stored))
    }

    fn sample_scale(scaling: SampleScaling, bits_stored: u16) -> f32 {
        match scaling {
            SampleScaling::Raw => 1.0,
            SampleScaling::Unit => {
                let max = (1_u32 << bits_stored.clamp(1, 16)) - 1;
                1.0 / max as f32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_scale_follows_bits_stored() {
        assert_eq!(VolumeLoader::sample_scale(SampleScaling::Raw, 8), 1.0);
        assert_eq!(VolumeLoader::sample_scale(SampleScaling::Unit, 8), 1.0 / 255.0);
        assert_eq!(
            VolumeLoader::sample_scale(SampleScaling::Unit, 12),
            1.0 / 4095.0
        );
    }

    #[test]
    fn equal_instance_numbers_fall_back_to_path() {
        let info = |instance_number| SliceInfo {
            series_uid: "1.2".to_string(),
            instance_number,
            nx: 1,
            ny: 1,
            nz: 1,
            nc: 1,
            spacing: (1.0, 1.0, 1.0),
        };
        let (one, two_b, two_a) = (info(1), info(2), info(2));
        let mut slices = vec![
            (Path::new("b.dcm"), &two_b),
            (Path::new("c.dcm"), &one),
            (Path::new("a.dcm"), &two_a),
        ];
        VolumeLoader::sort_slices(&mut slices, TieBreak::Path);
        let order: Vec<_> = slices.iter().map(|(path, _)| path.to_str().unwrap()).collect();
        assert_eq!(order, ["c.dcm", "a.dcm", "b.dcm"]);

        let mut slices = vec![
            (Path::new("b.dcm"), &two_b),
            (Path::new("c.dcm"), &one),
            (Path::new("a.dcm"), &two_a),
        ];
        VolumeLoader::sort_slices(&mut slices, TieBreak::None);
        let order: Vec<_> = slices.iter().map(|(path, _)| path.to_str().unwrap()).collect();
        assert_eq!(order, ["c.dcm", "b.dcm", "a.dcm"]);
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            VolumeLoader::load_from_directory(&missing, &ReadOptions::new()),
            Err(DicomStackError::InputNotFound(_))
        ));
    }

    #[test]
    fn file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("0.dcm");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            VolumeLoader::load_from_directory(&file, &ReadOptions::new()),
            Err(DicomStackError::NotADirectory(_))
        ));
    }

    #[test]
    fn directory_without_slices_is_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        match VolumeLoader::load_from_directory(dir.path(), &ReadOptions::new()) {
            Err(err @ DicomStackError::EmptyInput(Some(_))) => {
                assert!(err.to_string().ends_with(&dir.path().display().to_string()));
            }
            other => panic!("expected empty input, got {other:?}"),
        }
    }

    #[test]
    fn assemble_reports_defective_records() {
        let records = vec![SliceRecord::probe(Path::new("absent.dcm"))];
        assert!(matches!(
            VolumeLoader::assemble(records, &ReadOptions::new()),
            Err(DicomStackError::InvalidSlice { .. })
        ));
        assert!(matches!(
            VolumeLoader::assemble(Vec::new(), &ReadOptions::new()),
            Err(DicomStackError::EmptyInput(None))
        ));
    }

    #[test]
    fn empty_path_list_is_empty_input() {
        let paths: [&Path; 0] = [];
        assert!(matches!(
            VolumeLoader::load_from_file_paths(&paths, &ReadOptions::new()),
            Err(DicomStackError::EmptyInput(None))
        ));
    }

    #[test]
    fn invalid_candidate_aborts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0.dcm"), b"garbage").unwrap();
        assert!(matches!(
            VolumeLoader::load_from_directory(dir.path(), &ReadOptions::new()),
            Err(DicomStackError::InvalidSlice { .. })
        ));
    }
}
