use crate::error::{DicomStackError, Result};
use crate::slice_record::{SliceInfo, SliceRecord};
use crate::volume::Spacing;

/// Shape shared by every slice of a validated series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeriesGeometry {
    pub nx: usize,
    pub ny: usize,
    pub nc: usize,
    /// Taken from the first record; later records are not re-checked
    pub spacing: Spacing,
}

pub struct SeriesValidator;

impl SeriesValidator {
    /// Check that `records` form one series of identically shaped slices.
    ///
    /// # Errors
    ///
    /// Returns [`DicomStackError::EmptyInput`] for an empty set,
    /// [`DicomStackError::SeriesMismatch`] or [`DicomStackError::DimensionMismatch`]
    /// naming both offending files, and the mapped defect of the first
    /// invalid record.
    pub fn validate(records: &[SliceRecord]) -> Result<SeriesGeometry> {
        let first = records
            .first()
            .ok_or(DicomStackError::EmptyInput(None))?;
        let first_info = first.require()?;

        for record in &records[1..] {
            let info = record.require()?;
            Self::check_series(first, first_info, record, info)?;
        }

        for record in &records[1..] {
            let info = record.require()?;
            Self::check_dimensions(first, first_info, record, info)?;
        }

        Ok(SeriesGeometry {
            nx: first_info.nx,
            ny: first_info.ny,
            nc: first_info.nc,
            spacing: first_info.spacing,
        })
    }

    fn check_series(
        first: &SliceRecord,
        first_info: &SliceInfo,
        record: &SliceRecord,
        info: &SliceInfo,
    ) -> Result<()> {
        if info.series_uid != first_info.series_uid {
            return Err(DicomStackError::SeriesMismatch {
                first: first.path().to_path_buf(),
                first_series: first_info.series_uid.clone(),
                other: record.path().to_path_buf(),
                other_series: info.series_uid.clone(),
            });
        }
        Ok(())
    }

    fn check_dimensions(
        first: &SliceRecord,
        first_info: &SliceInfo,
        record: &SliceRecord,
        info: &SliceInfo,
    ) -> Result<()> {
        if info.dim() != first_info.dim() {
            return Err(DicomStackError::DimensionMismatch {
                first: first.path().to_path_buf(),
                first_dim: first_info.dim(),
                other: record.path().to_path_buf(),
                other_dim: info.dim(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::object::InMemDicomObject;
    use dicom_dictionary_std::tags;

    fn record(name: &str, series: &str, instance: i32, rows: u16, columns: u16) -> SliceRecord {
        let obj = InMemDicomObject::from_element_iter([
            DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, PrimitiveValue::from(series)),
            DataElement::new(
                tags::INSTANCE_NUMBER,
                VR::IS,
                PrimitiveValue::from(instance.to_string()),
            ),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("MONOCHROME2"),
            ),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns)),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, PrimitiveValue::from("0.5")),
            DataElement::new(tags::SLICE_THICKNESS, VR::DS, PrimitiveValue::from("1.5")),
        ]);
        SliceRecord::from_object(name, &obj)
    }

    #[test]
    fn accepts_consistent_series() {
        let records = vec![
            record("a.dcm", "1.2", 2, 8, 4),
            record("b.dcm", "1.2", 1, 8, 4),
        ];
        let geometry = SeriesValidator::validate(&records).unwrap();
        assert_eq!((geometry.nx, geometry.ny, geometry.nc), (4, 8, 1));
        assert_eq!(geometry.spacing, (0.5, 0.5, 1.5));
    }

    #[test]
    fn empty_set_fails() {
        let err = SeriesValidator::validate(&[]).unwrap_err();
        assert!(matches!(err, DicomStackError::EmptyInput(None)));
        assert_eq!(err.to_string(), "No DICOM files found");
    }

    #[test]
    fn foreign_series_fails() {
        let records = vec![
            record("a.dcm", "1.2", 1, 8, 4),
            record("b.dcm", "1.2", 2, 8, 4),
            record("c.dcm", "9.9", 3, 8, 4),
        ];
        match SeriesValidator::validate(&records) {
            Err(DicomStackError::SeriesMismatch { first, other, .. }) => {
                assert_eq!(first.to_str(), Some("a.dcm"));
                assert_eq!(other.to_str(), Some("c.dcm"));
            }
            other => panic!("expected a series mismatch, got {other:?}"),
        }
    }

    #[test]
    fn series_is_checked_before_dimensions() {
        let records = vec![
            record("a.dcm", "1.2", 1, 8, 4),
            record("b.dcm", "1.2", 2, 8, 5),
            record("c.dcm", "9.9", 3, 8, 4),
        ];
        assert!(matches!(
            SeriesValidator::validate(&records),
            Err(DicomStackError::SeriesMismatch { .. })
        ));
    }

    #[test]
    fn differing_shape_fails() {
        let records = vec![
            record("a.dcm", "1.2", 1, 8, 4),
            record("b.dcm", "1.2", 2, 8, 5),
        ];
        match SeriesValidator::validate(&records) {
            Err(DicomStackError::DimensionMismatch {
                first_dim,
                other_dim,
                ..
            }) => {
                assert_eq!(first_dim, (4, 8, 1));
                assert_eq!(other_dim, (5, 8, 1));
            }
            other => panic!("expected a dimension mismatch, got {other:?}"),
        }
    }
}
