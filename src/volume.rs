use crate::error::{DicomStackError, Result};

use ndarray::Array4;
use ndarray::ArrayView2;
use ndarray::ArrayView3;
use ndarray::ArrayViewMut3;
use ndarray::ShapeBuilder;
use ndarray::s;
use rayon::prelude::*;

/// Physical voxel spacing `(ux, uy, uz)`, usually in millimeters.
pub type Spacing = (f64, f64, f64);

/// Dense voxel buffer addressed by `(x, y, z, channel)`.
///
/// Storage is column-major so that `x` varies fastest, matching the row
/// layout of DICOM frames.
#[derive(Clone, Debug)]
pub struct Volume {
    data: Array4<f32>,
    spacing: Spacing,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            data: Array4::zeros((0, 0, 0, 0).f()),
            spacing: (1.0, 1.0, 1.0),
        }
    }
}

impl Volume {
    /// Wrap an existing `(nx, ny, nz, nc)` array.
    pub fn new(data: Array4<f32>, spacing: Spacing) -> Result<Self> {
        check_spacing(spacing)?;
        Ok(Self { data, spacing })
    }

    /// Allocate a zero-filled volume.
    pub fn zeros(dim: (usize, usize, usize, usize), spacing: Spacing) -> Result<Self> {
        let mut volume = Self::default();
        volume.resize(dim, spacing)?;
        Ok(volume)
    }

    /// Reallocate the buffer to `dim` and reset every voxel to zero.
    ///
    /// Fails with [`DicomStackError::ResizeFailure`] instead of aborting when
    /// the allocation cannot be satisfied.
    pub fn resize(&mut self, dim: (usize, usize, usize, usize), spacing: Spacing) -> Result<()> {
        check_spacing(spacing)?;
        let (nx, ny, nz, nc) = dim;
        let len = [ny, nz, nc]
            .iter()
            .try_fold(nx, |acc, &n| acc.checked_mul(n))
            .ok_or(DicomStackError::ResizeFailure { dim })?;

        let mut buffer: Vec<f32> = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|_| DicomStackError::ResizeFailure { dim })?;
        buffer.resize(len, 0.0);

        self.data = Array4::from_shape_vec(dim.f(), buffer)
            .map_err(|_| DicomStackError::ResizeFailure { dim })?;
        self.spacing = spacing;
        Ok(())
    }

    /// Get the dimensions of the volume (nx, ny, nz, nc)
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array4<f32> {
        &mut self.data
    }

    pub fn get(&self, x: usize, y: usize, z: usize, c: usize) -> Option<f32> {
        self.data.get([x, y, z, c]).copied()
    }

    /// The `(x, y, c)` plane at depth `z`.
    pub fn plane(&self, z: usize) -> Option<ArrayView3<'_, f32>> {
        (z < self.dim().2).then(|| self.data.slice(s![.., .., z, ..]))
    }

    pub fn plane_mut(&mut self, z: usize) -> Option<ArrayViewMut3<'_, f32>> {
        (z < self.dim().2).then(|| self.data.slice_mut(s![.., .., z, ..]))
    }

    #[inline]
    pub(crate) fn quantize_to_u8(value: f32) -> u8 {
        (value * 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// Render an `(x, y)` plane to row-major 8-bit samples.
    pub(crate) fn plane_to_u8(plane: &ArrayView2<'_, f32>) -> Vec<u8> {
        // transpose to (y, x) so iteration runs along rows
        plane
            .t()
            .into_par_iter()
            .map(|&v| Self::quantize_to_u8(v))
            .collect()
    }
}

fn check_spacing(spacing: Spacing) -> Result<()> {
    let (ux, uy, uz) = spacing;
    // also rejects NaN
    if ux > 0.0 && uy > 0.0 && uz > 0.0 {
        Ok(())
    } else {
        Err(DicomStackError::InvalidGeometry(format!(
            "voxel spacing must be positive, got {spacing:?}"
        )))
    }
}
