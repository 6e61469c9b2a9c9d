//! # DICOM-stack library
//!
//! This crate converts between dense voxel volumes held in memory and DICOM
//! series on disk, either as a directory of single-frame files (one per
//! z-slice) or as a single multi-frame file.
//!
//! This library is built on the dicom-rs ecosystem. Reading a directory
//! probes every `.dcm` file, checks that all of them belong to one series
//! with identical in-plane dimensions, orders them by Instance Number and
//! copies their pixel data into a [`Volume`]. Writing does the inverse: the
//! volume is cut into z-slices which are written as `000.dcm`, `001.dcm`, ...
//! sharing one study and series, each with its own SOP Instance UID.
//!
//! The following restrictions apply:
//!  - Monochrome images only (one sample per pixel)
//!  - Voxel spacing comes from the first file of a series
//!  - Written pixel data is 8-bit, quantized as `round(value * 255)`
//!  - A failed directory write leaves the files written before the failure
//!
//! # Examples
//!
//! ## Reading a directory of DICOM files into a volume
//!
//! ```no_run
//! # use dicom_stack::{ReadOptions, VolumeLoader};
//! let volume = VolumeLoader::load_from_directory("dicom", &ReadOptions::new())
//!     .expect("should have loaded files from directory");
//! let (nx, ny, nz, _) = volume.dim();
//! println!("{nx} x {ny} x {nz} voxels, spacing {:?}", volume.spacing());
//! ```
//!
//! ## Writing a volume as a new series
//!
//! ```no_run
//! # use dicom_stack::{Volume, VolumeWriter, WriteOptions};
//! let volume = Volume::zeros((256, 256, 120, 1), (0.8, 0.8, 2.0)).unwrap();
//! VolumeWriter::write_to_directory("out", &volume, None, &WriteOptions::new())
//!     .expect("should have written one file per slice");
//! ```

pub mod enums;
pub mod error;
pub mod metadata;
pub mod options;
pub mod series;
pub mod slice_record;
pub mod volume;
pub mod volume_loader;
pub mod volume_writer;

pub use enums::{SampleScaling, TieBreak};
pub use error::{DicomStackError, Result};
pub use metadata::{DicomMetadata, MetadataOverrides, MetadataPolicy};
pub use options::{ReadOptions, UidRoots, WriteOptions};
pub use series::{SeriesGeometry, SeriesValidator};
pub use slice_record::{SliceDefect, SliceInfo, SliceRecord};
pub use volume::{Spacing, Volume};
pub use volume_loader::VolumeLoader;
pub use volume_writer::VolumeWriter;
