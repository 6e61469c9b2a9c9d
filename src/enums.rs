/// How decoded integer samples are turned into voxel values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleScaling {
    /// Direct numeric cast of the stored sample.
    #[default]
    Raw,
    /// Divide by the largest value representable in `BitsStored` bits,
    /// mapping samples onto `[0, 1]`.
    Unit,
}

/// Secondary ordering for slices sharing an instance number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    #[default]
    Path,
    // Keeps scan order among equal keys
    None,
}
