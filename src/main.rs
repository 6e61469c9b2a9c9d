use std::{fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use dicom_stack::{
    DicomStackError, MetadataOverrides, MetadataPolicy, ReadOptions, SampleScaling, VolumeLoader,
    VolumeWriter, WriteOptions,
};
use log::{LevelFilter, error, info};
use simple_logger::SimpleLogger;

/// Convert between DICOM series directories and multi-frame DICOM files
#[derive(Parser, Debug)]
#[command(name = "dicom-stack", version)]
struct Cli {
    /// Input directory of slices, or a single DICOM file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (when it carries the slice extension) or directory
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Extension of slice files
    #[arg(long, default_value = "dcm")]
    extension: String,

    /// Keep raw sample values instead of mapping them onto [0, 1]; values
    /// above 1 saturate in the 8-bit output
    #[arg(long)]
    raw: bool,

    #[arg(long)]
    patient_name: Option<String>,

    #[arg(long)]
    patient_id: Option<String>,

    #[arg(long)]
    series_description: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("could not initialize logging: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), DicomStackError> {
    let scaling = if cli.raw {
        SampleScaling::Raw
    } else {
        SampleScaling::Unit
    };
    let read_options = ReadOptions::new()
        .with_extension(cli.extension.as_str())
        .with_scaling(scaling);
    let write_options = WriteOptions::new().with_extension(cli.extension.as_str());

    let volume = if cli.input.is_dir() {
        VolumeLoader::load_from_directory(&cli.input, &read_options)?
    } else {
        VolumeLoader::load_from_file(&cli.input, &read_options)?
    };
    info!(
        "read {:?} voxels with spacing {:?} from {}",
        volume.dim(),
        volume.spacing(),
        cli.input.display()
    );

    let overrides = MetadataOverrides {
        patient_name: cli.patient_name.clone(),
        patient_id: cli.patient_id.clone(),
        series_description: cli.series_description.clone(),
        ..Default::default()
    };
    let metadata = MetadataPolicy::new(write_options.uid_roots.clone()).merge(&overrides);

    if write_options.matches_extension(&cli.output) {
        VolumeWriter::write_to_file(&cli.output, &volume, Some(&metadata), &write_options)?;
    } else {
        fs::create_dir_all(&cli.output)?;
        VolumeWriter::write_to_directory(&cli.output, &volume, Some(&metadata), &write_options)?;
    }
    info!("wrote {}", cli.output.display());
    Ok(())
}
