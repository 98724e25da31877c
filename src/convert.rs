//! Conversion, merge and transform orchestration.
//!
//! Each orchestrator drains its reader(s) into a writer in batches of
//! [`ConvertConfig::batch_size`] streamlines, so peak memory is bounded by
//! one batch whatever the dataset size, then closes the writer.
//!
//! The `*_file` variants pick codecs from paths: inputs by content, outputs
//! by extension.

use std::io;
use std::path::{Path, PathBuf};

use crate::anatomy::{load_geometry, AnatomyGeometry};
use crate::error::{Error, Result};
use crate::formats::{detect_format, Format, StreamlineReader, StreamlineWriter};
use crate::header::Header;
use crate::transform::{self, Affine};
use crate::Streamline;

/// Default number of streamlines handed to each append.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Options shared by all orchestrators.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertConfig {
    /// Streamlines per append; 0 is treated as 1.
    pub batch_size: usize,
    /// Anatomy providing voxel geometry to codecs that use it.
    pub anatomy: Option<PathBuf>,
    /// Reject anatomy files with an unrecognized extension instead of warning.
    pub strict_anatomy: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            anatomy: None,
            strict_anatomy: false,
        }
    }
}

impl ConvertConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of streamlines per append.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the anatomy file.
    pub fn anatomy<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.anatomy = Some(path.as_ref().to_path_buf());
        self
    }

    /// Require a recognized anatomy extension.
    pub fn strict_anatomy(mut self, strict: bool) -> Self {
        self.strict_anatomy = strict;
        self
    }

    fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Geometry of the configured anatomy, if any.
    pub fn load_anatomy(&self) -> Result<Option<AnatomyGeometry>> {
        match &self.anatomy {
            Some(path) => load_geometry(Some(path.as_path()), self.strict_anatomy).map(Some),
            None => Ok(None),
        }
    }
}

/// Stream every streamline of `source` into `sink`, optionally through
/// `affine`. Returns the number of streamlines copied; `sink` stays open.
fn pump(
    source: &mut dyn StreamlineReader,
    sink: &mut dyn StreamlineWriter,
    affine: Option<&Affine>,
    batch_size: usize,
) -> Result<usize> {
    let mut batch: Vec<Streamline> = Vec::with_capacity(batch_size);
    let mut copied = 0;
    for points in source.streamlines()? {
        let points = points?;
        batch.push(match affine {
            Some(affine) => transform::transform(&points, affine),
            None => points,
        });
        copied += 1;
        if batch.len() == batch_size {
            sink.append(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        sink.append(&batch)?;
    }
    Ok(copied)
}

/// Copy all streamlines of `source` into `sink` and close both.
///
/// Returns the number of streamlines written.
pub fn convert(
    source: &mut dyn StreamlineReader,
    sink: &mut dyn StreamlineWriter,
    config: &ConvertConfig,
) -> Result<usize> {
    let expected = source.header().fiber_count();
    let copied = pump(source, sink, None, config.effective_batch_size())?;
    sink.close()?;
    source.close()?;
    tracing::info!(format = %sink.format(), "converted {copied}/{expected} streamlines");
    Ok(copied)
}

/// Concatenate `sources`, in order, into `sink` and close everything.
pub fn merge(
    sources: &mut [Box<dyn StreamlineReader>],
    sink: &mut dyn StreamlineWriter,
    config: &ConvertConfig,
) -> Result<usize> {
    let batch_size = config.effective_batch_size();
    let mut expected = 0;
    let mut copied = 0;
    for source in sources.iter_mut() {
        expected += source.header().fiber_count();
        copied += pump(source.as_mut(), sink, None, batch_size)?;
    }

    sink.close()?;
    for source in sources.iter_mut() {
        source.close()?;
    }
    tracing::info!(
        sources = sources.len(),
        format = %sink.format(),
        "converted {copied}/{expected} streamlines"
    );
    Ok(copied)
}

/// Copy `source` into `sink` with `affine` applied to every point.
pub fn transform(
    source: &mut dyn StreamlineReader,
    sink: &mut dyn StreamlineWriter,
    affine: &Affine,
    config: &ConvertConfig,
) -> Result<usize> {
    let expected = source.header().fiber_count();
    let copied = pump(source, sink, Some(affine), config.effective_batch_size())?;
    sink.close()?;
    source.close()?;
    tracing::info!(format = %sink.format(), "converted {copied}/{expected} streamlines");
    Ok(copied)
}

// ============================================================================
// Path-level entry points
// ============================================================================

fn input_format(path: &Path) -> Result<Format> {
    if !path.is_file() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a file", path.display()),
        )));
    }
    detect_format(path).ok_or_else(|| Error::UnknownFormat(path.display().to_string()))
}

fn output_format(path: &Path, inputs: &[&Path]) -> Result<Format> {
    if path.exists() {
        let target = path.canonicalize()?;
        for input in inputs {
            if input.canonicalize()? == target {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("output {} is also an input", path.display()),
                )));
            }
        }
    }
    Format::from_extension(path).ok_or_else(|| Error::UnknownFormat(path.display().to_string()))
}

/// Source header with the point count the sink will actually receive.
fn sink_header(reader: &dyn StreamlineReader) -> Header {
    let mut header = reader.header().clone();
    header.nb_points = Some(reader.streamline_points());
    header
}

/// Convert the file at `input` into a new file at `output`.
///
/// # Example
/// ```ignore
/// let config = ConvertConfig::new().anatomy("t1.nii.gz").batch_size(1000);
/// tractconv::convert_file("bundle.trk", "bundle.tck", &config)?;
/// ```
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &ConvertConfig,
) -> Result<usize> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let in_format = input_format(input)?;
    let out_format = output_format(output, &[input])?;
    let anatomy = config.load_anatomy()?;

    let mut reader = in_format.open(input, anatomy.as_ref())?;
    let mut writer = out_format.create(output, &sink_header(reader.as_ref()), anatomy.as_ref())?;
    convert(reader.as_mut(), writer.as_mut(), config)
}

/// Merge the files at `inputs`, in order, into a new file at `output`.
///
/// The output header carries the summed counts and neutral geometry.
pub fn merge_files<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs: &[P],
    output: Q,
    config: &ConvertConfig,
) -> Result<usize> {
    let output = output.as_ref();
    let paths: Vec<&Path> = inputs.iter().map(|p| p.as_ref()).collect();
    let formats = paths
        .iter()
        .map(|p| input_format(p))
        .collect::<Result<Vec<_>>>()?;
    let out_format = output_format(output, &paths)?;
    let anatomy = config.load_anatomy()?;

    let mut readers = paths
        .iter()
        .zip(&formats)
        .map(|(path, format)| format.open(path, anatomy.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut header = Header::with_counts(0, 0);
    for reader in &readers {
        header.add_counts(reader.header().fiber_count(), reader.streamline_points());
    }
    header.dimensions = Some([1, 1, 1]);
    header.origin = Some([1.0, 1.0, 1.0]);

    let mut writer = out_format.create(output, &header, anatomy.as_ref())?;
    merge(&mut readers, writer.as_mut(), config)
}

/// Apply `affine` to every point of `input`, writing the result to `output`.
pub fn transform_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    affine: &Affine,
    config: &ConvertConfig,
) -> Result<usize> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let in_format = input_format(input)?;
    let out_format = output_format(output, &[input])?;
    let anatomy = config.load_anatomy()?;

    let mut reader = in_format.open(input, anatomy.as_ref())?;
    let mut writer = out_format.create(output, &sink_header(reader.as_ref()), anatomy.as_ref())?;
    transform(reader.as_mut(), writer.as_mut(), affine, config)
}
