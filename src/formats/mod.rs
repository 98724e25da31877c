//! Streamline file formats and format detection.
//!
//! Every format provides a reader (a [`StreamlineReader`] yielding streamlines
//! lazily, in file order) and a writer (a [`StreamlineWriter`] accepting
//! batches through [`StreamlineWriter::append`]). [`Format`] is the registry
//! tying file extensions and signatures to those codecs.

pub mod fib;
pub mod tck;
pub mod trk;
pub mod vtk;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::anatomy::AnatomyGeometry;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::Streamline;

/// Lazy sequence of streamlines produced by a reader.
pub type StreamlineIter<'a> = Box<dyn Iterator<Item = Result<Streamline>> + 'a>;

/// A streamline file opened for reading.
pub trait StreamlineReader {
    /// Format of the underlying file.
    fn format(&self) -> Format;

    /// Header as loaded from the file.
    fn header(&self) -> &Header;

    /// Iterate over the streamlines, in file order.
    ///
    /// The sequence is single-pass: it reads straight from the open file and
    /// each call starts again from the first streamline.
    fn streamlines(&mut self) -> Result<StreamlineIter<'_>>;

    /// Total number of points the streamlines expand to.
    ///
    /// Equal to the header's point count unless the format lets streamlines
    /// share stored points.
    fn streamline_points(&self) -> usize {
        self.header().point_count()
    }

    /// Release resources held beyond the file handle.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A streamline file opened for incremental writing.
pub trait StreamlineWriter {
    /// Format of the underlying file.
    fn format(&self) -> Format;

    /// Header, with counts updated by every append.
    fn header(&self) -> &Header;

    /// Write a batch of streamlines and bring the on-disk counts up to date.
    fn append(&mut self, streamlines: &[Streamline]) -> Result<()>;

    /// Finalize the file. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Supported streamline formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// MRtrix `.tck`
    Tck,
    /// TrackVis `.trk`
    Trk,
    /// Legacy VTK POLYDATA `.vtk`
    Vtk,
    /// ASCII fiber `.fib`
    Fib,
}

impl Format {
    /// All formats, in detection order. VTK precedes FIB so that a file
    /// carrying both signatures is reported as VTK.
    pub const ALL: [Format; 4] = [Format::Tck, Format::Trk, Format::Vtk, Format::Fib];

    /// File extension without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Tck => "tck",
            Self::Trk => "trk",
            Self::Vtk => "vtk",
            Self::Fib => "fib",
        }
    }

    /// Look a format up by the extension of `path`.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Test the content of an existing file against this format's signature.
    pub fn check(self, path: &Path) -> Result<bool> {
        match self {
            Self::Tck => tck::check(path),
            Self::Trk => trk::check(path),
            Self::Vtk => vtk::check(path),
            Self::Fib => fib::check(path),
        }
    }

    /// Open an existing file for reading.
    pub fn open(
        self,
        path: &Path,
        anatomy: Option<&AnatomyGeometry>,
    ) -> Result<Box<dyn StreamlineReader>> {
        Ok(match self {
            Self::Tck => Box::new(tck::TckReader::open(path, anatomy)?),
            Self::Trk => Box::new(trk::TrkReader::open(path, anatomy)?),
            Self::Vtk => Box::new(vtk::VtkReader::open(path)?),
            Self::Fib => Box::new(fib::FibReader::open(path)?),
        })
    }

    /// Create (or truncate) a file for writing.
    ///
    /// `header` is copied; the writer owns its own header from then on.
    pub fn create(
        self,
        path: &Path,
        header: &Header,
        anatomy: Option<&AnatomyGeometry>,
    ) -> Result<Box<dyn StreamlineWriter>> {
        Ok(match self {
            Self::Tck => Box::new(tck::TckWriter::create(path, header, anatomy)?),
            Self::Trk => Box::new(trk::TrkWriter::create(path, header)?),
            Self::Vtk => Box::new(vtk::VtkWriter::create(path, header)?),
            Self::Fib => Box::new(fib::FibWriter::create(path, header)?),
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == name)
            .ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

/// Detect the format of `path`.
///
/// Existing files are identified by content alone; paths that do not exist
/// yet fall back to their extension.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<Format> {
    let path = path.as_ref();
    if !path.is_file() {
        return Format::from_extension(path);
    }

    Format::ALL.into_iter().find(|format| match format.check(path) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::debug!(%format, path = %path.display(), error = %e, "signature check failed");
            false
        }
    })
}

/// True when [`detect_format`] recognizes `path`.
pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
    detect_format(path).is_some()
}

/// Open `path` with whichever codec recognizes it.
pub fn open<P: AsRef<Path>>(
    path: P,
    anatomy: Option<&AnatomyGeometry>,
) -> Result<Box<dyn StreamlineReader>> {
    let path = path.as_ref();
    let format = detect_format(path)
        .ok_or_else(|| Error::UnknownFormat(path.display().to_string()))?;
    format.open(path, anatomy)
}

/// Read the first line of a file, without its terminator.
///
/// At most `limit` bytes are examined.
pub(crate) fn read_first_line(path: &Path, limit: usize) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut bytes = Vec::with_capacity(limit);
    std::fs::File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut bytes)?;
    if let Some(end) = bytes.iter().position(|&b| b == b'\n') {
        bytes.truncate(end);
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    Ok(bytes)
}

/// Seek position of the end of a file.
pub(crate) fn file_len(file: &std::fs::File) -> Result<u64> {
    Ok(file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(Format::from_extension(Path::new("a/b.TRK")), Some(Format::Trk));
        assert_eq!(Format::from_extension(Path::new("x.vtk")), Some(Format::Vtk));
        assert_eq!(Format::from_extension(Path::new("x.nii")), None);
        assert_eq!(Format::from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_from_str_and_display() {
        assert_eq!("tck".parse::<Format>().unwrap(), Format::Tck);
        assert_eq!(".FIB".parse::<Format>().unwrap(), Format::Fib);
        assert!("nii".parse::<Format>().is_err());
        assert_eq!(Format::Vtk.to_string(), "vtk");
    }

    #[test]
    fn test_missing_file_uses_extension() {
        let path = PathBuf::from("/nonexistent/dir/out.fib");
        assert_eq!(detect_format(&path), Some(Format::Fib));
        assert!(is_supported(&path));
        assert!(!is_supported("/nonexistent/out.txt"));
    }

    #[test]
    fn test_unknown_content_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.trk");
        std::fs::write(&path, b"hello world\n").unwrap();
        assert_eq!(detect_format(&path), None);
        assert!(open(&path, None).is_err());
    }
}
