//! Minimal ASCII `.fib` streamlines.
//!
//! Six fixed descriptive lines, a line starting with the streamline count,
//! then per streamline:
//!
//! ```text
//! <backward> <forward>
//! 1
//! x y z v        (backward points, last point first)
//! x y z v        (shared seed point, only when both counts are non-zero)
//! x y z v        (forward points)
//! ```
//!
//! Written files store every streamline as one forward segment.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::formats::{read_first_line, vtk, Format, StreamlineIter, StreamlineReader, StreamlineWriter};
use crate::header::Header;
use crate::{streamline_from_flat, Streamline};

/// Optional first line of FIB files.
pub const MAGIC_NUMBER: &str = "fib";

/// Second line of every FIB header.
const STATS_LINE: &str = "4 min max mean var";

/// Lines preceding the count line in written files.
const PREAMBLE: &str = "1 FA\n4 min max mean var\n1\n4 0 0 0 0\n4 0 0 0 0\n4 0 0 0 0\n";

const PREAMBLE_LINES: usize = 6;

/// Digits of the zero-padded count in written files.
const COUNT_WIDTH: usize = 10;

/// True when `path` is not VTK and carries the FIB header signature.
pub fn check(path: &Path) -> Result<bool> {
    if vtk::check(path)? {
        return Ok(false);
    }
    if read_first_line(path, 64)?.trim_ascii() == MAGIC_NUMBER.as_bytes() {
        return Ok(true);
    }

    let mut reader = BufReader::new(File::open(path)?).take(256);
    let mut line = Vec::new();
    for _ in 0..2 {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(false);
        }
    }
    Ok(line.starts_with(STATS_LINE.as_bytes()))
}

fn parse_point(line: &str) -> Result<[f32; 3]> {
    let mut point = [0f32; 3];
    let mut words = line.split_whitespace();
    for v in point.iter_mut() {
        *v = words
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| Error::InvalidData(format!("invalid FIB point line '{}'", line.trim())))?;
    }
    Ok(point)
}

/// Backward and forward point counts of a segment line.
fn parse_segment(line: &str) -> Result<(usize, usize)> {
    let invalid = || Error::InvalidData(format!("invalid FIB segment line '{}'", line.trim()));
    let mut words = line.split_whitespace().map(str::parse::<usize>);
    match (words.next(), words.next()) {
        (Some(Ok(backward)), Some(Ok(forward))) => Ok((backward, forward)),
        _ => Err(invalid()),
    }
}

// ============================================================================
// Reader
// ============================================================================

/// A `.fib` file opened for reading.
#[derive(Debug)]
pub struct FibReader {
    path: PathBuf,
    file: File,
    header: Header,
    data_offset: u64,
}

impl FibReader {
    /// Open `path` and derive its counts from the line structure.
    pub fn open(path: &Path) -> Result<Self> {
        if !check(path)? {
            return Err(Error::mismatch(Format::Fib, path));
        }

        let mut file = File::open(path)?;
        let mut reader = BufReader::new(&mut file);
        let mut line = String::new();
        let mut data_offset = 0u64;
        for _ in 0..=PREAMBLE_LINES {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::InvalidHeader("FIB header is truncated".into()));
            }
            data_offset += n as u64;
        }
        let nb_fibers: usize = line
            .split_whitespace()
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| Error::InvalidHeader(format!("invalid FIB count line '{}'", line.trim())))?;

        // Walk the segment lines too: a block with both segments repeats
        // its seed point, and that line is not part of the streamline.
        let mut nb_lines = 0usize;
        let mut shared = 0usize;
        let mut blocks = 0usize;
        let mut skip = 0usize;
        let mut buf = String::new();
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            nb_lines += 1;
            if skip > 0 {
                skip -= 1;
                continue;
            }
            if blocks == nb_fibers {
                continue;
            }
            blocks += 1;
            match parse_segment(&buf) {
                Ok((backward, forward)) => {
                    if backward > 0 && forward > 0 {
                        shared += 1;
                    }
                    skip = backward.saturating_add(forward).saturating_add(1);
                }
                Err(_) => blocks = nb_fibers,
            }
        }
        drop(reader);

        let nb_points = nb_lines.saturating_sub(2 * nb_fibers).saturating_sub(shared);
        let mut header = Header::with_counts(nb_fibers, nb_points);
        header.magic_number = Some(MAGIC_NUMBER.to_string());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            data_offset,
        })
    }

    /// Path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StreamlineReader for FibReader {
    fn format(&self) -> Format {
        Format::Fib
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn streamlines(&mut self) -> Result<StreamlineIter<'_>> {
        self.file.seek(SeekFrom::Start(self.data_offset))?;
        Ok(Box::new(FibStreamlines {
            reader: BufReader::new(&mut self.file),
            remaining: self.header.fiber_count(),
            line: String::new(),
        }))
    }
}

/// Line cursor over the streamline blocks.
struct FibStreamlines<'a> {
    reader: BufReader<&'a mut File>,
    remaining: usize,
    line: String,
}

impl FibStreamlines<'_> {
    /// Next line, `None` at end of file.
    fn next_line(&mut self) -> Result<Option<&str>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(&self.line))
    }

    /// `count` point lines; `None` if the file ends first.
    fn read_points(&mut self, count: usize) -> Result<Option<Vec<[f32; 3]>>> {
        let mut points = Vec::new();
        for _ in 0..count {
            let Some(line) = self.next_line()? else {
                return Ok(None);
            };
            points.push(parse_point(line)?);
        }
        Ok(Some(points))
    }

    fn read_block(&mut self) -> Result<Option<Streamline>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let Some(line) = self.next_line()? else {
            tracing::warn!(missing = self.remaining, "FIB file ends before its declared count");
            self.remaining = 0;
            return Ok(None);
        };
        let (backward, mut forward) = parse_segment(line)?;

        let truncated = |remaining: &mut usize| -> Result<Option<Streamline>> {
            tracing::warn!("FIB streamline truncated; dropping it");
            *remaining = 0;
            Ok(None)
        };

        // placeholder
        if self.next_line()?.is_none() {
            return truncated(&mut self.remaining);
        }
        let Some(mut points) = self.read_points(backward)? else {
            return truncated(&mut self.remaining);
        };
        points.reverse();
        if backward > 0 && forward > 0 {
            if self.next_line()?.is_none() {
                return truncated(&mut self.remaining);
            }
            forward -= 1;
        }
        let Some(tail) = self.read_points(forward)? else {
            return truncated(&mut self.remaining);
        };
        points.extend(tail);

        self.remaining -= 1;
        streamline_from_flat(points.into_iter().flatten().collect()).map(Some)
    }
}

impl Iterator for FibStreamlines<'_> {
    type Item = Result<Streamline>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_block() {
            Ok(points) => points.map(Ok),
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// A `.fib` file opened for incremental writing.
///
/// Blocks are appended at the end of the file; the zero-padded count line is
/// rewritten in place afterwards.
#[derive(Debug)]
pub struct FibWriter {
    file: File,
    header: Header,
    closed: bool,
}

impl FibWriter {
    /// Create `path` holding only the header.
    pub fn create(path: &Path, header: &Header) -> Result<Self> {
        let mut header = header.clone();
        header.nb_fibers = Some(0);
        header.nb_points = Some(0);
        header.magic_number = Some(MAGIC_NUMBER.to_string());

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        writeln!(file, "{PREAMBLE}{:0width$} 0.5", 0, width = COUNT_WIDTH)?;
        file.flush()?;

        Ok(Self {
            file,
            header,
            closed: false,
        })
    }
}

impl StreamlineWriter for FibWriter {
    fn format(&self) -> Format {
        Format::Fib
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn append(&mut self, streamlines: &[Streamline]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if streamlines.is_empty() {
            return Ok(());
        }

        let new_count = self.header.fiber_count() + streamlines.len();
        if new_count.to_string().len() > COUNT_WIDTH {
            return Err(Error::InvalidHeader(format!(
                "streamline count {new_count} exceeds the count field"
            )));
        }

        let mut text = String::new();
        let mut nb_points = 0;
        for points in streamlines {
            text.push_str(&format!("0 {}\n1\n", points.nrows()));
            for p in points.rows() {
                text.push_str(&format!("{} {} {} 0\n", p[0], p[1], p[2]));
            }
            nb_points += points.nrows();
        }

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(text.as_bytes())?;
        self.file.seek(SeekFrom::Start(PREAMBLE.len() as u64))?;
        write!(self.file, "{new_count:0width$}", width = COUNT_WIDTH)?;
        self.file.flush()?;

        self.header.add_counts(streamlines.len(), nb_points);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.file.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_written_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.fib");
        let mut writer = FibWriter::create(&path, &Header::new()).unwrap();
        writer
            .append(&[array![[1.5f32, 2.0, -3.25], [0.0, 0.0, 1.0]]])
            .unwrap();
        writer.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "1 FA\n4 min max mean var\n1\n4 0 0 0 0\n4 0 0 0 0\n4 0 0 0 0\n\
             0000000001 0.5\n0 2\n1\n1.5 2 -3.25 0\n0 0 1 0\n"
        );
    }

    #[test]
    fn test_roundtrip_and_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.fib");
        let streamlines = vec![
            array![[0.1f32, 0.2, 0.3]],
            array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
        ];

        let mut writer = FibWriter::create(&path, &Header::new()).unwrap();
        writer.append(&streamlines[..1]).unwrap();
        writer.append(&streamlines[1..]).unwrap();
        writer.close().unwrap();

        assert!(check(&path).unwrap());
        let mut reader = FibReader::open(&path).unwrap();
        assert_eq!(reader.header().nb_fibers, Some(2));
        assert_eq!(reader.header().nb_points, Some(4));
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(read, streamlines);
    }

    #[test]
    fn test_backward_segment_and_shared_seed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seeded.fib");
        std::fs::write(
            &path,
            "fib\n4 min max mean var\n1\n4 0 0 0 0\n4 0 0 0 0\n4 0 0 0 0\n1 0.5\n\
             2 3\n1\n\
             2 0 0 0\n1 0 0 0\n\
             1 0 0 0\n\
             3 0 0 0\n4 0 0 0\n",
        )
        .unwrap();

        let mut reader = FibReader::open(&path).unwrap();
        // the repeated seed line is not counted
        assert_eq!(reader.header().nb_points, Some(4));
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(
            read,
            vec![array![
                [1.0f32, 0.0, 0.0],
                [2.0, 0.0, 0.0],
                [3.0, 0.0, 0.0],
                [4.0, 0.0, 0.0]
            ]]
        );
    }

    #[test]
    fn test_vtk_is_not_fib() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("looks.fib");
        std::fs::write(&path, "# vtk DataFile Version 3.0\n4 min max mean var\n").unwrap();
        assert!(!check(&path).unwrap());
    }

    #[test]
    fn test_bad_coordinate_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.fib");
        std::fs::write(&path, format!("{PREAMBLE}1 0.5\n0 1\n1\nx 0 0 0\n")).unwrap();

        let mut reader = FibReader::open(&path).unwrap();
        let first = reader.streamlines().unwrap().next().unwrap();
        assert!(matches!(first, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_truncated_block_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cut.fib");
        std::fs::write(
            &path,
            format!("{PREAMBLE}2 0.5\n0 1\n1\n1 1 1 0\n0 3\n1\n2 2 2 0\n"),
        )
        .unwrap();

        let mut reader = FibReader::open(&path).unwrap();
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(read, vec![array![[1.0f32, 1.0, 1.0]]]);
    }

    #[test]
    fn test_huge_segment_count_is_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.fib");
        std::fs::write(
            &path,
            format!("{PREAMBLE}1 0.5\n0 1000000000000000000\n1\n1 1 1 0\n"),
        )
        .unwrap();

        let mut reader = FibReader::open(&path).unwrap();
        assert_eq!(reader.header().nb_points, Some(1));
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn test_segment_line_parse() {
        assert_eq!(parse_segment("2 3\n").unwrap(), (2, 3));
        assert!(matches!(parse_segment("2\n"), Err(Error::InvalidData(_))));
        assert!(matches!(parse_segment("-1 3\n"), Err(Error::InvalidData(_))));
    }
}
