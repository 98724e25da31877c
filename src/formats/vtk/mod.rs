//! Legacy VTK POLYDATA streamlines.
//!
//! Points live in one shared `POINTS` pool; each streamline is a `LINES`
//! record holding a point count followed by that many indices into the pool.
//! Binary payloads are big endian. ASCII files are converted to a temporary
//! binary copy (see [`ascii`]) before anything else is read.
//!
//! Files written here reserve zero-filled space for the final number of
//! points and lines at creation, so the header must carry both counts.

pub mod ascii;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::binary::{encode_array, read_array, Endianness};
use crate::error::{Error, Result};
use crate::formats::{file_len, read_first_line, Format, StreamlineIter, StreamlineReader, StreamlineWriter};
use crate::header::Header;
use crate::{streamline_from_flat, Streamline};

/// Substring identifying the first line of a VTK file.
pub const MAGIC_NUMBER: &str = "vtk";

/// Legacy format version written in new files.
pub const VERSION: &str = "3.0";

/// Line-section values read per I/O round trip.
pub const LINE_BATCH: usize = 65_536;

/// True when the first line of `path` mentions `vtk`.
pub fn check(path: &Path) -> Result<bool> {
    let line = read_first_line(path, 256)?;
    Ok(line
        .windows(MAGIC_NUMBER.len())
        .any(|w| w == MAGIC_NUMBER.as_bytes()))
}

// ============================================================================
// Sections
// ============================================================================

/// Encoding of the section payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// Big-endian binary values.
    Binary,
    /// Whitespace-separated text.
    Ascii,
}

/// The four header lines preceding the sections.
#[derive(Debug, Clone, PartialEq)]
pub struct Preamble {
    /// Version line, e.g. `# vtk DataFile Version 3.0`.
    pub version: String,
    /// Free-form description line.
    pub description: String,
    /// Payload encoding.
    pub mode: DataMode,
}

/// Read and validate the four preamble lines.
pub fn read_preamble<R: BufRead>(reader: &mut R) -> Result<Preamble> {
    let mut lines = [String::new(), String::new(), String::new(), String::new()];
    for line in lines.iter_mut() {
        if reader.read_line(line)? == 0 {
            return Err(Error::InvalidHeader("VTK preamble is truncated".into()));
        }
    }
    let [version, description, mode, dataset] = lines.map(|l| l.trim().to_string());

    if !version.contains(MAGIC_NUMBER) {
        return Err(Error::InvalidHeader(format!("not a VTK version line: '{version}'")));
    }
    let mode = match mode.to_ascii_uppercase().as_str() {
        "BINARY" => DataMode::Binary,
        "ASCII" => DataMode::Ascii,
        other => return Err(Error::InvalidHeader(format!("unknown VTK data mode '{other}'"))),
    };
    if dataset.split_whitespace().nth(1) != Some("POLYDATA") {
        return Err(Error::InvalidHeader(format!(
            "unsupported VTK dataset '{dataset}', expected POLYDATA"
        )));
    }

    Ok(Preamble {
        version,
        description,
        mode,
    })
}

/// POLYDATA section keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Points,
    Vertices,
    Lines,
    Polygons,
    TriangleStrips,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Points,
        SectionKind::Vertices,
        SectionKind::Lines,
        SectionKind::Polygons,
        SectionKind::TriangleStrips,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Points => "POINTS",
            Self::Vertices => "VERTICES",
            Self::Lines => "LINES",
            Self::Polygons => "POLYGONS",
            Self::TriangleStrips => "TRIANGLE_STRIPS",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == word)
    }
}

/// Scalar type of the point pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointType {
    Float,
    Double,
}

impl PointType {
    pub const fn size(self) -> usize {
        match self {
            Self::Float => 4,
            Self::Double => 8,
        }
    }
}

/// A parsed section keyword line.
///
/// `POINTS n type` fills `count` and `point_type`; cell sections
/// (`LINES n size` and friends) fill `count` and `size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionLine {
    pub kind: SectionKind,
    pub count: usize,
    pub size: usize,
    pub point_type: Option<PointType>,
}

impl SectionLine {
    /// Parse a keyword line; `None` when it does not start a section.
    pub fn parse(line: &[u8]) -> Result<Option<Self>> {
        let text = String::from_utf8_lossy(line);
        let mut words = text.split_whitespace();
        let Some(kind) = words.next().and_then(SectionKind::from_keyword) else {
            return Ok(None);
        };

        let bad = || Error::InvalidHeader(format!("malformed VTK section line '{}'", text.trim()));
        let count: usize = words.next().and_then(|w| w.parse().ok()).ok_or_else(bad)?;

        let (size, point_type) = if kind == SectionKind::Points {
            let point_type = match words.next() {
                Some("float") => PointType::Float,
                Some("double") => PointType::Double,
                other => {
                    return Err(Error::InvalidHeader(format!(
                        "unsupported VTK point type {other:?}"
                    )))
                }
            };
            (count * 3, Some(point_type))
        } else {
            let size: usize = words.next().and_then(|w| w.parse().ok()).ok_or_else(bad)?;
            (size, None)
        };

        Ok(Some(Self {
            kind,
            count,
            size,
            point_type,
        }))
    }

    /// Read one line from `reader` and parse it as a section line.
    pub fn read<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        Self::parse(&line)?.ok_or_else(|| {
            Error::InvalidHeader(format!(
                "expected a VTK section, got '{}'",
                String::from_utf8_lossy(&line).trim()
            ))
        })
    }

    /// Bytes of binary payload following the keyword line.
    fn payload_len(&self) -> u64 {
        let width = self.point_type.map_or(4, PointType::size);
        (self.size * width) as u64
    }
}

/// Byte offset of every section keyword line in `path`.
///
/// In binary mode each section's payload is skipped using the sizes its
/// keyword line declares, so payload bytes are never mistaken for keywords.
pub fn scan_sections(path: &Path, mode: DataMode) -> Result<HashMap<SectionKind, u64>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut sections = HashMap::new();
    let mut offset = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        let start = offset;
        offset += n as u64;

        let Some(section) = SectionLine::parse(&line)? else {
            continue;
        };
        if sections.insert(section.kind, start).is_some() {
            tracing::warn!(section = section.kind.keyword(), "multiple VTK sections; keeping the last");
        }
        if mode == DataMode::Binary {
            let skip = section.payload_len();
            reader.seek_relative(skip as i64)?;
            offset += skip;
        }
    }
    Ok(sections)
}

// ============================================================================
// Reader
// ============================================================================

/// Location and layout of the point pool.
#[derive(Debug, Clone, Copy)]
struct PointPool {
    offset: u64,
    len: usize,
    point_type: PointType,
}

impl PointPool {
    /// Points `indices` refer to, read as one contiguous `[min, max]` slice.
    fn gather(&self, file: &mut File, indices: &[i32]) -> Result<Streamline> {
        let (Some(&lo), Some(&hi)) = (indices.iter().min(), indices.iter().max()) else {
            return streamline_from_flat(Vec::new());
        };
        if lo < 0 || hi as usize >= self.len {
            return Err(Error::InvalidData(format!(
                "VTK point index {} outside pool of {} points",
                if lo < 0 { lo } else { hi },
                self.len
            )));
        }
        let (lo, hi) = (lo as usize, hi as usize);

        let width = 3 * self.point_type.size();
        file.seek(SeekFrom::Start(self.offset + (lo * width) as u64))?;
        let count = (hi - lo + 1) * 3;
        let pool: Vec<f32> = match self.point_type {
            PointType::Float => read_array(file, count, Endianness::Big)?,
            PointType::Double => read_array::<f64, _>(file, count, Endianness::Big)?
                .into_iter()
                .map(|v| v as f32)
                .collect(),
        };

        let mut values = Vec::with_capacity(indices.len() * 3);
        for &i in indices {
            let row = (i as usize - lo) * 3;
            values.extend_from_slice(&pool[row..row + 3]);
        }
        streamline_from_flat(values)
    }
}

/// A `.vtk` file opened for reading.
///
/// When the file on disk is ASCII, reads go to a binary temporary copy that
/// [`close`](StreamlineReader::close) removes (dropping the reader does too).
#[derive(Debug)]
pub struct VtkReader {
    path: PathBuf,
    temp: Option<TempPath>,
    file: File,
    header: Header,
    points: PointPool,
    /// Offset and declared value count of the LINES payload.
    lines: Option<(u64, usize)>,
}

impl VtkReader {
    /// Open `path`, normalizing it to binary first if it is ASCII.
    pub fn open(path: &Path) -> Result<Self> {
        if !check(path)? {
            return Err(Error::mismatch(Format::Vtk, path));
        }

        let preamble = read_preamble(&mut BufReader::new(File::open(path)?))?;
        let temp = match preamble.mode {
            DataMode::Binary => None,
            DataMode::Ascii => Some(ascii::to_binary(path)?),
        };
        let physical = temp.as_deref().unwrap_or(path);

        let sections = scan_sections(physical, DataMode::Binary)?;
        let mut reader = BufReader::new(File::open(physical)?);

        let points_at = *sections
            .get(&SectionKind::Points)
            .ok_or_else(|| Error::InvalidHeader("VTK file has no POINTS section".into()))?;
        reader.seek(SeekFrom::Start(points_at))?;
        let points_line = SectionLine::read(&mut reader)?;
        let points = PointPool {
            offset: reader.stream_position()?,
            len: points_line.count,
            point_type: points_line.point_type.unwrap_or(PointType::Float),
        };

        let mut nb_fibers = 0;
        let mut lines = None;
        if let Some(&lines_at) = sections.get(&SectionKind::Lines) {
            reader.seek(SeekFrom::Start(lines_at))?;
            let lines_line = SectionLine::read(&mut reader)?;
            nb_fibers = lines_line.count;
            lines = Some((reader.stream_position()?, lines_line.size));
        }

        let mut header = Header::with_counts(nb_fibers, points.len);
        header.magic_number = Some(MAGIC_NUMBER.to_string());
        header.endian = Some(Endianness::Big);

        Ok(Self {
            path: path.to_path_buf(),
            temp,
            file: reader.into_inner(),
            header,
            points,
            lines,
        })
    }

    /// Path of the logical (possibly ASCII) file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the binary file actually being read.
    pub fn data_path(&self) -> &Path {
        self.temp.as_deref().unwrap_or(self.path.as_path())
    }
}

impl StreamlineReader for VtkReader {
    fn format(&self) -> Format {
        Format::Vtk
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn streamlines(&mut self) -> Result<StreamlineIter<'_>> {
        let (cursor, words_left, remaining) = match self.lines {
            Some((offset, size)) => {
                let available = (file_len(&self.file)?.saturating_sub(offset) / 4) as usize;
                (offset, size.min(available), self.header.fiber_count())
            }
            None => (0, 0, 0),
        };
        Ok(Box::new(VtkStreamlines {
            file: &mut self.file,
            points: self.points,
            cursor,
            words_left,
            words: Vec::new(),
            pos: 0,
            remaining,
        }))
    }

    /// LINES values minus one length word per line. Indices may repeat, so
    /// this can exceed the POINTS pool size in the header.
    fn streamline_points(&self) -> usize {
        self.lines
            .map_or(0, |(_, size)| size.saturating_sub(self.header.fiber_count()))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(temp) = self.temp.take() {
            let shown = temp.display().to_string();
            temp.close()?;
            tracing::debug!(temp = %shown, "removed normalized VTK copy");
        }
        Ok(())
    }
}

/// Cursor over LINES records, reading them in batches.
struct VtkStreamlines<'a> {
    file: &'a mut File,
    points: PointPool,
    /// File offset of the next unread LINES value.
    cursor: u64,
    /// LINES values not yet read from disk.
    words_left: usize,
    /// Buffered LINES values; `pos` is the first unconsumed one.
    words: Vec<i32>,
    pos: usize,
    /// Streamlines still to yield.
    remaining: usize,
}

impl VtkStreamlines<'_> {
    /// Make at least `n` buffered values available; false if the section
    /// runs out first.
    fn ensure(&mut self, n: usize) -> Result<bool> {
        let available = self.words.len() - self.pos;
        if available >= n {
            return Ok(true);
        }
        let want = (n - available).max(LINE_BATCH).min(self.words_left);
        if want > 0 {
            self.words.drain(..self.pos);
            self.pos = 0;
            self.file.seek(SeekFrom::Start(self.cursor))?;
            let batch: Vec<i32> = read_array(&mut *self.file, want, Endianness::Big)?;
            self.words.extend(batch);
            self.cursor += (want * 4) as u64;
            self.words_left -= want;
        }
        Ok(self.words.len() - self.pos >= n)
    }

    fn read_line(&mut self) -> Result<Option<Streamline>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if !self.ensure(1)? {
            tracing::warn!(missing = self.remaining, "VTK LINES section ends early");
            self.remaining = 0;
            return Ok(None);
        }
        let n = self.words[self.pos];
        let n = usize::try_from(n)
            .map_err(|_| Error::InvalidData(format!("negative VTK line length {n}")))?;
        if !self.ensure(1 + n)? {
            tracing::warn!(points = n, "VTK line record truncated; dropping it");
            self.remaining = 0;
            return Ok(None);
        }

        let start = self.pos + 1;
        self.pos = start + n;
        self.remaining -= 1;
        let indices = &self.words[start..start + n];
        self.points.gather(&mut *self.file, indices).map(Some)
    }
}

impl Iterator for VtkStreamlines<'_> {
    type Item = Result<Streamline>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_line() {
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

/// A `.vtk` file opened for incremental writing.
///
/// Creation lays out both sections at their final size; appends fill the
/// point pool and the LINES section from the front, each with its own cursor.
#[derive(Debug)]
pub struct VtkWriter {
    file: File,
    header: Header,
    reserved_points: usize,
    reserved_fibers: usize,
    points_cursor: u64,
    lines_cursor: Option<u64>,
    closed: bool,
}

impl VtkWriter {
    /// Create `path` with room for the counts announced by `header`.
    pub fn create(path: &Path, header: &Header) -> Result<Self> {
        let reserved_points = header.nb_points.ok_or_else(|| {
            Error::InvalidHeader("VTK output needs the total point count up front".into())
        })?;
        let reserved_fibers = header.nb_fibers.ok_or_else(|| {
            Error::InvalidHeader("VTK output needs the streamline count up front".into())
        })?;
        if reserved_points > i32::MAX as usize {
            return Err(Error::InvalidHeader(format!(
                "{reserved_points} points exceed VTK's i32 indices"
            )));
        }

        let mut header = header.clone();
        header.nb_fibers = Some(0);
        header.nb_points = Some(0);
        header.magic_number = Some(MAGIC_NUMBER.to_string());
        header.endian = Some(Endianness::Big);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        write!(
            file,
            "# {MAGIC_NUMBER} DataFile Version {VERSION}\nvtk comments\nBINARY\nDATASET POLYDATA\n"
        )?;
        writeln!(file, "POINTS {reserved_points} float")?;
        let points_cursor = file.stream_position()?;
        write_zeros(&mut file, reserved_points as u64 * 12)?;
        file.write_all(b"\n")?;

        let mut lines_cursor = None;
        if reserved_fibers > 0 {
            let size = reserved_fibers + reserved_points;
            writeln!(file, "LINES {reserved_fibers} {size}")?;
            lines_cursor = Some(file.stream_position()?);
            write_zeros(&mut file, size as u64 * 4)?;
        }
        file.flush()?;

        Ok(Self {
            file,
            header,
            reserved_points,
            reserved_fibers,
            points_cursor,
            lines_cursor,
            closed: false,
        })
    }
}

fn write_zeros(file: &mut File, len: u64) -> Result<()> {
    io::copy(&mut io::repeat(0).take(len), file)?;
    Ok(())
}

impl StreamlineWriter for VtkWriter {
    fn format(&self) -> Format {
        Format::Vtk
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

        let written_points = self.header.point_count();
        let written_fibers = self.header.fiber_count();
        let nb_points: usize = streamlines.iter().map(|s| s.nrows()).sum();
        if written_points + nb_points > self.reserved_points {
            return Err(Error::CapacityExceeded {
                reserved: self.reserved_points,
                requested: written_points + nb_points,
            });
        }
        if written_fibers + streamlines.len() > self.reserved_fibers {
            return Err(Error::CapacityExceeded {
                reserved: self.reserved_fibers,
                requested: written_fibers + streamlines.len(),
            });
        }
        let Some(lines_cursor) = self.lines_cursor else {
            return Err(Error::CapacityExceeded {
                reserved: 0,
                requested: streamlines.len(),
            });
        };

        let values: Vec<f32> = streamlines.iter().flat_map(|s| s.iter().copied()).collect();
        let point_bytes = encode_array(&values, Endianness::Big);

        // Bounded by reserved_points, which fits i32.
        let mut next = written_points as i32;
        let mut records = Vec::with_capacity(streamlines.len() + nb_points);
        for points in streamlines {
            let n = points.nrows() as i32;
            records.push(n);
            records.extend(next..next + n);
            next += n;
        }
        let line_bytes = encode_array(&records, Endianness::Big);

        self.file.seek(SeekFrom::Start(self.points_cursor))?;
        self.file.write_all(&point_bytes)?;
        self.file.seek(SeekFrom::Start(lines_cursor))?;
        self.file.write_all(&line_bytes)?;
        self.file.flush()?;

        self.points_cursor += point_bytes.len() as u64;
        self.lines_cursor = Some(lines_cursor + line_bytes.len() as u64);
        self.header.add_counts(streamlines.len(), nb_points);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.header.fiber_count() < self.reserved_fibers
            || self.header.point_count() < self.reserved_points
        {
            tracing::warn!(
                fibers = self.header.fiber_count(),
                reserved_fibers = self.reserved_fibers,
                points = self.header.point_count(),
                reserved_points = self.reserved_points,
                "VTK file closed with unused reserved space"
            );
        }
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn two_lines() -> Vec<Streamline> {
        vec![
            array![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]],
            array![[2.0f32, 3.0, 4.0], [5.0, 6.0, 7.0], [8.0, 9.0, 10.0]],
        ]
    }

    #[test]
    fn test_section_line_parse() {
        let points = SectionLine::parse(b"POINTS 12 double\n").unwrap().unwrap();
        assert_eq!(points.kind, SectionKind::Points);
        assert_eq!(points.point_type, Some(PointType::Double));
        assert_eq!(points.payload_len(), 12 * 3 * 8);

        let lines = SectionLine::parse(b"LINES 2 14").unwrap().unwrap();
        assert_eq!((lines.count, lines.size), (2, 14));
        assert_eq!(lines.payload_len(), 56);

        assert!(SectionLine::parse(b"POINT_DATA 12").unwrap().is_none());
        assert!(SectionLine::parse(b"POINTS 3 int").is_err());
    }

    #[test]
    fn test_written_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.vtk");
        let mut writer = VtkWriter::create(&path, &Header::with_counts(2, 5)).unwrap();
        writer.append(&two_lines()).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let head = b"# vtk DataFile Version 3.0\nvtk comments\nBINARY\nDATASET POLYDATA\nPOINTS 5 float\n";
        assert!(bytes.starts_with(head));
        let lines_at = head.len() + 5 * 12 + 1;
        assert!(bytes[lines_at..].starts_with(b"LINES 2 7\n"));
        let records: Vec<i32> = crate::binary::decode_array(&bytes[lines_at + 10..], Endianness::Big);
        assert_eq!(records, vec![2, 0, 1, 3, 2, 3, 4]);

        let sections = scan_sections(&path, DataMode::Binary).unwrap();
        assert_eq!(sections[&SectionKind::Points], (head.len() - "POINTS 5 float\n".len()) as u64);
        assert_eq!(sections[&SectionKind::Lines], lines_at as u64);
    }

    #[test]
    fn test_roundtrip_across_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.vtk");
        let streamlines = two_lines();

        let mut writer = VtkWriter::create(&path, &Header::with_counts(2, 5)).unwrap();
        writer.append(&streamlines[..1]).unwrap();
        writer.append(&streamlines[1..]).unwrap();
        assert_eq!(writer.header().nb_fibers, Some(2));
        writer.close().unwrap();

        let mut reader = VtkReader::open(&path).unwrap();
        assert_eq!(reader.header().nb_fibers, Some(2));
        assert_eq!(reader.header().nb_points, Some(5));
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(read, streamlines);
    }

    #[test]
    fn test_capacity_exceeded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.vtk");
        let mut writer = VtkWriter::create(&path, &Header::with_counts(1, 2)).unwrap();
        let err = writer.append(&two_lines()).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { reserved: 2, requested: 5 }));
    }

    #[test]
    fn test_create_requires_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nocount.vtk");
        assert!(matches!(
            VtkWriter::create(&path, &Header::new()),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_scattered_indices_and_doubles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scattered.vtk");
        let mut bytes = b"# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\nPOINTS 3 double\n".to_vec();
        bytes.extend(encode_array(&[0.0f64, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0], Endianness::Big));
        bytes.extend(b"\nLINES 2 7\n");
        bytes.extend(encode_array(&[3i32, 2, 0, 1, 2, 1, 1], Endianness::Big));
        std::fs::write(&path, bytes).unwrap();

        let mut reader = VtkReader::open(&path).unwrap();
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(
            read,
            vec![
                array![[2.0f32, 2.0, 2.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
                array![[1.0f32, 1.0, 1.0], [1.0, 1.0, 1.0]],
            ]
        );
    }

    #[test]
    fn test_shared_indices_expand_point_total() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.vtk");
        let mut bytes = b"# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\nPOINTS 3 float\n".to_vec();
        bytes.extend(encode_array(&[0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0], Endianness::Big));
        bytes.extend(b"\nLINES 2 8\n");
        bytes.extend(encode_array(&[3i32, 0, 1, 2, 3, 2, 1, 0], Endianness::Big));
        std::fs::write(&path, bytes).unwrap();

        let mut reader = VtkReader::open(&path).unwrap();
        assert_eq!(reader.header().nb_points, Some(3));
        assert_eq!(reader.streamline_points(), 6);
        let total: usize = reader.streamlines().unwrap().map(|s| s.unwrap().nrows()).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_index_out_of_pool() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("oob.vtk");
        let mut bytes = b"# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\nPOINTS 1 float\n".to_vec();
        bytes.extend(encode_array(&[0.0f32, 0.0, 0.0], Endianness::Big));
        bytes.extend(b"\nLINES 1 3\n");
        bytes.extend(encode_array(&[2i32, 0, 5], Endianness::Big));
        std::fs::write(&path, bytes).unwrap();

        let mut reader = VtkReader::open(&path).unwrap();
        let first = reader.streamlines().unwrap().next().unwrap();
        assert!(matches!(first, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_ascii_input_uses_temp_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ascii.vtk");
        std::fs::write(
            &path,
            "# vtk DataFile Version 3.0\nascii\nASCII\nDATASET POLYDATA\nPOINTS 2 float\n1 2 3\n4 5 6\nLINES 1 3\n2 0 1\n",
        )
        .unwrap();

        let mut reader = VtkReader::open(&path).unwrap();
        let temp = reader.data_path().to_path_buf();
        assert_ne!(temp, path);
        assert!(temp.exists());
        let read: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(read, vec![array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]]);

        reader.close().unwrap();
        assert!(!temp.exists());
        assert!(path.exists());
    }

    #[test]
    fn test_no_lines_section_means_no_streamlines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.vtk");
        let mut writer = VtkWriter::create(&path, &Header::with_counts(0, 0)).unwrap();
        writer.close().unwrap();

        let mut reader = VtkReader::open(&path).unwrap();
        assert_eq!(reader.header().nb_fibers, Some(0));
        assert_eq!(reader.streamlines().unwrap().count(), 0);
    }
}
