//! MRtrix `.tck` streamlines.
//!
//! Layout: an ASCII header starting with `mrtrix tracks` and ending with an
//! `END` line, then a float32 triplet stream beginning at the byte offset
//! given by the `file: . <offset>` field. Streamlines are separated by a
//! NaN triplet; the stream ends with an infinity triplet.
//!
//! Points are stored in world space. When an anatomy is supplied, the
//! voxel-to-world affine (with voxel scaling divided out) is applied on write
//! and undone on read; without one the transform is the identity.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::anatomy::AnatomyGeometry;
use crate::binary::{decode_array, encode_array, Endianness};
use crate::error::{Error, Result};
use crate::formats::{file_len, read_first_line, Format, StreamlineIter, StreamlineReader, StreamlineWriter};
use crate::header::Header;
use crate::transform::{transform, Affine};
use crate::{streamline_from_flat, Streamline};

/// First header line.
pub const MAGIC_NUMBER: &str = "mrtrix tracks";

/// Triplets read per I/O round trip.
pub const BUFFER_SIZE: usize = 1_000_000;

const TRIPLET_BYTES: usize = 3 * 4;

/// Byte offset of the count value in headers written by [`TckWriter`].
const COUNT_OFFSET: u64 = (MAGIC_NUMBER.len() + "\ncount: ".len()) as u64;

/// Digits of the zero-padded count, wide enough that rewriting it in place
/// never changes the header length.
const COUNT_WIDTH: usize = 10;

const FIBER_DELIMITER: [f32; 3] = [f32::NAN; 3];
const EOF_DELIMITER: [f32; 3] = [f32::INFINITY; 3];

/// True when the first line of `path` is the MRtrix signature.
pub fn check(path: &Path) -> Result<bool> {
    let line = read_first_line(path, 64)?;
    Ok(line.trim_ascii() == MAGIC_NUMBER.as_bytes())
}

/// Forward transform applied to points on write.
///
/// The anatomy's voxel-to-world affine with each linear column divided by
/// the matching voxel size, so that only orientation and translation remain.
pub fn voxel_transform(anatomy: Option<&AnatomyGeometry>) -> Affine {
    let Some(anatomy) = anatomy else {
        return Affine::IDENTITY;
    };

    let mut m = anatomy.voxel_to_world;
    for (col, &size) in anatomy.voxel_sizes.iter().enumerate() {
        if size == 0.0 {
            continue;
        }
        for row in m.0.iter_mut().take(3) {
            row[col] /= size;
        }
    }
    m
}

/// Parsed `key: value` fields of a TCK header.
#[derive(Debug, Clone, PartialEq)]
struct TckFields {
    count: Option<usize>,
    endian: Endianness,
    offset: u64,
    step: Option<f32>,
    method: Option<String>,
}

fn parse_fields<R: BufRead>(reader: &mut R) -> Result<TckFields> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim() != MAGIC_NUMBER {
        return Err(Error::InvalidHeader(format!(
            "expected '{MAGIC_NUMBER}', got '{}'",
            line.trim()
        )));
    }

    let mut count = None;
    let mut endian = None;
    let mut offset = None;
    let mut step = None;
    let mut method = None;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::InvalidHeader("missing END line".into()));
        }
        let trimmed = line.trim();
        if trimmed == "END" {
            break;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "count" => count = value.parse().ok(),
            "datatype" => {
                endian = Some(match value {
                    "Float32LE" => Endianness::Little,
                    "Float32BE" => Endianness::Big,
                    other => {
                        return Err(Error::InvalidHeader(format!(
                            "unsupported datatype '{other}'"
                        )))
                    }
                })
            }
            "file" => {
                let raw = value.trim_start_matches('.').trim();
                offset = Some(raw.parse::<u64>().map_err(|_| {
                    Error::InvalidHeader(format!("invalid data offset '{value}'"))
                })?);
            }
            "step_size" => step = value.parse().ok(),
            "method" => method = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(TckFields {
        count,
        endian: endian.ok_or_else(|| Error::InvalidHeader("missing datatype".into()))?,
        offset: offset.ok_or_else(|| Error::InvalidHeader("missing file offset".into()))?,
        step,
        method,
    })
}

/// Count NaN delimiters (fibers) and finite triplets (points) up to the
/// infinity sentinel.
fn count_streamlines(file: &mut File, offset: u64, endian: Endianness) -> Result<(usize, usize)> {
    let mut remaining = file_len(file)?.saturating_sub(offset);
    file.seek(SeekFrom::Start(offset))?;

    let mut fibers = 0;
    let mut points = 0;
    let mut carry = Vec::new();
    let mut chunk = Vec::new();
    while remaining > 0 {
        let n = remaining.min((BUFFER_SIZE * TRIPLET_BYTES) as u64);
        chunk.resize(n as usize, 0);
        file.read_exact(&mut chunk)?;
        remaining -= n;

        carry.extend_from_slice(&chunk);
        let whole = carry.len() / TRIPLET_BYTES * TRIPLET_BYTES;
        let values: Vec<f32> = decode_array(&carry[..whole], endian);
        carry.drain(..whole);

        for triplet in values.chunks_exact(3) {
            if triplet[0].is_nan() {
                fibers += 1;
            } else if triplet[0].is_infinite() {
                return Ok((fibers, points));
            } else {
                points += 1;
            }
        }
    }
    Ok((fibers, points))
}

// ============================================================================
// Reader
// ============================================================================

/// A `.tck` file opened for reading.
#[derive(Debug)]
pub struct TckReader {
    path: PathBuf,
    file: File,
    header: Header,
    endian: Endianness,
    offset: u64,
    inverse: Affine,
}

impl TckReader {
    /// Open `path`, parse its header and count its streamlines.
    pub fn open(path: &Path, anatomy: Option<&AnatomyGeometry>) -> Result<Self> {
        if !check(path)? {
            return Err(Error::mismatch(Format::Tck, path));
        }

        let mut file = File::open(path)?;
        let fields = parse_fields(&mut BufReader::new(&mut file))?;
        let inverse = voxel_transform(anatomy).inverse()?;

        let (nb_fibers, nb_points) = count_streamlines(&mut file, fields.offset, fields.endian)?;
        if fields.count.is_some_and(|c| c != nb_fibers) {
            tracing::debug!(
                declared = ?fields.count,
                found = nb_fibers,
                path = %path.display(),
                "TCK count field differs from delimiter count"
            );
        }

        let mut header = Header::with_counts(nb_fibers, nb_points);
        header.magic_number = Some(MAGIC_NUMBER.to_string());
        header.endian = Some(fields.endian);
        header.step = fields.step;
        header.method = fields.method;
        if let Some(anatomy) = anatomy {
            header.apply_anatomy(anatomy);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            endian: fields.endian,
            offset: fields.offset,
            inverse,
        })
    }

    /// Path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first triplet.
    pub fn data_offset(&self) -> u64 {
        self.offset
    }
}

impl StreamlineReader for TckReader {
    fn format(&self) -> Format {
        Format::Tck
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn streamlines(&mut self) -> Result<StreamlineIter<'_>> {
        let remaining = file_len(&self.file)?.saturating_sub(self.offset);
        self.file.seek(SeekFrom::Start(self.offset))?;
        Ok(Box::new(TckStreamlines {
            file: &mut self.file,
            endian: self.endian,
            inverse: self.inverse,
            remaining,
            carry: Vec::new(),
            current: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }))
    }
}

/// Chunked cursor over the triplet stream.
///
/// Completed runs are queued in `ready`; a run still open at the end of a
/// chunk stays in `current` until its delimiter arrives.
struct TckStreamlines<'a> {
    file: &'a mut File,
    endian: Endianness,
    inverse: Affine,
    remaining: u64,
    carry: Vec<u8>,
    current: Vec<f32>,
    ready: VecDeque<Streamline>,
    finished: bool,
}

impl TckStreamlines<'_> {
    fn fill(&mut self) -> Result<()> {
        if self.remaining == 0 {
            self.finished = true;
            if !self.current.is_empty() || !self.carry.is_empty() {
                tracing::warn!(
                    points = self.current.len() / 3,
                    "TCK stream ends without sentinel; dropping incomplete streamline"
                );
            }
            return Ok(());
        }

        let n = self.remaining.min((BUFFER_SIZE * TRIPLET_BYTES) as u64) as usize;
        let start = self.carry.len();
        self.carry.resize(start + n, 0);
        self.file.read_exact(&mut self.carry[start..])?;
        self.remaining -= n as u64;

        let whole = self.carry.len() / TRIPLET_BYTES * TRIPLET_BYTES;
        let values: Vec<f32> = decode_array(&self.carry[..whole], self.endian);
        self.carry.drain(..whole);

        for triplet in values.chunks_exact(3) {
            if triplet[0].is_nan() {
                let points = streamline_from_flat(std::mem::take(&mut self.current))?;
                let points = if self.inverse.is_identity() {
                    points
                } else {
                    transform(&points, &self.inverse)
                };
                self.ready.push_back(points);
            } else if triplet[0].is_infinite() {
                self.finished = true;
                if !self.current.is_empty() {
                    tracing::warn!("TCK sentinel reached inside a streamline; dropping it");
                    self.current.clear();
                }
                return Ok(());
            } else {
                self.current.extend_from_slice(triplet);
            }
        }
        Ok(())
    }
}

impl Iterator for TckStreamlines<'_> {
    type Item = Result<Streamline>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(points) = self.ready.pop_front() {
                return Some(Ok(points));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fill() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Header text for `count` streamlines, and the data offset it announces.
fn header_text(count: usize) -> (String, u64) {
    let prefix = format!(
        "{MAGIC_NUMBER}\ncount: {count:0width$}\ndatatype: Float32LE\nfile: . ",
        width = COUNT_WIDTH
    );
    let suffix = "\nEND\n";
    let base = prefix.len() + suffix.len();

    // The offset counts its own digits.
    let mut digits = 1;
    let offset = loop {
        let offset = base + digits;
        if offset.to_string().len() == digits {
            break offset;
        }
        digits += 1;
    };
    (format!("{prefix}{offset}{suffix}"), offset as u64)
}

/// A `.tck` file opened for incremental writing.
///
/// The file is valid after every [`append`](StreamlineWriter::append): new
/// triplets are written over the trailing infinity sentinel, the sentinel is
/// written again after them, and only then is the count field advanced.
#[derive(Debug)]
pub struct TckWriter {
    file: File,
    header: Header,
    forward: Affine,
    /// Position of the trailing sentinel.
    data_end: u64,
    closed: bool,
}

impl TckWriter {
    /// Create `path` with an empty streamline stream.
    pub fn create(path: &Path, header: &Header, anatomy: Option<&AnatomyGeometry>) -> Result<Self> {
        let mut header = header.clone();
        header.nb_fibers = Some(0);
        header.nb_points = Some(0);
        header.magic_number = Some(MAGIC_NUMBER.to_string());
        header.endian = Some(Endianness::Little);
        if let Some(anatomy) = anatomy {
            header.apply_anatomy(anatomy);
        }

        let (text, offset) = header_text(0);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(text.as_bytes())?;
        file.write_all(&encode_array(&EOF_DELIMITER, Endianness::Little))?;
        file.flush()?;

        Ok(Self {
            file,
            header,
            forward: voxel_transform(anatomy),
            data_end: offset,
            closed: false,
        })
    }
}

impl StreamlineWriter for TckWriter {
    fn format(&self) -> Format {
        Format::Tck
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

        let nb_points: usize = streamlines.iter().map(|s| s.nrows()).sum();
        let new_count = self.header.fiber_count() + streamlines.len();
        if new_count.to_string().len() > COUNT_WIDTH {
            return Err(Error::InvalidHeader(format!(
                "streamline count {new_count} exceeds the count field"
            )));
        }

        let mut values = Vec::with_capacity((nb_points + streamlines.len() + 1) * 3);
        for points in streamlines {
            if self.forward.is_identity() {
                values.extend(points.iter().copied());
            } else {
                values.extend(transform(points, &self.forward).iter().copied());
            }
            values.extend_from_slice(&FIBER_DELIMITER);
        }
        values.extend_from_slice(&EOF_DELIMITER);
        let bytes = encode_array(&values, Endianness::Little);

        // Data and sentinel first; the count only moves once they are down.
        self.file.seek(SeekFrom::Start(self.data_end))?;
        self.file.write_all(&bytes)?;
        self.data_end += (bytes.len() - TRIPLET_BYTES) as u64;

        self.file.seek(SeekFrom::Start(COUNT_OFFSET))?;
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
    fn test_header_text_offset_is_exact() {
        let (text, offset) = header_text(0);
        assert_eq!(text.len() as u64, offset);
        assert!(text.starts_with("mrtrix tracks\ncount: 0000000000\n"));
        assert!(text.ends_with("\nEND\n"));
        assert_eq!(&text[COUNT_OFFSET as usize..COUNT_OFFSET as usize + COUNT_WIDTH], "0000000000");
    }

    #[test]
    fn test_parse_fields() {
        let text = "mrtrix tracks\ncount: 12\ndatatype: Float32BE\nstep_size: 0.5\nfile: . 128\nEND\n";
        let fields = parse_fields(&mut text.as_bytes()).unwrap();
        assert_eq!(fields.count, Some(12));
        assert_eq!(fields.endian, Endianness::Big);
        assert_eq!(fields.offset, 128);
        assert_eq!(fields.step, Some(0.5));

        let missing_end = "mrtrix tracks\ndatatype: Float32LE\nfile: . 64\n";
        assert!(parse_fields(&mut missing_end.as_bytes()).is_err());
        let bad_type = "mrtrix tracks\ndatatype: Float64LE\nfile: . 64\nEND\n";
        assert!(parse_fields(&mut bad_type.as_bytes()).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.tck");

        let a = array![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let b = array![[2.0f32, 3.0, 4.0], [5.0, 6.0, 7.0], [8.0, 9.0, 10.0]];

        let mut writer = TckWriter::create(&path, &Header::new(), None).unwrap();
        writer.append(std::slice::from_ref(&a)).unwrap();
        writer.append(std::slice::from_ref(&b)).unwrap();
        assert_eq!(writer.header().nb_fibers, Some(2));
        assert_eq!(writer.header().nb_points, Some(5));
        writer.close().unwrap();
        assert!(matches!(writer.append(&[a.clone()]), Err(Error::Closed)));

        let text = std::fs::read(&path).unwrap();
        assert!(text.starts_with(b"mrtrix tracks\ncount: 0000000002\n"));
        // ends with exactly one infinity sentinel
        let tail: Vec<f32> = decode_array(&text[text.len() - 24..], Endianness::Little);
        assert!(tail[0].is_nan() && tail[3].is_infinite());

        let mut reader = TckReader::open(&path, None).unwrap();
        assert_eq!(reader.header().nb_fibers, Some(2));
        assert_eq!(reader.header().nb_points, Some(5));
        let streamlines: Vec<_> = reader.streamlines().unwrap().map(|s| s.unwrap()).collect();
        assert_eq!(streamlines, vec![a, b]);
    }

    #[test]
    fn test_big_endian_body() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("be.tck");
        let header = "mrtrix tracks\ncount: 1\ndatatype: Float32BE\nfile: . 64\nEND\n";
        let mut bytes = header.as_bytes().to_vec();
        bytes.resize(64, 0);
        let values = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, f32::NAN, f32::NAN, f32::NAN, f32::INFINITY, f32::INFINITY, f32::INFINITY];
        bytes.extend(encode_array(&values, Endianness::Big));
        std::fs::write(&path, bytes).unwrap();

        let mut reader = TckReader::open(&path, None).unwrap();
        assert_eq!(reader.header().endian, Some(Endianness::Big));
        let streamlines: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(streamlines, vec![array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]]);
    }

    #[test]
    fn test_truncated_stream_drops_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cut.tck");
        let mut writer = TckWriter::create(&path, &Header::new(), None).unwrap();
        writer
            .append(&[array![[1.0f32, 1.0, 1.0]], array![[2.0f32, 2.0, 2.0], [3.0, 3.0, 3.0]]])
            .unwrap();
        writer.close().unwrap();

        // Drop the sentinel, the last delimiter and half a triplet.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 30]).unwrap();

        let mut reader = TckReader::open(&path, None).unwrap();
        let streamlines: Vec<_> = reader.streamlines().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(streamlines, vec![array![[1.0f32, 1.0, 1.0]]]);
    }

    #[test]
    fn test_anatomy_transform_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anat.tck");
        let anatomy = AnatomyGeometry {
            voxel_sizes: [2.0, 2.0, 2.0],
            dimensions: [10, 10, 10],
            voxel_to_world: Affine([
                [-2.0, 0.0, 0.0, 90.0],
                [0.0, 2.0, 0.0, -126.0],
                [0.0, 0.0, 2.0, -72.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
            voxel_order: "LAS".into(),
        };
        let forward = voxel_transform(Some(&anatomy));
        assert_eq!(forward.0[0][0], -1.0);
        assert_eq!(forward.0[1][1], 1.0);
        assert_eq!(forward.translation(), [90.0, -126.0, -72.0]);

        let pts = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mut writer = TckWriter::create(&path, &Header::new(), Some(&anatomy)).unwrap();
        writer.append(std::slice::from_ref(&pts)).unwrap();
        writer.close().unwrap();

        // stored in world space
        let raw = std::fs::read(&path).unwrap();
        let (_, offset) = header_text(0);
        let stored: Vec<f32> = decode_array(&raw[offset as usize..offset as usize + 12], Endianness::Little);
        assert_eq!(stored, vec![89.0, -124.0, -69.0]);

        let mut reader = TckReader::open(&path, Some(&anatomy)).unwrap();
        assert_eq!(reader.header().voxel_sizes, Some([2.0, 2.0, 2.0]));
        let back = reader.streamlines().unwrap().next().unwrap().unwrap();
        for (x, y) in back.iter().zip(pts.iter()) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_open_rejects_other_formats() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.tck");
        std::fs::write(&path, b"TRACK\0").unwrap();
        assert!(matches!(
            TckReader::open(&path, None),
            Err(Error::FormatMismatch { format: Format::Tck, .. })
        ));
    }
}
