//! TrackVis `.trk` streamlines.
//!
//! A fixed 1000-byte header followed by one record per streamline: an `i32`
//! point count `N`, then `N * (3 + n_scalars)` `f32` values, then
//! `n_properties` `f32` values. Only the x, y, z columns are surfaced; scalars
//! and properties are skipped on read and never written.
//!
//! Byte order is detected from `hdr_size`, which must read back as 1000.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::anatomy::AnatomyGeometry;
use crate::binary::{encode_array, read_array, read_value, Endianness};
use crate::error::{Error, Result};
use crate::formats::{file_len, Format, StreamlineIter, StreamlineReader, StreamlineWriter};
use crate::header::Header;
use crate::transform::Affine;
use crate::{streamline_from_flat, Streamline};

/// Leading bytes of every TRK file.
pub const MAGIC_NUMBER: &[u8; 5] = b"TRACK";

/// Header size, also stored in the header's last field.
pub const HEADER_SIZE: usize = 1000;

/// Voxel order TrackVis assumes when none is given.
pub const DEFAULT_VOXEL_ORDER: &str = "LPS";

const NAME_LEN: usize = 20;
const MAX_NAMES: usize = 10;

/// Header field byte offsets.
mod offsets {
    pub const ID_STRING: usize = 0;
    pub const DIM: usize = 6;
    pub const VOXEL_SIZE: usize = 12;
    pub const ORIGIN: usize = 24;
    pub const N_SCALARS: usize = 36;
    pub const SCALAR_NAME: usize = 38;
    pub const N_PROPERTIES: usize = 238;
    pub const PROPERTY_NAME: usize = 240;
    pub const VOX_TO_RAS: usize = 440;
    pub const VOXEL_ORDER: usize = 948;
    pub const PAD2: usize = 952;
    pub const IMAGE_ORIENTATION: usize = 956;
    pub const PAD1: usize = 980;
    pub const INVERT_X: usize = 982;
    pub const SWAP_XY: usize = 985;
    pub const N_COUNT: usize = 988;
    pub const VERSION: usize = 992;
    pub const HDR_SIZE: usize = 996;
}

/// True when `path` starts with the TrackVis signature.
pub fn check(path: &Path) -> Result<bool> {
    let mut magic = Vec::with_capacity(MAGIC_NUMBER.len());
    File::open(path)?
        .take(MAGIC_NUMBER.len() as u64)
        .read_to_end(&mut magic)?;
    Ok(magic == MAGIC_NUMBER)
}

// ============================================================================
// Header
// ============================================================================

/// The TrackVis header, field for field.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkHeader {
    /// `TRACK\0`
    pub id_string: [u8; 6],
    /// Volume dimensions.
    pub dim: [i16; 3],
    /// Voxel size in mm.
    pub voxel_size: [f32; 3],
    /// Volume origin (unused by TrackVis).
    pub origin: [f32; 3],
    /// Scalars stored with each point.
    pub n_scalars: i16,
    /// Scalar names, NUL padded.
    pub scalar_names: [[u8; NAME_LEN]; MAX_NAMES],
    /// Properties stored with each streamline.
    pub n_properties: i16,
    /// Property names, NUL padded.
    pub property_names: [[u8; NAME_LEN]; MAX_NAMES],
    /// Voxel-to-RAS matrix, all zeros when unknown.
    pub vox_to_ras: Affine,
    /// Axis codes, NUL padded.
    pub voxel_order: [u8; 4],
    /// Voxel order of the original image.
    pub pad2: [u8; 4],
    /// DICOM image orientation (two direction cosines).
    pub image_orientation_patient: [f32; 6],
    /// Padding.
    pub pad1: [u8; 2],
    /// Axis flips applied by TrackVis.
    pub invert: [bool; 3],
    /// Axis swaps xy, yz, zx.
    pub swap: [bool; 3],
    /// Declared streamline count.
    pub n_count: i32,
    /// Format version.
    pub version: i32,
    /// Always 1000.
    pub hdr_size: i32,
    /// Byte order the header was read with.
    pub endian: Endianness,
}

impl Default for TrkHeader {
    fn default() -> Self {
        let mut voxel_order = [0u8; 4];
        voxel_order[..3].copy_from_slice(DEFAULT_VOXEL_ORDER.as_bytes());
        Self {
            id_string: *b"TRACK\0",
            dim: [1, 1, 1],
            voxel_size: [1.0, 1.0, 1.0],
            origin: [0.0; 3],
            n_scalars: 0,
            scalar_names: [[0; NAME_LEN]; MAX_NAMES],
            n_properties: 0,
            property_names: [[0; NAME_LEN]; MAX_NAMES],
            vox_to_ras: Affine::IDENTITY,
            voxel_order,
            pad2: [0; 4],
            image_orientation_patient: [0.0; 6],
            pad1: [0; 2],
            invert: [false; 3],
            swap: [false; 3],
            n_count: 0,
            version: 2,
            hdr_size: HEADER_SIZE as i32,
            endian: Endianness::Little,
        }
    }
}

impl TrkHeader {
    /// Parse a header, detecting its byte order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidHeader(format!(
                "TRK header too short: got {} bytes, need {HEADER_SIZE}",
                bytes.len()
            )));
        }
        if &bytes[..MAGIC_NUMBER.len()] != MAGIC_NUMBER {
            return Err(Error::InvalidHeader("missing TRACK signature".into()));
        }

        let size = &bytes[offsets::HDR_SIZE..offsets::HDR_SIZE + 4];
        if LittleEndian::read_i32(size) == HEADER_SIZE as i32 {
            Ok(Self::parse::<LittleEndian>(bytes, Endianness::Little))
        } else if BigEndian::read_i32(size) == HEADER_SIZE as i32 {
            Ok(Self::parse::<BigEndian>(bytes, Endianness::Big))
        } else {
            Err(Error::InvalidHeader(format!(
                "TRK hdr_size is {}, expected {HEADER_SIZE}",
                LittleEndian::read_i32(size)
            )))
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse<E: ByteOrder>(bytes: &[u8], endian: Endianness) -> Self {
        use offsets::*;

        let f32_at = |offset: usize| E::read_f32(&bytes[offset..offset + 4]);
        let i16_at = |offset: usize| E::read_i16(&bytes[offset..offset + 2]);
        let names_at = |offset: usize| {
            let mut names = [[0u8; NAME_LEN]; MAX_NAMES];
            for (i, name) in names.iter_mut().enumerate() {
                let start = offset + i * NAME_LEN;
                name.copy_from_slice(&bytes[start..start + NAME_LEN]);
            }
            names
        };
        let flag = |offset: usize| bytes[offset] != 0;

        let mut vox_to_ras = [[0f32; 4]; 4];
        for (r, row) in vox_to_ras.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = f32_at(VOX_TO_RAS + (r * 4 + c) * 4);
            }
        }

        let mut image_orientation_patient = [0f32; 6];
        for (i, v) in image_orientation_patient.iter_mut().enumerate() {
            *v = f32_at(IMAGE_ORIENTATION + i * 4);
        }

        let mut id_string = [0u8; 6];
        id_string.copy_from_slice(&bytes[ID_STRING..ID_STRING + 6]);
        let mut voxel_order = [0u8; 4];
        voxel_order.copy_from_slice(&bytes[VOXEL_ORDER..VOXEL_ORDER + 4]);
        let mut pad2 = [0u8; 4];
        pad2.copy_from_slice(&bytes[PAD2..PAD2 + 4]);

        Self {
            id_string,
            dim: [i16_at(DIM), i16_at(DIM + 2), i16_at(DIM + 4)],
            voxel_size: [f32_at(VOXEL_SIZE), f32_at(VOXEL_SIZE + 4), f32_at(VOXEL_SIZE + 8)],
            origin: [f32_at(ORIGIN), f32_at(ORIGIN + 4), f32_at(ORIGIN + 8)],
            n_scalars: i16_at(N_SCALARS),
            scalar_names: names_at(SCALAR_NAME),
            n_properties: i16_at(N_PROPERTIES),
            property_names: names_at(PROPERTY_NAME),
            vox_to_ras: Affine(vox_to_ras),
            voxel_order,
            pad2,
            image_orientation_patient,
            pad1: [bytes[PAD1], bytes[PAD1 + 1]],
            invert: [flag(INVERT_X), flag(INVERT_X + 1), flag(INVERT_X + 2)],
            swap: [flag(SWAP_XY), flag(SWAP_XY + 1), flag(SWAP_XY + 2)],
            n_count: E::read_i32(&bytes[N_COUNT..N_COUNT + 4]),
            version: E::read_i32(&bytes[VERSION..VERSION + 4]),
            hdr_size: E::read_i32(&bytes[HDR_SIZE..HDR_SIZE + 4]),
            endian,
        }
    }

    /// Serialize at [`Self::endian`].
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.endian {
            Endianness::Little => self.serialize::<LittleEndian>(),
            Endianness::Big => self.serialize::<BigEndian>(),
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn serialize<E: ByteOrder>(&self) -> Vec<u8> {
        use offsets::*;

        let mut buf = vec![0u8; HEADER_SIZE];
        buf[ID_STRING..ID_STRING + 6].copy_from_slice(&self.id_string);
        E::write_i16_into(&self.dim, &mut buf[DIM..DIM + 6]);
        E::write_f32_into(&self.voxel_size, &mut buf[VOXEL_SIZE..VOXEL_SIZE + 12]);
        E::write_f32_into(&self.origin, &mut buf[ORIGIN..ORIGIN + 12]);
        E::write_i16(&mut buf[N_SCALARS..N_SCALARS + 2], self.n_scalars);
        buf[SCALAR_NAME..N_PROPERTIES].copy_from_slice(self.scalar_names.as_flattened());
        E::write_i16(&mut buf[N_PROPERTIES..N_PROPERTIES + 2], self.n_properties);
        buf[PROPERTY_NAME..VOX_TO_RAS].copy_from_slice(self.property_names.as_flattened());
        E::write_f32_into(self.vox_to_ras.0.as_flattened(), &mut buf[VOX_TO_RAS..VOX_TO_RAS + 64]);
        buf[VOXEL_ORDER..VOXEL_ORDER + 4].copy_from_slice(&self.voxel_order);
        buf[PAD2..PAD2 + 4].copy_from_slice(&self.pad2);
        E::write_f32_into(
            &self.image_orientation_patient,
            &mut buf[IMAGE_ORIENTATION..IMAGE_ORIENTATION + 24],
        );
        buf[PAD1..PAD1 + 2].copy_from_slice(&self.pad1);
        for i in 0..3 {
            buf[INVERT_X + i] = u8::from(self.invert[i]);
            buf[SWAP_XY + i] = u8::from(self.swap[i]);
        }
        E::write_i32(&mut buf[N_COUNT..N_COUNT + 4], self.n_count);
        E::write_i32(&mut buf[VERSION..VERSION + 4], self.version);
        E::write_i32(&mut buf[HDR_SIZE..HDR_SIZE + 4], self.hdr_size);
        buf
    }

    /// Header fields for a new file holding no scalars or properties.
    pub fn from_header(header: &Header) -> Result<Self> {
        let mut trk = Self::default();

        if let Some(dims) = header.dimensions {
            for (dst, &d) in trk.dim.iter_mut().zip(&dims) {
                *dst = i16::try_from(d).map_err(|_| {
                    Error::InvalidHeader(format!("dimension {d} does not fit TRK's i16 field"))
                })?;
            }
        }
        if let Some(sizes) = header.voxel_sizes {
            trk.voxel_size = sizes;
        }
        if let Some(affine) = header.voxel_to_world {
            trk.vox_to_ras = affine;
        }
        if let Some(order) = &header.voxel_order {
            trk.voxel_order = [0; 4];
            let n = order.len().min(4);
            trk.voxel_order[..n].copy_from_slice(&order.as_bytes()[..n]);
        }
        trk.n_count = count_field(header.fiber_count())?;
        Ok(trk)
    }

    /// Format-independent view of this header.
    pub fn to_header(&self) -> Header {
        Header {
            nb_fibers: Some(self.n_count.max(0) as usize),
            nb_scalars_per_point: Some(self.n_scalars.max(0) as usize),
            nb_properties_per_tract: Some(self.n_properties.max(0) as usize),
            voxel_sizes: Some(self.voxel_size),
            dimensions: Some(self.dim.map(i32::from)),
            magic_number: Some(c_string(&self.id_string)),
            origin: Some(self.origin),
            voxel_to_world: Some(self.vox_to_ras),
            voxel_order: Some(c_string(&self.voxel_order)),
            world_order: Some("RAS".to_string()),
            endian: Some(self.endian),
            ..Header::default()
        }
    }

    /// Names of the per-point scalars actually in use.
    pub fn scalar_names(&self) -> Vec<String> {
        names(&self.scalar_names, self.n_scalars)
    }

    /// Names of the per-streamline properties actually in use.
    pub fn property_names(&self) -> Vec<String> {
        names(&self.property_names, self.n_properties)
    }
}

fn names(raw: &[[u8; NAME_LEN]; MAX_NAMES], n: i16) -> Vec<String> {
    raw.iter()
        .take(n.clamp(0, MAX_NAMES as i16) as usize)
        .map(|name| c_string(name))
        .collect()
}

/// Bytes up to the first NUL, lossily decoded.
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn count_field(count: usize) -> Result<i32> {
    i32::try_from(count)
        .map_err(|_| Error::InvalidHeader(format!("streamline count {count} exceeds TRK's i32 field")))
}

impl fmt::Display for TrkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MAGIC NUMBER: {}", c_string(&self.id_string))?;
        writeln!(f, "v.{}", self.version)?;
        writeln!(f, "dim: {:?}", self.dim)?;
        writeln!(f, "voxel_sizes: {:?}", self.voxel_size)?;
        writeln!(f, "origin: {:?}", self.origin)?;
        writeln!(f, "nb_scalars: {}", self.n_scalars)?;
        writeln!(f, "scalar_name: {:?}", self.scalar_names())?;
        writeln!(f, "nb_properties: {}", self.n_properties)?;
        writeln!(f, "property_name: {:?}", self.property_names())?;
        writeln!(f, "vox_to_world:\n{}", self.vox_to_ras)?;
        writeln!(f, "voxel_order: {}", c_string(&self.voxel_order))?;
        writeln!(f, "image_orientation_patient: {:?}", self.image_orientation_patient)?;
        writeln!(f, "invert_x: {}", self.invert[0])?;
        writeln!(f, "invert_y: {}", self.invert[1])?;
        writeln!(f, "invert_z: {}", self.invert[2])?;
        writeln!(f, "swap_xy: {}", self.swap[0])?;
        writeln!(f, "swap_yz: {}", self.swap[1])?;
        writeln!(f, "swap_zx: {}", self.swap[2])?;
        writeln!(f, "n_count: {}", self.n_count)?;
        writeln!(f, "hdr_size: {}", self.hdr_size)?;
        write!(f, "endianness: {}", self.endian)
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Record layout shared by the scanner and the iterator.
#[derive(Debug, Clone, Copy)]
struct RecordLayout {
    endian: Endianness,
    n_scalars: usize,
    n_properties: usize,
}

impl RecordLayout {
    fn from_header(trk: &TrkHeader) -> Result<Self> {
        if trk.n_scalars < 0 || trk.n_properties < 0 {
            return Err(Error::InvalidHeader(format!(
                "negative scalar ({}) or property ({}) count",
                trk.n_scalars, trk.n_properties
            )));
        }
        Ok(Self {
            endian: trk.endian,
            n_scalars: trk.n_scalars as usize,
            n_properties: trk.n_properties as usize,
        })
    }

    /// Bytes following the point count of a record holding `n` points.
    fn body_len(&self, n: usize) -> u64 {
        ((n * (3 + self.n_scalars) + self.n_properties) * 4) as u64
    }

    /// Read the next point count, or `None` at a clean or truncated end.
    fn next_count<R: Read>(&self, reader: &mut R, remaining: u64) -> Result<Option<usize>> {
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < 4 {
            tracing::warn!(bytes = remaining, "trailing bytes after last TRK record");
            return Ok(None);
        }
        let n: i32 = read_value(reader, self.endian)?;
        let n = usize::try_from(n)
            .map_err(|_| Error::InvalidData(format!("negative TRK point count {n}")))?;
        if self.body_len(n) > remaining - 4 {
            tracing::warn!(points = n, "TRK record truncated; dropping it");
            return Ok(None);
        }
        Ok(Some(n))
    }
}

/// True when the header's `n_count` differs from the scanned record count.
/// A zero count on a non-empty file counts as a disagreement.
fn count_disagrees(declared: i32, found: usize) -> bool {
    i64::from(declared) != found as i64
}

/// A `.trk` file opened for reading.
#[derive(Debug)]
pub struct TrkReader {
    path: PathBuf,
    file: File,
    header: Header,
    trk: TrkHeader,
    layout: RecordLayout,
}

impl TrkReader {
    /// Open `path`, parse its header and validate the streamline count.
    ///
    /// A declared count that disagrees with the records actually present is
    /// replaced by the scanned count.
    pub fn open(path: &Path, anatomy: Option<&AnatomyGeometry>) -> Result<Self> {
        if !check(path)? {
            return Err(Error::mismatch(Format::Trk, path));
        }

        let mut file = File::open(path)?;
        let mut bytes = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut bytes).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::InvalidHeader(format!("TRK header truncated in {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
        let trk = TrkHeader::from_bytes(&bytes)?;
        let layout = RecordLayout::from_header(&trk)?;

        let (nb_fibers, nb_points) = scan_records(&mut file, &layout)?;
        if count_disagrees(trk.n_count, nb_fibers) {
            tracing::warn!(
                declared = trk.n_count,
                found = nb_fibers,
                path = %path.display(),
                "TRK header streamline count does not match the file; using the file's count"
            );
        }

        let mut header = trk.to_header();
        header.nb_fibers = Some(nb_fibers);
        header.nb_points = Some(nb_points);
        if let Some(anatomy) = anatomy {
            header.apply_anatomy(anatomy);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            trk,
            layout,
        })
    }

    /// Path of the open file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw TrackVis header.
    pub fn trk_header(&self) -> &TrkHeader {
        &self.trk
    }
}

/// Walk the records once, returning (streamlines, points).
fn scan_records(file: &mut File, layout: &RecordLayout) -> Result<(usize, usize)> {
    let mut remaining = file_len(file)?.saturating_sub(HEADER_SIZE as u64);
    file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
    let mut reader = BufReader::new(file);

    let mut fibers = 0;
    let mut points = 0;
    while let Some(n) = layout.next_count(&mut reader, remaining)? {
        let body = layout.body_len(n);
        reader.seek_relative(body as i64)?;
        remaining -= 4 + body;
        fibers += 1;
        points += n;
    }
    Ok((fibers, points))
}

impl StreamlineReader for TrkReader {
    fn format(&self) -> Format {
        Format::Trk
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn streamlines(&mut self) -> Result<StreamlineIter<'_>> {
        let remaining = file_len(&self.file)?.saturating_sub(HEADER_SIZE as u64);
        self.file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        Ok(Box::new(TrkStreamlines {
            reader: BufReader::new(&mut self.file),
            layout: self.layout,
            remaining,
            finished: false,
        }))
    }
}

/// Record-by-record cursor.
struct TrkStreamlines<'a> {
    reader: BufReader<&'a mut File>,
    layout: RecordLayout,
    remaining: u64,
    finished: bool,
}

impl TrkStreamlines<'_> {
    fn read_record(&mut self) -> Result<Option<Streamline>> {
        let Some(n) = self.layout.next_count(&mut self.reader, self.remaining)? else {
            return Ok(None);
        };
        let stride = 3 + self.layout.n_scalars;
        let values: Vec<f32> = read_array(&mut self.reader, n * stride, self.layout.endian)?;
        self.reader
            .seek_relative((self.layout.n_properties * 4) as i64)?;
        self.remaining -= 4 + self.layout.body_len(n);

        let xyz = if stride == 3 {
            values
        } else {
            values
                .chunks_exact(stride)
                .flat_map(|row| row[..3].iter().copied())
                .collect()
        };
        streamline_from_flat(xyz).map(Some)
    }
}

impl Iterator for TrkStreamlines<'_> {
    type Item = Result<Streamline>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_record() {
            Ok(Some(points)) => Some(Ok(points)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// A `.trk` file opened for incremental writing, always little endian.
///
/// Records are appended at the end of the file and the count at
/// `n_count` is rewritten afterwards, so an interrupted write leaves the
/// count lagging behind the data rather than ahead of it.
#[derive(Debug)]
pub struct TrkWriter {
    file: File,
    header: Header,
    closed: bool,
}

impl TrkWriter {
    /// Create `path` with a header describing `header`'s geometry and no
    /// streamlines.
    pub fn create(path: &Path, header: &Header) -> Result<Self> {
        let mut header = header.clone();
        header.nb_fibers = Some(0);
        header.nb_points = Some(0);
        header.nb_scalars_per_point = Some(0);
        header.nb_properties_per_tract = Some(0);
        header.magic_number = Some("TRACK".to_string());
        header.endian = Some(Endianness::Little);
        header.world_order = Some("RAS".to_string());
        if header.voxel_order.is_none() {
            header.voxel_order = Some(DEFAULT_VOXEL_ORDER.to_string());
        }

        let trk = TrkHeader::from_header(&header)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&trk.to_bytes())?;
        file.flush()?;

        Ok(Self {
            file,
            header,
            closed: false,
        })
    }
}

impl StreamlineWriter for TrkWriter {
    fn format(&self) -> Format {
        Format::Trk
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

        let new_count = count_field(self.header.fiber_count() + streamlines.len())?;
        let mut bytes = Vec::new();
        let mut nb_points = 0;
        for points in streamlines {
            let n = i32::try_from(points.nrows()).map_err(|_| {
                Error::InvalidData(format!("streamline of {} points", points.nrows()))
            })?;
            bytes.extend(encode_array(&[n], Endianness::Little));
            let values: Vec<f32> = points.iter().copied().collect();
            bytes.extend(encode_array(&values, Endianness::Little));
            nb_points += points.nrows();
        }

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&bytes)?;
        self.file.seek(SeekFrom::Start(offsets::N_COUNT as u64))?;
        self.file.write_all(&encode_array(&[new_count], Endianness::Little))?;
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
