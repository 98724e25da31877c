//! Minimal `NIfTI` header reader for voxel geometry.
//!
//! Supports both NIfTI-1 (348-byte header) and NIfTI-2 (540-byte header)
//! with automatic version detection and endianness handling. Only the fields
//! needed to place streamlines in voxel space are decoded.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// NIfTI format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NiftiVersion {
    /// NIfTI-1 format (348-byte header, 16-bit dimensions)
    #[default]
    Nifti1,
    /// NIfTI-2 format (540-byte header, 64-bit dimensions)
    Nifti2,
}

impl NiftiVersion {
    /// Header size in bytes for this version.
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }
}

/// NIfTI-1 header field byte offsets.
mod offsets_v1 {
    pub const DIM: usize = 40;
    pub const PIXDIM: usize = 76;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const MAGIC: usize = 344;
}

/// NIfTI-2 header field byte offsets.
mod offsets_v2 {
    pub const MAGIC: usize = 4;
    pub const DIM: usize = 16;
    pub const PIXDIM: usize = 104;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN_B: usize = 352;
    pub const QOFFSET_X: usize = 376;
    pub const SROW_X: usize = 400;
}

/// Geometry fields decoded from a NIfTI header.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiGeometry {
    /// NIfTI format version.
    pub version: NiftiVersion,
    /// Size along each dimension (dim[1..=7]).
    pub dim: [i64; 7],
    /// qfac at index 0, voxel sizes after.
    pub pixdim: [f64; 8],
    /// qform transform code.
    pub qform_code: i32,
    /// sform transform code.
    pub sform_code: i32,
    /// Quaternion parameters b, c, d.
    pub quatern: [f64; 3],
    /// qform offsets.
    pub qoffset: [f64; 3],
    /// sform rows.
    pub srow: [[f64; 4]; 3],
    /// File endianness (true = little endian).
    pub little_endian: bool,
}

impl NiftiGeometry {
    /// Parse a header with automatic version and endianness detection.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::InvalidHeader(
                "NIfTI header too short to detect version".into(),
            ));
        }

        // sizeof_hdr doubles as version and byte-order marker
        let sizeof_hdr_le = LittleEndian::read_i32(&bytes[0..4]);
        let sizeof_hdr_be = BigEndian::read_i32(&bytes[0..4]);

        let (version, little_endian) = if sizeof_hdr_le == 348 {
            (NiftiVersion::Nifti1, true)
        } else if sizeof_hdr_be == 348 {
            (NiftiVersion::Nifti1, false)
        } else if sizeof_hdr_le == 540 {
            (NiftiVersion::Nifti2, true)
        } else if sizeof_hdr_be == 540 {
            (NiftiVersion::Nifti2, false)
        } else {
            return Err(Error::InvalidHeader(format!(
                "invalid NIfTI sizeof_hdr {sizeof_hdr_le}"
            )));
        };

        if bytes.len() < version.header_size() {
            return Err(Error::InvalidHeader(format!(
                "NIfTI header too short: got {} bytes, need {} for {:?}",
                bytes.len(),
                version.header_size(),
                version
            )));
        }

        match (version, little_endian) {
            (NiftiVersion::Nifti1, true) => Self::parse_v1::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti1, false) => Self::parse_v1::<BigEndian>(bytes, false),
            (NiftiVersion::Nifti2, true) => Self::parse_v2::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti2, false) => Self::parse_v2::<BigEndian>(bytes, false),
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v1<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets_v1::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic != b"n+1\0" && magic != b"ni1\0" {
            return Err(Error::InvalidHeader(format!(
                "invalid NIfTI magic {magic:?}"
            )));
        }

        let mut dim = [0i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let offset = DIM + 2 + i * 2;
            *d = E::read_i16(&bytes[offset..offset + 2]) as i64;
        }

        let mut pixdim = [0.0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 4;
            *p = E::read_f32(&bytes[offset..offset + 4]) as f64;
        }

        let read_f32s = |start: usize, n: usize| -> Vec<f64> {
            (0..n)
                .map(|i| E::read_f32(&bytes[start + i * 4..start + i * 4 + 4]) as f64)
                .collect()
        };
        let quatern = read_f32s(QUATERN_B, 3);
        let qoffset = read_f32s(QOFFSET_X, 3);
        let srow = read_f32s(SROW_X, 12);

        Ok(Self {
            version: NiftiVersion::Nifti1,
            dim,
            pixdim,
            qform_code: E::read_i16(&bytes[QFORM_CODE..QFORM_CODE + 2]) as i32,
            sform_code: E::read_i16(&bytes[SFORM_CODE..SFORM_CODE + 2]) as i32,
            quatern: [quatern[0], quatern[1], quatern[2]],
            qoffset: [qoffset[0], qoffset[1], qoffset[2]],
            srow: rows_from(&srow),
            little_endian,
        })
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v2<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets_v2::*;

        let magic = &bytes[MAGIC..MAGIC + 8];
        if magic != b"n+2\0\r\n\x1a\n" && magic != b"ni2\0\r\n\x1a\n" {
            return Err(Error::InvalidHeader(format!(
                "invalid NIfTI magic {:?}",
                &magic[..4]
            )));
        }

        let mut dim = [0i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let offset = DIM + 8 + i * 8;
            *d = E::read_i64(&bytes[offset..offset + 8]);
        }

        let mut pixdim = [0.0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 8;
            *p = E::read_f64(&bytes[offset..offset + 8]);
        }

        let read_f64s = |start: usize, n: usize| -> Vec<f64> {
            (0..n)
                .map(|i| E::read_f64(&bytes[start + i * 8..start + i * 8 + 8]))
                .collect()
        };
        let quatern = read_f64s(QUATERN_B, 3);
        let qoffset = read_f64s(QOFFSET_X, 3);
        let srow = read_f64s(SROW_X, 12);

        Ok(Self {
            version: NiftiVersion::Nifti2,
            dim,
            pixdim,
            qform_code: E::read_i32(&bytes[QFORM_CODE..QFORM_CODE + 4]),
            sform_code: E::read_i32(&bytes[SFORM_CODE..SFORM_CODE + 4]),
            quatern: [quatern[0], quatern[1], quatern[2]],
            qoffset: [qoffset[0], qoffset[1], qoffset[2]],
            srow: rows_from(&srow),
            little_endian,
        })
    }

    /// Spatial voxel sizes (pixdim[1..=3]).
    pub fn voxel_sizes(&self) -> [f64; 3] {
        [self.pixdim[1], self.pixdim[2], self.pixdim[3]]
    }

    /// Spatial dimensions (dim[1..=3]).
    pub fn dimensions(&self) -> [i64; 3] {
        [self.dim[0], self.dim[1], self.dim[2]]
    }

    /// Best available voxel-to-world affine: sform, else qform, else a
    /// diagonal built from the voxel sizes.
    pub fn best_affine(&self) -> [[f64; 4]; 4] {
        if self.sform_code > 0 {
            [self.srow[0], self.srow[1], self.srow[2], [0.0, 0.0, 0.0, 1.0]]
        } else if self.qform_code > 0 {
            self.qform_affine()
        } else {
            [
                [self.pixdim[1], 0.0, 0.0, 0.0],
                [0.0, self.pixdim[2], 0.0, 0.0],
                [0.0, 0.0, self.pixdim[3], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    #[allow(clippy::many_single_char_names)]
    fn qform_affine(&self) -> [[f64; 4]; 4] {
        let [b, c, d] = self.quatern;
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let [i, j, k] = [self.pixdim[1].abs(), self.pixdim[2], self.pixdim[3] * qfac];

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                self.qoffset[0],
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a - b * b + c * c - d * d) * j,
                2.0 * (c * d - a * b) * k,
                self.qoffset[1],
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a - b * b - c * c + d * d) * k,
                self.qoffset[2],
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

fn rows_from(values: &[f64]) -> [[f64; 4]; 3] {
    let mut rows = [[0.0f64; 4]; 3];
    for (i, row) in rows.iter_mut().enumerate() {
        row.copy_from_slice(&values[i * 4..i * 4 + 4]);
    }
    rows
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a little-endian NIfTI-1 header with an sform.
    pub(crate) fn nifti1_bytes(dims: [i16; 3], pixdim: [f32; 3], srow: [[f32; 4]; 3]) -> Vec<u8> {
        let mut buf = vec![0u8; 348];
        LittleEndian::write_i32(&mut buf[0..4], 348);
        LittleEndian::write_i16(&mut buf[40..42], 3);
        for (i, d) in dims.iter().enumerate() {
            LittleEndian::write_i16(&mut buf[42 + i * 2..44 + i * 2], *d);
        }
        LittleEndian::write_f32(&mut buf[76..80], 1.0);
        for (i, p) in pixdim.iter().enumerate() {
            LittleEndian::write_f32(&mut buf[80 + i * 4..84 + i * 4], *p);
        }
        LittleEndian::write_i16(&mut buf[254..256], 1);
        for (r, row) in srow.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                let offset = 280 + r * 16 + c * 4;
                LittleEndian::write_f32(&mut buf[offset..offset + 4], *v);
            }
        }
        buf[344..348].copy_from_slice(b"n+1\0");
        buf
    }

    #[test]
    fn test_nifti1_sform() {
        let srow = [
            [-2.0, 0.0, 0.0, 90.0],
            [0.0, 2.0, 0.0, -126.0],
            [0.0, 0.0, 2.0, -72.0],
        ];
        let bytes = nifti1_bytes([91, 109, 91], [2.0, 2.0, 2.0], srow);
        let geom = NiftiGeometry::from_bytes(&bytes).unwrap();
        assert_eq!(geom.version, NiftiVersion::Nifti1);
        assert_eq!(geom.dimensions(), [91, 109, 91]);
        assert_eq!(geom.voxel_sizes(), [2.0, 2.0, 2.0]);
        let affine = geom.best_affine();
        assert_eq!(affine[0][0], -2.0);
        assert_eq!(affine[1][3], -126.0);
        assert_eq!(affine[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_nifti2_big_endian() {
        let mut buf = vec![0u8; 540];
        BigEndian::write_i32(&mut buf[0..4], 540);
        buf[4..12].copy_from_slice(b"n+2\0\r\n\x1a\n");
        BigEndian::write_i64(&mut buf[16..24], 3);
        for i in 0..3 {
            BigEndian::write_i64(&mut buf[24 + i * 8..32 + i * 8], 10);
            BigEndian::write_f64(&mut buf[112 + i * 8..120 + i * 8], 1.5);
        }
        let geom = NiftiGeometry::from_bytes(&buf).unwrap();
        assert_eq!(geom.version, NiftiVersion::Nifti2);
        assert!(!geom.little_endian);
        assert_eq!(geom.dimensions(), [10, 10, 10]);
        // no sform/qform: diagonal from pixdim
        assert_eq!(geom.best_affine()[2][2], 1.5);
    }

    #[test]
    fn test_qform_identity_quaternion() {
        let mut bytes = nifti1_bytes([4, 4, 4], [3.0, 3.0, 3.0], [[0.0; 4]; 3]);
        LittleEndian::write_i16(&mut bytes[254..256], 0);
        LittleEndian::write_i16(&mut bytes[252..254], 1);
        LittleEndian::write_f32(&mut bytes[268..272], 5.0);
        let geom = NiftiGeometry::from_bytes(&bytes).unwrap();
        let affine = geom.best_affine();
        assert_eq!(affine[0][0], 3.0);
        assert_eq!(affine[1][1], 3.0);
        assert_eq!(affine[0][3], 5.0);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = nifti1_bytes([1, 1, 1], [1.0, 1.0, 1.0], [[0.0; 4]; 3]);
        bytes[344..348].copy_from_slice(b"BAD!");
        let err = NiftiGeometry::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("invalid NIfTI magic"));
        assert!(NiftiGeometry::from_bytes(&[0, 1]).is_err());
    }
}
