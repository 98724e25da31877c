//! Voxel geometry supplied by an anatomical volume.
//!
//! Streamline codecs only ever need four things from an anatomy file: voxel
//! sizes, grid dimensions, the voxel-to-world affine and the voxel order.
//! [`load_geometry`] reads them from a `.nii`/`.nii.gz` header; when no
//! anatomy is given, [`AnatomyGeometry::default`] supplies unit geometry.

mod nifti;

pub use nifti::{NiftiGeometry, NiftiVersion};

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{Error, Result};
use crate::transform::Affine;

/// Recognized anatomy file extensions.
pub const ANATOMY_EXTENSIONS: [&str; 2] = [".nii", ".nii.gz"];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Geometry of the voxel grid the streamlines live in.
#[derive(Debug, Clone, PartialEq)]
pub struct AnatomyGeometry {
    /// Voxel size along x, y, z.
    pub voxel_sizes: [f32; 3],
    /// Grid dimensions along x, y, z.
    pub dimensions: [i32; 3],
    /// Voxel-to-world affine.
    pub voxel_to_world: Affine,
    /// Axis codes such as `"RAS"` or `"LPS"`.
    pub voxel_order: String,
}

impl Default for AnatomyGeometry {
    fn default() -> Self {
        Self {
            voxel_sizes: [1.0; 3],
            dimensions: [1; 3],
            voxel_to_world: Affine::IDENTITY,
            voxel_order: "RAS".to_string(),
        }
    }
}

impl AnatomyGeometry {
    /// Build from a decoded NIfTI header.
    pub fn from_nifti(geom: &NiftiGeometry) -> Self {
        let sizes = geom.voxel_sizes();
        let dims = geom.dimensions();
        let voxel_to_world = Affine::from_f64(geom.best_affine());
        Self {
            voxel_sizes: [sizes[0] as f32, sizes[1] as f32, sizes[2] as f32],
            dimensions: [dims[0] as i32, dims[1] as i32, dims[2] as i32],
            voxel_order: axis_codes(&voxel_to_world),
            voxel_to_world,
        }
    }
}

/// True when `path` ends with one of [`ANATOMY_EXTENSIONS`].
pub fn is_anatomy_file(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    ANATOMY_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Load voxel geometry from an optional anatomy file.
///
/// `None` yields [`AnatomyGeometry::default`]. A path with an unrecognized
/// extension is read as NIfTI anyway after a warning, unless `strict` is set.
///
/// # Example
/// ```ignore
/// let geom = tractconv::anatomy::load_geometry(Some(Path::new("t1.nii.gz")), false)?;
/// println!("{:?} {}", geom.voxel_sizes, geom.voxel_order);
/// ```
pub fn load_geometry(path: Option<&Path>, strict: bool) -> Result<AnatomyGeometry> {
    let Some(path) = path else {
        return Ok(AnatomyGeometry::default());
    };

    if !is_anatomy_file(path) {
        if strict {
            return Err(Error::UnsupportedAnatomy(path.to_path_buf()));
        }
        tracing::warn!(
            path = %path.display(),
            "reading anatomy with unrecognized extension as NIfTI"
        );
    }

    let bytes = read_header_bytes(path)?;
    let geom = NiftiGeometry::from_bytes(&bytes)?;
    Ok(AnatomyGeometry::from_nifti(&geom))
}

/// Read up to the NIfTI-2 header size, transparently gunzipping.
fn read_header_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut file = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let limit = NiftiVersion::Nifti2.header_size() as u64;
    let mut bytes = Vec::with_capacity(limit as usize);
    if n == 2 && magic == GZIP_MAGIC {
        MultiGzDecoder::new(file).take(limit).read_to_end(&mut bytes)?;
    } else {
        file.take(limit).read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Anatomical axis codes of an affine's voxel axes.
///
/// Each voxel axis is labelled by the world axis it projects onto most
/// strongly: R/L for x, A/P for y, S/I for z.
pub fn axis_codes(affine: &Affine) -> String {
    const POSITIVE: [char; 3] = ['R', 'A', 'S'];
    const NEGATIVE: [char; 3] = ['L', 'P', 'I'];

    let m = affine.linear();
    let mut used = [false; 3];
    let mut codes = String::with_capacity(3);
    for col in 0..3 {
        let mut best: Option<usize> = None;
        for row in 0..3 {
            if used[row] {
                continue;
            }
            if best.map_or(true, |b| m[row][col].abs() > m[b][col].abs()) {
                best = Some(row);
            }
        }
        let row = best.unwrap_or(col);
        used[row] = true;
        codes.push(if m[row][col] < 0.0 {
            NEGATIVE[row]
        } else {
            POSITIVE[row]
        });
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn sample_header() -> Vec<u8> {
        super::nifti::tests::nifti1_bytes(
            [10, 12, 14],
            [2.0, 2.0, 2.0],
            [
                [-2.0, 0.0, 0.0, 90.0],
                [0.0, 2.0, 0.0, -126.0],
                [0.0, 0.0, 2.0, -72.0],
            ],
        )
    }

    #[test]
    fn test_default_geometry() {
        let geom = load_geometry(None, true).unwrap();
        assert_eq!(geom.voxel_sizes, [1.0, 1.0, 1.0]);
        assert_eq!(geom.dimensions, [1, 1, 1]);
        assert!(geom.voxel_to_world.is_identity());
        assert_eq!(geom.voxel_order, "RAS");
    }

    #[test]
    fn test_load_plain_and_gzipped() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("t1.nii");
        let mut bytes = sample_header();
        bytes.extend_from_slice(&[0u8; 4]);
        std::fs::write(&plain, &bytes).unwrap();

        let gz = dir.path().join("t1.nii.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&bytes).unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();

        for path in [&plain, &gz] {
            let geom = load_geometry(Some(path.as_path()), true).unwrap();
            assert_eq!(geom.dimensions, [10, 12, 14]);
            assert_eq!(geom.voxel_sizes, [2.0, 2.0, 2.0]);
            assert_eq!(geom.voxel_order, "LAS");
            assert_eq!(geom.voxel_to_world.translation(), [90.0, -126.0, -72.0]);
        }
    }

    #[test]
    fn test_strict_extension_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t1.img");
        std::fs::write(&path, sample_header()).unwrap();

        let err = load_geometry(Some(path.as_path()), true).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAnatomy(_)));

        let geom = load_geometry(Some(path.as_path()), false).unwrap();
        assert_eq!(geom.dimensions, [10, 12, 14]);
    }

    #[test]
    fn test_axis_codes() {
        assert_eq!(axis_codes(&Affine::IDENTITY), "RAS");
        let lps = Affine([
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(axis_codes(&lps), "LPS");
        let swapped = Affine([
            [0.0, 0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(axis_codes(&swapped), "AIR");
    }
}
