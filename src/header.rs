//! Format-independent streamline header.
//!
//! Every codec fills the fields its layout carries and leaves the rest as
//! `None`; the header is then handed (by clone) to the destination codec when
//! converting.

use std::fmt;

use crate::anatomy::AnatomyGeometry;
use crate::binary::Endianness;
use crate::transform::Affine;

/// Geometry and count fields shared by all formats.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header {
    /// Number of streamlines.
    pub nb_fibers: Option<usize>,
    /// Total number of points over all streamlines.
    pub nb_points: Option<usize>,
    /// Tracking step size.
    pub step: Option<f32>,
    /// Tracking method.
    pub method: Option<String>,
    /// Scalars stored with each point (besides x, y, z).
    pub nb_scalars_per_point: Option<usize>,
    /// Properties stored with each streamline.
    pub nb_properties_per_tract: Option<usize>,
    /// Voxel size along x, y, z.
    pub voxel_sizes: Option<[f32; 3]>,
    /// Volume dimensions along x, y, z.
    pub dimensions: Option<[i32; 3]>,
    /// Signature string read from the file.
    pub magic_number: Option<String>,
    /// Volume origin.
    pub origin: Option<[f32; 3]>,
    /// Voxel-to-world affine.
    pub voxel_to_world: Option<Affine>,
    /// Axis codes of the voxel grid (e.g. `"LPS"`).
    pub voxel_order: Option<String>,
    /// Axis codes of world space (e.g. `"RAS"`).
    pub world_order: Option<String>,
    /// Byte order of the binary body.
    pub endian: Option<Endianness>,
}

impl Header {
    /// Empty header with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header announcing the given counts.
    pub fn with_counts(nb_fibers: usize, nb_points: usize) -> Self {
        Self {
            nb_fibers: Some(nb_fibers),
            nb_points: Some(nb_points),
            ..Self::default()
        }
    }

    /// Fiber count, 0 when unset.
    pub fn fiber_count(&self) -> usize {
        self.nb_fibers.unwrap_or(0)
    }

    /// Point count, 0 when unset.
    pub fn point_count(&self) -> usize {
        self.nb_points.unwrap_or(0)
    }

    /// Record `fibers` more streamlines holding `points` points in total.
    pub fn add_counts(&mut self, fibers: usize, points: usize) {
        self.nb_fibers = Some(self.fiber_count() + fibers);
        self.nb_points = Some(self.point_count() + points);
    }

    /// Overwrite the geometry fields with those of an anatomy.
    pub fn apply_anatomy(&mut self, anatomy: &AnatomyGeometry) {
        self.voxel_sizes = Some(anatomy.voxel_sizes);
        self.dimensions = Some(anatomy.dimensions);
        self.voxel_to_world = Some(anatomy.voxel_to_world);
        self.voxel_order = Some(anatomy.voxel_order.clone());
    }
}

fn field<T: fmt::Debug>(f: &mut fmt::Formatter<'_>, name: &str, value: &Option<T>) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "{name}: {v:?}"),
        None => Ok(()),
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        field(f, "magic_number", &self.magic_number)?;
        field(f, "nb_fibers", &self.nb_fibers)?;
        field(f, "nb_points", &self.nb_points)?;
        field(f, "step", &self.step)?;
        field(f, "method", &self.method)?;
        field(f, "nb_scalars_per_point", &self.nb_scalars_per_point)?;
        field(f, "nb_properties_per_tract", &self.nb_properties_per_tract)?;
        field(f, "voxel_sizes", &self.voxel_sizes)?;
        field(f, "dimensions", &self.dimensions)?;
        field(f, "origin", &self.origin)?;
        if let Some(affine) = &self.voxel_to_world {
            writeln!(f, "voxel_to_world:\n{affine}")?;
        }
        field(f, "voxel_order", &self.voxel_order)?;
        field(f, "world_order", &self.world_order)?;
        if let Some(endian) = self.endian {
            writeln!(f, "endian: {endian}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_default_to_zero() {
        let mut hdr = Header::new();
        assert_eq!(hdr.fiber_count(), 0);
        assert_eq!(hdr.point_count(), 0);
        hdr.add_counts(3, 12);
        hdr.add_counts(2, 5);
        assert_eq!(hdr.nb_fibers, Some(5));
        assert_eq!(hdr.nb_points, Some(17));
    }

    #[test]
    fn test_apply_anatomy() {
        let mut hdr = Header::with_counts(1, 2);
        let anat = AnatomyGeometry {
            voxel_sizes: [2.0, 2.0, 2.0],
            dimensions: [10, 10, 10],
            ..AnatomyGeometry::default()
        };
        hdr.apply_anatomy(&anat);
        assert_eq!(hdr.voxel_sizes, Some([2.0, 2.0, 2.0]));
        assert_eq!(hdr.dimensions, Some([10, 10, 10]));
        assert_eq!(hdr.voxel_order.as_deref(), Some("RAS"));
        assert_eq!(hdr.nb_fibers, Some(1));
    }

    #[test]
    fn test_display_skips_unset_fields() {
        let mut hdr = Header::with_counts(4, 40);
        hdr.endian = Some(Endianness::Big);
        let text = hdr.to_string();
        assert!(text.contains("nb_fibers: 4"));
        assert!(text.contains("endian: big"));
        assert!(!text.contains("origin"));
    }
}
