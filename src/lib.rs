//! # tractconv
//!
//! Streaming conversion of tractography streamline files.
//!
//! Four container formats are supported: MRtrix `.tck`, TrackVis `.trk`,
//! legacy VTK POLYDATA `.vtk` (binary or ASCII) and the minimal ASCII `.fib`.
//! Every format is read lazily, one streamline at a time, and written through
//! an append protocol that keeps the file consistent between batches, so
//! datasets of any size convert in bounded memory.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tractconv::{convert_file, ConvertConfig};
//!
//! // Format is picked from content (input) and extension (output).
//! let n = convert_file("bundle.tck", "bundle.trk", &ConvertConfig::default())?;
//! println!("converted {n} streamlines");
//! ```
//!
//! ## Working with readers and writers
//!
//! ```ignore
//! use tractconv::{formats, Format, Header};
//!
//! let mut reader = formats::open("bundle.vtk", None)?;
//! let mut writer = Format::Fib.create("bundle.fib".as_ref(), reader.header(), None)?;
//! for streamline in reader.streamlines()? {
//!     writer.append(&[streamline?])?;
//! }
//! writer.close()?;
//! ```

pub mod anatomy;
pub mod binary;
pub mod convert;
pub mod error;
pub mod formats;
pub mod header;
pub mod transform;

use ndarray::Array2;

pub use anatomy::{load_geometry, AnatomyGeometry};
pub use binary::Endianness;
pub use convert::{convert, convert_file, merge, merge_files, transform_file, ConvertConfig};
pub use error::{Error, Result};
pub use formats::{detect_format, is_supported, Format, StreamlineReader, StreamlineWriter};
pub use header::Header;
pub use transform::{transform, Affine};

/// One streamline: an `(N, 3)` array of x, y, z coordinates.
pub type Streamline = Array2<f32>;

/// Build a streamline from a list of points.
pub fn streamline_from_points(points: &[[f32; 3]]) -> Streamline {
    Array2::from(points.to_vec())
}

/// Build a streamline from `x0 y0 z0 x1 y1 z1 ...`.
pub(crate) fn streamline_from_flat(values: Vec<f32>) -> Result<Streamline> {
    let rows = values.len() / 3;
    Array2::from_shape_vec((rows, 3), values)
        .map_err(|e| Error::InvalidData(format!("point buffer is not a list of triplets: {e}")))
}
