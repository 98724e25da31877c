//! Affine transforms applied to streamline points.
//!
//! An [`Affine`] is a 4×4 matrix whose bottom row is assumed to be
//! `(0, 0, 0, 1)`. Applying it to an N×3 point array computes
//! `points · R^T + t`, with `R` the upper-left 3×3 block and `t` the last
//! column.

use std::fmt;

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::Streamline;

/// 4×4 voxel-to-world style transform stored row-major in `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [[f32; 4]; 4]);

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[[f32; 4]; 4]> for Affine {
    fn from(rows: [[f32; 4]; 4]) -> Self {
        Self(rows)
    }
}

impl Affine {
    /// The identity transform.
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Build from 16 row-major values.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        if values.len() != 16 {
            return Err(Error::InvalidAffine(format!(
                "expected 16 values, got {}",
                values.len()
            )));
        }
        let mut rows = [[0.0f32; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            row.copy_from_slice(&values[i * 4..i * 4 + 4]);
        }
        Ok(Self(rows))
    }

    /// Build from an `f64` matrix, rounding to `f32`.
    pub fn from_f64(rows: [[f64; 4]; 4]) -> Self {
        let mut out = [[0.0f32; 4]; 4];
        for (dst, src) in out.iter_mut().zip(rows.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = *s as f32;
            }
        }
        Self(out)
    }

    /// Widen to `f64`.
    pub fn to_f64(&self) -> [[f64; 4]; 4] {
        let mut out = [[0.0f64; 4]; 4];
        for (dst, src) in out.iter_mut().zip(self.0.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = *s as f64;
            }
        }
        out
    }

    /// True when every element equals the identity's.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Upper-left 3×3 linear block.
    pub fn linear(&self) -> [[f32; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// Translation column.
    pub fn translation(&self) -> [f32; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    /// Matrix transpose.
    pub fn transpose(&self) -> Self {
        let mut out = [[0.0f32; 4]; 4];
        for (i, row) in self.0.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                out[j][i] = *v;
            }
        }
        Self(out)
    }

    /// Matrix product `self · other` (apply `other` first).
    pub fn compose(&self, other: &Affine) -> Self {
        let a = self.to_f64();
        let b = other.to_f64();
        let mut out = [[0.0f64; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
            }
        }
        Self::from_f64(out)
    }

    /// Numeric inverse, computed in `f64` by Gauss-Jordan elimination.
    pub fn inverse(&self) -> Result<Self> {
        let mut a = self.to_f64();
        let mut inv = Self::IDENTITY.to_f64();

        for col in 0..4 {
            let pivot = (col..4)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .unwrap_or(col);
            if a[pivot][col].abs() < 1e-12 {
                return Err(Error::InvalidAffine("matrix is singular".into()));
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let scale = a[col][col];
            for j in 0..4 {
                a[col][j] /= scale;
                inv[col][j] /= scale;
            }
            for row in 0..4 {
                if row == col {
                    continue;
                }
                let factor = a[row][col];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..4 {
                    a[row][j] -= factor * a[col][j];
                    inv[row][j] -= factor * inv[col][j];
                }
            }
        }

        Ok(Self::from_f64(inv))
    }

    /// Transform a single point.
    pub fn apply_point(&self, p: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        let mut out = [0.0f32; 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = m[i][0] * p[0] + m[i][1] * p[1] + m[i][2] * p[2] + m[i][3];
        }
        out
    }

    /// Transform every row of an N×3 point array.
    pub fn apply(&self, points: &Streamline) -> Streamline {
        transform(points, self)
    }

    // Editing helpers mirroring the options of the transform tool.

    /// Inverse, for callers that need to undo a reference affine.
    pub fn inverted(&self) -> Result<Self> {
        self.inverse()
    }

    /// Same matrix with the translation column zeroed.
    pub fn without_translation(mut self) -> Self {
        for row in self.0.iter_mut().take(3) {
            row[3] = 0.0;
        }
        self
    }

    /// Same matrix with the diagonal scale factors normalized to one.
    ///
    /// Zero diagonal entries are left untouched.
    pub fn without_scaling(mut self) -> Self {
        for i in 0..3 {
            let d = self.0[i][i];
            if d != 0.0 {
                self.0[i][i] = d / d;
            }
        }
        self
    }

    /// Same matrix with the off-diagonal rotation terms zeroed.
    pub fn without_rotation(mut self) -> Self {
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    self.0[i][j] = 0.0;
                }
            }
        }
        self
    }

    /// Negate the diagonal entry of `axis` (0 = x, 1 = y, 2 = z).
    pub fn flipped(mut self, axis: usize) -> Result<Self> {
        if axis > 2 {
            return Err(Error::InvalidAffine(format!("no axis {axis} to flip")));
        }
        self.0[axis][axis] = -self.0[axis][axis];
        Ok(self)
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{:>10.4} {:>10.4} {:>10.4} {:>10.4}]", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}

/// Apply `affine` to every point: `points · R^T + t`.
pub fn transform(points: &Streamline, affine: &Affine) -> Streamline {
    if points.nrows() == 0 {
        return Array2::zeros((0, 3));
    }
    let linear = affine.linear();
    let r = Array2::from_shape_fn((3, 3), |(i, j)| linear[i][j]);
    let t = Array1::from(affine.translation().to_vec());
    points.dot(&r.t()) + &t
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Streamline, b: &Streamline, tol: f32) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= tol, "{x} != {y}");
        }
    }

    #[test]
    fn test_identity_is_noop() {
        let pts = array![[0.0f32, 1.0, 2.0], [3.5, -4.0, 5.25]];
        assert_eq!(transform(&pts, &Affine::IDENTITY), pts);
    }

    #[test]
    fn test_rotation_scale_translation() {
        let m = Affine([
            [0.0, -2.0, 0.0, 10.0],
            [1.0, 0.0, 0.0, -5.0],
            [0.0, 0.0, 3.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let pts = array![[1.0f32, 2.0, 3.0]];
        let out = transform(&pts, &m);
        assert_eq!(out, array![[6.0f32, -4.0, 10.0]]);
        assert_eq!(m.apply_point([1.0, 2.0, 3.0]), [6.0, -4.0, 10.0]);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Affine([
            [1.5, 0.2, 0.0, -90.0],
            [0.0, 1.5, 0.1, -126.0],
            [0.3, 0.0, 2.0, -72.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let inv = m.inverse().unwrap();
        let pts = array![[0.0f32, 0.0, 0.0], [10.0, 20.0, 30.0], [-4.5, 8.25, 1.0]];
        let back = transform(&transform(&pts, &m), &inv);
        assert_close(&back, &pts, 1e-3);

        let product = m.compose(&inv);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product.0[i][j] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_singular_inverse_fails() {
        let mut m = Affine::IDENTITY;
        m.0[1][1] = 0.0;
        assert!(matches!(m.inverse(), Err(Error::InvalidAffine(_))));
    }

    #[test]
    fn test_from_slice_requires_16_values() {
        assert!(Affine::from_slice(&[1.0; 15]).is_err());
        let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let m = Affine::from_slice(&values).unwrap();
        assert_eq!(m.0[2][1], 9.0);
        assert_eq!(m.transpose().0[1][2], 9.0);
    }

    #[test]
    fn test_editing_helpers() {
        let m = Affine([
            [2.0, 0.5, 0.0, 3.0],
            [0.0, -4.0, 0.0, 4.0],
            [0.1, 0.0, 0.5, 5.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(m.without_translation().translation(), [0.0, 0.0, 0.0]);
        let unscaled = m.without_scaling();
        assert_eq!([unscaled.0[0][0], unscaled.0[1][1], unscaled.0[2][2]], [1.0, 1.0, 1.0]);
        let diag = m.without_rotation();
        assert_eq!(diag.0[0][1], 0.0);
        assert_eq!(diag.0[2][0], 0.0);
        assert_eq!(m.flipped(1).unwrap().0[1][1], 4.0);
        assert!(m.flipped(3).is_err());
    }

    #[test]
    fn test_empty_points() {
        let pts = Array2::<f32>::zeros((0, 3));
        assert_eq!(transform(&pts, &Affine::IDENTITY).shape(), &[0, 3]);
    }
}
