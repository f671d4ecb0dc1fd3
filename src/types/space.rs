//! Spatial reference carried by every container: the voxel-to-RAS+mm affine and grid size.

use serde::{Deserialize, Serialize};

use crate::constants::{AFFINE_ATOL, AFFINE_RTOL};
use crate::error::{Result, TrxError};

pub type Affine = [[f32; 4]; 4];

pub const IDENTITY_AFFINE: Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpaceAttributes {
    pub affine: Affine,
    pub dimensions: [u16; 3],
}

impl Default for SpaceAttributes {
    fn default() -> Self {
        Self {
            affine: IDENTITY_AFFINE,
            dimensions: [1, 1, 1],
        }
    }
}

impl SpaceAttributes {
    #[must_use]
    pub fn new(affine: Affine, dimensions: [u16; 3]) -> Self {
        Self { affine, dimensions }
    }

    /// Column norms of the rotation/zoom block.
    #[must_use]
    pub fn voxel_sizes(&self) -> [f32; 3] {
        let mut sizes = [0.0f32; 3];
        for (col, size) in sizes.iter_mut().enumerate() {
            let sum: f32 = (0..3).map(|row| self.affine[row][col].powi(2)).sum();
            *size = sum.sqrt();
        }
        sizes
    }

    /// Orientation codes of the voxel axes, e.g. `"RAS"` or `"LPS"`.
    ///
    /// Each voxel axis is assigned the world axis it projects onto most strongly.
    #[must_use]
    pub fn axis_codes(&self) -> String {
        const POSITIVE: [char; 3] = ['R', 'A', 'S'];
        const NEGATIVE: [char; 3] = ['L', 'P', 'I'];
        let mut used = [false; 3];
        let mut codes = String::with_capacity(3);
        for col in 0..3 {
            let mut best: Option<(usize, f32)> = None;
            for row in 0..3 {
                if used[row] {
                    continue;
                }
                let value = self.affine[row][col];
                if best.is_none_or(|(_, current)| value.abs() > current.abs()) {
                    best = Some((row, value));
                }
            }
            match best {
                Some((row, value)) if value.abs() > 0.0 => {
                    used[row] = true;
                    codes.push(if value > 0.0 {
                        POSITIVE[row]
                    } else {
                        NEGATIVE[row]
                    });
                }
                _ => codes.push('?'),
            }
        }
        codes
    }

    /// `numpy.allclose` on the affines.
    #[must_use]
    pub fn affine_close(&self, other: &Self) -> bool {
        self.affine
            .iter()
            .flatten()
            .zip(other.affine.iter().flatten())
            .all(|(a, b)| {
                let (a, b) = (f64::from(*a), f64::from(*b));
                (a - b).abs() <= AFFINE_ATOL + AFFINE_RTOL * b.abs()
            })
    }

    /// Check that two containers share a reference space: close affines and equal dimensions.
    pub fn ensure_compatible(&self, other: &Self) -> Result<()> {
        if !self.affine_close(other) {
            return Err(TrxError::SchemaMismatch {
                reason: format!(
                    "affines differ: {:?} vs {:?}",
                    self.affine, other.affine
                ),
            });
        }
        if self.dimensions != other.dimensions {
            return Err(TrxError::SchemaMismatch {
                reason: format!(
                    "dimensions differ: {:?} vs {:?}",
                    self.dimensions, other.dimensions
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn affine_f64(&self) -> [[f64; 4]; 4] {
        let mut out = [[0.0f64; 4]; 4];
        for (row, values) in self.affine.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                out[row][col] = f64::from(*value);
            }
        }
        out
    }

    /// Inverse of the affine by Gauss-Jordan elimination with partial pivoting.
    pub fn inverse_affine(&self) -> Result<[[f64; 4]; 4]> {
        let mut a = self.affine_f64();
        let mut inv = [[0.0f64; 4]; 4];
        for (i, row) in inv.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        for col in 0..4 {
            let pivot = (col..4)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .unwrap_or(col);
            if a[pivot][col].abs() < 1e-12 {
                return Err(TrxError::InvalidMetadata {
                    key: crate::constants::ATTR_VOXEL_TO_RASMM.to_string(),
                    reason: "affine is singular".into(),
                });
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);
            let scale = a[col][col];
            for k in 0..4 {
                a[col][k] /= scale;
                inv[col][k] /= scale;
            }
            for row in 0..4 {
                if row == col {
                    continue;
                }
                let factor = a[row][col];
                if factor.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                for k in 0..4 {
                    a[row][k] -= factor * a[col][k];
                    inv[row][k] -= factor * inv[col][k];
                }
            }
        }
        Ok(inv)
    }
}

/// Anything that can supply the spatial reference of a new container.
pub trait SpatialReference {
    fn space_attributes(&self) -> Result<SpaceAttributes>;
}

impl SpatialReference for SpaceAttributes {
    fn space_attributes(&self) -> Result<SpaceAttributes> {
        Ok(*self)
    }
}

/// Apply a homogeneous transform to one point.
#[must_use]
pub(crate) fn apply_affine(matrix: &[[f64; 4]; 4], point: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0f64; 3];
    for (row, value) in out.iter_mut().enumerate() {
        *value = matrix[row][0] * point[0]
            + matrix[row][1] * point[1]
            + matrix[row][2] * point[2]
            + matrix[row][3];
    }
    out
}
