//! Planar homography estimation and inversion
//!
//! A homography here is the 3x3 projective transform between two planes,
//! carried inside a 4x4 matrix whose third row and column stay at their
//! identity values so the transform slots into a generic 4x4 pipeline.
//! Estimation uses the Direct Linear Transform over exactly 4 point
//! correspondences, solved by Gaussian elimination with partial pivoting;
//! inversion uses the closed-form 3x3 adjugate restricted to the live
//! coefficients.

use serde::{Deserialize, Serialize};

/// Determinant magnitude below which a homography is treated as singular.
pub const DEGENERACY_EPSILON: f64 = 1e-4;

/// A 2D point in source or display pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Outcome of a linear solve. A rank-deficient system still produces a
/// result (the offending column is skipped); the status lets callers decide
/// whether to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Solved,
    RankDeficient,
}

/// Outcome of a homography inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvertStatus {
    Ok,
    /// Determinant was below [`DEGENERACY_EPSILON`]; identity was returned.
    Degenerate,
}

/// Reduce a flat `rows x cols` augmented matrix in place and back-substitute
/// the solution into the last column.
///
/// Forward elimination picks, per column, the remaining row with the largest
/// absolute pivot, normalizes the pivot row, and eliminates below. A column
/// with no nonzero pivot candidate is skipped rather than treated as an
/// error; the returned status reports it so callers can validate the result
/// (the determinant check on the repacked matrix is the usual arbiter).
pub fn solve_in_place(a: &mut [f64], rows: usize, cols: usize) -> SolveStatus {
    debug_assert_eq!(a.len(), rows * cols);

    let mut status = SolveStatus::Solved;
    let mut i = 0;
    let mut j = 0;

    while i < rows && j < cols {
        // Find pivot in column j, starting in row i
        let mut max_row = i;
        for k in (i + 1)..rows {
            if a[k * cols + j].abs() > a[max_row * cols + j].abs() {
                max_row = k;
            }
        }

        if a[max_row * cols + j] != 0.0 {
            if i != max_row {
                for k in 0..cols {
                    a.swap(i * cols + k, max_row * cols + k);
                }
            }

            // Normalize the pivot row
            let pivot = a[i * cols + j];
            for k in 0..cols {
                a[i * cols + k] /= pivot;
            }

            // Eliminate below
            for u in (i + 1)..rows {
                let factor = a[u * cols + j];
                for k in 0..cols {
                    a[u * cols + k] -= factor * a[i * cols + k];
                }
            }

            i += 1;
        } else {
            status = SolveStatus::RankDeficient;
        }
        j += 1;
    }

    // Back substitution into the constant column
    let last = cols - 1;
    for i in (0..rows.saturating_sub(1)).rev() {
        for j in (i + 1)..last {
            a[i * cols + last] -= a[i * cols + j] * a[j * cols + last];
        }
    }

    status
}

/// Projective transform between two planes, embedded in a 4x4 matrix.
///
/// Row-major layout; rows/columns 2 are pinned to the identity pattern and
/// only the 3x3 sub-block at rows/columns {0, 1, 3} carries coefficients:
///
/// ```text
/// [ h11 h12  0  h13 ]
/// [ h21 h22  0  h23 ]
/// [  0   0   1   0  ]
/// [ h31 h32  0  h33 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: [[f64; 4]; 4],
}

impl Homography {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Fit the transform mapping `src[i]` to `dst[i]` from the first 4 point
    /// pairs. Correspondence is positional; both slices must traverse their
    /// quadrilateral in the same order.
    ///
    /// Builds the classic 8x9 system (two rows per correspondence, scale
    /// fixed by pinning the bottom-right coefficient to 1) and solves it with
    /// [`solve_in_place`]. Input is never validated for collinearity or
    /// convexity; a malformed set of points yields a transform that is only
    /// detectable as bad through [`Homography::is_degenerate`].
    pub fn from_correspondence(src: &[Point], dst: &[Point]) -> Self {
        assert!(src.len() >= 4 && dst.len() >= 4, "need 4 point pairs");

        let mut p = [0.0f64; 72];
        for i in 0..4 {
            let (s, d) = (src[i], dst[i]);
            let r1 = (i * 2) * 9;
            let r2 = (i * 2 + 1) * 9;

            p[r1] = -s.x;
            p[r1 + 1] = -s.y;
            p[r1 + 2] = -1.0;
            p[r1 + 6] = s.x * d.x;
            p[r1 + 7] = s.y * d.x;
            p[r1 + 8] = -d.x;

            p[r2 + 3] = -s.x;
            p[r2 + 4] = -s.y;
            p[r2 + 5] = -1.0;
            p[r2 + 6] = s.x * d.y;
            p[r2 + 7] = s.y * d.y;
            p[r2 + 8] = -d.y;
        }

        if solve_in_place(&mut p, 8, 9) == SolveStatus::RankDeficient {
            tracing::warn!("correspondence system is rank-deficient, fit is unreliable");
        }

        // Repack the solution column into the embedded 4x4 form
        Self {
            m: [
                [p[8], p[9 + 8], 0.0, p[2 * 9 + 8]],
                [p[3 * 9 + 8], p[4 * 9 + 8], 0.0, p[5 * 9 + 8]],
                [0.0, 0.0, 1.0, 0.0],
                [p[6 * 9 + 8], p[7 * 9 + 8], 0.0, 1.0],
            ],
        }
    }

    /// Determinant of the embedded 3x3 block.
    pub fn det(&self) -> f64 {
        let [a, b, c] = [self.m[0][0], self.m[0][1], self.m[0][3]];
        let [d, e, f] = [self.m[1][0], self.m[1][1], self.m[1][3]];
        let [g, h, i] = [self.m[3][0], self.m[3][1], self.m[3][3]];

        a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g)
    }

    pub fn is_degenerate(&self) -> bool {
        self.det().abs() < DEGENERACY_EPSILON
    }

    /// Invert analytically via the 3x3 adjugate over the live coefficients.
    ///
    /// A singular transform returns the identity together with
    /// [`InvertStatus::Degenerate`] instead of propagating NaN/Inf. Inverting
    /// a non-degenerate transform twice reproduces it within floating point
    /// tolerance.
    pub fn invert(&self) -> (Self, InvertStatus) {
        let det = self.det();
        if det.abs() < DEGENERACY_EPSILON {
            return (Self::IDENTITY, InvertStatus::Degenerate);
        }

        let [a, b, c] = [self.m[0][0], self.m[0][1], self.m[0][3]];
        let [d, e, f] = [self.m[1][0], self.m[1][1], self.m[1][3]];
        let [g, h, i] = [self.m[3][0], self.m[3][1], self.m[3][3]];

        let inv = Self {
            m: [
                [
                    (e * i - f * h) / det,
                    (c * h - b * i) / det,
                    0.0,
                    (b * f - c * e) / det,
                ],
                [
                    (f * g - d * i) / det,
                    (a * i - c * g) / det,
                    0.0,
                    (c * d - a * f) / det,
                ],
                [0.0, 0.0, 1.0, 0.0],
                [
                    (d * h - e * g) / det,
                    (g * b - a * h) / det,
                    0.0,
                    (a * e - b * d) / det,
                ],
            ],
        };

        (inv, InvertStatus::Ok)
    }

    /// Apply to `(x, y, 0, 1)` without the perspective divide, returning the
    /// homogeneous `(X, Y, W)`.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64, f64) {
        (
            self.m[0][0] * x + self.m[0][1] * y + self.m[0][3],
            self.m[1][0] * x + self.m[1][1] * y + self.m[1][3],
            self.m[3][0] * x + self.m[3][1] * y + self.m[3][3],
        )
    }

    /// Transform a point with the perspective divide. A vanishing
    /// homogeneous weight returns the point untransformed.
    #[inline]
    pub fn transform_point(&self, p: Point) -> Point {
        let (x, y, w) = self.apply(p.x, p.y);
        if w.abs() < DEGENERACY_EPSILON {
            return p;
        }
        Point::new(x / w, y / w)
    }
}
