//! Camera-to-screen homography: representation, application and estimation.
//!
//! Estimation is the normalized Direct Linear Transform (Hartley
//! normalization, smallest eigenvector of AᵀA) wrapped in RANSAC over
//! minimal 4-point subsets.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::point::PixelPoint;

/// Below this magnitude the homogeneous coordinate is treated as zero.
pub const DEGENERATE_W_EPSILON: f64 = 1e-10;

/// A 3x3 projective transform from camera pixels to screen pixels.
///
/// Serialized as a row-major `[[f64; 3]; 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Wrap a matrix. Returns `None` if any entry is not finite.
    pub fn from_matrix(m: Matrix3<f64>) -> Option<Self> {
        m.iter().all(|v| v.is_finite()).then_some(Self(m))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Project a point, keeping sub-pixel precision.
    pub fn project(&self, p: [f64; 2]) -> Result<[f64; 2], PipelineError> {
        let v = self.0 * Vector3::new(p[0], p[1], 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() < DEGENERATE_W_EPSILON {
            return Err(PipelineError::DegenerateTransform { w });
        }
        let out = [v[0] / w, v[1] / w];
        if !out[0].is_finite() || !out[1].is_finite() {
            return Err(PipelineError::DegenerateTransform { w });
        }
        Ok(out)
    }

    /// Map a camera pixel to the nearest screen pixel.
    pub fn apply(&self, point: PixelPoint) -> Result<PixelPoint, PipelineError> {
        let [x, y] = self.project(point.to_f64())?;
        PixelPoint::from_f64(x, y).ok_or(PipelineError::DegenerateTransform { w: f64::NAN })
    }

    /// Screen-to-camera transform, if the matrix is invertible.
    pub fn inverse(&self) -> Option<Homography> {
        let inv = self.0.try_inverse()?;
        Self::from_matrix(normalize_scale(inv))
    }

    /// Euclidean distance between `project(src)` and `dst`.
    pub fn reprojection_error(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        match self.project(src) {
            Ok(p) => ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt(),
            Err(_) => f64::INFINITY,
        }
    }
}

impl TryFrom<[[f64; 3]; 3]> for Homography {
    type Error = String;

    fn try_from(rows: [[f64; 3]; 3]) -> Result<Self, Self::Error> {
        let m = Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        );
        Self::from_matrix(m).ok_or_else(|| "homography contains non-finite entries".to_string())
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        let m = h.0;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

/// Scale so that `h[2][2] == 1` when possible.
fn normalize_scale(h: Matrix3<f64>) -> Matrix3<f64> {
    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        h
    } else {
        h / scale
    }
}

/// Translate centroid to the origin and scale mean distance to sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, normalized)
}

/// Least-squares homography from `n >= 4` correspondences.
pub fn estimate_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Homography, PipelineError> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return Err(PipelineError::InsufficientCorrespondences {
            needed: 4,
            got: n.min(dst.len()),
        });
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // Null vector of A = eigenvector of AᵀA with the smallest eigenvalue
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| PipelineError::CalibrationSolveFailure("normalization not invertible".into()))?;
    let denorm = normalize_scale(t_dst_inv * h_norm * t_src);

    if denorm.determinant().abs() < 1e-12 {
        return Err(PipelineError::CalibrationSolveFailure("singular homography".into()));
    }
    Homography::from_matrix(denorm)
        .ok_or_else(|| PipelineError::CalibrationSolveFailure("non-finite homography".into()))
}

/// RANSAC tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Reprojection error below which a pair counts as inlier (px).
    pub inlier_threshold: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 3.0,
            seed: 0,
        }
    }
}

/// Outcome of a RANSAC fit.
#[derive(Debug, Clone)]
pub struct RansacFit {
    pub homography: Homography,
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
}

fn inliers(h: &Homography, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| h.reprojection_error(*s, *d) < threshold)
        .collect()
}

/// Fit over random minimal subsets, refit on the best consensus set.
///
/// Returns `None` when no subset reached 4 inliers.
pub fn fit_ransac(src: &[[f64; 2]], dst: &[[f64; 2]], config: &RansacConfig) -> Option<RansacFit> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_mask: Vec<bool> = vec![false; n];
    let mut best_count = 0usize;

    for _ in 0..config.max_iters {
        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let s4: Vec<[f64; 2]> = sample.iter().map(|i| src[i]).collect();
        let d4: Vec<[f64; 2]> = sample.iter().map(|i| dst[i]).collect();

        let Ok(h) = estimate_dlt(&s4, &d4) else {
            continue;
        };

        let mask = inliers(&h, src, dst, config.inlier_threshold);
        let count = mask.iter().filter(|&&m| m).count();
        if count > best_count {
            best_count = count;
            best_mask = mask;
            if count == n {
                break;
            }
        }
    }

    if best_count < 4 {
        return None;
    }

    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let homography = estimate_dlt(&inlier_src, &inlier_dst).ok()?;

    let inlier_mask = inliers(&homography, src, dst, config.inlier_threshold);
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();
    log::debug!("RANSAC consensus {}/{} (refit {} inliers)", best_count, n, n_inliers);

    Some(RansacFit {
        homography,
        inlier_mask,
        n_inliers,
    })
}
