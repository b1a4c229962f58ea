//! Two-mode clustering of corner orientations on the half circle [0, π).
//!
//! On a chessboard the bright diagonal of neighbouring inner corners flips by
//! roughly 90°, so the orientations form two dominant modes. Each corner is
//! assigned to cluster 0, 1 or `None` (outlier). Purely angular; no geometry.

use crate::Corner;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OrientationClusteringParams {
    /// Number of histogram bins on [0, π).
    pub num_bins: usize,
    /// Max circular 2-means iterations.
    pub max_iters: usize,
    /// Minimal separation between the two seed peaks (degrees).
    pub peak_min_separation_deg: f32,
    /// Corners farther than this from both centers are outliers (degrees).
    pub outlier_threshold_deg: f32,
    /// A peak needs at least this fraction of the total weight.
    pub min_peak_weight_fraction: f32,
    /// Weight corners by response strength.
    pub use_weights: bool,
}

impl Default for OrientationClusteringParams {
    fn default() -> Self {
        Self {
            num_bins: 90,
            max_iters: 10,
            peak_min_separation_deg: 30.0,
            outlier_threshold_deg: 25.0,
            min_peak_weight_fraction: 0.05,
            use_weights: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrientationClusteringResult {
    /// Cluster centers in [0, π).
    pub centers: [f32; 2],
    /// Per-corner label, index-aligned with the input.
    pub labels: Vec<Option<usize>>,
    /// Total weight per cluster, outliers excluded.
    pub cluster_weights: [f32; 2],
}

/// Cluster corner orientations into two dominant directions.
///
/// Returns `None` when fewer than two separated peaks carry enough weight.
pub fn cluster_orientations(
    corners: &[Corner],
    params: &OrientationClusteringParams,
) -> Option<OrientationClusteringResult> {
    let n = corners.len();
    if n == 0 || params.num_bins < 4 {
        debug!("orientation clustering skipped: n={n} bins={}", params.num_bins);
        return None;
    }
    let weight = |c: &Corner| {
        if params.use_weights {
            c.strength.max(0.0)
        } else {
            1.0
        }
    };

    let mut hist = vec![0.0f32; params.num_bins];
    let mut corner_bins = Vec::with_capacity(n);
    for c in corners {
        let bin = angle_to_bin(c.orientation, params.num_bins);
        hist[bin] += weight(c);
        corner_bins.push(bin);
    }
    let total_weight: f32 = hist.iter().sum();
    if total_weight <= 0.0 {
        return None;
    }
    let hist = smooth_circular(&hist);

    let min_peak_weight = total_weight * params.min_peak_weight_fraction;
    let mut supports: Vec<Vec<usize>> = find_peaks(&hist)
        .into_iter()
        .map(|p| peak_support(&hist, p))
        .filter(|bins| bins.iter().map(|&b| hist[b]).sum::<f32>() >= min_peak_weight)
        .collect();
    supports.sort_by(|a, b| {
        let wa: f32 = a.iter().map(|&i| hist[i]).sum();
        let wb: f32 = b.iter().map(|&i| hist[i]).sum();
        wb.total_cmp(&wa).then(a[0].cmp(&b[0]))
    });
    if supports.len() < 2 {
        debug!("orientation clustering: {} peak(s) above weight floor", supports.len());
        return None;
    }

    // Seed centers from the corners that fell into each peak's bins.
    let seed = |bins: &[usize]| {
        circular_mean_pi(
            corners
                .iter()
                .zip(&corner_bins)
                .filter(|(_, b)| bins.contains(b))
                .map(|(c, _)| (c.orientation, weight(c))),
        )
    };
    let phi0 = seed(supports[0].as_slice())?;
    let min_sep = params.peak_min_separation_deg.to_radians();
    let phi1 = supports[1..]
        .iter()
        .filter_map(|s| seed(s.as_slice()))
        .find(|&cand| angular_dist_pi(phi0, cand) >= min_sep)?;

    let mut centers = [phi0, phi1];
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let outlier = params.outlier_threshold_deg.to_radians();

    for _ in 0..params.max_iters.max(1) {
        let mut changed = false;
        for (label, c) in labels.iter_mut().zip(corners) {
            let d0 = angular_dist_pi(c.orientation, centers[0]);
            let d1 = angular_dist_pi(c.orientation, centers[1]);
            let (best, dist) = if d0 <= d1 { (0, d0) } else { (1, d1) };
            let new_label = (dist <= outlier).then_some(best);
            if *label != new_label {
                *label = new_label;
                changed = true;
            }
        }

        for (k, center) in centers.iter_mut().enumerate() {
            let members = corners
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == Some(k))
                .map(|(c, _)| (c.orientation, weight(c)));
            if let Some(mean) = circular_mean_pi(members) {
                *center = mean;
            }
        }

        if !changed {
            break;
        }
    }

    let mut cluster_weights = [0.0f32; 2];
    for (c, l) in corners.iter().zip(&labels) {
        if let Some(k) = l {
            cluster_weights[*k] += weight(c);
        }
    }

    Some(OrientationClusteringResult {
        centers,
        labels,
        cluster_weights,
    })
}

/// Weighted mean of axial angles (period π), computed on the doubled angle.
fn circular_mean_pi(items: impl Iterator<Item = (f32, f32)>) -> Option<f32> {
    let (mut sx, mut sy, mut sw) = (0.0f32, 0.0f32, 0.0f32);
    for (theta, w) in items {
        sx += w * (2.0 * theta).cos();
        sy += w * (2.0 * theta).sin();
        sw += w;
    }
    if sw <= 0.0 || sx.hypot(sy) < 1e-6 * sw {
        return None;
    }
    Some(wrap_angle_pi(0.5 * sy.atan2(sx)))
}

/// Wrap an angle to [0, π).
pub(crate) fn wrap_angle_pi(theta: f32) -> f32 {
    let t = theta.rem_euclid(PI);
    if t >= PI {
        0.0
    } else {
        t
    }
}

/// Smallest distance between two axial angles, in [0, π/2].
pub(crate) fn angular_dist_pi(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(PI);
    if d > FRAC_PI_2 {
        PI - d
    } else {
        d
    }
}

fn angle_to_bin(theta: f32, num_bins: usize) -> usize {
    let x = wrap_angle_pi(theta) / PI * num_bins as f32;
    (x.floor() as usize).min(num_bins - 1)
}

/// Circular [1 4 6 4 1]/16 smoothing.
fn smooth_circular(hist: &[f32]) -> Vec<f32> {
    const K: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    let n = hist.len() as isize;
    (0..n)
        .map(|i| {
            K.iter()
                .enumerate()
                .map(|(k, w)| w * hist[(i + k as isize - 2).rem_euclid(n) as usize])
                .sum::<f32>()
                / 16.0
        })
        .collect()
}

fn find_peaks(hist: &[f32]) -> Vec<usize> {
    let n = hist.len();
    (0..n)
        .filter(|&i| {
            let prev = hist[(i + n - 1) % n];
            let next = hist[(i + 1) % n];
            hist[i] > 0.0 && hist[i] >= prev && hist[i] > next
        })
        .collect()
}

/// Bins reachable from `peak` by walking downhill in both directions.
fn peak_support(hist: &[f32], peak: usize) -> Vec<usize> {
    let n = hist.len();
    let mut bins = vec![peak];
    for step in [n - 1, 1] {
        let mut prev = peak;
        let mut i = (peak + step) % n;
        while i != peak && hist[i] > 0.0 && hist[i] <= hist[prev] {
            bins.push(i);
            prev = i;
            i = (i + step) % n;
        }
    }
    bins.sort_unstable();
    bins.dedup();
    // Keep the peak first so ties sort deterministically.
    bins.retain(|&b| b != peak);
    bins.insert(0, peak);
    bins
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(theta: f32, strength: f32) -> Corner {
        Corner {
            position: Point2::new(0.0, 0.0),
            orientation: theta,
            orientation_cluster: None,
            strength,
        }
    }

    #[test]
    fn clusters_two_dominant_modes() {
        let a = [FRAC_PI_4 - 0.05, FRAC_PI_4, FRAC_PI_4 + 0.04, FRAC_PI_4 + 0.02];
        let b = [
            3.0 * FRAC_PI_4 - 0.03,
            3.0 * FRAC_PI_4,
            3.0 * FRAC_PI_4 + 0.02,
            3.0 * FRAC_PI_4 + 0.04,
        ];
        let corners: Vec<_> = a
            .iter()
            .map(|&t| make_corner(t, 1.0))
            .chain(b.iter().map(|&t| make_corner(t, 1.5)))
            .collect();

        let result = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("two clusters");
        let la = result.labels[0].expect("labelled");
        assert!(result.labels[..4].iter().all(|l| *l == Some(la)));
        assert!(result.labels[4..].iter().all(|l| *l == Some(1 - la)));

        let sep = angular_dist_pi(result.centers[0], result.centers[1]);
        assert!((sep - FRAC_PI_2).abs() < 0.1);
    }

    #[test]
    fn mean_handles_wraparound_at_zero() {
        // Mode straddling 0/π: a plain (undoubled) mean would land near π/2.
        let near_zero = [0.03, PI - 0.03, 0.01, PI - 0.02];
        let corners: Vec<_> = near_zero
            .iter()
            .map(|&t| make_corner(t, 1.0))
            .chain([FRAC_PI_2 - 0.02, FRAC_PI_2, FRAC_PI_2 + 0.03].map(|t| make_corner(t, 1.0)))
            .collect();

        let result = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("two clusters");
        let k = result.labels[0].expect("labelled");
        assert!(angular_dist_pi(result.centers[k], 0.0) < 0.05);
        assert!(result.labels[..4].iter().all(|l| *l == Some(k)));
    }

    #[test]
    fn marks_far_angles_as_outliers() {
        let mut corners = vec![make_corner(FRAC_PI_4, 1.0); 5];
        corners.extend(vec![make_corner(3.0 * FRAC_PI_4, 1.0); 5]);
        corners.push(make_corner(0.0, 1.0));

        let result = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("clustering");
        assert_eq!(result.labels.iter().filter(|l| l.is_some()).count(), 10);
        assert_eq!(result.labels[10], None);
    }

    #[test]
    fn single_mode_is_none() {
        let corners = vec![make_corner(0.1, 1.0); 6];
        assert!(cluster_orientations(&corners, &OrientationClusteringParams::default()).is_none());
    }
}
