//! Rigid-marker pairing.
//!
//! A tracked body carries two LEDs a known distance apart. Pairing scans
//! the pairwise distance matrix of one frame's reconstructed points and
//! greedily consumes pairs whose separation sits within tolerance of the
//! nominal marker distance. The heading convention (remap into
//! `[-π/2, π/2]`, then negate) is inherited from the capture system and
//! preserved exactly; see DESIGN.md.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use mocap_core::{ObjectPoint, Pt3, Real};

/// Marker geometry and pairing tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingOptions {
    /// Nominal distance between a body's two markers, in world length
    /// units.
    pub separation: Real,
    /// Accepted deviation from the nominal separation.
    pub tolerance: Real,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self {
            separation: 0.131,
            tolerance: 0.025,
        }
    }
}

/// One raw (unfiltered) rigid-marker detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerDetection {
    /// Midpoint of the marker pair.
    pub position: Pt3,
    /// Planar heading in `[-π/2, π/2]`.
    pub heading: Real,
    /// Mean reprojection error of the two points.
    pub error: Real,
    /// Which registered body this is. Single-body sessions always report 0.
    pub marker_index: usize,
}

/// Remap an angle into `[-π/2, π/2]` by shifting one half-turn, then flip
/// its sign.
fn remap_heading(raw: Real) -> Real {
    let mut heading = raw;
    if heading > FRAC_PI_2 {
        heading -= PI;
    }
    if heading < -FRAC_PI_2 {
        heading += PI;
    }
    -heading
}

/// Pair one frame's points into rigid-marker detections.
///
/// Each point is consumed at most once; unmatched points produce no
/// detection this frame. Among in-tolerance candidates, the one whose
/// separation is closest to the nominal distance wins.
pub fn pair_markers(points: &[ObjectPoint], opts: &PairingOptions) -> Vec<MarkerDetection> {
    let n = points.len();
    let mut distance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            distance[i][j] = (points[i].position - points[j].position).norm();
        }
    }

    let mut consumed = vec![false; n];
    let mut detections = Vec::new();
    for i in 0..n {
        if consumed[i] {
            continue;
        }
        let best = (0..n)
            .filter(|&j| j != i && !consumed[j])
            .map(|j| (j, (distance[i][j] - opts.separation).abs()))
            .filter(|(_, dev)| *dev < opts.tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((j, _)) = best else { continue };

        consumed[i] = true;
        consumed[j] = true;

        let a = &points[i];
        let b = &points[j];
        let direction = (b.position - a.position).normalize();
        detections.push(MarkerDetection {
            position: midpoint(&a.position, &b.position),
            heading: remap_heading(direction.y.atan2(direction.x)),
            error: 0.5 * (a.error + b.error),
            marker_index: 0,
        });
    }
    detections
}

fn midpoint(a: &Pt3, b: &Pt3) -> Pt3 {
    Pt3::from((a.coords + b.coords) * 0.5)
}
