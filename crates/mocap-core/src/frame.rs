//! Observation types crossing the process boundary.
//!
//! Two shapes of 2D input exist:
//! - [`FramePoints`]: everything each camera saw in one frame (unmatched,
//!   variable count per camera), the input to correspondence search;
//! - [`CalibrationSample`]: one already-aligned row, one observation (or
//!   absent) per camera, the input to pose estimation and triangulation.

use serde::{Deserialize, Serialize};

use crate::math::{Pt2, Pt3, Real};

/// All detected dots in one captured frame, ordered by camera index.
///
/// Inner lists carry the dots one camera reported; an empty list means the
/// camera saw nothing this frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FramePoints {
    pub cameras: Vec<Vec<Pt2>>,
}

impl FramePoints {
    pub fn new(cameras: Vec<Vec<Pt2>>) -> Self {
        Self { cameras }
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    /// True when at least one camera detected at least one dot.
    pub fn has_detections(&self) -> bool {
        self.cameras.iter().any(|pts| !pts.is_empty())
    }
}

/// One cross-camera-aligned observation row: index `i` holds what camera
/// `i` saw of a single physical feature, `None` when occluded.
pub type CalibrationSample = Vec<Option<Pt2>>;

/// A reconstructed 3D point with its reprojection error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectPoint {
    pub position: Pt3,
    /// Mean of squared per-axis pixel residuals over contributing views.
    pub error: Real,
}

impl ObjectPoint {
    pub fn new(position: Pt3, error: Real) -> Self {
        Self { position, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_has_no_detections() {
        let frame = FramePoints::new(vec![vec![], vec![]]);
        assert_eq!(frame.num_cameras(), 2);
        assert!(!frame.has_detections());
    }

    #[test]
    fn single_dot_counts_as_detection() {
        let frame = FramePoints::new(vec![vec![], vec![Pt2::new(10.0, 20.0)]]);
        assert!(frame.has_detections());
    }

    #[test]
    fn frame_points_json_roundtrip() {
        let frame = FramePoints::new(vec![vec![Pt2::new(1.5, 2.5)], vec![]]);
        let json = serde_json::to_string(&frame).unwrap();
        let restored: FramePoints = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cameras[0][0], Pt2::new(1.5, 2.5));
        assert!(restored.cameras[1].is_empty());
    }
}
