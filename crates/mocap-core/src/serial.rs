//! Plain nested-array transport representations.
//!
//! Camera poses and the world transform must cross the process boundary as
//! nested arrays (rotation 3×3, translation 3×1, transform 4×4), so the
//! internal nalgebra types get explicit transport twins here instead of
//! leaking matrix serialization formats into the wire protocol.

use serde::{Deserialize, Serialize};

use crate::camera::CameraPose;
use crate::math::{Mat3, Mat4, Real, Vec3};

/// Wire form of one camera pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPoseData {
    pub r: [[Real; 3]; 3],
    pub t: [Real; 3],
}

impl From<&CameraPose> for CameraPoseData {
    fn from(pose: &CameraPose) -> Self {
        let r = &pose.r;
        Self {
            r: [
                [r[(0, 0)], r[(0, 1)], r[(0, 2)]],
                [r[(1, 0)], r[(1, 1)], r[(1, 2)]],
                [r[(2, 0)], r[(2, 1)], r[(2, 2)]],
            ],
            t: [pose.t.x, pose.t.y, pose.t.z],
        }
    }
}

impl From<&CameraPoseData> for CameraPose {
    fn from(data: &CameraPoseData) -> Self {
        CameraPose {
            r: Mat3::from_fn(|i, j| data.r[i][j]),
            t: Vec3::new(data.t[0], data.t[1], data.t[2]),
        }
    }
}

/// Wire form of the reconstruction-to-world transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldTransformData(pub [[Real; 4]; 4]);

impl WorldTransformData {
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_fn(|i, j| self.0[i][j])
    }

    pub fn from_matrix(m: &Mat4) -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = m[(i, j)];
            }
        }
        Self(rows)
    }
}

/// Serialize an aligned pose list into wire form.
pub fn poses_to_data(poses: &[CameraPose]) -> Vec<CameraPoseData> {
    poses.iter().map(CameraPoseData::from).collect()
}

/// Rebuild internal poses from wire form.
pub fn poses_from_data(data: &[CameraPoseData]) -> Vec<CameraPose> {
    data.iter().map(CameraPose::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    #[test]
    fn pose_roundtrip_preserves_rotation_and_translation() {
        let pose = CameraPose {
            r: *Rotation3::from_euler_angles(0.3, -0.2, 0.8).matrix(),
            t: Vec3::new(1.0, -2.0, 0.5),
        };
        let data = CameraPoseData::from(&pose);
        let restored = CameraPose::from(&data);
        assert_relative_eq!(restored.r, pose.r, epsilon = 1e-15);
        assert_relative_eq!(restored.t, pose.t, epsilon = 1e-15);
    }

    #[test]
    fn pose_json_is_plain_nested_arrays() {
        let pose = CameraPose::identity();
        let json = serde_json::to_value(CameraPoseData::from(&pose)).unwrap();
        assert_eq!(json["r"][0][0], 1.0);
        assert_eq!(json["t"], serde_json::json!([0.0, 0.0, 0.0]));
    }

    #[test]
    fn transform_roundtrip() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 4.5;
        m[(2, 1)] = -0.25;
        let restored = WorldTransformData::from_matrix(&m).to_matrix();
        assert_relative_eq!(restored, m, epsilon = 1e-15);
    }

    #[test]
    fn pose_list_roundtrip() {
        let poses = vec![CameraPose::identity(); 3];
        let restored = poses_from_data(&poses_to_data(&poses));
        assert_eq!(restored.len(), 3);
    }
}
