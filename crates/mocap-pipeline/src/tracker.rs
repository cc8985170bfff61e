//! Temporal filtering of rigid-marker detections.
//!
//! Each persistent track owns a constant-velocity Kalman filter over
//! position and velocity plus a smoothed heading. Detections associate to
//! the nearest predicted track position inside a gate; leftovers spawn new
//! tracks, and tracks that miss too many consecutive frames are retired.
//! Tracks never leave this module by reference; callers only see
//! [`TrackedObject`] snapshots.

use nalgebra::{Matrix3, Matrix3x6, Matrix6, Matrix6x3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use mocap_core::Real;

use crate::objects::MarkerDetection;

/// Tracker tuning. Gating distance and the retirement horizon are
/// deployment-dependent; the defaults below assume world units in meters
/// and an approximately 90 Hz frame rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum distance between a detection and a track's predicted
    /// position for association.
    pub gate_distance: Real,
    /// Consecutive missed frames before a track is retired.
    pub max_missed_frames: u32,
    /// Frame interval in seconds.
    pub dt: Real,
    /// Process noise intensity of the constant-velocity model.
    pub process_noise: Real,
    /// Measurement noise variance of reconstructed positions.
    pub measurement_noise: Real,
    /// Blend factor for heading updates in `(0, 1]`; 1 trusts each new
    /// measurement fully.
    pub heading_smoothing: Real,
    /// Decimal places kept on reported headings.
    pub heading_decimals: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gate_distance: 0.3,
            max_missed_frames: 30,
            dt: 1.0 / 90.0,
            process_noise: 10.0,
            measurement_noise: 1e-4,
            heading_smoothing: 0.5,
            heading_decimals: 4,
        }
    }
}

/// Snapshot of one track after an update. Plain numeric vectors only; the
/// filter internals stay private to the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: u64,
    pub position: [Real; 3],
    pub velocity: [Real; 3],
    pub heading: Real,
    pub error: Real,
    pub marker_index: usize,
}

/// Constant-velocity Kalman state for one track.
#[derive(Debug, Clone)]
struct Track {
    id: u64,
    state: Vector6<Real>,
    covariance: Matrix6<Real>,
    heading: Real,
    error: Real,
    marker_index: usize,
    missed: u32,
}

impl Track {
    fn spawn(id: u64, detection: &MarkerDetection, config: &TrackerConfig) -> Self {
        let p = &detection.position;
        let mut state = Vector6::zeros();
        state.fixed_rows_mut::<3>(0).copy_from(&Vector3::new(p.x, p.y, p.z));
        Self {
            id,
            state,
            // Fresh tracks know their position well and their velocity not
            // at all.
            covariance: Matrix6::from_diagonal(&Vector6::new(
                config.measurement_noise,
                config.measurement_noise,
                config.measurement_noise,
                1.0,
                1.0,
                1.0,
            )),
            heading: detection.heading,
            error: detection.error,
            marker_index: detection.marker_index,
            missed: 0,
        }
    }

    fn position(&self) -> Vector3<Real> {
        self.state.fixed_rows::<3>(0).into()
    }

    fn velocity(&self) -> Vector3<Real> {
        self.state.fixed_rows::<3>(3).into()
    }

    fn predict(&mut self, config: &TrackerConfig) {
        let dt = config.dt;
        let mut f = Matrix6::<Real>::identity();
        for i in 0..3 {
            f[(i, i + 3)] = dt;
        }
        // White-noise-acceleration process noise, per axis.
        let q = config.process_noise;
        let mut qm = Matrix6::<Real>::zeros();
        for i in 0..3 {
            qm[(i, i)] = q * dt.powi(3) / 3.0;
            qm[(i, i + 3)] = q * dt * dt / 2.0;
            qm[(i + 3, i)] = q * dt * dt / 2.0;
            qm[(i + 3, i + 3)] = q * dt;
        }
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + qm;
    }

    fn correct(&mut self, detection: &MarkerDetection, config: &TrackerConfig) {
        let mut h = Matrix3x6::<Real>::zeros();
        for i in 0..3 {
            h[(i, i)] = 1.0;
        }
        let r = Matrix3::identity() * config.measurement_noise;

        let p = &detection.position;
        let z = Vector3::new(p.x, p.y, p.z);
        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + r;
        let Some(s_inv) = s.try_inverse() else {
            // Degenerate innovation covariance; skip the correction rather
            // than corrupt the state.
            return;
        };
        let gain: Matrix6x3<Real> = self.covariance * h.transpose() * s_inv;
        self.state += gain * innovation;
        self.covariance = (Matrix6::identity() - gain * h) * self.covariance;

        let alpha = config.heading_smoothing;
        self.heading = (1.0 - alpha) * self.heading + alpha * detection.heading;
        self.error = detection.error;
        self.missed = 0;
    }

    fn snapshot(&self, config: &TrackerConfig) -> TrackedObject {
        let scale = (10.0 as Real).powi(config.heading_decimals as i32);
        let p = self.position();
        let v = self.velocity();
        TrackedObject {
            id: self.id,
            position: [p.x, p.y, p.z],
            velocity: [v.x, v.y, v.z],
            heading: (self.heading * scale).round() / scale,
            error: self.error,
            marker_index: self.marker_index,
        }
    }
}

/// Owner of all live tracks. One instance per pipeline; only this type
/// ever mutates track state.
#[derive(Debug)]
pub struct MarkerTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl MarkerTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of currently live tracks (matched or coasting).
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Advance one frame: predict, associate, correct, spawn, retire.
    ///
    /// Returns snapshots of every track observed this frame, in detection
    /// order.
    pub fn update(&mut self, detections: &[MarkerDetection]) -> Vec<TrackedObject> {
        for track in &mut self.tracks {
            track.predict(&self.config);
        }

        let mut assigned = vec![false; self.tracks.len()];
        let mut observed: Vec<usize> = Vec::with_capacity(detections.len());

        for detection in detections {
            let p = &detection.position;
            let z = Vector3::new(p.x, p.y, p.z);
            let nearest = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, _)| !assigned[*i])
                .map(|(i, t)| (i, (t.position() - z).norm()))
                .filter(|(_, d)| *d <= self.config.gate_distance)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            match nearest {
                Some((i, _)) => {
                    assigned[i] = true;
                    self.tracks[i].correct(detection, &self.config);
                    observed.push(i);
                }
                None => {
                    let track = Track::spawn(self.next_id, detection, &self.config);
                    self.next_id += 1;
                    assigned.push(true);
                    observed.push(self.tracks.len());
                    self.tracks.push(track);
                }
            }
        }

        for (i, track) in self.tracks.iter_mut().enumerate() {
            if !assigned.get(i).copied().unwrap_or(false) {
                track.missed += 1;
            }
        }

        let snapshots: Vec<TrackedObject> = observed
            .iter()
            .map(|&i| self.tracks[i].snapshot(&self.config))
            .collect();

        let horizon = self.config.max_missed_frames;
        self.tracks.retain(|t| t.missed <= horizon);

        snapshots
    }
}
