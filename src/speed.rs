use log::{debug, warn};

use crate::config::SpeedConfig;
use crate::distance::{DistanceModel, Observation};
use crate::track::{Track, TrackSample};

/// Sliding-window speed estimation over a track's history, generic over the
/// distance model.
///
/// Only the first and last samples of the trailing window are compared.
/// Estimates outside the model's speed range are discarded, and an estimate
/// jumping too far from the track's previous one is averaged with it.
#[derive(Debug)]
pub struct SpeedEstimator<M: DistanceModel> {
    model: M,
    config: SpeedConfig,
}

impl<M: DistanceModel> SpeedEstimator<M> {
    pub fn new(model: M, config: &SpeedConfig) -> Self {
        Self {
            model,
            config: config.clone(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Record `observation` at `timestamp` seconds and return the track's new
    /// speed in km/h, if one can be given.
    pub fn update(&mut self, track: &mut Track, observation: Observation, timestamp: f64) -> Option<f64> {
        if let Some(last) = track.history.back() {
            if !(timestamp > last.timestamp) {
                warn!(
                    "track {}: sample at {timestamp:.3}s is not after {:.3}s, dropped",
                    track.id, last.timestamp
                );
                return None;
            }
        }

        self.model.observe(&observation);
        if !self.model.accepts(&observation) {
            debug!(
                "track {}: ({:.0}, {:.0}) not convertible, skipped",
                track.id, observation.position.x, observation.position.y
            );
            return None;
        }
        track.push(
            TrackSample {
                position: observation.position,
                depth: observation.depth,
                timestamp,
            },
            self.config.history_size,
        );

        let raw = self.raw_speed(track)?;
        if !self.model.speed_range().contains(raw) {
            debug!("track {}: implausible speed {raw:.1} km/h", track.id);
            return None;
        }

        let speed = match track.speed {
            Some(previous) if (raw - previous).abs() > self.config.max_speed_jump => (raw + previous) / 2.,
            _ => raw,
        };
        track.speed = Some(speed);
        Some(speed)
    }

    fn raw_speed(&self, track: &Track) -> Option<f64> {
        let history = &track.history;
        if history.len() < self.config.min_samples.max(2) {
            return None;
        }
        let start = history.len().saturating_sub(self.config.window_size);
        let first = history.get(start)?;
        let last = history.back()?;

        let elapsed = last.timestamp - first.timestamp;
        if elapsed <= 0. {
            return None;
        }
        let meters = self.model.displacement_meters(first, last)?;
        Some(meters / elapsed * 3.6)
    }
}
