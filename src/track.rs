use std::collections::{BTreeMap, VecDeque};

use crate::my_types::*;

/// One observation of a tracked object
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackSample {
    /// pixel position
    pub position: Vector2d,
    pub depth: Option<f64>,
    /// seconds
    pub timestamp: f64,
}

#[derive(Clone, Debug)]
pub struct Track {
    pub id: TrackId,
    /// most recent samples, oldest first, strictly increasing in time
    pub history: VecDeque<TrackSample>,
    /// last emitted speed, km/h
    pub speed: Option<f64>,
    pub last_seen_frame: usize,
}

impl Track {
    pub fn new(id: TrackId, frame_index: usize) -> Self {
        Track {
            id,
            history: VecDeque::new(),
            speed: None,
            last_seen_frame: frame_index,
        }
    }

    pub fn last_position(&self) -> Option<Vector2d> {
        self.history.back().map(|s| s.position)
    }

    /// Append a sample, dropping the oldest beyond `capacity`. Samples not
    /// newer than the last one are rejected.
    pub fn push(&mut self, sample: TrackSample, capacity: usize) -> bool {
        if let Some(last) = self.history.back() {
            if !(sample.timestamp > last.timestamp) {
                return false;
            }
        }
        self.history.push_back(sample);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        true
    }
}

/// Active tracks keyed by id; iteration is in ascending id order.
pub type TrackTable = BTreeMap<TrackId, Track>;

/// Remove every track last seen more than `timeout` frames ago. Returns the
/// evicted ids.
pub fn evict_stale(tracks: &mut TrackTable, frame_index: usize, timeout: usize) -> Vec<TrackId> {
    let stale: Vec<TrackId> = tracks
        .values()
        .filter(|t| frame_index.saturating_sub(t.last_seen_frame) > timeout)
        .map(|t| t.id)
        .collect();
    for id in &stale {
        tracks.remove(id);
    }
    stale
}
