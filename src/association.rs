use log::debug;

use crate::cluster::ObjectCandidate;
use crate::config::AssociationConfig;
use crate::my_types::*;
use crate::track::{evict_stale, Track, TrackTable};

/// Greedy nearest-neighbour identity assignment for object candidates.
///
/// Candidates are matched independently against every active track, so two
/// candidates of one frame may claim the same track. Tracks are scanned in
/// ascending id order and only a strictly closer track replaces the current
/// best, so ties go to the older track.
pub struct TrackAssociator {
    next_id: u64,
    max_match_distance: f64,
    timeout: usize,
}

impl TrackAssociator {
    pub fn new(config: &AssociationConfig) -> Self {
        Self {
            next_id: 0,
            max_match_distance: config.max_match_distance,
            timeout: config.track_timeout,
        }
    }

    /// Evict stale tracks, then give every candidate a track id. New ids are
    /// inserted into `tracks` with an empty history.
    pub fn associate(
        &mut self,
        tracks: &mut TrackTable,
        candidates: Vec<ObjectCandidate>,
        frame_index: usize,
    ) -> Vec<(TrackId, ObjectCandidate)> {
        for id in evict_stale(tracks, frame_index, self.timeout) {
            debug!("track {id} timed out");
        }

        let mut associated = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let id = match self.nearest(tracks, candidate.center) {
                Some(id) => id,
                None => {
                    let id = self.issue_id();
                    tracks.insert(id, Track::new(id, frame_index));
                    debug!("new track {id} at ({:.0}, {:.0})", candidate.center.x, candidate.center.y);
                    id
                }
            };
            if let Some(track) = tracks.get_mut(&id) {
                track.last_seen_frame = frame_index;
            }
            associated.push((id, candidate));
        }
        associated
    }

    fn nearest(&self, tracks: &TrackTable, position: Vector2d) -> Option<TrackId> {
        let mut best: Option<(TrackId, f64)> = None;
        for track in tracks.values() {
            let Some(last) = track.last_position() else {
                continue;
            };
            let distance = (position - last).norm();
            if distance >= self.max_match_distance {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((track.id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    fn issue_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }
}
