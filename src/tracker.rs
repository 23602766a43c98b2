use std::collections::{HashMap, HashSet};
use std::fmt;

use munkres::{solve_assignment, WeightMatrix};
use nalgebra as na;

use crate::config::{Association, TrackerConfig};
use crate::Detection;

const MAX_ASSIGNMENT_SIZE: usize = 256;
const UNMATCHED_COST: f32 = 100_000.0;

/// Identity of a tracked vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKey {
    /// Pixel-exact class and top-left corner of the latest detection.
    Corner { class: i32, x: i32, y: i32 },
    /// Synthetic id handed out at association time.
    Id(u32),
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Corner { class, x, y } => write!(f, "{}_{}_{}", class, x, y),
            TrackKey::Id(id) => write!(f, "#{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedVehicle {
    pub class: i32,
    pub last_center: na::Point2<i32>,
    // stream time, in seconds
    pub last_seen_at: f64,
}

/// Result of feeding one detection to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub key: TrackKey,
    pub prior: Option<na::Point2<i32>>,
    pub current: na::Point2<i32>,
}

/// Keeps the last known position of every vehicle seen on one stream.
#[derive(Debug)]
pub struct VehicleTracker {
    config: TrackerConfig,
    vehicles: HashMap<TrackKey, TrackedVehicle>,
    next_id: u32,
    evicted: usize,
}

impl VehicleTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            vehicles: HashMap::new(),
            next_id: 1,
            evicted: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    #[inline]
    pub fn get(&self, key: &TrackKey) -> Option<&TrackedVehicle> {
        self.vehicles.get(key)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&TrackKey, &TrackedVehicle)> {
        self.vehicles.iter()
    }

    /// Number of entries dropped so far, by age or by table capacity.
    #[inline]
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Feeds a single vehicle detection observed at `ts` seconds.
    pub fn update(&mut self, det: &Detection, ts: f64) -> Observation {
        self.expire(ts);

        match self.config.association {
            Association::Exact => self.observe_exact(det, ts),
            Association::Greedy { max_distance } | Association::Optimal { max_distance } => {
                let matched = self
                    .greedy(std::slice::from_ref(det), max_distance)
                    .pop()
                    .flatten();

                self.observe_matched(det, matched, ts)
            }
        }
    }

    /// Feeds all vehicle detections of one frame, returning one observation
    /// per detection in input order.
    pub fn update_frame(&mut self, dets: &[Detection], ts: f64) -> Vec<Observation> {
        self.expire(ts);

        let assignment = match self.config.association {
            Association::Exact => {
                return dets.iter().map(|det| self.observe_exact(det, ts)).collect();
            }
            Association::Greedy { max_distance } => self.greedy(dets, max_distance),
            Association::Optimal { max_distance } => self
                .optimal(dets, max_distance)
                .unwrap_or_else(|| self.greedy(dets, max_distance)),
        };

        dets.iter()
            .zip(assignment)
            .map(|(det, matched)| self.observe_matched(det, matched, ts))
            .collect()
    }

    fn observe_exact(&mut self, det: &Detection, ts: f64) -> Observation {
        let corner = det.bbox.corner();
        let key = TrackKey::Corner {
            class: det.class,
            x: corner.x,
            y: corner.y,
        };

        self.observe(key, det, ts)
    }

    fn observe_matched(&mut self, det: &Detection, matched: Option<TrackKey>, ts: f64) -> Observation {
        let key = match matched {
            Some(key) => key,
            None => {
                let key = TrackKey::Id(self.next_id);
                self.next_id += 1;
                key
            }
        };

        self.observe(key, det, ts)
    }

    fn observe(&mut self, key: TrackKey, det: &Detection, ts: f64) -> Observation {
        let current = det.bbox.center();

        if let Some(vehicle) = self.vehicles.get_mut(&key) {
            let prior = vehicle.last_center;
            vehicle.last_center = current;
            vehicle.last_seen_at = ts;

            return Observation {
                key,
                prior: Some(prior),
                current,
            };
        }

        self.insert(
            key,
            TrackedVehicle {
                class: det.class,
                last_center: current,
                last_seen_at: ts,
            },
        );

        Observation {
            key,
            prior: None,
            current,
        }
    }

    fn insert(&mut self, key: TrackKey, vehicle: TrackedVehicle) {
        if self.vehicles.len() >= self.config.max_tracks {
            if let Some(oldest) = self.least_recently_seen() {
                self.vehicles.remove(&oldest);
                self.evicted += 1;
                log::debug!("track {} evicted, table full", oldest);
            }
        }

        self.vehicles.insert(key, vehicle);
    }

    fn least_recently_seen(&self) -> Option<TrackKey> {
        self.vehicles
            .iter()
            .min_by(|a, b| {
                a.1.last_seen_at
                    .total_cmp(&b.1.last_seen_at)
                    .then_with(|| a.0.cmp(b.0))
            })
            .map(|(key, _)| *key)
    }

    fn expire(&mut self, ts: f64) {
        let max_age = match self.config.max_age {
            Some(max_age) => max_age,
            None => return,
        };

        let before = self.vehicles.len();
        self.vehicles.retain(|_, v| ts - v.last_seen_at <= max_age as f64);

        let expired = before - self.vehicles.len();
        if expired > 0 {
            self.evicted += expired;
            log::debug!("{} tracks expired at {:.3}s", expired, ts);
        }
    }

    /// Tracks sorted by key so that ties resolve the same way on every run.
    fn sorted_keys(&self) -> Vec<TrackKey> {
        let mut keys: Vec<_> = self.vehicles.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    fn greedy(&self, dets: &[Detection], max_distance: f32) -> Vec<Option<TrackKey>> {
        let mut pairs = Vec::new();

        for key in self.sorted_keys() {
            let vehicle = &self.vehicles[&key];

            for (idx, det) in dets.iter().enumerate() {
                if let Some(dist) = gated_distance(vehicle, det, max_distance) {
                    pairs.push((dist, key, idx));
                }
            }
        }

        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut assignment = vec![None; dets.len()];
        let mut used = HashSet::new();

        for (_, key, idx) in pairs {
            if assignment[idx].is_none() && !used.contains(&key) {
                assignment[idx] = Some(key);
                used.insert(key);
            }
        }

        assignment
    }

    fn optimal(&self, dets: &[Detection], max_distance: f32) -> Option<Vec<Option<TrackKey>>> {
        let keys = self.sorted_keys();
        let mut assignment = vec![None; dets.len()];

        if keys.is_empty() || dets.is_empty() {
            return Some(assignment);
        }

        let n = keys.len().max(dets.len());
        if n > MAX_ASSIGNMENT_SIZE {
            log::warn!(
                "assignment matrix {}x{} too big, falling back to greedy",
                keys.len(),
                dets.len()
            );
            return None;
        }

        let costs: Vec<Vec<Option<f32>>> = keys
            .iter()
            .map(|key| {
                let vehicle = &self.vehicles[key];
                dets.iter()
                    .map(|det| gated_distance(vehicle, det, max_distance))
                    .collect()
            })
            .collect();

        let mut mat = WeightMatrix::from_fn(n, |(r, c)| {
            if r < keys.len() && c < dets.len() {
                costs[r][c].unwrap_or(UNMATCHED_COST)
            } else {
                UNMATCHED_COST
            }
        });

        match solve_assignment(&mut mat) {
            Ok(positions) => {
                for pos in positions {
                    if pos.row < keys.len()
                        && pos.column < dets.len()
                        && costs[pos.row][pos.column].is_some()
                    {
                        assignment[pos.column] = Some(keys[pos.row]);
                    }
                }

                Some(assignment)
            }
            Err(err) => {
                log::warn!("assignment could not be solved: {:?}", err);
                None
            }
        }
    }
}

impl Default for VehicleTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[inline]
fn to_f32(p: na::Point2<i32>) -> na::Point2<f32> {
    na::Point2::new(p.x as f32, p.y as f32)
}

/// Center distance between a tracked vehicle and a detection of the same
/// class, if within `max_distance` pixels.
fn gated_distance(vehicle: &TrackedVehicle, det: &Detection, max_distance: f32) -> Option<f32> {
    if vehicle.class != det.class {
        return None;
    }

    let dist = na::distance(&to_f32(vehicle.last_center), &to_f32(det.bbox.center()));

    if dist <= max_distance {
        Some(dist)
    } else {
        None
    }
}
