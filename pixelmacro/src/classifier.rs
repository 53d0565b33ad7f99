use crate::events::{DragSample, Position, TrackPoint};
use serde::{Deserialize, Serialize};

/// Thresholds for deciding whether a gesture is a click or a drag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// A gesture shorter than this (seconds) can be a click
    pub click_max_duration: f64,

    /// A gesture moving less than this (pixels) can be a click
    pub click_max_distance: f64,

    /// Whether to smooth drag trajectories after deduplication
    pub smooth_drags: bool,

    /// Interior samples jumping more than this many pixels on either axis
    /// from the previous sample are treated as sampling noise and dropped
    pub jump_threshold: i32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            click_max_duration: 0.2,
            click_max_distance: 8.0,
            smooth_drags: true,
            jump_threshold: 20,
        }
    }
}

/// One completed press-to-release interaction on a single button, in
/// recording-time absolute form
#[derive(Debug, Clone)]
pub struct Gesture {
    pub press: TrackPoint,
    pub release: TrackPoint,
    /// Interim pointer samples, time-ordered, starting at the press position
    pub samples: Vec<TrackPoint>,
}

/// The classified shape of a gesture
#[derive(Debug, Clone, PartialEq)]
pub enum GestureShape {
    Click {
        pos: Position,
    },
    Drag {
        start: Position,
        end: Position,
        duration: f64,
        samples: Vec<DragSample>,
    },
}

/// Decide whether a completed gesture was a click or a drag.
///
/// A gesture is a click iff its duration is below `click_max_duration` AND
/// the press-to-release distance is below `click_max_distance`; everything
/// else is a drag. Pure function: all recording-state mutation belongs to
/// the session.
pub fn classify(gesture: &Gesture, config: &ClassifierConfig) -> GestureShape {
    let duration = (gesture.release.timestamp - gesture.press.timestamp).max(0.001);
    let distance = gesture.release.pos.distance(gesture.press.pos);

    if duration < config.click_max_duration && distance < config.click_max_distance {
        return GestureShape::Click {
            pos: gesture.press.pos,
        };
    }

    let mut track: Vec<TrackPoint> = Vec::with_capacity(gesture.samples.len() + 2);
    if gesture
        .samples
        .first()
        .map(|s| s.pos != gesture.press.pos)
        .unwrap_or(true)
    {
        track.push(gesture.press);
    }
    track.extend_from_slice(&gesture.samples);
    if track.last().map(|s| s.pos != gesture.release.pos).unwrap_or(true) {
        track.push(gesture.release);
    }

    let mut track = dedupe_samples(&track);
    if track.len() < 2 {
        track = vec![gesture.press, gesture.release];
    }
    if config.smooth_drags {
        track = smooth_samples(&track, config.jump_threshold);
    }

    GestureShape::Drag {
        start: gesture.press.pos,
        end: gesture.release.pos,
        duration,
        samples: normalize_samples(&track),
    }
}

/// Drop consecutive samples with identical positions, keeping the first
/// occurrence. Idempotent.
pub fn dedupe_samples(samples: &[TrackPoint]) -> Vec<TrackPoint> {
    let mut out: Vec<TrackPoint> = Vec::with_capacity(samples.len());
    for sample in samples {
        if out.last().map(|prev| prev.pos == sample.pos).unwrap_or(false) {
            continue;
        }
        out.push(*sample);
    }
    out
}

/// Smooth interior samples with a 3-point floor average; samples jumping
/// more than `jump_threshold` pixels on either axis from their predecessor
/// are dropped as noise. First and last samples are never altered.
pub fn smooth_samples(samples: &[TrackPoint], jump_threshold: i32) -> Vec<TrackPoint> {
    if samples.len() < 3 {
        return samples.to_vec();
    }
    let last = samples.len() - 1;
    let mut out: Vec<TrackPoint> = Vec::with_capacity(samples.len());
    out.push(samples[0]);
    for i in 1..last {
        let prev = samples[i - 1];
        let cur = samples[i];
        let next = samples[i + 1];
        if (cur.pos.x - prev.pos.x).abs() > jump_threshold
            || (cur.pos.y - prev.pos.y).abs() > jump_threshold
        {
            continue;
        }
        out.push(TrackPoint {
            pos: Position::new(
                (prev.pos.x + cur.pos.x + next.pos.x).div_euclid(3),
                (prev.pos.y + cur.pos.y + next.pos.y).div_euclid(3),
            ),
            timestamp: cur.timestamp,
        });
    }
    out.push(samples[last]);
    out
}

/// Convert absolute samples into the stored relative form: offsets from the
/// first sample's position, with per-sample time deltas
fn normalize_samples(track: &[TrackPoint]) -> Vec<DragSample> {
    let Some(first) = track.first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(track.len());
    let mut prev_ts = first.timestamp;
    for point in track {
        out.push(DragSample {
            dx: point.pos.x - first.pos.x,
            dy: point.pos.y - first.pos.y,
            dt: (point.timestamp - prev_ts).max(0.0),
        });
        prev_ts = point.timestamp;
    }
    out
}
