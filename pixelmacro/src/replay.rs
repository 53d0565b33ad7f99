use crate::actuator::InputActuator;
use crate::capture::ScreenSampler;
use crate::error::Result;
use crate::events::{Anchor, DragSample, MacroEvent, Position};
use crate::locator::{LocatorConfig, VisualLocator};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Radius for the last-resort live-color drag fallback
const LIVE_COLOR_RADIUS: u32 = 10;

/// Pacing granularity for drag motion: one intermediate move per this many
/// seconds of recorded travel time
const DRAG_STEP_SECS: f64 = 0.01;

/// Upper bound on intermediate moves for a single paced motion
const SMOOTH_DRAG_STEPS: u32 = 20;

/// Pacing and looping options for one playback run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOptions {
    /// Countdown before the first event (seconds)
    pub start_delay_secs: u64,

    /// Replay the whole sequence again after waiting this many minutes
    pub repeat_minutes: Option<u64>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            start_delay_secs: 0,
            repeat_minutes: None,
        }
    }
}

/// Outcome summary of a playback run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub events_played: usize,
    pub events_failed: usize,
    pub locator_misses: usize,
    pub runs_completed: usize,
    pub cancelled: bool,
}

/// Replays a stored event sequence through the input actuator, re-locating
/// targets via the visual locator.
///
/// A locator miss or a failure in one event never aborts the run: clicks
/// fall back to their recorded position, drags are skipped after the full
/// fallback chain, and errors are logged before moving to the next event.
pub struct ReplayEngine {
    sampler: ScreenSampler,
    locator: VisualLocator,
    actuator: Arc<dyn InputActuator>,
}

impl ReplayEngine {
    pub fn new(sampler: ScreenSampler, actuator: Arc<dyn InputActuator>) -> Self {
        let locator = VisualLocator::new(sampler.clone());
        Self {
            sampler,
            locator,
            actuator,
        }
    }

    pub fn with_locator_config(mut self, config: LocatorConfig) -> Self {
        self.locator = VisualLocator::with_config(self.sampler.clone(), config);
        self
    }

    /// Run the full playback: countdown, one or more passes over the
    /// events, and the repeat wait between passes. Cancellation is polled
    /// at event boundaries and once per second inside every wait.
    pub async fn run(
        &self,
        events: &[MacroEvent],
        options: &ReplayOptions,
        stop: &AtomicBool,
    ) -> ReplayStats {
        let mut stats = ReplayStats::default();

        if !self.countdown(options.start_delay_secs, stop).await {
            stats.cancelled = true;
            return stats;
        }

        loop {
            self.play_pass(events, stop, &mut stats).await;
            if stats.cancelled {
                return stats;
            }
            stats.runs_completed += 1;

            let Some(minutes) = options.repeat_minutes else {
                return stats;
            };
            info!("Replay pass done; next run in {} minute(s)", minutes);
            if !wait_cancellable((minutes * 60) as f64, stop).await {
                stats.cancelled = true;
                return stats;
            }
        }
    }

    /// One pass over the events with delay pacing; no countdown or repeat
    pub async fn play_once(&self, events: &[MacroEvent], stop: &AtomicBool) -> ReplayStats {
        let mut stats = ReplayStats::default();
        self.play_pass(events, stop, &mut stats).await;
        if !stats.cancelled {
            stats.runs_completed = 1;
        }
        stats
    }

    async fn play_pass(&self, events: &[MacroEvent], stop: &AtomicBool, stats: &mut ReplayStats) {
        for event in events {
            if stop.load(Ordering::Relaxed) {
                stats.cancelled = true;
                return;
            }
            let delay = event.delay().max(0.0);
            if delay > 0.0 && !wait_cancellable(delay, stop).await {
                stats.cancelled = true;
                return;
            }
            match self.play_event(event, stats).await {
                Ok(()) => stats.events_played += 1,
                Err(e) => {
                    warn!("Event {} failed, continuing: {}", event.kind(), e);
                    stats.events_failed += 1;
                }
            }
        }
    }

    async fn play_event(&self, event: &MacroEvent, stats: &mut ReplayStats) -> Result<()> {
        match event {
            MacroEvent::Click {
                pos,
                button,
                anchor,
                ..
            } => {
                let target = match anchor
                    .as_ref()
                    .and_then(|a| self.locator.locate(a, Some(*pos)))
                {
                    Some(found) => {
                        debug!(
                            "Click anchor relocated to {:?} (confidence {:.2})",
                            found.position, found.confidence
                        );
                        found.position
                    }
                    None => {
                        if anchor.is_some() {
                            stats.locator_misses += 1;
                            debug!("Click anchor miss; using recorded position {:?}", pos);
                        }
                        *pos
                    }
                };
                self.actuator.click(target, *button)
            }
            MacroEvent::Drag {
                start,
                end,
                button,
                anchor,
                duration,
                samples,
                ..
            } => {
                let Some(located_start) = self.locate_drag_start(anchor.as_ref(), *start) else {
                    stats.locator_misses += 1;
                    warn!("Drag start not found near {:?}; skipping drag", start);
                    return Ok(());
                };

                self.actuator.move_to(located_start)?;
                self.actuator.button_down(*button)?;
                let moved = self
                    .drag_path(located_start, *start, *end, samples, *duration)
                    .await;
                // The button comes back up even when the path failed.
                let released = self.actuator.button_up(*button);
                moved.and(released)
            }
            MacroEvent::KeyPress { key, .. } => self.actuator.key_down(key),
            MacroEvent::KeyRelease { key, .. } => self.actuator.key_up(key),
        }
    }

    /// The drag fallback chain: stored anchor (template full-screen plus
    /// retry radii, or color search), then the live pixel color at the
    /// recorded start, then give up
    fn locate_drag_start(&self, anchor: Option<&Anchor>, start: Position) -> Option<Position> {
        if let Some(anchor) = anchor {
            if let Some(found) = self.locator.locate(anchor, Some(start)) {
                debug!(
                    "Drag anchor relocated to {:?} (confidence {:.2})",
                    found.position, found.confidence
                );
                return Some(found.position);
            }
        }
        match self.sampler.pixel_color(start) {
            Ok(rgb) => self
                .locator
                .find_color_simple(start, rgb, LIVE_COLOR_RADIUS)
                .map(|found| found.position),
            Err(e) => {
                warn!("Live color fallback capture failed: {}", e);
                None
            }
        }
    }

    async fn drag_path(
        &self,
        located_start: Position,
        recorded_start: Position,
        recorded_end: Position,
        samples: &[DragSample],
        duration: f64,
    ) -> Result<()> {
        if samples.len() >= 3 {
            let mut cursor = located_start;
            for sample in &samples[1..] {
                let target = located_start.offset(sample.dx, sample.dy);
                self.move_paced(cursor, target, sample.dt.max(0.001)).await?;
                cursor = target;
            }
            return Ok(());
        }

        // Too few samples to reproduce a shape; one smooth motion to the
        // translated end point.
        let target = located_start.offset(
            recorded_end.x - recorded_start.x,
            recorded_end.y - recorded_start.y,
        );
        self.move_paced(located_start, target, duration.clamp(0.15, 1.0))
            .await
    }

    /// Walk the pointer from `from` to `to` over `duration`, splitting long
    /// hops into intermediate moves so the pointer never teleports
    async fn move_paced(&self, from: Position, to: Position, duration: f64) -> Result<()> {
        let steps = ((duration / DRAG_STEP_SECS).ceil() as u32).clamp(1, SMOOTH_DRAG_STEPS);
        let pause = Duration::from_secs_f64(duration / steps as f64);
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let x = from.x + ((to.x - from.x) as f64 * t).round() as i32;
            let y = from.y + ((to.y - from.y) as f64 * t).round() as i32;
            self.actuator.move_to(Position::new(x, y))?;
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    async fn countdown(&self, secs: u64, stop: &AtomicBool) -> bool {
        for remaining in (1..=secs).rev() {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            info!("Replay starts in {}s", remaining);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        !stop.load(Ordering::Relaxed)
    }
}

/// Sleep `secs`, waking at least once a second to honor the stop flag.
/// Returns false when cancelled.
async fn wait_cancellable(secs: f64, stop: &AtomicBool) -> bool {
    let mut remaining = secs;
    while remaining > 0.0 {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let chunk = remaining.min(1.0);
        tokio::time::sleep(Duration::from_secs_f64(chunk)).await;
        remaining -= chunk;
    }
    !stop.load(Ordering::Relaxed)
}
