//! Time ↔ pixel mapping for the visible window.
//!
//! All times are epoch milliseconds (`i64`). Pixel values are `f64`.

use chrono::{DateTime, Utc};

use crate::model::Operation;

pub const DEFAULT_SNAP_MINUTES: i64 = 15;

/// Narrowest block a scale will report, so tiny or inverted operations stay grabbable.
pub const MIN_BLOCK_WIDTH: f64 = 8.0;

/// Used when the width or the window is degenerate.
pub const FALLBACK_PX_PER_MS: f64 = 0.0001;

pub(crate) const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const EMPTY_PAD_MS: i64 = 30 * MS_PER_MINUTE;

/// Round `t_ms` to the nearest multiple of `step_minutes` counted from the
/// Unix epoch. Halfway points round up.
///
/// Euclidean division keeps pre-epoch timestamps on the same grid.
/// A non-positive step disables snapping.
pub fn snap(t_ms: i64, step_minutes: i64) -> i64 {
    if step_minutes <= 0 {
        return t_ms;
    }
    let step = step_minutes * MS_PER_MINUTE;
    t_ms.saturating_add(step / 2).div_euclid(step) * step
}

fn floor_hour(t_ms: i64) -> i64 {
    t_ms.div_euclid(MS_PER_HOUR) * MS_PER_HOUR
}

// ── ViewWindow ──────────────────────────────────────────────────────

/// The time range mapped onto the timeline's width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl ViewWindow {
    /// Returns `None` unless `end > start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        Self::from_millis(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn from_millis(start_ms: i64, end_ms: i64) -> Option<Self> {
        (end_ms > start_ms).then_some(Self { start_ms, end_ms })
    }

    /// Window covering all operations, padded by 10% of the span on each side
    /// (30 minutes when the span is zero).
    ///
    /// An empty board shows one hour before the current hour through seven
    /// hours after it.
    pub fn derive(operations: &[Operation], now: DateTime<Utc>) -> Self {
        let bounds = operations.iter().fold(None, |acc: Option<(i64, i64)>, op| {
            let (s, e) = (op.start_ms(), op.end_ms());
            Some(match acc {
                Some((min, max)) => (min.min(s), max.max(e)),
                None => (s, e),
            })
        });

        let Some((min, max)) = bounds else {
            let start = floor_hour(now.timestamp_millis()) - MS_PER_HOUR;
            return Self {
                start_ms: start,
                end_ms: start + 8 * MS_PER_HOUR,
            };
        };

        let span = max - min;
        let pad = match (span as f64 * 0.1).round() as i64 {
            p if p > 0 => p,
            _ => EMPTY_PAD_MS,
        };
        let start_ms = min - pad;
        let end_ms = (max + pad).max(start_ms + 2 * EMPTY_PAD_MS);
        Self { start_ms, end_ms }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    pub fn contains(&self, t_ms: i64) -> bool {
        t_ms >= self.start_ms && t_ms <= self.end_ms
    }
}

// ── TimeScale ───────────────────────────────────────────────────────

/// Linear mapping of a [`ViewWindow`] onto `width` pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    window: ViewWindow,
    width: f64,
    px_per_ms: f64,
}

impl TimeScale {
    pub fn new(window: ViewWindow, width: f64) -> Self {
        let total = window.duration_ms();
        let px_per_ms = if width > 0.0 && total > 0 {
            width / total as f64
        } else {
            FALLBACK_PX_PER_MS
        };
        Self {
            window,
            width,
            px_per_ms,
        }
    }

    pub fn window(&self) -> ViewWindow {
        self.window
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn px_per_ms(&self) -> f64 {
        self.px_per_ms
    }

    pub fn ms_per_px(&self) -> f64 {
        1.0 / self.px_per_ms
    }

    /// Horizontal pixel offset of `t_ms` from the window start.
    pub fn to_x(&self, t_ms: i64) -> f64 {
        (t_ms - self.window.start_ms) as f64 * self.px_per_ms
    }

    /// Inverse of [`to_x`](Self::to_x), rounded to the millisecond.
    pub fn from_x(&self, x: f64) -> i64 {
        self.window.start_ms + self.delta_ms(x)
    }

    /// Block width for `[t0, t1]`, never narrower than [`MIN_BLOCK_WIDTH`].
    pub fn to_width(&self, t0_ms: i64, t1_ms: i64) -> f64 {
        ((t1_ms - t0_ms) as f64 * self.px_per_ms).max(MIN_BLOCK_WIDTH)
    }

    /// Milliseconds covered by a horizontal pointer movement of `dx` pixels.
    pub fn delta_ms(&self, dx: f64) -> i64 {
        (dx * self.ms_per_px()).round() as i64
    }

    /// Whole-hour ticks from the hour containing the window start to the window end.
    pub fn hour_ticks(&self) -> Vec<(i64, f64)> {
        let mut ticks = Vec::new();
        let mut t = floor_hour(self.window.start_ms);
        while t <= self.window.end_ms {
            ticks.push((t, self.to_x(t)));
            t += MS_PER_HOUR;
        }
        ticks
    }
}
