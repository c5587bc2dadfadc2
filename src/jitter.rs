//! Interval and location randomization.
//!
//! Both functions are pure over the supplied random source, so they are
//! deterministic under a seeded rng and independently testable. No hidden
//! state lives here; the coordinator owns the rng.

use std::time::Duration;

use rand::Rng;

use crate::config::{DisplayBounds, Point};

/// Minimum interval the engine will ever run at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Uniform draw over `[base × (1 - ratio), base × (1 + ratio)]`, floored at
/// 1ms. A ratio of 0.0 returns `base` unchanged.
pub fn jitter_interval(rng: &mut impl Rng, base: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return base.max(MIN_INTERVAL);
    }
    let base_ms = base.as_secs_f64() * 1_000.0;
    let spread = base_ms * ratio;
    let drawn_ms = rng.gen_range((base_ms - spread)..=(base_ms + spread));
    Duration::from_secs_f64((drawn_ms / 1_000.0).max(0.001))
}

/// Uniform draw inside a disc of `radius_px` around `point`, clamped to
/// `bounds` so the result never falls off-screen. A radius of 0 returns
/// `point` unchanged (still clamped).
pub fn jitter_location(
    rng: &mut impl Rng,
    point: Point,
    radius_px: f64,
    bounds: DisplayBounds,
) -> Point {
    if radius_px <= 0.0 {
        return bounds.clamp(point);
    }
    // sqrt on the radial draw gives a uniform density over the disc area
    // rather than clustering toward the center.
    let r = radius_px * rng.gen_range(0.0f64..=1.0).sqrt();
    let theta = rng.gen_range(0.0f64..std::f64::consts::TAU);
    let jittered = Point::new(point.x + r * theta.cos(), point.y + r * theta.sin());
    bounds.clamp(jittered)
}
