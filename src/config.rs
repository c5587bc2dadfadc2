//! Click session configuration and profile files.
//!
//! `ClickConfiguration` is the validated, immutable configuration a session
//! runs with. `ClickProfile` is the JSON file format the CLI loads and saves;
//! it converts into a `ClickConfiguration` through [`ClickProfile::to_config`].

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClickError, Result};
use crate::process_finder::ProcessRef;

/// A screen coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Which pointer button a click attempt presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClickType {
    #[default]
    Primary,
    Secondary,
}

/// Rule governing when a running session stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Run until stopped manually.
    #[default]
    Unlimited,
    /// Stop after this much active (non-paused) run time.
    TimeLimit { seconds: u64 },
    /// Stop after exactly this many injection attempts.
    ClickCount { count: u64 },
}

impl DurationPolicy {
    fn validate(&self) -> Result<()> {
        match self {
            DurationPolicy::Unlimited => Ok(()),
            DurationPolicy::TimeLimit { seconds } => {
                if *seconds == 0 {
                    Err(ClickError::invalid_duration_policy(
                        "time limit must be >= 1 second",
                    ))
                } else {
                    Ok(())
                }
            }
            DurationPolicy::ClickCount { count } => {
                if *count == 0 {
                    Err(ClickError::invalid_duration_policy(
                        "click count must be >= 1",
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Bounds of the display the target point lives on. Jittered locations are
/// clamped to these bounds so a click never lands off-screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl DisplayBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn clamp(&self, p: Point) -> Point {
        Point {
            x: p.x.clamp(self.min_x, self.max_x),
            y: p.y.clamp(self.min_y, self.max_y),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

impl Default for DisplayBounds {
    /// A common 1080p display; hosts should supply real bounds.
    fn default() -> Self {
        Self::new(0.0, 0.0, 1920.0, 1080.0)
    }
}

/// Immutable configuration for one automation session.
///
/// Validated once at construction; the engine never sees a zero or negative
/// interval or an out-of-range jitter parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickConfiguration {
    /// Where to click, before location jitter.
    pub target_point: Point,

    #[serde(default)]
    pub click_type: ClickType,

    /// Base interval between clicks in milliseconds. Must be >= 1.
    pub base_interval_ms: u64,

    #[serde(default)]
    pub duration_policy: DurationPolicy,

    /// Radius in pixels for location jitter; 0 disables it.
    #[serde(default)]
    pub location_jitter_radius_px: f64,

    /// Symmetric interval jitter as a fraction of the base interval, 0.0..=1.0.
    #[serde(default)]
    pub interval_jitter_ratio: f64,

    /// Bounds jittered locations are clamped to.
    #[serde(default)]
    pub display_bounds: DisplayBounds,

    /// Opaque handle for background/unfocused targeting, resolved externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_process: Option<ProcessRef>,

    /// Whether a single injection failure terminates the session.
    #[serde(default)]
    pub stop_on_error: bool,
}

impl ClickConfiguration {
    /// Minimal configuration clicking `point` every `interval_ms` milliseconds.
    pub fn new(point: Point, interval_ms: u64) -> Self {
        Self {
            target_point: point,
            click_type: ClickType::Primary,
            base_interval_ms: interval_ms,
            duration_policy: DurationPolicy::Unlimited,
            location_jitter_radius_px: 0.0,
            interval_jitter_ratio: 0.0,
            display_bounds: DisplayBounds::default(),
            target_process: None,
            stop_on_error: false,
        }
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// Validate all parameters. Called by the coordinator before any timer
    /// starts; errors here never create a session.
    pub fn validate(&self) -> Result<()> {
        if self.base_interval_ms == 0 {
            return Err(ClickError::invalid_interval(self.base_interval_ms as i64));
        }
        self.duration_policy.validate()?;
        if !(0.0..=1.0).contains(&self.interval_jitter_ratio) {
            return Err(ClickError::invalid_jitter(format!(
                "interval jitter ratio {} outside 0.0..=1.0",
                self.interval_jitter_ratio
            )));
        }
        if self.location_jitter_radius_px < 0.0 || !self.location_jitter_radius_px.is_finite() {
            return Err(ClickError::invalid_jitter(format!(
                "location jitter radius {} must be finite and >= 0",
                self.location_jitter_radius_px
            )));
        }
        if !self.display_bounds.contains(self.target_point) {
            return Err(ClickError::invalid_jitter(format!(
                "target point ({}, {}) outside display bounds",
                self.target_point.x, self.target_point.y
            )));
        }
        Ok(())
    }
}

/// JSON profile file the CLI reads and writes.
///
/// ```json
/// {
///   "target_x": 640.0,
///   "target_y": 360.0,
///   "interval": "250ms",
///   "click_type": "primary",
///   "click_count": 100,
///   "interval_jitter_ratio": 0.1,
///   "location_jitter_radius_px": 4.0,
///   "process_name": "game.exe",
///   "emergency_hotkey": "ctrl+alt+x"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickProfile {
    pub target_x: f64,
    pub target_y: f64,

    /// Interval string, e.g. "250ms", "1s", or bare milliseconds.
    pub interval: String,

    #[serde(default)]
    pub click_type: ClickType,

    /// Stop after this many clicks; mutually exclusive with `time_limit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_count: Option<u64>,

    /// Stop after this much run time, e.g. "30s"; mutually exclusive with
    /// `click_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<String>,

    #[serde(default)]
    pub interval_jitter_ratio: f64,

    #[serde(default)]
    pub location_jitter_radius_px: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,

    #[serde(default = "default_emergency_hotkey")]
    pub emergency_hotkey: String,

    #[serde(default)]
    pub stop_on_error: bool,

    #[serde(default)]
    pub verbose: bool,
}

fn default_emergency_hotkey() -> String {
    "ctrl+alt+x".to_string()
}

impl ClickProfile {
    /// Load a profile from a JSON file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ClickError::profile_load(path, e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| ClickError::profile_load(path, e.to_string()))
    }

    /// Save a profile to a JSON file.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ClickError::profile_save(path, e.to_string()))?;
        fs::write(path, contents).map_err(|e| ClickError::profile_save(path, e.to_string()))
    }

    /// Convert into a validated `ClickConfiguration`.
    pub fn to_config(&self) -> Result<ClickConfiguration> {
        if self.click_count.is_some() && self.time_limit.is_some() {
            return Err(ClickError::invalid_duration_policy(
                "click_count and time_limit are mutually exclusive",
            ));
        }
        let duration_policy = if let Some(count) = self.click_count {
            DurationPolicy::ClickCount { count }
        } else if let Some(ref limit) = self.time_limit {
            DurationPolicy::TimeLimit {
                seconds: parse_duration(limit)?.as_secs(),
            }
        } else {
            DurationPolicy::Unlimited
        };

        let interval = parse_duration(&self.interval)?;
        let config = ClickConfiguration {
            target_point: Point::new(self.target_x, self.target_y),
            click_type: self.click_type,
            base_interval_ms: interval.as_millis() as u64,
            duration_policy,
            location_jitter_radius_px: self.location_jitter_radius_px,
            interval_jitter_ratio: self.interval_jitter_ratio,
            display_bounds: DisplayBounds::default(),
            target_process: None,
            stop_on_error: self.stop_on_error,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parse a duration string: "500ms", "2s", "1m", or bare milliseconds.
/// Case-insensitive, surrounding whitespace ignored.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(ClickError::invalid_duration(value, "empty string"));
    }

    let (number, multiplier_ms) = if let Some(stripped) = trimmed.strip_suffix("ms") {
        (stripped, 1u64)
    } else if let Some(stripped) = trimmed.strip_suffix('s') {
        (stripped, 1_000)
    } else if let Some(stripped) = trimmed.strip_suffix('m') {
        (stripped, 60_000)
    } else {
        (trimmed.as_str(), 1)
    };

    let number = number.trim();
    let parsed: u64 = number
        .parse()
        .map_err(|_| ClickError::invalid_duration(value, "not a non-negative integer"))?;
    let millis = parsed
        .checked_mul(multiplier_ms)
        .ok_or_else(|| ClickError::invalid_duration(value, "duration too large"))?;

    Ok(Duration::from_millis(millis))
}
