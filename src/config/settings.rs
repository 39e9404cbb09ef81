//! Engine tunables and display settings
//!
//! These settings control the windowed data engine rather than a single
//! panel: when to switch to binned reads, how big a raw request may get,
//! how often live-tail polls and how gestures are thresholded.
//!
//! # Main Types
//!
//! - [`EngineSettings`] - Fetch, redraw and gesture thresholds
//! - [`DisplaySettings`] - Time zone and font metrics
//! - [`DisplayTimezone`] - Zone used for time-axis labels and tick alignment

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Seconds per day
pub const DAY: f64 = 86_400.0;

/// Fetch and interaction thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Window spans above this many seconds are fetched binned
    pub binned_threshold_secs: f64,

    /// Bins requested per binned read
    pub bin_budget: u32,

    /// Widest single raw request in seconds
    pub max_raw_span_secs: f64,

    /// Minimum interval between non-forced redraws
    pub redraw_interval_ms: u64,

    /// Fastest live-tail poll in seconds
    pub live_tail_min_secs: f64,

    /// Slowest live-tail poll in seconds
    pub live_tail_max_secs: f64,

    /// Rubber-band extent below which a zoom gesture is discarded
    pub zoom_dead_zone_px: f64,

    /// Largest time-zoom factor per wheel event
    pub wheel_time_zoom_limit: f64,

    /// Largest value-zoom factor per wheel event
    pub wheel_value_zoom_limit: f64,

    /// Allowed ratio between zoomed and autoscaled value span
    pub value_zoom_ratio_limit: f64,

    /// Marker capture radius
    pub marker_radius_px: f64,

    /// Minimum spacing between value-axis ticks
    pub min_tick_spacing_px: f64,

    /// Longest span kept when jumping to the present
    pub jump_span_limit_secs: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binned_threshold_secs: 7.0 * DAY,
            bin_budget: 5000,
            max_raw_span_secs: 30.0 * DAY,
            redraw_interval_ms: 30,
            live_tail_min_secs: 0.1,
            live_tail_max_secs: 60.0,
            zoom_dead_zone_px: 5.0,
            wheel_time_zoom_limit: 0.3,
            wheel_value_zoom_limit: 0.5,
            value_zoom_ratio_limit: 1000.0,
            marker_radius_px: 10.0,
            min_tick_spacing_px: 6.0,
            jump_span_limit_secs: 7.0 * DAY,
        }
    }
}

impl EngineSettings {
    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms)
    }
}

/// Time zone for axis labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayTimezone {
    Utc,
    #[default]
    Local,
    /// Fixed offset east of UTC in seconds (e.g. the history server's zone)
    Fixed(i32),
}

impl DisplayTimezone {
    /// Offset east of UTC, in seconds, at `epoch_secs`
    pub fn offset_secs(&self, epoch_secs: f64) -> i32 {
        match self {
            DisplayTimezone::Utc => 0,
            DisplayTimezone::Fixed(offset) => *offset,
            DisplayTimezone::Local => {
                let utc = to_utc(epoch_secs);
                Local
                    .offset_from_utc_datetime(&utc.naive_utc())
                    .fix()
                    .local_minus_utc()
            }
        }
    }

    /// Wall-clock time of `epoch_secs` in this zone
    pub fn to_local(&self, epoch_secs: f64) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.offset_secs(epoch_secs))
            .unwrap_or_else(|| Utc.fix());
        to_utc(epoch_secs).with_timezone(&offset)
    }
}

fn to_utc(epoch_secs: f64) -> DateTime<Utc> {
    let secs = epoch_secs.floor();
    let nanos = ((epoch_secs - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)).unwrap_or_default()
}

/// Display-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub timezone: DisplayTimezone,

    /// Average glyph advance used by the built-in text measurer
    pub char_width_px: f64,

    /// Label height used for overlap checks
    pub text_height_px: f64,

    /// Reserve room for the menu buttons on the right edge
    pub show_menu_buttons: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            timezone: DisplayTimezone::Local,
            char_width_px: 7.0,
            text_height_px: 14.0,
            show_menu_buttons: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.binned_threshold_secs, 604_800.0);
        assert_eq!(s.bin_budget, 5000);
        assert_eq!(s.redraw_interval(), Duration::from_millis(30));
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let s: EngineSettings = toml::from_str("bin_budget = 1000").unwrap();
        assert_eq!(s.bin_budget, 1000);
        assert_eq!(s.max_raw_span_secs, 30.0 * DAY);
    }

    #[test]
    fn test_fixed_timezone() {
        let tz = DisplayTimezone::Fixed(3600);
        assert_eq!(tz.offset_secs(0.0), 3600);
        let local = tz.to_local(0.0);
        assert_eq!(local.format("%H:%M").to_string(), "01:00");
        assert_eq!(DisplayTimezone::Utc.to_local(90.0).format("%H:%M:%S").to_string(), "00:01:30");
    }

    #[test]
    fn test_timezone_serde() {
        let tz: DisplayTimezone = serde_json::from_str("\"utc\"").unwrap();
        assert_eq!(tz, DisplayTimezone::Utc);
        let tz: DisplayTimezone = serde_json::from_str("{\"fixed\":-18000}").unwrap();
        assert_eq!(tz, DisplayTimezone::Fixed(-18000));
    }
}
