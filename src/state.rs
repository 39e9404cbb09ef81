//! Chart state shared by the controller and the interaction state machine

use crate::types::{ValueRange, Window};

/// Smallest value bound on a log axis
pub const LOG_MIN: f64 = 1e-20;

/// Smallest upper bound on a log axis
pub const LOG_MAX_FLOOR: f64 = 1e-18;

/// Nearest data point under the cursor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Series (variable) index
    pub series: usize,
    /// Point or bin index within the series
    pub index: usize,
    /// Pixel position of the point
    pub x: f64,
    pub y: f64,
    pub time: f64,
    /// Value shown in the marker tooltip
    pub value: f64,
}

/// Everything the interaction handlers may change about one chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartState {
    pub window: Window,
    pub range: ValueRange,
    /// Follow the present (strip-chart mode)
    pub scroll: bool,
    /// Manual value zoom; autoscale is suspended while set
    pub y_zoom: bool,
    pub log_axis: bool,
    /// Only this series is shown and autoscaled
    pub solo: Option<usize>,
    pub show_zoom_buttons: bool,
    /// Configured timescale in seconds, used by reset
    pub t_scale: f64,
    pub marker: Option<Marker>,
    /// Host view is visible; live-tail pauses otherwise
    pub visible: bool,
}

impl ChartState {
    pub fn new(window: Window, t_scale: f64, log_axis: bool) -> Self {
        Self {
            window,
            range: ValueRange::default(),
            scroll: true,
            y_zoom: false,
            log_axis,
            solo: None,
            show_zoom_buttons: true,
            t_scale,
            marker: None,
            visible: true,
        }
    }

    /// Keep log-axis bounds positive
    pub fn clamp_log_range(&mut self) {
        if self.log_axis {
            if self.range.y_min <= 0.0 {
                self.range.y_min = LOG_MIN;
            }
            if self.range.y_max <= 0.0 {
                self.range.y_max = LOG_MAX_FLOOR;
            }
        }
    }

    /// Whether series `index` is drawn and autoscaled
    pub fn shows(&self, index: usize) -> bool {
        self.solo.map_or(true, |s| s == index)
    }
}
