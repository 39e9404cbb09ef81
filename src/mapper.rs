//! Time/value to pixel transforms
//!
//! Screen coordinates grow to the right and downward, so the value axis
//! runs from `y1` (bottom, `y_min`) up to `y2` (top, `y_max`).

use crate::types::{ValueRange, Window};

/// Clamp infinities to the largest finite magnitude
pub fn truncate_infinity(v: f64) -> f64 {
    if v == f64::INFINITY {
        f64::MAX
    } else if v == f64::NEG_INFINITY {
        -f64::MAX
    } else {
        v
    }
}

/// Plot rectangle inside the canvas, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    /// Left edge
    pub x1: f64,
    /// Bottom edge
    pub y1: f64,
    /// Right edge
    pub x2: f64,
    /// Top edge
    pub y2: f64,
}

impl PlotArea {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y2
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x > self.x1 && x < self.x2 && y > self.y2 && y < self.y1
    }
}

/// Bidirectional transforms for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    pub area: PlotArea,
    pub window: Window,
    pub range: ValueRange,
    pub log: bool,
}

impl CoordinateMapper {
    pub fn new(area: PlotArea, window: Window, range: ValueRange, log: bool) -> Self {
        Self {
            area,
            window,
            range,
            log,
        }
    }

    fn time_scale(&self) -> f64 {
        self.area.width() / self.window.span()
    }

    pub fn time_to_x(&self, t: f64) -> f64 {
        (t - self.window.t_min) * self.time_scale() + self.area.x1
    }

    pub fn x_to_time(&self, x: f64) -> f64 {
        (x - self.area.x1) / self.time_scale() + self.window.t_min
    }

    pub fn value_to_y(&self, v: f64) -> f64 {
        let PlotArea { y1, y2, .. } = self.area;
        let ValueRange { y_min, y_max, .. } = self.range;

        if v == f64::INFINITY {
            return y2;
        }
        if v == f64::NEG_INFINITY {
            return y1;
        }

        if self.log {
            if v <= 0.0 {
                return y1;
            }
            return y1 - (v.ln() - y_min.ln()) / (y_max.ln() - y_min.ln()) * (y1 - y2);
        }

        // scaled so that neither the span nor the offset overflows
        let scale = (y1 - y2) / (y_max / 1e4 - y_min / 1e4);
        y1 - (v / 1e4 - y_min / 1e4) * scale
    }

    pub fn y_to_value(&self, y: f64) -> f64 {
        let PlotArea { y1, y2, .. } = self.area;
        let ValueRange { y_min, y_max, .. } = self.range;
        let fraction = (y1 - y) / (y1 - y2);

        if self.log {
            return (y_min.ln() + fraction * (y_max.ln() - y_min.ln())).exp();
        }

        let span = y_max - y_min;
        if span.is_finite() {
            y_min + fraction * span
        } else {
            (y_min / 1e4 + fraction * (y_max / 1e4 - y_min / 1e4)) * 1e4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapper(y_min: f64, y_max: f64, log: bool) -> CoordinateMapper {
        CoordinateMapper::new(
            PlotArea::new(50.0, 400.0, 850.0, 20.0),
            Window::new(1_700_000_000.0, 1_700_003_600.0),
            ValueRange::new(y_min, y_max),
            log,
        )
    }

    #[test]
    fn test_time_mapping_edges() {
        let m = mapper(0.0, 1.0, false);
        assert_eq!(m.time_to_x(1_700_000_000.0), 50.0);
        assert!((m.time_to_x(1_700_003_600.0) - 850.0).abs() < 1e-6);
        assert!((m.x_to_time(450.0) - 1_700_001_800.0).abs() < 1e-4);
    }

    #[test]
    fn test_value_mapping_edges() {
        let m = mapper(-10.0, 10.0, false);
        assert!((m.value_to_y(-10.0) - 400.0).abs() < 1e-9);
        assert!((m.value_to_y(10.0) - 20.0).abs() < 1e-9);
        assert!((m.value_to_y(0.0) - 210.0).abs() < 1e-9);
    }

    #[test]
    fn test_infinity_clamps_to_boundary() {
        let m = mapper(-10.0, 10.0, false);
        assert_eq!(m.value_to_y(f64::INFINITY), 20.0);
        assert_eq!(m.value_to_y(f64::NEG_INFINITY), 400.0);

        let m = mapper(1.0, 1000.0, true);
        assert_eq!(m.value_to_y(f64::INFINITY), 20.0);
        assert_eq!(m.value_to_y(0.0), 400.0);
        assert_eq!(m.value_to_y(-5.0), 400.0);
    }

    #[test]
    fn test_full_range_does_not_overflow() {
        let m = mapper(-f64::MAX, f64::MAX, false);
        let y = m.value_to_y(0.0);
        assert!(y.is_finite());
        assert!((y - 210.0).abs() < 1e-6);
        assert!(m.y_to_value(210.0).abs() < 1e300);
        assert!(m.y_to_value(30.0).is_finite());
    }

    #[test]
    fn test_log_decades_evenly_spaced() {
        let m = mapper(1.0, 1000.0, true);
        let y10 = m.value_to_y(10.0);
        let y100 = m.value_to_y(100.0);
        assert!(((400.0 - y10) - (y10 - y100)).abs() < 1e-9);
    }

    #[test]
    fn test_truncate_infinity() {
        assert_eq!(truncate_infinity(f64::INFINITY), f64::MAX);
        assert_eq!(truncate_infinity(f64::NEG_INFINITY), -f64::MAX);
        assert_eq!(truncate_infinity(1.5), 1.5);
    }

    proptest! {
        #[test]
        fn prop_time_round_trip(t in 1_700_000_000.0f64..1_700_003_600.0) {
            let m = mapper(0.0, 1.0, false);
            let back = m.x_to_time(m.time_to_x(t));
            prop_assert!((back - t).abs() < 1e-4);
        }

        #[test]
        fn prop_linear_value_round_trip(
            lo in -1e6f64..1e6,
            span in 1e-3f64..1e6,
            frac in 0.001f64..0.999,
        ) {
            let m = mapper(lo, lo + span, false);
            let v = lo + frac * span;
            let back = m.y_to_value(m.value_to_y(v));
            prop_assert!((back - v).abs() <= 1e-7 * span.max(v.abs()));
        }

        #[test]
        fn prop_log_value_round_trip(
            exp_lo in -10.0f64..5.0,
            decades in 0.5f64..10.0,
            frac in 0.001f64..0.999,
        ) {
            let lo = 10f64.powf(exp_lo);
            let hi = 10f64.powf(exp_lo + decades);
            let v = 10f64.powf(exp_lo + frac * decades);
            let m = mapper(lo, hi, true);
            let back = m.y_to_value(m.value_to_y(v));
            prop_assert!(((back - v) / v).abs() < 1e-9);
        }
    }
}
