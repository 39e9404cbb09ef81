//! Axis planning
//!
//! The planners decide where ticks go, which ticks are major, which carry
//! a label and how each label is written. They never draw. Positions are
//! returned as pixel offsets from the axis origin (bottom of the value
//! axis, left end of the time axis) so the renderer only has to add the
//! plot-area corner.
//!
//! Both planners avoid label collisions by coarsening the label step until
//! labels fit, measuring text through [`TextMetrics`].

mod numeric;
mod time;

pub use numeric::{plan_value_axis, plan_value_axis_spaced, ValueAxisPlan};
pub use time::{plan_time_axis, time_label, TimeAxisPlan, TIME_BASES};

/// Tick length class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Minor,
    Major,
    /// Major tick at a label step
    Labeled,
}

/// One tick along an axis
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Value (or epoch seconds) at the tick
    pub value: f64,
    /// Pixel distance from the axis origin
    pub offset: f64,
    pub kind: TickKind,
    /// Text to draw next to the tick. Log axes may label minor ticks.
    pub label: Option<String>,
}

/// Text measurement supplied by the renderer
pub trait TextMetrics {
    /// Rendered width of `text` in pixels
    fn text_width(&self, text: &str) -> f64;

    /// Height of one line of label text in pixels
    fn text_height(&self) -> f64;
}

/// Monospace approximation used when no renderer is attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTextMetrics {
    pub char_width: f64,
    pub text_height: f64,
}

impl Default for FixedTextMetrics {
    fn default() -> Self {
        Self {
            char_width: 7.0,
            text_height: 14.0,
        }
    }
}

impl TextMetrics for FixedTextMetrics {
    fn text_width(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.char_width
    }

    fn text_height(&self) -> f64 {
        self.text_height
    }
}

/// Format with `digits` significant digits, switching to exponent notation
/// for large or tiny magnitudes.
pub fn to_precision(v: f64, digits: usize) -> String {
    let digits = digits.clamp(1, 100);
    if !v.is_finite() {
        return v.to_string();
    }
    if v == 0.0 {
        return format!("{:.*}", digits - 1, 0.0);
    }

    let sci = format!("{:.*e}", digits - 1, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };

    if exp < -6 || exp >= digits as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{}", mantissa, sign, exp.abs())
    } else {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        format!("{:.*}", decimals, v)
    }
}

/// Exponent notation with `digits` digits after the point
pub fn to_exponential(v: f64, digits: usize) -> String {
    let sci = format!("{:.*e}", digits.min(100), v);
    match sci.split_once('e') {
        Some((m, e)) if !e.starts_with('-') => format!("{}e+{}", m, e),
        _ => sci,
    }
}

/// Drop trailing zeros of the fraction (and a dangling point), keeping any
/// exponent suffix.
pub fn strip_zeros(s: &str) -> String {
    let s = s.trim();
    if !s.contains('.') {
        return s.to_string();
    }
    let (number, exponent) = match s.find('e') {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", number, exponent)
}

/// Value-axis label for `v` at `digits` significant digits
pub fn format_value(v: f64, digits: usize) -> String {
    let raw = if v.abs() < 0.001 && v.abs() > 1e-20 {
        to_exponential(v, digits)
    } else {
        to_precision(v, digits)
    };
    strip_zeros(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_precision_fixed() {
        assert_eq!(to_precision(3.14159, 3), "3.14");
        assert_eq!(to_precision(1050.0, 4), "1050");
        assert_eq!(to_precision(0.5, 2), "0.50");
        assert_eq!(to_precision(0.0, 3), "0.00");
        assert_eq!(to_precision(-12.5, 3), "-12.5");
    }

    #[test]
    fn test_to_precision_exponent() {
        assert_eq!(to_precision(1050.0, 3), "1.05e+3");
        assert_eq!(to_precision(123456.0, 2), "1.2e+5");
        assert_eq!(to_precision(0.00000012, 2), "1.2e-7");
    }

    #[test]
    fn test_to_exponential() {
        assert_eq!(to_exponential(0.00025, 2), "2.50e-4");
        assert_eq!(to_exponential(2500.0, 1), "2.5e+3");
    }

    #[test]
    fn test_strip_zeros() {
        assert_eq!(strip_zeros("1.500"), "1.5");
        assert_eq!(strip_zeros("2.000"), "2");
        assert_eq!(strip_zeros("100"), "100");
        assert_eq!(strip_zeros("2.50e-4"), "2.5e-4");
        assert_eq!(strip_zeros("1.00e+5"), "1e+5");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0, 2), "0");
        assert_eq!(format_value(0.2, 1), "0.2");
        assert_eq!(format_value(0.0005, 1), "5e-4");
        assert_eq!(format_value(1e5, 1), "1e+5");
        assert_eq!(format_value(42.0, 2), "42");
    }

    #[test]
    fn test_fixed_metrics() {
        let m = FixedTextMetrics::default();
        assert_eq!(m.text_width("12:00"), 35.0);
        assert_eq!(m.text_height(), 14.0);
    }
}
