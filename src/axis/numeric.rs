//! Value-axis planning
//!
//! Linear axes step through `{1, 2, 5} x 10^k`. The tick step is the first
//! nice number above the raw step implied by the minimum tick spacing,
//! majors start one nice number coarser, and labels are coarsened further
//! until they no longer overlap. Log axes tick every integer multiple of the
//! current decade and always label decades.

use super::{format_value, TextMetrics, Tick, TickKind};

/// Default minimum distance between ticks in pixels
pub const MIN_TICK_SPACING_PX: f64 = 6.0;

/// Hard stop for degenerate inputs
const MAX_TICKS: usize = 100_000;

/// Output of the value-axis planner
#[derive(Debug, Clone, PartialEq)]
pub struct ValueAxisPlan {
    /// Ticks in increasing value order
    pub ticks: Vec<Tick>,
    /// Initial tick step (log axes grow it by 10 per decade)
    pub tick_step: f64,
    pub major_step: f64,
    pub label_step: f64,
    /// Significant digits used for labels
    pub precision: usize,
    /// Widest label, for sizing the left margin
    pub max_label_width: f64,
}

impl ValueAxisPlan {
    pub fn labels(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter().filter(|t| t.label.is_some())
    }
}

/// `{1, 2, 5, 10, 20, 50, ...}[i]`, unbounded
fn nice_base(i: usize) -> f64 {
    const MANTISSA: [f64; 3] = [1.0, 2.0, 5.0];
    MANTISSA[i % 3] * 10f64.powi((i / 3) as i32)
}

/// Whether `v` is an integer multiple of `step`, with tolerance relative
/// to the tick step `dy`
fn is_multiple(v: f64, step: f64, dy: f64) -> bool {
    let q = v / step;
    (q.round() - q).abs() < dy / step / 10.0
}

/// Plan a value axis with the default tick spacing
pub fn plan_value_axis(
    min: f64,
    max: f64,
    extent: f64,
    log: bool,
    metrics: &dyn TextMetrics,
) -> Option<ValueAxisPlan> {
    plan_value_axis_spaced(min, max, extent, log, metrics, MIN_TICK_SPACING_PX)
}

/// Plan a value axis spanning `extent` pixels.
///
/// Returns `None` when `max <= min`, either bound is NaN or `extent <= 0`.
pub fn plan_value_axis_spaced(
    min: f64,
    max: f64,
    extent: f64,
    log: bool,
    metrics: &dyn TextMetrics,
    tick_spacing: f64,
) -> Option<ValueAxisPlan> {
    if min.is_nan() || max.is_nan() || max <= min || extent.is_nan() || extent <= 0.0 {
        return None;
    }

    let text_height = metrics.text_height();
    let mut min = min;
    let dy;
    let mut major_dy;
    let mut label_dy;
    let precision;

    if !(max - min).is_finite() || max == f64::MAX {
        dy = f64::MAX / 10.0;
        major_dy = dy;
        label_dy = dy;
        precision = 1;
    } else if log {
        if min <= 0.0 {
            min = 1e-20;
        }
        let mut decade = 10f64.powf(min.log10().floor());
        if decade == 0.0 || !decade.is_finite() {
            min = 1e-20;
            decade = 1e-20;
        }
        if max <= min {
            return None;
        }
        dy = decade;
        label_dy = decade;
        major_dy = decade * 10.0;
        precision = 4;
    } else {
        let raw = (max - min) / (extent / tick_spacing);
        let mut int_dy = raw.log10().floor();
        let mut frac_dy = raw.log10() - int_dy;
        if frac_dy < 0.0 {
            frac_dy += 1.0;
            int_dy -= 1.0;
        }

        let tick_base = if frac_dy < 2f64.log10() {
            1
        } else if frac_dy < 5f64.log10() {
            2
        } else {
            3
        };
        let mut major_base = tick_base + 1;
        let mut label_base = major_base;
        let scale = 10f64.powf(int_dy);

        dy = scale * nice_base(tick_base);
        major_dy = scale * nice_base(major_base);
        label_dy = major_dy;

        precision = significant_digits(min, max, label_dy);

        while label_dy / (max - min) * extent < 1.5 * text_height {
            label_base += 1;
            label_dy = scale * nice_base(label_base);
            if label_base % 3 == 2 && major_base % 3 == 1 {
                major_base += 1;
                major_dy = scale * nice_base(major_base);
            }
        }
    }

    let tick_step = dy;
    let plan_major = major_dy;
    let plan_label = label_dy;

    let position = |v: f64| -> f64 {
        if log {
            (v.ln() - min.ln()) / (max.ln() - min.ln()) * extent
        } else if !(max - min).is_finite() {
            (v / 1e4 - min / 1e4) / (max / 1e4 - min / 1e4) * extent
        } else {
            (v - min) / (max - min) * extent
        }
    };

    let mut ticks = Vec::new();
    let mut max_label_width: f64 = 0.0;
    let mut last_label_offset = 0.0;
    let mut dy = dy;
    let start = (min / dy).floor();
    let mut k = 0.0;
    let mut y = start * dy;

    for _ in 0..MAX_TICKS {
        let offset = position(y);
        if offset.is_nan() || offset > extent + 0.001 {
            break;
        }

        if offset >= -0.001 {
            let mut kind = TickKind::Minor;
            let mut label = None;

            // the decade at the bottom of a log axis is not a multiple of
            // the next decade but is labeled all the same
            let bottom_decade = log && ticks.is_empty() && ((y / dy) - 1.0).abs() < 1e-9;

            if bottom_decade {
                kind = TickKind::Labeled;
                label = Some(format_value(y, precision));
                last_label_offset = offset + text_height / 2.0;
            } else if is_multiple(y, major_dy, dy) {
                kind = TickKind::Major;
                if is_multiple(y, label_dy, dy) {
                    kind = TickKind::Labeled;
                    label = Some(format_value(y, precision));
                    last_label_offset = offset + text_height / 2.0;
                }
                if log {
                    dy *= 10.0;
                    major_dy *= 10.0;
                    label_dy *= 10.0;
                }
            }

            if log {
                if label.is_none()
                    && offset + text_height / 2.0 < extent
                    && offset > text_height / 2.0
                    && offset > last_label_offset + text_height - 2.0
                {
                    label = Some(format_value(y, precision));
                }
                last_label_offset = offset;
            }

            if let Some(text) = &label {
                max_label_width = max_label_width.max(metrics.text_width(text));
            }
            ticks.push(Tick {
                value: y,
                offset,
                kind,
                label,
            });
        }

        if log {
            y += dy;
        } else {
            k += 1.0;
            y = (start + k) * dy;
        }
        if y.abs() < dy / 100.0 {
            y = 0.0;
        }
    }

    Some(ValueAxisPlan {
        ticks,
        tick_step,
        major_step: plan_major,
        label_step: plan_label,
        precision,
        max_label_width,
    })
}

/// Significant digits needed to tell labels `label_dy` apart between
/// `min` and `max`. Values below 100000 always get enough digits to avoid
/// exponent notation.
fn significant_digits(min: f64, max: f64, label_dy: f64) -> usize {
    let magnitude = |v: f64| v.abs().log10().floor();
    let step_mag = magnitude(label_dy);

    let digits_for = |v: f64| -> f64 {
        if v == 0.0 {
            1.0
        } else {
            magnitude(v) - step_mag + 1.0
        }
    };

    let mut n = digits_for(min).max(digits_for(max)).max(1.0);
    for v in [min, max] {
        if v != 0.0 && v.abs() < 100_000.0 {
            n = n.max((v.abs().log10() + 0.001).floor() + 1.0);
        }
    }
    n as usize
}
