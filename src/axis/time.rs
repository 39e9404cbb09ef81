//! Time-axis planning
//!
//! Steps through a fixed list of human time bases instead of powers of ten.
//! Ticks align to whole steps in the display time zone, so hourly ticks
//! land on local full hours. Label text comes from the label step: a
//! one-minute label step shows `HH:MM`, a daily one shows only the date.

use super::{TextMetrics, Tick, TickKind};
use crate::config::DisplayTimezone;

/// Candidate steps in seconds, finest first
pub const TIME_BASES: [i64; 14] = [
    1, 5, 10, 60, 120, 300, 600, 900, 1800, 3600, 10_800, 21_600, 43_200, 86_400,
];

const DAY_SECS: i64 = 86_400;

/// Minimum distance between time ticks in pixels
const TICK_SPACING_PX: f64 = 5.0;

/// Labels may use up to this share of the space between them
const LABEL_FILL: f64 = 0.75;

const MAX_COARSEN_STEPS: usize = 10_000;
const MAX_TICKS: usize = 100_000;

/// Output of the time-axis planner
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxisPlan {
    /// Ticks in increasing time order; `value` is epoch seconds
    pub ticks: Vec<Tick>,
    pub tick_step: i64,
    pub major_step: i64,
    pub label_step: i64,
    /// Labels carry the date because the window does not end today
    pub force_date: bool,
}

impl TimeAxisPlan {
    pub fn labels(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter().filter(|t| t.label.is_some())
    }
}

/// Label for `sec` when labels are `label_step` seconds apart
pub fn time_label(sec: f64, label_step: i64, force_date: bool, tz: DisplayTimezone) -> String {
    let format = match (force_date, label_step) {
        (true, s) if s < 60 => "%d %b %y, %H:%M:%S",
        (true, s) if s < DAY_SECS => "%d %b %y, %H:%M",
        (true, _) => "%d %b %y",
        (false, s) if s < 60 => "%H:%M:%S",
        (false, s) if s < 10_800 => "%H:%M",
        (false, s) if s < DAY_SECS => "%d %b %y, %H:%M",
        (false, _) => "%d %b %y",
    };
    tz.to_local(sec).format(format).to_string()
}

/// A window ending on another day than `now`, or more than a day ago,
/// needs dates on its labels.
fn needs_date(t_max: f64, now: f64, tz: DisplayTimezone) -> bool {
    let day = |t: f64| tz.to_local(t).date_naive();
    day(t_max) != day(now) || now - t_max > DAY_SECS as f64
}

/// Next coarser step after `TIME_BASES[*base]`. Past the end of the list
/// steps grow by a day.
fn coarsen(base: &mut usize, step: &mut i64) {
    if *base + 1 < TIME_BASES.len() {
        *base += 1;
        *step = TIME_BASES[*base];
    } else {
        *step += DAY_SECS;
    }
}

/// Plan a time axis for `[t_min, t_max]` over `width` pixels.
///
/// `now` decides whether labels need a date. Returns `None` for an empty
/// or non-finite window and for a non-positive width.
pub fn plan_time_axis(
    t_min: f64,
    t_max: f64,
    width: f64,
    tz: DisplayTimezone,
    now: f64,
    metrics: &dyn TextMetrics,
) -> Option<TimeAxisPlan> {
    if !t_min.is_finite() || !t_max.is_finite() || t_max <= t_min {
        return None;
    }
    if width.is_nan() || width <= 0.0 {
        return None;
    }

    let span = t_max - t_min;
    let force_date = needs_date(t_max, now, tz);

    let raw_step = (span / (width / TICK_SPACING_PX)).round();
    let mut tick_base = TIME_BASES
        .iter()
        .position(|&b| b as f64 > raw_step)
        .unwrap_or(TIME_BASES.len() - 1);
    let mut tick_dx = TIME_BASES[tick_base];
    let mut major_base = tick_base;
    let mut major_dx = tick_dx;
    let mut label_base = major_base;
    let mut label_dx = tick_dx;

    for _ in 0..MAX_COARSEN_STEPS {
        let sample = time_label(t_min, label_dx, force_date, tz);
        if metrics.text_width(&sample) <= LABEL_FILL * label_dx as f64 / span * width {
            break;
        }

        coarsen(&mut label_base, &mut label_dx);
        let exhausted = label_base + 1 >= TIME_BASES.len();
        if label_base > major_base + 1 || exhausted {
            coarsen(&mut major_base, &mut major_dx);
        }
        if major_base > tick_base + 1 || exhausted {
            coarsen(&mut tick_base, &mut tick_dx);
        }
    }

    // wall clock = epoch + offset; steps are whole multiples in wall clock
    let shift = -(tz.offset_secs(t_min) as i64);
    let mut t = (t_min.floor() as i64 - shift).div_euclid(tick_dx) * tick_dx + shift;

    let mut ticks = Vec::new();
    for _ in 0..MAX_TICKS {
        let offset = (t as f64 - t_min) / span * width;
        if offset > width + 0.001 {
            break;
        }

        if offset >= 0.0 {
            let wall = t - shift;
            let (kind, label) = if wall.rem_euclid(major_dx) != 0 {
                (TickKind::Minor, None)
            } else if wall.rem_euclid(label_dx) != 0 {
                (TickKind::Major, None)
            } else {
                let text = time_label(t as f64, label_dx, force_date, tz);
                (TickKind::Labeled, Some(text))
            };
            ticks.push(Tick {
                value: t as f64,
                offset,
                kind,
                label,
            });
        }

        t += tick_dx;
    }

    Some(TimeAxisPlan {
        ticks,
        tick_step: tick_dx,
        major_step: major_dx,
        label_step: label_dx,
        force_date,
    })
}
