//! Pixel geometry for the renderer
//!
//! Converts the visible part of every series to pixel coordinates and
//! keeps the result until the window, value range, plot area or point count
//! changes. The marker search and the solo toggle work on this geometry,
//! so they hit exactly what is drawn.

use crate::axis::format_value;
use crate::mapper::{CoordinateMapper, PlotArea};
use crate::state::{ChartState, Marker};
use crate::store::SeriesStore;
use crate::types::{Series, ValueRange, Variable, Window};
use std::ops::Range;

/// Pixel y is clamped to this magnitude before drawing
const MAX_PIXEL: f64 = 100_000.0;

/// Lines are not drawn across gaps longer than this many seconds
const GAP_SECS: f64 = 600.0;

/// ... or shorter than this many pixels
const MIN_GAP_PX: f64 = 5.0;

/// One raw sample in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    pub time: f64,
    pub value: f64,
    pub raw_value: f64,
}

/// One populated bin in pixels. `x` is rounded to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinPoint {
    pub x: f64,
    pub time: f64,
    pub count: u64,
    pub first: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub raw_min: f64,
    pub raw_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesGeometry {
    Raw(Vec<RawPoint>),
    Binned(Vec<BinPoint>),
}

impl Default for SeriesGeometry {
    fn default() -> Self {
        SeriesGeometry::Raw(Vec::new())
    }
}

impl SeriesGeometry {
    pub fn len(&self) -> usize {
        match self {
            SeriesGeometry::Raw(p) => p.len(),
            SeriesGeometry::Binned(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn x_at(&self, i: usize) -> f64 {
        match self {
            SeriesGeometry::Raw(p) => p[i].x,
            SeriesGeometry::Binned(p) => p[i].x,
        }
    }

    /// Index range of points with `x` in `[lo, hi]`
    fn x_range(&self, lo: f64, hi: f64) -> Range<usize> {
        let (start, end) = match self {
            SeriesGeometry::Raw(p) => (
                p.partition_point(|q| q.x < lo),
                p.partition_point(|q| q.x <= hi),
            ),
            SeriesGeometry::Binned(p) => (
                p.partition_point(|q| q.x < lo),
                p.partition_point(|q| q.x <= hi),
            ),
        };
        start..end.max(start)
    }

    /// Runs of points to join with lines, split wherever consecutive points
    /// are more than `gap_px` apart
    pub fn segments(&self, gap_px: f64) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut start = 0;
        for i in 1..self.len() {
            if self.x_at(i) - self.x_at(i - 1) > gap_px {
                runs.push(start..i);
                start = i;
            }
        }
        if start < self.len() {
            runs.push(start..self.len());
        }
        runs
    }
}

/// Gap in pixels beyond which lines are broken
pub fn line_gap_px(mapper: &CoordinateMapper) -> f64 {
    let scale = mapper.area.width() / mapper.window.span();
    (scale * GAP_SECS).max(MIN_GAP_PX)
}

/// Convert the visible part of `series`, plus one point on either side so
/// lines reach the plot edges
pub fn build_geometry(series: &Series, mapper: &CoordinateMapper) -> SeriesGeometry {
    let len = series.len();
    if len == 0 {
        return SeriesGeometry::default();
    }
    let first = series.lower_bound(mapper.window.t_min).saturating_sub(1);
    let last = (series.upper_bound(mapper.window.t_max) + 1).min(len);
    let visible = first..last.max(first);

    match series {
        Series::Raw(samples) => SeriesGeometry::Raw(
            samples[visible]
                .iter()
                .filter_map(|s| {
                    let y = mapper.value_to_y(s.value);
                    if y.is_nan() {
                        return None;
                    }
                    Some(RawPoint {
                        x: mapper.time_to_x(s.time),
                        y: y.clamp(-MAX_PIXEL, MAX_PIXEL),
                        time: s.time,
                        value: s.value,
                        raw_value: s.raw_value,
                    })
                })
                .collect(),
        ),
        Series::Binned(bins) => SeriesGeometry::Binned(
            bins[visible]
                .iter()
                .filter(|b| b.is_populated())
                // a failed formula leaves NaN statistics
                .filter(|b| ![b.first, b.min, b.max, b.last].iter().any(|v| v.is_nan()))
                .map(|b| BinPoint {
                    x: mapper.time_to_x(b.time).round(),
                    time: b.time,
                    count: b.count,
                    first: bin_y(mapper, b.first),
                    min: bin_y(mapper, b.min),
                    max: bin_y(mapper, b.max),
                    last: bin_y(mapper, b.last),
                    min_value: b.min,
                    max_value: b.max,
                    raw_min: b.raw_min,
                    raw_max: b.raw_max,
                })
                .collect(),
        ),
    }
}

fn bin_y(mapper: &CoordinateMapper, v: f64) -> f64 {
    mapper.value_to_y(v).clamp(-MAX_PIXEL, MAX_PIXEL)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheKey {
    window: Window,
    range: ValueRange,
    area: PlotArea,
    log: bool,
    points: usize,
}

/// Per-series geometry, rebuilt only when its inputs change
#[derive(Debug, Clone, Default)]
pub struct GeometryCache {
    key: Option<CacheKey>,
    series: Vec<SeriesGeometry>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a rebuild on the next update
    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Bring the geometry up to date. Returns whether it was rebuilt.
    pub fn update(&mut self, store: &SeriesStore, mapper: &CoordinateMapper) -> bool {
        let key = CacheKey {
            window: mapper.window,
            range: mapper.range,
            area: mapper.area,
            log: mapper.log,
            points: store.total_points(),
        };
        if self.key == Some(key) {
            return false;
        }

        self.series = store.iter().map(|s| build_geometry(s, mapper)).collect();
        self.key = Some(key);
        true
    }

    pub fn series(&self) -> &[SeriesGeometry] {
        &self.series
    }

    /// Nearest drawn point within `radius` pixels of `(x, y)`. Only series
    /// shown under the current solo setting take part; both extremes of a
    /// bin are candidates.
    pub fn find_marker(
        &self,
        x: f64,
        y: f64,
        chart: &ChartState,
        area: &PlotArea,
        variables: &[Variable],
        radius: f64,
    ) -> Option<Marker> {
        if x <= area.x1 || x >= area.x2 {
            return None;
        }

        let mut best: Option<(f64, Marker)> = None;
        let mut consider = |d2: f64, marker: Marker| {
            if best.map_or(true, |(d, _)| d2 < d) {
                best = Some((d2, marker));
            }
        };

        for (series, geometry) in self.series.iter().enumerate() {
            if !chart.shows(series) {
                continue;
            }
            let show_raw = variables.get(series).is_some_and(|v| v.show_raw_value);
            let range = geometry.x_range(x - radius, x + radius);

            match geometry {
                SeriesGeometry::Raw(points) => {
                    for index in range {
                        let p = &points[index];
                        let d2 = (x - p.x).powi(2) + (y - p.y).powi(2);
                        let value = if show_raw { p.raw_value } else { p.value };
                        consider(d2, Marker { series, index, x: p.x, y: p.y, time: p.time, value });
                    }
                }
                SeriesGeometry::Binned(points) => {
                    for index in range {
                        let p = &points[index];
                        let dx2 = (x - p.x).powi(2);
                        let max_value = if show_raw { p.raw_max } else { p.max_value };
                        let min_value = if show_raw { p.raw_min } else { p.min_value };
                        consider(
                            dx2 + (y - p.max).powi(2),
                            Marker { series, index, x: p.x, y: p.max, time: p.time, value: max_value },
                        );
                        consider(
                            dx2 + (y - p.min).powi(2),
                            Marker { series, index, x: p.x, y: p.min, time: p.time, value: min_value },
                        );
                    }
                }
            }
        }

        best.filter(|(d2, _)| d2.sqrt() < radius).map(|(_, m)| m)
    }

    /// Series with a drawn point closest to `(x, y)`, within `radius`
    pub fn nearest_series(&self, x: f64, y: f64, area: &PlotArea, radius: f64) -> Option<usize> {
        if x <= area.x1 || x >= area.x2 {
            return None;
        }
        let inside = |px: f64| px > area.x1 && px < area.x2;

        let mut best: Option<(f64, usize)> = None;
        for (series, geometry) in self.series.iter().enumerate() {
            let candidates: Vec<(f64, f64)> = match geometry {
                SeriesGeometry::Raw(points) => points.iter().map(|p| (p.x, p.y)).collect(),
                SeriesGeometry::Binned(points) => points
                    .iter()
                    .flat_map(|p| [(p.x, p.min), (p.x, p.max)])
                    .collect(),
            };
            for (px, py) in candidates.into_iter().filter(|(px, _)| inside(*px)) {
                let d = ((x - px).powi(2) + (y - py).powi(2)).sqrt();
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, series));
                }
            }
        }
        best.filter(|(d, _)| *d < radius).map(|(_, s)| s)
    }
}

/// Significant digits for marker values: enough to resolve a fiftieth of
/// the displayed range, never fewer than six
pub fn marker_precision(y_min: f64, y_max: f64) -> usize {
    let magnitude = |v: f64| v.abs().log10().floor();
    let step = magnitude((y_max - y_min) / 50.0);
    let digits = |v: f64| if v == 0.0 { 1.0 } else { magnitude(v) - step + 1.0 };

    let mut n = digits(y_min).max(digits(y_max)).max(1.0);
    for v in [y_min, y_max] {
        if v != 0.0 && v.abs() < 100_000.0 {
            n = n.max((v.abs().log10() + 0.001).floor() + 1.0);
        }
    }
    if !n.is_finite() {
        n = 6.0;
    }
    n.max(6.0) as usize
}

/// Marker tooltip text for a value
pub fn marker_label(value: f64, precision: usize) -> String {
    format_value(value, precision)
}
