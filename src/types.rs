//! Core data types for histscope
//!
//! This module contains the fundamental data structures shared by the
//! store, the planners and the chart controller.
//!
//! # Main Types
//!
//! - [`VariableKey`] - History identity of a plotted quantity (event, tag, index)
//! - [`Variable`] - A plotted quantity with its display options
//! - [`Sample`] - One raw history point with displayed and raw value
//! - [`Bin`] - One server-side aggregation bucket
//! - [`Series`] - Per-variable ordered samples or bins
//! - [`Window`] - The displayed time range
//! - [`ValueRange`] - Tight and padded value bounds
//!
//! # Representation
//!
//! A series is either raw or binned, never both. The mode is chosen once
//! per fetch cycle from the requested span, and a mode change always goes
//! through a full reset of the store.

use crate::error::{HistScopeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Colours used for variables without an explicit colour, in order
pub const DEFAULT_PALETTE: [&str; 16] = [
    "#00AAFF", "#FF9000", "#FF00A0", "#00C030", "#A0C0D0", "#D0A060", "#C04010", "#807060",
    "#F0C000", "#2090A0", "#D040D0", "#90B000", "#B0B040", "#B0B0FF", "#FFA0A0", "#A0FFA0",
];

/// History identity of one plotted quantity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableKey {
    /// Event (equipment) name
    pub event: String,
    /// Tag name without the index suffix
    pub tag: String,
    /// Array element
    pub index: u32,
}

impl VariableKey {
    pub fn new(event: impl Into<String>, tag: impl Into<String>, index: u32) -> Self {
        Self {
            event: event.into(),
            tag: tag.into(),
            index,
        }
    }

    /// Parse `Event:Tag` or `Event:Tag[3]`.
    ///
    /// Names using the per-variable `Event/Name:Tag` form may carry colons in
    /// the tag. With an odd number of colons the name is split at the middle
    /// colon when both halves repeat (`A/GS2:FC1:GS2:FC1`), otherwise at the
    /// first colon.
    pub fn parse(name: &str) -> Result<Self> {
        let colons: Vec<usize> = name.match_indices(':').map(|(i, _)| i).collect();
        let first = *colons.first().ok_or_else(|| {
            HistScopeError::Variable(format!("'{}' has no event/tag separator", name))
        })?;

        let mut split_pos = first;
        if let Some(slash) = name.find('/') {
            if colons.len() % 2 == 1 {
                let middle = colons[colons.len() / 2];
                if slash < middle && name[slash + 1..middle] == name[middle + 1..] {
                    split_pos = middle;
                }
            }
        }

        let event = &name[..split_pos];
        let tag_part = &name[split_pos + 1..];
        if event.is_empty() || tag_part.is_empty() {
            return Err(HistScopeError::Variable(format!(
                "'{}' has an empty event or tag",
                name
            )));
        }

        let (tag, index) = match tag_part.find('[') {
            Some(open) => {
                let digits: String = tag_part[open + 1..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                let index = digits.parse::<u32>().map_err(|_| {
                    HistScopeError::Variable(format!("'{}' has an invalid array index", name))
                })?;
                (&tag_part[..open], index)
            }
            None => (tag_part, 0),
        };

        Ok(Self::new(event, tag, index))
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event, self.tag)?;
        if self.index > 0 {
            write!(f, "[{}]", self.index)?;
        }
        Ok(())
    }
}

/// A plotted quantity. Immutable for the lifetime of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: VariableKey,
    /// Legend label, defaults to the tag name
    pub label: String,
    /// CSS-style colour string
    pub colour: String,
    /// Expression over `x` mapping the raw value to the displayed value
    pub formula: Option<String>,
    /// Report the raw value instead of the formula result in the marker
    pub show_raw_value: bool,
}

impl Variable {
    /// Create a variable with the palette colour for position `slot`
    pub fn new(key: VariableKey, slot: usize) -> Self {
        Self {
            label: key.tag.clone(),
            colour: DEFAULT_PALETTE[slot % DEFAULT_PALETTE.len()].to_string(),
            key,
            formula: None,
            show_raw_value: false,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        let formula = formula.into();
        self.formula = if formula.trim().is_empty() {
            None
        } else {
            Some(formula)
        };
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_colour(mut self, colour: impl Into<String>) -> Self {
        self.colour = colour.into();
        self
    }

    pub fn with_show_raw_value(mut self, show_raw_value: bool) -> Self {
        self.show_raw_value = show_raw_value;
        self
    }
}

/// One raw history point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    /// Displayed value (formula applied)
    pub value: f64,
    pub raw_value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self {
            time,
            value,
            raw_value: value,
        }
    }
}

/// One aggregation bucket. Statistics are meaningless when `count == 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    /// Bin midpoint
    pub time: f64,
    pub count: u64,
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub raw_first: f64,
    pub raw_last: f64,
    pub raw_min: f64,
    pub raw_max: f64,
}

impl Bin {
    /// Bin with identical raw and displayed statistics
    pub fn new(time: f64, count: u64, first: f64, last: f64, min: f64, max: f64) -> Self {
        Self {
            time,
            count,
            first,
            last,
            min,
            max,
            raw_first: first,
            raw_last: last,
            raw_min: min,
            raw_max: max,
        }
    }

    /// Whether this bin carries usable statistics
    pub fn is_populated(&self) -> bool {
        self.count > 0
    }
}

/// Representation of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesMode {
    #[default]
    Raw,
    Binned,
}

impl SeriesMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesMode::Raw => "raw",
            SeriesMode::Binned => "binned",
        }
    }
}

impl fmt::Display for SeriesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-variable, time-ordered data
#[derive(Debug, Clone, PartialEq)]
pub enum Series {
    Raw(Vec<Sample>),
    Binned(Vec<Bin>),
}

impl Series {
    pub fn empty(mode: SeriesMode) -> Self {
        match mode {
            SeriesMode::Raw => Series::Raw(Vec::new()),
            SeriesMode::Binned => Series::Binned(Vec::new()),
        }
    }

    pub fn mode(&self) -> SeriesMode {
        match self {
            Series::Raw(_) => SeriesMode::Raw,
            Series::Binned(_) => SeriesMode::Binned,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Series::Raw(s) => s.len(),
            Series::Binned(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of element `i`
    pub fn time_at(&self, i: usize) -> Option<f64> {
        match self {
            Series::Raw(s) => s.get(i).map(|p| p.time),
            Series::Binned(b) => b.get(i).map(|p| p.time),
        }
    }

    pub fn first_time(&self) -> Option<f64> {
        self.time_at(0)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.len().checked_sub(1).and_then(|i| self.time_at(i))
    }

    /// Index of the first element with `time >= t`
    pub fn lower_bound(&self, t: f64) -> usize {
        match self {
            Series::Raw(s) => s.partition_point(|p| p.time < t),
            Series::Binned(b) => b.partition_point(|p| p.time < t),
        }
    }

    /// Index of the first element with `time > t`
    pub fn upper_bound(&self, t: f64) -> usize {
        match self {
            Series::Raw(s) => s.partition_point(|p| p.time <= t),
            Series::Binned(b) => b.partition_point(|p| p.time <= t),
        }
    }
}

/// Displayed time range in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub t_min: f64,
    pub t_max: f64,
}

impl Window {
    pub fn new(t_min: f64, t_max: f64) -> Self {
        Self { t_min, t_max }
    }

    pub fn span(&self) -> f64 {
        self.t_max - self.t_min
    }

    pub fn center(&self) -> f64 {
        (self.t_min + self.t_max) / 2.0
    }

    /// Same span shifted by `dt` seconds
    pub fn shifted(&self, dt: f64) -> Self {
        Self::new(self.t_min + dt, self.t_max + dt)
    }
}

/// Value bounds: `y_min0/y_max0` tight data bounds, `y_min/y_max` displayed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub y_min: f64,
    pub y_max: f64,
    pub y_min0: f64,
    pub y_max0: f64,
}

impl ValueRange {
    pub fn new(y_min: f64, y_max: f64) -> Self {
        Self {
            y_min,
            y_max,
            y_min0: y_min,
            y_max0: y_max,
        }
    }

    pub fn span(&self) -> f64 {
        self.y_max - self.y_min
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::new(-0.5, 0.5)
    }
}
