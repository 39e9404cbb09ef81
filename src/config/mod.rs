//! Configuration module for histscope
//!
//! This module handles chart configuration including:
//! - Panel parameters (variables, formulas, scale options, timescale)
//! - Engine tunables and display settings (see [`settings`])
//! - Initial window bounds from URL query parameters
//!
//! # Files
//!
//! Configuration is read from TOML or JSON, chosen by file extension.
//! The default location is the platform config directory:
//! - **Linux**: `~/.config/dev.hxyulin.histscope/histscope.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.histscope/histscope.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.histscope\histscope.toml`
//!
//! # Example
//!
//! ```toml
//! [panel]
//! timescale = "1h"
//! minimum = 0.0
//! maximum = 0.0
//! log_axis = false
//! variables = ["Scaler:Rate[0]", "Scaler:Rate[1]"]
//! formula = ["x * 1000", ""]
//! label = ["Upstream", "Downstream"]
//!
//! [engine]
//! bin_budget = 5000
//!
//! [display]
//! timezone = "utc"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{HistScopeError, Result, ResultExt};
use crate::types::{Variable, VariableKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.histscope";

/// Default config filename
pub const CONFIG_FILE: &str = "histscope.toml";

/// Timescale used when a panel does not configure one
pub const DEFAULT_TIMESCALE: &str = "1h";

/// Quick-select buttons offered when a panel does not configure any
pub const DEFAULT_BUTTONS: [&str; 6] = ["10m", "1h", "3h", "12h", "24h", "7d"];

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Timescale ====================

/// Convert a timescale string to seconds.
///
/// Accepts a number with an optional unit suffix: `s`, `m`, `h`, `d`,
/// `w` or `y` (case-insensitive). A bare number is seconds.
pub fn parse_timescale(text: &str) -> Result<f64> {
    let text = text.trim();
    let (number, factor) = match text.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let factor = match c.to_ascii_lowercase() {
                's' => 1.0,
                'm' => 60.0,
                'h' => 3600.0,
                'd' => DAY,
                'w' => 7.0 * DAY,
                'y' => 365.0 * DAY,
                _ => {
                    return Err(HistScopeError::Config(format!(
                        "unknown timescale unit in '{}'",
                        text
                    )))
                }
            };
            (&text[..text.len() - 1], factor)
        }
        _ => (text, 1.0),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| HistScopeError::Config(format!("invalid timescale '{}'", text)))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(HistScopeError::Config(format!(
            "timescale '{}' must be positive",
            text
        )));
    }
    Ok(value * factor)
}

// ==================== Panel Config ====================

/// Parameters of one history panel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Initial span, e.g. "10m", "1h", "3d"
    pub timescale: String,

    /// Lower value bound; equal to `maximum` or infinite means autoscale
    pub minimum: f64,

    /// Upper value bound; equal to `minimum` or infinite means autoscale
    pub maximum: f64,

    /// Pin the lower bound to zero
    pub zero_ylow: bool,

    pub log_axis: bool,

    /// Parsed but not fetched
    pub show_run_markers: bool,

    /// Show the latest value next to each legend entry
    pub show_values: bool,

    pub show_fill: bool,

    /// Variable names in `Event:Tag[index]` form
    pub variables: Vec<String>,

    /// Per-variable formulas over `x`; empty string means identity
    pub formula: Vec<String>,

    /// Per-variable colours; missing entries use the palette
    pub colour: Vec<String>,

    /// Per-variable legend labels; missing entries use the tag name
    pub label: Vec<String>,

    pub show_raw_value: Vec<bool>,

    /// Timescale quick buttons
    pub buttons: Vec<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            timescale: DEFAULT_TIMESCALE.to_string(),
            minimum: 0.0,
            maximum: 0.0,
            zero_ylow: false,
            log_axis: false,
            show_run_markers: false,
            show_values: false,
            show_fill: true,
            variables: Vec::new(),
            formula: Vec::new(),
            colour: Vec::new(),
            label: Vec::new(),
            show_raw_value: Vec::new(),
            buttons: DEFAULT_BUTTONS.iter().map(|b| b.to_string()).collect(),
        }
    }
}

impl PanelConfig {
    /// Timescale in seconds
    pub fn timescale_secs(&self) -> Result<f64> {
        parse_timescale(&self.timescale).context("panel timescale")
    }

    /// Whether the lower bound follows the data
    pub fn autoscale_min(&self) -> bool {
        if self.zero_ylow {
            return false;
        }
        self.minimum == self.maximum || self.minimum.is_infinite()
    }

    /// Whether the upper bound follows the data
    pub fn autoscale_max(&self) -> bool {
        self.minimum == self.maximum || self.maximum.is_infinite()
    }

    /// Configured lower bound, zero when pinned
    pub fn fixed_min(&self) -> f64 {
        if self.zero_ylow {
            0.0
        } else {
            self.minimum
        }
    }

    /// Resolve the variable list with per-variable options
    pub fn build_variables(&self) -> Result<Vec<Variable>> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let key = VariableKey::parse(name)?;
                let mut var = Variable::new(key, i);
                if let Some(formula) = self.formula.get(i) {
                    var = var.with_formula(formula.clone());
                }
                if let Some(colour) = self.colour.get(i).filter(|c| !c.is_empty()) {
                    var = var.with_colour(colour.clone());
                }
                if let Some(label) = self.label.get(i).filter(|l| !l.is_empty()) {
                    var = var.with_label(label.clone());
                }
                if let Some(&raw) = self.show_raw_value.get(i) {
                    var = var.with_show_raw_value(raw);
                }
                Ok(var)
            })
            .collect()
    }
}

// ==================== App Config ====================

/// Complete configuration of one chart instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub panel: PanelConfig,
    pub engine: EngineSettings,
    pub display: DisplaySettings,
}

impl AppConfig {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(HistScopeError::from)
            .with_context(|| format!("reading {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config: AppConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or the default location, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(p) if p.exists() => p,
            _ => return Self::default(),
        };

        match Self::load(&path) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load config from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| HistScopeError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.panel.timescale_secs()?;
        if self.engine.bin_budget == 0 {
            return Err(HistScopeError::Config("bin_budget must be positive".into()));
        }
        if self.engine.live_tail_min_secs <= 0.0
            || self.engine.live_tail_max_secs < self.engine.live_tail_min_secs
        {
            return Err(HistScopeError::Config(
                "live-tail bounds must satisfy 0 < min <= max".into(),
            ));
        }
        Ok(())
    }
}

// ==================== URL Window ====================

/// Window bounds carried in `A=<t1>&B=<t2>` query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialWindow {
    pub t_min: i64,
    pub t_max: i64,
}

impl InitialWindow {
    /// Parse a query string (leading `?` allowed). Both `A` and `B` must be
    /// present and `A < B`.
    pub fn from_query(query: &str) -> Option<Self> {
        let mut a = None;
        let mut b = None;
        for pair in query.trim_start_matches('?').split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "A" => a = value.parse::<i64>().ok(),
                "B" => b = value.parse::<i64>().ok(),
                _ => {}
            }
        }

        match (a, b) {
            (Some(t_min), Some(t_max)) if t_min < t_max => Some(Self { t_min, t_max }),
            _ => None,
        }
    }

    pub fn to_query(&self) -> String {
        format!("A={}&B={}", self.t_min, self.t_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timescale_units() {
        assert_eq!(parse_timescale("90").unwrap(), 90.0);
        assert_eq!(parse_timescale("10m").unwrap(), 600.0);
        assert_eq!(parse_timescale("1h").unwrap(), 3600.0);
        assert_eq!(parse_timescale("3D").unwrap(), 3.0 * DAY);
        assert_eq!(parse_timescale("1.5h").unwrap(), 5400.0);
    }

    #[test]
    fn test_parse_timescale_rejects() {
        assert!(parse_timescale("").is_err());
        assert!(parse_timescale("abc").is_err());
        assert!(parse_timescale("10q").is_err());
        assert!(parse_timescale("-5m").is_err());
    }

    #[test]
    fn test_autoscale_flags() {
        let mut panel = PanelConfig::default();
        assert!(panel.autoscale_min());
        assert!(panel.autoscale_max());

        panel.minimum = 1.0;
        panel.maximum = 10.0;
        assert!(!panel.autoscale_min());
        assert!(!panel.autoscale_max());

        panel.maximum = f64::INFINITY;
        assert!(!panel.autoscale_min());
        assert!(panel.autoscale_max());

        panel.zero_ylow = true;
        panel.minimum = panel.maximum;
        assert!(!panel.autoscale_min());
        assert_eq!(panel.fixed_min(), 0.0);
    }

    #[test]
    fn test_build_variables() {
        let panel = PanelConfig {
            variables: vec!["A:x".into(), "B:y[2]".into()],
            formula: vec!["x*2".into()],
            label: vec!["".into(), "Why".into()],
            ..Default::default()
        };
        let vars = panel.build_variables().unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].formula.as_deref(), Some("x*2"));
        assert_eq!(vars[0].label, "x");
        assert_eq!(vars[1].label, "Why");
        assert_eq!(vars[1].key.index, 2);
        assert!(vars[1].formula.is_none());
    }

    #[test]
    fn test_query_window() {
        let w = InitialWindow::from_query("?A=1000&B=2000&x=1").unwrap();
        assert_eq!(w.t_min, 1000);
        assert_eq!(w.t_max, 2000);
        assert_eq!(w.to_query(), "A=1000&B=2000");

        assert!(InitialWindow::from_query("A=1000").is_none());
        assert!(InitialWindow::from_query("A=2000&B=1000").is_none());
        assert!(InitialWindow::from_query("A=x&B=1000").is_none());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.toml");

        let mut config = AppConfig::default();
        config.panel.variables = vec!["Scaler:Rate".into()];
        config.panel.timescale = "3h".into();
        config.display.timezone = DisplayTimezone::Utc;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.panel.variables, vec!["Scaler:Rate".to_string()]);
        assert_eq!(loaded.panel.timescale_secs().unwrap(), 3.0 * 3600.0);
        assert_eq!(loaded.display.timezone, DisplayTimezone::Utc);
    }

    #[test]
    fn test_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.json");
        std::fs::write(&path, r#"{"panel": {"timescale": "10m", "log_axis": true}}"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(loaded.panel.log_axis);
        assert_eq!(loaded.engine.bin_budget, 5000);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[panel]\ntimescale = \"soon\"\n").unwrap();

        assert!(AppConfig::load(&path).is_err());
        let config = AppConfig::load_or_default(Some(path.as_path()));
        assert_eq!(config.panel.timescale, DEFAULT_TIMESCALE);
    }
}
