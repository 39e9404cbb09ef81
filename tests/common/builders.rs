//! Test data builders for creating test objects

use histscope::protocol::{encode_binned, encode_raw, BinRecord, BinnedVariable};
use histscope::AppConfig;

/// Builder for chart configurations
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.panel.timescale = "1h".into();
        Self { config }
    }

    pub fn variable(mut self, name: &str) -> Self {
        self.config.panel.variables.push(name.to_string());
        self
    }

    pub fn formula(mut self, formula: &str) -> Self {
        self.config.panel.formula.push(formula.to_string());
        self
    }

    pub fn timescale(mut self, timescale: &str) -> Self {
        self.config.panel.timescale = timescale.to_string();
        self
    }

    pub fn log_axis(mut self, log_axis: bool) -> Self {
        self.config.panel.log_axis = log_axis;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw reply payload, one slice of `(time, value)` per variable
pub fn raw_payload(variables: &[&[(f64, f64)]]) -> Vec<u8> {
    let vars: Vec<Vec<(f64, f64)>> = variables.iter().map(|v| v.to_vec()).collect();
    encode_raw(&vars)
}

/// Binned reply payload with `num_bins` equal bins over `[start, end]`.
/// `fill` gives `(count, min, max)` for bin `i`, or `None` for an empty bin.
pub fn binned_payload(
    start: f64,
    end: f64,
    num_bins: usize,
    variables: usize,
    fill: impl Fn(usize) -> Option<(f64, f64, f64)>,
) -> Vec<u8> {
    let width = (end - start) / num_bins as f64;
    let records: Vec<BinRecord> = (0..num_bins)
        .map(|i| match fill(i) {
            Some((count, min, max)) => BinRecord {
                count,
                mean: (min + max) / 2.0,
                rms: max,
                min,
                max,
                first_time: start + i as f64 * width,
                first_value: min,
                last_time: start + (i + 1) as f64 * width - 1.0,
                last_value: max,
            },
            None => BinRecord::default(),
        })
        .collect();
    let vars: Vec<BinnedVariable> = (0..variables)
        .map(|_| BinnedVariable {
            hs_status: 1,
            num_entries: records.iter().map(|r| r.count as usize).sum(),
            last_time: 0.0,
            last_value: 0.0,
            records: records.clone(),
        })
        .collect();
    encode_binned(start, end, num_bins, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .variable("A:x")
            .formula("x*2")
            .timescale("10m")
            .build();

        assert_eq!(config.panel.variables, vec!["A:x".to_string()]);
        assert_eq!(config.panel.formula, vec!["x*2".to_string()]);
        assert_eq!(config.panel.timescale, "10m");
    }
}
