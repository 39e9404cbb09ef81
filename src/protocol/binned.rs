//! Binned (server-aggregated) history reads

use super::{push_words, WordReader, BIN_RECORD_WORDS, HS_SUCCESS};
use crate::error::{HistScopeError, Result};
use crate::types::Bin;

/// One 9-word bin record. `mean` and `rms` are carried but not displayed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BinRecord {
    pub count: f64,
    pub mean: f64,
    pub rms: f64,
    pub min: f64,
    pub max: f64,
    pub first_time: f64,
    pub first_value: f64,
    pub last_time: f64,
    pub last_value: f64,
}

impl BinRecord {
    /// Bin at the midpoint of its first and last entry, or `None` for an
    /// empty record
    pub fn to_bin(&self) -> Option<Bin> {
        if self.count.is_nan() || self.count < 1.0 {
            return None;
        }
        let time = ((self.first_time + self.last_time) / 2.0).floor();
        Some(Bin::new(
            time,
            self.count as u64,
            self.first_value,
            self.last_value,
            self.min,
            self.max,
        ))
    }

    fn words(&self) -> [f64; BIN_RECORD_WORDS] {
        [
            self.count,
            self.mean,
            self.rms,
            self.min,
            self.max,
            self.first_time,
            self.first_value,
            self.last_time,
            self.last_value,
        ]
    }
}

/// One variable of a binned read
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedVariable {
    pub hs_status: i32,
    pub num_entries: usize,
    /// Last entry before the range (0 when none)
    pub last_time: f64,
    pub last_value: f64,
    /// Exactly `num_bins` records
    pub records: Vec<BinRecord>,
}

impl BinnedVariable {
    /// Populated bins in time order
    pub fn bins(&self) -> Vec<Bin> {
        self.records.iter().filter_map(BinRecord::to_bin).collect()
    }
}

/// Decoded binned read
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedPayload {
    pub status: i32,
    pub start: f64,
    pub end: f64,
    pub num_bins: usize,
    pub variables: Vec<BinnedVariable>,
}

impl BinnedPayload {
    /// Average entries per populated bin over all variables, 0 when empty
    pub fn average_bin_size(&self) -> f64 {
        let (sum, n) = self
            .variables
            .iter()
            .flat_map(|v| v.records.iter())
            .filter(|r| r.count >= 1.0)
            .fold((0.0, 0usize), |(sum, n), r| (sum + r.count, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}

/// Decode a binned read for `expected_vars` variables
pub fn decode_binned(bytes: &[u8], expected_vars: usize) -> Result<BinnedPayload> {
    let mut r = WordReader::new(bytes)?;

    let status = r.next("status")? as i32;
    let start = r.next("range start")?;
    let end = r.next("range end")?;
    let num_bins = r.count("bin count")?;
    let num_var = r.count("variable count")?;
    if num_var != expected_vars {
        return Err(HistScopeError::Protocol(format!(
            "binned read returned {} variables, {} requested",
            num_var, expected_vars
        )));
    }

    r.require(4 * num_var, "binned header")?;
    let mut hs_status = Vec::with_capacity(num_var);
    for _ in 0..num_var {
        hs_status.push(r.next("hs_status")? as i32);
    }
    let mut num_entries = Vec::with_capacity(num_var);
    for _ in 0..num_var {
        num_entries.push(r.count("entry count")?);
    }
    let mut last_time = Vec::with_capacity(num_var);
    for _ in 0..num_var {
        last_time.push(r.next("last time")?);
    }
    let mut last_value = Vec::with_capacity(num_var);
    for _ in 0..num_var {
        last_value.push(r.next("last value")?);
    }

    r.require(BIN_RECORD_WORDS * num_bins * num_var, "bin records")?;

    let mut variables = Vec::with_capacity(num_var);
    for i in 0..num_var {
        let mut records = Vec::with_capacity(num_bins);
        for _ in 0..num_bins {
            records.push(BinRecord {
                count: r.next("count")?,
                mean: r.next("mean")?,
                rms: r.next("rms")?,
                min: r.next("min")?,
                max: r.next("max")?,
                first_time: r.next("first time")?,
                first_value: r.next("first value")?,
                last_time: r.next("last time")?,
                last_value: r.next("last value")?,
            });
        }
        variables.push(BinnedVariable {
            hs_status: hs_status[i],
            num_entries: num_entries[i],
            last_time: last_time[i],
            last_value: last_value[i],
            records,
        });
    }

    r.finish("binned");
    Ok(BinnedPayload {
        status,
        start,
        end,
        num_bins,
        variables,
    })
}

/// Encode a binned read. Every variable must carry `num_bins` records.
pub fn encode_binned(
    start: f64,
    end: f64,
    num_bins: usize,
    variables: &[BinnedVariable],
) -> Vec<u8> {
    let n = variables.len();
    let mut out = Vec::with_capacity(8 * (5 + 4 * n + BIN_RECORD_WORDS * n * num_bins));

    push_words(&mut out, [HS_SUCCESS as f64, start, end, num_bins as f64, n as f64]);
    push_words(&mut out, variables.iter().map(|v| v.hs_status as f64));
    push_words(&mut out, variables.iter().map(|v| v.num_entries as f64));
    push_words(&mut out, variables.iter().map(|v| v.last_time));
    push_words(&mut out, variables.iter().map(|v| v.last_value));
    for var in variables {
        for i in 0..num_bins {
            let record = var.records.get(i).copied().unwrap_or_default();
            push_words(&mut out, record.words());
        }
    }
    out
}
