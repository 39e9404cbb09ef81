//! History service access
//!
//! [`HistorySource`] is the seam between the chart engine and whatever
//! serves history data. Reads return the binary wire formats described in
//! [`crate::protocol`] so the decoding path is the same for every source.
//!
//! [`MemoryHistory`] keeps samples in memory and is what the demo binary
//! and the integration tests read from.

mod memory;

pub use memory::MemoryHistory;

use crate::error::Result;
use crate::types::VariableKey;
use async_trait::async_trait;

/// Remote history store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Every sample of each variable with `start <= t <= end`, raw wire format
    async fn read_raw(&self, variables: &[VariableKey], start: f64, end: f64) -> Result<Vec<u8>>;

    /// `num_bins` equal-width bins over `[start, end]`, binned wire format
    async fn read_binned(
        &self,
        variables: &[VariableKey],
        start: f64,
        end: f64,
        num_bins: u32,
    ) -> Result<Vec<u8>>;

    /// Time of the newest sample at or before `before`, per variable.
    /// Zero when a variable has none.
    async fn last_written(&self, variables: &[VariableKey], before: f64) -> Result<Vec<f64>>;
}
