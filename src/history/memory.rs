use super::HistorySource;
use crate::error::{HistScopeError, Result};
use crate::protocol::{encode_binned, encode_raw, BinRecord, BinnedVariable, HS_SUCCESS};
use crate::types::VariableKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory history store.
///
/// Samples are kept sorted per variable. Reads fail with a transport error
/// while the store is switched offline.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    data: RwLock<HashMap<VariableKey, Vec<(f64, f64)>>>,
    offline: AtomicBool,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<VariableKey, Vec<(f64, f64)>>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<VariableKey, Vec<(f64, f64)>>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one sample. Out-of-order samples are placed by time.
    pub fn push(&self, key: &VariableKey, time: f64, value: f64) {
        let mut data = self.write_lock();
        let series = data.entry(key.clone()).or_default();
        match series.last() {
            Some(&(last, _)) if time < last => {
                let pos = series.partition_point(|&(t, _)| t <= time);
                series.insert(pos, (time, value));
            }
            _ => series.push((time, value)),
        }
    }

    /// Record many samples
    pub fn extend(&self, key: &VariableKey, samples: impl IntoIterator<Item = (f64, f64)>) {
        for (time, value) in samples {
            self.push(key, time, value);
        }
    }

    pub fn len(&self, key: &VariableKey) -> usize {
        self.read_lock().get(key).map_or(0, Vec::len)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(HistScopeError::Transport("history service unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn range<'a>(series: &'a [(f64, f64)], start: f64, end: f64) -> &'a [(f64, f64)] {
        let lo = series.partition_point(|&(t, _)| t < start);
        let hi = series.partition_point(|&(t, _)| t <= end).max(lo);
        &series[lo..hi]
    }

    fn bin_variable(series: &[(f64, f64)], start: f64, end: f64, num_bins: usize) -> BinnedVariable {
        let mut records = vec![BinRecord::default(); num_bins];
        let mut sums = vec![(0.0, 0.0); num_bins];
        let width = (end - start) / num_bins as f64;
        let in_range = Self::range(series, start, end);

        for &(t, v) in in_range {
            let index = if width > 0.0 {
                (((t - start) / width).floor() as usize).min(num_bins - 1)
            } else {
                0
            };
            let r = &mut records[index];
            if r.count == 0.0 {
                r.min = v;
                r.max = v;
                r.first_time = t;
                r.first_value = v;
            }
            r.count += 1.0;
            r.min = r.min.min(v);
            r.max = r.max.max(v);
            r.last_time = t;
            r.last_value = v;
            sums[index].0 += v;
            sums[index].1 += v * v;
        }

        for (r, (sum, sum_sq)) in records.iter_mut().zip(sums) {
            if r.count > 0.0 {
                r.mean = sum / r.count;
                r.rms = (sum_sq / r.count - r.mean * r.mean).max(0.0).sqrt();
            }
        }

        let before = series.partition_point(|&(t, _)| t < start);
        let (last_time, last_value) = before
            .checked_sub(1)
            .map(|i| series[i])
            .unwrap_or((0.0, 0.0));

        BinnedVariable {
            hs_status: HS_SUCCESS,
            num_entries: in_range.len(),
            last_time,
            last_value,
            records,
        }
    }
}

#[async_trait]
impl HistorySource for MemoryHistory {
    async fn read_raw(&self, variables: &[VariableKey], start: f64, end: f64) -> Result<Vec<u8>> {
        self.check_online()?;
        let data = self.read_lock();
        let per_var: Vec<Vec<(f64, f64)>> = variables
            .iter()
            .map(|key| {
                data.get(key)
                    .map(|s| Self::range(s, start, end).to_vec())
                    .unwrap_or_default()
            })
            .collect();
        Ok(encode_raw(&per_var))
    }

    async fn read_binned(
        &self,
        variables: &[VariableKey],
        start: f64,
        end: f64,
        num_bins: u32,
    ) -> Result<Vec<u8>> {
        self.check_online()?;
        if num_bins == 0 {
            return Err(HistScopeError::Transport("binned read needs at least one bin".into()));
        }
        let num_bins = num_bins as usize;
        let data = self.read_lock();
        let per_var: Vec<BinnedVariable> = variables
            .iter()
            .map(|key| {
                let series = data.get(key).map(Vec::as_slice).unwrap_or(&[]);
                Self::bin_variable(series, start, end, num_bins)
            })
            .collect();
        Ok(encode_binned(start, end, num_bins, &per_var))
    }

    async fn last_written(&self, variables: &[VariableKey], before: f64) -> Result<Vec<f64>> {
        self.check_online()?;
        let data = self.read_lock();
        Ok(variables
            .iter()
            .map(|key| {
                data.get(key)
                    .and_then(|s| {
                        let end = s.partition_point(|&(t, _)| t <= before);
                        end.checked_sub(1).map(|i| s[i].0)
                    })
                    .unwrap_or(0.0)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_binned, decode_raw};

    fn key(tag: &str) -> VariableKey {
        VariableKey::new("Scaler", tag, 0)
    }

    #[tokio::test]
    async fn test_raw_read_is_inclusive() {
        let history = MemoryHistory::new();
        history.extend(&key("a"), [(100.0, 1.0), (200.0, 2.0), (300.0, 3.0)]);

        let bytes = history.read_raw(&[key("a"), key("missing")], 200.0, 300.0).await.unwrap();
        let payload = decode_raw(&bytes, 2).unwrap();
        assert_eq!(payload.variables[0].points, vec![(200.0, 2.0), (300.0, 3.0)]);
        assert!(payload.variables[1].points.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_push_is_sorted() {
        let history = MemoryHistory::new();
        history.extend(&key("a"), [(300.0, 3.0), (100.0, 1.0), (200.0, 2.0)]);
        let bytes = history.read_raw(&[key("a")], 0.0, 1000.0).await.unwrap();
        let times: Vec<f64> = decode_raw(&bytes, 1).unwrap().variables[0]
            .points
            .iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(times, vec![100.0, 200.0, 300.0]);
        assert_eq!(history.len(&key("a")), 3);
    }

    #[tokio::test]
    async fn test_binned_read_statistics() {
        let history = MemoryHistory::new();
        history.extend(&key("a"), [(5.0, 9.0), (10.0, 1.0), (12.0, 3.0), (30.0, 7.0)]);

        let bytes = history.read_binned(&[key("a")], 10.0, 40.0, 3).await.unwrap();
        let payload = decode_binned(&bytes, 1).unwrap();
        let var = &payload.variables[0];
        assert_eq!(var.num_entries, 3);
        assert_eq!((var.last_time, var.last_value), (5.0, 9.0));
        assert_eq!(var.records.len(), 3);

        let first = var.records[0];
        assert_eq!(first.count, 2.0);
        assert_eq!((first.min, first.max), (1.0, 3.0));
        assert_eq!(first.mean, 2.0);
        assert_eq!(first.rms, 1.0);
        assert_eq!((first.first_time, first.last_time), (10.0, 12.0));
        assert_eq!(var.records[1].count, 0.0);
        assert_eq!(var.records[2].count, 1.0);
        assert_eq!(var.bins().len(), 2);
    }

    #[tokio::test]
    async fn test_last_written() {
        let history = MemoryHistory::new();
        history.extend(&key("a"), [(100.0, 1.0), (200.0, 2.0)]);
        let times = history.last_written(&[key("a"), key("b")], 150.0).await.unwrap();
        assert_eq!(times, vec![100.0, 0.0]);
    }

    #[tokio::test]
    async fn test_offline_reads_fail_with_transport_error() {
        let history = MemoryHistory::new();
        history.set_offline(true);
        let err = history.read_raw(&[key("a")], 0.0, 1.0).await.unwrap_err();
        assert!(err.is_transport());

        history.set_offline(false);
        assert!(history.read_raw(&[key("a")], 0.0, 1.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_binned_read_without_bins_is_rejected() {
        let history = MemoryHistory::new();
        history.extend(&key("a"), [(100.0, 1.0), (200.0, 2.0)]);

        let err = history.read_binned(&[key("a")], 0.0, 300.0, 0).await.unwrap_err();
        assert!(err.is_transport());
    }
}
