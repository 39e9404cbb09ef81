//! Series store
//!
//! Holds one [`Series`] per chart variable and merges fetched chunks into
//! them. Chunks normally land on either side of what is already stored;
//! out-of-order completions fill gaps, and anything that overlaps is merged
//! by timestamp so that re-delivered data never stacks.

use crate::error::{HistScopeError, Result};
use crate::types::{Bin, Sample, Series, SeriesMode};

/// Where a merged chunk ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing to merge
    Empty,
    Appended(usize),
    Prepended(usize),
    /// Filled a gap between two stored points
    Inserted(usize),
    /// Overlapped stored data; `dropped` points repeated stored timestamps
    Overlapped { added: usize, dropped: usize },
}

impl MergeOutcome {
    /// Points added to the series
    pub fn added(&self) -> usize {
        match *self {
            MergeOutcome::Empty => 0,
            MergeOutcome::Appended(n) | MergeOutcome::Prepended(n) | MergeOutcome::Inserted(n) => n,
            MergeOutcome::Overlapped { added, .. } => added,
        }
    }
}

trait Timed: Copy {
    fn time(&self) -> f64;
}

impl Timed for Sample {
    fn time(&self) -> f64 {
        self.time
    }
}

impl Timed for Bin {
    fn time(&self) -> f64 {
        self.time
    }
}

/// Per-variable series for one chart
#[derive(Debug, Clone)]
pub struct SeriesStore {
    series: Vec<Series>,
    mode: SeriesMode,
    /// Average bin population of the last binned read, 1 for raw data
    bin_size: f64,
}

impl SeriesStore {
    pub fn new(variables: usize, mode: SeriesMode) -> Self {
        Self {
            series: (0..variables).map(|_| Series::empty(mode)).collect(),
            mode,
            bin_size: 1.0,
        }
    }

    pub fn mode(&self) -> SeriesMode {
        self.mode
    }

    pub fn variable_count(&self) -> usize {
        self.series.len()
    }

    pub fn series(&self, index: usize) -> Option<&Series> {
        self.series.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.iter()
    }

    pub fn total_points(&self) -> usize {
        self.series.iter().map(Series::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(Series::is_empty)
    }

    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    pub fn set_bin_size(&mut self, bin_size: f64) {
        self.bin_size = bin_size;
    }

    /// Discard all data and start over in `mode`
    pub fn reset(&mut self, mode: SeriesMode) {
        if mode != self.mode {
            tracing::info!("Switching history data from {} to {}", self.mode, mode);
        } else {
            tracing::debug!("Discarding {} stored points", self.total_points());
        }
        self.mode = mode;
        self.bin_size = 1.0;
        for series in &mut self.series {
            *series = Series::empty(mode);
        }
    }

    /// Merge a fetched chunk into variable `index`.
    ///
    /// Fails only when the chunk's representation differs from the store's
    /// or the index is out of range. Data-quality problems are logged and
    /// merged anyway.
    pub fn merge(&mut self, index: usize, chunk: Series) -> Result<MergeOutcome> {
        if chunk.mode() != self.mode {
            return Err(HistScopeError::ModeMismatch {
                expected: self.mode.as_str(),
                actual: chunk.mode().as_str(),
            });
        }
        let series = self.series.get_mut(index).ok_or_else(|| {
            HistScopeError::Variable(format!("no variable at index {}", index))
        })?;

        let outcome = match (series, chunk) {
            (Series::Raw(existing), Series::Raw(chunk)) => merge_points(existing, chunk, index),
            (Series::Binned(existing), Series::Binned(chunk)) => {
                merge_points(existing, chunk, index)
            }
            // mode checked above
            _ => MergeOutcome::Empty,
        };

        tracing::debug!(index, ?outcome, "Merged chunk");
        Ok(outcome)
    }

    /// Tight value bounds of `indices` within `[t_min, t_max]`.
    ///
    /// NaN values and empty bins are skipped. `None` when nothing valid is
    /// in range.
    pub fn min_max(
        &self,
        indices: impl IntoIterator<Item = usize>,
        t_min: f64,
        t_max: f64,
    ) -> Option<(f64, f64)> {
        let mut bounds: Option<(f64, f64)> = None;
        let mut include = |lo: f64, hi: f64| {
            if lo.is_nan() || hi.is_nan() {
                return;
            }
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(lo), max.max(hi)),
                None => (lo, hi),
            });
        };

        for index in indices {
            let Some(series) = self.series.get(index) else {
                continue;
            };
            let range = series.lower_bound(t_min)..series.upper_bound(t_max);
            if range.is_empty() {
                continue;
            }
            match series {
                Series::Raw(samples) => {
                    for s in &samples[range] {
                        include(s.value, s.value);
                    }
                }
                Series::Binned(bins) => {
                    for b in bins[range].iter().filter(|b| b.is_populated()) {
                        include(b.min, b.max);
                    }
                }
            }
        }
        bounds
    }
}

fn is_sorted<T: Timed>(points: &[T]) -> bool {
    points.windows(2).all(|w| w[0].time() <= w[1].time())
}

fn merge_points<T: Timed>(existing: &mut Vec<T>, mut chunk: Vec<T>, index: usize) -> MergeOutcome {
    let received = chunk.len();
    chunk.retain(|p| !p.time().is_nan());
    if chunk.len() < received {
        tracing::warn!(
            index,
            dropped = received - chunk.len(),
            "Dropped history points without a timestamp"
        );
    }
    if chunk.is_empty() {
        return MergeOutcome::Empty;
    }
    if !is_sorted(&chunk) {
        tracing::warn!(index, "History chunk is not time ordered, sorting it");
        chunk.sort_by(|a, b| a.time().total_cmp(&b.time()));
    }

    let bounds = (
        existing.first().map(|p| p.time()),
        existing.last().map(|p| p.time()),
    );
    let (Some(head), Some(tail)) = bounds else {
        let added = chunk.len();
        *existing = chunk;
        return MergeOutcome::Appended(added);
    };
    let first = chunk[0].time();
    let last = chunk[chunk.len() - 1].time();

    if first >= tail {
        let repeated = chunk.iter().take_while(|p| p.time() == tail).count();
        existing.extend_from_slice(&chunk[repeated..]);
        return MergeOutcome::Appended(chunk.len() - repeated);
    }

    if last <= head {
        let repeated = chunk.iter().rev().take_while(|p| p.time() == head).count();
        let keep = chunk.len() - repeated;
        existing.splice(0..0, chunk.into_iter().take(keep));
        return MergeOutcome::Prepended(keep);
    }

    let at = existing.partition_point(|p| p.time() < first);
    if at > 0 && at < existing.len() && last < existing[at].time() {
        let added = chunk.len();
        existing.splice(at..at, chunk);
        return MergeOutcome::Inserted(added);
    }

    tracing::warn!(
        index,
        chunk_start = first,
        chunk_end = last,
        stored_start = head,
        stored_end = tail,
        "History chunk overlaps stored data"
    );

    let offered = chunk.len();
    let fresh: Vec<T> = chunk
        .into_iter()
        .filter(|p| {
            existing
                .binary_search_by(|e| e.time().total_cmp(&p.time()))
                .is_err()
        })
        .collect();
    let dropped = offered - fresh.len();
    let added = fresh.len();

    if !fresh.is_empty() {
        let mut merged = Vec::with_capacity(existing.len() + fresh.len());
        let mut old = existing.drain(..).peekable();
        let mut new = fresh.into_iter().peekable();
        loop {
            let take_old = match (old.peek(), new.peek()) {
                (Some(a), Some(b)) => a.time() <= b.time(),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_old { old.next() } else { new.next() };
            merged.extend(next);
        }
        drop(old);
        *existing = merged;
    }

    MergeOutcome::Overlapped { added, dropped }
}
