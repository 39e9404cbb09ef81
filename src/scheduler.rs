//! Fetch planning
//!
//! Decides which time ranges to request from the history service and keeps
//! track of what has been requested and received. Every full reload starts
//! a new generation; completions from an older generation are ignored so a
//! slow reply never lands in a store that has since been reset.

use crate::config::EngineSettings;
use crate::types::{SeriesMode, Window};
use std::time::Duration;

/// Span substituted when a full load would otherwise be empty
const MIN_FULL_SPAN_SECS: f64 = 600.0;

/// What a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Replaces all stored data
    Full,
    /// Extends stored data to the left after a pan
    SideLeft,
    /// Extends stored data to the right after a pan
    SideRight,
    /// Incremental read up to now while scrolling
    LiveTail,
}

impl FetchKind {
    /// Live-tail polls run continuously and do not show as busy; the busy
    /// indicator and marker guard ignore them
    pub fn counts_as_pending(&self) -> bool {
        !matches!(self, FetchKind::LiveTail)
    }
}

/// One read against the history service
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub id: u64,
    /// Store generation the reply belongs to
    pub generation: u64,
    pub kind: FetchKind,
    pub mode: SeriesMode,
    pub start: f64,
    pub end: f64,
    /// Bin count for binned reads
    pub num_bins: Option<u32>,
    /// Start live-tail polling once this read completes
    pub follow: bool,
}

impl FetchRequest {
    pub fn range(&self) -> Window {
        Window::new(self.start, self.end)
    }
}

/// Requested/received envelope and pending-fetch bookkeeping
#[derive(Debug, Clone)]
pub struct FetchScheduler {
    settings: EngineSettings,
    generation: u64,
    next_id: u64,
    mode: SeriesMode,
    requested: Option<Window>,
    received: Option<Window>,
    pending: usize,
    /// Id of the live-tail read awaiting its reply
    live_tail: Option<u64>,
}

impl FetchScheduler {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            settings: settings.clone(),
            generation: 0,
            next_id: 0,
            mode: SeriesMode::Raw,
            requested: None,
            received: None,
            pending: 0,
            live_tail: None,
        }
    }

    /// Binned above the threshold, raw at or below it
    pub fn mode_for_span(&self, span: f64) -> SeriesMode {
        if span > self.settings.binned_threshold_secs {
            SeriesMode::Binned
        } else {
            SeriesMode::Raw
        }
    }

    pub fn mode(&self) -> SeriesMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fetches started and not yet completed or failed
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_busy(&self) -> bool {
        self.pending > 0
    }

    pub fn requested(&self) -> Option<Window> {
        self.requested
    }

    pub fn received(&self) -> Option<Window> {
        self.received
    }

    /// Forget the envelope and invalidate everything in flight
    pub fn reset(&mut self) {
        self.generation += 1;
        self.requested = None;
        self.received = None;
        self.live_tail = None;
    }

    fn request(&mut self, kind: FetchKind, start: f64, end: f64, follow: bool) -> FetchRequest {
        self.next_id += 1;
        if kind.counts_as_pending() {
            self.pending += 1;
        }
        let num_bins = match self.mode {
            SeriesMode::Binned => Some(self.settings.bin_budget),
            SeriesMode::Raw => None,
        };
        let request = FetchRequest {
            id: self.next_id,
            generation: self.generation,
            kind,
            mode: self.mode,
            start,
            end,
            num_bins,
            follow,
        };
        tracing::debug!(
            id = request.id,
            kind = ?request.kind,
            mode = %request.mode,
            start = request.start,
            end = request.end,
            "Planned history read"
        );
        request
    }

    /// Plan a full reload of `[start, end]` for a display window of `span`
    /// seconds. The store must be reset to the returned request's mode.
    pub fn plan_full(
        &mut self,
        span: f64,
        start: f64,
        end: f64,
        now: f64,
        follow: bool,
    ) -> FetchRequest {
        self.reset();
        self.mode = self.mode_for_span(span);

        let mut t2 = end.min(now);
        let mut t1 = start;
        if t1 >= t2 {
            t1 = t2 - MIN_FULL_SPAN_SECS;
        }

        if self.mode == SeriesMode::Raw && t2 - t1 > self.settings.max_raw_span_secs {
            let center = (t1 + t2) / 2.0;
            let half = self.settings.max_raw_span_secs / 2.0;
            t1 = center - half;
            t2 = (center + half).min(now);
        }

        self.requested = Some(Window::new(t1, t2));
        let follow = follow && self.mode == SeriesMode::Raw;
        self.request(FetchKind::Full, t1, t2, follow)
    }

    /// Side reads for a window panned past the requested envelope. Each
    /// extends the envelope by one window width.
    pub fn plan_side(&mut self, window: Window, now: f64) -> Vec<FetchRequest> {
        let (Some(requested), Some(received)) = (self.requested, self.received) else {
            return Vec::new();
        };
        let dt = window.span();
        let mut requests = Vec::new();

        if window.t_min < requested.t_min {
            let t1 = window.t_min - dt;
            let t2 = received.t_min;
            self.requested = Some(Window::new(t1, requested.t_max));
            requests.push(self.request(FetchKind::SideLeft, t1, t2, false));
        }

        if window.t_max > requested.t_max {
            let t1 = received.t_max;
            let t2 = (window.t_max + dt).min(now);
            if t1 < t2 {
                if let Some(req) = self.requested.as_mut() {
                    req.t_max = t2;
                }
                requests.push(self.request(FetchKind::SideRight, t1, t2, false));
            }
        }

        requests
    }

    /// Incremental read from the received edge up to now. `None` unless
    /// scrolling in raw mode, and while the previous live-tail read is
    /// outstanding.
    pub fn plan_live_tail(&mut self, window: Window, now: f64, scrolling: bool) -> Option<FetchRequest> {
        if !scrolling || self.mode != SeriesMode::Raw {
            return None;
        }
        if let Some(id) = self.live_tail {
            tracing::trace!(id, "Live-tail read still outstanding");
            return None;
        }
        let t1 = self
            .received
            .map(|r| r.t_max)
            .unwrap_or(window.t_min)
            .floor();
        let t2 = now.floor();
        if t1 > t2 {
            return None;
        }
        let request = self.request(FetchKind::LiveTail, t1, t2, false);
        self.live_tail = Some(request.id);
        Some(request)
    }

    /// Whether a live-tail read awaits its reply
    pub fn live_tail_in_flight(&self) -> bool {
        self.live_tail.is_some()
    }

    fn settle_live_tail(&mut self, request: &FetchRequest) {
        if request.kind == FetchKind::LiveTail && self.live_tail == Some(request.id) {
            self.live_tail = None;
        }
    }

    /// Record a successful read. Returns `false` when the reply belongs to
    /// an older generation and must be discarded.
    pub fn complete(&mut self, request: &FetchRequest) -> bool {
        if request.kind.counts_as_pending() {
            self.pending = self.pending.saturating_sub(1);
        }
        self.settle_live_tail(request);
        if request.generation != self.generation {
            tracing::debug!(id = request.id, "Ignoring reply from a discarded window");
            return false;
        }

        let range = request.range();
        match request.kind {
            FetchKind::Full => {
                self.received = Some(range);
            }
            FetchKind::SideLeft => {
                let received = self.received.get_or_insert(range);
                received.t_min = received.t_min.min(range.t_min);
            }
            FetchKind::SideRight => {
                let received = self.received.get_or_insert(range);
                received.t_max = received.t_max.max(range.t_max);
            }
            FetchKind::LiveTail => {
                let requested = self.requested.get_or_insert(range);
                let received = self.received.get_or_insert(range);
                if range.t_min < requested.t_min {
                    requested.t_min = range.t_min;
                    received.t_min = range.t_min;
                }
                if range.t_max > requested.t_max {
                    requested.t_max = range.t_max;
                    received.t_max = range.t_max;
                }
                if range.t_max > received.t_max {
                    received.t_max = range.t_max;
                }
            }
        }
        true
    }

    /// Record a failed read. The requested envelope shrinks back to what was
    /// received so the next pan retries. Returns `false` for stale replies.
    pub fn fail(&mut self, request: &FetchRequest) -> bool {
        if request.kind.counts_as_pending() {
            self.pending = self.pending.saturating_sub(1);
        }
        self.settle_live_tail(request);
        if request.generation != self.generation {
            return false;
        }

        match (request.kind, self.requested.as_mut(), self.received) {
            (FetchKind::SideLeft, Some(requested), Some(received)) => {
                requested.t_min = received.t_min;
            }
            (FetchKind::SideRight, Some(requested), Some(received)) => {
                requested.t_max = received.t_max;
            }
            (FetchKind::Full, _, received) => {
                self.requested = received;
            }
            _ => {}
        }
        true
    }

    /// Live-tail period: half the time covered by one pixel, within the
    /// configured bounds
    pub fn live_poll_period(&self, span: f64, width_px: f64) -> Duration {
        let min = self.settings.live_tail_min_secs;
        let max = self.settings.live_tail_max_secs;
        let secs = if width_px > 0.0 && span.is_finite() {
            (span / width_px / 2.0).clamp(min, max)
        } else {
            max
        };
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DAY;

    const NOW: f64 = 1_700_000_000.0;

    fn scheduler() -> FetchScheduler {
        FetchScheduler::new(&EngineSettings::default())
    }

    #[test]
    fn test_mode_threshold_boundary() {
        let s = scheduler();
        assert_eq!(s.mode_for_span(7.0 * DAY), SeriesMode::Raw);
        assert_eq!(s.mode_for_span(7.0 * DAY + 1.0), SeriesMode::Binned);
    }

    #[test]
    fn test_full_load_modes() {
        let mut s = scheduler();
        let raw = s.plan_full(3600.0, NOW - 5400.0, NOW + 1800.0, NOW, true);
        assert_eq!(raw.mode, SeriesMode::Raw);
        assert_eq!(raw.num_bins, None);
        assert_eq!(raw.end, NOW);
        assert!(raw.follow);

        let binned = s.plan_full(30.0 * DAY, NOW - 30.0 * DAY, NOW, NOW, true);
        assert_eq!(binned.mode, SeriesMode::Binned);
        assert_eq!(binned.num_bins, Some(5000));
        assert!(!binned.follow);
        assert!(binned.generation > raw.generation);
    }

    #[test]
    fn test_future_window_is_clamped() {
        let mut s = scheduler();
        let r = s.plan_full(600.0, NOW + 100.0, NOW + 700.0, NOW, false);
        assert_eq!(r.end, NOW);
        assert_eq!(r.start, NOW - 600.0);
    }

    #[test]
    fn test_wide_raw_request_is_centered() {
        let settings = EngineSettings {
            binned_threshold_secs: 90.0 * DAY,
            ..EngineSettings::default()
        };
        let mut s = FetchScheduler::new(&settings);
        let end = NOW - 10.0 * DAY;
        let start = end - 60.0 * DAY;
        let r = s.plan_full(60.0 * DAY, start, end, NOW, false);
        assert_eq!(r.mode, SeriesMode::Raw);
        assert!((r.end - r.start - 30.0 * DAY).abs() < 1e-6);
        assert!(((r.start + r.end) / 2.0 - (start + end) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_side_fetch_before_first_reply() {
        let mut s = scheduler();
        s.plan_full(3600.0, NOW - 7200.0, NOW - 3600.0, NOW, false);
        let panned = Window::new(NOW - 9000.0, NOW - 5400.0);
        assert!(s.plan_side(panned, NOW).is_empty());
    }

    #[test]
    fn test_side_fetches_extend_envelope() {
        let mut s = scheduler();
        let full = s.plan_full(3600.0, NOW - 7200.0, NOW - 3600.0, NOW, false);
        assert!(s.complete(&full));

        let left = s.plan_side(Window::new(NOW - 8000.0, NOW - 4400.0), NOW);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].kind, FetchKind::SideLeft);
        assert_eq!(left[0].start, NOW - 8000.0 - 3600.0);
        assert_eq!(left[0].end, NOW - 7200.0);

        // same pan again: already requested
        assert!(s.plan_side(Window::new(NOW - 8000.0, NOW - 4400.0), NOW).is_empty());

        let right = s.plan_side(Window::new(NOW - 3000.0, NOW + 600.0), NOW);
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].kind, FetchKind::SideRight);
        assert_eq!(right[0].start, NOW - 3600.0);
        assert_eq!(right[0].end, NOW);
        assert_eq!(s.pending(), 2);

        assert!(s.complete(&left[0]));
        assert!(s.complete(&right[0]));
        assert_eq!(s.received(), Some(Window::new(NOW - 11600.0, NOW)));
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_failed_side_fetch_rolls_back() {
        let mut s = scheduler();
        let full = s.plan_full(3600.0, NOW - 7200.0, NOW - 3600.0, NOW, false);
        s.complete(&full);
        let left = s.plan_side(Window::new(NOW - 8000.0, NOW - 4400.0), NOW);
        assert!(s.fail(&left[0]));
        assert_eq!(s.pending(), 0);
        assert_eq!(s.requested().map(|w| w.t_min), Some(NOW - 7200.0));

        // the next pan retries
        assert_eq!(s.plan_side(Window::new(NOW - 8000.0, NOW - 4400.0), NOW).len(), 1);
    }

    #[test]
    fn test_stale_reply_is_ignored_but_counted() {
        let mut s = scheduler();
        let first = s.plan_full(3600.0, NOW - 3600.0, NOW, NOW, false);
        let second = s.plan_full(7200.0, NOW - 7200.0, NOW, NOW, false);
        assert_eq!(s.pending(), 2);

        assert!(s.complete(&second));
        assert!(!s.complete(&first));
        assert_eq!(s.pending(), 0);
        assert_eq!(s.received(), Some(second.range()));
    }

    #[test]
    fn test_pending_never_negative() {
        let mut s = scheduler();
        let r = s.plan_full(3600.0, NOW - 3600.0, NOW, NOW, false);
        s.fail(&r);
        s.fail(&r);
        s.complete(&r);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_live_tail() {
        let mut s = scheduler();
        let window = Window::new(NOW - 3600.0, NOW);
        let full = s.plan_full(3600.0, NOW - 5400.0, NOW, NOW - 10.0, true);
        assert!(s.plan_live_tail(window, NOW, false).is_none());

        s.complete(&full);
        let tail = s.plan_live_tail(window, NOW + 5.5, true).unwrap();
        assert_eq!(tail.start, NOW - 10.0);
        assert_eq!(tail.end, NOW + 5.0);
        assert_eq!(s.pending(), 0);

        assert!(s.complete(&tail));
        assert_eq!(s.received().map(|w| w.t_max), Some(NOW + 5.0));
        assert_eq!(s.requested().map(|w| w.t_max), Some(NOW + 5.0));

        s.plan_full(30.0 * DAY, NOW - 30.0 * DAY, NOW, NOW, true);
        assert!(s.plan_live_tail(window, NOW, true).is_none());
    }

    #[test]
    fn test_one_live_tail_in_flight() {
        let mut s = scheduler();
        let window = Window::new(NOW - 3600.0, NOW);
        let full = s.plan_full(3600.0, NOW - 5400.0, NOW, NOW, true);
        s.complete(&full);

        let tail = s.plan_live_tail(window, NOW + 1.0, true).unwrap();
        assert!(s.live_tail_in_flight());
        assert!(s.plan_live_tail(window, NOW + 2.0, true).is_none());
        assert!(s.plan_live_tail(window, NOW + 3.0, true).is_none());

        s.fail(&tail);
        assert!(!s.live_tail_in_flight());
        let retry = s.plan_live_tail(window, NOW + 4.0, true).unwrap();
        assert_eq!((retry.start, retry.end), (NOW, NOW + 4.0));

        // A reload forgets the outstanding read; its late reply must not
        // clear the guard of a newer one
        let full = s.plan_full(3600.0, NOW - 5400.0, NOW + 4.0, NOW + 4.0, true);
        s.complete(&full);
        let fresh = s.plan_live_tail(window, NOW + 5.0, true).unwrap();
        s.complete(&retry);
        assert!(s.live_tail_in_flight());
        s.complete(&fresh);
        assert!(!s.live_tail_in_flight());
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_live_poll_period_bounds() {
        let s = scheduler();
        assert_eq!(s.live_poll_period(60.0, 600.0), Duration::from_secs_f64(0.1));
        assert_eq!(s.live_poll_period(3600.0, 600.0), Duration::from_secs_f64(3.0));
        assert_eq!(s.live_poll_period(30.0 * DAY, 600.0), Duration::from_secs_f64(60.0));
        assert_eq!(s.live_poll_period(3600.0, 0.0), Duration::from_secs_f64(60.0));
    }
}
