//! History chart controller
//!
//! [`HistoryChart`] owns everything one chart needs: state, series store,
//! fetch scheduler, interaction state machine and compiled formulas. It
//! never does I/O itself. Reads and timers leave through an outbox of
//! [`ChartCommand`]s that the host hands to a [`crate::backend::FetchBackend`],
//! and replies come back through [`HistoryChart::apply`].
//!
//! Rendering is pull-based: the host calls [`HistoryChart::frame`] on every
//! animation tick and gets a [`Frame`] only when something changed and the
//! redraw interval has passed.
//!
//! Changes made through user input emit [`ChartEvent`]s so a host can keep
//! several charts in step. The public window operations do not, so calling
//! them on sibling charts never echoes.

use crate::axis::{
    plan_time_axis, plan_value_axis_spaced, FixedTextMetrics, TimeAxisPlan, ValueAxisPlan,
};
use crate::backend::BackendMessage;
use crate::config::{AppConfig, InitialWindow, PanelConfig};
use crate::error::{HistScopeError, Result};
use crate::geometry::{line_gap_px, marker_label, marker_precision, GeometryCache, SeriesGeometry};
use crate::interaction::{Effect, InputEvent, Interaction, RubberBand};
use crate::mapper::{truncate_infinity, CoordinateMapper, PlotArea};
use crate::protocol::{decode_binned, decode_raw};
use crate::scheduler::{FetchKind, FetchRequest, FetchScheduler};
use crate::scripting::VariableTransforms;
use crate::state::{ChartState, Marker, LOG_MAX_FLOOR, LOG_MIN};
use crate::store::SeriesStore;
use crate::types::{Series, SeriesMode, ValueRange, Variable, Window};
use std::ops::Range;
use std::time::{Duration, Instant};

/// Zoom buttons are squares of this size at the bottom right of the plot
const ZOOM_BUTTON_PX: f64 = 20.0;

/// Canvas margins around the plot area
const LEFT_PAD_PX: f64 = 15.0;
const BOTTOM_MARGIN_PX: f64 = 25.0;
const TOP_MARGIN_PX: f64 = 26.0;
const MENU_MARGIN_PX: f64 = 26.0;
const PLAIN_MARGIN_PX: f64 = 2.0;

/// Height lost to margins when sizing value labels before the layout exists
const LABEL_PREPASS_PX: f64 = 35.0;

/// Notification for hosts that keep several charts in step
#[derive(Debug, Clone, PartialEq)]
pub enum ChartEvent {
    /// The user moved or zoomed the time window
    TimeZoom(Window),
    ResetAxes,
    JumpToCurrent,
    /// `A=..&B=..` query for the committed window
    WindowQuery(String),
}

/// Work for the host
#[derive(Debug, Clone, PartialEq)]
pub enum ChartCommand {
    Fetch(FetchRequest),
    ScheduleLiveTail(Duration),
    CancelLiveTail,
    QueryLastWritten { before: f64 },
    Notify(ChartEvent),
}

/// Which last-written time to jump to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastWrittenJump {
    /// Newest time any variable was written
    Any,
    /// Oldest of the per-variable times, where every variable has data
    All,
}

/// Problems shown to the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartStatus {
    /// One-shot message, cleared by the host once shown
    pub alert: Option<String>,
    /// Persistent until the next successful read
    pub banner: Option<String>,
}

/// Drawing instructions for one series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    pub index: usize,
    pub label: String,
    pub colour: String,
    /// False when another series is soloed
    pub visible: bool,
    pub geometry: SeriesGeometry,
    /// Point runs to join with lines
    pub segments: Vec<Range<usize>>,
    /// Newest displayed value, for the legend
    pub last_value: Option<f64>,
    /// Set when nothing is in the window but older data exists
    pub no_data_since: Option<f64>,
}

/// Everything the renderer needs for one redraw
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub area: PlotArea,
    pub window: Window,
    pub range: ValueRange,
    pub log_axis: bool,
    pub value_axis: Option<ValueAxisPlan>,
    pub time_axis: Option<TimeAxisPlan>,
    pub series: Vec<SeriesFrame>,
    pub marker: Option<Marker>,
    pub marker_label: Option<String>,
    pub rubber_band: Option<RubberBand>,
    /// Pixel where the future begins; the renderer hatches from here
    pub future_x: Option<f64>,
    pub busy: bool,
    /// Average entries per bin in binned mode
    pub average_bin_size: Option<f64>,
    pub show_zoom_buttons: bool,
    pub status: ChartStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoomButton {
    In,
    Out,
}

/// Coalesces redraw requests to at most one frame per interval. A forced
/// request is served on the next tick regardless of the interval.
#[derive(Debug, Clone)]
struct RedrawGate {
    interval: Duration,
    last: Option<Instant>,
    pending: bool,
    force: bool,
}

impl RedrawGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            pending: false,
            force: false,
        }
    }

    fn request(&mut self, force: bool) {
        self.pending = true;
        self.force |= force;
    }

    fn take(&mut self, at: Instant) -> bool {
        if !self.pending {
            return false;
        }
        let due = self.force
            || self
                .last
                .map_or(true, |last| at.duration_since(last) >= self.interval);
        if due {
            self.pending = false;
            self.force = false;
            self.last = Some(at);
        }
        due
    }
}

/// Value range for the data bounds `data` under the panel's scale options
pub fn autoscale(panel: &PanelConfig, data: Option<(f64, f64)>, log: bool) -> ValueRange {
    let auto_min = panel.autoscale_min();
    let auto_max = panel.autoscale_max();
    let mut min0 = panel.fixed_min();
    let mut max0 = panel.maximum;

    if !auto_min && !auto_max {
        let mut range = ValueRange::new(min0, max0);
        if log {
            if range.y_min <= 0.0 {
                range.y_min = LOG_MIN;
            }
            if range.y_max <= 0.0 {
                range.y_max = LOG_MAX_FLOOR;
            }
        }
        return range;
    }

    match data {
        Some((lo, hi)) => {
            if auto_min {
                min0 = lo;
            }
            if auto_max {
                max0 = hi;
            }
        }
        None => {
            min0 = -0.5;
            max0 = 0.5;
        }
    }
    if min0 == max0 {
        min0 -= 0.5;
        max0 += 0.5;
    }
    if max0 < min0 {
        max0 = min0 + 1.0;
    }

    let pad = truncate_infinity(max0 - min0) / 10.0;
    let mut y_min = match (auto_min, log) {
        (true, true) => 0.8 * min0,
        (true, false) => min0 - pad,
        (false, _) => min0,
    };
    if log && y_min <= 0.0 {
        y_min = LOG_MIN;
    }
    let mut y_max = match (auto_max, log) {
        (true, true) => 1.2 * max0,
        (true, false) => max0 + pad,
        (false, _) => max0,
    };
    if log && y_max <= 0.0 {
        y_max = LOG_MAX_FLOOR;
    }

    ValueRange {
        y_min: truncate_infinity(y_min),
        y_max: truncate_infinity(y_max),
        y_min0: min0,
        y_max0: max0,
    }
}

fn last_value(series: &Series) -> Option<f64> {
    match series {
        Series::Raw(samples) => samples.iter().rev().map(|s| s.value).find(|v| !v.is_nan()),
        Series::Binned(bins) => bins
            .iter()
            .rev()
            .filter(|b| b.is_populated())
            .map(|b| b.last)
            .find(|v| !v.is_nan()),
    }
}

/// Controller for one history chart
pub struct HistoryChart {
    config: AppConfig,
    variables: Vec<Variable>,
    transforms: VariableTransforms,
    state: ChartState,
    store: SeriesStore,
    scheduler: FetchScheduler,
    interaction: Interaction,
    geometry: GeometryCache,
    metrics: FixedTextMetrics,
    width: f64,
    height: f64,
    area: PlotArea,
    redraw: RedrawGate,
    status: ChartStatus,
    commands: Vec<ChartCommand>,
    last_written: Vec<f64>,
    pending_jump: Option<LastWrittenJump>,
    live_tail_armed: bool,
}

impl HistoryChart {
    /// Build a chart for a `width` x `height` canvas. Fails on invalid
    /// configuration, unparsable variable names or formulas.
    pub fn new(config: AppConfig, width: f64, height: f64) -> Result<Self> {
        config.validate()?;
        let variables = config.panel.build_variables()?;
        let transforms = VariableTransforms::compile(&variables)?;
        let t_scale = config.panel.timescale_secs()?;

        let state = ChartState::new(Window::new(0.0, t_scale), t_scale, config.panel.log_axis);
        let metrics = FixedTextMetrics {
            char_width: config.display.char_width_px,
            text_height: config.display.text_height_px,
        };

        let mut chart = Self {
            store: SeriesStore::new(variables.len(), SeriesMode::Raw),
            scheduler: FetchScheduler::new(&config.engine),
            interaction: Interaction::new(&config.engine),
            redraw: RedrawGate::new(config.engine.redraw_interval()),
            geometry: GeometryCache::new(),
            last_written: vec![0.0; variables.len()],
            area: PlotArea::new(0.0, height, width, 0.0),
            status: ChartStatus::default(),
            commands: Vec::new(),
            pending_jump: None,
            live_tail_armed: false,
            config,
            variables,
            transforms,
            state,
            metrics,
            width,
            height,
        };
        chart.relayout();
        Ok(chart)
    }

    pub fn state(&self) -> &ChartState {
        &self.state
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn status(&self) -> &ChartStatus {
        &self.status
    }

    pub fn area(&self) -> PlotArea {
        self.area
    }

    /// Per-variable last-written times, zero when unknown
    pub fn last_written(&self) -> &[f64] {
        &self.last_written
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    /// Drain the outbox
    pub fn take_commands(&mut self) -> Vec<ChartCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_alert(&mut self) {
        self.status.alert = None;
    }

    fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.area, self.state.window, self.state.range, self.state.log_axis)
    }

    // ==================== Window Operations ====================

    /// Set the initial window from `A`/`B` query parameters, or the last
    /// timescale up to now, and load it with half a window of margin on
    /// each side
    pub fn start(&mut self, now: f64, query: Option<&str>) {
        let (window, scroll) = match query.and_then(InitialWindow::from_query) {
            Some(w) => (Window::new(w.t_min as f64, w.t_max as f64), false),
            None => (Window::new(now - self.state.t_scale, now), true),
        };
        self.state.window = window;
        self.state.scroll = scroll;
        tracing::info!(t_min = window.t_min, t_max = window.t_max, scroll, "Starting chart");

        let half = window.span() / 2.0;
        self.load_full(window.t_min - half, window.t_max + half, now);
        self.commands.push(ChartCommand::QueryLastWritten { before: now });
    }

    /// Drop all data and load `[t1, t2]` from scratch. Live-tail polling
    /// resumes after the load when the chart is scrolling.
    pub fn load_full(&mut self, t1: f64, t2: f64, now: f64) {
        let request =
            self.scheduler
                .plan_full(self.state.window.span(), t1, t2, now, self.state.scroll);
        if request.mode == SeriesMode::Binned {
            self.state.scroll = false;
        }
        self.store.reset(request.mode);
        self.geometry.invalidate();
        self.state.marker = None;
        self.cancel_live_tail();
        self.commands.push(ChartCommand::Fetch(request));
        self.redraw.request(true);
    }

    /// Halve the window. While scrolling only the left edge moves.
    pub fn zoom_in(&mut self, now: f64) {
        let w = self.state.window;
        let delta = w.span();
        self.state.window = if self.state.scroll {
            Window::new(w.t_min + delta / 2.0, w.t_max)
        } else {
            Window::new(w.t_min + delta / 4.0, w.t_max - delta / 4.0)
        };
        let w = self.state.window;
        self.load_full(w.t_min, w.t_max, now);
    }

    /// Double the window about its centre without passing `now`. Refused
    /// while reads are outstanding.
    pub fn zoom_out(&mut self, now: f64) -> bool {
        if self.scheduler.is_busy() {
            self.status.alert = Some("Still loading, zoom out again once the chart is ready".into());
            self.redraw.request(true);
            return false;
        }
        let w = self.state.window;
        let delta = w.span();
        let mut next = Window::new(w.t_min - delta / 2.0, w.t_max + delta / 2.0);
        if next.t_max > now {
            next = Window::new(now - 2.0 * delta, now);
        }
        self.state.window = next;
        self.load_full(next.t_min, next.t_max, now);
        true
    }

    /// Scroll over the last `span` seconds
    pub fn show_last(&mut self, span: f64, now: f64) {
        self.state.window = Window::new(now - span, now);
        self.state.scroll = true;
        self.load_full(now - span, now, now);
    }

    pub fn set_timespan(&mut self, t_min: f64, t_max: f64, scroll: bool, now: f64) {
        self.state.window = Window::new(t_min, t_max);
        self.state.scroll = scroll;
        self.load_full(t_min, t_max, now);
    }

    /// Keep the span, up to the jump limit, and scroll from now
    pub fn jump_to_current(&mut self, now: f64) {
        let dt = self
            .state
            .window
            .span()
            .floor()
            .min(self.config.engine.jump_span_limit_secs);
        let t_max = now.floor();
        self.state.window = Window::new(t_max - dt, t_max);
        self.state.scroll = true;
        self.load_full(t_max - dt, t_max, now);
    }

    /// Back to the configured timescale with autoscale and scrolling
    pub fn reset_axes(&mut self, now: f64) {
        self.state.window = Window::new(now - self.state.t_scale, now);
        self.state.scroll = true;
        self.state.y_zoom = false;
        self.state.show_zoom_buttons = true;
        let w = self.state.window;
        self.load_full(w.t_min, w.t_max, now);
    }

    /// Centre the window on the last time data was written. The jump
    /// happens when the backend answers.
    pub fn jump_to_last_written(&mut self, target: LastWrittenJump, now: f64) {
        self.pending_jump = Some(target);
        self.commands.push(ChartCommand::QueryLastWritten { before: now });
    }

    /// Solo `index`, or show all series again when it is already soloed
    pub fn toggle_solo(&mut self, index: usize) {
        if index >= self.variables.len() {
            return;
        }
        self.state.solo = if self.state.solo == Some(index) {
            None
        } else {
            Some(index)
        };
        tracing::debug!(solo = ?self.state.solo, "Solo changed");
        self.find_min_max();
        self.redraw.request(true);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.relayout();
        self.geometry.invalidate();
        self.redraw.request(true);
    }

    /// Pause live-tail polling while the host view is hidden
    pub fn set_visible(&mut self, visible: bool) {
        if self.state.visible == visible {
            return;
        }
        self.state.visible = visible;
        if visible {
            self.arm_live_tail();
            self.redraw.request(true);
        } else {
            self.cancel_live_tail();
        }
    }

    fn arm_live_tail(&mut self) {
        if !self.state.visible || !self.state.scroll || self.scheduler.mode() != SeriesMode::Raw {
            return;
        }
        let period = self
            .scheduler
            .live_poll_period(self.state.window.span(), self.area.width());
        self.commands.push(ChartCommand::ScheduleLiveTail(period));
        self.live_tail_armed = true;
    }

    fn cancel_live_tail(&mut self) {
        if self.live_tail_armed {
            self.commands.push(ChartCommand::CancelLiveTail);
            self.live_tail_armed = false;
        }
    }

    fn notify(&mut self, event: ChartEvent) {
        self.commands.push(ChartCommand::Notify(event));
    }

    fn notify_window(&mut self) {
        let w = self.state.window;
        self.notify(ChartEvent::TimeZoom(w));
        let query = InitialWindow {
            t_min: w.t_min.floor() as i64,
            t_max: w.t_max.floor() as i64,
        };
        self.notify(ChartEvent::WindowQuery(query.to_query()));
    }

    // ==================== Backend Replies ====================

    /// Apply one message from the fetch backend
    pub fn apply(&mut self, message: BackendMessage, now: f64) {
        match message {
            BackendMessage::FetchCompleted { request, payload } => {
                self.on_fetch_completed(&request, &payload, now)
            }
            BackendMessage::FetchFailed { request, error } => {
                if self.scheduler.fail(&request) {
                    self.report(&error);
                }
            }
            BackendMessage::LastWritten { times, .. } => self.on_last_written(times, now),
            BackendMessage::LastWrittenFailed { error } => {
                self.pending_jump = None;
                self.report(&error);
            }
            BackendMessage::LiveTailDue => self.on_live_tail_due(now),
            BackendMessage::Shutdown => tracing::debug!("Fetch backend shut down"),
        }
    }

    fn on_fetch_completed(&mut self, request: &FetchRequest, payload: &[u8], now: f64) {
        if request.generation != self.scheduler.generation() {
            self.scheduler.complete(request);
            return;
        }

        let chunks = match self.decode(request, payload) {
            Ok(chunks) => chunks,
            Err(error) => {
                tracing::error!(id = request.id, "Discarding history reply: {}", error);
                self.scheduler.fail(request);
                self.report(&error);
                return;
            }
        };

        self.scheduler.complete(request);
        self.status.banner = None;
        for (index, chunk) in chunks.into_iter().enumerate() {
            if let Err(e) = self.store.merge(index, chunk) {
                tracing::warn!(index, "Could not merge chunk: {}", e);
            }
        }

        // The window may have been panned past the envelope while this read
        // was in flight. Scrolling charts are extended by the live tail.
        if !self.state.scroll {
            let requests = self.scheduler.plan_side(self.state.window, now);
            self.commands.extend(requests.into_iter().map(ChartCommand::Fetch));
        }

        self.find_min_max();
        self.redraw.request(false);
        if request.kind == FetchKind::Full && request.follow {
            self.arm_live_tail();
        }
    }

    fn decode(&mut self, request: &FetchRequest, payload: &[u8]) -> Result<Vec<Series>> {
        let n = self.variables.len();
        let transforms = &mut self.transforms;
        match request.mode {
            SeriesMode::Raw => {
                let decoded = decode_raw(payload, n)?;
                Ok(decoded
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Series::Raw(transforms.samples(i, &v.points)))
                    .collect())
            }
            SeriesMode::Binned => {
                let decoded = decode_binned(payload, n)?;
                self.store.set_bin_size(decoded.average_bin_size());
                Ok(decoded
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        Series::Binned(v.bins().into_iter().map(|b| transforms.bin(i, b)).collect())
                    })
                    .collect())
            }
        }
    }

    fn report(&mut self, error: &HistScopeError) {
        if error.is_transport() {
            if self.status.banner.is_none() {
                tracing::warn!("History service unreachable: {}", error);
            }
            self.status.banner = Some(error.to_string());
        } else {
            self.status.alert = Some(error.to_string());
        }
        self.redraw.request(true);
    }

    fn on_last_written(&mut self, times: Vec<f64>, now: f64) {
        self.last_written = times;
        self.last_written.resize(self.variables.len(), 0.0);

        if let Some(target) = self.pending_jump.take() {
            let written = self.last_written.iter().copied().filter(|&t| t > 0.0);
            let time = match target {
                LastWrittenJump::Any => written.fold(None, |acc: Option<f64>, t| {
                    Some(acc.map_or(t, |a| a.max(t)))
                }),
                LastWrittenJump::All => written.fold(None, |acc: Option<f64>, t| {
                    Some(acc.map_or(t, |a| a.min(t)))
                }),
            };
            match time {
                Some(t) => {
                    let half = self.state.window.span() / 2.0;
                    self.state.scroll = false;
                    self.state.window = Window::new(t - half, t + half);
                    self.load_full(t - half, t + half, now);
                }
                None => {
                    self.status.alert = Some("No history data found for these variables".into());
                }
            }
        }
        self.redraw.request(false);
    }

    fn on_live_tail_due(&mut self, now: f64) {
        self.live_tail_armed = false;
        if !self.state.visible || !self.state.scroll {
            return;
        }

        let span = self.state.window.span();
        self.state.window = Window::new(now - span, now);
        if let Some(request) = self
            .scheduler
            .plan_live_tail(self.state.window, now, self.state.scroll)
        {
            self.commands.push(ChartCommand::Fetch(request));
        }
        self.find_min_max();
        self.redraw.request(true);
        self.arm_live_tail();
    }

    // ==================== Input ====================

    fn zoom_button_at(&self, x: f64, y: f64) -> Option<ZoomButton> {
        if !self.state.show_zoom_buttons || y <= self.area.y1 - ZOOM_BUTTON_PX || y >= self.area.y1 {
            return None;
        }
        let x2 = self.area.x2;
        if x > x2 - 2.0 * ZOOM_BUTTON_PX && x < x2 - ZOOM_BUTTON_PX {
            Some(ZoomButton::In)
        } else if x > x2 - ZOOM_BUTTON_PX && x < x2 {
            Some(ZoomButton::Out)
        } else {
            None
        }
    }

    /// Feed one input event
    pub fn handle_input(&mut self, event: InputEvent, now: f64) {
        if let InputEvent::PointerDown { x, y } = event {
            if let Some(button) = self.zoom_button_at(x, y) {
                let changed = match button {
                    ZoomButton::In => {
                        self.zoom_in(now);
                        true
                    }
                    ZoomButton::Out => self.zoom_out(now),
                };
                if changed {
                    self.notify_window();
                }
                return;
            }
        }

        let mapper = self.mapper();
        if let Some(effect) = self.interaction.handle(event, &mut self.state, &mapper) {
            self.apply_effect(effect, now);
        }
    }

    fn apply_effect(&mut self, effect: Effect, now: f64) {
        match effect {
            Effect::Redraw { force } => self.redraw.request(force),
            Effect::Refit => {
                self.find_min_max();
                self.redraw.request(true);
            }
            Effect::Panned => {
                let requests = self.scheduler.plan_side(self.state.window, now);
                self.commands
                    .extend(requests.into_iter().map(ChartCommand::Fetch));
                self.find_min_max();
                self.redraw.request(false);
                self.notify_window();
            }
            Effect::Reload => {
                let w = self.state.window;
                self.load_full(w.t_min, w.t_max, now);
                self.notify_window();
            }
            Effect::Hover { x, y } => self.update_marker(x, y),
            Effect::ToggleSoloAt { x, y } => {
                self.refresh_geometry();
                let radius = self.config.engine.marker_radius_px;
                if let Some(index) = self.geometry.nearest_series(x, y, &self.area, radius) {
                    self.toggle_solo(index);
                }
            }
            Effect::JumpToCurrent => {
                self.jump_to_current(now);
                self.notify(ChartEvent::JumpToCurrent);
                self.notify_window();
            }
            Effect::ResetAxes => {
                self.reset_axes(now);
                self.notify(ChartEvent::ResetAxes);
                self.notify_window();
            }
        }
    }

    fn update_marker(&mut self, x: f64, y: f64) {
        let previous = self.state.marker;
        self.state.marker = if self.scheduler.is_busy() || self.zoom_button_at(x, y).is_some() {
            None
        } else {
            self.refresh_geometry();
            self.geometry.find_marker(
                x,
                y,
                &self.state,
                &self.area,
                &self.variables,
                self.config.engine.marker_radius_px,
            )
        };
        self.interaction.set_hovering(self.state.marker.is_some());
        if self.state.marker != previous {
            self.redraw.request(true);
        }
    }

    // ==================== Layout & Rendering ====================

    fn find_min_max(&mut self) {
        if self.state.y_zoom {
            return;
        }
        let w = self.state.window;
        let indices: Vec<usize> = (0..self.variables.len())
            .filter(|&i| self.state.shows(i))
            .collect();
        let data = self.store.min_max(indices, w.t_min, w.t_max);
        self.state.range = autoscale(&self.config.panel, data, self.state.log_axis);
        self.relayout();
    }

    /// Size the left margin for the widest value label
    fn relayout(&mut self) {
        let range = self.state.range;
        let label_width = plan_value_axis_spaced(
            range.y_min,
            range.y_max,
            self.height - LABEL_PREPASS_PX,
            self.state.log_axis,
            &self.metrics,
            self.config.engine.min_tick_spacing_px,
        )
        .map_or(0.0, |plan| plan.max_label_width);

        let right = if self.config.display.show_menu_buttons {
            MENU_MARGIN_PX
        } else {
            PLAIN_MARGIN_PX
        };
        self.area = PlotArea::new(
            label_width + LEFT_PAD_PX,
            self.height - BOTTOM_MARGIN_PX,
            self.width - right,
            TOP_MARGIN_PX,
        );
    }

    fn refresh_geometry(&mut self) {
        let mapper = self.mapper();
        if self.geometry.update(&self.store, &mapper) {
            tracing::trace!(points = self.store.total_points(), "Rebuilt geometry");
        }
    }

    /// A frame when a redraw is due at `at`
    pub fn frame(&mut self, at: Instant, now: f64) -> Option<Frame> {
        if !self.redraw.take(at) {
            return None;
        }
        Some(self.render(now))
    }

    /// Build a frame unconditionally
    pub fn render(&mut self, now: f64) -> Frame {
        self.relayout();
        self.refresh_geometry();

        let mapper = self.mapper();
        let area = self.area;
        let window = self.state.window;
        let range = self.state.range;
        let log_axis = self.state.log_axis;

        let value_axis = plan_value_axis_spaced(
            range.y_min,
            range.y_max,
            area.height(),
            log_axis,
            &self.metrics,
            self.config.engine.min_tick_spacing_px,
        );
        let time_axis = plan_time_axis(
            window.t_min,
            window.t_max,
            area.width(),
            self.config.display.timezone,
            now,
            &self.metrics,
        );

        let gap = line_gap_px(&mapper);
        let series = self
            .variables
            .iter()
            .zip(self.geometry.series())
            .enumerate()
            .map(|(index, (var, geometry))| {
                let written = self.last_written.get(index).copied().unwrap_or(0.0);
                SeriesFrame {
                    index,
                    label: var.label.clone(),
                    colour: var.colour.clone(),
                    visible: self.state.shows(index),
                    segments: geometry.segments(gap),
                    last_value: self.store.series(index).and_then(last_value),
                    no_data_since: (geometry.is_empty() && written > 0.0).then_some(written),
                    geometry: geometry.clone(),
                }
            })
            .collect();

        let marker_label = self
            .state
            .marker
            .map(|m| marker_label(m.value, marker_precision(range.y_min, range.y_max)));
        let future_x = (window.t_max > now).then(|| mapper.time_to_x(now).max(area.x1));
        let average_bin_size =
            (self.store.mode() == SeriesMode::Binned).then(|| self.store.bin_size());

        Frame {
            area,
            window,
            range,
            log_axis,
            value_axis,
            time_axis,
            series,
            marker: self.state.marker,
            marker_label,
            rubber_band: self.interaction.rubber_band(),
            future_x,
            busy: self.scheduler.is_busy(),
            average_bin_size,
            show_zoom_buttons: self.state.show_zoom_buttons,
            status: self.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DAY;
    use crate::interaction::Key;
    use crate::protocol::encode_raw;

    const NOW: f64 = 1_700_000_000.0;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.panel.variables = vec!["Scaler:Rate[0]".into(), "Scaler:Rate[1]".into()];
        config.panel.timescale = "1h".into();
        config
    }

    fn chart() -> HistoryChart {
        HistoryChart::new(config(), 800.0, 400.0).unwrap()
    }

    fn fetches(commands: &[ChartCommand]) -> Vec<FetchRequest> {
        commands
            .iter()
            .filter_map(|c| match c {
                ChartCommand::Fetch(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    fn started() -> (HistoryChart, FetchRequest) {
        let mut chart = chart();
        chart.start(NOW, None);
        let request = fetches(&chart.take_commands()).remove(0);
        (chart, request)
    }

    fn reply(request: &FetchRequest, vars: &[Vec<(f64, f64)>]) -> BackendMessage {
        BackendMessage::FetchCompleted {
            request: request.clone(),
            payload: encode_raw(vars),
        }
    }

    #[test]
    fn test_autoscale_without_data() {
        let range = autoscale(&PanelConfig::default(), None, false);
        assert_eq!((range.y_min0, range.y_max0), (-0.5, 0.5));
        assert!((range.y_min + 0.6).abs() < 1e-12);
        assert!((range.y_max - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_autoscale_pads_and_widens() {
        let range = autoscale(&PanelConfig::default(), Some((0.0, 10.0)), false);
        assert_eq!((range.y_min, range.y_max), (-1.0, 11.0));

        let range = autoscale(&PanelConfig::default(), Some((5.0, 5.0)), false);
        assert_eq!((range.y_min0, range.y_max0), (4.5, 5.5));

        let range = autoscale(&PanelConfig::default(), Some((1.0, 100.0)), true);
        assert_eq!((range.y_min, range.y_max), (0.8, 120.0));

        let range = autoscale(&PanelConfig::default(), Some((-5.0, -1.0)), true);
        assert_eq!(range.y_min, LOG_MIN);
        assert_eq!(range.y_max, LOG_MAX_FLOOR);
    }

    #[test]
    fn test_autoscale_fixed_and_pinned_bounds() {
        let panel = PanelConfig {
            minimum: 0.0,
            maximum: 50.0,
            ..Default::default()
        };
        let range = autoscale(&panel, Some((3.0, 4.0)), false);
        assert_eq!((range.y_min, range.y_max), (0.0, 50.0));

        let panel = PanelConfig {
            zero_ylow: true,
            ..Default::default()
        };
        let range = autoscale(&panel, Some((2.0, 10.0)), false);
        assert_eq!(range.y_min, 0.0);
        assert_eq!(range.y_max, 11.0);
    }

    #[test]
    fn test_autoscale_truncates_infinity() {
        let range = autoscale(&PanelConfig::default(), Some((0.0, f64::INFINITY)), false);
        assert_eq!(range.y_max, f64::MAX);
        assert!(range.y_min.is_finite());
    }

    #[test]
    fn test_start_loads_margin_and_last_written() {
        let mut chart = chart();
        chart.start(NOW, None);
        let commands = chart.take_commands();

        let requests = fetches(&commands);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, FetchKind::Full);
        assert_eq!(requests[0].start, NOW - 3600.0 - 1800.0);
        assert_eq!(requests[0].end, NOW);
        assert!(requests[0].follow);
        assert!(commands.contains(&ChartCommand::QueryLastWritten { before: NOW }));
        assert!(chart.is_busy());
        assert_eq!(chart.state().window, Window::new(NOW - 3600.0, NOW));
    }

    #[test]
    fn test_start_from_query() {
        let mut chart = chart();
        chart.start(NOW, Some("?A=1000&B=2000"));
        assert_eq!(chart.state().window, Window::new(1000.0, 2000.0));
        assert!(!chart.state().scroll);
    }

    #[test]
    fn test_reply_merges_refits_and_arms_live_tail() {
        let (mut chart, request) = started();
        let t = NOW - 100.0;
        chart.apply(reply(&request, &[vec![(t, 5.0), (t + 10.0, 7.0)], vec![]]), NOW);

        assert!(!chart.is_busy());
        assert_eq!(chart.store().series(0).unwrap().len(), 2);
        assert_eq!(chart.state().range.y_min0, 5.0);
        assert_eq!(chart.state().range.y_max0, 7.0);
        assert!(chart
            .take_commands()
            .iter()
            .any(|c| matches!(c, ChartCommand::ScheduleLiveTail(_))));
    }

    #[test]
    fn test_stale_reply_is_ignored() {
        let (mut chart, first) = started();
        chart.zoom_in(NOW);
        let second = fetches(&chart.take_commands()).remove(0);
        assert_eq!(chart.scheduler().pending(), 2);

        chart.apply(reply(&first, &[vec![(NOW - 10.0, 1.0)], vec![]]), NOW);
        assert_eq!(chart.scheduler().pending(), 1);
        assert!(chart.store().is_empty());

        chart.apply(reply(&second, &[vec![(NOW - 10.0, 1.0)], vec![]]), NOW);
        assert_eq!(chart.scheduler().pending(), 0);
        assert_eq!(chart.store().total_points(), 1);
    }

    #[test]
    fn test_protocol_error_alerts_and_keeps_data() {
        let (mut chart, request) = started();
        chart.apply(reply(&request, &[vec![(NOW - 10.0, 1.0)], vec![]]), NOW);

        // drag right by more than the half-window margin
        chart.handle_input(InputEvent::PointerDown { x: 200.0, y: 200.0 }, NOW);
        chart.handle_input(InputEvent::PointerMove { x: 700.0, y: 200.0, buttons_down: true }, NOW);
        let side = fetches(&chart.take_commands());
        assert_eq!(side.len(), 1);

        chart.apply(
            BackendMessage::FetchCompleted {
                request: side[0].clone(),
                payload: vec![1, 2, 3],
            },
            NOW,
        );
        assert!(chart.status().alert.is_some());
        assert_eq!(chart.store().total_points(), 1);
        assert!(!chart.is_busy());
    }

    #[test]
    fn test_transport_error_banner_clears_on_success() {
        let (mut chart, request) = started();
        chart.apply(
            BackendMessage::FetchFailed {
                request: request.clone(),
                error: HistScopeError::Transport("refused".into()),
            },
            NOW,
        );
        assert!(chart.status().banner.is_some());
        assert!(chart.status().alert.is_none());
        assert!(!chart.is_busy());

        chart.reset_axes(NOW);
        let retry = fetches(&chart.take_commands()).remove(0);
        chart.apply(reply(&retry, &[vec![], vec![]]), NOW);
        assert!(chart.status().banner.is_none());
    }

    #[test]
    fn test_zoom_out_refused_while_loading() {
        let (mut chart, request) = started();
        assert!(!chart.zoom_out(NOW));
        assert!(chart.status().alert.is_some());

        chart.apply(reply(&request, &[vec![], vec![]]), NOW);
        assert!(chart.zoom_out(NOW));
        assert_eq!(chart.state().window, Window::new(NOW - 7200.0, NOW));
    }

    #[test]
    fn test_zoom_button_click_notifies() {
        let (mut chart, request) = started();
        chart.apply(reply(&request, &[vec![], vec![]]), NOW);
        chart.take_commands();

        let area = chart.area();
        chart.handle_input(
            InputEvent::PointerDown {
                x: area.x2 - 30.0,
                y: area.y1 - 10.0,
            },
            NOW,
        );
        assert_eq!(chart.state().window, Window::new(NOW - 1800.0, NOW));
        let commands = chart.take_commands();
        assert!(commands.contains(&ChartCommand::Notify(ChartEvent::TimeZoom(Window::new(
            NOW - 1800.0,
            NOW
        )))));
        assert_eq!(fetches(&commands).len(), 1);
    }

    #[test]
    fn test_live_tail_due_follows_now() {
        let (mut chart, request) = started();
        chart.apply(reply(&request, &[vec![], vec![]]), NOW);
        chart.take_commands();

        chart.apply(BackendMessage::LiveTailDue, NOW + 5.0);
        assert_eq!(chart.state().window, Window::new(NOW + 5.0 - 3600.0, NOW + 5.0));
        let commands = chart.take_commands();
        let tail = fetches(&commands);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].kind, FetchKind::LiveTail);
        assert_eq!((tail[0].start, tail[0].end), (NOW, NOW + 5.0));
        assert!(commands
            .iter()
            .any(|c| matches!(c, ChartCommand::ScheduleLiveTail(_))));
    }

    #[test]
    fn test_live_tail_waits_for_outstanding_read() {
        let (mut chart, request) = started();
        chart.apply(reply(&request, &[vec![], vec![]]), NOW);
        chart.take_commands();

        let mut tails = Vec::new();
        for dt in 1..=4 {
            chart.apply(BackendMessage::LiveTailDue, NOW + dt as f64);
            tails.extend(fetches(&chart.take_commands()));
        }
        assert_eq!(tails.len(), 1);
        assert_eq!((tails[0].start, tails[0].end), (NOW, NOW + 1.0));

        chart.apply(reply(&tails[0], &[vec![(NOW + 1.0, 3.0)], vec![]]), NOW + 4.0);
        chart.apply(BackendMessage::LiveTailDue, NOW + 5.0);
        let next = fetches(&chart.take_commands());
        assert_eq!(next.len(), 1);
        assert_eq!((next[0].start, next[0].end), (NOW + 1.0, NOW + 5.0));
    }

    #[test]
    fn test_pan_before_first_reply_fetches_side_data() {
        let (mut chart, request) = started();
        chart.state.scroll = false;
        chart.state.window = Window::new(NOW - 20_000.0, NOW - 16_400.0);
        chart.apply_effect(Effect::Panned, NOW);
        assert!(fetches(&chart.take_commands()).is_empty());

        chart.apply(reply(&request, &[vec![(NOW - 100.0, 1.0)], vec![]]), NOW);
        let side = fetches(&chart.take_commands());
        assert_eq!(side.len(), 1);
        assert_eq!(side[0].kind, FetchKind::SideLeft);
        assert_eq!(side[0].start, NOW - 20_000.0 - 3600.0);
        assert_eq!(side[0].end, request.start);

        // Envelope now covers the window; later replies plan nothing more
        chart.apply(reply(&side[0], &[vec![(NOW - 18_000.0, 2.0)], vec![]]), NOW);
        assert!(fetches(&chart.take_commands()).is_empty());
    }

    #[test]
    fn test_hidden_chart_pauses_live_tail() {
        let (mut chart, request) = started();
        chart.apply(reply(&request, &[vec![], vec![]]), NOW);
        chart.take_commands();

        chart.set_visible(false);
        assert_eq!(chart.take_commands(), vec![ChartCommand::CancelLiveTail]);
        chart.apply(BackendMessage::LiveTailDue, NOW + 5.0);
        assert!(chart.take_commands().is_empty());

        chart.set_visible(true);
        assert!(matches!(
            chart.take_commands().as_slice(),
            [ChartCommand::ScheduleLiveTail(_)]
        ));
    }

    #[test]
    fn test_binned_window_stops_scrolling() {
        let mut chart = chart();
        chart.show_last(30.0 * DAY, NOW);
        let request = fetches(&chart.take_commands()).remove(0);
        assert_eq!(request.mode, SeriesMode::Binned);
        assert!(!chart.state().scroll);
        assert!(!request.follow);
    }

    #[test]
    fn test_jump_to_current_limits_span() {
        let mut chart = chart();
        chart.set_timespan(0.0, 30.0 * DAY, false, NOW);
        chart.jump_to_current(NOW);
        assert_eq!(chart.state().window, Window::new(NOW - 7.0 * DAY, NOW));
        assert!(chart.state().scroll);
    }

    #[test]
    fn test_jump_to_last_written() {
        let (mut chart, _) = started();
        chart.take_commands();
        chart.jump_to_last_written(LastWrittenJump::All, NOW);
        assert_eq!(
            chart.take_commands(),
            vec![ChartCommand::QueryLastWritten { before: NOW }]
        );

        chart.apply(
            BackendMessage::LastWritten {
                before: NOW,
                times: vec![NOW - 50_000.0, NOW - 90_000.0],
            },
            NOW,
        );
        let w = chart.state().window;
        assert_eq!(w.center(), NOW - 90_000.0);
        assert_eq!(w.span(), 3600.0);
        assert!(!chart.state().scroll);
        assert_eq!(chart.last_written(), &[NOW - 50_000.0, NOW - 90_000.0]);
    }

    #[test]
    fn test_keyboard_reset_notifies() {
        let (mut chart, _) = started();
        chart.take_commands();
        chart.handle_input(InputEvent::Key(Key::Char('r')), NOW);
        let commands = chart.take_commands();
        assert!(commands.contains(&ChartCommand::Notify(ChartEvent::ResetAxes)));
        assert!(commands.contains(&ChartCommand::Notify(ChartEvent::WindowQuery(format!(
            "A={}&B={}",
            NOW as i64 - 3600,
            NOW as i64
        )))));
    }

    #[test]
    fn test_toggle_solo_refits() {
        let (mut chart, request) = started();
        chart.apply(
            reply(
                &request,
                &[vec![(NOW - 10.0, 1.0)], vec![(NOW - 10.0, 100.0)]],
            ),
            NOW,
        );
        assert_eq!(chart.state().range.y_max0, 100.0);

        chart.toggle_solo(0);
        assert_eq!(chart.state().solo, Some(0));
        assert_eq!(chart.state().range.y_max0, 1.5);

        chart.toggle_solo(0);
        assert_eq!(chart.state().solo, None);
        chart.toggle_solo(9);
        assert_eq!(chart.state().solo, None);
    }

    #[test]
    fn test_frames_are_coalesced() {
        let (mut chart, request) = started();
        let t0 = Instant::now();
        assert!(chart.frame(t0, NOW).is_some());
        assert!(chart.frame(t0, NOW).is_none());

        chart.apply(reply(&request, &[vec![(NOW - 10.0, 1.0)], vec![]]), NOW);
        assert!(chart.frame(t0 + Duration::from_millis(5), NOW).is_none());
        let frame = chart.frame(t0 + Duration::from_millis(40), NOW).unwrap();
        assert_eq!(frame.series.len(), 2);
        assert_eq!(frame.series[0].geometry.len(), 1);
        assert_eq!(frame.series[0].last_value, Some(1.0));
        assert!(frame.time_axis.is_some());
        assert!(frame.value_axis.is_some());
        assert!(frame.future_x.is_none());
        assert!(!frame.busy);
    }

    #[test]
    fn test_future_is_marked() {
        let mut chart = chart();
        chart.set_timespan(NOW - 1800.0, NOW + 1800.0, false, NOW);
        let frame = chart.render(NOW);
        let x = frame.future_x.unwrap();
        assert!(x > frame.area.x1 && x < frame.area.x2);
    }
}
