//! Pointer, wheel and keyboard handling
//!
//! [`Interaction`] turns input events into changes of [`ChartState`] plus
//! an [`Effect`] telling the controller what to do next: fetch side data
//! after a pan, reload after a zoom, search for a marker, and so on. It
//! never touches the store or the network itself.
//!
//! ```text
//!   Idle ──down in plot──▶ Dragging ──up──▶ Idle (side fetch)
//!   Idle ──down below────▶ ZoomX ────up──▶ Idle (reload if > dead zone)
//!   Idle ──down left─────▶ ZoomY ────up──▶ Idle (pin range if > dead zone)
//!   Idle ◀──move──▶ MarkerHover
//! ```

use crate::config::EngineSettings;
use crate::mapper::CoordinateMapper;
use crate::state::ChartState;
use crate::types::{ValueRange, Window};

/// Keyboard modifiers held during a wheel event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    fn zooms_time(&self) -> bool {
        self.ctrl || self.meta
    }

    fn zooms_value(&self) -> bool {
        self.alt || self.shift
    }
}

/// Keys with chart bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
}

/// Input in canvas pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    /// `buttons_down` is false when no button is held, which cancels a
    /// gesture whose release was missed
    PointerMove { x: f64, y: f64, buttons_down: bool },
    PointerUp { x: f64, y: f64 },
    DoubleClick { x: f64, y: f64 },
    Wheel {
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
        modifiers: Modifiers,
    },
    Key(Key),
}

/// What the controller has to do after an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Redraw { force: bool },
    /// Value range settings changed; autoscale again
    Refit,
    /// Window moved without changing its span; fetch side data
    Panned,
    /// Window changed; reload everything
    Reload,
    /// Pointer is hovering; look for a marker
    Hover { x: f64, y: f64 },
    ToggleSoloAt { x: f64, y: f64 },
    JumpToCurrent,
    ResetAxes,
}

/// Axis a rubber band selects on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomAxis {
    Time,
    Value,
}

/// Rubber band in progress, in pixels along its axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubberBand {
    pub axis: ZoomAxis,
    pub from: f64,
    /// `None` until the pointer moves
    pub to: Option<f64>,
    /// Time or value under `from`
    start_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragStart {
    x: f64,
    y: f64,
    window: Window,
    range: ValueRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Dragging(DragStart),
    ZoomX(RubberBand),
    ZoomY(RubberBand),
    MarkerHover,
}

/// Interaction state machine for one chart
#[derive(Debug, Clone)]
pub struct Interaction {
    state: InteractionState,
    dead_zone_px: f64,
    time_zoom_limit: f64,
    value_zoom_limit: f64,
    value_ratio_limit: f64,
}

impl Interaction {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            state: InteractionState::Idle,
            dead_zone_px: settings.zoom_dead_zone_px,
            time_zoom_limit: settings.wheel_time_zoom_limit,
            value_zoom_limit: settings.wheel_value_zoom_limit,
            value_ratio_limit: settings.value_zoom_ratio_limit,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, InteractionState::Dragging(_))
    }

    /// Active rubber band, for drawing
    pub fn rubber_band(&self) -> Option<RubberBand> {
        match self.state {
            InteractionState::ZoomX(band) | InteractionState::ZoomY(band) => Some(band),
            _ => None,
        }
    }

    /// Record the outcome of a marker search
    pub fn set_hovering(&mut self, hovering: bool) {
        match self.state {
            InteractionState::Idle if hovering => self.state = InteractionState::MarkerHover,
            InteractionState::MarkerHover if !hovering => self.state = InteractionState::Idle,
            _ => {}
        }
    }

    pub fn handle(
        &mut self,
        event: InputEvent,
        chart: &mut ChartState,
        mapper: &CoordinateMapper,
    ) -> Option<Effect> {
        match event {
            InputEvent::PointerDown { x, y } => self.pointer_down(x, y, chart, mapper),
            InputEvent::PointerMove { x, y, buttons_down } => {
                let gesture = !matches!(
                    self.state,
                    InteractionState::Idle | InteractionState::MarkerHover
                );
                if gesture && !buttons_down {
                    self.pointer_up(chart, mapper)
                } else {
                    self.pointer_move(x, y, chart, mapper)
                }
            }
            InputEvent::PointerUp { .. } => self.pointer_up(chart, mapper),
            InputEvent::DoubleClick { x, y } => Some(Effect::ToggleSoloAt { x, y }),
            InputEvent::Wheel {
                x,
                y,
                delta_x,
                delta_y,
                modifiers,
            } => self.wheel(x, y, delta_x, delta_y, modifiers, chart, mapper),
            InputEvent::Key(key) => Self::key(key, chart),
        }
    }

    fn pointer_down(
        &mut self,
        x: f64,
        y: f64,
        chart: &mut ChartState,
        mapper: &CoordinateMapper,
    ) -> Option<Effect> {
        let area = mapper.area;

        if area.contains(x, y) {
            chart.marker = None;
            chart.scroll = false;
            self.state = InteractionState::Dragging(DragStart {
                x,
                y,
                window: chart.window,
                range: chart.range,
            });
        } else if x > area.x1 && x < area.x2 && y > area.y1 {
            chart.scroll = false;
            self.state = InteractionState::ZoomX(RubberBand {
                axis: ZoomAxis::Time,
                from: x,
                to: None,
                start_value: mapper.x_to_time(x),
            });
        } else if y < area.y1 && y > area.y2 && x < area.x1 {
            chart.scroll = false;
            self.state = InteractionState::ZoomY(RubberBand {
                axis: ZoomAxis::Value,
                from: y,
                to: None,
                start_value: mapper.y_to_value(y),
            });
        }
        None
    }

    fn pointer_move(
        &mut self,
        x: f64,
        y: f64,
        chart: &mut ChartState,
        mapper: &CoordinateMapper,
    ) -> Option<Effect> {
        let area = mapper.area;
        match &mut self.state {
            InteractionState::Dragging(start) => {
                let span = start.window.span();
                let dt = ((x - start.x) / area.width() * span).round();
                chart.window = start.window.shifted(-dt);

                if chart.y_zoom {
                    let dy = (start.y - y) / area.height() * start.range.span();
                    chart.range.y_min = start.range.y_min - dy;
                    chart.range.y_max = start.range.y_max - dy;
                    chart.clamp_log_range();
                }
                Some(Effect::Panned)
            }
            InteractionState::ZoomX(band) => {
                band.to = Some(x.clamp(area.x1, area.x2));
                Some(Effect::Redraw { force: true })
            }
            InteractionState::ZoomY(band) => {
                band.to = Some(y.clamp(area.y2, area.y1));
                Some(Effect::Redraw { force: true })
            }
            InteractionState::Idle | InteractionState::MarkerHover => Some(Effect::Hover { x, y }),
        }
    }

    fn pointer_up(&mut self, chart: &mut ChartState, mapper: &CoordinateMapper) -> Option<Effect> {
        let state = std::mem::take(&mut self.state);
        match state {
            InteractionState::Dragging(_) => Some(Effect::Panned),
            InteractionState::ZoomX(band) => {
                let to = band.to.filter(|to| (to - band.from).abs() > self.dead_zone_px)?;
                let mut t1 = band.start_value;
                let mut t2 = mapper.x_to_time(to);
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                if t2 - t1 < 1.0 {
                    t1 -= 1.0;
                }
                chart.window = Window::new(t1, t2);
                Some(Effect::Reload)
            }
            InteractionState::ZoomY(band) => {
                let Some(to) = band.to.filter(|to| (to - band.from).abs() > self.dead_zone_px)
                else {
                    return Some(Effect::Redraw { force: true });
                };
                let mut v1 = band.start_value;
                let mut v2 = mapper.y_to_value(to);
                if v1 > v2 {
                    std::mem::swap(&mut v1, &mut v2);
                }
                chart.range.y_min = v1;
                chart.range.y_max = v2;
                chart.y_zoom = true;
                Some(Effect::Refit)
            }
            InteractionState::Idle | InteractionState::MarkerHover => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn wheel(
        &mut self,
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
        modifiers: Modifiers,
        chart: &mut ChartState,
        mapper: &CoordinateMapper,
    ) -> Option<Effect> {
        let area = mapper.area;
        if !area.contains(x, y) {
            return None;
        }

        let effect = if modifiers.zooms_value() {
            chart.y_zoom = true;
            let f = (y - area.y1) / (area.y2 - area.y1);
            self.zoom_value(f, delta_y, chart);
            Effect::Redraw { force: false }
        } else if modifiers.zooms_time() {
            chart.show_zoom_buttons = false;
            let f = (x - area.x1) / area.width();
            if !self.zoom_time(f, delta_y, chart) {
                return None;
            }
            Effect::Reload
        } else if delta_x != 0.0 {
            let dt = chart.window.span() / 1000.0 * delta_x;
            chart.window = chart.window.shifted(dt);
            Effect::Panned
        } else {
            return None;
        };

        chart.marker = None;
        if matches!(self.state, InteractionState::MarkerHover) {
            self.state = InteractionState::Idle;
        }
        Some(effect)
    }

    /// Zoom the time axis about fraction `f` of the plot width. Scrolling
    /// charts keep their right edge on the present.
    fn zoom_time(&self, f: f64, delta_y: f64, chart: &mut ChartState) -> bool {
        if delta_y == 0.0 {
            return false;
        }
        let span = chart.window.span();
        let m = (delta_y / 100.0).clamp(-self.time_zoom_limit, self.time_zoom_limit);
        let dt_min = (f * span * m).abs();
        let dt_max = ((1.0 - f) * span * m).abs();

        let window = &mut chart.window;
        if delta_y < 0.0 {
            window.t_min += dt_min;
            if !chart.scroll {
                window.t_max -= dt_max;
            }
        } else {
            window.t_min -= dt_min;
            if !chart.scroll {
                window.t_max += dt_max;
            }
        }
        true
    }

    /// Zoom the value axis about fraction `f` of the plot height. Refused
    /// when the result would invert or leave the allowed ratio to the
    /// autoscaled span.
    fn zoom_value(&self, f: f64, delta_y: f64, chart: &mut ChartState) -> bool {
        let range = chart.range;
        let step = (delta_y / 100.0).clamp(-self.value_zoom_limit, self.value_zoom_limit);
        let span = range.span();

        let mut candidate = chart.clone();
        candidate.range.y_min = range.y_min - f * span * step;
        candidate.range.y_max = range.y_max + (1.0 - f) * span * step;
        candidate.clamp_log_range();

        let new_span = candidate.range.span();
        let base = range.y_max0 - range.y_min0;
        let limit = self.value_ratio_limit;
        let accepted = candidate.range.y_max > candidate.range.y_min
            && new_span / base < limit
            && base / new_span < limit;

        if accepted {
            chart.range = candidate.range;
        }
        accepted
    }

    fn key(key: Key, chart: &mut ChartState) -> Option<Effect> {
        match key {
            Key::Char('u') => Some(Effect::JumpToCurrent),
            Key::Char('r') => Some(Effect::ResetAxes),
            Key::Escape => {
                chart.solo = None;
                Some(Effect::Refit)
            }
            Key::Char('y') => {
                chart.y_zoom = false;
                Some(Effect::Refit)
            }
            Key::Char(_) => None,
        }
    }
}
