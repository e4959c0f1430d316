//! Pointer-gesture state machine that turns a drag over the calendar grid
//! into a reschedule intent.
//!
//! `transition` is pure: it takes the current state and one pointer event and
//! returns the next state plus the effect the view should act on.
//! `RescheduleController` wraps it for views that keep one controller per
//! interactive surface.

use crate::domain::clock::{BlockLayout, ClockTime, GridGeometry};
use crate::domain::models::{Appointment, RescheduleIntent};
use chrono::NaiveDate;

pub const DEFAULT_DRAG_THRESHOLD_PX: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnTarget {
    /// Day and week grids: one column per date.
    Day(NaiveDate),
    /// Provider-column grids: one column per provider on a single date.
    Provider { provider_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridColumn {
    pub left: f64,
    pub right: f64,
    pub target: ColumnTarget,
}

impl GridColumn {
    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.left && x < self.right
    }
}

/// Everything the controller needs to know about the rendered grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSurface {
    pub geometry: GridGeometry,
    pub columns: Vec<GridColumn>,
    pub can_reschedule: bool,
    pub drag_threshold_px: f64,
}

impl GridSurface {
    pub fn new(geometry: GridGeometry, columns: Vec<GridColumn>) -> Self {
        Self {
            geometry,
            columns,
            can_reschedule: true,
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.can_reschedule = false;
        self
    }

    fn column_at(&self, x: f64) -> Option<usize> {
        self.columns.iter().position(|column| column.contains_x(x))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraggedAppointment {
    pub id: String,
    pub provider_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: Option<ClockTime>,
}

impl From<&Appointment> for DraggedAppointment {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id.clone(),
            provider_id: appointment.provider_id.clone(),
            date: appointment.date,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
        }
    }
}

impl DraggedAppointment {
    fn explicit_duration_minutes(&self) -> Option<i32> {
        self.end_time
            .map(|end| end.minutes() - self.start_time.minutes())
            .filter(|duration| *duration > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Down {
        appointment: DraggedAppointment,
        column: usize,
        button: PointerButton,
        position: Point,
    },
    Move {
        position: Point,
    },
    Up,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub appointment: DraggedAppointment,
    pub origin_y: f64,
    pub origin_top: f64,
    pub block_height: f64,
    pub origin_column: usize,
    pub preview_top: f64,
    pub target_column: usize,
    pub exceeded_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Armed(DragSession),
    Dragging(DragSession),
}

impl DragState {
    pub fn session(&self) -> Option<&DragSession> {
        match self {
            DragState::Idle => None,
            DragState::Armed(session) | DragState::Dragging(session) => Some(session),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEffect {
    None,
    /// Released without crossing the movement threshold; open the detail view.
    Click { appointment_id: String },
    /// A real drag that landed where it started; the click is suppressed.
    Unchanged { appointment_id: String },
    Reschedule(RescheduleIntent),
}

impl DragEffect {
    pub fn intent(&self) -> Option<&RescheduleIntent> {
        match self {
            DragEffect::Reschedule(intent) => Some(intent),
            _ => None,
        }
    }

    pub fn into_intent(self) -> Option<RescheduleIntent> {
        match self {
            DragEffect::Reschedule(intent) => Some(intent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragPreview {
    pub top: f64,
    pub height: f64,
    pub column: usize,
}

pub fn transition(
    state: DragState,
    event: PointerEvent,
    surface: &GridSurface,
) -> (DragState, DragEffect) {
    match (state, event) {
        (
            DragState::Idle,
            PointerEvent::Down {
                appointment,
                column,
                button,
                position,
            },
        ) => {
            if !surface.can_reschedule || button != PointerButton::Primary {
                return (DragState::Idle, DragEffect::None);
            }
            (DragState::Armed(arm(surface, appointment, column, position)), DragEffect::None)
        }
        (DragState::Armed(mut session), PointerEvent::Move { position }) => {
            if (position.y - session.origin_y).abs() <= surface.drag_threshold_px {
                return (DragState::Armed(session), DragEffect::None);
            }
            session.exceeded_threshold = true;
            update_preview(&mut session, surface, position);
            (DragState::Dragging(session), DragEffect::None)
        }
        (DragState::Dragging(mut session), PointerEvent::Move { position }) => {
            update_preview(&mut session, surface, position);
            (DragState::Dragging(session), DragEffect::None)
        }
        (DragState::Armed(session), PointerEvent::Up) => (
            DragState::Idle,
            DragEffect::Click {
                appointment_id: session.appointment.id,
            },
        ),
        (DragState::Dragging(session), PointerEvent::Up) => {
            (DragState::Idle, resolve_drop(session, surface))
        }
        // One session per surface; stray moves and releases are ignored.
        (state, _) => (state, DragEffect::None),
    }
}

fn arm(
    surface: &GridSurface,
    appointment: DraggedAppointment,
    column: usize,
    position: Point,
) -> DragSession {
    let column = surface.column_at(position.x).unwrap_or(column);
    let layout = BlockLayout::for_appointment(
        &surface.geometry,
        appointment.id.clone(),
        column,
        appointment.start_time,
        appointment.end_time,
    );
    DragSession {
        appointment,
        origin_y: position.y,
        origin_top: layout.span.top,
        block_height: layout.span.height,
        origin_column: column,
        preview_top: layout.span.top,
        target_column: column,
        exceeded_threshold: false,
    }
}

fn update_preview(session: &mut DragSession, surface: &GridSurface, position: Point) {
    session.target_column = surface.column_at(position.x).unwrap_or(session.origin_column);
    let max_top = (surface.geometry.total_height() - session.block_height).max(0.0);
    let delta = position.y - session.origin_y;
    session.preview_top = (session.origin_top + delta).clamp(0.0, max_top);
}

fn resolve_drop(session: DragSession, surface: &GridSurface) -> DragEffect {
    let original = &session.appointment;
    let new_start = if session.preview_top == session.origin_top {
        original.start_time
    } else {
        ClockTime::from_minutes_wrapping(drop_start_minutes(&session, &surface.geometry))
    };
    let new_end = original
        .explicit_duration_minutes()
        .map(|duration| ClockTime::from_minutes_wrapping(new_start.minutes() + duration));

    let target = surface
        .columns
        .get(session.target_column)
        .or_else(|| surface.columns.get(session.origin_column))
        .map(|column| &column.target);
    let (new_date, new_provider_id) = match target {
        Some(ColumnTarget::Day(date)) => (*date, None),
        Some(ColumnTarget::Provider { provider_id }) => (
            original.date,
            Some(provider_id.clone()).filter(|id| original.provider_id.as_ref() != Some(id)),
        ),
        None => (original.date, None),
    };

    if new_date == original.date && new_start == original.start_time && new_provider_id.is_none() {
        return DragEffect::Unchanged {
            appointment_id: session.appointment.id,
        };
    }

    DragEffect::Reschedule(RescheduleIntent {
        appointment_id: session.appointment.id,
        new_date,
        new_start,
        new_end,
        new_provider_id,
    })
}

/// Snapped start for a moved block, pulled back onto the grid so the
/// original duration still ends inside the visible window.
fn drop_start_minutes(session: &DragSession, geometry: &GridGeometry) -> i32 {
    let snapped = geometry.snapped_minutes_at(session.preview_top);
    let duration = session.appointment.explicit_duration_minutes().unwrap_or(0);
    let step = geometry.snap_minutes.max(1);
    let latest = (geometry.window_end.minutes() - duration).div_euclid(step) * step;
    snapped.min(latest).max(0)
}

/// Holds the active gesture for one interactive surface.
#[derive(Debug, Clone)]
pub struct RescheduleController {
    surface: GridSurface,
    state: DragState,
}

impl RescheduleController {
    pub fn new(surface: GridSurface) -> Self {
        Self {
            surface,
            state: DragState::Idle,
        }
    }

    pub fn handle(&mut self, event: PointerEvent) -> DragEffect {
        let state = std::mem::take(&mut self.state);
        let (next, effect) = transition(state, event, &self.surface);
        self.state = next;
        effect
    }

    /// Releases any active session without emitting an intent.
    pub fn reset(&mut self) {
        self.state = DragState::Idle;
    }

    /// Replaces the grid layout, e.g. after a resize. Column bounds are
    /// re-read on every move, so an active drag keeps going.
    pub fn set_surface(&mut self, surface: GridSurface) {
        self.surface = surface;
    }

    pub fn surface(&self) -> &GridSurface {
        &self.surface
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn preview(&self) -> Option<DragPreview> {
        match &self.state {
            DragState::Dragging(session) => Some(DragPreview {
                top: session.preview_top,
                height: session.block_height,
                column: session.target_column,
            }),
            _ => None,
        }
    }
}
