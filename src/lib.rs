//! Availability and rescheduling engine for clinic calendars.
//!
//! The `domain` layer is pure: busy-bucket aggregation, time-grid geometry,
//! provider colors and the drag-to-reschedule state machine. `infrastructure`
//! holds config, logging and the repository seams, and `application` wires
//! them into services a host application calls.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::availability::{AvailabilityMemo, AvailabilityService};
pub use application::commands::SchedulingState;
pub use application::reschedule::{DispatchOutcome, RescheduleDispatcher};
pub use domain::busy::{compute_busy_buckets, compute_busy_report, AvailabilityPolicy, BusyReport, ScheduleSnapshot};
pub use domain::clock::{snap_to_grid, to_clock_string, to_minutes, ClockFormatError, ClockTime};
pub use domain::drag::{transition, DragEffect, DragState, PointerEvent, RescheduleController};
pub use domain::models::{
    Appointment, AppointmentStatus, BusyBucket, ExternalBusyEvent, RescheduleIntent, WeeklyScheduleRule,
};
pub use domain::palette::{color_for, ProviderPalette};
pub use infrastructure::error::InfraError;
