use crate::application::availability::AvailabilityService;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::reschedule::{DispatchOutcome, RescheduleDispatcher};
use crate::domain::clock::BlockLayout;
use crate::domain::drag::{ColumnTarget, GridColumn, GridSurface, PointerEvent};
use crate::domain::models::{Appointment, BusyBucket, RescheduleIntent, WeeklyScheduleRule};
use crate::domain::palette::{PaletteEntry, ProviderPalette};
use crate::infrastructure::activity_log::ActivityLog;
use crate::infrastructure::appointment_store::{AppointmentStore, InMemoryAppointmentStore};
use crate::infrastructure::calendar_cache::InMemoryCalendarCacheRepository;
use crate::infrastructure::config::SchedulingConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::ExternalCalendarRecord;
use crate::infrastructure::schedule_rules::{InMemoryScheduleRuleRepository, ScheduleRuleRepository};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

type Availability =
    AvailabilityService<InMemoryAppointmentStore, InMemoryScheduleRuleRepository, InMemoryCalendarCacheRepository>;

/// Everything a host application needs for one clinic workspace.
pub struct SchedulingState {
    workspace_root: PathBuf,
    config: SchedulingConfig,
    clinic_timezone: Tz,
    appointment_store: Arc<InMemoryAppointmentStore>,
    schedule_rules: Arc<InMemoryScheduleRuleRepository>,
    availability: Availability,
    dispatcher: RescheduleDispatcher<InMemoryAppointmentStore>,
    palette: RwLock<ProviderPalette>,
    activity_log: Arc<ActivityLog>,
}

impl SchedulingState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = bootstrap.config;
        let clinic_timezone = config.clinic_timezone()?;
        let activity_log = Arc::new(ActivityLog::new(bootstrap.logs_dir));

        let appointment_store = Arc::new(InMemoryAppointmentStore::default());
        let schedule_rules = Arc::new(InMemoryScheduleRuleRepository::default());
        let availability = AvailabilityService::new(
            Arc::clone(&appointment_store),
            Arc::clone(&schedule_rules),
            Arc::new(InMemoryCalendarCacheRepository::default()),
        )
        .with_policy(config.availability_policy());
        let dispatcher = RescheduleDispatcher::new(Arc::clone(&appointment_store), surface_for(&config, Vec::new(), true))
            .with_memo(availability.memo())
            .with_activity_log(Arc::clone(&activity_log));

        Ok(Self {
            workspace_root,
            config,
            clinic_timezone,
            appointment_store,
            schedule_rules,
            availability,
            dispatcher,
            palette: RwLock::new(ProviderPalette::default()),
            activity_log,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.activity_log.info(command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.activity_log.error(command, message);
    }
}

pub async fn list_busy_buckets_impl(
    state: &SchedulingState,
    provider_id: Option<String>,
    date: String,
    exclude_appointment_id: Option<String>,
) -> Result<Vec<BusyBucket>, InfraError> {
    let date = parse_date_input(&date, "date")?;
    state
        .availability
        .busy_buckets(provider_id.as_deref(), date, exclude_appointment_id.as_deref())
        .await
}

pub async fn list_free_start_times_impl(
    state: &SchedulingState,
    provider_id: Option<String>,
    date: String,
    exclude_appointment_id: Option<String>,
) -> Result<Vec<String>, InfraError> {
    let date = parse_date_input(&date, "date")?;
    let free = state
        .availability
        .free_start_times(provider_id.as_deref(), date, exclude_appointment_id.as_deref())
        .await?;
    Ok(free.into_iter().map(|time| time.to_string()).collect())
}

pub fn ingest_external_records_impl(
    state: &SchedulingState,
    records: Vec<ExternalCalendarRecord>,
) -> Result<usize, InfraError> {
    let applied = state
        .availability
        .apply_external_records(&records, state.clinic_timezone)?;
    state.log_info(
        "ingest_external_records",
        &format!("applied {applied} external calendar records"),
    );
    Ok(applied)
}

pub async fn save_appointment_impl(
    state: &SchedulingState,
    appointment: Appointment,
) -> Result<Appointment, InfraError> {
    let previous_date = state
        .appointment_store
        .get(&appointment.id)
        .await?
        .map(|existing| existing.date);
    state.appointment_store.insert(appointment.clone())?;

    let mut dates = vec![appointment.date];
    dates.extend(previous_date.filter(|date| *date != appointment.date));
    state.availability.memo().invalidate_dates(&dates)?;
    state.log_info("save_appointment", &format!("saved {}", appointment.id));
    Ok(appointment)
}

pub fn set_schedule_rules_impl(
    state: &SchedulingState,
    provider_id: String,
    rules: Vec<WeeklyScheduleRule>,
) -> Result<usize, InfraError> {
    let count = rules.len();
    state.schedule_rules.replace_for_provider(&provider_id, rules)?;
    state.availability.memo().invalidate_all()?;
    state.log_info(
        "set_schedule_rules",
        &format!("provider_id={} rules={count}", provider_id.trim()),
    );
    Ok(count)
}

pub fn set_provider_roster_impl(state: &SchedulingState, roster: Vec<String>) -> Result<usize, InfraError> {
    let palette = ProviderPalette::from_roster(&roster);
    let assigned = palette.len();
    let mut current = state
        .palette
        .write()
        .map_err(|error| InfraError::LockPoisoned(format!("palette lock poisoned: {error}")))?;
    *current = palette;
    Ok(assigned)
}

pub fn provider_color_impl(
    state: &SchedulingState,
    provider_id: Option<String>,
) -> Result<&'static PaletteEntry, InfraError> {
    let palette = state
        .palette
        .read()
        .map_err(|error| InfraError::LockPoisoned(format!("palette lock poisoned: {error}")))?;
    Ok(palette.entry_for(provider_id.as_deref()))
}

/// Positions every non-cancelled appointment of `date` into the given columns.
pub async fn layout_day_impl(
    state: &SchedulingState,
    date: String,
    columns: Vec<ColumnTarget>,
) -> Result<Vec<BlockLayout>, InfraError> {
    let date = parse_date_input(&date, "date")?;
    let geometry = state.config.grid_geometry();
    let appointments = state.appointment_store.list_for_date(date).await?;

    Ok(appointments
        .iter()
        .filter(|appointment| !appointment.status.is_cancelled())
        .filter_map(|appointment| {
            let column = columns.iter().position(|target| match target {
                ColumnTarget::Day(day) => *day == appointment.date,
                ColumnTarget::Provider { provider_id } => appointment.belongs_to(provider_id),
            })?;
            Some(BlockLayout::for_appointment(
                &geometry,
                appointment.id.as_str(),
                column,
                appointment.start_time,
                appointment.end_time,
            ))
        })
        .collect())
}

pub fn set_grid_columns_impl(
    state: &SchedulingState,
    columns: Vec<GridColumn>,
    can_reschedule: bool,
) -> Result<(), InfraError> {
    state
        .dispatcher
        .set_surface(surface_for(&state.config, columns, can_reschedule))
}

pub async fn pointer_event_impl(
    state: &SchedulingState,
    event: PointerEvent,
) -> Result<DispatchOutcome, InfraError> {
    state.dispatcher.handle_pointer(event).await
}

pub async fn reschedule_appointment_impl(
    state: &SchedulingState,
    intent: RescheduleIntent,
) -> Result<Appointment, InfraError> {
    state.dispatcher.submit(&intent).await
}

fn surface_for(config: &SchedulingConfig, columns: Vec<GridColumn>, can_reschedule: bool) -> GridSurface {
    let mut surface = GridSurface::new(config.grid_geometry(), columns);
    surface.drag_threshold_px = config.drag_threshold_px;
    surface.can_reschedule = can_reschedule;
    surface
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| InfraError::InvalidRecord(format!("{field_name} must be YYYY-MM-DD: {error}")))
}
