use crate::application::availability::AvailabilityMemo;
use crate::domain::drag::{DragEffect, DragPreview, GridSurface, PointerEvent, RescheduleController};
use crate::domain::models::{Appointment, RescheduleIntent};
use crate::infrastructure::activity_log::ActivityLog;
use crate::infrastructure::appointment_store::AppointmentStore;
use crate::infrastructure::error::InfraError;
use std::sync::{Arc, Mutex};

const LOG_COMMAND: &str = "reschedule";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing for the view to do.
    Idle,
    /// A click without movement; the view opens the appointment.
    Opened { appointment_id: String },
    /// Dropped back where it started.
    Unchanged { appointment_id: String },
    Rescheduled(Appointment),
}

/// Routes pointer events through the controller and persists the resulting
/// intents.
pub struct RescheduleDispatcher<S>
where
    S: AppointmentStore,
{
    appointment_store: Arc<S>,
    controller: Mutex<RescheduleController>,
    memo: Option<Arc<AvailabilityMemo>>,
    activity_log: Option<Arc<ActivityLog>>,
}

impl<S> RescheduleDispatcher<S>
where
    S: AppointmentStore,
{
    pub fn new(appointment_store: Arc<S>, surface: GridSurface) -> Self {
        Self {
            appointment_store,
            controller: Mutex::new(RescheduleController::new(surface)),
            memo: None,
            activity_log: None,
        }
    }

    pub fn with_memo(mut self, memo: Arc<AvailabilityMemo>) -> Self {
        self.memo = Some(memo);
        self
    }

    pub fn with_activity_log(mut self, activity_log: Arc<ActivityLog>) -> Self {
        self.activity_log = Some(activity_log);
        self
    }

    pub fn set_surface(&self, surface: GridSurface) -> Result<(), InfraError> {
        self.controller()?.set_surface(surface);
        Ok(())
    }

    pub fn preview(&self) -> Result<Option<DragPreview>, InfraError> {
        Ok(self.controller()?.preview())
    }

    pub fn cancel_gesture(&self) -> Result<(), InfraError> {
        self.controller()?.reset();
        Ok(())
    }

    pub async fn handle_pointer(&self, event: PointerEvent) -> Result<DispatchOutcome, InfraError> {
        // The guard must not live across the store call below.
        let effect = self.controller()?.handle(event);
        match effect {
            DragEffect::None => Ok(DispatchOutcome::Idle),
            DragEffect::Click { appointment_id } => Ok(DispatchOutcome::Opened { appointment_id }),
            DragEffect::Unchanged { appointment_id } => Ok(DispatchOutcome::Unchanged { appointment_id }),
            DragEffect::Reschedule(intent) => self.submit(&intent).await.map(DispatchOutcome::Rescheduled),
        }
    }

    /// Persists an intent, whether it came from a drag or a form.
    pub async fn submit(&self, intent: &RescheduleIntent) -> Result<Appointment, InfraError> {
        if let Err(message) = intent.validate() {
            tracing::warn!(appointment_id = %intent.appointment_id, %message, "rejected reschedule intent");
            self.log_error(&message);
            return Err(InfraError::Store(message));
        }

        let previous_date = self
            .appointment_store
            .get(&intent.appointment_id)
            .await?
            .map(|appointment| appointment.date);

        // A failed write is reported once; the user re-drags to try again.
        let moved = match self.appointment_store.apply_reschedule(intent).await {
            Ok(moved) => moved,
            Err(error) => {
                tracing::warn!(appointment_id = %intent.appointment_id, %error, "reschedule failed");
                self.log_error(&format!("{}: {error}", intent.appointment_id));
                return Err(error);
            }
        };

        if let Some(memo) = &self.memo {
            let mut dates = vec![moved.date];
            dates.extend(previous_date.filter(|date| *date != moved.date));
            memo.invalidate_dates(&dates)?;
        }
        if let Some(activity_log) = &self.activity_log {
            activity_log.info(
                LOG_COMMAND,
                &format!(
                    "{} moved to {} {}",
                    moved.id,
                    moved.date,
                    moved.start_time
                ),
            );
        }
        Ok(moved)
    }

    fn controller(&self) -> Result<std::sync::MutexGuard<'_, RescheduleController>, InfraError> {
        self.controller
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("reschedule controller lock poisoned: {error}")))
    }

    fn log_error(&self, message: &str) {
        if let Some(activity_log) = &self.activity_log {
            activity_log.error(LOG_COMMAND, message);
        }
    }
}
