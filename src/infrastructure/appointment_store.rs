use crate::domain::models::{Appointment, RescheduleIntent};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// Persistence collaborator for local appointments.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, InfraError>;
    async fn get(&self, appointment_id: &str) -> Result<Option<Appointment>, InfraError>;
    /// Persists the move and returns the updated appointment.
    async fn apply_reschedule(&self, intent: &RescheduleIntent) -> Result<Appointment, InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAppointmentStore {
    appointments: Mutex<HashMap<String, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn with_appointments(appointments: impl IntoIterator<Item = Appointment>) -> Result<Self, InfraError> {
        let store = Self::default();
        for appointment in appointments {
            store.insert(appointment)?;
        }
        Ok(store)
    }

    pub fn insert(&self, appointment: Appointment) -> Result<(), InfraError> {
        appointment.validate().map_err(InfraError::Store)?;
        self.lock()?.insert(appointment.id.trim().to_string(), appointment);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Appointment>>, InfraError> {
        self.appointments
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("appointment store lock poisoned: {error}")))
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, InfraError> {
        let mut appointments = self
            .lock()?
            .values()
            .filter(|appointment| appointment.date == date)
            .cloned()
            .collect::<Vec<_>>();
        appointments.sort_by(|left, right| {
            left.start_time
                .cmp(&right.start_time)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(appointments)
    }

    async fn get(&self, appointment_id: &str) -> Result<Option<Appointment>, InfraError> {
        Ok(self.lock()?.get(appointment_id.trim()).cloned())
    }

    async fn apply_reschedule(&self, intent: &RescheduleIntent) -> Result<Appointment, InfraError> {
        intent.validate().map_err(InfraError::Store)?;
        let mut appointments = self.lock()?;
        let appointment = appointments
            .get_mut(intent.appointment_id.trim())
            .ok_or_else(|| InfraError::NotFound(format!("appointment {}", intent.appointment_id)))?;
        if appointment.status.is_cancelled() {
            return Err(InfraError::Store(format!(
                "appointment {} is cancelled and cannot be moved",
                appointment.id
            )));
        }

        appointment.date = intent.new_date;
        appointment.start_time = intent.new_start;
        appointment.end_time = intent.new_end;
        if let Some(provider_id) = &intent.new_provider_id {
            appointment.provider_id = Some(provider_id.clone());
        }
        Ok(appointment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ClockTime;
    use crate::domain::models::AppointmentStatus;

    fn clock(value: &str) -> ClockTime {
        ClockTime::parse(value).expect("valid clock time")
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn appointment(id: &str, day: &str, start: &str) -> Appointment {
        Appointment {
            id: id.to_string(),
            provider_id: Some("dr-a".to_string()),
            date: date(day),
            start_time: clock(start),
            end_time: Some(ClockTime::from_minutes_wrapping(clock(start).minutes() + 30)),
            status: AppointmentStatus::Scheduled,
            patient_name: None,
            external_event_id: None,
        }
    }

    fn intent(id: &str) -> RescheduleIntent {
        RescheduleIntent {
            appointment_id: id.to_string(),
            new_date: date("2024-01-11"),
            new_start: clock("14:00"),
            new_end: Some(clock("14:30")),
            new_provider_id: Some("dr-b".to_string()),
        }
    }

    #[tokio::test]
    async fn list_for_date_is_sorted_by_start_time() {
        let store = InMemoryAppointmentStore::with_appointments([
            appointment("late", "2024-01-10", "15:00"),
            appointment("early", "2024-01-10", "09:30"),
            appointment("other-day", "2024-01-11", "10:00"),
        ])
        .expect("seed store");

        let ids = store
            .list_for_date(date("2024-01-10"))
            .await
            .expect("list")
            .into_iter()
            .map(|appointment| appointment.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
    }

    #[tokio::test]
    async fn apply_reschedule_moves_appointment() {
        let store = InMemoryAppointmentStore::with_appointments([appointment("apt-1", "2024-01-10", "10:00")])
            .expect("seed store");

        let moved = store.apply_reschedule(&intent("apt-1")).await.expect("reschedule");
        assert_eq!(moved.date, date("2024-01-11"));
        assert_eq!(moved.start_time, clock("14:00"));
        assert_eq!(moved.end_time, Some(clock("14:30")));
        assert_eq!(moved.provider_id.as_deref(), Some("dr-b"));
        assert_eq!(store.get("apt-1").await.expect("get"), Some(moved));
    }

    #[tokio::test]
    async fn apply_reschedule_rejects_unknown_and_cancelled_appointments() {
        let mut cancelled = appointment("apt-2", "2024-01-10", "11:00");
        cancelled.status = AppointmentStatus::Cancelled;
        let store = InMemoryAppointmentStore::with_appointments([cancelled]).expect("seed store");

        assert!(matches!(
            store.apply_reschedule(&intent("missing")).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            store.apply_reschedule(&intent("apt-2")).await,
            Err(InfraError::Store(_))
        ));
    }

    #[test]
    fn insert_rejects_invalid_appointment() {
        let store = InMemoryAppointmentStore::default();
        let mut invalid = appointment("apt-3", "2024-01-10", "10:00");
        invalid.end_time = Some(clock("09:00"));
        assert!(store.insert(invalid).is_err());
    }
}
