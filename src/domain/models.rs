use crate::domain::clock::ClockTime;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancelled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub provider_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: Option<ClockTime>,
    pub status: AppointmentStatus,
    pub patient_name: Option<String>,
    /// Id of the external calendar event this appointment was mirrored to.
    pub external_event_id: Option<String>,
}

impl Appointment {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "appointment.id")?;
        if let Some(provider_id) = &self.provider_id {
            validate_non_empty(provider_id, "appointment.provider_id")?;
        }
        if let Some(end_time) = self.end_time {
            if end_time <= self.start_time {
                return Err("appointment.end_time must be after appointment.start_time".to_string());
            }
        }
        Ok(())
    }

    pub fn belongs_to(&self, provider_id: &str) -> bool {
        self.provider_id.as_deref() == Some(provider_id)
    }

    pub fn explicit_duration_minutes(&self) -> Option<i32> {
        self.end_time
            .map(|end| end.minutes() - self.start_time.minutes())
            .filter(|duration| *duration > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalBusyEvent {
    pub id: String,
    pub provider_id: Option<String>,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub status: String,
    pub title: Option<String>,
}

impl ExternalBusyEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "external_event.id")?;
        if let Some(end) = self.end {
            if end <= self.start {
                return Err("external_event.end must be after external_event.start".to_string());
            }
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("cancelled")
    }

    /// An event without a provider applies to every provider.
    pub fn applies_to(&self, provider_id: &str) -> bool {
        self.provider_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .is_none_or(|value| value == provider_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyScheduleRule {
    pub provider_id: String,
    /// 0 = Sunday through 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub is_active: bool,
}

impl WeeklyScheduleRule {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.provider_id, "schedule_rule.provider_id")?;
        if self.day_of_week > 6 {
            return Err("schedule_rule.day_of_week must be within 0..=6".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("schedule_rule.end_time must be after schedule_rule.start_time".to_string());
        }
        Ok(())
    }

    pub fn covers(&self, time: ClockTime) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BusyReasonKind {
    ExternalConflict,
    LocalConflict,
    OutsideWorkingHours,
    NotWorkingThisDay,
}

impl BusyReasonKind {
    pub fn is_explicit_conflict(self) -> bool {
        matches!(self, Self::ExternalConflict | Self::LocalConflict)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusyBucket {
    pub time: ClockTime,
    pub reason: String,
    #[serde(skip)]
    pub kind: Option<BusyReasonKind>,
}

/// Proposed move of an appointment, handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RescheduleIntent {
    pub appointment_id: String,
    pub new_date: NaiveDate,
    pub new_start: ClockTime,
    pub new_end: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_provider_id: Option<String>,
}

impl RescheduleIntent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.appointment_id, "intent.appointment_id")?;
        if let Some(end) = self.new_end {
            if end <= self.new_start {
                return Err("intent.new_end must be after intent.new_start".to_string());
            }
        }
        Ok(())
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
