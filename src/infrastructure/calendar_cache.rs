use crate::domain::models::ExternalBusyEvent;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_external_record, ExternalCalendarRecord};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Mutex;

/// Local mirror of the external calendar feed.
pub trait CalendarCacheRepository: Send + Sync {
    fn get_by_id(&self, event_id: &str) -> Result<Option<ExternalBusyEvent>, InfraError>;
    fn upsert(&self, event: &ExternalBusyEvent) -> Result<(), InfraError>;
    fn remove(&self, event_id: &str) -> Result<(), InfraError>;
    fn list_all(&self) -> Result<Vec<ExternalBusyEvent>, InfraError>;

    /// Events touching `date`, sorted by start.
    fn list_for_date(&self, date: NaiveDate) -> Result<Vec<ExternalBusyEvent>, InfraError> {
        let mut events = self
            .list_all()?
            .into_iter()
            .filter(|event| touches_date(event, date))
            .collect::<Vec<_>>();
        events.sort_by(|left, right| left.start.cmp(&right.start).then_with(|| left.id.cmp(&right.id)));
        Ok(events)
    }

    /// Applies one feed record; a cancelled record drops its cached entry.
    fn apply_record(&self, record: &ExternalCalendarRecord, clinic_timezone: Tz) -> Result<(), InfraError> {
        if record.is_cancelled() {
            return self.remove(&record.id);
        }
        let event = decode_external_record(record, clinic_timezone)?;
        self.upsert(&event)
    }
}

fn touches_date(event: &ExternalBusyEvent, date: NaiveDate) -> bool {
    let start_date = event.start.date();
    let end_date = event.end.map(|end| end.date()).unwrap_or(start_date);
    start_date <= date && date <= end_date
}

#[derive(Debug, Default)]
pub struct InMemoryCalendarCacheRepository {
    events: Mutex<HashMap<String, ExternalBusyEvent>>,
}

impl InMemoryCalendarCacheRepository {
    fn normalized_id(event_id: &str) -> Option<String> {
        let normalized = event_id.trim();
        if normalized.is_empty() {
            return None;
        }
        Some(normalized.to_string())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ExternalBusyEvent>>, InfraError> {
        self.events
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("calendar cache lock poisoned: {error}")))
    }
}

impl CalendarCacheRepository for InMemoryCalendarCacheRepository {
    fn get_by_id(&self, event_id: &str) -> Result<Option<ExternalBusyEvent>, InfraError> {
        let Some(event_id) = Self::normalized_id(event_id) else {
            return Ok(None);
        };
        Ok(self.lock()?.get(&event_id).cloned())
    }

    fn upsert(&self, event: &ExternalBusyEvent) -> Result<(), InfraError> {
        let event_id = Self::normalized_id(&event.id)
            .ok_or_else(|| InfraError::InvalidRecord("event id is required for cache upsert".to_string()))?;
        self.lock()?.insert(event_id, event.clone());
        Ok(())
    }

    fn remove(&self, event_id: &str) -> Result<(), InfraError> {
        let Some(event_id) = Self::normalized_id(event_id) else {
            return Ok(());
        };
        self.lock()?.remove(&event_id);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ExternalBusyEvent>, InfraError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, start_iso: &str, end_iso: &str) -> ExternalCalendarRecord {
        ExternalCalendarRecord {
            id: id.to_string(),
            provider_id: None,
            summary: None,
            status: Some("confirmed".to_string()),
            start_iso: start_iso.to_string(),
            end_iso: Some(end_iso.to_string()),
        }
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn apply_record_upserts_and_cancellation_removes() {
        let cache = InMemoryCalendarCacheRepository::default();
        let active = record("evt-1", "2024-01-10T10:00:00Z", "2024-01-10T11:00:00Z");
        cache.apply_record(&active, chrono_tz::UTC).expect("upsert");
        assert!(cache.get_by_id(" evt-1 ").expect("lookup").is_some());

        let mut cancelled = active.clone();
        cancelled.status = Some("cancelled".to_string());
        cache.apply_record(&cancelled, chrono_tz::UTC).expect("remove");
        assert!(cache.get_by_id("evt-1").expect("lookup").is_none());
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let cache = InMemoryCalendarCacheRepository::default();
        cache
            .apply_record(&record("evt-1", "2024-01-10T10:00:00Z", "2024-01-10T11:00:00Z"), chrono_tz::UTC)
            .expect("first");
        cache
            .apply_record(&record("evt-1", "2024-01-10T15:00:00Z", "2024-01-10T16:00:00Z"), chrono_tz::UTC)
            .expect("second");

        let events = cache.list_all().expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start.format("%H:%M").to_string(), "15:00");
    }

    #[test]
    fn list_for_date_includes_overnight_events_sorted_by_start() {
        let cache = InMemoryCalendarCacheRepository::default();
        for raw in [
            record("late", "2024-01-10T18:00:00Z", "2024-01-10T19:00:00Z"),
            record("overnight", "2024-01-09T22:00:00Z", "2024-01-10T02:00:00Z"),
            record("other-day", "2024-01-12T09:00:00Z", "2024-01-12T10:00:00Z"),
        ] {
            cache.apply_record(&raw, chrono_tz::UTC).expect("apply");
        }

        let ids = cache
            .list_for_date(date("2024-01-10"))
            .expect("list")
            .into_iter()
            .map(|event| event.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["overnight".to_string(), "late".to_string()]);
    }

    #[test]
    fn blank_ids_are_ignored_or_rejected() {
        let cache = InMemoryCalendarCacheRepository::default();
        assert!(cache.get_by_id("  ").expect("lookup").is_none());
        cache.remove("").expect("remove blank is a no-op");
        assert!(matches!(
            cache.apply_record(&record(" ", "2024-01-10T10:00:00Z", "2024-01-10T11:00:00Z"), chrono_tz::UTC),
            Err(InfraError::InvalidRecord(_))
        ));
    }
}
