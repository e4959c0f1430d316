use crate::domain::models::ExternalBusyEvent;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
const LOCAL_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// A busy record as delivered by an external calendar feed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCalendarRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub start_iso: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_iso: Option<String>,
}

impl ExternalCalendarRecord {
    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.trim().eq_ignore_ascii_case("cancelled"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedInstant {
    AllDay(NaiveDate),
    Local(NaiveDateTime),
}

impl FeedInstant {
    fn start_of(self) -> NaiveDateTime {
        match self {
            FeedInstant::AllDay(date) => date.and_time(chrono::NaiveTime::MIN),
            FeedInstant::Local(value) => value,
        }
    }
}

/// Converts a feed record into a clinic-local busy event.
pub fn decode_external_record(
    record: &ExternalCalendarRecord,
    clinic_timezone: Tz,
) -> Result<ExternalBusyEvent, InfraError> {
    let id = record.id.trim();
    if id.is_empty() {
        return Err(InfraError::InvalidRecord("record id is required".to_string()));
    }

    let start = parse_feed_instant(&record.start_iso, "startIso", clinic_timezone)?;
    let end = record
        .end_iso
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_feed_instant(value, "endIso", clinic_timezone))
        .transpose()?;

    let start_at = start.start_of();
    let end_at = match (start, end) {
        (_, Some(end)) => Some(end.start_of()),
        // An all-day record without an end covers its whole date.
        (FeedInstant::AllDay(date), None) => date
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(chrono::NaiveTime::MIN)),
        (FeedInstant::Local(_), None) => None,
    };

    let event = ExternalBusyEvent {
        id: id.to_string(),
        provider_id: record
            .provider_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        start: start_at,
        end: end_at,
        status: record
            .status
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("confirmed")
            .to_string(),
        title: record
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
    };
    event.validate().map_err(InfraError::InvalidRecord)?;
    Ok(event)
}

/// Decodes a feed page, skipping cancelled records.
pub fn decode_external_records(
    records: &[ExternalCalendarRecord],
    clinic_timezone: Tz,
) -> Result<Vec<ExternalBusyEvent>, InfraError> {
    records
        .iter()
        .filter(|record| !record.is_cancelled())
        .map(|record| decode_external_record(record, clinic_timezone))
        .collect()
}

fn parse_feed_instant(value: &str, field_name: &str, clinic_timezone: Tz) -> Result<FeedInstant, InfraError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(FeedInstant::Local(
            parsed.with_timezone(&clinic_timezone).naive_local(),
        ));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_ONLY_FORMAT) {
        return Ok(FeedInstant::AllDay(date));
    }
    // Offset-less timestamps are already clinic-local.
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(FeedInstant::Local)
        .ok_or_else(|| InfraError::InvalidRecord(format!("invalid {field_name} '{value}'")))
}
