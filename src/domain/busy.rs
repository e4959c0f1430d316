//! Busy-bucket aggregation for a single provider and date.
//!
//! Three sources are merged in priority order: external calendar conflicts,
//! local appointments, then the provider's weekly schedule. Every pass only
//! fills buckets that are still free, so an explicit conflict reason always
//! survives the schedule-shaping pass.

use crate::domain::clock::ClockTime;
use crate::domain::models::{
    Appointment, BusyBucket, BusyReasonKind, ExternalBusyEvent, WeeklyScheduleRule,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, HashSet};

pub const BUCKET_MINUTES: i32 = 30;
pub const DEFAULT_APPOINTMENT_MINUTES: i32 = 30;
pub const DEFAULT_EXTERNAL_EVENT_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyLabels {
    pub busy: String,
    pub already_booked: String,
    pub outside_working_hours: String,
    pub not_working_this_day: String,
}

impl Default for BusyLabels {
    fn default() -> Self {
        Self {
            busy: "Busy".to_string(),
            already_booked: "Already booked".to_string(),
            outside_working_hours: "Outside working hours".to_string(),
            not_working_this_day: "Not working this day".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityPolicy {
    pub window_start: ClockTime,
    pub window_end: ClockTime,
    pub labels: BusyLabels,
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            window_start: ClockTime::from_minutes_wrapping(9 * 60),
            window_end: ClockTime::from_minutes_wrapping(20 * 60),
            labels: BusyLabels::default(),
        }
    }
}

impl AvailabilityPolicy {
    /// Bucket starts of the working window, ascending.
    pub fn bucket_starts(&self) -> impl Iterator<Item = ClockTime> + '_ {
        let first = align_down(self.window_start.minutes());
        (first..self.window_end.minutes())
            .step_by(BUCKET_MINUTES as usize)
            .filter(|minutes| *minutes >= self.window_start.minutes())
            .map(ClockTime::from_minutes_wrapping)
    }

    fn contains(&self, bucket_start: i32) -> bool {
        bucket_start >= self.window_start.minutes() && bucket_start < self.window_end.minutes()
    }
}

/// Immutable inputs for one aggregation, supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleSnapshot<'a> {
    pub appointments: &'a [Appointment],
    pub external_events: &'a [ExternalBusyEvent],
    pub rules: &'a [WeeklyScheduleRule],
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusyReport {
    pub buckets: Vec<BusyBucket>,
    /// External event ids linked from this provider's appointments on the
    /// date that are missing from the external snapshot.
    pub dangling_links: Vec<String>,
}

pub fn compute_busy_buckets(
    provider_id: Option<&str>,
    date: NaiveDate,
    exclude_appointment_id: Option<&str>,
    snapshot: ScheduleSnapshot<'_>,
    policy: &AvailabilityPolicy,
) -> Vec<BusyBucket> {
    compute_busy_report(provider_id, date, exclude_appointment_id, snapshot, policy).buckets
}

pub fn compute_busy_report(
    provider_id: Option<&str>,
    date: NaiveDate,
    exclude_appointment_id: Option<&str>,
    snapshot: ScheduleSnapshot<'_>,
    policy: &AvailabilityPolicy,
) -> BusyReport {
    let Some(provider_id) = provider_id.map(str::trim).filter(|value| !value.is_empty()) else {
        return BusyReport::default();
    };

    let mut busy = BusyMap::new(policy);
    let linked_ids = snapshot
        .appointments
        .iter()
        .filter_map(|appointment| appointment.external_event_id.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect::<HashSet<_>>();

    for event in snapshot.external_events {
        if event.is_cancelled()
            || !event.applies_to(provider_id)
            || linked_ids.contains(event.id.trim())
        {
            continue;
        }
        let Some((start, end)) = external_minutes_on(event, date) else {
            continue;
        };
        let reason = non_empty(event.title.as_deref()).unwrap_or(policy.labels.busy.as_str());
        busy.fill_range(start, end, reason, BusyReasonKind::ExternalConflict);
    }

    let day_appointments = snapshot
        .appointments
        .iter()
        .filter(|appointment| appointment.belongs_to(provider_id) && appointment.date == date)
        .collect::<Vec<_>>();

    for appointment in &day_appointments {
        if appointment.status.is_cancelled()
            || exclude_appointment_id.is_some_and(|excluded| excluded == appointment.id)
        {
            continue;
        }
        let (start, end) = local_minutes(appointment);
        let reason = non_empty(appointment.patient_name.as_deref())
            .unwrap_or(policy.labels.already_booked.as_str());
        busy.fill_range(start, end, reason, BusyReasonKind::LocalConflict);
    }

    apply_weekly_schedule(&mut busy, provider_id, date, snapshot.rules, policy);

    let known_external_ids = snapshot
        .external_events
        .iter()
        .map(|event| event.id.trim())
        .collect::<HashSet<_>>();
    let mut dangling_links = day_appointments
        .iter()
        .filter_map(|appointment| non_empty(appointment.external_event_id.as_deref()))
        .filter(|linked| !known_external_ids.contains(*linked))
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();
    dangling_links.sort();
    dangling_links.dedup();

    BusyReport {
        buckets: busy.into_buckets(),
        dangling_links,
    }
}

fn apply_weekly_schedule(
    busy: &mut BusyMap<'_>,
    provider_id: &str,
    date: NaiveDate,
    rules: &[WeeklyScheduleRule],
    policy: &AvailabilityPolicy,
) {
    let active_rules = rules
        .iter()
        .filter(|rule| rule.is_active && rule.provider_id == provider_id)
        .collect::<Vec<_>>();
    if active_rules.is_empty() {
        return;
    }

    let weekday = date.weekday().num_days_from_sunday() as u8;
    let todays_rules = active_rules
        .into_iter()
        .filter(|rule| rule.day_of_week == weekday)
        .collect::<Vec<_>>();

    for bucket in policy.bucket_starts() {
        if todays_rules.is_empty() {
            busy.insert_if_absent(
                bucket.minutes(),
                &policy.labels.not_working_this_day,
                BusyReasonKind::NotWorkingThisDay,
            );
        } else if !todays_rules.iter().any(|rule| rule.covers(bucket)) {
            busy.insert_if_absent(
                bucket.minutes(),
                &policy.labels.outside_working_hours,
                BusyReasonKind::OutsideWorkingHours,
            );
        }
    }
}

struct BusyMap<'p> {
    policy: &'p AvailabilityPolicy,
    entries: BTreeMap<i32, (String, BusyReasonKind)>,
}

impl<'p> BusyMap<'p> {
    fn new(policy: &'p AvailabilityPolicy) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
        }
    }

    fn fill_range(&mut self, start: i32, end: i32, reason: &str, kind: BusyReasonKind) {
        let mut bucket = align_down(start);
        while bucket < end {
            self.insert_if_absent(bucket, reason, kind);
            bucket += BUCKET_MINUTES;
        }
    }

    fn insert_if_absent(&mut self, bucket: i32, reason: &str, kind: BusyReasonKind) {
        if !self.policy.contains(bucket) {
            return;
        }
        self.entries
            .entry(bucket)
            .or_insert_with(|| (reason.to_string(), kind));
    }

    fn into_buckets(self) -> Vec<BusyBucket> {
        self.entries
            .into_iter()
            .map(|(minutes, (reason, kind))| BusyBucket {
                time: ClockTime::from_minutes_wrapping(minutes),
                reason,
                kind: Some(kind),
            })
            .collect()
    }
}

fn align_down(minutes: i32) -> i32 {
    minutes.div_euclid(BUCKET_MINUTES) * BUCKET_MINUTES
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Missing or non-positive ends fall back to the default half-hour.
fn local_minutes(appointment: &Appointment) -> (i32, i32) {
    let start = appointment.start_time.minutes();
    let end = appointment
        .end_time
        .map(ClockTime::minutes)
        .filter(|end| *end > start)
        .unwrap_or(start + DEFAULT_APPOINTMENT_MINUTES);
    (start, end)
}

/// The part of an external event that falls on `date`, as minute offsets.
fn external_minutes_on(event: &ExternalBusyEvent, date: NaiveDate) -> Option<(i32, i32)> {
    let default_end = event.start + Duration::minutes(DEFAULT_EXTERNAL_EVENT_MINUTES);
    let end = event
        .end
        .filter(|end| *end > event.start)
        .unwrap_or(default_end);

    let day_start = date.and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);
    let start = event.start.max(day_start);
    let end = end.min(day_end);
    if end <= start {
        return None;
    }
    Some((minutes_since(day_start, start), minutes_since(day_start, end)))
}

fn minutes_since(origin: NaiveDateTime, value: NaiveDateTime) -> i32 {
    (value - origin).num_minutes() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AppointmentStatus;
    use proptest::prelude::*;

    fn clock(value: &str) -> ClockTime {
        ClockTime::parse(value).expect("valid clock time")
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn at(day: &str, time: &str) -> NaiveDateTime {
        date(day).and_time(NaiveTime::parse_from_str(time, "%H:%M").expect("valid time"))
    }

    fn appointment(id: &str, day: &str, start: &str, end: Option<&str>) -> Appointment {
        Appointment {
            id: id.to_string(),
            provider_id: Some("dr-ng".to_string()),
            date: date(day),
            start_time: clock(start),
            end_time: end.map(clock),
            status: AppointmentStatus::Scheduled,
            patient_name: Some(format!("Patient {id}")),
            external_event_id: None,
        }
    }

    fn external(id: &str, start: NaiveDateTime, end: Option<NaiveDateTime>) -> ExternalBusyEvent {
        ExternalBusyEvent {
            id: id.to_string(),
            provider_id: Some("dr-ng".to_string()),
            start,
            end,
            status: "confirmed".to_string(),
            title: Some("Hospital rounds".to_string()),
        }
    }

    fn rule(day_of_week: u8, start: &str, end: &str) -> WeeklyScheduleRule {
        WeeklyScheduleRule {
            provider_id: "dr-ng".to_string(),
            day_of_week,
            start_time: clock(start),
            end_time: clock(end),
            is_active: true,
        }
    }

    fn times(buckets: &[BusyBucket]) -> Vec<String> {
        buckets.iter().map(|bucket| bucket.time.to_string()).collect()
    }

    fn run(
        exclude: Option<&str>,
        day: &str,
        appointments: &[Appointment],
        events: &[ExternalBusyEvent],
        rules: &[WeeklyScheduleRule],
    ) -> Vec<BusyBucket> {
        compute_busy_buckets(
            Some("dr-ng"),
            date(day),
            exclude,
            ScheduleSnapshot {
                appointments,
                external_events: events,
                rules,
            },
            &AvailabilityPolicy::default(),
        )
    }

    #[test]
    fn missing_provider_yields_no_buckets() {
        let appointments = [appointment("a1", "2024-01-08", "10:00", None)];
        let buckets = compute_busy_buckets(
            None,
            date("2024-01-08"),
            None,
            ScheduleSnapshot {
                appointments: &appointments,
                ..ScheduleSnapshot::default()
            },
            &AvailabilityPolicy::default(),
        );
        assert!(buckets.is_empty());
    }

    #[test]
    fn external_conflict_only_blocks_its_own_buckets() {
        let events = [external(
            "evt-1",
            at("2024-01-08", "10:00"),
            Some(at("2024-01-08", "11:00")),
        )];
        let buckets = run(None, "2024-01-08", &[], &events, &[]);

        assert_eq!(times(&buckets), vec!["10:00", "10:30"]);
        assert!(buckets.iter().all(|bucket| bucket.reason == "Hospital rounds"));
        assert!(
            buckets
                .iter()
                .all(|bucket| bucket.kind == Some(BusyReasonKind::ExternalConflict))
        );
    }

    #[test]
    fn full_day_off_blocks_every_bucket() {
        // 2024-01-09 is a Tuesday.
        let rules = [rule(1, "09:00", "17:00"), rule(3, "09:00", "17:00"), rule(5, "09:00", "17:00")];
        let buckets = run(None, "2024-01-09", &[], &[], &rules);

        assert_eq!(buckets.len(), 22);
        assert_eq!(buckets.first().map(|bucket| bucket.time), Some(clock("09:00")));
        assert_eq!(buckets.last().map(|bucket| bucket.time), Some(clock("19:30")));
        assert!(buckets.iter().all(|bucket| bucket.reason == "Not working this day"));
    }

    #[test]
    fn partial_day_keeps_explicit_conflict_and_free_morning() {
        // 2024-01-08 is a Monday.
        let rules = [rule(1, "09:00", "13:00")];
        let appointments = [appointment("a1", "2024-01-08", "09:30", Some("10:00"))];
        let buckets = run(None, "2024-01-08", &appointments, &[], &rules);

        assert_eq!(buckets[0].time, clock("09:30"));
        assert_eq!(buckets[0].reason, "Patient a1");

        let outside = buckets[1..].iter().collect::<Vec<_>>();
        assert_eq!(outside.len(), 14);
        assert_eq!(outside[0].time, clock("13:00"));
        assert_eq!(outside[13].time, clock("19:30"));
        assert!(outside.iter().all(|bucket| bucket.reason == "Outside working hours"));

        let busy = times(&buckets);
        for free in ["09:00", "10:00", "10:30", "11:00", "11:30", "12:00", "12:30"] {
            assert!(!busy.contains(&free.to_string()), "{free} should be free");
        }
    }

    #[test]
    fn explicit_conflict_wins_over_schedule_shaping() {
        let rules = [rule(1, "09:00", "13:00")];
        let appointments = [appointment("a1", "2024-01-08", "15:00", Some("16:00"))];
        let buckets = run(None, "2024-01-08", &appointments, &[], &rules);

        let at_three = buckets
            .iter()
            .find(|bucket| bucket.time == clock("15:00"))
            .expect("15:00 bucket");
        assert_eq!(at_three.reason, "Patient a1");
        assert_eq!(at_three.kind, Some(BusyReasonKind::LocalConflict));
    }

    #[test]
    fn external_conflict_wins_over_local_conflict() {
        let events = [external("evt-1", at("2024-01-08", "10:00"), Some(at("2024-01-08", "10:30")))];
        let appointments = [appointment("a1", "2024-01-08", "10:00", None)];
        let buckets = run(None, "2024-01-08", &appointments, &events, &[]);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].reason, "Hospital rounds");
    }

    #[test]
    fn edited_and_cancelled_appointments_do_not_block() {
        let mut cancelled = appointment("a2", "2024-01-08", "11:00", None);
        cancelled.status = AppointmentStatus::Cancelled;
        let appointments = [appointment("a1", "2024-01-08", "10:00", None), cancelled];
        let buckets = run(Some("a1"), "2024-01-08", &appointments, &[], &[]);
        assert!(buckets.is_empty());
    }

    #[test]
    fn mirrored_external_event_is_not_double_counted() {
        let mut local = appointment("a1", "2024-01-08", "10:00", Some("10:30"));
        local.external_event_id = Some("evt-1".to_string());
        let events = [
            external("evt-1", at("2024-01-08", "10:00"), Some(at("2024-01-08", "10:30"))),
            external("evt-2", at("2024-01-08", "12:00"), None),
        ];
        let buckets = run(None, "2024-01-08", &[local], &events, &[]);

        assert_eq!(times(&buckets), vec!["10:00", "12:00", "12:30"]);
        assert_eq!(buckets[0].reason, "Patient a1");
    }

    #[test]
    fn dangling_link_is_reported_without_blocking() {
        let mut local = appointment("a1", "2024-01-08", "10:00", None);
        local.external_event_id = Some("evt-gone".to_string());
        let appointments = [local];
        let report = compute_busy_report(
            Some("dr-ng"),
            date("2024-01-08"),
            None,
            ScheduleSnapshot {
                appointments: &appointments,
                ..ScheduleSnapshot::default()
            },
            &AvailabilityPolicy::default(),
        );
        assert_eq!(report.dangling_links, vec!["evt-gone".to_string()]);
        assert_eq!(times(&report.buckets), vec!["10:00"]);
    }

    #[test]
    fn other_providers_and_cancelled_events_are_ignored() {
        let mut other = external("evt-1", at("2024-01-08", "10:00"), None);
        other.provider_id = Some("dr-other".to_string());
        let mut cancelled = external("evt-2", at("2024-01-08", "14:00"), None);
        cancelled.status = "cancelled".to_string();
        let mut other_appointment = appointment("a1", "2024-01-08", "16:00", None);
        other_appointment.provider_id = Some("dr-other".to_string());

        let buckets = run(None, "2024-01-08", &[other_appointment], &[other, cancelled], &[]);
        assert!(buckets.is_empty());
    }

    #[test]
    fn degenerate_and_unaligned_intervals_are_clamped() {
        let events = [external("evt-1", at("2024-01-08", "10:15"), Some(at("2024-01-08", "10:00")))];
        let appointments = [appointment("a1", "2024-01-08", "15:10", Some("15:10"))];
        let buckets = run(None, "2024-01-08", &appointments, &events, &[]);

        assert_eq!(times(&buckets), vec!["10:00", "10:30", "11:00", "15:00", "15:30"]);
    }

    #[test]
    fn overnight_event_is_clipped_to_the_queried_date() {
        let events = [external(
            "evt-1",
            at("2024-01-07", "22:00"),
            Some(at("2024-01-08", "09:45")),
        )];
        let buckets = run(None, "2024-01-08", &[], &events, &[]);
        assert_eq!(times(&buckets), vec!["09:00", "09:30"]);

        let untitled = [ExternalBusyEvent {
            title: Some("  ".to_string()),
            ..events[0].clone()
        }];
        let buckets = run(None, "2024-01-08", &[], &untitled, &[]);
        assert!(buckets.iter().all(|bucket| bucket.reason == "Busy"));
    }

    fn arbitrary_appointment() -> impl Strategy<Value = Appointment> {
        (0u16..96, proptest::option::of(0u16..96), 0u8..5, proptest::bool::ANY).prop_map(
            |(start_slot, end_slot, status, named)| Appointment {
                id: format!("apt-{start_slot}-{status}"),
                provider_id: Some("dr-ng".to_string()),
                date: date("2024-01-08"),
                start_time: ClockTime::from_minutes_wrapping(i32::from(start_slot) * 15),
                end_time: end_slot.map(|slot| ClockTime::from_minutes_wrapping(i32::from(slot) * 15)),
                status: match status {
                    0 => AppointmentStatus::Scheduled,
                    1 => AppointmentStatus::Confirmed,
                    2 => AppointmentStatus::Completed,
                    3 => AppointmentStatus::Cancelled,
                    _ => AppointmentStatus::NoShow,
                },
                patient_name: named.then(|| "Named".to_string()),
                external_event_id: None,
            },
        )
    }

    fn arbitrary_event() -> impl Strategy<Value = ExternalBusyEvent> {
        (0i64..(48 * 60), proptest::option::of(-120i64..600)).prop_map(|(offset, length)| {
            let start = at("2024-01-07", "12:00") + Duration::minutes(offset);
            ExternalBusyEvent {
                id: format!("evt-{offset}"),
                provider_id: None,
                start,
                end: length.map(|length| start + Duration::minutes(length)),
                status: "confirmed".to_string(),
                title: None,
            }
        })
    }

    fn arbitrary_rule() -> impl Strategy<Value = WeeklyScheduleRule> {
        (0u8..7, 0u16..47, 1u16..48, proptest::bool::ANY).prop_map(|(day, start, span, active)| {
            WeeklyScheduleRule {
                provider_id: "dr-ng".to_string(),
                day_of_week: day,
                start_time: ClockTime::from_minutes_wrapping(i32::from(start) * 30),
                end_time: ClockTime::from_minutes_wrapping(i32::from((start + span).min(47)) * 30),
                is_active: active,
            }
        })
    }

    // Feature: scheduling, Property 3: buckets are aligned, in-window, sorted and unique
    proptest! {
        #[test]
        fn property3_buckets_aligned_sorted_unique(
            appointments in proptest::collection::vec(arbitrary_appointment(), 0..12),
            events in proptest::collection::vec(arbitrary_event(), 0..6),
            rules in proptest::collection::vec(arbitrary_rule(), 0..4),
        ) {
            let policy = AvailabilityPolicy::default();
            let buckets = compute_busy_buckets(
                Some("dr-ng"),
                date("2024-01-08"),
                None,
                ScheduleSnapshot { appointments: &appointments, external_events: &events, rules: &rules },
                &policy,
            );

            for bucket in &buckets {
                prop_assert_eq!(bucket.time.minutes() % BUCKET_MINUTES, 0);
                prop_assert!(bucket.time >= policy.window_start);
                prop_assert!(bucket.time < policy.window_end);
            }
            for pair in buckets.windows(2) {
                prop_assert!(pair[0].time < pair[1].time);
            }
        }
    }

    // Feature: scheduling, Property 4: recomputing with identical inputs is idempotent
    proptest! {
        #[test]
        fn property4_aggregation_is_idempotent(
            appointments in proptest::collection::vec(arbitrary_appointment(), 0..12),
            events in proptest::collection::vec(arbitrary_event(), 0..6),
            rules in proptest::collection::vec(arbitrary_rule(), 0..4),
        ) {
            let policy = AvailabilityPolicy::default();
            let snapshot = ScheduleSnapshot { appointments: &appointments, external_events: &events, rules: &rules };
            let first = compute_busy_buckets(Some("dr-ng"), date("2024-01-08"), Some("apt-4-0"), snapshot, &policy);
            let second = compute_busy_buckets(Some("dr-ng"), date("2024-01-08"), Some("apt-4-0"), snapshot, &policy);

            prop_assert_eq!(
                serde_json::to_string(&first).expect("serialize"),
                serde_json::to_string(&second).expect("serialize")
            );
            prop_assert_eq!(first, second);
        }
    }
}
