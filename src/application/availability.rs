use crate::domain::busy::{compute_busy_report, AvailabilityPolicy, BusyReport, ScheduleSnapshot};
use crate::domain::clock::ClockTime;
use crate::domain::models::BusyBucket;
use crate::infrastructure::appointment_store::AppointmentStore;
use crate::infrastructure::calendar_cache::CalendarCacheRepository;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::ExternalCalendarRecord;
use crate::infrastructure::schedule_rules::ScheduleRuleRepository;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    provider_id: String,
    date: NaiveDate,
    exclude_appointment_id: Option<String>,
}

pub const DEFAULT_MEMO_CAPACITY: usize = 512;
/// Reports further than this from the newest insert are dropped.
pub const MEMO_DATE_WINDOW_DAYS: i64 = 62;

#[derive(Debug, Default)]
struct MemoState {
    generation: u64,
    reports: HashMap<MemoKey, BusyReport>,
}

/// Cached busy reports keyed by provider, date and excluded appointment.
///
/// Shared between the availability service and anything that mutates the
/// underlying snapshots, so a write can drop the affected dates. Every
/// invalidation bumps a generation counter, and a report computed under an
/// older generation is never stored. The memo keeps a rolling window of
/// dates around the newest insert and at most `capacity` reports.
#[derive(Debug)]
pub struct AvailabilityMemo {
    state: Mutex<MemoState>,
    capacity: usize,
}

impl Default for AvailabilityMemo {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }
}

impl AvailabilityMemo {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MemoState::default()),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &MemoKey) -> Result<Option<BusyReport>, InfraError> {
        Ok(self.lock()?.reports.get(key).cloned())
    }

    fn generation(&self) -> Result<u64, InfraError> {
        Ok(self.lock()?.generation)
    }

    /// Stores `report` unless an invalidation happened since `generation`
    /// was read. Returns whether the report was kept.
    fn insert_if_current(&self, key: MemoKey, report: BusyReport, generation: u64) -> Result<bool, InfraError> {
        let mut state = self.lock()?;
        if state.generation != generation {
            return Ok(false);
        }

        let anchor = key.date;
        state
            .reports
            .retain(|cached, _| days_apart(cached.date, anchor) <= MEMO_DATE_WINDOW_DAYS);
        while state.reports.len() >= self.capacity && !state.reports.contains_key(&key) {
            let Some(farthest) = state
                .reports
                .keys()
                .max_by_key(|cached| days_apart(cached.date, anchor))
                .cloned()
            else {
                break;
            };
            state.reports.remove(&farthest);
        }
        state.reports.insert(key, report);
        Ok(true)
    }

    pub fn invalidate_dates(&self, dates: &[NaiveDate]) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        state.generation = state.generation.wrapping_add(1);
        state.reports.retain(|key, _| !dates.contains(&key.date));
        Ok(())
    }

    pub fn invalidate_all(&self) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        state.generation = state.generation.wrapping_add(1);
        state.reports.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize, InfraError> {
        Ok(self.lock()?.reports.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("availability memo lock poisoned: {error}")))
    }
}

fn days_apart(left: NaiveDate, right: NaiveDate) -> i64 {
    left.signed_duration_since(right).num_days().abs()
}

pub struct AvailabilityService<A, R, C>
where
    A: AppointmentStore,
    R: ScheduleRuleRepository,
    C: CalendarCacheRepository,
{
    appointment_store: Arc<A>,
    rule_repository: Arc<R>,
    calendar_cache: Arc<C>,
    policy: AvailabilityPolicy,
    memo: Arc<AvailabilityMemo>,
}

impl<A, R, C> AvailabilityService<A, R, C>
where
    A: AppointmentStore,
    R: ScheduleRuleRepository,
    C: CalendarCacheRepository,
{
    pub fn new(appointment_store: Arc<A>, rule_repository: Arc<R>, calendar_cache: Arc<C>) -> Self {
        Self {
            appointment_store,
            rule_repository,
            calendar_cache,
            policy: AvailabilityPolicy::default(),
            memo: Arc::new(AvailabilityMemo::default()),
        }
    }

    pub fn with_policy(mut self, policy: AvailabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_memo(mut self, memo: Arc<AvailabilityMemo>) -> Self {
        self.memo = memo;
        self
    }

    pub fn policy(&self) -> &AvailabilityPolicy {
        &self.policy
    }

    pub fn memo(&self) -> Arc<AvailabilityMemo> {
        Arc::clone(&self.memo)
    }

    pub async fn busy_buckets(
        &self,
        provider_id: Option<&str>,
        date: NaiveDate,
        exclude_appointment_id: Option<&str>,
    ) -> Result<Vec<BusyBucket>, InfraError> {
        Ok(self
            .busy_report(provider_id, date, exclude_appointment_id)
            .await?
            .buckets)
    }

    pub async fn busy_report(
        &self,
        provider_id: Option<&str>,
        date: NaiveDate,
        exclude_appointment_id: Option<&str>,
    ) -> Result<BusyReport, InfraError> {
        let Some(provider_id) = provider_id.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(BusyReport::default());
        };
        let key = MemoKey {
            provider_id: provider_id.to_string(),
            date,
            exclude_appointment_id: exclude_appointment_id
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        };
        // Read before the snapshots so a concurrent invalidation wins.
        let generation = self.memo.generation()?;
        if let Some(report) = self.memo.get(&key)? {
            return Ok(report);
        }

        let appointments = self.appointment_store.list_for_date(date).await?;
        let rules = self.rule_repository.list_for_provider(provider_id)?;
        let external_events = self.calendar_cache.list_for_date(date)?;
        let snapshot = ScheduleSnapshot {
            appointments: &appointments,
            external_events: &external_events,
            rules: &rules,
        };

        let report = compute_busy_report(
            Some(provider_id),
            date,
            key.exclude_appointment_id.as_deref(),
            snapshot,
            &self.policy,
        );
        for linked_id in &report.dangling_links {
            tracing::warn!(
                provider_id,
                %date,
                external_event_id = %linked_id,
                "appointment links an external event missing from the calendar cache"
            );
        }
        tracing::debug!(
            provider_id,
            %date,
            busy = report.buckets.len(),
            "computed busy buckets"
        );

        if !self.memo.insert_if_current(key, report.clone(), generation)? {
            tracing::debug!(provider_id, %date, "busy report went stale while computing; not cached");
        }
        Ok(report)
    }

    /// Bucket starts inside the working window that nothing blocks.
    pub async fn free_start_times(
        &self,
        provider_id: Option<&str>,
        date: NaiveDate,
        exclude_appointment_id: Option<&str>,
    ) -> Result<Vec<ClockTime>, InfraError> {
        let busy = self
            .busy_buckets(provider_id, date, exclude_appointment_id)
            .await?
            .into_iter()
            .map(|bucket| bucket.time)
            .collect::<HashSet<_>>();
        Ok(self
            .policy
            .bucket_starts()
            .filter(|time| !busy.contains(time))
            .collect())
    }

    /// Feeds external calendar records into the cache and drops stale reports.
    pub fn apply_external_records(
        &self,
        records: &[ExternalCalendarRecord],
        clinic_timezone: Tz,
    ) -> Result<usize, InfraError> {
        for record in records {
            self.calendar_cache.apply_record(record, clinic_timezone)?;
        }
        if !records.is_empty() {
            self.memo.invalidate_all()?;
        }
        Ok(records.len())
    }
}
