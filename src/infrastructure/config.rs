use crate::domain::busy::{AvailabilityPolicy, BusyLabels, BUCKET_MINUTES};
use crate::domain::clock::{ClockTime, GridGeometry};
use crate::domain::drag::DEFAULT_DRAG_THRESHOLD_PX;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SCHEDULING_JSON: &str = "scheduling.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkingWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    pub busy: String,
    pub already_booked: String,
    pub outside_working_hours: String,
    pub not_working_this_day: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    pub schema: u64,
    pub timezone: String,
    pub working_window: WorkingWindow,
    pub bucket_minutes: i32,
    pub snap_minutes: i32,
    pub pixels_per_hour: f64,
    pub min_block_height: f64,
    pub drag_threshold_px: f64,
    pub labels: LabelConfig,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        let labels = BusyLabels::default();
        let geometry = GridGeometry::default();
        Self {
            schema: SUPPORTED_SCHEMA,
            timezone: "UTC".to_string(),
            working_window: WorkingWindow {
                start: geometry.window_start,
                end: geometry.window_end,
            },
            bucket_minutes: BUCKET_MINUTES,
            snap_minutes: geometry.snap_minutes,
            pixels_per_hour: geometry.pixels_per_hour,
            min_block_height: geometry.min_block_height,
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
            labels: LabelConfig {
                busy: labels.busy,
                already_booked: labels.already_booked,
                outside_working_hours: labels.outside_working_hours,
                not_working_this_day: labels.not_working_this_day,
            },
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.schema != SUPPORTED_SCHEMA {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported schema {}",
                self.schema
            )));
        }
        if self.working_window.end <= self.working_window.start {
            return Err(InfraError::InvalidConfig(
                "workingWindow.end must be after workingWindow.start".to_string(),
            ));
        }
        if self.bucket_minutes != BUCKET_MINUTES {
            return Err(InfraError::InvalidConfig(format!(
                "bucketMinutes is fixed at {BUCKET_MINUTES}"
            )));
        }
        if self.snap_minutes <= 0 || 60 % self.snap_minutes != 0 {
            return Err(InfraError::InvalidConfig(
                "snapMinutes must divide an hour".to_string(),
            ));
        }
        if self.pixels_per_hour <= 0.0 {
            return Err(InfraError::InvalidConfig(
                "pixelsPerHour must be > 0".to_string(),
            ));
        }
        if self.min_block_height < 0.0 || self.drag_threshold_px < 0.0 {
            return Err(InfraError::InvalidConfig(
                "minBlockHeight and dragThresholdPx must be >= 0".to_string(),
            ));
        }
        self.clinic_timezone()?;
        Ok(())
    }

    pub fn clinic_timezone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{}': {error}", self.timezone))
        })
    }

    pub fn availability_policy(&self) -> AvailabilityPolicy {
        AvailabilityPolicy {
            window_start: self.working_window.start,
            window_end: self.working_window.end,
            labels: BusyLabels {
                busy: self.labels.busy.clone(),
                already_booked: self.labels.already_booked.clone(),
                outside_working_hours: self.labels.outside_working_hours.clone(),
                not_working_this_day: self.labels.not_working_this_day.clone(),
            },
        }
    }

    pub fn grid_geometry(&self) -> GridGeometry {
        GridGeometry {
            window_start: self.working_window.start,
            window_end: self.working_window.end,
            pixels_per_hour: self.pixels_per_hour,
            min_block_height: self.min_block_height,
            snap_minutes: self.snap_minutes,
        }
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(SCHEDULING_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&SchedulingConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_scheduling_config(config_dir: &Path) -> Result<SchedulingConfig, InfraError> {
    let path = config_dir.join(SCHEDULING_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }

    let config: SchedulingConfig = serde_json::from_value(parsed)?;
    config.validate()?;
    Ok(config)
}
