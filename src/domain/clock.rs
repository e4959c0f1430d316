use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub const MINUTES_PER_DAY: i32 = 24 * 60;
pub const DEFAULT_SNAP_MINUTES: i32 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("clock time must be HH:MM, got '{0}'")]
pub struct ClockFormatError(pub String);

/// Minutes since midnight, always in `0..1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    /// Wraps around midnight in both directions.
    pub fn from_minutes_wrapping(minutes: i32) -> Self {
        Self(minutes.rem_euclid(MINUTES_PER_DAY) as u16)
    }

    pub fn parse(value: &str) -> Result<Self, ClockFormatError> {
        to_minutes(value).map(Self)
    }

    pub fn minutes(self) -> i32 {
        i32::from(self.0)
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ClockTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parses `"HH:MM"` into minutes since midnight.
pub fn to_minutes(value: &str) -> Result<u16, ClockFormatError> {
    let malformed = || ClockFormatError(value.to_string());
    let (hour_str, minute_str) = value.trim().split_once(':').ok_or_else(malformed)?;
    if hour_str.is_empty()
        || hour_str.len() > 2
        || minute_str.len() != 2
        || !hour_str.bytes().all(|byte| byte.is_ascii_digit())
        || !minute_str.bytes().all(|byte| byte.is_ascii_digit())
    {
        return Err(malformed());
    }

    let hour = hour_str.parse::<u16>().map_err(|_| malformed())?;
    let minute = minute_str.parse::<u16>().map_err(|_| malformed())?;
    if hour > 23 || minute > 59 {
        return Err(malformed());
    }
    Ok(hour * 60 + minute)
}

pub fn to_clock_string(minutes: i32) -> String {
    ClockTime::from_minutes_wrapping(minutes).to_string()
}

/// Round-half-up to the nearest multiple of `grid`.
pub fn snap_to_grid(minutes: i32, grid: i32) -> i32 {
    if grid <= 0 {
        return minutes;
    }
    (2 * minutes + grid).div_euclid(2 * grid) * grid
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSpan {
    pub top: f64,
    pub height: f64,
}

pub fn pixels_for_interval(
    start_minutes: i32,
    end_minutes: i32,
    window_start_minutes: i32,
    pixels_per_hour: f64,
    min_height: f64,
) -> PixelSpan {
    let top = f64::from(start_minutes - window_start_minutes) / 60.0 * pixels_per_hour;
    let height = f64::from(end_minutes - start_minutes) / 60.0 * pixels_per_hour;
    PixelSpan {
        top,
        height: height.max(min_height),
    }
}

pub fn minutes_for_offset(top: f64, window_start_minutes: i32, pixels_per_hour: f64) -> f64 {
    if pixels_per_hour <= 0.0 {
        return f64::from(window_start_minutes);
    }
    f64::from(window_start_minutes) + top / pixels_per_hour * 60.0
}

/// Vertical geometry shared by every column of a calendar grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub window_start: ClockTime,
    pub window_end: ClockTime,
    pub pixels_per_hour: f64,
    pub min_block_height: f64,
    pub snap_minutes: i32,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            window_start: ClockTime(9 * 60),
            window_end: ClockTime(20 * 60),
            pixels_per_hour: 60.0,
            min_block_height: 20.0,
            snap_minutes: DEFAULT_SNAP_MINUTES,
        }
    }
}

impl GridGeometry {
    pub fn total_height(&self) -> f64 {
        f64::from(self.window_end.minutes() - self.window_start.minutes()) / 60.0
            * self.pixels_per_hour
    }

    pub fn span_for(&self, start: ClockTime, end: ClockTime) -> PixelSpan {
        pixels_for_interval(
            start.minutes(),
            end.minutes(),
            self.window_start.minutes(),
            self.pixels_per_hour,
            self.min_block_height,
        )
    }

    pub fn snapped_minutes_at(&self, top: f64) -> i32 {
        let raw = minutes_for_offset(top, self.window_start.minutes(), self.pixels_per_hour);
        snap_to_grid(raw.round() as i32, self.snap_minutes)
    }
}

/// Rendering position of one appointment block inside its column.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    pub appointment_id: String,
    pub column: usize,
    pub span: PixelSpan,
}

impl BlockLayout {
    /// A missing end renders as the default 30-minute block.
    pub fn for_appointment(
        geometry: &GridGeometry,
        appointment_id: impl Into<String>,
        column: usize,
        start: ClockTime,
        end: Option<ClockTime>,
    ) -> Self {
        let end_minutes = end
            .map(ClockTime::minutes)
            .filter(|end| *end > start.minutes())
            .unwrap_or(start.minutes() + 30);
        let span = pixels_for_interval(
            start.minutes(),
            end_minutes,
            geometry.window_start.minutes(),
            geometry.pixels_per_hour,
            geometry.min_block_height,
        );
        Self {
            appointment_id: appointment_id.into(),
            column,
            span,
        }
    }
}
