//! Motion schedule policy and escalation window evaluation.
//!
//! A motion sensor carries a [`SchedulePolicy`] that decides whether a
//! detected motion may be escalated to the central server. Evaluation is a
//! pure function of the policy and an injected timestamp so it can be tested
//! without a clock.
//!
//! Times are wall-clock times-of-day. A window whose start is later than its
//! end crosses midnight (`22:00`–`06:00` covers the night).

use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Motion sensor sensitivity, forwarded to the hardware layer as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Sensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::Schedule(format!("unknown sensitivity '{other}'"))),
        }
    }
}

/// How a sensor reports a sustained presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// One report per interrupt.
    #[default]
    Single,
    /// Repeated reports while motion persists.
    Continuous,
}

impl TriggerMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Continuous => "continuous",
        }
    }
}

impl FromStr for TriggerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "continuous" => Ok(Self::Continuous),
            other => Err(Error::Schedule(format!("unknown trigger mode '{other}'"))),
        }
    }
}

/// Scheduling policy attached to a motion sensor.
///
/// `delay_time`, `sensitivity` and `trigger_mode` are carried through to the
/// edge unchanged; they are not enforced by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    #[serde(default)]
    pub enable_scheduling: bool,
    #[serde(default, with = "time_of_day")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "time_of_day")]
    pub end_time: Option<NaiveTime>,
    #[serde(default = "default_true")]
    pub weekday_monitoring: bool,
    #[serde(default = "default_true")]
    pub weekend_monitoring: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    /// Seconds. Pass-through configuration, not a debounce.
    #[serde(default = "default_delay_time")]
    pub delay_time: u32,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
}

const fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

const fn default_delay_time() -> u32 {
    3
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            enable_scheduling: false,
            start_time: None,
            end_time: None,
            weekday_monitoring: true,
            weekend_monitoring: true,
            timezone: default_timezone(),
            sensitivity: Sensitivity::default(),
            delay_time: default_delay_time(),
            trigger_mode: TriggerMode::default(),
        }
    }
}

impl SchedulePolicy {
    /// Reject policies the evaluator cannot interpret faithfully.
    pub fn validate(&self) -> Result<()> {
        parse_timezone(&self.timezone)?;
        if self.start_time.is_some() != self.end_time.is_some() {
            return Err(Error::Schedule(
                "start_time and end_time must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Offset used to turn a UTC instant into this policy's wall clock.
    /// Unknown zones fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        parse_timezone(&self.timezone).unwrap_or_else(|e| {
            warn!(timezone = %self.timezone, error = %e, "Falling back to UTC");
            utc_offset()
        })
    }
}

/// Decide whether escalation is allowed at local time `now`.
pub fn allowed(policy: &SchedulePolicy, now: NaiveDateTime) -> bool {
    if !policy.enable_scheduling {
        return true;
    }

    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend && !policy.weekend_monitoring {
        return false;
    }
    if !weekend && !policy.weekday_monitoring {
        return false;
    }

    match (policy.start_time, policy.end_time) {
        (Some(start), Some(end)) => window_contains(start, end, now.time()),
        _ => true,
    }
}

/// [`allowed`] for a UTC instant, converted into the policy's timezone.
pub fn allowed_at(policy: &SchedulePolicy, now: DateTime<Utc>) -> bool {
    if !policy.enable_scheduling {
        return true;
    }
    let local = now.with_timezone(&policy.offset()).naive_local();
    allowed(policy, local)
}

/// Inclusive window test; `start > end` wraps around midnight.
pub fn window_contains(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start <= end {
        start <= t && t <= end
    } else {
        t >= start || t <= end
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| Error::Schedule(format!("invalid time of day '{value}', expected HH:MM")))
}

/// Parse a timezone designator: `UTC`, `GMT`, `Z`, `+03:30`, `-0500`,
/// `UTC+02:00`.
pub fn parse_timezone(value: &str) -> Result<FixedOffset> {
    let tz = value.trim();
    if !tz.is_ascii() {
        return Err(Error::Schedule(format!("unsupported timezone '{tz}'")));
    }
    let upper = tz.to_ascii_uppercase();
    if upper.is_empty() || upper == "UTC" || upper == "GMT" || upper == "Z" {
        return Ok(utc_offset());
    }

    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(upper.as_str());

    let (sign, digits) = match rest.as_bytes().first() {
        Some(b'+') => (1, &rest[1..]),
        Some(b'-') => (-1, &rest[1..]),
        _ => return Err(Error::Schedule(format!("unsupported timezone '{tz}'"))),
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours
        .parse()
        .map_err(|_| Error::Schedule(format!("unsupported timezone '{tz}'")))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| Error::Schedule(format!("unsupported timezone '{tz}'")))?;
    if hours > 14 || minutes > 59 {
        return Err(Error::Schedule(format!("timezone offset out of range '{tz}'")));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| Error::Schedule(format!("timezone offset out of range '{tz}'")))
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Serde adapter for optional `HH:MM` times. Empty strings read as unset.
mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => super::parse_time_of_day(v)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
