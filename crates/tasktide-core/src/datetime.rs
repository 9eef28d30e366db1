use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "tasktide-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKTIDE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKTIDE_TIME_CONFIG";
const DEFAULT_LOCAL_TIMEZONE: &str =
  "UTC";

/// Hour at which a date-only task is
/// placed when shown as a timed event.
pub const DEFAULT_EVENT_HOUR: u32 = 9;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn local_timezone() -> &'static Tz {
  static LOCAL_TZ: OnceLock<Tz> =
    OnceLock::new();
  LOCAL_TZ.get_or_init(
    resolve_local_timezone
  )
}

#[must_use]
pub fn to_local_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(local_timezone())
    .date_naive()
}

#[must_use]
pub fn to_local_datetime(
  dt: DateTime<Utc>
) -> NaiveDateTime {
  dt.with_timezone(local_timezone())
    .naive_local()
}

/// `Jun 1, 2024`
#[must_use]
pub fn format_due_date(
  date: NaiveDate
) -> String {
  date.format("%b %-d, %Y").to_string()
}

#[must_use]
pub fn at_event_start(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(
    NaiveTime::from_hms_opt(
      DEFAULT_EVENT_HOUR,
      0,
      0
    )
    .unwrap_or(NaiveTime::MIN)
  )
}

/// Reads a due date as the backend
/// stores it: a bare `YYYY-MM-DD`, or a
/// full RFC 3339 instant which is
/// truncated to its local calendar day.
pub fn parse_stored_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
  {
    return Some(date);
  }

  DateTime::parse_from_rfc3339(trimmed)
    .ok()
    .map(|dt| {
      to_local_date(
        dt.with_timezone(&Utc)
      )
    })
}

fn resolve_local_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_LOCAL_TIMEZONE,
    "DEFAULT_LOCAL_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured local timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a user-typed due date relative
/// to `now` in the local timezone.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = to_local_date(now);

  match lower.as_str() {
    | "today" | "now" => return Ok(today),
    | "tomorrow" => {
      return shift_days(today, 1);
    }
    | "yesterday" => {
      return shift_days(today, -1);
    }
    | _ => {}
  }

  if let Some(days) =
    parse_relative_offset(&lower)?
  {
    return shift_days(today, days);
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  if let Some(date) =
    parse_stored_date(token)
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date: {input} \
     (expected YYYY-MM-DD, today, \
     tomorrow, a weekday, or +Nd)"
  ))
}

fn shift_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {date} \
         shifted by {days} days"
      )
    })
}

fn parse_relative_offset(
  token: &str
) -> anyhow::Result<Option<i64>> {
  let offset_re = Regex::new(
    r"^(?P<sign>[+-])(?P<count>\d{1,4})(?P<unit>[dw])$"
  )
  .context(
    "failed to compile relative date \
     pattern"
  )?;
  let Some(captures) =
    offset_re.captures(token)
  else {
    return Ok(None);
  };

  let count: i64 = captures["count"]
    .parse()
    .context("invalid day count")?;
  let days = match &captures["unit"] {
    | "w" => count * 7,
    | _ => count
  };

  Ok(Some(
    if &captures["sign"] == "-" {
      -days
    } else {
      days
    }
  ))
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = i64::from(
    from.weekday().num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
