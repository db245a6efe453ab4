use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "CORKBOARD_TIMEZONE";

const WIRE_DATE_FORMAT: &str =
  "%Y-%m-%d";

/// Source of "today" for due-date
/// arithmetic. Dates are calendar dates in
/// the board time zone.
#[derive(Debug, Clone, Copy)]
pub struct BoardClock {
  tz:          Tz,
  fixed_today: Option<NaiveDate>
}

impl Default for BoardClock {
  fn default() -> Self {
    Self::new(chrono_tz::UTC)
  }
}

impl BoardClock {
  pub fn new(tz: Tz) -> Self {
    Self {
      tz,
      fixed_today: None
    }
  }

  /// Clock pinned to one calendar day.
  pub fn fixed(today: NaiveDate) -> Self {
    Self {
      tz:          chrono_tz::UTC,
      fixed_today: Some(today)
    }
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }

  pub fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    self.fixed_today.unwrap_or_else(
      || {
        Utc::now()
          .with_timezone(&self.tz)
          .date_naive()
      }
    )
  }
}

/// Resolves the board time zone: the
/// environment wins over the configured
/// name, and anything unparseable falls
/// back to UTC.
pub fn resolve_board_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "board.timezone")
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(err) => {
      tracing::warn!(
        source,
        value = trimmed,
        error = %err,
        "ignoring invalid timezone"
      );
      None
    }
  }
}

/// Signed number of calendar days from
/// `today` to `due`; negative when overdue.
#[must_use]
pub fn days_until(
  due: NaiveDate,
  today: NaiveDate
) -> i64 {
  due.signed_duration_since(today)
    .num_days()
}

pub fn parse_wire_date(
  raw: &str
) -> anyhow::Result<NaiveDate> {
  NaiveDate::parse_from_str(
    raw.trim(),
    WIRE_DATE_FORMAT
  )
  .with_context(|| {
    format!("invalid date: {raw}")
  })
}

#[must_use]
pub fn format_wire_date(
  date: NaiveDate
) -> String {
  date.format(WIRE_DATE_FORMAT)
    .to_string()
}

pub fn parse_timestamp(
  raw: &str
) -> anyhow::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(
    raw.trim()
  )
  .map(|dt| dt.with_timezone(&Utc))
  .with_context(|| {
    format!("invalid timestamp: {raw}")
  })
}

#[must_use]
pub fn format_timestamp(
  ts: DateTime<Utc>
) -> String {
  ts.to_rfc3339()
}

/// Parses a due-date expression typed by a
/// user: `YYYY-MM-DD`, `today`, `tomorrow`,
/// `yesterday`, `+3d`, `-1w`, or a weekday
/// name (the next such day, never today).
#[tracing::instrument]
pub fn parse_due_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return shift_days(today, 1);
    }
    | "yesterday" => {
      return shift_days(today, -1);
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    let mut ahead = (weekday
      .num_days_from_monday()
      as i64)
      - (today
        .weekday()
        .num_days_from_monday()
        as i64);
    if ahead <= 0 {
      ahead += 7;
    }
    return shift_days(today, ahead);
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-]?)(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps["num"]
      .parse()
      .with_context(|| {
        format!(
          "invalid relative date: {token}"
        )
      })?;
    let per_unit = match &caps["unit"] {
      | "w" => 7,
      | _ => 1
    };
    let sign = if &caps["sign"] == "-" {
      -1
    } else {
      1
    };
    return shift_days(
      today,
      sign * num * per_unit
    );
  }

  parse_wire_date(token).map_err(|_| {
    anyhow!(
      "unrecognized date expression: \
       {token}"
    )
  })
}

fn shift_days(
  date: NaiveDate,
  delta: i64
) -> anyhow::Result<NaiveDate> {
  let days =
    Days::new(delta.unsigned_abs());
  let shifted = if delta >= 0 {
    date.checked_add_days(days)
  } else {
    date.checked_sub_days(days)
  };
  shifted.ok_or_else(|| {
    anyhow!(
      "date out of range: {date} {delta:+}d"
    )
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
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
