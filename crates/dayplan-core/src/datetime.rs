use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "dayplan-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYPLAN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DAYPLAN_TIME_CONFIG";

/// Wire format for instants: RFC 3339,
/// UTC, millisecond precision. Sorts
/// lexically.
pub const WIRE_INSTANT_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S%.3fZ";
pub const WIRE_DATE_FORMAT: &str =
  "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_project_date(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(project_timezone())
    .format(WIRE_DATE_FORMAT)
    .to_string()
}

#[must_use]
pub fn format_project_datetime(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(project_timezone())
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

#[must_use]
pub fn format_wire_instant(
  dt: DateTime<Utc>
) -> String {
  dt.format(WIRE_INSTANT_FORMAT)
    .to_string()
}

/// Three-letter weekday token as stored
/// in recurrence rules (`Mon`..`Sun`).
#[must_use]
pub fn weekday_token(
  day: Weekday
) -> &'static str {
  match day {
    | Weekday::Mon => "Mon",
    | Weekday::Tue => "Tue",
    | Weekday::Wed => "Wed",
    | Weekday::Thu => "Thu",
    | Weekday::Fri => "Fri",
    | Weekday::Sat => "Sat",
    | Weekday::Sun => "Sun"
  }
}

pub fn parse_weekday_token(
  token: &str
) -> Option<Weekday> {
  parse_weekday_name(
    &token.trim().to_ascii_lowercase()
  )
}

fn resolve_project_timezone() -> Tz {
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

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
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
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
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

/// Resolves a wall-clock time in `tz`.
///
/// Ambiguous times (DST fold) take the
/// earliest instant. Times inside a DST
/// gap are pushed forward by the gap
/// length, the way a wall clock would
/// read them.
#[must_use]
pub fn local_to_utc(
  tz: &Tz,
  local_naive: NaiveDateTime
) -> DateTime<Utc> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      local_dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      chosen.with_timezone(&Utc)
    }
    | LocalResult::None => {
      let mut probe = local_naive;
      for _ in 0..4 {
        probe += Duration::minutes(30);
        if let Some(dt) = tz
          .from_local_datetime(&probe)
          .earliest()
        {
          tracing::debug!(
            requested = %local_naive,
            resolved = %dt,
            "local time fell in a DST gap"
          );
          return dt.with_timezone(&Utc);
        }
      }
      Utc.from_utc_datetime(&local_naive)
    }
  }
}

fn project_midnight(
  tz: &Tz,
  date: NaiveDate
) -> DateTime<Utc> {
  local_to_utc(
    tz,
    date.and_time(chrono::NaiveTime::MIN)
  )
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  parse_date_expr_in(
    input,
    now,
    project_timezone()
  )
}

pub fn parse_date_expr_in(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let local_today =
    now.with_timezone(tz).date_naive();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(project_midnight(
        tz,
        local_today
      ));
    }
    | "tomorrow" => {
      return Ok(project_midnight(
        tz,
        local_today + Duration::days(1)
      ));
    }
    | "yesterday" => {
      return Ok(project_midnight(
        tz,
        local_today - Duration::days(1)
      ));
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      local_today,
      target_weekday
    );
    return Ok(project_midnight(
      tz,
      target_date
    ));
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[wdhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "w" => Duration::weeks(num),
      | "d" => Duration::days(num),
      | "h" => Duration::hours(num),
      | "m" => Duration::minutes(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    return Ok(
      if sign == "-" {
        now - duration
      } else {
        now + duration
      }
    );
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      WIRE_DATE_FORMAT
    )
  {
    return Ok(project_midnight(
      tz, date
    ));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(local_to_utc(tz, ndt));
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     +Nw/+Nd/+Nh/+Nm, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM"
  })
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
  use chrono::Datelike;

  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx =
    target.num_days_from_monday()
      as i64;
  let mut delta =
    (target_idx - from_idx + 7) % 7;
  if delta == 0 {
    delta = 7;
  }
  from + Duration::days(delta)
}

const NAIVE_WIRE_FORMATS: [&str; 3] = [
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f"
];

/// Reads a stored instant string.
///
/// Besides RFC 3339, form inputs left
/// bare dates (`2024-04-15`, local
/// midnight) and zone-less date-times
/// (`2024-04-16T09:30`, local wall
/// clock) in the store.
pub fn parse_wire_instant_in(
  text: &str,
  tz: &Tz
) -> Result<DateTime<Utc>, String> {
  let trimmed = text.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed,
      WIRE_DATE_FORMAT
    )
  {
    return Ok(project_midnight(
      tz, date
    ));
  }
  NAIVE_WIRE_FORMATS
    .iter()
    .find_map(|fmt| {
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
      .ok()
    })
    .map(|naive| local_to_utc(tz, naive))
    .ok_or_else(|| {
      format!(
        "invalid instant '{text}'"
      )
    })
}

/// Lenient serde for stored instants.
///
/// Reads RFC 3339 strings, bare or
/// zone-less local forms, or epoch
/// milliseconds; writes
/// [`WIRE_INSTANT_FORMAT`].
pub mod wire_instant {
  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use serde_json::Value;

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_wire_instant(*dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Value::deserialize(deserializer)?;
    from_value(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub(crate) fn from_value(
    raw: &Value
  ) -> Result<DateTime<Utc>, String> {
    match raw {
      | Value::String(text) => {
        super::parse_wire_instant_in(
          text,
          super::project_timezone()
        )
      }
      | Value::Number(num) => {
        let millis =
          num.as_i64().ok_or_else(
            || {
              format!(
                "invalid epoch \
                 millis: {num}"
              )
            }
          )?;
        Utc
          .timestamp_millis_opt(millis)
          .single()
          .ok_or_else(|| {
            format!(
              "epoch millis out of \
               range: {millis}"
            )
          })
      }
      | other => {
        Err(format!(
          "expected instant string or \
           number, got {other}"
        ))
      }
    }
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };
    use serde_json::Value;

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    /// `null`, a missing key and an
    /// empty string all read as `None`.
    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let raw = Option::<Value>::deserialize(
        deserializer
      )?;
      match raw {
        | None | Some(Value::Null) => {
          Ok(None)
        }
        | Some(Value::String(text))
          if text.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(value) => {
          super::from_value(&value)
            .map(Some)
            .map_err(
              serde::de::Error::custom
            )
        }
      }
    }
  }
}

/// Serde for blackout dates: written as
/// `YYYY-MM-DD`, read from either a date
/// or a full instant (reduced to the
/// project-local calendar date).
pub mod wire_dates {
  use chrono::NaiveDate;
  use serde::ser::SerializeSeq;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dates: &[NaiveDate],
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    let mut seq = serializer
      .serialize_seq(Some(dates.len()))?;
    for date in dates {
      seq.serialize_element(
        &date
          .format(super::WIRE_DATE_FORMAT)
          .to_string()
      )?;
    }
    seq.end()
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Vec<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = Option::<Vec<String>>::deserialize(
      deserializer
    )?
    .unwrap_or_default();

    let mut out =
      Vec::with_capacity(raw.len());
    for text in raw {
      out.push(parse_day(&text).map_err(
        serde::de::Error::custom
      )?);
    }
    Ok(out)
  }

  pub(crate) fn parse_day(
    text: &str
  ) -> Result<NaiveDate, String> {
    let trimmed = text.trim();
    if let Ok(date) =
      NaiveDate::parse_from_str(
        trimmed,
        super::WIRE_DATE_FORMAT
      )
    {
      return Ok(date);
    }
    let tz = super::project_timezone();
    super::parse_wire_instant_in(
      trimmed, tz
    )
    .map(|dt| {
      dt.with_timezone(tz).date_naive()
    })
    .map_err(|err| {
      format!("invalid blackout date: {err}")
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc,
    Weekday
  };
  use serde::{
    Deserialize,
    Serialize
  };

  use super::{
    parse_date_expr_in,
    parse_weekday_token,
    parse_wire_instant_in,
    weekday_token
  };

  #[derive(Serialize, Deserialize)]
  struct Stamped {
    #[serde(
      default,
      with = "super::wire_instant::option"
    )]
    at: Option<chrono::DateTime<Utc>>
  }

  #[test]
  fn parses_weekday_name() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed = parse_date_expr_in(
      "wednesday",
      now,
      &chrono_tz::UTC
    )
    .expect("parse weekday");
    assert_eq!(
      parsed
        .format("%Y-%m-%d")
        .to_string(),
      "2026-02-18"
    );
  }

  #[test]
  fn parses_local_datetime_in_zone() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed = parse_date_expr_in(
      "2026-03-01T09:30",
      now,
      &chrono_tz::Europe::Berlin
    )
    .expect("parse datetime");
    assert_eq!(
      parsed.to_rfc3339(),
      "2026-03-01T08:30:00+00:00"
    );
  }

  #[test]
  fn parses_relative_weeks() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed = parse_date_expr_in(
      "+2w",
      now,
      &chrono_tz::UTC
    )
    .expect("parse relative");
    assert_eq!(
      (parsed - now).num_days(),
      14
    );
  }

  #[test]
  fn weekday_tokens_match_stored_form() {
    assert_eq!(
      weekday_token(Weekday::Wed),
      "Wed"
    );
    assert_eq!(
      parse_weekday_token("Thu"),
      Some(Weekday::Thu)
    );
    assert_eq!(
      parse_weekday_token("Xyz"),
      None
    );
  }

  #[test]
  fn wire_instant_reads_strings_and_millis()
  {
    let from_text: Stamped =
      serde_json::from_str(
        r#"{"at":"2024-01-01T09:00:00.000Z"}"#
      )
      .expect("string instant");
    let from_millis: Stamped =
      serde_json::from_str(
        r#"{"at":1704099600000}"#
      )
      .expect("millis instant");
    assert_eq!(
      from_text.at,
      from_millis.at
    );

    let empty: Stamped =
      serde_json::from_str(
        r#"{"at":""}"#
      )
      .expect("empty instant");
    assert!(empty.at.is_none());

    let written =
      serde_json::to_string(&from_text)
        .expect("serialize");
    assert_eq!(
      written,
      r#"{"at":"2024-01-01T09:00:00.000Z"}"#
    );
  }

  #[test]
  fn wire_instant_reads_form_input_shapes()
  {
    let berlin =
      &chrono_tz::Europe::Berlin;
    let day = parse_wire_instant_in(
      "2024-04-15",
      berlin
    )
    .expect("bare date");
    assert_eq!(
      day.to_rfc3339(),
      "2024-04-14T22:00:00+00:00"
    );

    let minutes = parse_wire_instant_in(
      "2024-04-16T09:30",
      berlin
    )
    .expect("local minutes");
    assert_eq!(
      minutes.to_rfc3339(),
      "2024-04-16T07:30:00+00:00"
    );

    let seconds = parse_wire_instant_in(
      " 2024-01-01T09:00:15 ",
      berlin
    )
    .expect("local seconds");
    assert_eq!(
      seconds.to_rfc3339(),
      "2024-01-01T08:00:15+00:00"
    );

    let zoned = parse_wire_instant_in(
      "2024-01-01T09:00:00.000Z",
      berlin
    )
    .expect("rfc3339");
    assert_eq!(
      zoned.to_rfc3339(),
      "2024-01-01T09:00:00+00:00"
    );

    assert!(
      parse_wire_instant_in(
        "next tuesday",
        berlin
      )
      .is_err()
    );
  }
}
