use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use tracing::{
  instrument,
  warn
};

use crate::datetime::{
  parse_date_expr_in,
  parse_weekday_token
};
use crate::model::{
  CalendarItem,
  EventStatus,
  Frequency,
  Importance,
  Note,
  Priority,
  Recurrence,
  Subtask,
  Todo,
  TodoStatus
};

/// One `key:value` word from the
/// command line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mod {
  Content(String),
  Category(String),
  Public(bool),
  Due(Option<DateTime<Utc>>),
  Start(DateTime<Utc>),
  End(DateTime<Utc>),
  Status(String),
  Importance(Importance),
  Location(String),
  AllDay(bool),
  Reminder(Option<u32>),
  Priority(String),
  Repeat(Frequency),
  Interval(i64),
  Weekdays(Vec<Weekday>),
  Until(Option<DateTime<Utc>>),
  From(Option<DateTime<Utc>>)
}

impl Mod {
  fn key(&self) -> &'static str {
    match self {
      | Mod::Content(_) => "content",
      | Mod::Category(_) => "category",
      | Mod::Public(_) => "public",
      | Mod::Due(_) => "due",
      | Mod::Start(_) => "start",
      | Mod::End(_) => "end",
      | Mod::Status(_) => "status",
      | Mod::Importance(_) => {
        "importance"
      }
      | Mod::Location(_) => "location",
      | Mod::AllDay(_) => "allday",
      | Mod::Reminder(_) => "reminder",
      | Mod::Priority(_) => "priority",
      | Mod::Repeat(_) => "repeat",
      | Mod::Interval(_) => "every",
      | Mod::Weekdays(_) => "on",
      | Mod::Until(_) => "until",
      | Mod::From(_) => "from"
    }
  }
}

/// Free words joined into a title, plus
/// the modifiers found among them.
/// Everything after `--` is literal.
#[instrument(skip(args, now, tz))]
pub(crate) fn parse_words_and_mods(
  args: &[String],
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<(
  Option<String>,
  Vec<Mod>
)> {
  let mut words = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" {
      literal = true;
      continue;
    }

    if !literal
      && let Some(one_mod) =
        parse_one_mod(arg, now, tz)?
    {
      mods.push(one_mod);
      continue;
    }

    words.push(arg.clone());
  }

  let title = Some(words.join(" "))
    .filter(|t| !t.trim().is_empty());
  Ok((title, mods))
}

fn parse_one_mod(
  tok: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<Option<Mod>> {
  let Some((key, value)) =
    tok.split_once(':')
  else {
    return Ok(None);
  };
  let key = key.to_ascii_lowercase();
  let date = |raw: &str| {
    parse_date_expr_in(raw, now, tz)
  };
  let optional_date = |raw: &str| {
    if is_none_word(raw) {
      Ok(None)
    } else {
      date(raw).map(Some)
    }
  };

  let one_mod = match key.as_str() {
    | "content" | "desc"
    | "description" | "text" => {
      Mod::Content(value.to_string())
    }
    | "category" | "cat" => {
      Mod::Category(value.to_string())
    }
    | "public" => {
      Mod::Public(parse_flag(&key, value)?)
    }
    | "due" => {
      Mod::Due(optional_date(value)?)
    }
    | "start" => Mod::Start(date(value)?),
    | "end" => Mod::End(date(value)?),
    | "status" => {
      Mod::Status(value.to_string())
    }
    | "importance" | "imp" => {
      Mod::Importance(
        Importance::parse(value)
          .ok_or_else(|| {
            anyhow!(
              "invalid importance: \
               {value}"
            )
          })?
      )
    }
    | "location" | "loc" | "where" => {
      Mod::Location(value.to_string())
    }
    | "allday" | "all-day" => {
      Mod::AllDay(parse_flag(&key, value)?)
    }
    | "reminder" | "notify" => {
      if is_none_word(value) {
        Mod::Reminder(None)
      } else {
        Mod::Reminder(Some(
          value.trim().parse().map_err(
            |_| {
              anyhow!(
                "reminder expects \
                 minutes, got: {value}"
              )
            }
          )?
        ))
      }
    }
    | "priority" | "pri" => {
      Mod::Priority(value.to_string())
    }
    | "repeat" | "freq" => {
      Mod::Repeat(
        Frequency::parse(value)
          .ok_or_else(|| {
            anyhow!(
              "invalid repeat \
               frequency: {value}"
            )
          })?
      )
    }
    | "every" | "interval" => {
      Mod::Interval(
        value.trim().parse().map_err(
          |_| {
            anyhow!(
              "every expects a \
               number, got: {value}"
            )
          }
        )?
      )
    }
    | "on" | "days" => {
      Mod::Weekdays(parse_weekdays(value)?)
    }
    | "until" => {
      Mod::Until(optional_date(value)?)
    }
    | "from" => {
      Mod::From(optional_date(value)?)
    }
    | _ => return Ok(None)
  };

  Ok(Some(one_mod))
}

fn parse_weekdays(
  raw: &str
) -> anyhow::Result<Vec<Weekday>> {
  let mut days = Vec::new();
  for token in raw
    .split(',')
    .map(str::trim)
    .filter(|t| !t.is_empty())
  {
    let day = parse_weekday_token(token)
      .ok_or_else(|| {
        anyhow!(
          "invalid weekday: {token}"
        )
      })?;
    if !days.contains(&day) {
      days.push(day);
    }
  }
  Ok(days)
}

fn parse_flag(
  key: &str,
  value: &str
) -> anyhow::Result<bool> {
  match value
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Ok(true),
    | "0" | "n" | "no" | "off"
    | "false" => Ok(false),
    | other => {
      Err(anyhow!(
        "{key} expects yes or no, got: \
         {other}"
      ))
    }
  }
}

fn is_none_word(raw: &str) -> bool {
  matches!(
    raw.trim()
      .to_ascii_lowercase()
      .as_str(),
    "" | "none" | "never"
  )
}

fn not_applicable(
  one_mod: &Mod,
  target: &str
) -> anyhow::Error {
  anyhow!(
    "{}: does not apply to {target}",
    one_mod.key()
  )
}

fn todo_status(
  raw: &str
) -> anyhow::Result<TodoStatus> {
  TodoStatus::parse(raw).ok_or_else(
    || anyhow!("invalid status: {raw}")
  )
}

pub(crate) fn apply_note_mods(
  note: &mut Note,
  mods: &[Mod]
) -> anyhow::Result<()> {
  for one_mod in mods {
    match one_mod {
      | Mod::Content(text) => {
        note.content = text.clone()
      }
      | Mod::Category(category) => {
        note.category = category.clone()
      }
      | Mod::Public(flag) => {
        note.is_public = *flag
      }
      | other => {
        return Err(not_applicable(
          other, "notes"
        ));
      }
    }
  }
  Ok(())
}

pub(crate) fn apply_todo_mods(
  todo: &mut Todo,
  mods: &[Mod]
) -> anyhow::Result<()> {
  for one_mod in mods {
    match one_mod {
      | Mod::Content(text) => {
        todo.content = text.clone()
      }
      | Mod::Category(category) => {
        todo.category = category.clone()
      }
      | Mod::Due(at) => todo.due_date = *at,
      | Mod::Start(at) => {
        todo.start = Some(*at)
      }
      | Mod::End(at) => todo.end = Some(*at),
      | Mod::Status(raw) => {
        todo.status = todo_status(raw)?
      }
      | Mod::Importance(level) => {
        todo.importance = *level
      }
      | other => {
        return Err(not_applicable(
          other, "todos"
        ));
      }
    }
  }
  Ok(())
}

pub(crate) fn apply_subtask_mods(
  subtask: &mut Subtask,
  mods: &[Mod]
) -> anyhow::Result<()> {
  for one_mod in mods {
    match one_mod {
      | Mod::Content(text) => {
        subtask.description = text.clone()
      }
      | Mod::Due(at) => {
        subtask.due_date = *at
      }
      | Mod::Status(raw) => {
        subtask.status = todo_status(raw)?
      }
      | Mod::Importance(level) => {
        subtask.importance = *level
      }
      | other => {
        return Err(not_applicable(
          other, "subtasks"
        ));
      }
    }
  }
  Ok(())
}

/// Applies event modifiers. Moving the
/// start keeps the duration unless an
/// explicit `end:` is also given.
pub(crate) fn apply_event_mods(
  item: &mut CalendarItem,
  mods: &[Mod]
) -> anyhow::Result<()> {
  let explicit_end = mods
    .iter()
    .any(|m| matches!(m, Mod::End(_)));

  for one_mod in mods {
    match one_mod {
      | Mod::Content(text) => {
        item.description = text.clone()
      }
      | Mod::Category(category) => {
        item.category = category.clone()
      }
      | Mod::Start(at) => {
        let duration =
          item.end - item.start;
        item.start = *at;
        if !explicit_end {
          item.end = *at + duration;
        }
      }
      | Mod::End(at) => item.end = *at,
      | Mod::Status(raw) => {
        item.status = EventStatus::parse(
          raw
        )
        .ok_or_else(|| {
          anyhow!(
            "invalid event status: {raw}"
          )
        })?
      }
      | Mod::Priority(raw) => {
        item.priority = Priority::parse(
          raw
        )
        .ok_or_else(|| {
          anyhow!(
            "invalid priority: {raw}"
          )
        })?
      }
      | Mod::Location(place) => {
        item.location = place.clone()
      }
      | Mod::AllDay(flag) => {
        item.all_day = *flag
      }
      | Mod::Reminder(minutes) => {
        item.notification = *minutes
      }
      | Mod::Repeat(freq) => {
        rule(item).frequency = *freq
      }
      | Mod::Interval(n) => {
        rule(item).interval = *n
      }
      | Mod::Weekdays(days) => {
        rule(item).weekdays = days.clone()
      }
      | Mod::Until(at) => {
        rule(item).end_date = *at
      }
      | Mod::From(at) => {
        rule(item).start = *at
      }
      | other => {
        return Err(not_applicable(
          other, "events"
        ));
      }
    }
  }

  if item.end < item.start {
    return Err(anyhow!(
      "event ends before it starts"
    ));
  }
  if let Some(rule) = &item.recurrence
    && rule.frequency == Frequency::Week
    && rule.weekdays.is_empty()
  {
    warn!(
      id = %item.id,
      "weekly rule without weekdays \
       has no occurrences"
    );
  }
  Ok(())
}

fn rule(
  item: &mut CalendarItem
) -> &mut Recurrence {
  item
    .recurrence
    .get_or_insert_with(Recurrence::default)
}

/// Default end for a new event without
/// `end:`.
pub(crate) fn default_duration(
  all_day: bool
) -> Duration {
  if all_day {
    Duration::days(1)
  } else {
    Duration::hours(1)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2024, 1, 1, 8, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn words(
    args: &[&str]
  ) -> Vec<String> {
    args
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  #[test]
  fn words_become_title_and_mods_are_typed()
  {
    let (title, mods) =
      parse_words_and_mods(
        &words(&[
          "Team",
          "sync",
          "start:2024-01-02T09:00",
          "repeat:weekly",
          "on:Tue,Thu,tue",
          "--",
          "cat:literal"
        ]),
        now(),
        &chrono_tz::UTC
      )
      .expect("parse");
    assert_eq!(
      title.as_deref(),
      Some("Team sync cat:literal")
    );
    assert_eq!(mods.len(), 3);
    assert_eq!(
      mods[2],
      Mod::Weekdays(vec![
        Weekday::Tue,
        Weekday::Thu
      ])
    );
  }

  #[test]
  fn bad_values_are_errors() {
    for bad in [
      "imp:urgent",
      "repeat:fortnightly",
      "on:Funday",
      "public:maybe",
      "every:two"
    ] {
      assert!(
        parse_words_and_mods(
          &words(&[bad]),
          now(),
          &chrono_tz::UTC
        )
        .is_err(),
        "{bad} should be rejected"
      );
    }
  }

  #[test]
  fn event_mods_build_recurrence_and_keep_duration()
   {
    let start = now();
    let mut item = CalendarItem::new(
      "standup".into(),
      start,
      start + Duration::minutes(15)
    );
    let (_, mods) = parse_words_and_mods(
      &words(&[
        "start:2024-01-03T10:00",
        "repeat:week",
        "every:2",
        "on:Wed"
      ]),
      now(),
      &chrono_tz::UTC
    )
    .expect("parse");
    apply_event_mods(&mut item, &mods)
      .expect("apply");

    assert_eq!(
      item.end - item.start,
      Duration::minutes(15)
    );
    let rule = item
      .recurrence
      .expect("rule created");
    assert_eq!(
      rule.frequency,
      Frequency::Week
    );
    assert_eq!(rule.interval, 2);
    assert_eq!(rule.weekdays, vec![
      Weekday::Wed
    ]);
  }

  #[test]
  fn mods_reject_wrong_record_kind() {
    let mut note = Note::new(
      "n".into(),
      "Work".into()
    );
    let err = apply_note_mods(
      &mut note,
      &[Mod::Due(None)]
    )
    .expect_err("due on note");
    assert!(
      err
        .to_string()
        .contains("does not apply")
    );

    let mut todo = Todo::new("t".into());
    apply_todo_mods(&mut todo, &[
      Mod::Status("done".into()),
      Mod::Importance(Importance::High)
    ])
    .expect("apply");
    assert_eq!(
      todo.status,
      TodoStatus::Completed
    );
    assert_eq!(
      todo.importance,
      Importance::High
    );
  }
}
