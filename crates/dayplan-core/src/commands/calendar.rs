use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use tracing::{info, instrument};

use super::modifiers::{apply_event_mods, default_duration, parse_words_and_mods};
use super::{Session, fall_back_to_list, split_id};
use crate::datastore::Collection;
use crate::datetime::parse_date_expr_in;
use crate::model::{CalendarItem, Frequency};
use crate::recurrence::{DateWindow, expand, expand_all, skip_occurrence};
use crate::state::AppData;

const UPCOMING_SHOWN: usize = 5;

/// The expanded calendar: `day`, `week` or `month` (default) around
/// `on:<date>` (default today), or an explicit `from:`/`to:` range.
#[instrument(skip(s, app, args))]
pub(super) fn cmd_events(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let window = resolve_window(s, args)?;
    let ctx = s.expansion()?;
    let instances = expand_all(app.calendar_items(), &window, &ctx);
    info!(count = instances.len(), "expanded calendar window");
    s.renderer.print_event_table(&instances)
}

fn resolve_window(s: &Session<'_>, args: &[String]) -> anyhow::Result<DateWindow> {
    let mut span = "month";
    let mut anchor = s.now.with_timezone(&s.tz).date_naive();
    let mut from = None;
    let mut to = None;

    for arg in args {
        if let Some(raw) = arg.strip_prefix("on:").or_else(|| arg.strip_prefix("date:")) {
            anchor = parse_day(s, raw)?;
        } else if let Some(raw) = arg.strip_prefix("from:") {
            from = Some(parse_day(s, raw)?);
        } else if let Some(raw) = arg.strip_prefix("to:") {
            to = Some(parse_day(s, raw)?);
        } else {
            span = match arg.as_str() {
                "day" | "today" => "day",
                "week" => "week",
                "month" => "month",
                other => return Err(anyhow!("unknown calendar view: {other}")),
            };
        }
    }

    if from.is_some() || to.is_some() {
        let first = from.unwrap_or(anchor);
        let last = to.unwrap_or(first);
        if last < first {
            return Err(anyhow!("calendar range ends before it starts"));
        }
        let days = (last - first).num_days().unsigned_abs() + 1;
        return Ok(DateWindow::days(first, days, &s.tz));
    }

    Ok(match span {
        "day" => DateWindow::days(anchor, 1, &s.tz),
        "week" => DateWindow::week_of(anchor, &s.tz),
        _ => DateWindow::month_of(anchor, &s.tz),
    })
}

fn parse_day(s: &Session<'_>, raw: &str) -> anyhow::Result<NaiveDate> {
    Ok(parse_date_expr_in(raw, s.now, &s.tz)?
        .with_timezone(&s.tz)
        .date_naive())
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_event(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let (id, _) = split_id(args);
    let Some(item) = id.and_then(|id| app.calendar_item(id).ok()) else {
        return fall_back_to_list(s, app, Collection::CalendarItems, id);
    };

    let summary = item
        .recurrence
        .as_ref()
        .map(|rule| rule.summary(item.start, &s.tz))
        .unwrap_or_default();
    let ctx = s.expansion()?;
    let upcoming: Vec<_> = expand(item, &ctx)
        .into_iter()
        .filter(|inst| inst.end() >= s.now)
        .take(UPCOMING_SHOWN)
        .collect();
    s.renderer.print_event(item, &summary, &upcoming)
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_event_add(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (title, mods) = parse_words_and_mods(args, s.now, &s.tz)?;
    let title = title.ok_or_else(|| anyhow!("event-add: title is required"))?;
    if !mods.iter().any(|m| matches!(m, super::modifiers::Mod::Start(_))) {
        return Err(anyhow!("event-add: start: is required"));
    }

    // Placeholder times; the start modifier moves both.
    let mut item = CalendarItem::new(title, s.now, s.now);
    item.user_id = Some(app.user().to_string());
    let all_day = mods
        .iter()
        .any(|m| matches!(m, super::modifiers::Mod::AllDay(true)));
    item.end = item.start + default_duration(all_day);
    apply_event_mods(&mut item, &mods)?;

    let start_day = item.start.with_timezone(&s.tz).weekday();
    if let Some(rule) = item.recurrence.as_mut()
        && rule.frequency == Frequency::Week
        && rule.weekdays.is_empty()
    {
        rule.weekdays.push(start_day);
    }

    let saved = app.save_calendar_item(&mut *s.store, item, s.now);
    let id = s.checked("saving event", saved)?;
    info!(id = %id, "event created");
    s.renderer.line(&format!("Created event {id}."))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_event_edit(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.calendar_item(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::CalendarItems, id);
    };
    let (title, mods) = parse_words_and_mods(rest, s.now, &s.tz)?;
    if title.is_none() && mods.is_empty() {
        return Err(anyhow!("event-edit: nothing to change"));
    }

    let mut edited = app.calendar_item(id).map_err(anyhow::Error::new)?.clone();
    if let Some(title) = title {
        edited.title = title;
    }
    apply_event_mods(&mut edited, &mods)?;

    let saved = app.modify_calendar_item(&mut *s.store, id, |item| *item = edited, s.now);
    s.checked("saving event", saved)?;
    s.renderer.line(&format!("Modified event {id}."))
}

/// Deletes the whole series, or with `date:<day>` only that occurrence.
#[instrument(skip(s, app, args))]
pub(super) fn cmd_event_delete(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.calendar_item(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::CalendarItems, id);
    };

    if let Some(raw) = rest.iter().find_map(|arg| arg.strip_prefix("date:")) {
        let day = parse_day(s, raw)?;
        return skip_one(s, app, id, day);
    }

    let deleted = app.delete_calendar_item(&mut *s.store, id);
    s.checked("deleting event", deleted)?;
    s.renderer.line(&format!("Deleted event {id}."))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_skip(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.calendar_item(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::CalendarItems, id);
    };
    let raw = rest
        .first()
        .ok_or_else(|| anyhow!("skip: occurrence date is required"))?;
    let day = parse_day(s, raw)?;
    skip_one(s, app, id, day)
}

fn skip_one(
    s: &mut Session<'_>,
    app: &mut AppData,
    id: &str,
    day: NaiveDate,
) -> anyhow::Result<()> {
    let current = app.calendar_item(id).map_err(anyhow::Error::new)?;
    let updated = skip_occurrence(current, day).ok_or_else(|| {
        anyhow!("event {id} does not repeat; use event-delete to remove it")
    })?;

    let saved = app.modify_calendar_item(&mut *s.store, id, |item| *item = updated, s.now);
    s.checked("saving event", saved)?;
    s.renderer
        .line(&format!("Skipped {} of event {id}.", day.format("%Y-%m-%d")))
}
