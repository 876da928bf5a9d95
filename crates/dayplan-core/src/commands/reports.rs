use anyhow::anyhow;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::Session;
use crate::analytics::{Dashboard, todo_stats};
use crate::notify::check_upcoming_deadlines;
use crate::state::AppData;

#[instrument(skip(s, app))]
pub(super) fn cmd_stats(s: &mut Session<'_>, app: &AppData) -> anyhow::Result<()> {
    s.renderer.print_stats(&todo_stats(app.todos()))
}

#[instrument(skip(s, app))]
pub(super) fn cmd_dashboard(s: &mut Session<'_>, app: &AppData) -> anyhow::Result<()> {
    let dashboard = Dashboard::compute(app.todos(), app.calendar_items(), s.now, &s.tz);
    s.renderer.print_dashboard(&dashboard)
}

#[instrument(skip(s, app))]
pub(super) fn cmd_deadlines(s: &mut Session<'_>, app: &AppData) -> anyhow::Result<()> {
    let window = s.deadline_window()?;
    let count = check_upcoming_deadlines(app.todos(), s.now, window, s.notifier);
    info!(count, "checked upcoming deadlines");
    s.renderer.line(&format!(
        "{count} upcoming deadline(s) in the next {} hours.",
        window.num_hours()
    ))
}

/// Pretty JSON of one collection, or all three keyed by wire name.
#[instrument(skip(s, app, args))]
pub(super) fn cmd_export(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let which = args.first().map(String::as_str).unwrap_or("all");
    let value = match which {
        "notes" => serde_json::to_value(app.notes())?,
        "todos" => serde_json::to_value(app.todos())?,
        "events" | "calendarItems" => serde_json::to_value(app.calendar_items())?,
        "all" => {
            let mut all = Map::new();
            all.insert("notes".into(), serde_json::to_value(app.notes())?);
            all.insert("todos".into(), serde_json::to_value(app.todos())?);
            all.insert(
                "calendarItems".into(),
                serde_json::to_value(app.calendar_items())?,
            );
            Value::Object(all)
        }
        other => return Err(anyhow!("export: unknown collection {other}")),
    };
    s.renderer.line(&serde_json::to_string_pretty(&value)?)
}
