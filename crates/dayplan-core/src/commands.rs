mod calendar;
mod modifiers;
mod notes;
mod reports;
mod todos;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::{Collection, KeyValueStore};
use crate::error::DataResult;
use crate::notify::{Notifier, report_failure};
use crate::recurrence::ExpansionContext;
use crate::render::Renderer;
use crate::state::AppData;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "notes",
        "note",
        "note-add",
        "note-edit",
        "note-delete",
        "todos",
        "todo",
        "todo-add",
        "todo-edit",
        "todo-delete",
        "done",
        "start",
        "subtask-add",
        "subtask-done",
        "board",
        "move",
        "events",
        "event",
        "event-add",
        "event-edit",
        "event-delete",
        "skip",
        "stats",
        "dashboard",
        "deadlines",
        "export",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything a command needs besides its arguments.
pub struct Session<'a> {
    pub store: &'a mut dyn KeyValueStore,
    pub cfg: &'a Config,
    pub renderer: &'a mut Renderer,
    pub notifier: &'a dyn Notifier,
    pub user: String,
    pub tz: Tz,
    pub now: DateTime<Utc>,
}

impl Session<'_> {
    /// Store failures become a toast plus an error carrying `context`.
    fn checked<T>(&self, context: &str, result: DataResult<T>) -> anyhow::Result<T> {
        result.map_err(|err| {
            report_failure(self.notifier, context, &err);
            anyhow::Error::new(err).context(context.to_string())
        })
    }

    fn expansion(&self) -> anyhow::Result<ExpansionContext> {
        self.cfg.expansion_context(self.tz, self.now)
    }

    fn deadline_window(&self) -> anyhow::Result<Duration> {
        Ok(Duration::hours(self.cfg.deadline_window_hours()?))
    }
}

#[instrument(skip(session, inv), fields(user = %session.user, command = %inv.command))]
pub fn dispatch(mut session: Session<'_>, inv: Invocation) -> anyhow::Result<()> {
    if inv.command == "help" {
        return cmd_help(&mut session);
    }
    if inv.command == "version" {
        return session.renderer.line(env!("CARGO_PKG_VERSION"));
    }

    let loaded = AppData::load(&*session.store, &session.user);
    let mut app = session.checked("loading data", loaded)?;
    let args = inv.command_args.as_slice();

    debug!(args = ?args, "dispatching command");

    let s = &mut session;
    match inv.command.as_str() {
        "notes" => notes::cmd_notes(s, &app, args),
        "note" => notes::cmd_note(s, &app, args),
        "note-add" => notes::cmd_note_add(s, &mut app, args),
        "note-edit" => notes::cmd_note_edit(s, &mut app, args),
        "note-delete" => notes::cmd_note_delete(s, &mut app, args),
        "todos" => todos::cmd_todos(s, &app, args),
        "todo" => todos::cmd_todo(s, &app, args),
        "todo-add" => todos::cmd_todo_add(s, &mut app, args),
        "todo-edit" => todos::cmd_todo_edit(s, &mut app, args),
        "todo-delete" => todos::cmd_todo_delete(s, &mut app, args),
        "done" => todos::cmd_set_status(s, &mut app, args, crate::model::TodoStatus::Completed),
        "start" => todos::cmd_set_status(s, &mut app, args, crate::model::TodoStatus::InProgress),
        "subtask-add" => todos::cmd_subtask_add(s, &mut app, args),
        "subtask-done" => todos::cmd_subtask_done(s, &mut app, args),
        "board" => todos::cmd_board(s, &app),
        "move" => todos::cmd_move(s, &mut app, args),
        "events" => calendar::cmd_events(s, &app, args),
        "event" => calendar::cmd_event(s, &app, args),
        "event-add" => calendar::cmd_event_add(s, &mut app, args),
        "event-edit" => calendar::cmd_event_edit(s, &mut app, args),
        "event-delete" => calendar::cmd_event_delete(s, &mut app, args),
        "skip" => calendar::cmd_skip(s, &mut app, args),
        "stats" => reports::cmd_stats(s, &app),
        "dashboard" => reports::cmd_dashboard(s, &app),
        "deadlines" => reports::cmd_deadlines(s, &app),
        "export" => reports::cmd_export(s, &app, args),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// First argument as a record id, rest untouched.
fn split_id(args: &[String]) -> (Option<&str>, &[String]) {
    match args.split_first() {
        Some((id, rest)) if !id.trim().is_empty() => (Some(id.trim()), rest),
        _ => (None, args),
    }
}

/// A detail or edit command named a record that does not exist: say so
/// and show the list the record would have been in.
fn fall_back_to_list(
    s: &mut Session<'_>,
    app: &AppData,
    collection: Collection,
    id: Option<&str>,
) -> anyhow::Result<()> {
    let message = match id {
        Some(id) => format!("No {} with id {id}; showing the list instead.", singular(collection)),
        None => format!("No {} id given; showing the list instead.", singular(collection)),
    };
    warn!(collection = %collection, id = ?id, "record not found");
    s.renderer.line(&message)?;

    match collection {
        Collection::Notes => notes::cmd_notes(s, app, &[]),
        Collection::Todos => todos::cmd_todos(s, app, &[]),
        Collection::CalendarItems => calendar::cmd_events(s, app, &[]),
    }
}

fn singular(collection: Collection) -> &'static str {
    match collection {
        Collection::Notes => "note",
        Collection::Todos => "todo",
        Collection::CalendarItems => "event",
    }
}

fn cmd_help(s: &mut Session<'_>) -> anyhow::Result<()> {
    const HELP: &[(&str, &str)] = &[
        ("notes [public]", "notes grouped by category"),
        ("note <id>", "show one note"),
        ("note-add <title> [cat:] [content:] [public:yes]", "create a note"),
        ("note-edit <id> [title] [mods]", "change a note"),
        ("note-delete <id>", "remove a note"),
        ("todos [status:] [sort:] [words]", "todo list with stats"),
        ("todo <id>", "show one todo and its subtasks"),
        ("todo-add <title> [due:] [imp:] [cat:] [status:]", "create a todo"),
        ("todo-edit <id> [title] [mods]", "change a todo"),
        ("todo-delete <id>", "remove a todo"),
        ("done <id> / start <id>", "mark completed / in progress"),
        ("subtask-add <todo-id> <title> [due:] [imp:]", "add a subtask"),
        ("subtask-done <todo-id> <subtask-id>", "toggle a subtask"),
        ("board", "kanban columns"),
        ("move <id> <to-do|in-progress|done>", "move a card"),
        ("events [day|week|month] [on:date] [from: to:]", "expanded calendar"),
        ("event <id>", "show one event and its next occurrences"),
        ("event-add <title> start: [end:] [repeat:] [every:] [on:] [until:]", "create an event"),
        ("event-edit <id> [title] [mods]", "change an event or series"),
        ("event-delete <id> [date:]", "remove a series, or one occurrence"),
        ("skip <id> <date>", "remove one occurrence of a series"),
        ("stats", "todo statistics"),
        ("dashboard", "analytics overview"),
        ("deadlines", "announce todos due soon"),
        ("export [notes|todos|events]", "JSON dump"),
    ];

    s.renderer.line("usage: dayplan [options] <command> [args]")?;
    s.renderer.line("")?;
    let width = HELP.iter().map(|(usage, _)| usage.len()).max().unwrap_or(0);
    for (usage, about) in HELP {
        s.renderer.line(&format!("  {usage:width$}  {about}"))?;
    }
    Ok(())
}
