use anyhow::anyhow;
use tracing::{info, instrument};

use super::modifiers::{apply_subtask_mods, apply_todo_mods, parse_words_and_mods};
use super::{Session, fall_back_to_list, split_id};
use crate::analytics::todo_stats;
use crate::board::{Board, Column, move_card};
use crate::datastore::Collection;
use crate::filter::TodoQuery;
use crate::model::{Subtask, Todo, TodoStatus};
use crate::notify::check_upcoming_deadlines;
use crate::state::AppData;

/// The todo list. Opening it also announces deadlines that are close.
#[instrument(skip(s, app, args))]
pub(super) fn cmd_todos(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let query = TodoQuery::from_terms(args)?;
    let shown = query.apply(app.todos());
    let stats = todo_stats(app.todos());
    s.renderer.print_todo_table(&shown, &stats, s.now)?;

    let window = s.deadline_window()?;
    check_upcoming_deadlines(app.todos(), s.now, window, s.notifier);
    Ok(())
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_todo(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let (id, _) = split_id(args);
    match id.map(|id| app.todo(id)) {
        Some(Ok(todo)) => s.renderer.print_todo(todo),
        _ => fall_back_to_list(s, app, Collection::Todos, id),
    }
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_todo_add(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (title, mods) = parse_words_and_mods(args, s.now, &s.tz)?;
    let title = title.ok_or_else(|| anyhow!("todo-add: title is required"))?;

    let mut todo = Todo::new(title);
    todo.user_id = Some(app.user().to_string());
    apply_todo_mods(&mut todo, &mods)?;

    let saved = app.save_todo(&mut *s.store, todo, s.now);
    let id = s.checked("saving todo", saved)?;
    info!(id = %id, "todo created");
    s.renderer.line(&format!("Created todo {id}."))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_todo_edit(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.todo(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Todos, id);
    };
    let (title, mods) = parse_words_and_mods(rest, s.now, &s.tz)?;
    if title.is_none() && mods.is_empty() {
        return Err(anyhow!("todo-edit: nothing to change"));
    }

    let mut edited = app.todo(id).map_err(anyhow::Error::new)?.clone();
    if let Some(title) = title {
        edited.title = title;
    }
    apply_todo_mods(&mut edited, &mods)?;

    let saved = app.modify_todo(&mut *s.store, id, |todo| *todo = edited, s.now);
    s.checked("saving todo", saved)?;
    s.renderer.line(&format!("Modified todo {id}."))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_todo_delete(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, _) = split_id(args);
    let Some(id) = id.filter(|id| app.todo(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Todos, id);
    };

    let deleted = app.delete_todo(&mut *s.store, id);
    s.checked("deleting todo", deleted)?;
    s.renderer.line(&format!("Deleted todo {id}."))
}

/// `done` and `start`.
#[instrument(skip(s, app, args))]
pub(super) fn cmd_set_status(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
    status: TodoStatus,
) -> anyhow::Result<()> {
    let (id, _) = split_id(args);
    let Some(id) = id.filter(|id| app.todo(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Todos, id);
    };

    let saved = app.modify_todo(&mut *s.store, id, |todo| todo.status = status, s.now);
    let todo = s.checked("saving todo", saved)?;
    s.renderer
        .line(&format!("Todo {id} is now {}: {}", status.as_str(), todo.title))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_subtask_add(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.todo(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Todos, id);
    };
    let (title, mods) = parse_words_and_mods(rest, s.now, &s.tz)?;
    let title = title.ok_or_else(|| anyhow!("subtask-add: title is required"))?;

    let mut subtask = Subtask::new(s.now.timestamp_millis().to_string(), title);
    apply_subtask_mods(&mut subtask, &mods)?;
    let subtask_id = subtask.id.clone();

    let saved = app.modify_todo(&mut *s.store, id, |todo| todo.subtasks.push(subtask), s.now);
    s.checked("saving todo", saved)?;
    s.renderer
        .line(&format!("Added subtask {subtask_id} to todo {id}."))
}

/// Flips a subtask between completed and in progress.
#[instrument(skip(s, app, args))]
pub(super) fn cmd_subtask_done(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.todo(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Todos, id);
    };
    let (subtask_id, _) = split_id(rest);
    let subtask_id = subtask_id.ok_or_else(|| anyhow!("subtask-done: subtask id is required"))?;

    let todo = app.todo(id).map_err(anyhow::Error::new)?;
    let index = todo
        .subtasks
        .iter()
        .position(|sub| sub.id == subtask_id)
        .ok_or_else(|| anyhow!("todo {id} has no subtask {subtask_id}"))?;

    let saved = app.modify_todo(
        &mut *s.store,
        id,
        |todo| {
            let sub = &mut todo.subtasks[index];
            sub.status = if sub.status.is_completed() {
                TodoStatus::InProgress
            } else {
                TodoStatus::Completed
            };
        },
        s.now,
    );
    let todo = s.checked("saving todo", saved)?;
    s.renderer.line(&format!(
        "Subtask {subtask_id} is now {}; {:.0}% of todo {id} done.",
        todo.subtasks[index].status.as_str(),
        todo.subtask_progress()
    ))
}

#[instrument(skip(s, app))]
pub(super) fn cmd_board(s: &mut Session<'_>, app: &AppData) -> anyhow::Result<()> {
    let board = Board::build(app.todos());
    s.renderer.print_board(&board)
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_move(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.todo(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Todos, id);
    };
    let raw = rest
        .first()
        .ok_or_else(|| anyhow!("move: destination column is required"))?;
    let column = Column::parse(raw).ok_or_else(|| anyhow!("unknown column: {raw}"))?;

    let mut card = app.todo(id).map_err(anyhow::Error::new)?.clone();
    if !move_card(&mut card, column) {
        return s.renderer.line(&format!("Todo {id} is already in {column}."));
    }

    let status = card.status;
    let saved = app.modify_todo(&mut *s.store, id, |todo| todo.status = status, s.now);
    s.checked("saving todo", saved)?;
    s.renderer.line(&format!("Moved todo {id} to {column}."))
}
