use anyhow::anyhow;
use tracing::{info, instrument};

use super::modifiers::{apply_note_mods, parse_words_and_mods};
use super::{Session, fall_back_to_list, split_id};
use crate::datastore::Collection;
use crate::filter::{note_directory, visible_notes};
use crate::model::Note;
use crate::state::AppData;

#[instrument(skip(s, app, args))]
pub(super) fn cmd_notes(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let show_public = args
        .iter()
        .any(|arg| matches!(arg.as_str(), "public" | "--public" | "all"));
    let visible = visible_notes(app.notes(), app.user(), show_public);
    let directory = note_directory(&visible);
    s.renderer.print_note_directory(&directory)
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_note(s: &mut Session<'_>, app: &AppData, args: &[String]) -> anyhow::Result<()> {
    let (id, _) = split_id(args);
    match id.map(|id| app.note(id)) {
        Some(Ok(note)) => s.renderer.print_note(note),
        _ => fall_back_to_list(s, app, Collection::Notes, id),
    }
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_note_add(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (title, mods) = parse_words_and_mods(args, s.now, &s.tz)?;
    let title = title.ok_or_else(|| anyhow!("note-add: title is required"))?;

    let mut note = Note::new(title, String::new());
    note.user_id = Some(app.user().to_string());
    apply_note_mods(&mut note, &mods)?;

    let saved = app.save_note(&mut *s.store, note, s.now);
    let id = s.checked("saving note", saved)?;
    info!(id = %id, "note created");
    s.renderer.line(&format!("Created note {id}."))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_note_edit(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, rest) = split_id(args);
    let Some(id) = id.filter(|id| app.note(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Notes, id);
    };
    let (title, mods) = parse_words_and_mods(rest, s.now, &s.tz)?;
    if title.is_none() && mods.is_empty() {
        return Err(anyhow!("note-edit: nothing to change"));
    }

    let mut edited = app.note(id).map_err(anyhow::Error::new)?.clone();
    if let Some(title) = title {
        edited.title = title;
    }
    apply_note_mods(&mut edited, &mods)?;

    let saved = app.modify_note(&mut *s.store, id, |note| *note = edited, s.now);
    s.checked("saving note", saved)?;
    s.renderer.line(&format!("Modified note {id}."))
}

#[instrument(skip(s, app, args))]
pub(super) fn cmd_note_delete(
    s: &mut Session<'_>,
    app: &mut AppData,
    args: &[String],
) -> anyhow::Result<()> {
    let (id, _) = split_id(args);
    let Some(id) = id.filter(|id| app.note(id).is_ok()) else {
        return fall_back_to_list(s, app, Collection::Notes, id);
    };

    let deleted = app.delete_note(&mut *s.store, id);
    s.checked("deleting note", deleted)?;
    s.renderer.line(&format!("Deleted note {id}."))
}
