use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::datastore::KeyValueStore;
use crate::error::{DataError, DataResult};
use crate::model::{CalendarItem, Note, Todo};
use crate::sync::{self, Record, UserData};

/// The application's data for one user, passed explicitly to every view.
///
/// Mutations go to the store first; memory changes only after the store
/// accepted the write, so a failed call leaves the last known-good state.
#[derive(Debug, Clone)]
pub struct AppData {
    user: String,
    data: UserData,
}

impl AppData {
    pub fn new(user: impl Into<String>, data: UserData) -> Self {
        Self {
            user: user.into(),
            data,
        }
    }

    #[instrument(skip(store))]
    pub fn load<S: KeyValueStore + ?Sized>(store: &S, user: &str) -> DataResult<Self> {
        let data = sync::fetch_user_data(store, user)?;
        Ok(Self::new(user, data))
    }

    /// Replaces every collection with a fresh fetch.
    #[instrument(skip(self, store), fields(user = %self.user))]
    pub fn reload<S: KeyValueStore + ?Sized>(&mut self, store: &S) -> DataResult<()> {
        self.data = sync::fetch_user_data(store, &self.user)?;
        Ok(())
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn data(&self) -> &UserData {
        &self.data
    }

    pub fn notes(&self) -> &[Note] {
        &self.data.notes
    }

    pub fn todos(&self) -> &[Todo] {
        &self.data.todos
    }

    pub fn calendar_items(&self) -> &[CalendarItem] {
        &self.data.calendar_items
    }

    pub fn note(&self, id: &str) -> DataResult<&Note> {
        find(&self.data.notes, id)
    }

    pub fn todo(&self, id: &str) -> DataResult<&Todo> {
        find(&self.data.todos, id)
    }

    pub fn calendar_item(&self, id: &str) -> DataResult<&CalendarItem> {
        find(&self.data.calendar_items, id)
    }

    pub fn save_note<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        note: Note,
        now: DateTime<Utc>,
    ) -> DataResult<String> {
        save_into(&mut self.data.notes, store, &self.user, note, now)
    }

    pub fn save_todo<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        todo: Todo,
        now: DateTime<Utc>,
    ) -> DataResult<String> {
        save_into(&mut self.data.todos, store, &self.user, todo, now)
    }

    pub fn save_calendar_item<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        item: CalendarItem,
        now: DateTime<Utc>,
    ) -> DataResult<String> {
        save_into(&mut self.data.calendar_items, store, &self.user, item, now)
    }

    pub fn modify_note<S, F>(&mut self, store: &mut S, id: &str, edit: F, now: DateTime<Utc>) -> DataResult<Note>
    where
        S: KeyValueStore + ?Sized,
        F: FnOnce(&mut Note),
    {
        modify_in(&mut self.data.notes, store, &self.user, id, edit, now)
    }

    pub fn modify_todo<S, F>(&mut self, store: &mut S, id: &str, edit: F, now: DateTime<Utc>) -> DataResult<Todo>
    where
        S: KeyValueStore + ?Sized,
        F: FnOnce(&mut Todo),
    {
        modify_in(&mut self.data.todos, store, &self.user, id, edit, now)
    }

    pub fn modify_calendar_item<S, F>(
        &mut self,
        store: &mut S,
        id: &str,
        edit: F,
        now: DateTime<Utc>,
    ) -> DataResult<CalendarItem>
    where
        S: KeyValueStore + ?Sized,
        F: FnOnce(&mut CalendarItem),
    {
        modify_in(&mut self.data.calendar_items, store, &self.user, id, edit, now)
    }

    pub fn delete_note<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, id: &str) -> DataResult<()> {
        delete_from(&mut self.data.notes, store, &self.user, id)
    }

    pub fn delete_todo<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, id: &str) -> DataResult<()> {
        delete_from(&mut self.data.todos, store, &self.user, id)
    }

    pub fn delete_calendar_item<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        id: &str,
    ) -> DataResult<()> {
        delete_from(&mut self.data.calendar_items, store, &self.user, id)
    }
}

fn find<'a, R: Record>(records: &'a [R], id: &str) -> DataResult<&'a R> {
    records
        .iter()
        .find(|record| record.id() == id)
        .ok_or_else(|| DataError::not_found(R::COLLECTION, id))
}

fn save_into<R, S>(
    records: &mut Vec<R>,
    store: &mut S,
    user: &str,
    record: R,
    now: DateTime<Utc>,
) -> DataResult<String>
where
    R: Record,
    S: KeyValueStore + ?Sized,
{
    let id = Some(record.id().to_string()).filter(|id| !id.is_empty());
    let saved = sync::save_record(store, user, id.as_deref(), record, now)?;
    let id = saved.id().to_string();

    match records.iter_mut().find(|existing| existing.id() == id) {
        Some(slot) => *slot = saved,
        None => records.push(saved),
    }
    debug!(collection = %R::COLLECTION, id = %id, "applied save to memory");
    Ok(id)
}

fn modify_in<R, S, F>(
    records: &mut Vec<R>,
    store: &mut S,
    user: &str,
    id: &str,
    edit: F,
    now: DateTime<Utc>,
) -> DataResult<R>
where
    R: Record,
    S: KeyValueStore + ?Sized,
    F: FnOnce(&mut R),
{
    let mut updated = find(records, id)?.clone();
    edit(&mut updated);
    updated.set_id(id.to_string());
    let saved = sync::save_record(store, user, Some(id), updated, now)?;

    if let Some(slot) = records.iter_mut().find(|existing| existing.id() == id) {
        *slot = saved.clone();
    }
    Ok(saved)
}

fn delete_from<R, S>(records: &mut Vec<R>, store: &mut S, user: &str, id: &str) -> DataResult<()>
where
    R: Record,
    S: KeyValueStore + ?Sized,
{
    sync::delete_record::<R, S>(store, user, id)?;
    records.retain(|record| record.id() != id);
    Ok(())
}
