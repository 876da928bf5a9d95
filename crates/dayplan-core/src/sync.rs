//! Conversion between raw store records and typed collections.
//!
//! Reads attach the record key as `id` and hydrate instants; writes stamp
//! `lastEdited`, synthesize missing ids and serialize instants back to
//! their wire form. Nothing here checks for concurrent writers: the last
//! write to a key wins.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::datastore::{Collection, KeyValueStore};
use crate::error::DataResult;
use crate::model::{CalendarItem, Note, Todo};

/// A typed record living in one of the store's collections.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn set_last_edited(&mut self, millis: i64);
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn set_last_edited(&mut self, millis: i64) {
                self.last_edited = millis;
            }
        }
    };
}

impl_record!(Note, Collection::Notes);
impl_record!(Todo, Collection::Todos);
impl_record!(CalendarItem, Collection::CalendarItems);

/// Everything one user owns, fully hydrated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    pub notes: Vec<Note>,
    pub todos: Vec<Todo>,
    pub calendar_items: Vec<CalendarItem>,
}

#[tracing::instrument(skip(store))]
pub fn fetch_user_data<S>(store: &S, user: &str) -> DataResult<UserData>
where
    S: KeyValueStore + ?Sized,
{
    let data = UserData {
        notes: fetch_collection(store, user)?,
        todos: fetch_collection(store, user)?,
        calendar_items: fetch_collection(store, user)?,
    };
    info!(
        notes = data.notes.len(),
        todos = data.todos.len(),
        calendar_items = data.calendar_items.len(),
        "fetched user data"
    );
    Ok(data)
}

/// Reads a whole collection. An absent collection is empty; a record
/// that does not decode is skipped with a warning.
pub fn fetch_collection<R, S>(store: &S, user: &str) -> DataResult<Vec<R>>
where
    R: Record,
    S: KeyValueStore + ?Sized,
{
    let Some(raw) = store.read_collection(R::COLLECTION, user)? else {
        debug!(collection = %R::COLLECTION, "collection absent; using empty");
        return Ok(vec![]);
    };

    let mut out = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        let Value::Object(mut fields) = value else {
            warn!(collection = %R::COLLECTION, key = %key, "skipping non-object record");
            continue;
        };
        fields.insert("id".to_string(), Value::String(key.clone()));

        match serde_json::from_value::<R>(Value::Object(fields)) {
            Ok(record) => out.push(record),
            Err(err) => {
                warn!(
                    collection = %R::COLLECTION,
                    key = %key,
                    error = %err,
                    "skipping malformed record"
                );
            }
        }
    }
    Ok(out)
}

/// `{collection-prefix}{epoch-millis}`. Unique only for a single writer.
pub fn synthesize_id(collection: Collection, now: DateTime<Utc>) -> String {
    format!("{}{}", collection.id_prefix(), now.timestamp_millis())
}

/// Writes `record` under `id` (or a freshly synthesized key) and returns
/// the record exactly as stored.
#[tracing::instrument(skip(store, record, now), fields(collection = %R::COLLECTION))]
pub fn save_record<R, S>(
    store: &mut S,
    user: &str,
    id: Option<&str>,
    mut record: R,
    now: DateTime<Utc>,
) -> DataResult<R>
where
    R: Record,
    S: KeyValueStore + ?Sized,
{
    let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => synthesize_id(R::COLLECTION, now),
    };
    record.set_id(id.clone());
    record.set_last_edited(now.timestamp_millis());

    let payload = serde_json::to_value(&record)?;
    store.write_record(R::COLLECTION, user, &id, payload)?;
    info!(id = %id, "saved record");
    Ok(record)
}

#[tracing::instrument(skip(store), fields(collection = %R::COLLECTION))]
pub fn delete_record<R, S>(store: &mut S, user: &str, id: &str) -> DataResult<()>
where
    R: Record,
    S: KeyValueStore + ?Sized,
{
    store.delete_record(R::COLLECTION, user, id)?;
    info!(id = %id, "deleted record");
    Ok(())
}

pub fn save_note<S: KeyValueStore + ?Sized>(
    store: &mut S,
    user: &str,
    id: Option<&str>,
    note: Note,
    now: DateTime<Utc>,
) -> DataResult<String> {
    save_record(store, user, id, note, now).map(|saved| saved.id)
}

pub fn save_todo<S: KeyValueStore + ?Sized>(
    store: &mut S,
    user: &str,
    id: Option<&str>,
    todo: Todo,
    now: DateTime<Utc>,
) -> DataResult<String> {
    save_record(store, user, id, todo, now).map(|saved| saved.id)
}

pub fn save_calendar_item<S: KeyValueStore + ?Sized>(
    store: &mut S,
    user: &str,
    id: Option<&str>,
    item: CalendarItem,
    now: DateTime<Utc>,
) -> DataResult<String> {
    save_record(store, user, id, item, now).map(|saved| saved.id)
}

pub fn delete_note<S: KeyValueStore + ?Sized>(store: &mut S, user: &str, id: &str) -> DataResult<()> {
    delete_record::<Note, S>(store, user, id)
}

pub fn delete_todo<S: KeyValueStore + ?Sized>(store: &mut S, user: &str, id: &str) -> DataResult<()> {
    delete_record::<Todo, S>(store, user, id)
}

pub fn delete_calendar_item<S: KeyValueStore + ?Sized>(
    store: &mut S,
    user: &str,
    id: &str,
) -> DataResult<()> {
    delete_record::<CalendarItem, S>(store, user, id)
}
