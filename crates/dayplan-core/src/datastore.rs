use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{DataError, DataResult};

/// The three logical collections, each namespaced per user as
/// `{collection}/{user}/{key}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Notes,
    Todos,
    CalendarItems,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Notes,
        Collection::Todos,
        Collection::CalendarItems,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Collection::Notes => "notes",
            Collection::Todos => "todos",
            Collection::CalendarItems => "calendarItems",
        }
    }

    /// Prefix for synthesized record keys (`{prefix}{epoch-millis}`).
    pub fn id_prefix(self) -> &'static str {
        self.path()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Raw records of one collection, keyed by record key.
pub type RawCollection = Map<String, Value>;

/// Read-whole-collection / write-one / delete-one access to the backing
/// store. No querying happens on the store side.
///
/// Writes replace the record at its key unconditionally: last writer wins.
pub trait KeyValueStore {
    /// `Ok(None)` when nothing was ever written for this user.
    fn read_collection(&self, collection: Collection, user: &str)
    -> DataResult<Option<RawCollection>>;

    fn write_record(
        &mut self,
        collection: Collection,
        user: &str,
        key: &str,
        value: Value,
    ) -> DataResult<()>;

    /// Removing an absent key is not an error.
    fn delete_record(&mut self, collection: Collection, user: &str, key: &str) -> DataResult<()>;
}

/// One JSON document per `{data_dir}/{collection}/{user}.json`, replaced
/// atomically on every write.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        for collection in Collection::ALL {
            let dir = data_dir.join(collection.path());
            fs::create_dir_all(&dir).map_err(|err| {
                anyhow::anyhow!("failed to create {}: {err}", dir.display())
            })?;
        }

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn collection_path(&self, collection: Collection, user: &str) -> PathBuf {
        self.data_dir
            .join(collection.path())
            .join(format!("{}.json", sanitize_user(user)))
    }

    fn load(&self, collection: Collection, user: &str) -> DataResult<Option<RawCollection>> {
        let path = self.collection_path(collection, user);
        if !path.exists() {
            debug!(file = %path.display(), "collection file absent");
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let map: RawCollection = serde_json::from_str(&raw)?;
        debug!(file = %path.display(), count = map.len(), "loaded collection");
        Ok(Some(map))
    }

    fn persist(&self, collection: Collection, user: &str, map: &RawCollection) -> DataResult<()> {
        let path = self.collection_path(collection, user);
        debug!(file = %path.display(), count = map.len(), "saving collection atomically");

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string_pretty(map)?;
        writeln!(temp, "{serialized}")?;
        temp.flush()?;

        temp.persist(&path).map_err(|err| DataError::Persist {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn read_collection(
        &self,
        collection: Collection,
        user: &str,
    ) -> DataResult<Option<RawCollection>> {
        self.load(collection, user)
    }

    #[tracing::instrument(skip(self, value))]
    fn write_record(
        &mut self,
        collection: Collection,
        user: &str,
        key: &str,
        value: Value,
    ) -> DataResult<()> {
        let mut map = self.load(collection, user)?.unwrap_or_default();
        map.insert(key.to_string(), value);
        self.persist(collection, user, &map)
    }

    #[tracing::instrument(skip(self))]
    fn delete_record(&mut self, collection: Collection, user: &str, key: &str) -> DataResult<()> {
        let Some(mut map) = self.load(collection, user)? else {
            return Ok(());
        };
        if map.remove(key).is_none() {
            debug!(key, "delete of absent key");
            return Ok(());
        }
        self.persist(collection, user, &map)
    }
}

/// Keeps user ids from escaping the collection directory.
fn sanitize_user(user: &str) -> String {
    let cleaned: String = user
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<(Collection, String), RawCollection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read_collection(
        &self,
        collection: Collection,
        user: &str,
    ) -> DataResult<Option<RawCollection>> {
        Ok(self
            .entries
            .get(&(collection, user.to_string()))
            .filter(|map| !map.is_empty())
            .cloned())
    }

    fn write_record(
        &mut self,
        collection: Collection,
        user: &str,
        key: &str,
        value: Value,
    ) -> DataResult<()> {
        self.entries
            .entry((collection, user.to_string()))
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete_record(&mut self, collection: Collection, user: &str, key: &str) -> DataResult<()> {
        if let Some(map) = self.entries.get_mut(&(collection, user.to_string())) {
            map.remove(key);
        }
        Ok(())
    }
}
