use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{tables::Tables, PersistentStore, RecipeRow, StoreError, StoreResult, TypeRow};

/// Store backed by a single JSON document on disk.
///
/// The whole document is held in memory and rewritten after every mutation.
/// Writes go to a sibling temp file which is then renamed over the target, so
/// a crash never leaves a half-written document behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<Option<Tables>>,
}

impl JsonFileStore {
    /// Open the document at `path`, reading it if it exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tables = read_tables(&path)?;
        info!(
            path = %path.display(),
            recipes = tables.recipes.len(),
            types = tables.types.len(),
            "Opened recipe store"
        );
        Ok(Self {
            path,
            state: Mutex::new(Some(tables)),
        })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let guard = self.state.lock();
        let tables = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(f(tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.state.lock();
        let tables = guard.as_mut().ok_or(StoreError::Closed)?;
        // Mutate a copy so a failed write leaves memory matching disk.
        let mut next = tables.clone();
        let value = f(&mut next)?;
        persist(&self.path, &next)?;
        *tables = next;
        Ok(value)
    }
}

impl PersistentStore for JsonFileStore {
    fn create_schema(&self) -> StoreResult<()> {
        let guard = self.state.lock();
        let tables = guard.as_ref().ok_or(StoreError::Closed)?;
        if !self.path.exists() {
            persist(&self.path, tables)?;
        }
        Ok(())
    }

    fn upsert_recipe(&self, id: &str, station_type: &str, contents: &str) -> StoreResult<()> {
        self.write(|tables| {
            tables.upsert_recipe(id, station_type, contents);
            Ok(())
        })
    }

    fn recipe(&self, id: &str) -> StoreResult<Option<RecipeRow>> {
        self.read(|tables| tables.recipe(id))
    }

    fn recipes_by_type(&self, station_type: &str) -> StoreResult<Vec<RecipeRow>> {
        self.read(|tables| tables.recipes_by_type(station_type))
    }

    fn all_recipes(&self) -> StoreResult<Vec<RecipeRow>> {
        self.read(|tables| tables.recipes.clone())
    }

    fn delete_recipe(&self, id: &str) -> StoreResult<()> {
        let present = self.read(|tables| tables.recipe(id).is_some())?;
        if !present {
            return Ok(());
        }
        self.write(|tables| {
            tables.delete_recipe(id);
            Ok(())
        })
    }

    fn insert_type(&self, station_type: &str, head_item: &str) -> StoreResult<()> {
        self.write(|tables| tables.insert_type(station_type, head_item))
    }

    fn type_exists(&self, station_type: &str) -> StoreResult<bool> {
        self.read(|tables| tables.type_row(station_type).is_some())
    }

    fn type_head_item(&self, station_type: &str) -> StoreResult<Option<String>> {
        self.read(|tables| {
            tables
                .type_row(station_type)
                .and_then(|row| row.head_item.clone())
        })
    }

    fn all_types(&self) -> StoreResult<Vec<String>> {
        self.read(Tables::type_names)
    }

    fn all_types_with_head_items(&self) -> StoreResult<Vec<TypeRow>> {
        self.read(|tables| tables.types.clone())
    }

    fn refresh(&self) -> StoreResult<()> {
        let mut guard = self.state.lock();
        let tables = guard.as_mut().ok_or(StoreError::Closed)?;
        *tables = read_tables(&self.path)?;
        debug!(path = %self.path.display(), "Reloaded recipe store");
        Ok(())
    }

    fn close(&self) {
        if self.state.lock().take().is_some() {
            debug!(path = %self.path.display(), "Closed recipe store");
        }
    }
}

fn read_tables(path: &Path) -> StoreResult<Tables> {
    if !path.exists() {
        return Ok(Tables::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Tables::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn persist(path: &Path, tables: &Tables) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let serialized = serde_json::to_vec_pretty(tables)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&serialized)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rows_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path).expect("open");
        store.create_schema().expect("schema");
        store.insert_type("anvil", "HEAD").expect("type");
        store.upsert_recipe("anvil/a", "anvil", "A").expect("recipe");
        store.upsert_recipe("anvil/b", "anvil", "B").expect("recipe");
        store.upsert_recipe("anvil/a", "anvil", "A2").expect("recipe");
        store.close();

        let reopened = JsonFileStore::open(&path).expect("reopen");
        let ids: Vec<_> = reopened
            .all_recipes()
            .expect("list")
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec!["anvil/b", "anvil/a"]);
        assert_eq!(
            reopened.type_head_item("anvil").expect("head").as_deref(),
            Some("HEAD")
        );
        assert!(reopened.type_exists("anvil").expect("exists"));
    }

    #[test]
    fn duplicate_type_does_not_touch_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).expect("open");
        store.insert_type("anvil", "HEAD").expect("type");
        let before = fs::read_to_string(&path).expect("read");

        assert!(matches!(
            store.insert_type("anvil", "OTHER"),
            Err(StoreError::DuplicateType(_))
        ));
        assert_eq!(fs::read_to_string(&path).expect("read"), before);
    }

    #[test]
    fn corrupt_document_fails_to_open() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").expect("write");
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn refresh_picks_up_external_edits() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).expect("open");
        store.upsert_recipe("t/a", "t", "x").expect("upsert");

        let other = JsonFileStore::open(&path).expect("second handle");
        other.upsert_recipe("t/b", "t", "y").expect("upsert");

        assert_eq!(store.all_recipes().expect("list").len(), 1);
        store.refresh().expect("refresh");
        assert_eq!(store.all_recipes().expect("list").len(), 2);
    }

    #[test]
    fn closed_store_rejects_calls() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path().join("store.json")).expect("open");
        store.close();
        assert!(matches!(store.all_types(), Err(StoreError::Closed)));
        assert!(matches!(
            store.upsert_recipe("a", "t", "x"),
            Err(StoreError::Closed)
        ));
    }
}
