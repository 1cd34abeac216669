//! In-memory repository with snapshot files.

use super::{array_holds, field_is, Repository};
use crate::config::{DiffConfig, RepositoryConfig};
use crate::document::{KEY_ID, KEY_NAME, KEY_PARENT_ID};
use crate::error::{Result, StateError};
use crate::state::{apply_diff, State, StateDiff, Value};
use crate::updates::{apply_batches, Updates};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for snapshot files.
const SNAPSHOT_MAGIC: &[u8; 4] = b"DST\0";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u8 = 1;

/// Snapshot payload.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    states: BTreeMap<String, State>,
}

/// Repository holding every state in memory.
///
/// Reads hand out copy-on-write copies, so callers can mutate what they read
/// without affecting the stored state.
pub struct MemRepository {
    config: RepositoryConfig,

    /// States by id.
    states: RwLock<HashMap<String, State>>,

    /// Next id counter.
    next_id: Mutex<u64>,
}

impl MemRepository {
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Write a snapshot of all states to `path`.
    ///
    /// Layout: magic, version, CRC32 of payload, payload length, MessagePack
    /// payload. Written to a sibling temp file then renamed into place.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            next_id: *self.next_id.lock(),
            states: self
                .states
                .read()
                .iter()
                .map(|(id, state)| (id.clone(), state.deep_copy()))
                .collect(),
        };
        let encoded = rmp_serde::to_vec_named(&snapshot)?;
        let checksum = crc32fast::hash(&encoded);

        let tmp_path = temp_path(path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(SNAPSHOT_MAGIC)?;
            file.write_all(&[SNAPSHOT_VERSION])?;
            file.write_all(&checksum.to_le_bytes())?;
            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        tracing::debug!(
            path = %path.display(),
            states = snapshot.states.len(),
            bytes = encoded.len(),
            "persisted snapshot"
        );
        Ok(())
    }

    /// Persist to the configured snapshot path.
    pub fn persist_default(&self) -> Result<()> {
        let path = self.snapshot_path()?;
        self.persist(path)
    }

    /// Load a repository from a snapshot written by [`MemRepository::persist`].
    pub fn load(path: impl AsRef<Path>, config: RepositoryConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(StateError::InvalidFormat("Invalid snapshot magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(StateError::InvalidFormat(format!(
                "Unsupported snapshot version: {}",
                version[0]
            )));
        }

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut encoded = Vec::new();
        file.read_to_end(&mut encoded)?;
        if encoded.len() != len {
            return Err(StateError::InvalidFormat(format!(
                "Snapshot payload truncated: expected {} bytes, got {}",
                len,
                encoded.len()
            )));
        }

        let computed_checksum = crc32fast::hash(&encoded);
        if stored_checksum != computed_checksum {
            return Err(StateError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let snapshot: Snapshot = rmp_serde::from_slice(&encoded)?;
        tracing::debug!(
            path = %path.display(),
            states = snapshot.states.len(),
            "loaded snapshot"
        );

        Ok(Self {
            config,
            states: RwLock::new(snapshot.states.into_iter().collect()),
            next_id: Mutex::new(snapshot.next_id),
        })
    }

    /// Load from the configured snapshot path, or start empty if the file
    /// does not exist yet.
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        let path = match &config.snapshot_path {
            Some(path) => path.clone(),
            None => return Ok(Self::new(config)),
        };
        if path.exists() {
            Self::load(path, config)
        } else {
            Ok(Self::new(config))
        }
    }

    fn snapshot_path(&self) -> Result<PathBuf> {
        self.config
            .snapshot_path
            .clone()
            .ok_or_else(|| StateError::InvalidFormat("No snapshot path configured".into()))
    }

    /// Stored states matching `pred`, skipping `ignored`, ordered by id.
    fn scan<F>(&self, ignored: &HashSet<String>, pred: F) -> Vec<(String, State)>
    where
        F: Fn(&State) -> bool,
    {
        let states = self.states.read();
        let mut found: Vec<_> = states
            .iter()
            .filter(|(id, state)| !ignored.contains(id.as_str()) && pred(state))
            .map(|(id, state)| (id.clone(), state.deep_copy()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }
}

/// Sibling temp file for `path`: the full file name plus `.tmp`, so a
/// target that already ends in `.tmp` never writes over itself.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl Default for MemRepository {
    fn default() -> Self {
        Self::new(RepositoryConfig::default())
    }
}

impl Repository for MemRepository {
    fn generate_new_id(&self) -> String {
        let mut next = self.next_id.lock();
        let id = format!("{}{}", self.config.id_prefix, *next);
        *next += 1;
        id
    }

    fn read_state(&self, id: &str) -> Result<Option<State>> {
        Ok(self.states.read().get(id).map(State::deep_copy))
    }

    fn read_states(&self, ids: &[String]) -> Result<Vec<State>> {
        let states = self.states.read();
        Ok(ids
            .iter()
            .filter_map(|id| states.get(id).map(State::deep_copy))
            .collect())
    }

    fn create_state(&self, state: State) -> Result<()> {
        let id = state
            .get(KEY_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| StateError::InvalidFormat("State has no id".into()))?
            .to_string();
        let mut states = self.states.write();
        if states.contains_key(&id) {
            return Err(StateError::DocumentExists(id));
        }
        tracing::trace!(id = %id, fields = state.len(), "create");
        states.insert(id, state);
        Ok(())
    }

    fn update_state(&self, id: &str, diff: &StateDiff) -> Result<()> {
        let mut states = self.states.write();
        let stored = states
            .get_mut(id)
            .ok_or_else(|| StateError::DocumentNotFound(id.to_string()))?;

        // Patch a copy; the stored state changes only if the whole diff applies.
        let mut patched = stored.deep_copy();
        if self.config.path_updates {
            let batches = Updates::from_diff(diff).into_batches();
            tracing::trace!(id, batches = batches.len(), "update by path");
            apply_batches(&mut patched, &batches)?;
        } else {
            tracing::trace!(id, keys = diff.len(), "update");
            apply_diff(&mut patched, diff)?;
        }
        *stored = patched;
        Ok(())
    }

    fn delete_states(&self, ids: &[String]) -> Result<()> {
        let mut states = self.states.write();
        if let Some(missing) = ids.iter().find(|id| !states.contains_key(id.as_str())) {
            return Err(StateError::DocumentNotFound(missing.clone()));
        }
        for id in ids {
            states.remove(id);
        }
        tracing::trace!(count = ids.len(), "delete");
        Ok(())
    }

    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &HashSet<String>,
    ) -> Result<Option<State>> {
        let found = self.scan(ignored, |state| {
            field_is(state, KEY_PARENT_ID, parent_id) && field_is(state, KEY_NAME, name)
        });
        if found.len() > 1 {
            tracing::warn!(parent_id, name, count = found.len(), "duplicate child names");
        }
        Ok(found.into_iter().next().map(|(_, state)| state))
    }

    fn query_key_value(
        &self,
        key: &str,
        value: &str,
        ignored: &HashSet<String>,
    ) -> Result<Vec<State>> {
        Ok(self
            .scan(ignored, |state| field_is(state, key, value))
            .into_iter()
            .map(|(_, state)| state)
            .collect())
    }

    fn query_key_value_array(
        &self,
        key: &str,
        value: &str,
        ignored: &HashSet<String>,
    ) -> Result<Vec<String>> {
        Ok(self
            .scan(ignored, |state| array_holds(state, key, value))
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    fn diff_config(&self) -> DiffConfig {
        self.config.diff.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Patch;

    fn doc(id: &str) -> State {
        State::new().with(KEY_ID, id).with("title", "t")
    }

    #[test]
    fn test_generate_ids() {
        let repo = MemRepository::default();
        assert_eq!(repo.generate_new_id(), "doc-1");
        assert_eq!(repo.generate_new_id(), "doc-2");
    }

    #[test]
    fn test_create_and_read() {
        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();

        let state = repo.read_state("a").unwrap().unwrap();
        assert_eq!(state.get("title"), Some(&Value::from("t")));
        assert!(repo.read_state("b").unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate() {
        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();
        assert!(matches!(
            repo.create_state(doc("a")),
            Err(StateError::DocumentExists(_))
        ));
    }

    #[test]
    fn test_create_without_id() {
        let repo = MemRepository::default();
        assert!(matches!(
            repo.create_state(State::new()),
            Err(StateError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_is_isolated_from_store() {
        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();

        let mut state = repo.read_state("a").unwrap().unwrap();
        state.put("title", "mutated");

        let stored = repo.read_state("a").unwrap().unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("t")));
    }

    #[test]
    fn test_update_applies_diff() {
        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();

        let diff = StateDiff::new().with("title", Patch::Replace(Value::from("u")));
        repo.update_state("a", &diff).unwrap();
        let stored = repo.read_state("a").unwrap().unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("u")));

        assert!(matches!(
            repo.update_state("zzz", &diff),
            Err(StateError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_failed_update_leaves_state_untouched() {
        let repo = MemRepository::default();
        repo.create_state(doc("a").with("z", "scalar")).unwrap();

        // "title" applies, then "z" fails: a nested diff against a scalar.
        let diff = StateDiff::new()
            .with("title", Patch::Replace(Value::from("new")))
            .with("z", Patch::State(StateDiff::new().with("x", Patch::Replace(Value::from(1i64)))));
        assert!(matches!(
            repo.update_state("a", &diff),
            Err(StateError::Unsupported(_))
        ));

        let stored = repo.read_state("a").unwrap().unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("t")));
        assert_eq!(stored.get("z"), Some(&Value::from("scalar")));
    }

    #[test]
    fn test_update_by_path() {
        let repo = MemRepository::new(RepositoryConfig {
            path_updates: true,
            ..RepositoryConfig::default()
        });
        let before = doc("a")
            .with("dc", State::new().with("title", "old").with("creator", "me"))
            .with("tags", Value::list(["x", "y"].map(Value::from)));
        repo.create_state(before.clone()).unwrap();

        let mut after = before.deep_copy();
        after.put("dc", State::new().with("title", "new").with("creator", "me"));
        after.put("tags", Value::list(["x", "y", "z"].map(Value::from)));
        after.remove("title");
        let diff = crate::state::diff_states(&before, &after).unwrap();

        repo.update_state("a", &diff).unwrap();
        assert_eq!(repo.read_state("a").unwrap().unwrap(), after);
    }

    #[test]
    fn test_persist_to_tmp_named_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.tmp");

        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();
        repo.persist(&path).unwrap();

        assert!(!dir.path().join("states.tmp.tmp").exists());
        let loaded = MemRepository::load(&path, RepositoryConfig::default()).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        assert_eq!(temp_path(Path::new("/x/snap.bin")), Path::new("/x/snap.bin.tmp"));
        assert_eq!(temp_path(Path::new("/x/snap.tmp")), Path::new("/x/snap.tmp.tmp"));
    }

    #[test]
    fn test_child_and_key_value_queries() {
        let repo = MemRepository::default();
        let child = |id: &str, name: &str| {
            doc(id)
                .with(KEY_PARENT_ID, "root")
                .with(KEY_NAME, name)
                .with("ancestorIds", Value::array(["root"]))
        };
        repo.create_state(doc("root")).unwrap();
        repo.create_state(child("c2", "beta")).unwrap();
        repo.create_state(child("c1", "alpha")).unwrap();

        let none = HashSet::new();
        let alpha = repo.read_child_state("root", "alpha", &none).unwrap().unwrap();
        assert_eq!(alpha.get(KEY_ID), Some(&Value::from("c1")));
        assert!(repo.has_child("root", "beta", &none).unwrap());
        assert!(!repo.has_child("root", "gamma", &none).unwrap());

        let ignored: HashSet<String> = ["c1".to_string()].into();
        assert!(repo.read_child_state("root", "alpha", &ignored).unwrap().is_none());

        let ids: Vec<_> = repo
            .query_key_value(KEY_PARENT_ID, "root", &none)
            .unwrap()
            .iter()
            .filter_map(|s| s.get(KEY_ID).and_then(Value::as_str).map(String::from))
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(!repo.query_key_value_presence(KEY_PARENT_ID, "c1", &none).unwrap());

        assert_eq!(
            repo.query_key_value_array("ancestorIds", "root", &ignored).unwrap(),
            vec!["c2".to_string()]
        );
    }

    #[test]
    fn test_read_states_skips_missing() {
        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();
        repo.create_state(doc("c")).unwrap();

        let ids = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let states = repo.read_states(&ids).unwrap();
        let got: Vec<_> = states
            .iter()
            .filter_map(|s| s.get(KEY_ID).and_then(Value::as_str))
            .collect();
        assert_eq!(got, vec!["c", "a"]);
    }

    #[test]
    fn test_delete_is_all_or_nothing() {
        let repo = MemRepository::default();
        repo.create_state(doc("a")).unwrap();

        let result = repo.delete_states(&["a".to_string(), "missing".to_string()]);
        assert!(matches!(result, Err(StateError::DocumentNotFound(_))));
        assert_eq!(repo.len(), 1);

        repo.delete_states(&["a".to_string()]).unwrap();
        assert!(repo.is_empty());
    }
}
