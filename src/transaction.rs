//! Per-session transient document states over a repository.
//!
//! Documents read for update are cached here and mutated in place. `save`
//! turns transient changes into pending writes: new documents in full, every
//! other modified document as a diff against its last saved state. Pending
//! writes reach the repository on `commit` and are dropped by `rollback`.
//!
//! Hierarchy lookups see transient documents first; the repository is only
//! asked about documents the session has not loaded or removed.

use crate::config::DiffConfig;
use crate::document::{
    DocumentState, KEY_ANCESTOR_IDS, KEY_ID, KEY_NAME, KEY_PARENT_ID, KEY_PRIMARY_TYPE,
};
use crate::error::{Result, StateError};
use crate::repository::{array_holds, field_is, Repository};
use crate::state::{Differ, Scalar, State, StateDiff, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Counts of documents written in full, as diffs and removed.
///
/// For `save` these are writes queued; for `commit`, writes applied to the
/// repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// A saved change waiting for commit.
#[derive(Debug)]
enum PendingWrite {
    Create(State),
    Update(StateDiff),
    Delete,
}

/// Transient documents of one session.
pub struct TransactionState<R: Repository> {
    repository: Arc<R>,

    differ: Differ,

    /// Documents read for update or created, by id.
    transient: HashMap<String, DocumentState>,

    /// Ids of documents created but not yet saved, in creation order.
    created: Vec<String>,

    /// Saved writes in the order they reach the repository.
    pending: VecDeque<(String, PendingWrite)>,

    /// Repository documents removed in this session.
    deleted: HashSet<String>,
}

impl<R: Repository> TransactionState<R> {
    /// Session diffing with the repository's settings.
    pub fn new(repository: Arc<R>) -> Self {
        let config = repository.diff_config();
        Self::with_config(repository, config)
    }

    pub fn with_config(repository: Arc<R>, config: DiffConfig) -> Self {
        Self {
            repository,
            differ: Differ::new(config),
            transient: HashMap::new(),
            created: Vec::new(),
            pending: VecDeque::new(),
            deleted: HashSet::new(),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn is_transient(&self, id: &str) -> bool {
        self.transient.contains_key(id)
    }

    pub fn transient_count(&self) -> usize {
        self.transient.len()
    }

    /// Saved writes not yet committed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Document about to be modified, loaded from the repository if needed.
    pub fn get_state_for_update(&mut self, id: &str) -> Result<Option<&mut DocumentState>> {
        if !self.transient.contains_key(id) {
            if self.deleted.contains(id) {
                return Ok(None);
            }
            match self.repository.read_state(id)? {
                Some(state) => {
                    self.transient
                        .insert(id.to_string(), DocumentState::from_state(state));
                }
                None => return Ok(None),
            }
        }
        Ok(self.transient.get_mut(id))
    }

    /// Document that won't be modified. Transient changes are visible.
    pub fn get_state_for_read(&self, id: &str) -> Result<Option<State>> {
        match self.transient.get(id) {
            Some(doc) => Ok(Some(doc.state().deep_copy())),
            None if self.deleted.contains(id) => Ok(None),
            None => self.repository.read_state(id),
        }
    }

    /// Load several documents for update in one repository round trip.
    ///
    /// Returns the ids that exist, in request order.
    pub fn prefetch_for_update(&mut self, ids: &[String]) -> Result<Vec<String>> {
        let to_fetch: Vec<String> = ids
            .iter()
            .filter(|id| {
                !self.transient.contains_key(id.as_str()) && !self.deleted.contains(id.as_str())
            })
            .cloned()
            .collect();
        if !to_fetch.is_empty() {
            for state in self.repository.read_states(&to_fetch)? {
                let doc = DocumentState::from_state(state);
                if let Some(id) = doc.id().map(str::to_string) {
                    self.transient.insert(id, doc);
                }
            }
        }
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if self.transient.contains_key(id) {
                found.push(id.clone());
            } else {
                tracing::warn!(id = %id, "cannot fetch document");
            }
        }
        Ok(found)
    }

    /// Register a new document. A missing id is generated.
    pub fn create(&mut self, id: Option<String>, state: State) -> Result<&mut DocumentState> {
        let id = id.unwrap_or_else(|| self.repository.generate_new_id());
        if self.transient.contains_key(&id) {
            return Err(StateError::AlreadyTransient(id));
        }
        let mut doc = DocumentState::new();
        for (key, value) in &state {
            doc.put(key.clone(), value.clone());
        }
        doc.put(KEY_ID, id.clone());
        self.created.push(id.clone());
        Ok(self.transient.entry(id).or_insert(doc))
    }

    /// Create a document under `parent_id`, filling in hierarchy fields.
    pub fn create_child(
        &mut self,
        id: Option<String>,
        parent_id: Option<&str>,
        name: &str,
        type_name: &str,
    ) -> Result<&mut DocumentState> {
        let mut state = State::new()
            .with(KEY_NAME, name)
            .with(KEY_PRIMARY_TYPE, type_name);
        if let Some(parent_id) = parent_id {
            let ancestors = self.ancestor_ids(parent_id)?;
            state.put(KEY_PARENT_ID, parent_id);
            state.put(KEY_ANCESTOR_IDS, Value::Array(ancestors));
        }
        self.create(id, state)
    }

    /// Ancestors of `id` including `id` itself, root first.
    fn ancestor_ids(&self, id: &str) -> Result<Vec<Scalar>> {
        let state = self
            .get_state_for_read(id)?
            .ok_or_else(|| StateError::DocumentNotFound(id.to_string()))?;
        let mut ancestors = state
            .get(KEY_ANCESTOR_IDS)
            .and_then(Value::as_array)
            .map(<[Scalar]>::to_vec)
            .unwrap_or_default();
        ancestors.push(Scalar::from(id));
        Ok(ancestors)
    }

    /// Copy a document into a new, unsaved document with a fresh id.
    pub fn copy(&mut self, id: &str) -> Result<&mut DocumentState> {
        let source = self
            .get_state_for_read(id)?
            .ok_or_else(|| StateError::DocumentNotFound(id.to_string()))?;
        let copy_id = self.repository.generate_new_id();
        self.create(Some(copy_id), source)
    }

    /// Ids the repository must skip: the session already knows their state.
    fn seen(&self) -> HashSet<String> {
        self.transient
            .keys()
            .chain(self.deleted.iter())
            .cloned()
            .collect()
    }

    /// Child of `parent_id` called `name`, loaded for update.
    pub fn get_child_state(
        &mut self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<&mut DocumentState>> {
        let local = self
            .transient
            .iter()
            .find(|(_, doc)| is_child(doc.state(), parent_id, name))
            .map(|(id, _)| id.clone());
        let id = match local {
            Some(id) => id,
            None => {
                let seen = self.seen();
                let stored = self.repository.read_child_state(parent_id, name, &seen)?;
                let Some(state) = stored else {
                    return Ok(None);
                };
                let doc = DocumentState::from_state(state);
                let Some(id) = doc.id().map(str::to_string) else {
                    return Ok(None);
                };
                self.transient.insert(id.clone(), doc);
                id
            }
        };
        Ok(self.transient.get_mut(&id))
    }

    pub fn has_child(&self, parent_id: &str, name: &str) -> Result<bool> {
        if self
            .transient
            .values()
            .any(|doc| is_child(doc.state(), parent_id, name))
        {
            return Ok(true);
        }
        self.repository.has_child(parent_id, name, &self.seen())
    }

    /// Children of `parent_id`, loaded for update. Copies ordered by id.
    pub fn get_children_states(&mut self, parent_id: &str) -> Result<Vec<State>> {
        self.get_key_valued_states(KEY_PARENT_ID, parent_id)
    }

    /// Ids of the children of `parent_id`, ordered. Nothing is loaded.
    pub fn get_children_ids(&self, parent_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .transient
            .iter()
            .filter(|(_, doc)| field_is(doc.state(), KEY_PARENT_ID, parent_id))
            .map(|(id, _)| id.clone())
            .collect();
        let stored = self
            .repository
            .query_key_value(KEY_PARENT_ID, parent_id, &self.seen())?;
        ids.extend(
            stored
                .iter()
                .filter_map(|state| state.get(KEY_ID).and_then(Value::as_str))
                .map(str::to_string),
        );
        ids.sort();
        Ok(ids)
    }

    pub fn has_children(&self, parent_id: &str) -> Result<bool> {
        if self
            .transient
            .values()
            .any(|doc| field_is(doc.state(), KEY_PARENT_ID, parent_id))
        {
            return Ok(true);
        }
        self.repository
            .query_key_value_presence(KEY_PARENT_ID, parent_id, &self.seen())
    }

    /// Documents whose string field `key` is `value`, loaded for update.
    /// Copies ordered by id.
    pub fn get_key_valued_states(&mut self, key: &str, value: &str) -> Result<Vec<State>> {
        let seen = self.seen();
        for state in self.repository.query_key_value(key, value, &seen)? {
            let doc = DocumentState::from_state(state);
            if let Some(id) = doc.id().map(str::to_string) {
                self.transient.insert(id, doc);
            }
        }
        let mut found: Vec<(&String, &DocumentState)> = self
            .transient
            .iter()
            .filter(|(_, doc)| field_is(doc.state(), key, value))
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        Ok(found
            .into_iter()
            .map(|(_, doc)| doc.state().deep_copy())
            .collect())
    }

    /// Ids of every document below `id`, ordered.
    pub fn get_sub_tree(&self, id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .transient
            .iter()
            .filter(|(_, doc)| array_holds(doc.state(), KEY_ANCESTOR_IDS, id))
            .map(|(id, _)| id.clone())
            .collect();
        ids.extend(
            self.repository
                .query_key_value_array(KEY_ANCESTOR_IDS, id, &self.seen())?,
        );
        ids.sort();
        Ok(ids)
    }

    /// Rewrite the ancestors of `id` and its subtree: the first `ndel`
    /// entries are replaced by `ancestor_ids`.
    pub fn update_ancestors(
        &mut self,
        id: &str,
        ndel: usize,
        ancestor_ids: &[Scalar],
    ) -> Result<()> {
        let mut ids = self.get_sub_tree(id)?;
        ids.push(id.to_string());
        self.prefetch_for_update(&ids)?;
        for doc_id in &ids {
            let Some(doc) = self.transient.get_mut(doc_id) else {
                continue;
            };
            let mut ancestors = ancestor_ids.to_vec();
            if let Some(old) = doc.get(KEY_ANCESTOR_IDS).and_then(Value::as_array) {
                ancestors.extend(old.iter().skip(ndel).cloned());
            }
            doc.put(KEY_ANCESTOR_IDS, Value::Array(ancestors));
        }
        tracing::debug!(id, documents = ids.len(), "updated ancestors");
        Ok(())
    }

    /// Move `id` under `parent_id`, optionally renaming it.
    ///
    /// Fails with [`StateError::InvalidHierarchy`] if `parent_id` is the
    /// document itself or one of its descendants.
    pub fn move_state(&mut self, id: &str, parent_id: &str, name: Option<&str>) -> Result<()> {
        let ancestors = self.ancestor_ids(parent_id)?;
        if ancestors
            .iter()
            .any(|a| matches!(a, Scalar::String(s) if s == id))
        {
            return Err(StateError::InvalidHierarchy(format!(
                "cannot move {id} under {parent_id}"
            )));
        }
        let doc = self
            .get_state_for_update(id)?
            .ok_or_else(|| StateError::DocumentNotFound(id.to_string()))?;
        let ndel = doc
            .get(KEY_ANCESTOR_IDS)
            .and_then(Value::as_array)
            .map_or(0, <[Scalar]>::len);
        doc.put(KEY_PARENT_ID, parent_id);
        if let Some(name) = name {
            doc.put(KEY_NAME, name);
        }
        self.update_ancestors(id, ndel, &ancestors)
    }

    /// Remove documents. Unsaved ones are dropped; saved ones are deleted
    /// on commit.
    ///
    /// Every id must exist; otherwise nothing is removed.
    pub fn remove_states(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            let known = self.transient.contains_key(id)
                || (!self.deleted.contains(id) && self.repository.read_state(id)?.is_some());
            if !known {
                return Err(StateError::DocumentNotFound(id.clone()));
            }
        }

        let mut done = HashSet::new();
        for id in ids {
            if !done.insert(id) {
                continue;
            }
            self.transient.remove(id);
            if self.created.contains(id) {
                self.created.retain(|c| c != id);
                continue;
            }
            let saved_create = self
                .pending
                .iter()
                .rposition(|(p, w)| p == id && matches!(w, PendingWrite::Create(_)));
            match saved_create {
                Some(at) => {
                    // Never reached the repository: forget the create and
                    // the updates queued after it.
                    let mut index = 0;
                    self.pending.retain(|(p, _)| {
                        let keep = index < at || p != id;
                        index += 1;
                        keep
                    });
                    let deleted_before = self
                        .pending
                        .iter()
                        .any(|(p, w)| p == id && matches!(w, PendingWrite::Delete));
                    if deleted_before {
                        self.deleted.insert(id.clone());
                    }
                }
                None => {
                    self.pending.push_back((id.clone(), PendingWrite::Delete));
                    self.deleted.insert(id.clone());
                }
            }
        }
        Ok(())
    }

    /// Turn transient changes into pending writes.
    ///
    /// Fails with [`StateError::DocumentExists`] before queuing anything if a
    /// created id is already in the repository.
    pub fn save(&mut self) -> Result<SaveSummary> {
        for id in &self.created {
            if !self.deleted.contains(id) && self.repository.read_state(id)?.is_some() {
                return Err(StateError::DocumentExists(id.clone()));
            }
        }

        let mut summary = SaveSummary::default();
        for id in std::mem::take(&mut self.created) {
            if let Some(doc) = self.transient.get_mut(&id) {
                self.pending
                    .push_back((id.clone(), PendingWrite::Create(doc.state().deep_copy())));
                doc.set_not_dirty();
                self.deleted.remove(&id);
                summary.created += 1;
            }
        }

        for (id, doc) in self.transient.iter_mut() {
            if !doc.is_dirty() {
                continue;
            }
            if let Some(diff) = doc.state_change_with(&self.differ) {
                match self.pending.iter_mut().rev().find(|(p, _)| p == id) {
                    Some((_, PendingWrite::Create(state))) => *state = doc.state().deep_copy(),
                    _ => self.pending.push_back((id.clone(), PendingWrite::Update(diff))),
                }
                summary.updated += 1;
            }
            doc.set_not_dirty();
        }

        tracing::debug!(
            created = summary.created,
            updated = summary.updated,
            pending = self.pending.len(),
            "saved transient states"
        );
        Ok(summary)
    }

    /// Save, write every pending change to the repository, then forget all
    /// transient state.
    ///
    /// Writes are applied in order and dropped as they succeed, so after a
    /// failure a later commit resumes with the write that failed.
    pub fn commit(&mut self) -> Result<SaveSummary> {
        self.save()?;
        let mut summary = SaveSummary::default();
        while let Some((id, write)) = self.pending.front() {
            match write {
                PendingWrite::Create(state) => {
                    self.repository.create_state(state.clone())?;
                    summary.created += 1;
                }
                PendingWrite::Update(diff) => {
                    self.repository.update_state(id, diff)?;
                    summary.updated += 1;
                }
                PendingWrite::Delete => {
                    self.repository.delete_states(std::slice::from_ref(id))?;
                    summary.deleted += 1;
                }
            }
            self.pending.pop_front();
        }
        tracing::debug!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "committed"
        );
        self.clear_transient();
        Ok(summary)
    }

    /// Forget unsaved changes and pending writes.
    pub fn rollback(&mut self) {
        tracing::debug!(
            transient = self.transient.len(),
            created = self.created.len(),
            pending = self.pending.len(),
            "rolling back"
        );
        self.clear_transient();
    }

    fn clear_transient(&mut self) {
        self.transient.clear();
        self.created.clear();
        self.pending.clear();
        self.deleted.clear();
    }
}

fn is_child(state: &State, parent_id: &str, name: &str) -> bool {
    field_is(state, KEY_PARENT_ID, parent_id) && field_is(state, KEY_NAME, name)
}
