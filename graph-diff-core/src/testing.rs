//! Minimal two-kind entity, recording store and in-memory adapter used by
//! unit tests.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::adapter::Adapter;
use crate::apply::{Labeler, Store, Synced};
use crate::entity::{Attributes, Entity, Identity, Value};
use crate::error::{RunError, StoreError};
use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ItemKind {
    Parent,
    Child,
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Parent => write!(f, "parent"),
            ItemKind::Child => write!(f, "child"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub name: String,
    pub parent: Option<String>,
    pub value: String,
}

impl Item {
    pub fn parent(name: &str, value: &str) -> Self {
        Self {
            kind: ItemKind::Parent,
            name: name.to_string(),
            parent: None,
            value: value.to_string(),
        }
    }

    pub fn child(name: &str, parent: &str, value: &str) -> Self {
        Self {
            kind: ItemKind::Child,
            name: name.to_string(),
            parent: Some(parent.to_string()),
            value: value.to_string(),
        }
    }

    pub fn identity_key(&self) -> Identity {
        Entity::identity(self)
    }
}

impl Entity for Item {
    type Kind = ItemKind;

    const TOP_LEVEL: &'static [ItemKind] = &[ItemKind::Parent];
    const DELETE_ORDER: &'static [ItemKind] = &[ItemKind::Child, ItemKind::Parent];

    fn kind(&self) -> ItemKind {
        self.kind
    }

    fn identity(&self) -> Identity {
        match &self.parent {
            Some(parent) => Identity::new([self.name.as_str(), parent.as_str()]),
            None => Identity::new([self.name.as_str()]),
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("value", Value::from(self.value.as_str()));
        attrs
    }

    fn set_attributes(&mut self, changes: &Attributes) {
        if let Some(value) = changes.get("value").and_then(Value::as_text) {
            self.value = value.to_string();
        }
    }
}

/// Store that records every call and fails on request.
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub calls: Vec<String>,
    pub fail: HashSet<String>,
    pub protect: HashSet<String>,
    pub decline: HashSet<String>,
    pub labeled: Vec<String>,
}

impl Store<Item> for RecordingStore {
    fn create(&mut self, entity: &Item) -> Result<Option<Item>, StoreError> {
        let id = entity.identity_key().to_string();
        self.calls.push(format!("create {} {id}", entity.kind));
        if self.fail.contains(&id) {
            return Err(StoreError::Rejected(format!("cannot create {id}")));
        }
        if self.decline.contains(&id) {
            return Ok(None);
        }
        Ok(Some(entity.clone()))
    }

    fn update(&mut self, current: &Item, changes: &Attributes) -> Result<Item, StoreError> {
        let id = current.identity_key().to_string();
        self.calls.push(format!("update {} {id}", current.kind));
        if self.fail.contains(&id) {
            return Err(StoreError::Rejected(format!("cannot update {id}")));
        }
        let mut updated = current.clone();
        updated.set_attributes(changes);
        Ok(updated)
    }

    fn delete(&mut self, entity: &Item) -> Result<(), StoreError> {
        let id = entity.identity_key().to_string();
        self.calls.push(format!("delete {} {id}", entity.kind));
        if self.protect.contains(&id) {
            return Err(StoreError::Protected(format!("{id} still referenced")));
        }
        if self.fail.contains(&id) {
            return Err(StoreError::Rejected(format!("cannot delete {id}")));
        }
        Ok(())
    }
}

impl Labeler<Item> for RecordingStore {
    fn label(&mut self, synced: &[Synced<'_, Item>]) {
        self.labeled
            .extend(synced.iter().map(|s| format!("{} {}", s.kind, s.identity)));
    }
}

/// Adapter that loads a fixed list of items and persists through a
/// [`RecordingStore`].
pub struct MemoryAdapter {
    pub name: String,
    pub seed: Vec<Item>,
    pub graph: Graph<Item>,
    pub store: RecordingStore,
    pub fail_load: bool,
}

impl MemoryAdapter {
    pub fn seeded(name: &str, seed: Vec<Item>) -> Self {
        Self {
            name: name.to_string(),
            seed,
            graph: Graph::new(),
            store: RecordingStore::default(),
            fail_load: false,
        }
    }
}

impl Adapter for MemoryAdapter {
    type Entity = Item;

    fn name(&self) -> &str {
        &self.name
    }

    fn graph(&self) -> &Graph<Item> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut Graph<Item> {
        &mut self.graph
    }

    fn load(&mut self) -> Result<(), RunError> {
        if self.fail_load {
            return Err(RunError::Load {
                side: self.name.clone(),
                message: "unreachable".to_string(),
            });
        }
        for item in std::mem::take(&mut self.seed) {
            let parent = item.parent.clone();
            if self.add(item.clone()) {
                if let Some(parent) = parent {
                    let parent_id = Item::parent(&parent, "").identity_key();
                    let _ = self.graph.add_child(ItemKind::Parent, &parent_id, &item);
                }
            }
        }
        Ok(())
    }
}

impl Store<Item> for MemoryAdapter {
    fn create(&mut self, entity: &Item) -> Result<Option<Item>, StoreError> {
        self.store.create(entity)
    }

    fn update(&mut self, current: &Item, changes: &Attributes) -> Result<Item, StoreError> {
        self.store.update(current, changes)
    }

    fn delete(&mut self, entity: &Item) -> Result<(), StoreError> {
        self.store.delete(entity)
    }
}

impl Labeler<Item> for MemoryAdapter {
    fn label(&mut self, synced: &[Synced<'_, Item>]) {
        self.store.label(synced);
    }
}
