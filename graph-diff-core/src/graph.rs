use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::entity::{Entity, Identity};
use crate::error::GraphError;

type Link<K> = (K, Identity);

/// Insertion-ordered store of entities, one bucket per kind.
struct Bucket<E> {
    entries: Vec<E>,
    index: HashMap<Identity, usize>,
}

impl<E> Default for Bucket<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// An in-memory graph of typed entities keyed by kind and identity.
///
/// Parent/child links are a traversal aid for ordered diffing only; they do
/// not affect identity.
pub struct Graph<E: Entity> {
    buckets: BTreeMap<E::Kind, Bucket<E>>,
    children: HashMap<Link<E::Kind>, Vec<Link<E::Kind>>>,
    skip_unmatched: BTreeSet<E::Kind>,
}

impl<E: Entity> Default for Graph<E> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            children: HashMap::new(),
            skip_unmatched: BTreeSet::new(),
        }
    }
}

impl<E: Entity> Graph<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity by identity. An existing entity is never overwritten.
    pub fn add(&mut self, entity: E) -> Result<(), GraphError> {
        let kind = entity.kind();
        let identity = entity.identity();
        let bucket = self.buckets.entry(kind).or_default();
        if bucket.index.contains_key(&identity) {
            return Err(GraphError::DuplicateKey {
                kind: kind.to_string(),
                identity,
            });
        }
        bucket.index.insert(identity, bucket.entries.len());
        bucket.entries.push(entity);
        Ok(())
    }

    pub fn get(&self, kind: E::Kind, identity: &Identity) -> Result<&E, GraphError> {
        self.buckets
            .get(&kind)
            .and_then(|bucket| {
                let idx = *bucket.index.get(identity)?;
                bucket.entries.get(idx)
            })
            .ok_or_else(|| not_found(kind, identity))
    }

    /// Mutable access for in-place derived bookkeeping. Changing the identity
    /// through this handle corrupts the index; use [`Graph::rekey`] instead.
    pub fn get_mut(&mut self, kind: E::Kind, identity: &Identity) -> Result<&mut E, GraphError> {
        self.buckets
            .get_mut(&kind)
            .and_then(|bucket| {
                let idx = *bucket.index.get(identity)?;
                bucket.entries.get_mut(idx)
            })
            .ok_or_else(|| not_found(kind, identity))
    }

    pub fn contains(&self, kind: E::Kind, identity: &Identity) -> bool {
        self.buckets
            .get(&kind)
            .is_some_and(|bucket| bucket.index.contains_key(identity))
    }

    /// All entities of one kind in insertion order. Call again to restart.
    pub fn get_all(&self, kind: E::Kind) -> impl Iterator<Item = &E> + '_ {
        self.buckets
            .get(&kind)
            .into_iter()
            .flat_map(|bucket| bucket.entries.iter())
    }

    pub fn len(&self, kind: E::Kind) -> usize {
        self.buckets.get(&kind).map_or(0, |bucket| bucket.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.entries.is_empty())
    }

    /// Kinds that currently hold at least one entity.
    pub fn kinds(&self) -> impl Iterator<Item = E::Kind> + '_ {
        self.buckets
            .iter()
            .filter(|(_, bucket)| !bucket.entries.is_empty())
            .map(|(kind, _)| *kind)
    }

    /// Replace the entity stored under `old` with `entity`, whose identity may
    /// differ. Insertion order and child links follow the entity.
    pub fn rekey(&mut self, kind: E::Kind, old: &Identity, entity: E) -> Result<(), GraphError> {
        let new_identity = entity.identity();
        let bucket = self
            .buckets
            .get_mut(&kind)
            .ok_or_else(|| not_found(kind, old))?;
        let idx = *bucket.index.get(old).ok_or_else(|| not_found(kind, old))?;
        if &new_identity != old && bucket.index.contains_key(&new_identity) {
            return Err(GraphError::DuplicateKey {
                kind: kind.to_string(),
                identity: new_identity,
            });
        }
        bucket.index.remove(old);
        bucket.index.insert(new_identity.clone(), idx);
        bucket.entries[idx] = entity;

        if &new_identity != old {
            let old_link = (kind, old.clone());
            if let Some(links) = self.children.remove(&old_link) {
                self.children.insert((kind, new_identity.clone()), links);
            }
            for links in self.children.values_mut() {
                for link in links.iter_mut() {
                    if *link == old_link {
                        link.1 = new_identity.clone();
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove an entity and every link that mentions it.
    pub fn remove(&mut self, kind: E::Kind, identity: &Identity) -> Result<E, GraphError> {
        let bucket = self
            .buckets
            .get_mut(&kind)
            .ok_or_else(|| not_found(kind, identity))?;
        let idx = bucket
            .index
            .remove(identity)
            .ok_or_else(|| not_found(kind, identity))?;
        let removed = bucket.entries.remove(idx);
        for slot in bucket.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }

        let link = (kind, identity.clone());
        self.children.remove(&link);
        for links in self.children.values_mut() {
            links.retain(|l| *l != link);
        }
        Ok(removed)
    }

    /// Record `child` as a child of the given parent. The parent must exist.
    pub fn add_child(
        &mut self,
        parent_kind: E::Kind,
        parent: &Identity,
        child: &E,
    ) -> Result<(), GraphError> {
        if !self.contains(parent_kind, parent) {
            return Err(not_found(parent_kind, parent));
        }
        let link = (child.kind(), child.identity());
        let links = self
            .children
            .entry((parent_kind, parent.clone()))
            .or_default();
        if !links.contains(&link) {
            links.push(link);
        }
        Ok(())
    }

    /// Child links of one entity in the order they were added.
    pub fn children_of(&self, kind: E::Kind, identity: &Identity) -> &[(E::Kind, Identity)] {
        self.children
            .get(&(kind, identity.clone()))
            .map_or(&[], Vec::as_slice)
    }

    /// Mark a kind as scoped: entities of this kind missing from the source
    /// are skipped instead of deleted.
    pub fn set_skip_unmatched(&mut self, kind: E::Kind) {
        self.skip_unmatched.insert(kind);
    }

    pub fn skips_unmatched(&self, kind: E::Kind) -> bool {
        self.skip_unmatched.contains(&kind)
    }
}

fn not_found<K: std::fmt::Display>(kind: K, identity: &Identity) -> GraphError {
    GraphError::NotFound {
        kind: kind.to_string(),
        identity: identity.clone(),
    }
}
