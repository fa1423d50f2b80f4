//! Ordered collection of stage objects with an id index.
//!
//! Order is paint order (later objects draw on top). The `id_index` map is
//! kept in sync on every insert and removal, so lookups by id are O(1).

use crate::association::{Endpoint, EndpointLookup};
use crate::error::StageError;
use crate::id::StageId;
use crate::model::StageObject;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Stage {
    objects: Vec<StageObject>,
    id_index: HashMap<StageId, usize>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded objects. Later duplicates of an id are dropped.
    pub fn from_objects(objects: Vec<StageObject>) -> Self {
        let mut stage = Stage::new();
        for obj in objects {
            let id = obj.uuid();
            if let Err(e) = stage.push(obj) {
                log::warn!("dropping stage object {id}: {e}");
            }
        }
        stage
    }

    pub fn push(&mut self, obj: StageObject) -> Result<StageId, StageError> {
        let id = obj.uuid();
        if self.id_index.contains_key(&id) {
            return Err(StageError::DuplicateId(id));
        }
        self.id_index.insert(id, self.objects.len());
        self.objects.push(obj);
        Ok(id)
    }

    /// Remove by id, preserving the order of the rest.
    pub fn remove(&mut self, id: StageId) -> Option<StageObject> {
        let idx = self.id_index.remove(&id)?;
        let obj = self.objects.remove(idx);
        self.rebuild_index();
        Some(obj)
    }

    pub fn get(&self, id: StageId) -> Option<&StageObject> {
        self.id_index.get(&id).map(|&i| &self.objects[i])
    }

    pub fn get_mut(&mut self, id: StageId) -> Option<&mut StageObject> {
        self.id_index.get(&id).map(|&i| &mut self.objects[i])
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StageObject> {
        self.objects.iter()
    }

    pub fn objects(&self) -> &[StageObject] {
        &self.objects
    }

    /// Ids in paint order. An owned copy, so callers can mutate while
    /// walking it.
    pub fn ids(&self) -> Vec<StageId> {
        self.objects.iter().map(StageObject::uuid).collect()
    }

    pub fn entity_ids(&self) -> Vec<StageId> {
        self.objects
            .iter()
            .filter(|o| o.is_entity())
            .map(StageObject::uuid)
            .collect()
    }

    pub fn association_ids(&self) -> Vec<StageId> {
        self.objects
            .iter()
            .filter(|o| o.is_association())
            .map(StageObject::uuid)
            .collect()
    }

    /// Ids of associations that list `id` as a member.
    pub fn associations_of(&self, id: StageId) -> Vec<StageId> {
        self.objects
            .iter()
            .filter(|o| o.as_association().is_some_and(|a| a.has_member(id)))
            .map(StageObject::uuid)
            .collect()
    }

    /// Sections that list `id` as a direct child.
    pub fn parents_of(&self, id: StageId) -> Vec<StageId> {
        self.objects
            .iter()
            .filter(|o| o.as_section().is_some_and(|s| s.has_child(id)))
            .map(StageObject::uuid)
            .collect()
    }

    pub fn into_objects(self) -> Vec<StageObject> {
        self.objects
    }

    fn rebuild_index(&mut self) {
        self.id_index.clear();
        for (i, obj) in self.objects.iter().enumerate() {
            self.id_index.insert(obj.uuid(), i);
        }
    }
}

impl EndpointLookup for Stage {
    fn endpoint(&self, id: StageId) -> Option<Endpoint> {
        self.get(id).and_then(StageObject::endpoint)
    }
}
