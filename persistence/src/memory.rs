//! FILENAME: persistence/src/memory.rs
//! PURPOSE: In-memory implementations of the collaborator traits.
//! CONTEXT: Embedding hosts and tests seed a MemoryStore with domain
//! records and hand it to the engine; MemoryObjectStore backs the row
//! cache and report blobs with a plain keyed map.

use engine::model::{
    DatasheetElement, Formula, Label, LabelCollection, Project, ProjectDefinition, ProjectNode,
};
use engine::{DataStore, ObjectStore, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// An in-memory DataStore.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: HashMap<Uuid, Project>,
    definitions: HashMap<Uuid, ProjectDefinition>,
    nodes: Vec<ProjectNode>,
    formulas: Vec<Formula>,
    elements: Vec<DatasheetElement>,
    collections: Vec<LabelCollection>,
    labels: Vec<Label>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn insert_project(&mut self, project: Project) {
        self.projects.insert(project.id, project);
    }

    pub fn insert_project_definition(&mut self, definition: ProjectDefinition) {
        self.definitions.insert(definition.id, definition);
    }

    pub fn insert_node(&mut self, node: ProjectNode) {
        self.nodes.push(node);
    }

    pub fn insert_nodes(&mut self, nodes: impl IntoIterator<Item = ProjectNode>) {
        self.nodes.extend(nodes);
    }

    pub fn insert_formula(&mut self, formula: Formula) {
        self.formulas.push(formula);
    }

    pub fn insert_element(&mut self, element: DatasheetElement) {
        self.elements.push(element);
    }

    pub fn insert_label_collection(&mut self, collection: LabelCollection) {
        self.collections.push(collection);
    }

    pub fn insert_label(&mut self, label: Label) {
        self.labels.push(label);
    }

    pub fn insert_labels(&mut self, labels: impl IntoIterator<Item = Label>) {
        self.labels.extend(labels);
    }
}

impl DataStore for MemoryStore {
    fn project(&self, id: Uuid) -> Result<Project, StoreError> {
        self.projects
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "project",
                id: id.to_string(),
            })
    }

    fn project_definition(&self, id: Uuid) -> Result<ProjectDefinition, StoreError> {
        self.definitions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "project definition",
                id: id.to_string(),
            })
    }

    fn nodes_by_project(&self, project_id: Uuid) -> Result<Vec<ProjectNode>, StoreError> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.project_id == project_id)
            .cloned()
            .collect())
    }

    fn formulas_by_project_definition(
        &self,
        project_definition_id: Uuid,
    ) -> Result<Vec<Formula>, StoreError> {
        Ok(self
            .formulas
            .iter()
            .filter(|f| f.project_definition_id == project_definition_id)
            .cloned()
            .collect())
    }

    fn elements_by_datasheet_definition(
        &self,
        datasheet_definition_id: Uuid,
    ) -> Result<Vec<DatasheetElement>, StoreError> {
        Ok(self
            .elements
            .iter()
            .filter(|e| e.datasheet_definition_id == datasheet_definition_id)
            .cloned()
            .collect())
    }

    fn label_collections_by_datasheet_definition(
        &self,
        datasheet_definition_id: Uuid,
    ) -> Result<Vec<LabelCollection>, StoreError> {
        Ok(self
            .collections
            .iter()
            .filter(|c| c.datasheet_definition_id == datasheet_definition_id)
            .cloned()
            .collect())
    }

    fn labels_by_collection(&self, collection_id: Uuid) -> Result<Vec<Label>, StoreError> {
        Ok(self
            .labels
            .iter()
            .filter(|l| l.collection_id == collection_id)
            .cloned()
            .collect())
    }
}

/// An in-memory ObjectStore. Saves under the same key overwrite
/// (last-writer-wins, matching the external cache contract).
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        MemoryObjectStore::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.blobs.lock().expect("object store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .expect("object store poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .expect("object store poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound {
                key: key.to_string(),
            })
    }
}
