//! FILENAME: engine/src/store.rs
//! PURPOSE: Collaborator seams for persistence and blob storage.
//! CONTEXT: The computation engine never talks to a database or object
//! store directly; it is handed these traits by the surrounding
//! application. Everything here is synchronous per call; the engine does
//! pure in-memory work between collaborator reads and writes.

use crate::error::StoreError;
use crate::model::{
    DatasheetElement, Formula, Label, LabelCollection, Project, ProjectDefinition, ProjectNode,
};
use uuid::Uuid;

/// Read access to the persisted datasheet domain records.
pub trait DataStore {
    fn project(&self, id: Uuid) -> Result<Project, StoreError>;

    fn project_definition(&self, id: Uuid) -> Result<ProjectDefinition, StoreError>;

    /// Every node of one project's datasheet tree.
    fn nodes_by_project(&self, project_id: Uuid) -> Result<Vec<ProjectNode>, StoreError>;

    /// Every formula of one project definition.
    fn formulas_by_project_definition(
        &self,
        project_definition_id: Uuid,
    ) -> Result<Vec<Formula>, StoreError>;

    /// Every element of one datasheet definition.
    fn elements_by_datasheet_definition(
        &self,
        datasheet_definition_id: Uuid,
    ) -> Result<Vec<DatasheetElement>, StoreError>;

    /// Every label collection of one datasheet definition.
    fn label_collections_by_datasheet_definition(
        &self,
        datasheet_definition_id: Uuid,
    ) -> Result<Vec<LabelCollection>, StoreError>;

    /// Every label of one collection, in ordinal order.
    fn labels_by_collection(&self, collection_id: Uuid) -> Result<Vec<Label>, StoreError>;
}

/// Keyed blob storage for row caches, reports, and unit cache streams.
/// load() of an absent key fails with ObjectNotFound, which callers treat
/// as "rebuild needed". Concurrent saves under the same key are
/// last-writer-wins; callers needing stronger guarantees serialize
/// externally.
pub trait ObjectStore {
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}
