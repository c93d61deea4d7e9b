//! FILENAME: report-engine/src/cache.rs
//! Report Row Cache Builder - materializes the denormalized seed rows.
//!
//! For one report definition this module seeds a bucket row per base
//! label, follows the declarative join plan across label collections,
//! attaches formula bucket attributes, deduplicates, and persists the
//! result to the object store. The cache is the durable seed for the
//! linking pipeline: computed once, served until an explicit refresh,
//! never invalidated automatically when underlying data changes.

use crate::definition::{ReportDefinition, FORMULA_ALIAS};
use crate::error::ReportError;
use crate::row::{dedup_rows, AttributeMap, BucketRow};
use engine::model::{Label, LabelCollection};
use engine::{DataStore, ObjectStore, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// The object-store key for one report definition's row cache.
pub fn cache_key(report_definition_id: Uuid) -> String {
    format!("row-cache/{}", report_definition_id)
}

/// Loads the cached rows for a definition. Fails with a Not-Found store
/// error when absent; the caller rebuilds via refresh_cache().
pub fn load_cache(
    objects: &dyn ObjectStore,
    definition: &ReportDefinition,
) -> Result<Vec<BucketRow>, ReportError> {
    let bytes = objects.load(&cache_key(definition.id))?;
    serde_json::from_slice(&bytes).map_err(|e| ReportError::Serialization(e.to_string()))
}

/// Label collections and labels for one datasheet definition, indexed the
/// way the join loop needs them.
struct LabelUniverse {
    collections: HashMap<Uuid, LabelCollection>,
    labels_by_collection: HashMap<Uuid, Vec<Label>>,
}

impl LabelUniverse {
    fn load(store: &dyn DataStore, datasheet_definition_id: Uuid) -> Result<Self, ReportError> {
        let collections =
            store.label_collections_by_datasheet_definition(datasheet_definition_id)?;

        let mut labels_by_collection = HashMap::new();
        for collection in &collections {
            let mut labels = store.labels_by_collection(collection.id)?;
            labels.sort_by_key(|l| l.ordinal);
            labels_by_collection.insert(collection.id, labels);
        }

        Ok(LabelUniverse {
            collections: collections.into_iter().map(|c| (c.id, c)).collect(),
            labels_by_collection,
        })
    }

    fn labels(&self, collection_id: Uuid) -> Result<&[Label], ReportError> {
        if !self.collections.contains_key(&collection_id) {
            return Err(ReportError::MissingCollection { id: collection_id });
        }
        Ok(self
            .labels_by_collection
            .get(&collection_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]))
    }
}

/// Rebuilds, persists, and returns the row cache for a report definition.
pub fn refresh_cache(
    store: &dyn DataStore,
    objects: &dyn ObjectStore,
    definition: &ReportDefinition,
) -> Result<Vec<BucketRow>, ReportError> {
    let project_definition = store.project_definition(definition.project_definition_id)?;
    let universe = LabelUniverse::load(store, project_definition.datasheet_definition_id)?;

    // Seed one row per base label, in ordinal order.
    let mut rows: Vec<BucketRow> = Vec::new();
    for label in universe.labels(definition.base_collection_id)? {
        let mut row = BucketRow::new();
        row.set_alias(definition.base_alias.as_str(), label_attributes(label));
        rows.push(row);
    }

    // Apply the join plan in declaration order.
    for join in &definition.joins {
        let targets = universe.labels(join.collection_id)?;

        // Multi-map: match value -> labels carrying it.
        let mut by_match_value: HashMap<String, Vec<&Label>> = HashMap::new();
        for label in targets {
            let key = match &join.match_attribute {
                Some(attr) => match label.attribute(attr) {
                    Some(value) => value.as_text(),
                    None => continue,
                },
                None => label.id.to_string(),
            };
            by_match_value.entry(key).or_default().push(label);
        }

        let mut joined = Vec::with_capacity(rows.len());
        for row in rows {
            let source = row
                .alias(&join.from_alias)
                .ok_or_else(|| ReportError::MissingAlias {
                    alias: join.from_alias.clone(),
                })?;
            let value = source.get(&join.from_attribute).ok_or_else(|| {
                ReportError::MissingAttribute {
                    alias: join.from_alias.clone(),
                    attribute: join.from_attribute.clone(),
                }
            })?;
            let key = value.as_text();

            match by_match_value.get(&key).map(|v| v.as_slice()) {
                None | Some([]) => {
                    if join.allow_discard {
                        log::warn!(
                            "discarding row: no label in collection {} matches '{}' for alias '{}'",
                            join.collection_id,
                            key,
                            join.destination_alias
                        );
                        continue;
                    }
                    return Err(ReportError::NoJoinMatch {
                        alias: join.destination_alias.clone(),
                        value: key,
                    });
                }
                Some([single]) => {
                    let mut extended = row;
                    extended
                        .set_alias(join.destination_alias.as_str(), label_attributes(single));
                    joined.push(extended);
                }
                Some(many) => {
                    if join.same_cardinality {
                        return Err(ReportError::CardinalityViolation {
                            alias: join.destination_alias.clone(),
                            matches: many.len(),
                        });
                    }
                    for label in many {
                        let mut fanned = row.clone();
                        fanned
                            .set_alias(join.destination_alias.as_str(), label_attributes(label));
                        joined.push(fanned);
                    }
                }
            }
        }
        rows = joined;
    }

    // Attach formula identity under the fixed alias, keyed by the
    // declared bucket attribute.
    if let Some(formula_join) = &definition.formula_join {
        for row in &mut rows {
            let bucket = row
                .attribute(&definition.base_alias, &formula_join.bucket_attribute)
                .ok_or_else(|| ReportError::MissingAttribute {
                    alias: definition.base_alias.clone(),
                    attribute: formula_join.bucket_attribute.clone(),
                })?
                .as_text();

            let formula_id = formula_join.formulas.get(&bucket).ok_or_else(|| {
                ReportError::Configuration(format!("no formula declared for bucket '{}'", bucket))
            })?;

            let mut attrs = AttributeMap::new();
            attrs.insert("formula_id".to_string(), Value::Text(formula_id.to_string()));
            attrs.insert("bucket".to_string(), Value::Text(bucket));
            row.set_alias(FORMULA_ALIAS, attrs);
        }
    }

    let rows = dedup_rows(rows);

    let bytes =
        serde_json::to_vec(&rows).map_err(|e| ReportError::Serialization(e.to_string()))?;
    objects.save(&cache_key(definition.id), bytes)?;

    log::debug!(
        "row cache for report definition {} refreshed: {} rows",
        definition.id,
        rows.len()
    );
    Ok(rows)
}

/// A label's attributes plus its identity, as joined into a row.
fn label_attributes(label: &Label) -> AttributeMap {
    let mut attrs = label.attributes.clone();
    attrs.insert("id".to_string(), Value::Text(label.id.to_string()));
    attrs.insert("ordinal".to_string(), Value::Number(label.ordinal.into()));
    attrs
}
