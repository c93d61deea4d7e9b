//! FILENAME: engine/src/unit_index.rs
//! PURPOSE: The per-computation multi-map from qualified names to units.
//! CONTEXT: The formula resolver registers every unit of a project here
//! before anything is evaluated (build-then-query, never interleaved;
//! the Builder/Index split makes that a compile-time property). Lookups
//! resolve a name from a node outward: the node itself, then its
//! ancestors nearest first, then the bare name.

use crate::unit::Unit;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// Accumulates units for one computation run.
#[derive(Debug, Default)]
pub struct UnitIndexBuilder {
    units: Vec<Rc<Unit>>,
    keys: HashMap<String, Vec<Rc<Unit>>>,
}

impl UnitIndexBuilder {
    pub fn new() -> Self {
        UnitIndexBuilder::default()
    }

    /// Registers a unit under its own node id, every ancestor id along
    /// its path, and the bare name.
    pub fn add(&mut self, unit: Unit) {
        let unit = Rc::new(unit);
        let name = unit.name().to_string();

        self.push_key(scoped_key(unit.node_id(), &name), &unit);
        for ancestor in unit.path() {
            self.push_key(scoped_key(*ancestor, &name), &unit);
        }
        self.push_key(name, &unit);

        self.units.push(unit);
    }

    /// Freezes the builder; no further units can be added.
    pub fn build(self) -> UnitIndex {
        UnitIndex {
            units: self.units,
            keys: self.keys,
        }
    }

    fn push_key(&mut self, key: String, unit: &Rc<Unit>) {
        self.keys.entry(key).or_default().push(Rc::clone(unit));
    }
}

/// The frozen, queryable index.
#[derive(Debug, Default)]
pub struct UnitIndex {
    units: Vec<Rc<Unit>>,
    keys: HashMap<String, Vec<Rc<Unit>>>,
}

impl UnitIndex {
    /// Resolves a name as seen from a node. Tries, in order:
    /// 1. the exact node: "{from_node}.{name}"
    /// 2. ancestors, nearest first: "{ancestor}.{name}"
    /// 3. the bare "{name}"
    /// 4. nothing (empty list)
    pub fn resolve(&self, from_node: Uuid, from_path: &[Uuid], name: &str) -> Vec<Rc<Unit>> {
        if let Some(units) = self.keys.get(&scoped_key(from_node, name)) {
            return units.clone();
        }

        // from_path is stored root first; walk it nearest-ancestor first.
        for ancestor in from_path.iter().rev() {
            if let Some(units) = self.keys.get(&scoped_key(*ancestor, name)) {
                return units.clone();
            }
        }

        if let Some(units) = self.keys.get(name) {
            return units.clone();
        }

        Vec::new()
    }

    /// All registered units in insertion order.
    pub fn units(&self) -> &[Rc<Unit>] {
        &self.units
    }

    /// All formula units in insertion order (the report linker joins
    /// against these).
    pub fn formula_units(&self) -> impl Iterator<Item = &Rc<Unit>> {
        self.units
            .iter()
            .filter(|u| matches!(***u, Unit::Formula(_)))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn scoped_key(id: Uuid, name: &str) -> String {
    format!("{}.{}", id, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{FieldUnit, FormulaUnit, StoredResult, Unit};
    use crate::value::Value;
    use parser::parse;

    fn num(s: &str) -> Value {
        Value::Number(s.parse().unwrap())
    }

    fn field(name: &str, node: Uuid, path: Vec<Uuid>, value: Value) -> Unit {
        Unit::Field(FieldUnit {
            name: name.to_string(),
            node_id: node,
            path,
            value,
        })
    }

    #[test]
    fn resolves_exact_node_before_ancestors() {
        let root = Uuid::new_v4();
        let node = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(field("price", root, vec![], num("1")));
        builder.add(field("price", node, vec![root], num("2")));
        let index = builder.build();

        let units = index.resolve(node, &[root], "price");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].value(&index).unwrap(), num("2"));
    }

    #[test]
    fn nearest_ancestor_wins_over_farther_ones() {
        // Tree: root C -> B -> descendant D. "rate" registered at both
        // C and B; resolving from D must return B's unit.
        let c = Uuid::new_v4();
        let b = Uuid::new_v4();
        let d = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(field("rate", c, vec![], num("100")));
        builder.add(field("rate", b, vec![c], num("7")));
        let index = builder.build();

        let units = index.resolve(d, &[c, b], "rate");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].value(&index).unwrap(), num("7"));
    }

    #[test]
    fn falls_back_to_bare_name_then_empty() {
        let somewhere = Uuid::new_v4();
        let elsewhere = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(field("global_rate", somewhere, vec![], num("3")));
        let index = builder.build();

        // No scoped match from an unrelated node: the bare key hits.
        let units = index.resolve(elsewhere, &[], "global_rate");
        assert_eq!(units.len(), 1);

        assert!(index.resolve(elsewhere, &[], "nothing").is_empty());
    }

    #[test]
    fn singleton_binds_scalar_and_collection_binds_sum() {
        // Two "part_weight" fields under a shared parent; a formula at the
        // parent referencing the name gets their sum, a formula over a
        // single "unique" field gets the scalar.
        let parent = Uuid::new_v4();
        let leaf_a = Uuid::new_v4();
        let leaf_b = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(field("part_weight", leaf_a, vec![parent], num("1.5")));
        builder.add(field("part_weight", leaf_b, vec![parent], num("2")));
        builder.add(field("unique", leaf_a, vec![parent], num("9")));

        let sum_formula = FormulaUnit::new(
            Uuid::new_v4(),
            "total_weight",
            parent,
            vec![],
            parse("part_weight * 2").unwrap(),
            vec!["part_weight".to_string()],
        );
        let scalar_formula = FormulaUnit::new(
            Uuid::new_v4(),
            "doubled",
            parent,
            vec![],
            parse("unique * 2").unwrap(),
            vec!["unique".to_string()],
        );
        builder.add(Unit::Formula(sum_formula));
        builder.add(Unit::Formula(scalar_formula));
        let index = builder.build();

        let total = index.resolve(parent, &[], "total_weight");
        assert_eq!(total[0].value(&index).unwrap(), num("7"));

        let doubled = index.resolve(parent, &[], "doubled");
        assert_eq!(doubled[0].value(&index).unwrap(), num("18"));
    }

    #[test]
    fn formula_units_chain_through_the_index() {
        let node = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(field("base", node, vec![], num("10")));
        builder.add(Unit::Formula(FormulaUnit::new(
            Uuid::new_v4(),
            "doubled",
            node,
            vec![],
            parse("base * 2").unwrap(),
            vec!["base".to_string()],
        )));
        builder.add(Unit::Formula(FormulaUnit::new(
            Uuid::new_v4(),
            "quadrupled",
            node,
            vec![],
            parse("doubled * 2").unwrap(),
            vec!["doubled".to_string()],
        )));
        let index = builder.build();

        let units = index.resolve(node, &[], "quadrupled");
        assert_eq!(units[0].value(&index).unwrap(), num("40"));
    }

    #[test]
    fn cyclic_units_fail_loudly() {
        let node = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(Unit::Formula(FormulaUnit::new(
            Uuid::new_v4(),
            "a",
            node,
            vec![],
            parse("b + 1").unwrap(),
            vec!["b".to_string()],
        )));
        builder.add(Unit::Formula(FormulaUnit::new(
            Uuid::new_v4(),
            "b",
            node,
            vec![],
            parse("a + 1").unwrap(),
            vec!["a".to_string()],
        )));
        let index = builder.build();

        let units = index.resolve(node, &[], "a");
        let err = units[0].value(&index).unwrap_err();
        assert!(matches!(err, crate::error::EvalError::CyclicUnit { .. }));
    }

    #[test]
    fn formula_unit_memoizes_and_reports_touched() {
        let node = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(field("base", node, vec![], num("10")));

        let unit = FormulaUnit::new(
            Uuid::new_v4(),
            "doubled",
            node,
            vec![],
            parse("base * 2").unwrap(),
            vec!["base".to_string()],
        )
        .with_stored(StoredResult {
            value: num("20"),
            trace: "base * 2 = 10 * 2 = 20".to_string(),
        });
        builder.add(Unit::Formula(unit));
        let index = builder.build();

        let units = index.resolve(node, &[], "doubled");
        let Unit::Formula(fu) = &*units[0] else {
            panic!("expected formula unit");
        };

        // Same value and trace as stored: untouched.
        assert_eq!(fu.value(&index).unwrap(), num("20"));
        assert!(!fu.touched(&index).unwrap());
        // Repeat access returns the memoized result.
        assert_eq!(fu.value(&index).unwrap(), num("20"));
    }
}
