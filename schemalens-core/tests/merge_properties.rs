//! Property tests for merge monotonicity, idempotence and diff correctness.

use proptest::prelude::*;
use schemalens_core::diff::diff;
use schemalens_core::merge::merge;
use schemalens_core::models::{DataType, SchemaSnapshot};
use schemalens_core::observation::{Observation, ObservedColumn, ObservedTable};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Strategies
// ============================================================================

fn data_type_strategy() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Unknown),
        Just(DataType::Integer),
        Just(DataType::Number),
        Just(DataType::Boolean),
        Just(DataType::Date),
        Just(DataType::String),
    ]
}

fn column_strategy() -> impl Strategy<Value = ObservedColumn> {
    (
        prop_oneof![Just("id"), Just("name"), Just("status"), Just("total"), Just("user_id")],
        data_type_strategy(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec(0i64..20, 0..6),
    )
        .prop_map(|(name, data_type, pk, fk, nullable, examples)| {
            let mut column = ObservedColumn::named(name).with_type(data_type);
            column.is_primary_key = pk;
            column.is_foreign_key = fk;
            column.is_nullable = nullable;
            column.examples = examples.into_iter().map(serde_json::Value::from).collect();
            column
        })
}

fn table_strategy() -> impl Strategy<Value = ObservedTable> {
    (
        prop_oneof![Just("users"), Just("orders"), Just("items"), Just("events")],
        prop::collection::vec(column_strategy(), 0..5),
    )
        .prop_map(|(name, columns)| ObservedTable {
            columns,
            ..ObservedTable::named(name)
        })
}

fn observation_strategy() -> impl Strategy<Value = Observation> {
    prop::collection::vec(table_strategy(), 0..4).prop_map(Observation::Upsert)
}

fn build(observations: &[Observation]) -> SchemaSnapshot {
    observations
        .iter()
        .fold(SchemaSnapshot::new("db1"), |snapshot, observation| merge(snapshot, observation))
}

type ColumnFacts = BTreeMap<(String, String), (DataType, bool, bool, bool)>;

fn facts(snapshot: &SchemaSnapshot) -> ColumnFacts {
    snapshot
        .tables
        .iter()
        .flat_map(|t| {
            t.columns.iter().map(move |c| {
                (
                    (t.name.clone(), c.name.clone()),
                    (c.data_type, c.is_primary_key, c.is_foreign_key, c.is_nullable),
                )
            })
        })
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn merge_is_monotonic(observations in prop::collection::vec(observation_strategy(), 1..6)) {
        let mut snapshot = SchemaSnapshot::new("db1");
        for observation in &observations {
            let before = facts(&snapshot);
            snapshot = merge(snapshot, observation);
            let after = facts(&snapshot);

            for (key, (data_type, pk, fk, nullable)) in &before {
                let current = after.get(key);
                prop_assert!(current.is_some(), "column {:?} disappeared", key);
                let Some((new_type, new_pk, new_fk, new_nullable)) = current else {
                    continue;
                };
                if !data_type.is_unknown() {
                    prop_assert_eq!(new_type, data_type);
                }
                prop_assert!(!pk || *new_pk);
                prop_assert!(!fk || *new_fk);
                prop_assert!(!nullable || *new_nullable);
            }
        }
    }

    #[test]
    fn merge_is_idempotent(
        history in prop::collection::vec(observation_strategy(), 0..4),
        observation in observation_strategy(),
    ) {
        let base = build(&history);
        let once = merge(base, &observation);
        let twice = merge(once.clone(), &observation);

        prop_assert_eq!(&once.tables, &twice.tables);
        prop_assert_eq!(&once.relationships, &twice.relationships);
        prop_assert_eq!(once.last_updated, twice.last_updated);
    }

    #[test]
    fn examples_never_exceed_cap(observations in prop::collection::vec(observation_strategy(), 1..8)) {
        let snapshot = build(&observations);
        for table in &snapshot.tables {
            for column in &table.columns {
                prop_assert!(column.examples.len() <= 10);
            }
        }
    }

    #[test]
    fn diff_reports_exactly_new_entities(
        history in prop::collection::vec(observation_strategy(), 0..4),
        observation in observation_strategy(),
    ) {
        let old = build(&history);
        let new = merge(old.clone(), &observation);
        let changes = diff(&old, &new);

        let old_tables: BTreeSet<String> = old.tables.iter().map(|t| t.name.clone()).collect();
        let expected_tables: BTreeSet<String> = new
            .tables
            .iter()
            .filter(|t| !old_tables.contains(&t.name))
            .map(|t| t.id.clone())
            .collect();
        let added_tables: BTreeSet<String> = changes.tables.added.iter().cloned().collect();
        prop_assert_eq!(added_tables, expected_tables);
        prop_assert!(changes.tables.removed.is_empty());

        let old_facts = facts(&old);
        for table in &new.tables {
            let expected: BTreeSet<String> = table
                .columns
                .iter()
                .filter(|c| !old_facts.contains_key(&(table.name.clone(), c.name.clone())))
                .map(|c| c.name.clone())
                .collect();
            let added: BTreeSet<String> = changes
                .columns
                .get(&table.id)
                .map(|c| c.added.iter().cloned().collect())
                .unwrap_or_default();
            prop_assert_eq!(added, expected);
            if let Some(columns) = changes.columns.get(&table.id) {
                prop_assert!(columns.removed.is_empty());
            }
        }
    }
}
