//! End-to-end scenarios exercised through the public `Table` API only
//! (no access to module internals).

use std::collections::BTreeMap;
use std::sync::Arc;

use strata::filter::Predicate;
use strata::row::{DataType, Row, Value};
use strata::storage::memory::MemoryStorage;
use strata::storage::Storage;
use strata::table::{QueryOptions, TableConfig, WriteOptions};
use strata::Table;

fn row(fields: &[(&str, Value)]) -> Row {
    let mut r = Row::new();
    for (k, v) in fields {
        r.insert((*k).to_string(), v.clone());
    }
    r
}

fn memory_table(config: TableConfig) -> Table {
    Table::new(Arc::new(MemoryStorage::new()), "t", config)
}

/// Scenario 1: create + round-trip.
#[tokio::test]
async fn create_and_round_trip() {
    let t = memory_table(TableConfig::testing());

    t.write(
        vec![
            row(&[("id", Value::Int(1)), ("v", Value::Int(100))]),
            row(&[("id", Value::Int(2)), ("v", Value::Int(200))]),
        ],
        WriteOptions::default(),
    )
    .await
    .unwrap();

    let result = t.query(&Predicate::MatchAll, QueryOptions::default()).await.unwrap();
    let mut ids: Vec<i64> = result
        .rows
        .iter()
        .map(|r| match r.get("id") {
            Some(Value::Int(i)) => *i,
            _ => panic!("expected int id"),
        })
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);

    assert_eq!(t.version().await.unwrap(), Some(0));
}

/// Scenario 2: time travel.
#[tokio::test]
async fn time_travel_across_versions() {
    let t = memory_table(TableConfig::testing());

    t.write(
        vec![
            row(&[("id", Value::Int(1)), ("v", Value::Int(100))]),
            row(&[("id", Value::Int(2)), ("v", Value::Int(200))]),
        ],
        WriteOptions::default(),
    )
    .await
    .unwrap();

    t.write(vec![row(&[("id", Value::Int(3)), ("v", Value::Int(300))])], WriteOptions::default())
        .await
        .unwrap();

    let at_v0 = t
        .query(&Predicate::MatchAll, QueryOptions::default().at_version(0))
        .await
        .unwrap();
    assert_eq!(at_v0.rows.len(), 2);

    let at_v1 = t
        .query(&Predicate::MatchAll, QueryOptions::default().at_version(1))
        .await
        .unwrap();
    assert_eq!(at_v1.rows.len(), 3);
}

/// Scenario 3: optimistic conflict. Two writers both observe version 0 and
/// race to commit version 1 directly on the shared storage; exactly one
/// wins, the other gets a VersionMismatch naming the winner's token, and
/// after refreshing, the loser's retry lands at version 2.
#[tokio::test]
async fn optimistic_conflict_loser_retries_after_refresh() {
    let storage = Arc::new(MemoryStorage::new());
    let t1 = Table::new(storage.clone(), "t", TableConfig::testing());
    let t2 = Table::new(storage.clone(), "t", TableConfig::testing());

    t1.write(vec![row(&[("id", Value::Int(1))])], WriteOptions::default()).await.unwrap();

    // Both writers observe version 0 before either attempts version 1.
    assert_eq!(t1.version().await.unwrap(), Some(0));
    assert_eq!(t2.version().await.unwrap(), Some(0));

    t1.write(vec![row(&[("id", Value::Int(2))])], WriteOptions::default()).await.unwrap();
    assert_eq!(t1.version().await.unwrap(), Some(1));

    // t2 still thinks the table is at version 0; its own write path refreshes
    // and retries internally, but to exercise the loser's raw CAS failure we
    // go one layer down and race write_conditional by hand.
    let commit_path = "t/_delta_log/00000000000000000002.json";
    let loser = storage.write_conditional(commit_path, bytes::Bytes::from_static(b"{}"), None).await;
    assert!(loser.is_ok(), "first writer to 00000...0002 always wins on an empty path");

    let rematch = storage.write_conditional(commit_path, bytes::Bytes::from_static(b"{}"), None).await;
    match rematch {
        Err(strata::storage::StorageError::VersionMismatch { expected, actual, .. }) => {
            assert!(expected.is_none());
            assert!(actual.is_some());
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }

    t2.refresh_version().await.unwrap();
    let summary = t2.write(vec![row(&[("id", Value::Int(3))])], WriteOptions::default()).await.unwrap();
    assert_eq!(summary.version, 2);
}

/// Scenario 4: predicate pushdown skips whole files via the zone map.
#[tokio::test]
async fn predicate_pushdown_skips_old_files() {
    let t = memory_table(TableConfig::testing());

    for year in [1990, 2000, 2010, 2020] {
        t.write(vec![row(&[("year", Value::Int(year))])], WriteOptions::default()).await.unwrap();
    }

    let result = t.query(&Predicate::gt("year", Value::Int(2022)), QueryOptions::default()).await.unwrap();
    assert!(result.rows.is_empty());
    assert!(result.files_skipped >= 1);
}

/// Scenario 5: CDC records an insert batch then an update, in order.
#[tokio::test]
async fn cdc_records_insert_then_update_in_commit_order() {
    let t = memory_table(TableConfig::testing().with_cdc_enabled(true));

    t.write(
        vec![
            row(&[("id", Value::Int(1)), ("v", Value::Int(10))]),
            row(&[("id", Value::Int(2)), ("v", Value::Int(20))]),
            row(&[("id", Value::Int(3)), ("v", Value::Int(30))]),
        ],
        WriteOptions::default(),
    )
    .await
    .unwrap();

    let mut patch = BTreeMap::new();
    patch.insert("v".to_string(), Value::Int(99));
    t.update(&Predicate::eq("id", Value::Int(2)), patch).await.unwrap();

    let records = t.read_cdc_by_version(0, 1).await.unwrap();

    let v0: Vec<_> = records.iter().filter(|r| r.commit_version == 0).collect();
    assert_eq!(v0.len(), 3);
    assert!(v0.iter().all(|r| matches!(r.change_type, strata::cdc::ChangeType::Insert)));

    let v1: Vec<_> = records.iter().filter(|r| r.commit_version == 1).collect();
    assert_eq!(v1.len(), 2);
    assert!(matches!(v1[0].change_type, strata::cdc::ChangeType::UpdatePreimage));
    assert!(matches!(v1[1].change_type, strata::cdc::ChangeType::UpdatePostimage));
}

/// Scenario 6: VARIANT shredding produces per-field zone-map statistics
/// usable for pushdown against a nested path.
#[tokio::test]
async fn variant_shredding_yields_nested_zone_map_stats() {
    let config = TableConfig::testing()
        .with_shredded_field("doc.cat", DataType::Utf8)
        .with_shredded_field("doc.price", DataType::Int64);
    let t = memory_table(config);

    let mut doc_a = BTreeMap::new();
    doc_a.insert("cat".to_string(), Value::String("A".into()));
    doc_a.insert("price".to_string(), Value::Int(100));
    let mut doc_b = BTreeMap::new();
    doc_b.insert("cat".to_string(), Value::String("B".into()));
    doc_b.insert("price".to_string(), Value::Int(200));

    t.write(
        vec![row(&[("doc", Value::Object(doc_a))]), row(&[("doc", Value::Object(doc_b))])],
        WriteOptions::default(),
    )
    .await
    .unwrap();

    // Both rows land in the same file (no partitioning), so a predicate
    // against the shredded typed-value column that only the 'B' row
    // satisfies must still scan it (pushdown can't skip a file that
    // contains a match)...
    let hit = t
        .query(&Predicate::eq("doc.typed_value.cat.typed_value", Value::String("B".into())), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(hit.files_skipped, 0);

    // ...while a value outside the file's [A, B] zone-map range proves no
    // row can match and the file is skipped entirely.
    let miss = t
        .query(&Predicate::eq("doc.typed_value.cat.typed_value", Value::String("Z".into())), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(miss.rows.len(), 0);
    assert_eq!(miss.files_skipped, 1);
}

/// Merge classifies matched vs. unmatched rows and emits a single commit.
#[tokio::test]
async fn merge_updates_matches_and_inserts_the_rest() {
    let t = memory_table(TableConfig::testing());

    t.write(
        vec![row(&[("id", Value::Int(1)), ("v", Value::Int(10))]), row(&[("id", Value::Int(2)), ("v", Value::Int(20))])],
        WriteOptions::default(),
    )
    .await
    .unwrap();

    let incoming = vec![row(&[("id", Value::Int(2)), ("v", Value::Int(222))]), row(&[("id", Value::Int(3)), ("v", Value::Int(30))])];
    let outcome = t
        .merge(incoming, "id", |_existing, incoming| Some(incoming.clone()), |incoming| Some(incoming.clone()))
        .await
        .unwrap();

    assert_eq!(outcome.num_matched, 1);
    assert_eq!(outcome.num_updated, 1);
    assert_eq!(outcome.num_inserted, 1);

    let result = t.query(&Predicate::MatchAll, QueryOptions::default()).await.unwrap();
    assert_eq!(result.rows.len(), 3);
}

/// A path that resolves outside the storage base fails before any I/O,
/// regardless of how many rounds of URL-decoding it takes to get there.
#[tokio::test]
async fn path_escape_is_rejected_before_any_io() {
    let storage = MemoryStorage::new();
    for attempt in ["../escape", "a/../../escape", "%2e%2e/escape", "%252e%252e/escape"] {
        let result = storage.read(attempt).await;
        assert!(result.is_err(), "expected {attempt} to be rejected");
    }
}
