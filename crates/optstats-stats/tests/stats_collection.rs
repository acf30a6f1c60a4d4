use std::sync::Arc;
use std::thread;

use optstats_stats::{
    Column, Histogram, HistColl, Index, NeededItems, StatsConfig, StatsContext, StatsItem,
    StatsLoadedStatus, StatsOptions, Table, TableCacheItem, TopN,
};
use optstats_types::{ColumnInfo, Datum, FieldType, IndexColumn, IndexInfo, TableInfo, TableItemId};
use proptest::prelude::*;

fn int_column(physical_id: i64, id: i64, rows: i64) -> Column {
    let mut h = Histogram::new(id, rows, 0, 1, FieldType::bigint(), 1, rows * 8);
    h.append_bucket(Datum::Int(1), Datum::Int(rows), rows, 1);
    Column::new(physical_id, ColumnInfo::new(id, &format!("c{id}"), FieldType::bigint()), h)
}

/// Histogram over `values`, `per_bucket` distinct values per bucket.
fn build_histogram(mut values: Vec<i64>, per_bucket: usize, nulls: i64) -> Histogram {
    values.sort_unstable();
    let mut distinct: Vec<(i64, i64)> = Vec::new();
    for v in values {
        match distinct.last_mut() {
            Some((last, n)) if *last == v => *n += 1,
            _ => distinct.push((v, 1)),
        }
    }
    let mut h = Histogram::new(1, distinct.len() as i64, nulls, 1, FieldType::bigint(), 0, 0);
    let mut cumulative = 0;
    for chunk in distinct.chunks(per_bucket) {
        cumulative += chunk.iter().map(|(_, n)| n).sum::<i64>();
        let (lower, _) = chunk[0];
        let (upper, repeat) = chunk[chunk.len() - 1];
        h.append_bucket_with_ndv(
            Datum::Int(lower),
            Datum::Int(upper),
            cumulative,
            repeat,
            chunk.len() as i64,
        );
    }
    h
}

// ---------------------------------------------------------------------------
// Pending-load tracker
// ---------------------------------------------------------------------------

#[test]
fn test_needed_items_concurrent_inserts() {
    const THREADS: i64 = 8;
    const IDS: i64 = 50;
    let needed = Arc::new(NeededItems::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let needed = Arc::clone(&needed);
            thread::spawn(move || {
                for id in 0..IDS {
                    needed.insert(TableItemId::column(t, id));
                    // Readers interleave with writers.
                    assert!(needed.contains(TableItemId::column(t, id)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("inserter thread");
    }
    assert_eq!(needed.len(), (THREADS * IDS) as usize);
    let mut all = needed.all_items();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), (THREADS * IDS) as usize);

    needed.delete(TableItemId::column(0, 0));
    needed.delete(TableItemId::index(0, 1));
    assert_eq!(needed.len(), (THREADS * IDS - 1) as usize);
}

#[test]
fn test_evicted_items_are_queued_through_context() {
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::WARN)
            .finish(),
    );
    let config = Arc::new(StatsConfig::new(StatsOptions {
        sync_load_enabled: true,
        ..StatsOptions::default()
    }));
    let needed = Arc::new(NeededItems::new());
    let ctx = StatsContext::new(config, Arc::clone(&needed));

    let col = int_column(42, 1, 10).with_loaded(StatsLoadedStatus::all_evicted());
    assert!(col.is_invalid(&ctx, false));
    let info = IndexInfo::new(3, "idx", vec![IndexColumn::new("c1", 0)]);
    let idx = Index::new(42, info, Histogram::new(3, 0, 0, 1, FieldType::blob(), 0, 0))
        .with_loaded(StatsLoadedStatus::all_evicted());
    assert!(idx.is_invalid(&ctx, false));

    let mut all = needed.all_items();
    all.sort();
    assert_eq!(all, vec![TableItemId::column(42, 1), TableItemId::index(42, 3)]);
}

// ---------------------------------------------------------------------------
// Freshness and health
// ---------------------------------------------------------------------------

#[test]
fn test_outdated_flips_at_threshold_and_follows_runtime_changes() {
    let config = Arc::new(StatsConfig::default());
    let ctx = StatsContext::new(Arc::clone(&config), Arc::new(NeededItems::new()));
    let mut coll = HistColl::new(1, 1000, 0).with_column(int_column(1, 1, 1000));

    coll.modify_count = 700;
    assert!(!coll.is_outdated(ctx.config()));
    coll.modify_count = 701;
    assert!(coll.is_outdated(ctx.config()));

    // Another thread tightens the threshold; the next call sees it.
    let writer = Arc::clone(&config);
    thread::spawn(move || writer.set_ratio_of_pseudo_estimate(0.9))
        .join()
        .expect("config writer");
    assert!(!coll.is_outdated(ctx.config()));

    let table = Table::new(coll);
    assert!(!table.for_estimation(ctx.config()).coll.pseudo);
    config.set_ratio_of_pseudo_estimate(0.5);
    assert!(table.for_estimation(ctx.config()).coll.pseudo);
}

#[test]
fn test_health_prefers_analyzed_row_count() {
    // 1000 analyzed rows, 4000 now, 500 modifications.
    let coll = HistColl::new(1, 4000, 500).with_column(int_column(1, 1, 1000));
    assert_eq!(coll.stats_healthy(), Some(50));
    // Without column statistics the realtime count is the base.
    let bare = HistColl::new(1, 4000, 500);
    assert_eq!(bare.stats_healthy(), Some(87));
    assert_eq!(HistColl::new(1, 0, 0).stats_healthy(), Some(100));
}

#[test]
fn test_pseudo_table_is_not_initialized() {
    let info = TableInfo::new(7, "t")
        .with_column(ColumnInfo::new(1, "a", FieldType::bigint()))
        .with_index(IndexInfo::new(2, "ia", vec![IndexColumn::new("a", 0)]));
    let t = Table::pseudo(&info);
    assert!(!t.coll.is_initialized());
    assert_eq!(t.coll.stats_healthy(), None);
    assert!(!t.coll.is_outdated(&StatsConfig::default()));
    let real = Table::new(HistColl::new(7, 10, 0).with_column(int_column(7, 1, 10)));
    assert!(real.coll.is_initialized());
}

// ---------------------------------------------------------------------------
// Cache accounting
// ---------------------------------------------------------------------------

#[test]
fn test_table_memory_usage_sums_items() {
    let top_n = TopN::from_values([(Datum::Int(3), 9)]).expect("encode topn");
    let coll = HistColl::new(1, 100, 0)
        .with_column(int_column(1, 1, 100).with_top_n(top_n))
        .with_column(int_column(1, 2, 100));
    let usage = coll.memory_usage();
    let expected: i64 = coll.columns.values().map(|c| c.memory_usage().total).sum();
    assert_eq!(usage.total, expected);
    assert_eq!(usage.columns.len(), 2);
    assert!(usage.columns[&1].top_n > 0);
    assert_eq!(usage.total_tracking(), usage.total_col_tracking());

    let mut item = StatsItem::from(Arc::clone(&coll.columns[&1]));
    let before = item.memory_usage().tracking();
    item.drop_unnecessary_data();
    assert!(item.memory_usage().tracking() < before);
    assert!(item.is_all_evicted());
    assert!(item.is_stats_initialized());
}

// ---------------------------------------------------------------------------
// Histogram invariants
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_less_row_count_is_monotone(
        values in proptest::collection::vec(-500_i64..500, 1..300),
        per_bucket in 1_usize..20,
        nulls in 0_i64..50,
        probes in proptest::collection::vec(-600_i64..600, 2..20),
    ) {
        let n = values.len() as f64;
        let h = build_histogram(values, per_bucket, nulls);
        prop_assert_eq!(h.total_row_count(), n + nulls as f64);
        let mut probes = probes;
        probes.sort_unstable();
        let mut prev = 0.0;
        for p in probes {
            let less = h.less_row_count(&Datum::Int(p));
            prop_assert!(less >= prev - 1e-9, "less({}) = {} < {}", p, less, prev);
            prop_assert!(less <= h.not_null_count() + 1e-9);
            prev = less;
        }
    }

    #[test]
    fn prop_between_is_non_negative(
        values in proptest::collection::vec(0_i64..100, 1..200),
        per_bucket in 1_usize..10,
        a in -10_i64..110,
        b in -10_i64..110,
    ) {
        let h = build_histogram(values, per_bucket, 0);
        let between = h.between_row_count(&Datum::Int(a.min(b)), &Datum::Int(a.max(b)));
        prop_assert!(between >= 0.0);
        prop_assert!(between <= h.not_null_count() + 1e-9);
    }
}
