use crate::mock::{FlakyCoordinator, MockStorage, RecordingSink};
use connectors::csv::{CsvDirectorySink, CsvDirectoryStorage};
use coordinator::{Coordinator, InMemoryCoordinator};
use engine_core::connectors::source::SnapshotStorage;
use engine_core::metrics::{MemoryRegistry, MetricsRegistry};
use engine_runtime::error::TaskError;
use engine_runtime::snapshot::loader::{OPERATION_STATE_COMPLETED, OPERATION_STATE_RUNNING};
use engine_runtime::snapshot::metrics::{TABLE_REMAINDER_GAUGE, TOTAL_REMAINDER_GAUGE};
use engine_runtime::snapshot::{
    EtaParams, MAX_TABLE_STAT_COUNT, SnapshotLoader, SnapshotTableMetricsTracker,
    SnapshotTableProgressTracker, new_shared_table_parts,
};
use model::core::identifiers::{OperationId, TransferId};
use model::endpoint::{CsvSource, PostgresSource, PreSteps, Source};
use model::table::{OperationTablePart, TableDescription};
use model::transfer::{Transfer, TransferKind};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn pg_transfer(db_tables: &[&str]) -> Transfer {
    Transfer {
        id: TransferId::from("transfer-1"),
        title: String::new(),
        kind: TransferKind::Snapshot,
        src: Source::Postgres(PostgresSource {
            cluster: "main".into(),
            db_tables: db_tables.iter().map(|t| t.to_string()).collect(),
            pre_steps: PreSteps::default(),
        }),
        data_objects: None,
        transitional: false,
        async_operations: false,
        snapshot_parallelism: 4,
    }
}

fn loader(coordinator: Arc<dyn Coordinator>, transfer: Transfer) -> SnapshotLoader {
    SnapshotLoader::new(
        coordinator,
        OperationId::from("test-operation"),
        transfer,
        Arc::new(MemoryRegistry::new()),
    )
}

fn tables(specs: &[(&str, &str, u64)]) -> Vec<TableDescription> {
    specs
        .iter()
        .map(|(schema, name, eta)| TableDescription::new(*schema, *name, *eta))
        .collect()
}

#[tokio::test]
async fn upload_with_canceled_context_is_not_an_error() {
    let storage = Arc::new(MockStorage::new(tables(&[
        ("schema1", "table1", 10),
        ("schema1", "table2", 10),
    ])));
    let sink = Arc::new(RecordingSink::new());
    let loader = loader(
        Arc::new(InMemoryCoordinator::new()),
        pg_transfer(&["schema1.table1", "schema1.table2"]),
    );

    let discovered = storage.table_list().await.unwrap();
    let plan = loader
        .build_tpp(&CancellationToken::new(), storage.as_ref(), &discovered)
        .await
        .unwrap();
    assert_eq!(plan.parts.len(), 2);

    let canceled = CancellationToken::new();
    canceled.cancel();
    loader
        .do_upload_tables(&canceled, storage.clone(), sink.clone(), plan)
        .await
        .unwrap();
    assert_eq!(sink.total_rows(), 0, "nothing copied after cancellation");

    let empty_plan = loader
        .build_tpp(&canceled, storage.as_ref(), &discovered)
        .await
        .unwrap();
    assert!(empty_plan.parts.is_empty(), "canceled planning is a no-op");
}

#[tokio::test]
async fn sink_failure_aborts_the_load() {
    let storage = Arc::new(MockStorage::new(tables(&[("schema1", "table1", 10)])));
    let sink = Arc::new(RecordingSink::failing());
    let loader = loader(
        Arc::new(InMemoryCoordinator::new()),
        pg_transfer(&["schema1.table1"]),
    );

    let err = loader
        .load_snapshot(&CancellationToken::new(), storage, sink)
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Sink(_)), "{err}");
}

#[tokio::test]
async fn storage_read_failure_aborts_the_load() {
    let storage = Arc::new(
        MockStorage::new(tables(&[("schema1", "table1", 10)])).failing_reads(),
    );
    let sink = Arc::new(RecordingSink::new());
    let loader = loader(
        Arc::new(InMemoryCoordinator::new()),
        pg_transfer(&["schema1.table1"]),
    );

    let err = loader
        .load_snapshot(&CancellationToken::new(), storage, sink)
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Storage(_)), "{err}");
}

#[tokio::test]
async fn load_snapshot_copies_everything_and_records_progress() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let storage = Arc::new(
        MockStorage::new(tables(&[
            ("schema1", "table1", 40),
            ("schema2", "table1", 20),
        ]))
        .with_shards(2)
        .with_batches(2, 10),
    );
    let sink = Arc::new(RecordingSink::new());
    let loader = loader(
        coordinator.clone(),
        pg_transfer(&["schema1.table1", "schema2.table1"]),
    );

    loader
        .load_snapshot(&CancellationToken::new(), storage, sink.clone())
        .await
        .unwrap();

    // 2 tables x 2 shards x 2 batches x 10 rows.
    assert_eq!(sink.total_rows(), 80);
    assert_eq!(sink.rows_for("schema1.table1"), 40);

    let operation = OperationId::from("test-operation");
    assert_eq!(
        coordinator.get_operation_state(&operation).await.unwrap(),
        OPERATION_STATE_COMPLETED
    );
    let parts = coordinator
        .get_operation_tables_parts(&operation)
        .await
        .unwrap();
    assert_eq!(parts.len(), 4);
    assert!(parts.iter().all(|part| part.completed));
    assert_eq!(parts.iter().map(|part| part.completed_rows).sum::<u64>(), 80);
}

#[tokio::test]
async fn canceled_load_does_not_mark_the_operation_completed() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let storage = Arc::new(MockStorage::new(tables(&[("schema1", "table1", 10)])));
    let sink = Arc::new(RecordingSink::new());
    let loader = loader(coordinator.clone(), pg_transfer(&["schema1.table1"]));

    let canceled = CancellationToken::new();
    canceled.cancel();
    loader
        .load_snapshot(&canceled, storage, sink)
        .await
        .unwrap();

    let operation = OperationId::from("test-operation");
    assert_eq!(
        coordinator.get_operation_state(&operation).await.unwrap(),
        OPERATION_STATE_RUNNING
    );
}

#[tokio::test]
async fn progress_is_retried_after_a_failed_flush_and_pruned_after_success() {
    let coordinator = Arc::new(FlakyCoordinator::new());
    let shared = new_shared_table_parts();
    let tracker = SnapshotTableProgressTracker::new(
        coordinator.clone(),
        OperationId::from("op-1"),
        shared.clone(),
    );

    let mut part = OperationTablePart::whole_table(
        OperationId::from("op-1"),
        &TableDescription::new("public", "orders", 10),
    );
    part.completed_rows = 10;
    part.completed = true;
    tracker.add(&part);

    coordinator.fail_part_updates(true);
    tracker.flush().await;
    assert_eq!(
        shared.lock().unwrap().len(),
        1,
        "failed flush keeps the part buffered"
    );
    assert!(
        coordinator
            .get_operation_tables_parts(&OperationId::from("op-1"))
            .await
            .unwrap()
            .is_empty()
    );

    coordinator.fail_part_updates(false);
    tracker.flush().await;
    assert!(
        shared.lock().unwrap().is_empty(),
        "completed part pruned after a durable flush"
    );
    let stored = coordinator
        .get_operation_tables_parts(&OperationId::from("op-1"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].completed);

    tracker.close().await;
}

#[tokio::test]
async fn in_flight_parts_survive_pruning() {
    let coordinator = Arc::new(FlakyCoordinator::new());
    let shared = new_shared_table_parts();
    let tracker = SnapshotTableProgressTracker::new(
        coordinator.clone(),
        OperationId::from("op-1"),
        shared.clone(),
    );

    let mut in_flight = OperationTablePart::whole_table(
        OperationId::from("op-1"),
        &TableDescription::new("public", "orders", 10),
    );
    in_flight.completed_rows = 5;
    tracker.add(&in_flight);

    tracker.flush().await;
    assert_eq!(shared.lock().unwrap().len(), 1, "in-flight part kept");

    tracker.close().await;
}

#[tokio::test]
async fn tracker_close_is_idempotent_and_flushes_once() {
    let coordinator = Arc::new(FlakyCoordinator::new());
    let tracker = Arc::new(SnapshotTableProgressTracker::new(
        coordinator.clone(),
        OperationId::from("op-1"),
        new_shared_table_parts(),
    ));
    let part = OperationTablePart::whole_table(
        OperationId::from("op-1"),
        &TableDescription::new("public", "orders", 10),
    );
    tracker.add(&part);

    let mut closers = Vec::new();
    for _ in 0..4 {
        let tracker = tracker.clone();
        closers.push(tokio::spawn(async move { tracker.close().await }));
    }
    for closer in closers {
        closer.await.unwrap();
    }
    tracker.close().await;

    assert_eq!(
        coordinator.part_update_calls(),
        1,
        "exactly one drain-and-final-flush"
    );
}

#[tokio::test]
async fn per_table_gauges_are_capped_but_the_total_is_not() {
    let registry = Arc::new(MemoryRegistry::new());
    let seed = EtaParams {
        total_eta: (MAX_TABLE_STAT_COUNT + 100) as f64,
        tables_etas: (0..MAX_TABLE_STAT_COUNT + 100)
            .map(|i| (format!("public.table{i}"), 1.0))
            .collect(),
    };

    let tracker = SnapshotTableMetricsTracker::new_local(
        registry.clone(),
        new_shared_table_parts(),
        Some(seed),
    )
    .await;

    assert_eq!(
        registry.series_count(TABLE_REMAINDER_GAUGE),
        MAX_TABLE_STAT_COUNT
    );
    assert_eq!(
        registry.gauge_value(TOTAL_REMAINDER_GAUGE, &[]),
        Some((MAX_TABLE_STAT_COUNT + 100) as f64),
        "total gauge reflects every table"
    );

    tracker.close().await;
}

#[tokio::test]
async fn sharded_metrics_merge_progress_through_the_coordinator() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let operation = OperationId::from("op-1");
    let table = TableDescription::new("public", "orders", 100);

    let mut shard0 = OperationTablePart::shard_of(operation.clone(), &table, "0", 50);
    shard0.completed_rows = 50;
    shard0.completed = true;
    let mut shard1 = OperationTablePart::shard_of(operation.clone(), &table, "1", 50);
    shard1.completed_rows = 20;
    coordinator
        .update_operation_tables_parts(&operation, &[shard0, shard1])
        .await
        .unwrap();

    let registry = Arc::new(MemoryRegistry::new());
    let tracker = SnapshotTableMetricsTracker::new_sharded(
        registry.clone(),
        coordinator.clone(),
        operation.clone(),
        None,
    )
    .await;

    assert_eq!(
        registry.gauge_value(TOTAL_REMAINDER_GAUGE, &[]),
        Some(100.0),
        "initial gauge carries the calculated ETA"
    );

    tracker.publish().await;
    assert_eq!(registry.gauge_value(TOTAL_REMAINDER_GAUGE, &[]), Some(30.0));
    assert_eq!(
        registry.gauge_value(TABLE_REMAINDER_GAUGE, &[("table", "public.orders")]),
        Some(30.0)
    );

    tracker.close().await;
}

#[tokio::test]
async fn csv_to_csv_snapshot_end_to_end() {
    crate::init_test_logging();
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();

    for (fqtn, rows) in [("public.orders", 25), ("public.items", 5)] {
        let mut file =
            std::fs::File::create(source_dir.path().join(format!("{fqtn}.csv"))).unwrap();
        writeln!(file, "id,name").unwrap();
        for i in 0..rows {
            writeln!(file, "{i},row{i}").unwrap();
        }
    }

    let src = CsvSource {
        directory: source_dir.path().to_path_buf(),
        include_tables: vec![],
    };
    let transfer = Transfer {
        id: TransferId::from("csv-transfer"),
        title: "csv to csv".into(),
        kind: TransferKind::Snapshot,
        src: Source::Csv(src.clone()),
        data_objects: None,
        transitional: false,
        async_operations: false,
        snapshot_parallelism: 2,
    };

    let coordinator = Arc::new(InMemoryCoordinator::new());
    let storage = Arc::new(CsvDirectoryStorage::from_source(&src).with_batch_rows(10));
    let sink = Arc::new(CsvDirectorySink::new(target_dir.path()));
    let registry: Arc<dyn MetricsRegistry> = Arc::new(MemoryRegistry::new());

    let operation = OperationId::from("csv-op");
    let loader = SnapshotLoader::new(coordinator.clone(), operation.clone(), transfer, registry);
    loader
        .load_snapshot(&CancellationToken::new(), storage, sink)
        .await
        .unwrap();

    let copied = std::fs::read_to_string(target_dir.path().join("public.orders.csv")).unwrap();
    assert_eq!(copied.lines().count(), 25, "all data rows copied, no header");

    let parts = coordinator
        .get_operation_tables_parts(&operation)
        .await
        .unwrap();
    assert_eq!(parts.len(), 2);
    assert!(parts.iter().all(|part| part.completed));
}
