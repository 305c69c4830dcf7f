use crate::mock::{FailingSchemaApplier, MockStorage, RecordingJobControl, RecordingSink};
use coordinator::{Coordinator, InMemoryCoordinator};
use engine_core::metrics::MemoryRegistry;
use engine_runtime::add_tables::AddTables;
use engine_runtime::error::TaskError;
use engine_runtime::job::NoopSchemaApplier;
use model::core::identifiers::TransferId;
use model::endpoint::{PostgresSource, PreSteps, Source};
use model::table::TableDescription;
use model::transfer::{Transfer, TransferKind, TransferOperation};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

struct Fixture {
    coordinator: Arc<InMemoryCoordinator>,
    job: Arc<RecordingJobControl>,
    storage: Arc<MockStorage>,
    sink: Arc<RecordingSink>,
    transfer: Transfer,
    operation: TransferOperation,
}

fn fixture(pre_steps: PreSteps) -> Fixture {
    let src = Source::Postgres(PostgresSource {
        cluster: "main".into(),
        db_tables: vec!["public.orders".into()],
        pre_steps,
    });
    let transfer = Transfer {
        id: TransferId::from("t1"),
        title: String::new(),
        kind: TransferKind::SnapshotAndIncrement,
        src: src.clone(),
        data_objects: None,
        transitional: false,
        async_operations: false,
        snapshot_parallelism: 2,
    };
    Fixture {
        coordinator: Arc::new(InMemoryCoordinator::with_endpoint(
            TransferId::from("t1"),
            src,
        )),
        job: Arc::new(RecordingJobControl::new()),
        storage: Arc::new(
            MockStorage::new(vec![
                TableDescription::new("public", "orders", 100),
                TableDescription::new("public", "users", 50),
            ])
            .with_batches(1, 50),
        ),
        sink: Arc::new(RecordingSink::new()),
        transfer,
        operation: TransferOperation::new("op-add", "t1"),
    }
}

fn workflow(fixture: &Fixture, schema: Arc<dyn engine_runtime::job::SchemaApplier>) -> AddTables {
    AddTables::new(
        fixture.coordinator.clone(),
        fixture.job.clone(),
        schema,
        Arc::new(MemoryRegistry::new()),
    )
}

fn endpoint_tables(endpoint: &Source) -> Vec<String> {
    endpoint.include_tables().to_vec()
}

#[tokio::test]
async fn adds_tables_and_persists_the_merged_set() {
    let fx = fixture(PreSteps::default());
    let workflow = workflow(&fx, Arc::new(NoopSchemaApplier));

    workflow
        .run(
            &CancellationToken::new(),
            fx.transfer.clone(),
            fx.operation.clone(),
            vec!["public.users".into()],
            fx.storage.clone(),
            fx.sink.clone(),
        )
        .await
        .unwrap();

    // Only the new table was snapshotted.
    assert_eq!(fx.sink.tables(), vec!["public.users".to_string()]);
    assert_eq!(fx.sink.rows_for("public.users"), 50);

    let endpoint = fx
        .coordinator
        .get_endpoint(&fx.transfer.id, false)
        .await
        .unwrap();
    assert_eq!(
        endpoint_tables(&endpoint),
        vec!["public.orders".to_string(), "public.users".to_string()],
        "merged set is deduplicated and sorted"
    );

    assert_eq!(fx.job.stops.load(Ordering::SeqCst), 1);
    assert_eq!(fx.job.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn readding_an_existing_table_is_idempotent() {
    let fx = fixture(PreSteps::default());
    let workflow = workflow(&fx, Arc::new(NoopSchemaApplier));

    workflow
        .run(
            &CancellationToken::new(),
            fx.transfer.clone(),
            fx.operation.clone(),
            vec!["public.orders".into()],
            fx.storage.clone(),
            fx.sink.clone(),
        )
        .await
        .unwrap();

    let endpoint = fx
        .coordinator
        .get_endpoint(&fx.transfer.id, false)
        .await
        .unwrap();
    assert_eq!(
        endpoint_tables(&endpoint),
        vec!["public.orders".to_string()]
    );
}

#[tokio::test]
async fn schema_failure_leaves_the_old_table_set_persisted() {
    let fx = fixture(PreSteps {
        create_tables: true,
        constraints: false,
    });
    let workflow = workflow(&fx, Arc::new(FailingSchemaApplier));

    let err = workflow
        .run(
            &CancellationToken::new(),
            fx.transfer.clone(),
            fx.operation.clone(),
            vec!["public.users".into()],
            fx.storage.clone(),
            fx.sink.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Schema(_)), "{err}");

    let endpoint = fx
        .coordinator
        .get_endpoint(&fx.transfer.id, false)
        .await
        .unwrap();
    assert_eq!(
        endpoint_tables(&endpoint),
        vec!["public.orders".to_string()],
        "endpoint unchanged after a failed step"
    );

    // The transfer stays stopped; resuming is external intervention.
    assert_eq!(fx.job.stops.load(Ordering::SeqCst), 1);
    assert_eq!(fx.job.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tables_missing_on_the_live_source_fail_validation() {
    let fx = fixture(PreSteps::default());
    let workflow = workflow(&fx, Arc::new(NoopSchemaApplier));

    let err = workflow
        .run(
            &CancellationToken::new(),
            fx.transfer.clone(),
            fx.operation.clone(),
            vec!["public.ghost".into()],
            fx.storage.clone(),
            fx.sink.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::MissingCandidateTables { .. }), "{err}");
    assert_eq!(fx.sink.total_rows(), 0, "nothing was snapshotted");
    assert_eq!(fx.job.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn structurally_invalid_names_fail_validation() {
    let fx = fixture(PreSteps::default());
    let workflow = workflow(&fx, Arc::new(NoopSchemaApplier));

    for bad in ["users", "public.*"] {
        let err = workflow
            .run(
                &CancellationToken::new(),
                fx.transfer.clone(),
                fx.operation.clone(),
                vec![bad.into()],
                fx.storage.clone(),
                fx.sink.clone(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidTables(_)), "{bad}: {err}");
    }
}

#[tokio::test]
async fn unsupported_topologies_fail_before_stopping_the_job() {
    let fx = fixture(PreSteps::default());
    let workflow = workflow(&fx, Arc::new(NoopSchemaApplier));

    let mut asynchronous = fx.transfer.clone();
    asynchronous.async_operations = true;

    let err = workflow
        .run(
            &CancellationToken::new(),
            asynchronous,
            fx.operation.clone(),
            vec!["public.users".into()],
            fx.storage.clone(),
            fx.sink.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Unsupported(_)), "{err}");
    assert_eq!(
        fx.job.stops.load(Ordering::SeqCst),
        0,
        "precondition fails before any mutation"
    );
}
