use rand::SeedableRng;
use rand::rngs::SmallRng;
use uploadbench::benchmark::{self, BenchmarkSettings};
use uploadbench::{BenchmarkError, Cleanup, names};
use uploadbench_storage::{
    AzureBlobStorage, AzureConfig, BoxedStorage, ContainerStatus, StorageResult,
};
use uploadbench_test::server::{ACCESS_KEY, ACCOUNT_NAME, TestServer};

fn storage_config(server: &TestServer) -> AzureConfig {
    AzureConfig {
        account_name: ACCOUNT_NAME.into(),
        access_key: ACCESS_KEY.into(),
        base_service_url: "localhost".into(),
        api_version: "2015-04-05".into(),
        use_https: false,
        endpoint: Some(server.endpoint()),
    }
}

fn connect(config: AzureConfig) -> impl FnOnce() -> StorageResult<BoxedStorage> {
    move || Ok(Box::new(AzureBlobStorage::connect(config)?) as BoxedStorage)
}

fn settings(worker_count: usize) -> BenchmarkSettings {
    BenchmarkSettings {
        worker_count,
        payload_size: 64 * 1024,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uploads_against_blob_service() {
    uploadbench_test::tracing::init();
    let server = TestServer::new().await;

    let report = benchmark::run(&settings(8), connect(storage_config(&server)))
        .await
        .unwrap();

    assert_eq!(report.snapshot.successful, 8);
    assert_eq!(report.snapshot.failed, 0);
    assert!(report.average().is_some());
    assert_eq!(report.container_status, ContainerStatus::Created);
    assert_eq!(report.cleanup, Cleanup::Deleted);

    assert_eq!(server.upload_count(), 8);
    assert_eq!(server.uploaded_bytes(), 8 * 64 * 1024);
    assert!(!server.has_container(&report.container));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_uploads_are_counted() {
    uploadbench_test::tracing::init();
    let server = TestServer::new().await;
    server.fail_next_uploads(2);

    let report = benchmark::run(&settings(5), connect(storage_config(&server)))
        .await
        .unwrap();

    assert_eq!(report.snapshot.successful, 3);
    assert_eq!(report.snapshot.failed, 2);
    assert_eq!(server.upload_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reuses_existing_container() {
    uploadbench_test::tracing::init();
    let server = TestServer::new().await;
    let seed = 7;
    let container = names::container_name(&mut SmallRng::seed_from_u64(seed), "bench");
    server.create_container(&container);

    let settings = BenchmarkSettings {
        seed: Some(seed),
        ..settings(3)
    };
    let report = benchmark::run(&settings, connect(storage_config(&server)))
        .await
        .unwrap();

    assert_eq!(report.container, container);
    assert_eq!(report.container_status, ContainerStatus::AlreadyExists);
    assert_eq!(report.snapshot.successful, 3);
    assert!(!server.has_container(&container));
}

#[tokio::test]
async fn invalid_access_key_aborts() {
    let server = TestServer::new().await;
    let config = AzureConfig {
        access_key: "not base64!".into(),
        ..storage_config(&server)
    };

    let result = benchmark::run(&settings(1), connect(config)).await;

    assert!(matches!(result, Err(BenchmarkError::Connect(_))));
    assert_eq!(server.upload_count(), 0);
}

#[tokio::test]
async fn being_deleted_container_aborts() {
    uploadbench_test::tracing::init();
    let server = TestServer::new().await;
    let seed = 11;
    let container = names::container_name(&mut SmallRng::seed_from_u64(seed), "bench");
    server.mark_being_deleted(&container);

    let settings = BenchmarkSettings {
        seed: Some(seed),
        ..settings(4)
    };
    let result = benchmark::run(&settings, connect(storage_config(&server))).await;

    match &result {
        Err(BenchmarkError::CreateContainer { container: name, .. }) => {
            assert_eq!(name, &container)
        }
        other => panic!("expected container creation to fail, got {other:?}"),
    }
    assert_eq!(server.upload_count(), 0);
    assert!(!server.has_container(&container));
}
