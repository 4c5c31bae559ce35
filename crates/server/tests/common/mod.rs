//! In-process test fixture for the HTTP surface.
//!
//! Builds the router over on-disk SQLite stores in a temp dir. The
//! supervisor's timer is disabled and its pools are never started, so
//! tests drive reconciliation by hand through `pass()`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use deposit_core::{
    create_audit_system, testing::MockJob, AuditStore, Config, DatabaseConfig,
    DepositHandler, DepositMetadata, DepositsConfig, JobFactory, OperatorControl, PipelineAction,
    PipelineSupervisor, PoolConfig, SqliteAuditStore, SqliteStatusStore, SqliteWorkQueue,
    StatusStore, SupervisorConfig, WorkQueue,
};
use deposit_server::api::create_router;
use deposit_server::state::AppState;

pub struct TestFixture {
    pub router: Router,
    pub supervisor: Arc<PipelineSupervisor>,
    pub store: Arc<dyn StatusStore>,
    pub handler: DepositHandler,
    pub control: OperatorControl,
    _temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("deposits.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            supervisor: SupervisorConfig {
                enabled: false,
                ..Default::default()
            },
            pools: vec![PoolConfig::new("mock")],
            deposits: DepositsConfig {
                default_job_type: "mock".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let store: Arc<dyn StatusStore> = Arc::new(
            SqliteStatusStore::new(&db_path).expect("Failed to create status store"),
        );
        let queue: Arc<dyn WorkQueue> =
            Arc::new(SqliteWorkQueue::new(&db_path).expect("Failed to create queue"));
        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );

        let (audit, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let factory = Arc::new(
            JobFactory::new(Arc::clone(&store))
                .with_job("mock", |d, _| Box::new(MockJob::succeeding(d))),
        );
        let supervisor = Arc::new(PipelineSupervisor::new(
            config.supervisor.clone(),
            factory,
            queue,
            &config.pools,
            Some(audit.clone()),
        ));

        let handler = DepositHandler::new(
            Arc::clone(&store),
            config.deposits.clone(),
            Some(audit.clone()),
        );
        let control = OperatorControl::new(Arc::clone(&store), Some(audit.clone()));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&supervisor),
            audit_store,
        ));

        Self {
            router: create_router(state),
            supervisor,
            store,
            handler,
            control,
            _temp_dir: temp_dir,
        }
    }

    /// Register a deposit under the default job type.
    pub fn register(&self, submitted_by: &str) -> String {
        self.handler
            .register("collections/test", DepositMetadata::new(submitted_by, "simple"))
            .expect("Failed to register deposit")
    }

    pub fn request_pipeline(&self, action: PipelineAction) {
        self.control
            .request_pipeline_action(action, "operator")
            .expect("Failed to request pipeline action");
    }

    /// Run one reconciliation pass.
    pub async fn pass(&self) {
        self.supervisor.run_once().await.expect("pass failed");
    }

    /// Poll an audit query until it reports at least `min_total` events.
    ///
    /// Audit events are persisted by a background writer.
    pub async fn get_audit(&self, path: &str, min_total: i64) -> TestResponse {
        let mut response = self.get(path).await;
        for _ in 0..100 {
            if response.body["total"].as_i64().unwrap_or(0) >= min_total {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            response = self.get(path).await;
        }
        response
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
