//! In-process API tests against the router.

mod common;

use axum::http::StatusCode;
use common::TestFixture;
use deposit_core::PipelineAction;

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_reflects_loaded_settings() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["supervisor"]["enabled"], false);
    assert_eq!(response.body["pools"][0]["job_type"], "mock");
    assert_eq!(response.body["deposits"]["default_job_type"], "mock");
}

#[tokio::test]
async fn test_status_before_and_after_pass() {
    let fixture = TestFixture::new().await;

    let before = fixture.get("/api/v1/status").await;
    assert_eq!(before.status, StatusCode::OK);
    assert_eq!(before.body["pipeline"]["state"], "active");
    assert_eq!(before.body["running"], false);
    assert_eq!(before.body["passes_ok"], 0);
    assert!(before.body["last_report"].is_null());

    fixture.register("alice");
    fixture.pass().await;

    let after = fixture.get("/api/v1/status").await;
    assert_eq!(after.body["passes_ok"], 1);
    assert_eq!(after.body["passes_failed"], 0);
    assert_eq!(after.body["last_report"]["deposits_examined"], 1);
    assert_eq!(after.body["last_report"]["transitions"], 1);
    assert!(after.body["last_error"].is_null());
}

#[tokio::test]
async fn test_status_shows_quieted_pipeline() {
    let fixture = TestFixture::new().await;

    fixture.request_pipeline(PipelineAction::Quiet);
    let pending = fixture.get("/api/v1/status").await;
    assert_eq!(pending.body["pipeline"]["state"], "active");
    assert_eq!(pending.body["pipeline"]["pending_action"], "quiet");

    fixture.pass().await;

    let response = fixture.get("/api/v1/status").await;
    assert_eq!(response.body["pipeline"]["state"], "quieted");
    assert!(response.body["pipeline"]["pending_action"].is_null());
    assert_eq!(response.body["last_report"]["pipeline_action_applied"], true);
}

#[tokio::test]
async fn test_list_deposits_with_filters() {
    let fixture = TestFixture::new().await;

    fixture.register("alice");
    fixture.register("alice");
    fixture.register("bob");
    fixture.pass().await;
    let late = fixture.register("bob");

    let all = fixture.get("/api/v1/deposits").await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["total"], 4);
    assert_eq!(all.body["deposits"].as_array().unwrap().len(), 4);

    let queued = fixture.get("/api/v1/deposits?state=queued").await;
    assert_eq!(queued.body["total"], 3);

    let unregistered = fixture.get("/api/v1/deposits?state=unregistered").await;
    assert_eq!(unregistered.body["total"], 1);
    assert_eq!(unregistered.body["deposits"][0]["id"], late.as_str());

    let bobs = fixture.get("/api/v1/deposits?submitted_by=bob").await;
    assert_eq!(bobs.body["total"], 2);

    let page = fixture.get("/api/v1/deposits?limit=1&offset=1").await;
    assert_eq!(page.body["total"], 4);
    assert_eq!(page.body["limit"], 1);
    assert_eq!(page.body["offset"], 1);
    assert_eq!(page.body["deposits"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_deposits_rejects_unknown_state() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/deposits?state=bogus").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_get_deposit() {
    let fixture = TestFixture::new().await;
    let id = fixture.register("alice");
    fixture.pass().await;

    let response = fixture.get(&format!("/api/v1/deposits/{}", id)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], id.as_str());
    assert_eq!(response.body["state"], "queued");
    assert_eq!(response.body["job_type"], "mock");
    assert_eq!(response.body["metadata"]["submitted_by"], "alice");
    assert!(response.body["current_job_id"].is_string());
}

#[tokio::test]
async fn test_get_unknown_deposit_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/deposits/missing").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("missing"));
}

#[tokio::test]
async fn test_audit_records_deposit_lifecycle() {
    let fixture = TestFixture::new().await;
    let id = fixture.register("alice");
    fixture.pass().await;

    let response = fixture
        .get_audit(&format!("/api/v1/audit?deposit_id={}", id), 3)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 3);
    let types: Vec<&str> = response.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|event| event["event_type"].as_str())
        .collect();
    assert!(types.contains(&"deposit_registered"));
    assert!(types.contains(&"job_dispatched"));
    assert!(types.contains(&"deposit_state_changed"));
}

#[tokio::test]
async fn test_audit_filters_by_event_type() {
    let fixture = TestFixture::new().await;
    fixture.request_pipeline(PipelineAction::Quiet);
    fixture.pass().await;

    let response = fixture
        .get_audit("/api/v1/audit?event_type=pipeline_state_changed", 1)
        .await;

    assert_eq!(response.body["total"], 1);
    assert_eq!(
        response.body["events"][0]["event_type"],
        "pipeline_state_changed"
    );
}

#[tokio::test]
async fn test_metrics_exposition() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("deposit_pipeline_state"));
    assert!(response.text.contains("deposit_supervisor_running"));
    assert!(response.text.contains("deposits_by_state"));
    assert!(response
        .text
        .contains("path=\"/api/v1/health\""));
}
