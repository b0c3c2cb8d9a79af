//! End-to-end scenarios: admission, replay, bad signature, rate limiting,
//! missing bank statement, parser failure, webhook retry exhaustion, and
//! concurrent polling. Exercises the full router via
//! `tower::ServiceExt::oneshot`, grounded in the teacher's
//! `operator_api.rs` test style (`axum::http::Request` + `http_body_util::BodyExt`).

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use wiremock::matchers::{header_exists, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{
    FailingParser, build_harness, build_harness_with_parser, canonical_body,
    canonical_body_with_statement, signature_header, test_tenant,
};

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s1_happy_path_succeeds_and_delivers_webhook(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_exists("X-Softmax-Signature"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback_server)
        .await;

    let body = canonical_body("BANK-001", &callback_server.uri(), "tn_acme");
    let signature = signature_header("ts", &body);

    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(admission["status"], "queued");
    let job_id = admission["job_id"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("uwo_"));

    harness.worker.process(&job_id).await;

    let token = harness
        .state
        .token_issuer
        .issue("tn_acme", "underwrite:read")
        .unwrap()
        .0;
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::get(format!("/v1/jobs/{job_id}"))
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let job: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(job["data"]["status"], "succeeded");
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s2_replay_returns_same_job_and_does_not_duplicate(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let body = canonical_body("BANK-001", "https://cb.test/uw", "tn_acme");
    let signature = signature_header("ts", &body);

    let send = |harness_state: std::sync::Arc<underwriting_http_api::AppState>, body: Vec<u8>, sig: String| async move {
        underwriting_http_api::build_router(harness_state)
            .oneshot(
                Request::post("/v1/underwrite")
                    .header("X-Api-Key", "test-api-key")
                    .header("X-Signature", sig)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    };

    let first = send(harness.state.clone(), body.clone(), signature.clone()).await;
    let first_bytes = first.into_body().collect().await.unwrap().to_bytes();
    let first_admission: serde_json::Value = serde_json::from_slice(&first_bytes).unwrap();

    let second = send(harness.state.clone(), body.clone(), signature).await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    let second_bytes = second.into_body().collect().await.unwrap().to_bytes();
    let second_admission: serde_json::Value = serde_json::from_slice(&second_bytes).unwrap();

    assert_eq!(first_admission["job_id"], second_admission["job_id"]);

    let jobs = harness
        .state
        .db
        .list_jobs_for_tenant("tn_acme", None, 10)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s3_bad_signature_is_rejected_and_creates_no_job(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let mut body = canonical_body("BANK-001", "https://cb.test/uw", "tn_acme");
    let signature = signature_header("ts", &body);
    *body.last_mut().unwrap() ^= 0xFF;

    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let jobs = harness
        .state
        .db
        .list_jobs_for_tenant("tn_acme", None, 10)
        .await
        .unwrap();
    assert!(jobs.is_empty());
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s4_third_request_within_window_is_rate_limited(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 2))
        .await
        .unwrap();

    let mut statuses = Vec::new();
    for i in 0..3 {
        let body = canonical_body(&format!("BANK-{i}"), "https://cb.test/uw", "tn_acme");
        let signature = signature_header("ts", &body);
        let router = underwriting_http_api::build_router(harness.state.clone());
        let response = router
            .oneshot(
                Request::post("/v1/underwrite")
                    .header("X-Api-Key", "test-api-key")
                    .header("X-Signature", signature)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses[0], StatusCode::ACCEPTED);
    assert_eq!(statuses[1], StatusCode::ACCEPTED);
    assert_eq!(statuses[2], StatusCode::TOO_MANY_REQUESTS);
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s5_missing_bank_statement_still_succeeds(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback_server)
        .await;

    let body = canonical_body_with_statement("BANK-001", &callback_server.uri(), "tn_acme", None);
    let signature = signature_header("ts", &body);

    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let job_id = admission["job_id"].as_str().unwrap().to_string();

    harness.worker.process(&job_id).await;

    let job = harness
        .state
        .db
        .get_job_for_tenant("tn_acme", &job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "succeeded");
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s6_parser_failure_is_non_fatal(pool: sqlx::PgPool) {
    let harness = build_harness_with_parser(pool, Arc::new(FailingParser));
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let statement_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-not-really".to_vec()))
        .mount(&statement_server)
        .await;

    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback_server)
        .await;

    let body = canonical_body_with_statement(
        "BANK-001",
        &callback_server.uri(),
        "tn_acme",
        Some(&statement_server.uri()),
    );
    let signature = signature_header("ts", &body);

    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let job_id = admission["job_id"].as_str().unwrap().to_string();

    harness.worker.process(&job_id).await;

    let job = harness
        .state
        .db
        .get_job_for_tenant("tn_acme", &job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "succeeded");
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s7_webhook_retry_exhaustion_is_recorded_but_job_still_succeeds(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&callback_server)
        .await;

    let body = canonical_body("BANK-001", &callback_server.uri(), "tn_acme");
    let signature = signature_header("ts", &body);

    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let job_id = admission["job_id"].as_str().unwrap().to_string();

    harness.worker.process(&job_id).await;

    let job = harness
        .state
        .db
        .get_job_for_tenant("tn_acme", &job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "succeeded");
    assert_eq!(
        harness
            .state
            .metrics
            .webhook_failures_total
            .with_label_values(&["tn_acme"])
            .get(),
        1
    );
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn s8_concurrent_pull_never_delivers_the_same_job_twice(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    for i in 0..2 {
        let body = canonical_body(&format!("BANK-{i}"), "https://cb.test/uw", "tn_acme");
        let signature = signature_header("ts", &body);
        let router = underwriting_http_api::build_router(harness.state.clone());
        router
            .oneshot(
                Request::post("/v1/underwrite")
                    .header("X-Api-Key", "test-api-key")
                    .header("X-Signature", signature)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    let token = harness
        .state
        .token_issuer
        .issue("tn_acme", "underwrite:read")
        .unwrap()
        .0;

    let pull = |state: Arc<underwriting_http_api::AppState>, token: String| async move {
        underwriting_http_api::build_router(state)
            .oneshot(
                Request::post("/v1/jobs/pull")
                    .header("Authorization", format!("Bearer {token}"))
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_vec(&serde_json::json!({"max_jobs": 1})).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap()
    };

    let (first, second) = tokio::join!(
        pull(harness.state.clone(), token.clone()),
        pull(harness.state.clone(), token.clone())
    );

    let first_bytes = first.into_body().collect().await.unwrap().to_bytes();
    let second_bytes = second.into_body().collect().await.unwrap().to_bytes();
    let first_jobs: serde_json::Value = serde_json::from_slice(&first_bytes).unwrap();
    let second_jobs: serde_json::Value = serde_json::from_slice(&second_bytes).unwrap();

    let first_id = first_jobs[0]["job_id"].as_str().unwrap().to_string();
    let second_id = second_jobs[0]["job_id"].as_str().unwrap().to_string();
    assert_ne!(first_id, second_id);
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn idempotency_key_header_dedups_regardless_of_body_content(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let first_body = canonical_body("BANK-001", "https://cb.test/uw", "tn_acme");
    let second_body = canonical_body("BANK-002", "https://cb.test/uw-different", "tn_acme");

    let send = |state: Arc<underwriting_http_api::AppState>, body: Vec<u8>| async move {
        let signature = signature_header("ts", &body);
        underwriting_http_api::build_router(state)
            .oneshot(
                Request::post("/v1/underwrite")
                    .header("X-Api-Key", "test-api-key")
                    .header("X-Signature", signature)
                    .header("X-Idempotency-Key", "fixed-key-1")
                    .header("Content-Type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    };

    let first = send(harness.state.clone(), first_body).await;
    let first_bytes = first.into_body().collect().await.unwrap().to_bytes();
    let first_admission: serde_json::Value = serde_json::from_slice(&first_bytes).unwrap();

    let second = send(harness.state.clone(), second_body).await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    let second_bytes = second.into_body().collect().await.unwrap().to_bytes();
    let second_admission: serde_json::Value = serde_json::from_slice(&second_bytes).unwrap();

    assert_eq!(first_admission["job_id"], second_admission["job_id"]);

    let jobs = harness
        .state
        .db
        .list_jobs_for_tenant("tn_acme", None, 10)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn cross_tenant_job_lookup_is_not_found_not_forbidden(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_other", 100))
        .await
        .unwrap();

    let body = canonical_body("BANK-001", "https://cb.test/uw", "tn_acme");
    let signature = signature_header("ts", &body);
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let job_id = admission["job_id"].as_str().unwrap().to_string();

    let other_token = harness
        .state
        .token_issuer
        .issue("tn_other", "underwrite:read")
        .unwrap()
        .0;
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::get(format!("/v1/jobs/{job_id}"))
                .header("Authorization", format!("Bearer {other_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn read_only_scope_cannot_submit_underwrite_requests(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let read_only_token = harness
        .state
        .token_issuer
        .issue("tn_acme", "underwrite:read")
        .unwrap()
        .0;

    let body = canonical_body("BANK-001", "https://cb.test/uw", "tn_acme");
    let signature = signature_header("ts", &body);
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("Authorization", format!("Bearer {read_only_token}"))
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let jobs = harness
        .state
        .db
        .list_jobs_for_tenant("tn_acme", None, 10)
        .await
        .unwrap();
    assert!(jobs.is_empty());
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn reprocessing_an_already_terminal_job_is_a_no_op(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&callback_server)
        .await;

    let body = canonical_body("BANK-001", &callback_server.uri(), "tn_acme");
    let signature = signature_header("ts", &body);
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let job_id = admission["job_id"].as_str().unwrap().to_string();

    harness.worker.process(&job_id).await;
    harness.worker.process(&job_id).await;

    let job = harness
        .state
        .db
        .get_job_for_tenant("tn_acme", &job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "succeeded");
}

#[sqlx::test(migrations = "../underwriting-core/migrations")]
async fn tenant_dashboard_detail_redacts_llm_input_but_admin_detail_does_not(pool: sqlx::PgPool) {
    let harness = build_harness(pool);
    harness
        .state
        .db
        .upsert_tenant(&test_tenant("tn_acme", 100))
        .await
        .unwrap();

    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback_server)
        .await;

    let body = canonical_body("BANK-001", &callback_server.uri(), "tn_acme");
    let signature = signature_header("ts", &body);
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::post("/v1/underwrite")
                .header("X-Api-Key", "test-api-key")
                .header("X-Signature", signature)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let admission: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let job_id = admission["job_id"].as_str().unwrap().to_string();
    harness.worker.process(&job_id).await;

    let tenant_token = harness
        .state
        .token_issuer
        .issue("tn_acme", "dashboard:read")
        .unwrap()
        .0;
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::get(format!("/v1/dashboard/tenant/jobs/{job_id}"))
                .header("Authorization", format!("Bearer {tenant_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let detail: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(detail.get("llm_input").is_none());

    let admin_token = harness
        .state
        .token_issuer
        .issue("tn_acme", "dashboard:admin")
        .unwrap()
        .0;
    let router = underwriting_http_api::build_router(harness.state.clone());
    let response = router
        .oneshot(
            Request::get(format!("/v1/dashboard/admin/jobs/{job_id}"))
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let detail: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(detail.get("llm_input").is_some());
}
