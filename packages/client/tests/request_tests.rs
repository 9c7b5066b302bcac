#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use client::{FailureCause, Method, RequestClient, RequestError};
use jobs_core::{ApiResponse, Job, JobStatus, RetryConfig, ServiceError};

use common::{ScriptedHttp, assert_gap};

fn client(http: &Arc<ScriptedHttp>, max_retries: u32) -> RequestClient {
    let retry = RetryConfig::new(max_retries, Duration::from_millis(1000), 2);
    RequestClient::with_transport("https://jobs.test/", retry, http.clone())
}

const JOBS_BODY: &str = r#"[
    {"jobID":"a","name":"Data Export 12","status":2,"priority":1,"progress":35.6,
     "createdAt":1700000000000,"startedAt":1700000001000,"completedAt":0,"errorMessage":null},
    {"jobID":"b","name":"Backup 7","status":0,"priority":0,"progress":0,
     "createdAt":1700000002000,"startedAt":0,"completedAt":0}
]"#;

#[tokio::test(start_paused = true)]
async fn first_success_is_returned_without_retries() -> Result<(), Box<dyn Error>> {
    let http = ScriptedHttp::new();
    http.respond(200, JOBS_BODY);

    let jobs: Vec<Job> = client(&http, 3).call_json(Method::Get, "/Jobs", None).await?;

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[0].progress, 35);
    let sent = http.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "https://jobs.test/Jobs");
    assert_eq!(sent[0].method, Method::Get);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_succeed() -> Result<(), Box<dyn Error>> {
    let http = ScriptedHttp::new();
    http.fail("connection reset");
    http.respond(503, "");
    http.respond(200, r#"{"isSuccess":true,"message":"Job stopped"}"#);

    let response: ApiResponse = client(&http, 3)
        .call_json(Method::Post, "/Jobs/a/stop", None)
        .await?;

    assert_eq!(response, ApiResponse::success("Job stopped"));
    let sent = http.sent();
    assert_eq!(sent.len(), 3);
    assert_gap(sent[0].at, sent[1].at, 1000);
    assert_gap(sent[1].at, sent[2].at, 2000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_the_retry_budget() -> Result<(), Box<dyn Error>> {
    let http = ScriptedHttp::new();
    for _ in 0..10 {
        http.respond(503, "");
    }

    let result: Result<Vec<Job>, RequestError> =
        client(&http, 3).call_json(Method::Get, "/Jobs", None).await;

    let error = result.unwrap_err();
    assert_eq!(error.attempts, 4);
    assert_eq!(error.path, "/Jobs");
    assert!(matches!(
        error.cause,
        FailureCause::Status { code: 503, .. }
    ));
    assert_eq!(http.sent().len(), 4);

    let sent = http.sent();
    assert_gap(sent[2].at, sent[3].at, 4000);

    let service_error = ServiceError::from(error);
    assert!(matches!(service_error, ServiceError::Request { attempts: 4, .. }));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_a_single_attempt() -> Result<(), Box<dyn Error>> {
    let http = ScriptedHttp::new();
    http.fail("dns failure");

    let error = client(&http, 0)
        .call_empty(Method::Delete, "/Jobs/a", None)
        .await
        .unwrap_err();

    assert_eq!(error.attempts, 1);
    assert_eq!(error.cause, FailureCause::Transport("dns failure".into()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_payload_counts_as_a_failure_for_json_calls() -> Result<(), Box<dyn Error>> {
    let http = ScriptedHttp::new();
    http.respond(204, "");
    http.respond(200, "not json");
    http.respond(200, r#"{"isSuccess":false,"message":"Job not found"}"#);

    let response: ApiResponse = client(&http, 3)
        .call_json(Method::Post, "/Jobs/zzz/restart", None)
        .await?;

    assert!(!response.is_success);
    assert_eq!(http.sent().len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_calls_accept_no_content() -> Result<(), Box<dyn Error>> {
    let http = ScriptedHttp::new();
    http.respond(204, "");

    client(&http, 3)
        .call_empty(Method::Delete, "/Jobs/status/4", None)
        .await?;

    assert_eq!(http.sent().len(), 1);
    assert_eq!(http.sent()[0].method, Method::Delete);
    Ok(())
}
