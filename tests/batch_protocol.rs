//! End-to-end protocol tests against a mock service endpoint.

use dataverse_batch::{
    Batch, DispatchResult, DispatcherConfig, Error, Operation, RetryPolicy, ServiceClient,
};
use serde_json::json;
use std::time::Duration;

const API_PATH: &str = "/api/data/v9.2";

fn client_for(server: &mockito::ServerGuard) -> ServiceClient {
    ServiceClient::builder(format!("{}{}/", server.url(), API_PATH))
        .with_access_token("test-token")
        .with_retry_policy(RetryPolicy::new().with_max_retries(0))
        .build()
        .unwrap()
}

fn two_part_success_body() -> String {
    [
        "--batchresponse_36f99a46",
        "Content-Type: multipart/mixed; boundary=changesetresponse_5a1e4bcd",
        "",
        "--changesetresponse_5a1e4bcd",
        "Content-Type: application/http",
        "Content-Transfer-Encoding: binary",
        "Content-ID: 1",
        "",
        "HTTP/1.1 204 No Content",
        "OData-Version: 4.0",
        "Location: [Organization URI]/api/data/v9.2/accounts(7eb682f1)",
        "",
        "--changesetresponse_5a1e4bcd",
        "Content-Type: application/http",
        "Content-Transfer-Encoding: binary",
        "Content-ID: 2",
        "",
        "HTTP/1.1 204 No Content",
        "OData-Version: 4.0",
        "Location: [Organization URI]/api/data/v9.2/accounts(a8f21c3e)",
        "",
        "--changesetresponse_5a1e4bcd--",
        "--batchresponse_36f99a46--",
    ]
    .join("\r\n")
}

fn aborted_change_set_body() -> String {
    [
        "--batchresponse_77812fa1",
        "Content-Type: multipart/mixed; boundary=changesetresponse_90cc2e5d",
        "",
        "--changesetresponse_90cc2e5d",
        "Content-Type: application/http",
        "Content-Transfer-Encoding: binary",
        "Content-ID: 2",
        "",
        "HTTP/1.1 412 Precondition Failed",
        "Content-Type: application/json; odata.metadata=minimal",
        "",
        r#"{"error":{"code":"0x80040333","message":"A record with matching key values already exists."}}"#,
        "--changesetresponse_90cc2e5d--",
        "--batchresponse_77812fa1--",
    ]
    .join("\r\n")
}

fn two_creates() -> Vec<Operation> {
    vec![
        Operation::new("POST", "accounts").with_value(json!({ "name": "Contoso" })),
        Operation::new("POST", "accounts").with_value(json!({ "name": "Fabrikam" })),
    ]
}

#[tokio::test]
async fn delivered_batch_carries_parsed_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .match_header(
            "content-type",
            mockito::Matcher::Regex("multipart/mixed;boundary=batch_.*".into()),
        )
        .with_status(200)
        .with_header("content-type", "multipart/mixed; boundary=batchresponse_36f99a46")
        .with_body(two_part_success_body())
        .create_async()
        .await;

    let client = client_for(&server);
    let batch = client.execute_batch(Batch::new(two_creates())).await.unwrap();

    mock.assert_async().await;
    let response = batch.response.unwrap();
    assert!(response.is_successful);
    assert_eq!(response.operations.len(), 2);
    assert_eq!(response.operations[0].content_id, "1");
    assert_eq!(response.operations[1].content_id, "2");
    assert!(response.operations.iter().all(|op| op.is_success()));
    assert_eq!(batch.run_count, 1);
}

#[tokio::test]
async fn aborted_change_set_reports_first_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(200)
        .with_header("content-type", "multipart/mixed; boundary=batchresponse_77812fa1")
        .with_body(aborted_change_set_body())
        .create_async()
        .await;

    let client = client_for(&server);
    let batch = client.execute_batch(Batch::new(two_creates())).await.unwrap();

    let response = batch.response.as_ref().unwrap();
    assert!(!response.is_successful);
    assert_eq!(response.operations.len(), 1);
    let failed = &response.operations[0];
    assert_eq!(failed.content_id, "2");
    assert_eq!(failed.status_code, 412);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.code.as_deref(), Some("0x80040333"));

    // The failing descriptor is correlated back and marked as attempted.
    let attempted = &batch.change_set.operations[1];
    assert_eq!(attempted.content_id.as_deref(), Some("2"));
    assert_eq!(attempted.run_count, 1);
}

#[tokio::test]
async fn fail_on_operation_error_turns_failure_into_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(200)
        .with_header("content-type", "multipart/mixed; boundary=batchresponse_77812fa1")
        .with_body(aborted_change_set_body())
        .create_async()
        .await;

    let client = ServiceClient::builder(format!("{}{}/", server.url(), API_PATH))
        .with_access_token("test-token")
        .with_retry_policy(RetryPolicy::new().with_max_retries(0))
        .with_fail_on_operation_error(true)
        .build()
        .unwrap();

    let err = client
        .execute_batch(Batch::new(two_creates()))
        .await
        .unwrap_err();
    match err {
        Error::Operation(failure) => {
            assert_eq!(failure.status_code, 412);
            assert_eq!(failure.content_id(), "2");
            assert!(failure.batch_id.is_some());
        }
        other => panic!("expected an operation error, got {other}"),
    }
}

#[tokio::test]
async fn batch_with_bodiless_post_never_hits_the_wire() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .execute_batch(Batch::new(vec![
            Operation::new("POST", "accounts").with_value(json!({ "name": "Contoso" })),
            Operation::new("POST", "accounts"),
        ]))
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn throttled_batch_surfaces_flat_fault_and_delay() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_header("Retry-After", "2")
        .with_body(
            r#"{"ErrorCode":-2147015902,"Message":"Number of requests exceeded the limit of 6000 over time window of 300 seconds.","ExceptionType":"FaultException"}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .execute_batch(Batch::new(two_creates()))
        .await
        .unwrap_err();
    match err {
        Error::Throttling { fault, retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(2)));
            assert_eq!(fault.error_code, Some(-2147015902));
            assert!(fault.message.contains("exceeded the limit"));
        }
        other => panic!("expected throttling, got {other}"),
    }
}

#[tokio::test]
async fn retry_after_without_429_still_means_throttled() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(200)
        .with_header("Retry-After", "5")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .execute_batch(Batch::new(two_creates()))
        .await
        .unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
}

#[tokio::test]
async fn unexpected_media_type_is_a_parse_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .execute_batch(Batch::new(two_creates()))
        .await
        .unwrap_err();
    match err {
        Error::Parse { message } => assert!(message.contains("multipart/mixed")),
        other => panic!("expected a parse error, got {other}"),
    }
}

#[tokio::test]
async fn failing_status_with_empty_body_is_a_batch_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(400)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .execute_batch(Batch::new(two_creates()))
        .await
        .unwrap_err();
    match err {
        Error::Batch(failure) => {
            assert!(failure.message.starts_with("400"));
            assert_eq!(failure.batch.change_set.len(), 2);
        }
        other => panic!("expected a batch error, got {other}"),
    }
}

#[tokio::test]
async fn server_fault_is_resent_until_retries_run_out() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("{API_PATH}/$batch").as_str())
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let client = ServiceClient::builder(format!("{}{}/", server.url(), API_PATH))
        .with_access_token("test-token")
        .with_retry_policy(
            RetryPolicy::new()
                .with_max_retries(1)
                .with_base_delay(Duration::from_millis(10)),
        )
        .build()
        .unwrap();

    let err = client
        .execute_batch(Batch::new(two_creates()))
        .await
        .unwrap_err();
    mock.assert_async().await;
    assert!(matches!(err, Error::Batch(_)));
}

#[tokio::test]
async fn single_operation_returns_content_and_headers() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("{API_PATH}/accounts").as_str())
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"value":[{"name":"Contoso"}]}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let mut operation = Operation::new("GET", "accounts");
    let response = client.execute(&mut operation).await.unwrap();

    assert_eq!(response.status_code, 200);
    assert!(response.content.as_deref().unwrap().contains("Contoso"));
    assert!(response.error.is_none());
}

#[tokio::test]
async fn single_operation_failure_carries_the_descriptor() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", format!("{API_PATH}/accounts(7eb682f1)").as_str())
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"code":"0x80040217","message":"account With Id = 7eb682f1 Does Not Exist"}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let mut operation = Operation::new("DELETE", "accounts(7eb682f1)");
    let err = client.execute(&mut operation).await.unwrap_err();

    match err {
        Error::Operation(failure) => {
            assert_eq!(failure.status_code, 404);
            let detail = failure.error.as_ref().unwrap();
            assert_eq!(detail.code.as_deref(), Some("0x80040217"));
        }
        other => panic!("expected an operation error, got {other}"),
    }
    assert_eq!(operation.run_count, 1);
}

#[tokio::test]
async fn unbatched_dispatch_sends_each_operation() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", format!("{API_PATH}/accounts").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"value":[]}"#)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server);
    let mut dispatcher = client.dispatcher(DispatcherConfig::new().with_max_in_flight(2));
    for _ in 0..3 {
        dispatcher
            .push(Operation::new("GET", "accounts"))
            .await
            .unwrap();
    }
    let summary = dispatcher.finish().await.unwrap();

    mock.assert_async().await;
    assert_eq!(summary.operations_sent, 3);
    assert_eq!(summary.batches_sent, 0);
    assert_eq!(summary.failures, 0);
    assert!(summary
        .outcomes
        .iter()
        .all(|o| matches!(o, Ok(DispatchResult::Operation(_)))));
}
