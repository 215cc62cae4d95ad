use super::RetryPolicy;
use crate::auth::TokenSource;
use crate::model::{Operation, OperationError, OperationResponse};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes single operations outside of any batch.
pub struct OperationProcessor {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenSource>,
    retry: RetryPolicy,
}

impl OperationProcessor {
    pub fn new(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenSource>,
        retry: RetryPolicy,
    ) -> Self {
        OperationProcessor {
            transport,
            tokens,
            retry,
        }
    }

    /// Send one operation under the retry policy.
    ///
    /// On a failing status the operation's `run_count` is incremented and
    /// an [`Error::Operation`] carrying the descriptor and the extracted
    /// error detail is returned.
    pub async fn execute(&self, operation: &mut Operation) -> Result<OperationResponse> {
        operation.validate()?;
        debug!(method = %operation.method, uri = %operation.uri, "executing operation");

        let bearer = self.tokens.token().await?;
        let transport = self.transport.as_ref();
        let op_ref: &Operation = operation;
        let bearer_ref: &str = &bearer;
        let response = self
            .retry
            .run(move || transport.send_operation(op_ref, bearer_ref))
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "service responded");

        if status.is_success() {
            return Self::success_response(operation, response).await;
        }

        let retry_after = RetryPolicy::retry_after(response.headers());
        let media_type = media_type(&response);
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let content = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 || retry_after.is_some() {
            let mut fault = super::parse_fault(&media_type, &content)
                .unwrap_or_else(|| {
                    crate::model::ServiceFault::from_status(status.as_u16(), &reason, &content)
                });
            fault.retry_after = retry_after;
            return Err(Error::Throttling { fault, retry_after });
        }

        let error = extract_error(status.as_u16(), &reason, &media_type, &content);
        warn!(operation = %operation, "operation failed");
        operation.run_count += 1;
        Err(Error::operation(
            None,
            operation.clone(),
            Some(error),
            status.as_u16(),
        ))
    }

    async fn success_response(
        operation: &Operation,
        response: reqwest::Response,
    ) -> Result<OperationResponse> {
        let status = response.status().as_u16();
        let headers = header_map(&response);
        let content = if status == 200 {
            let text = response.text().await?;
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        } else {
            None
        };
        Ok(OperationResponse {
            content_id: operation.content_id.clone().unwrap_or_default(),
            status_code: status,
            content,
            error: None,
            headers,
        })
    }
}

pub(super) fn media_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
}

pub(super) fn header_map(response: &reqwest::Response) -> Option<HashMap<String, String>> {
    let mut headers = HashMap::new();
    for (key, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(key.to_string())
                .and_modify(|existing: &mut String| {
                    existing.push(',');
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }
    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}

/// Extract error detail from a failing single-operation response: the
/// nested `error` object when the body is JSON, the flat shape as a
/// fallback, and as a last resort the status code and reason phrase.
fn extract_error(
    status: u16,
    reason: &str,
    media_type: &Option<String>,
    content: &str,
) -> OperationError {
    if !content.is_empty() && media_type.as_deref() == Some("application/json") {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(content) {
            if let Some(error) = json.get("error") {
                if let Ok(parsed) = serde_json::from_value::<OperationError>(error.clone()) {
                    return parsed;
                }
            }
            return OperationError {
                code: json.get("ErrorCode").map(value_to_string),
                message: json
                    .get("Message")
                    .map(value_to_string)
                    .unwrap_or_default(),
                error_type: json.get("ExceptionType").map(value_to_string),
                stack_trace: json.get("StackTrace").map(value_to_string),
                inner_error: None,
            };
        }
    }
    OperationError {
        code: Some(status.to_string()),
        message: if content.trim().is_empty() {
            reason.to_string()
        } else {
            content.to_string()
        },
        error_type: None,
        stack_trace: None,
        inner_error: None,
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
