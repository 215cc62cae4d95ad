use super::operation::media_type;
use super::RetryPolicy;
use crate::auth::TokenSource;
use crate::model::{Batch, BatchResponse, ServiceFault};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The seam the dispatcher sends batches through.
#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Send one batch and return it with its response installed.
    async fn send(&self, batch: Batch) -> Result<Batch>;
}

/// Executes whole batches against the `$batch` endpoint.
pub struct BatchProcessor {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenSource>,
    retry: RetryPolicy,
    fail_on_operation_error: bool,
}

impl BatchProcessor {
    pub fn new(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenSource>,
        retry: RetryPolicy,
    ) -> Self {
        BatchProcessor {
            transport,
            tokens,
            retry,
            fail_on_operation_error: false,
        }
    }

    /// When set, a failed operation inside an otherwise-delivered batch
    /// becomes an [`Error::Operation`] instead of a partially-failed
    /// response handed back to the caller.
    pub fn with_fail_on_operation_error(mut self, fail: bool) -> Self {
        self.fail_on_operation_error = fail;
        self
    }

    /// Send the batch under the retry policy and decode its response.
    ///
    /// The returned batch carries the parsed [`BatchResponse`], including
    /// the partial-failure case. Transport and protocol level failures
    /// come back as errors carrying the batch instead.
    pub async fn execute(&self, mut batch: Batch) -> Result<Batch> {
        for operation in &batch.change_set.operations {
            operation.validate()?;
        }
        debug!(batch_id = %batch.id, operations = batch.change_set.len(), "executing batch");
        batch.run_count += 1;

        let bearer = self.tokens.token().await?;
        let transport = self.transport.as_ref();
        let batch_ref: &Batch = &batch;
        let bearer_ref: &str = &bearer;
        let response = self
            .retry
            .run(move || transport.send_batch(batch_ref, bearer_ref))
            .await?;

        let status = response.status();
        debug!(batch_id = %batch.id, status = status.as_u16(), "service responded");

        let retry_after = RetryPolicy::retry_after(response.headers());
        let media = media_type(&response);
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let content = response.text().await.unwrap_or_default();

        // Throttling outranks every other classification: 429, or any
        // Retry-After header regardless of status.
        if status.as_u16() == 429 || retry_after.is_some() {
            let mut fault = super::parse_fault(&media, &content).unwrap_or_else(|| {
                ServiceFault::from_status(status.as_u16(), &reason, &content)
            });
            fault.retry_after = retry_after;
            return Err(Error::Throttling { fault, retry_after });
        }

        if media.as_deref().is_some_and(|m| m != "multipart/mixed") {
            return Err(Error::parse(format!(
                "Unsupported response media type received from the service. \
                 Expected: multipart/mixed, Actual: {}",
                media.as_deref().unwrap_or("")
            )));
        }

        if !status.is_success() && content.is_empty() {
            return Err(Error::batch(
                format!("{} {}", status.as_u16(), reason),
                batch,
            ));
        }

        let batch_response = match BatchResponse::parse(&content) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(batch_id = %batch.id, %error, "unparseable batch response");
                return Err(error);
            }
        };

        if batch_response.is_successful {
            debug!(batch_id = %batch.id, "batch succeeded");
            batch.response = Some(batch_response);
            return Ok(batch);
        }

        // A failed change set reports exactly one result: the first (and
        // only) failing operation. Correlate it back to its descriptor.
        let failed = &batch_response.operations[0];
        let failed_status = failed.status_code;
        let failed_error = failed.error.clone();
        let failed_op = batch
            .change_set
            .operations
            .iter_mut()
            .find(|op| op.content_id.as_deref() == Some(failed.content_id.as_str()));
        let failed_op = match failed_op {
            Some(op) => {
                warn!(operation = %op, "failed operation");
                op.run_count += 1;
                op.clone()
            }
            None => {
                return Err(Error::parse(format!(
                    "Batch response reported a failure for unknown Content-ID \"{}\".",
                    failed.content_id
                )))
            }
        };

        if self.fail_on_operation_error {
            Err(Error::operation(
                Some(batch.id),
                failed_op,
                failed_error,
                failed_status,
            ))
        } else {
            batch.response = Some(batch_response);
            Ok(batch)
        }
    }
}

#[async_trait]
impl BatchSender for BatchProcessor {
    async fn send(&self, batch: Batch) -> Result<Batch> {
        self.execute(batch).await
    }
}
