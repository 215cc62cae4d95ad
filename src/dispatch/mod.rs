//! Concurrent batch dispatch.
//!
//! [`Dispatcher`] accepts operations one at a time, folds them into
//! batches, and sends the batches through a [`BatchSender`] with a
//! bounded number of in-flight requests. With a batch size of zero it
//! skips batching entirely and sends each operation on its own.
//!
//! Completions are drained in completion order, not submission order,
//! so one slow batch never stalls the pipeline.

use crate::config::DispatcherConfig;
use crate::execute::{BatchSender, OperationProcessor};
use crate::model::{chunk_operations, Batch, Operation, OperationResponse};
use crate::{Error, Result};
use flate2::Compression;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One completed unit of work.
#[derive(Debug)]
pub enum DispatchResult {
    /// A delivered batch with its parsed response installed.
    Batch(Batch),
    /// A single operation sent unbatched.
    Operation(OperationResponse),
}

/// What a full dispatch run produced.
#[derive(Debug)]
pub struct DispatchSummary {
    pub elapsed: Duration,
    pub batches_sent: usize,
    pub operations_sent: usize,
    pub failures: usize,
    /// Per-unit outcomes in completion order.
    pub outcomes: Vec<Result<DispatchResult>>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    sender: Arc<dyn BatchSender>,
    operations: Arc<OperationProcessor>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    tasks: JoinSet<Result<DispatchResult>>,
    pending: Vec<Operation>,
    outcomes: Vec<Result<DispatchResult>>,
    batches_sent: usize,
    operations_sent: usize,
    started: Instant,
}

impl Dispatcher {
    pub fn new(
        sender: Arc<dyn BatchSender>,
        operations: Arc<OperationProcessor>,
        config: DispatcherConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
        Dispatcher {
            config,
            sender,
            operations,
            semaphore,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            pending: Vec::new(),
            outcomes: Vec::new(),
            batches_sent: 0,
            operations_sent: 0,
            started: Instant::now(),
        }
    }

    /// Replace the cancellation token, usually with a child of an
    /// application-wide one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts in-flight and future sends when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue one operation, sending a batch once enough have accumulated.
    ///
    /// When the number of outstanding sends reaches the in-flight cap
    /// this awaits completions before returning, so callers pushing from
    /// a tight loop apply backpressure instead of queueing unboundedly.
    pub async fn push(&mut self, operation: Operation) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        // Admission check: a bad descriptor is rejected here, never
        // buffered or handed to the sender.
        operation.validate()?;

        if self.config.batch_size == 0 {
            self.spawn_operation(operation);
        } else {
            self.pending.push(operation);
            if self.pending.len() >= self.config.batch_size {
                let operations = std::mem::take(&mut self.pending);
                self.spawn_batches(operations)?;
            }
        }

        while self.tasks.len() >= self.config.max_in_flight {
            self.drain_one().await;
        }
        Ok(())
    }

    /// Flush the partial batch, await every outstanding send, and report.
    pub async fn finish(mut self) -> Result<DispatchSummary> {
        if !self.pending.is_empty() {
            let operations = std::mem::take(&mut self.pending);
            self.spawn_batches(operations)?;
        }
        while !self.tasks.is_empty() {
            self.drain_one().await;
        }

        let failures = self.outcomes.iter().filter(|o| o.is_err()).count();
        let summary = DispatchSummary {
            elapsed: self.started.elapsed(),
            batches_sent: self.batches_sent,
            operations_sent: self.operations_sent,
            failures,
            outcomes: self.outcomes,
        };
        info!(
            elapsed_ms = summary.elapsed.as_millis() as u64,
            batches = summary.batches_sent,
            operations = summary.operations_sent,
            failures = summary.failures,
            "dispatch complete"
        );
        Ok(summary)
    }

    fn spawn_batches(&mut self, operations: Vec<Operation>) -> Result<()> {
        let chunks = match self.config.max_chunk_bytes {
            Some(max_bytes) => chunk_operations(operations, max_bytes, Compression::default())?,
            None => vec![operations],
        };
        for chunk in chunks {
            if chunk.is_empty() {
                continue;
            }
            self.operations_sent += chunk.len();
            self.batches_sent += 1;
            let batch = Batch::new(chunk);
            debug!(batch_id = %batch.id, operations = batch.change_set.len(), "queueing batch");
            let sender = Arc::clone(&self.sender);
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => {
                        permit.map_err(|_| Error::Cancelled)?
                    }
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                };
                tokio::select! {
                    result = sender.send(batch) => result.map(DispatchResult::Batch),
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                }
            });
        }
        Ok(())
    }

    fn spawn_operation(&mut self, operation: Operation) {
        self.operations_sent += 1;
        let processor = Arc::clone(&self.operations);
        let semaphore = Arc::clone(&self.semaphore);
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|_| Error::Cancelled)?
                }
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };
            let mut operation = operation;
            tokio::select! {
                result = processor.execute(&mut operation) => {
                    result.map(DispatchResult::Operation)
                }
                _ = cancel.cancelled() => Err(Error::Cancelled),
            }
        });
    }

    async fn drain_one(&mut self) {
        match self.tasks.join_next().await {
            Some(Ok(outcome)) => self.outcomes.push(outcome),
            Some(Err(join_error)) => {
                if join_error.is_panic() {
                    std::panic::resume_unwind(join_error.into_panic());
                }
                self.outcomes.push(Err(Error::Cancelled));
            }
            None => {}
        }
    }
}
