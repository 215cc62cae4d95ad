//! # dataverse-batch
//!
//! Client-side engine for OData-style Web APIs with batched, transactional
//! multipart submission.
//!
//! ## Overview
//!
//! This library turns streams of data operations into `$batch` requests:
//! it encodes change sets into the multipart/mixed wire format, parses the
//! multipart responses the service sends back (including the
//! first-failure-only shape of a failed change set), retries transient and
//! throttled requests with server-suggested delays, and dispatches many
//! batches concurrently under a bounded in-flight cap.
//!
//! ## Key Features
//!
//! - **Batch Codec**: [`Batch`] and [`ChangeSet`] encode operations into
//!   the multipart/mixed `$batch` body; [`BatchResponse`] parses the reply
//! - **Throttle-Aware Retry**: [`RetryPolicy`](execute::RetryPolicy) backs
//!   off exponentially and honors `Retry-After`
//! - **Concurrent Dispatch**: [`Dispatcher`](dispatch::Dispatcher) folds
//!   operations into batches and keeps a bounded number in flight
//! - **Size-Bounded Chunking**: [`chunk_operations`](model::chunk_operations)
//!   splits oversized payloads by measured compressed size
//! - **Pluggable Auth**: an [`Authenticator`](auth::Authenticator) chain
//!   with cached token refresh
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dataverse_batch::{Operation, ServiceClient};
//!
//! #[tokio::main]
//! async fn main() -> dataverse_batch::Result<()> {
//!     let client = ServiceClient::builder("https://org.crm.dynamics.com/api/data/v9.2")
//!         .with_access_token("your-bearer-token")
//!         .build()?;
//!
//!     let mut operation = Operation::new("POST", "accounts")
//!         .with_value(serde_json::json!({ "name": "Contoso" }));
//!     let response = client.execute(&mut operation).await?;
//!     println!("created: {:?}", response.headers);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`model`] | Operations, change sets, batches, and the multipart codec |
//! | [`auth`] | Authentication strategies and token caching |
//! | [`transport`] | HTTP transport over the service endpoint |
//! | [`execute`] | Single-operation and batch executors with retry |
//! | [`dispatch`] | Concurrent batch dispatcher |
//! | [`client`] | High-level client and builder |
//! | [`config`] | Service and dispatcher configuration |

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod execute;
pub mod model;
pub mod transport;

// Re-export main types for convenience
pub use client::{ServiceClient, ServiceClientBuilder};
pub use config::{DispatcherConfig, ServiceConfig};
pub use dispatch::{DispatchResult, DispatchSummary, Dispatcher};
pub use execute::{BatchSender, RetryPolicy};
pub use model::{
    chunk_operations, Batch, BatchResponse, ChangeSet, Operation, OperationError,
    OperationResponse, OperationValue, ServiceFault,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, OperationFailure};
