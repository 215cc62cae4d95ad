//! Request execution against the service.
//!
//! Two processors sit on top of the transport:
//!
//! | Component            | Role                                              |
//! |----------------------|---------------------------------------------------|
//! | [`OperationProcessor`] | Sends a single operation and decodes its result |
//! | [`BatchProcessor`]   | Sends a whole batch and parses the multipart body |
//! | [`RetryPolicy`]      | Bounded exponential backoff shared by both        |
//!
//! Both processors classify throttling responses as [`crate::Error::Throttling`]
//! so callers can honor the server-suggested delay.

mod batch;
mod operation;
mod retry;

pub use batch::{BatchProcessor, BatchSender};
pub use operation::OperationProcessor;
pub use retry::RetryPolicy;

use crate::model::ServiceFault;

/// Decode a fault body when the service says it sent JSON.
pub(crate) fn parse_fault(media_type: &Option<String>, content: &str) -> Option<ServiceFault> {
    if media_type.as_deref() != Some("application/json") || content.is_empty() {
        return None;
    }
    serde_json::from_str(content).ok()
}
