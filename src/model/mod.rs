//! Wire-level data model: request descriptors, change sets, batches, and
//! the multipart response parser.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Operation`] | One request destined for a change set |
//! | [`ChangeSet`] | Ordered, transactional group of operations |
//! | [`Batch`] | Outer multipart unit wrapping one change set |
//! | [`BatchResponse`] | Parsed batch result with per-request linkage |
//! | [`OperationResponse`] | One parsed response part |
//! | [`OperationError`] | Nested server error detail |
//! | [`ServiceFault`] | Batch-level fault body (throttling et al.) |

mod batch;
mod change_set;
mod fault;
mod operation;
mod response;

pub use batch::{chunk_operations, Batch};
pub use change_set::ChangeSet;
pub use fault::{OperationError, ServiceFault};
pub use operation::{Operation, OperationValue};
pub use response::{BatchResponse, OperationResponse};
