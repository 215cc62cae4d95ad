use super::{BatchResponse, ChangeSet, Operation};
use crate::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::io::Write as _;
use uuid::Uuid;

/// One outer multipart request/response unit containing one change set.
///
/// A batch is created without a response and gains one only after a send
/// completes; transport-level failures surface as errors carrying the
/// batch instead. Batches are not reused or pooled.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub change_set: ChangeSet,
    pub response: Option<BatchResponse>,
    pub run_count: u32,
}

impl Batch {
    /// Wrap operations in a new batch. Missing content ids are persisted
    /// onto the descriptors here so that response parts can be matched
    /// back to them after the send.
    pub fn new(operations: Vec<Operation>) -> Self {
        let mut change_set = ChangeSet::new(operations);
        change_set.assign_missing_content_ids();
        Batch {
            id: Uuid::new_v4().to_string(),
            change_set,
            response: None,
            run_count: 0,
        }
    }

    pub fn from_change_set(mut change_set: ChangeSet) -> Self {
        change_set.assign_missing_content_ids();
        Batch {
            id: Uuid::new_v4().to_string(),
            change_set,
            response: None,
            run_count: 0,
        }
    }

    /// Encode the batch into its outer multipart wire text.
    pub fn to_multipart(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "--batch_{}\r\n", self.id);
        let _ = write!(
            out,
            "Content-Type: multipart/mixed;boundary=changeset_{}\r\n\r\n",
            self.change_set.id
        );
        out.push_str(&self.change_set.to_multipart());
        let _ = write!(out, "\r\n--batch_{}--\r\n", self.id);
        out
    }

    /// The content type the batch must be posted with.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed;boundary=batch_{}", self.id)
    }

    /// Gzip the encoded batch, for size budgeting and compressed upload.
    pub fn to_gzip(&self, level: Compression) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), level);
        encoder.write_all(self.to_multipart().as_bytes())?;
        Ok(encoder.finish()?)
    }
}

/// Split an operation list into chunks whose compressed batch encoding
/// fits within `max_bytes`.
///
/// Recursive bisection expressed as an explicit worklist: pop a slice,
/// encode, compress, measure; emit it when under budget, otherwise push
/// its halves (right first, so chunks come out left-to-right). A single
/// operation that still exceeds the budget is irreducible and fails with
/// a validation error — never a silently-oversized chunk.
pub fn chunk_operations(
    operations: Vec<Operation>,
    max_bytes: usize,
    level: Compression,
) -> Result<Vec<Vec<Operation>>> {
    if operations.is_empty() {
        return Ok(Vec::new());
    }
    let mut chunks = Vec::new();
    let mut worklist = vec![operations];
    while let Some(slice) = worklist.pop() {
        let compressed_len = Batch::new(slice.clone()).to_gzip(level)?.len();
        if compressed_len <= max_bytes {
            chunks.push(slice);
        } else if slice.len() == 1 {
            return Err(Error::validation(format!(
                "Even with one operation, the size of the batch is {compressed_len} \
                 which is larger than maximum allowed ({max_bytes})."
            )));
        } else {
            let mut left = slice;
            let right = left.split_off(left.len() / 2);
            worklist.push(right);
            worklist.push(left);
        }
    }
    Ok(chunks)
}
