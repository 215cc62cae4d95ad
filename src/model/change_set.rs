use super::Operation;
use std::fmt::Write;
use uuid::Uuid;

/// An ordered, transactional group of operations sharing one inner
/// multipart boundary.
///
/// The boundary id is generated once at construction and stays stable for
/// the lifetime of the change set; re-serialization never regenerates it.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub id: String,
    pub operations: Vec<Operation>,
}

impl ChangeSet {
    pub fn new(operations: Vec<Operation>) -> Self {
        ChangeSet {
            id: Uuid::new_v4().to_string(),
            operations,
        }
    }

    pub fn with_id(id: impl Into<String>, operations: Vec<Operation>) -> Self {
        ChangeSet {
            id: id.into(),
            operations,
        }
    }

    /// Persist 1-based sequential content ids onto operations that have
    /// none, so response parts can be correlated back to descriptors.
    ///
    /// Uses the same numbering as [`to_multipart`](Self::to_multipart).
    pub fn assign_missing_content_ids(&mut self) {
        let mut next = 0u32;
        for op in &mut self.operations {
            next += 1;
            if op.content_id.as_deref().map_or(true, str::is_empty) {
                op.content_id = Some(next.to_string());
            }
        }
    }

    /// Encode the change set into its multipart/mixed wire text.
    ///
    /// Pure: operations without a content id are numbered with a local
    /// counter, so two encodes of the same change set produce identical
    /// output.
    pub fn to_multipart(&self) -> String {
        let mut out = String::new();
        let mut next = 0u32;
        for op in &self.operations {
            next += 1;
            let content_id = match op.content_id.as_deref() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => next.to_string(),
            };
            let _ = write!(out, "--changeset_{}\r\n", self.id);
            out.push_str("Content-Type:application/http\r\n");
            out.push_str("Content-Transfer-Encoding:binary\r\n");
            let _ = write!(out, "Content-ID:{content_id}\r\n\r\n");
            let _ = write!(out, "{} {} HTTP/1.1\r\n", op.method, op.uri);
            if op.has_value() {
                out.push_str("Content-Type:application/json;type=entry\r\n");
            }
            if let Some(headers) = &op.headers {
                for (key, value) in headers {
                    let _ = write!(out, "{key}:{value}\r\n");
                }
            }
            out.push_str("\r\n");
            if let Some(value) = &op.value {
                let _ = write!(out, "{}\r\n", value.to_wire_string());
            }
        }
        let _ = write!(out, "--changeset_{}--\r\n", self.id);
        out
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boundary_id_is_stable_across_encodes() {
        let cs = ChangeSet::new(vec![Operation::get("accounts")]);
        let id = cs.id.clone();
        let first = cs.to_multipart();
        let second = cs.to_multipart();
        assert_eq!(first, second);
        assert!(first.contains(&format!("--changeset_{id}")));
        assert!(first.ends_with(&format!("--changeset_{id}--\r\n")));
    }

    #[test]
    fn auto_assignment_is_idempotent() {
        let cs = ChangeSet::new(vec![
            Operation::new("POST", "accounts").with_value(json!({})),
            Operation::new("POST", "contacts").with_value(json!({})),
        ]);
        let first = cs.to_multipart();
        let second = cs.to_multipart();
        assert_eq!(first, second);
        assert!(first.contains("Content-ID:1\r\n"));
        assert!(first.contains("Content-ID:2\r\n"));
    }

    #[test]
    fn explicit_ids_are_preserved() {
        let cs = ChangeSet::new(vec![
            Operation::get("a").with_content_id("7"),
            Operation::get("b"),
        ]);
        let text = cs.to_multipart();
        assert!(text.contains("Content-ID:7\r\n"));
        // Auto numbering counts positions, not assigned ids.
        assert!(text.contains("Content-ID:2\r\n"));
    }

    #[test]
    fn body_part_carries_entry_content_type() {
        let cs = ChangeSet::new(vec![Operation::new("POST", "accounts")
            .with_value(json!({ "name": "Contoso" }))
            .with_header("If-None-Match", "*")]);
        let text = cs.to_multipart();
        assert!(text.contains("Content-Type:application/json;type=entry\r\n"));
        assert!(text.contains("If-None-Match:*\r\n"));
        assert!(text.contains("{\"name\":\"Contoso\"}\r\n"));
    }

    #[test]
    fn payload_less_part_has_no_entry_content_type() {
        let cs = ChangeSet::new(vec![Operation::get("accounts")]);
        let text = cs.to_multipart();
        assert!(!text.contains("type=entry"));
        assert!(text.contains("GET accounts HTTP/1.1\r\n"));
    }

    #[test]
    fn assign_missing_content_ids_matches_encode_numbering() {
        let mut cs = ChangeSet::new(vec![
            Operation::get("a").with_content_id("x"),
            Operation::get("b"),
            Operation::get("c"),
        ]);
        cs.assign_missing_content_ids();
        assert_eq!(cs.operations[0].content_id.as_deref(), Some("x"));
        assert_eq!(cs.operations[1].content_id.as_deref(), Some("2"));
        assert_eq!(cs.operations[2].content_id.as_deref(), Some("3"));
        // Re-encode uses the now-persisted ids.
        let text = cs.to_multipart();
        assert!(text.contains("Content-ID:x\r\n"));
        assert!(text.contains("Content-ID:2\r\n"));
        assert!(text.contains("Content-ID:3\r\n"));
    }
}
