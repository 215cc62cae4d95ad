use super::OperationError;
use crate::{Error, Result};
use std::collections::HashMap;

const OUTER_BOUNDARY: &str = "--batchresponse_";
const INNER_BOUNDARY: &str = "--changesetresponse_";

/// The parsed result of one request part inside a batch response.
///
/// Produced strictly by parsing and never mutated afterward. `headers` is
/// `None` when the part carried no headers of its own.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    pub content_id: String,
    pub status_code: u16,
    pub content: Option<String>,
    pub error: Option<OperationError>,
    pub headers: Option<HashMap<String, String>>,
}

impl OperationResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// The parsed result of a whole batch send.
///
/// `is_successful` is false only when the change set was aborted: the
/// service then reports exactly one result, carrying the first failing
/// operation's error.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub id: String,
    pub boundary_id: String,
    pub is_successful: bool,
    pub operations: Vec<OperationResponse>,
}

impl BatchResponse {
    /// Decode a multipart batch response body into per-request results.
    ///
    /// Forward-only, line oriented; tolerates both CRLF and LF line
    /// endings and blank lines between parts.
    pub fn parse(body: &str) -> Result<BatchResponse> {
        let mut lines = body.lines().peekable();
        let (id, boundary_id) = parse_batch_header(&mut lines)?;
        let mut operations = Vec::new();
        while let Some(op) = parse_part(&mut lines)? {
            operations.push(op);
        }
        if operations.is_empty() {
            return Err(Error::parse(
                "Batch response did not contain any operation results.",
            ));
        }
        let is_successful = operations.len() > 1 || operations[0].error.is_none();
        Ok(BatchResponse {
            id,
            boundary_id,
            is_successful,
            operations,
        })
    }
}

// Byte-wise so arbitrary (non-UTF-8-aligned) garbage never panics the
// parser; boundary prefixes themselves are always ASCII.
fn starts_with_ci(line: &str, prefix: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn clip(line: &str, max: usize) -> &str {
    let mut end = line.len().min(max);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

type Lines<'a> = std::iter::Peekable<std::str::Lines<'a>>;

/// Reads the two outer header lines and the separator after them,
/// yielding the batch id and the inner (changeset) boundary id.
fn parse_batch_header(lines: &mut Lines) -> Result<(String, String)> {
    let first = lines
        .next()
        .ok_or_else(|| Error::parse("Line 1: Expected \"--batchresponse_\" but the body was empty."))?;
    if !starts_with_ci(first, OUTER_BOUNDARY) {
        return Err(Error::parse(format!(
            "Line 1: Expected \"--batchresponse_\" but found \"{}\".",
            clip(first, 16)
        )));
    }
    let id = first[OUTER_BOUNDARY.len()..].to_string();

    let second = lines
        .next()
        .ok_or_else(|| Error::parse("Line 2: Expected \"Content-Type:\" but the body ended."))?;
    if !starts_with_ci(second, "Content-Type:") {
        return Err(Error::parse(format!(
            "Line 2: Expected \"Content-Type:\", but found \"{}\".",
            clip(second, 13)
        )));
    }
    let segments: Vec<&str> = second["Content-Type:".len()..]
        .trim()
        .split(';')
        .map(str::trim)
        .collect();
    let boundary = segments
        .get(1)
        .copied()
        .filter(|s| starts_with_ci(s, "boundary=changesetresponse_"))
        .ok_or_else(|| {
            Error::parse(format!(
                "Line 2: Expected \"boundary=changesetresponse_\" as the second part of \
                 content type, but found \"{}\".",
                segments.get(1).map(|s| clip(s, 27)).unwrap_or_default()
            ))
        })?;
    let boundary_id = boundary["boundary=changesetresponse_".len()..].to_string();
    // Separator line after the outer headers.
    lines.next();
    Ok((id, boundary_id))
}

/// Parses the next inner part, or returns `None` once the change set or
/// the batch is terminated.
fn parse_part(lines: &mut Lines) -> Result<Option<OperationResponse>> {
    // Stray blank lines between parts must not desynchronize the reader.
    while matches!(lines.peek(), Some(l) if l.trim().is_empty()) {
        lines.next();
    }
    let boundary = match lines.next() {
        Some(line) => line,
        None => return Ok(None),
    };
    if starts_with_ci(boundary, OUTER_BOUNDARY) && boundary.ends_with("--") {
        return Ok(None);
    }
    if !starts_with_ci(boundary, INNER_BOUNDARY) {
        return Err(Error::parse(format!(
            "Expected \"--changesetresponse_\", but found \"{}\".",
            clip(boundary, 20)
        )));
    }
    if boundary.ends_with("--") {
        // Change set terminator must be followed by the batch terminator.
        while matches!(lines.peek(), Some(l) if l.trim().is_empty()) {
            lines.next();
        }
        match lines.next() {
            Some(line) if starts_with_ci(line, OUTER_BOUNDARY) && line.ends_with("--") => {
                return Ok(None)
            }
            line => {
                return Err(Error::parse(format!(
                    "Expected \"--batchresponse_<batch-id>--\", but found \"{}\".",
                    line.map(|l| clip(l, 16)).unwrap_or_default()
                )))
            }
        }
    }

    // Part headers: Content-Type/Content-Transfer-Encoding/Content-ID.
    let part_headers = parse_headers(lines);
    let content_id = part_headers
        .as_ref()
        .and_then(|h| h.get("Content-ID"))
        .cloned()
        .unwrap_or_default();

    // Embedded status line, e.g. "HTTP/1.1 412 Precondition Failed".
    let status_line = match lines.next() {
        Some(line) if !line.is_empty() => line,
        _ => return Ok(None),
    };
    let status_code: u16 = status_line
        .get(9..12)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            Error::parse(format!(
                "Expected an embedded status line, but found \"{status_line}\"."
            ))
        })?;

    let headers = parse_headers(lines);

    if (200..300).contains(&status_code) {
        // No body follows a success part, apart from an optional blank
        // terminator line which the loop above swallows.
        return Ok(Some(OperationResponse {
            content_id,
            status_code,
            content: None,
            error: None,
            headers,
        }));
    }

    // Error parts carry a JSON body running up to the next boundary. The
    // boundary line itself stays in the reader so later parts still line up.
    let mut body = String::new();
    while let Some(line) = lines.peek() {
        if starts_with_ci(line, INNER_BOUNDARY) || starts_with_ci(line, OUTER_BOUNDARY) {
            break;
        }
        body.push_str(line);
        body.push('\n');
        lines.next();
    }
    let json: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| Error::parse(format!("Failed to parse error body as JSON: {e}")))?;
    let error = Some(extract_part_error(status_code, &json)?);

    Ok(Some(OperationResponse {
        content_id,
        status_code,
        content: Some(body),
        error,
        headers,
    }))
}

/// Reads `key:value` lines until a blank line. Repeated keys are joined
/// with `"; "`. Returns `None` when no headers were present.
fn parse_headers(lines: &mut Lines) -> Option<HashMap<String, String>> {
    let mut headers = HashMap::new();
    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            break;
        }
        let (key, value) = match line.find(':') {
            Some(pos) if pos > 0 => (&line[..pos], line[pos + 1..].trim()),
            _ => (line, ""),
        };
        headers
            .entry(key.to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str("; ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}

fn json_str(json: &serde_json::Value, key: &str) -> Option<String> {
    json.get(key).map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Maps an error part's JSON body to an [`OperationError`].
///
/// A 429 part uses the flat throttling shape (`ErrorCode`, `Message`,
/// `ExceptionType`, `StackTrace`; the redundant `ErrorMessage` is
/// ignored). Everything else carries a nested `error` object, with the
/// flat shape as a fallback.
fn extract_part_error(status_code: u16, json: &serde_json::Value) -> Result<OperationError> {
    if status_code == 429 {
        return Ok(flat_error(json));
    }
    match json.get("error") {
        Some(error) => Ok(serde_json::from_value(error.clone())?),
        None => Ok(flat_error(json)),
    }
}

fn flat_error(json: &serde_json::Value) -> OperationError {
    OperationError {
        code: json_str(json, "ErrorCode"),
        // ErrorMessage is ignored because it always duplicates Message.
        message: json_str(json, "Message").unwrap_or_default(),
        error_type: json_str(json, "ExceptionType"),
        stack_trace: json_str(json, "StackTrace"),
        inner_error: None,
    }
}
