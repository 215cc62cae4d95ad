use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nested error detail attached to a failed operation, mirroring the
/// service's recursive error reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_type: Option<String>,
    #[serde(rename = "stacktrace", default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(rename = "innererror", default, skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<Box<OperationError>>,
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code} {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Batch-level fault body the service returns on throttling or whole-batch
/// rejection. `ErrorMessage` duplicates `Message` and is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceFault {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl ServiceFault {
    pub fn from_status(status: u16, reason: &str, content: &str) -> Self {
        ServiceFault {
            message: format!(
                "Response status code does not indicate success: {status} ({reason}) \
                 content: {content}."
            ),
            exception_message: None,
            exception_type: None,
            stack_trace: None,
            error_code: Some(i64::from(status)),
            retry_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_error() {
        let json = r#"{
            "code": "0x80040217",
            "message": "account With Id = 1 Does Not Exist",
            "innererror": {
                "message": "inner detail",
                "type": "Microsoft.Crm.CrmException"
            }
        }"#;
        let err: OperationError = serde_json::from_str(json).unwrap();
        assert_eq!(err.code.as_deref(), Some("0x80040217"));
        let inner = err.inner_error.unwrap();
        assert_eq!(inner.message, "inner detail");
        assert_eq!(inner.error_type.as_deref(), Some("Microsoft.Crm.CrmException"));
    }

    #[test]
    fn deserializes_service_fault_ignoring_error_message() {
        let json = r#"{
            "Message": "Number of requests exceeded the limit of 6000.",
            "ErrorMessage": "Number of requests exceeded the limit of 6000.",
            "ExceptionType": "Microsoft.Xrm.TooManyRequests",
            "ErrorCode": -2147015902
        }"#;
        let fault: ServiceFault = serde_json::from_str(json).unwrap();
        assert_eq!(fault.error_code, Some(-2147015902));
        assert!(fault.message.starts_with("Number of requests"));
        assert!(fault.retry_after.is_none());
    }
}
