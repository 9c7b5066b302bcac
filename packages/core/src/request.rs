//! Command payloads exchanged with the job API.

use serde::{Deserialize, Serialize};

use crate::Priority;

/// Shortest accepted job name, after trimming.
pub const MIN_NAME_LENGTH: usize = 2;

/// Client-side rejection of a command; never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Job name is required")]
    EmptyName,

    #[error("Job name must be at least {min} characters")]
    NameTooShort { min: usize },
}

/// Body of `POST /Jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    #[serde(default)]
    pub priority: Priority,
}

impl CreateJobRequest {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            name: name.into(),
            priority,
        }
    }

    /// Check the form rules and return the request with its name trimmed.
    pub fn validated(&self) -> Result<CreateJobRequest, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().count() < MIN_NAME_LENGTH {
            return Err(ValidationError::NameTooShort {
                min: MIN_NAME_LENGTH,
            });
        }
        Ok(CreateJobRequest::new(name, self.priority))
    }
}

/// Outcome of a stop or restart command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub is_success: bool,
    #[serde(default)]
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn validation_trims_and_checks_length() {
        let blank = CreateJobRequest::new("   ", Priority::High);
        assert_eq!(blank.validated(), Err(ValidationError::EmptyName));

        let short = CreateJobRequest::new(" a ", Priority::High);
        assert_eq!(
            short.validated(),
            Err(ValidationError::NameTooShort { min: 2 })
        );

        let ok = CreateJobRequest::new("  Nightly batch  ", Priority::High);
        assert_eq!(
            ok.validated(),
            Ok(CreateJobRequest::new("Nightly batch", Priority::High))
        );
    }

    #[test]
    fn api_response_wire_format() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"isSuccess":false,"message":"Job not found"}"#).unwrap();
        assert_eq!(response, ApiResponse::failure("Job not found"));

        let body = serde_json::to_value(CreateJobRequest::new("x1", Priority::High)).unwrap();
        assert_eq!(body["priority"], 1);
    }
}
