use std::fmt;

pub const NO_FILE_SELECTED: &str = "Please select a file.";
pub const UPLOAD_REQUIRED: &str = "Upload required first.";
pub const INVALID_CLUSTER_COUNT: &str = "Number of clusters must be a positive integer.";

/// Remote endpoints, used to pick fallback messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Upload,
    Cluster,
    SampleData,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Upload => "/upload",
            Endpoint::Cluster => "/cluster",
            Endpoint::SampleData => "/sample-data",
        }
    }

    /// Shown when the server rejected the call without an `error` field.
    pub fn failed_message(&self) -> &'static str {
        match self {
            Endpoint::Upload => "Upload failed.",
            Endpoint::Cluster => "Clustering failed.",
            Endpoint::SampleData => "Sample data download failed.",
        }
    }

    /// Shown when the call itself did not complete.
    pub fn transport_message(&self) -> &'static str {
        match self {
            Endpoint::Upload => "Upload error.",
            Endpoint::Cluster => "Clustering error.",
            Endpoint::SampleData => "Sample data download error.",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Every failure the workflow can report. None of them is fatal; each ends up as
/// the session's single error message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// Operation attempted without its precondition; no request was sent.
    #[error("{0}")]
    LocalGuard(String),

    /// The request did not complete or the response could not be read.
    #[error("{endpoint} request failed: {detail}")]
    Transport { endpoint: Endpoint, detail: String },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server {
        endpoint: Endpoint,
        status: u16,
        message: Option<String>,
    },
}

impl WorkflowError {
    pub fn guard(message: impl Into<String>) -> Self {
        WorkflowError::LocalGuard(message.into())
    }

    pub fn transport(endpoint: Endpoint, detail: impl fmt::Display) -> Self {
        WorkflowError::Transport {
            endpoint,
            detail: detail.to_string(),
        }
    }

    /// The text written into the session's error field.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::LocalGuard(message) => message.clone(),
            WorkflowError::Transport { endpoint, .. } => endpoint.transport_message().to_string(),
            WorkflowError::Server {
                endpoint, message, ..
            } => match message.as_deref() {
                Some(m) if !m.trim().is_empty() => m.to_string(),
                _ => endpoint.failed_message().to_string(),
            },
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, WorkflowError::LocalGuard(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_shown_verbatim() {
        let err = WorkflowError::Server {
            endpoint: Endpoint::Upload,
            status: 400,
            message: Some("unsupported file type".into()),
        };
        assert_eq!(err.user_message(), "unsupported file type");
        assert_eq!(err.to_string(), "/upload returned 400: unsupported file type");
    }

    #[test]
    fn server_without_message_uses_endpoint_fallback() {
        let err = WorkflowError::Server {
            endpoint: Endpoint::Cluster,
            status: 500,
            message: None,
        };
        assert_eq!(err.user_message(), "Clustering failed.");
        let blank = WorkflowError::Server {
            endpoint: Endpoint::Upload,
            status: 500,
            message: Some("  ".into()),
        };
        assert_eq!(blank.user_message(), "Upload failed.");
    }

    #[test]
    fn transport_failures_are_generic() {
        let err = WorkflowError::transport(Endpoint::Upload, "connection refused");
        assert_eq!(err.user_message(), "Upload error.");
        assert!(!err.is_local());
        assert!(WorkflowError::guard(UPLOAD_REQUIRED).is_local());
    }
}
