use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connections::GraphError;

/// Machine readable error kinds carried in the error envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    SnapAlreadyInstalled,
    SnapNotInstalled,
    SnapNotFound,
    SnapChannelNotAvailable,
    SnapRevisionNotAvailable,
    SnapNeedsClassic,
    SnapNeedsClassicSystem,
    SnapNotClassic,
    SnapNeedsDevmode,
    SnapNoUpdateAvailable,
    AuthCancelled,
    BadQuery,
    NetworkTimeout,
    DnsFailure,
    OptionNotFound,
    InterfacesUnchanged,
}

/// A protocol-level failure: HTTP status, optional kind and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: None,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn method_not_allowed(method: &str) -> Self {
        Self::new(405, format!("method {method} not allowed"))
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn auth_cancelled() -> Self {
        Self::new(403, "cancelled").with_kind(ErrorKind::AuthCancelled)
    }

    pub fn snap_not_installed(name: &str) -> Self {
        Self::bad_request(format!("snap \"{name}\" is not installed"))
            .with_kind(ErrorKind::SnapNotInstalled)
    }

    pub fn snap_not_found(name: &str) -> Self {
        Self::not_found(format!("snap \"{name}\" not found")).with_kind(ErrorKind::SnapNotFound)
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownSnap(ref name) => ApiError::snap_not_found(name),
            GraphError::NotConnected(_) => {
                ApiError::bad_request(err.to_string()).with_kind(ErrorKind::InterfacesUnchanged)
            }
            GraphError::UnknownPlug { .. }
            | GraphError::UnknownSlot { .. }
            | GraphError::InterfaceMismatch { .. }
            | GraphError::MissingEndpoints
            | GraphError::NothingToDisconnect => ApiError::bad_request(err.to_string()),
        }
    }
}
