use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Status, Verb};

/// Error reported by the API server (any non-2xx response, or an `ERROR` watch event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{reason} (HTTP {status_code}): {message}")]
pub struct KubeApiError {
    pub status_code: u16,
    pub reason: String,
    pub message: String,
}

impl KubeApiError {
    pub fn new(status_code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status_code, reason: reason.into(), message: message.into() }
    }

    /// Build from a decoded `Status`, falling back to the HTTP code when the body carries none.
    pub fn from_status(status: &Status, http_code: u16) -> Self {
        let code = if status.code != 0 { status.code } else { http_code };
        Self { status_code: code, reason: status.reason.clone(), message: status.message.clone() }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code == 409
    }

    /// The server's event history no longer covers the requested resourceVersion.
    pub fn is_gone(&self) -> bool {
        self.status_code == 410 || self.reason == "Expired" || self.reason == "Gone"
    }

    /// Throttling and server-side failures.
    pub fn is_transient(&self) -> bool {
        self.status_code == 429 || self.status_code >= 500
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),
    #[error("invalid resource key: {0} (expect v1/Kind or group/v1/Kind)")]
    InvalidResourceKey(String),
    #[error("verb '{verb}' is not supported for {kind}")]
    UnsupportedVerb { kind: String, verb: Verb },
    #[error("missing path parameter '{param}' for template {template}")]
    MissingPathParameter { template: String, param: String },
    #[error("path parameter '{param}' has an invalid value {value:?}")]
    InvalidPathParameter { param: String, value: String },
    #[error("incompatible schema: {0}")]
    IncompatibleSchema(String),
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error(transparent)]
    Api(#[from] KubeApiError),
    #[error("resourceVersion {0} is too old; a full resync is required")]
    ResourceVersionTooOld(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("decoding {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding request body: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode { what: what.into(), source }
    }

    pub fn api(&self) -> Option<&KubeApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Caller misuse that no retry can fix.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::UnknownResourceType(_)
                | Self::InvalidResourceKey(_)
                | Self::UnsupportedVerb { .. }
                | Self::MissingPathParameter { .. }
                | Self::InvalidPathParameter { .. }
                | Self::IncompatibleSchema(_)
                | Self::InvalidPatch(_)
                | Self::InvalidManifest(_)
                | Self::Encode(_)
        )
    }

    /// Whether repeating the same (idempotent) call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::ResourceVersionTooOld(_) => true,
            Self::Api(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
