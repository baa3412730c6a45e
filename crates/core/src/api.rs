use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ErrorKind};

/// What a handler produced, before it is wrapped for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Sync {
        result: Value,
        suggested_currency: Option<String>,
    },
    /// An action was accepted and spawned the given change.
    Async { change: u64 },
    /// Non-JSON payload (icons).
    Raw { content_type: String, body: Vec<u8> },
    /// Never answer. Used to simulate an unresponsive daemon.
    Stall,
}

impl Reply {
    pub fn sync(result: Value) -> Self {
        Reply::Sync {
            result,
            suggested_currency: None,
        }
    }
}

/// Response envelope, shared by the server and clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum Envelope {
    Sync {
        status_code: u16,
        status: String,
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggested_currency: Option<String>,
    },
    Async {
        status_code: u16,
        status: String,
        change: String,
    },
    Error {
        status_code: u16,
        status: String,
        result: ErrorResult,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResult {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl Envelope {
    /// Wraps an error. `reason` is the HTTP reason phrase for its status.
    pub fn error(err: &ApiError, reason: &str) -> Self {
        Envelope::Error {
            status_code: err.status,
            status: reason.to_string(),
            result: ErrorResult {
                message: err.message.clone(),
                kind: err.kind,
            },
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Envelope::Sync { status_code, .. }
            | Envelope::Async { status_code, .. }
            | Envelope::Error { status_code, .. } => *status_code,
        }
    }

    /// Converts an error envelope back into an [`ApiError`].
    pub fn into_result(self) -> Result<Envelope, ApiError> {
        match self {
            Envelope::Error {
                status_code,
                result,
                ..
            } => Err(ApiError {
                status: status_code,
                kind: result.kind,
                message: result.message,
            }),
            other => Ok(other),
        }
    }
}

/// Query parameters of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Like [`Params::get`], but an empty value counts as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Comma separated list; empty entries are dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for Params {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Decodes a JSON request body into its typed form.
pub fn decode_body<T: DeserializeOwned>(body: &Value) -> Result<T, ApiError> {
    serde_json::from_value(body.clone())
        .map_err(|e| ApiError::bad_request(format!("cannot decode request body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn async_envelope_shape() {
        let env = Envelope::Async {
            status_code: 202,
            status: "Accepted".into(),
            change: "7".into(),
        };
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"type": "async", "status-code": 202, "status": "Accepted", "change": "7"})
        );
    }

    #[test]
    fn error_envelope_round_trips_to_api_error() {
        let err = ApiError::snap_not_found("foo");
        let text = serde_json::to_string(&Envelope::error(&err, "Not Found")).unwrap();
        assert!(text.contains(r#""kind":"snap-not-found""#));
        let env: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(env.into_result().unwrap_err(), err);
    }

    #[test]
    fn params_helpers() {
        let params: Params = [("snaps", "a,,b"), ("q", ""), ("doc", "true")].into_iter().collect();
        assert_eq!(params.list("snaps"), vec!["a", "b"]);
        assert_eq!(params.get("q"), Some(""));
        assert_eq!(params.non_empty("q"), None);
        assert!(params.flag("doc"));
        assert!(!params.flag("plugs"));
    }
}
