//! Request/response data model and its JSON wire schema.
//!
//! Both types serialize with PascalCase keys:
//!
//! ```text
//! Request:  { "Method": string, "Path": string, "Headers": {string: string}, "Body": string }
//! Response: { "StatusCode": integer, "Headers": {string: string}, "Body": string }
//! ```
//!
//! Missing fields decode to their zero value and a `null` header map decodes
//! to an empty one. Any other decode failure is reported as an error; the
//! connection loop decides what to do with it (see
//! [`MalformedPolicy`](crate::config::MalformedPolicy)).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Header map. Ordered so encoded output is deterministic.
pub type Headers = BTreeMap<String, String>;

/// One decoded inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Request {
    /// Protocol verb, e.g. `GET`. Semantics belong to the handler.
    pub method: String,
    /// Resource or operation being requested.
    pub path: String,
    /// Request headers.
    #[serde(deserialize_with = "null_as_empty")]
    pub headers: Headers,
    /// Raw payload.
    pub body: String,
}

impl Request {
    /// Build a request with no headers.
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Add a header, replacing any previous value for the key.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Decode a request from one wire message.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Encode this request as a JSON wire message (without framing).
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// True if every field is empty.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// The handler's answer to one [`Request`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Response {
    /// HTTP-style status code.
    pub status_code: i64,
    /// Response headers.
    #[serde(deserialize_with = "null_as_empty")]
    pub headers: Headers,
    /// Payload.
    pub body: String,
}

impl Response {
    /// `200` with the given body and no headers.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    /// Arbitrary status with the given body and no headers.
    pub fn with_status(status_code: i64, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Add a header, replacing any previous value for the key.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Decode a response from one wire message.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Encode this response as a JSON wire message (without framing).
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Headers>::deserialize(deserializer)?.unwrap_or_default())
}
