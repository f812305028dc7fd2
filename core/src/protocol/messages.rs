use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// A keyed mapping of attributes; the key lives in the `id` field.
pub type Record = Map<String, Value>;

/// Stable identifier of a client across its lifetime.
pub type ClientId = String;

/// Client id used when a request does not carry one.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Errors raised while turning an inbound frame into a [`Request`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not a JSON request object
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("missing action")]
    MissingAction,

    /// A field required by the requested action is absent or empty
    #[error("missing {0}")]
    MissingField(&'static str),

    /// The action string is not one the broker knows
    #[error("unrecognized action")]
    UnrecognizedAction(String),

    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// A `set` record shaped exactly like the not-found reply
    #[error("record shape is reserved for not-found replies")]
    ReservedRecord,
}

/// Actions understood by the broker.
///
/// Anything else is carried as [`Action::Unknown`] so that dispatch stays an
/// exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Subscribe,
    Get,
    List,
    Set,
    Unknown(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Subscribe => "subscribe",
            Action::Get => "get",
            Action::List => "list",
            Action::Set => "set",
            Action::Unknown(other) => other,
        }
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "subscribe" => Action::Subscribe,
            "get" => Action::Get,
            "list" => Action::List,
            "set" => Action::Set,
            _ => Action::Unknown(value),
        }
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Action::from(value.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Unknown(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request message.
///
/// The upper-case field names used by the first generation of clients
/// (`ACTION`, `UUID`, `ID`, `DATA`) are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default, alias = "ACTION", skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    #[serde(default = "unknown_client", alias = "UUID")]
    pub client_id: ClientId,

    #[serde(
        default,
        alias = "ID",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,

    #[serde(default, alias = "DATA", skip_serializing_if = "Option::is_none")]
    pub data: Option<Record>,
}

fn unknown_client() -> ClientId {
    UNKNOWN_CLIENT.to_string()
}

/// Record ids are strings on the wire, but numeric ids are tolerated.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string id, found {other}"
        ))),
    }
}

impl Request {
    fn with_action(action: Action, client_id: impl Into<ClientId>) -> Self {
        Self {
            action: Some(action),
            client_id: client_id.into(),
            id: None,
            data: None,
        }
    }

    pub fn subscribe(client_id: impl Into<ClientId>) -> Self {
        Self::with_action(Action::Subscribe, client_id)
    }

    pub fn get(client_id: impl Into<ClientId>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::with_action(Action::Get, client_id)
        }
    }

    pub fn list(client_id: impl Into<ClientId>) -> Self {
        Self::with_action(Action::List, client_id)
    }

    pub fn set(client_id: impl Into<ClientId>, data: Record) -> Self {
        Self {
            data: Some(data),
            ..Self::with_action(Action::Set, client_id)
        }
    }

    /// Parse one inbound frame and check that it names an action.
    pub fn parse(frame: &[u8]) -> std::result::Result<Self, ProtocolError> {
        let request: Request = serde_json::from_slice(frame)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if request.action.is_none() {
            return Err(ProtocolError::MissingAction);
        }
        Ok(request)
    }

    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Outbound response message.
///
/// Serialized untagged: a record, a list of records, the not-found sentinel
/// `{"id": .., "found": false}`, or `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Error { error: String },
    NotFound { id: String, found: bool },
    Records(Vec<Record>),
    Record(Record),
}

impl Response {
    pub fn error(message: impl fmt::Display) -> Self {
        Response::Error {
            error: message.to_string(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Response::NotFound {
            id: id.into(),
            found: false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// True for `{"id": .., "found": false}` with no other fields.
///
/// This shape is the not-found reply to `get`, so it cannot be stored.
pub fn is_not_found_shape(record: &Record) -> bool {
    record.len() == 2
        && record.contains_key("id")
        && record.get("found") == Some(&Value::Bool(false))
}

/// Id of a record, if it carries a string or numeric `id` field.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
