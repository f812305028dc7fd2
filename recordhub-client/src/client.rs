//! High-level request API

use crate::config::ClientConfig;
use crate::connection::{Connection, Subscription};
use crate::error::RecordHubClientError;
use crate::Result;
use recordhub::protocol::{is_not_found_shape, Record, Request};
use serde_json::Value;

/// Sends one-shot requests to a broker, one connection per request.
#[derive(Debug, Clone)]
pub struct RecordHubClient {
    config: ClientConfig,
    client_id: String,
}

impl RecordHubClient {
    pub fn new(config: ClientConfig) -> Self {
        let client_id = config.resolved_client_id();
        Self { config, client_id }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `request` and return the broker's raw reply
    pub async fn request(&self, request: &Request) -> Result<Value> {
        let mut connection = Connection::connect(&self.config).await?;
        connection.send_request(request).await?;
        connection.read_reply().await
    }

    /// Fetch a record, `None` when the broker reports it absent
    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        let reply = check_reply(self.request(&Request::get(self.client_id.clone(), id)).await?)?;
        if is_not_found(&reply) {
            return Ok(None);
        }
        into_record(reply).map(Some)
    }

    pub async fn list(&self) -> Result<Vec<Record>> {
        match check_reply(self.request(&Request::list(self.client_id.clone())).await?)? {
            Value::Array(items) => items.into_iter().map(into_record).collect(),
            other => Err(RecordHubClientError::protocol(format!(
                "expected a list of records, got {}",
                other
            ))),
        }
    }

    /// Store a record and return it as the broker stored it
    pub async fn set(&self, record: Record) -> Result<Record> {
        let reply = self
            .request(&Request::set(self.client_id.clone(), record))
            .await?;
        into_record(check_reply(reply)?)
    }

    pub async fn subscribe(&self) -> Result<Subscription> {
        Subscription::open(&self.config, self.client_id.clone()).await
    }
}

/// Validate a request document loaded from a file before sending it.
///
/// Fills in `clientId` when the document carries no client id, requires an
/// action, and for `set` requires every field in `required` inside `data`.
/// Both the current field names and the legacy upper-case ones are accepted.
pub fn prepare_request(document: Value, client_id: &str, required: &[String]) -> Result<Value> {
    let mut map = match document {
        Value::Object(map) => map,
        _ => return Err(RecordHubClientError::invalid_request("request must be a JSON object")),
    };

    if !map.contains_key("clientId") && !map.contains_key("UUID") {
        map.insert("clientId".to_string(), Value::String(client_id.to_string()));
    }

    let action = match map.get("action").or_else(|| map.get("ACTION")) {
        Some(Value::String(action)) if !action.is_empty() => action.clone(),
        _ => return Err(RecordHubClientError::invalid_request("the 'action' field is required")),
    };

    if action == "set" {
        let data = map
            .get("data")
            .or_else(|| map.get("DATA"))
            .and_then(Value::as_object);
        let missing: Vec<&str> = required
            .iter()
            .filter(|field| !data.map_or(false, |d| d.contains_key(field.as_str())))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(RecordHubClientError::invalid_request(format!(
                "data is missing fields for 'set': {}",
                missing.join(", ")
            )));
        }
    }

    Ok(Value::Object(map))
}

/// Turn a `{"error": ..}` reply into an error
pub fn check_reply(reply: Value) -> Result<Value> {
    if let Value::Object(map) = &reply {
        if map.len() == 1 {
            if let Some(Value::String(message)) = map.get("error") {
                return Err(RecordHubClientError::broker(message.clone()));
            }
        }
    }
    Ok(reply)
}

fn is_not_found(reply: &Value) -> bool {
    reply.as_object().map_or(false, is_not_found_shape)
}

fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(RecordHubClientError::protocol(format!(
            "expected a record, got {}",
            other
        ))),
    }
}
