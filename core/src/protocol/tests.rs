//! Protocol tests for request parsing and response shapes

use crate::protocol::*;
use serde_json::json;

#[test]
fn test_parse_camel_case_request() {
    let request =
        Request::parse(br#"{"action":"get","clientId":"c1","id":"42"}"#).expect("valid request");

    assert_eq!(request.action, Some(Action::Get));
    assert_eq!(request.client_id, "c1");
    assert_eq!(request.id.as_deref(), Some("42"));
    assert!(request.data.is_none());
}

#[test]
fn test_parse_legacy_field_names() {
    let request = Request::parse(
        br#"{"ACTION":"set","UUID":"11259375","DATA":{"id":"7","name":"Acme"}}"#,
    )
    .expect("legacy request");

    assert_eq!(request.action, Some(Action::Set));
    assert_eq!(request.client_id, "11259375");
    assert_eq!(request.data.unwrap()["name"], json!("Acme"));
}

#[test]
fn test_parse_defaults_client_id() {
    let request = Request::parse(br#"{"action":"list"}"#).unwrap();
    assert_eq!(request.client_id, UNKNOWN_CLIENT);
}

#[test]
fn test_parse_accepts_numeric_id() {
    let request = Request::parse(br#"{"action":"get","id":42}"#).unwrap();
    assert_eq!(request.id.as_deref(), Some("42"));
}

#[test]
fn test_parse_missing_action() {
    assert_eq!(
        Request::parse(br#"{"clientId":"c1"}"#),
        Err(ProtocolError::MissingAction)
    );
}

#[test]
fn test_parse_malformed_json() {
    match Request::parse(b"{\"action\": get}") {
        Err(ProtocolError::Malformed(message)) => assert!(!message.is_empty()),
        other => panic!("Expected malformed error, got {:?}", other),
    }
}

#[test]
fn test_parse_rejects_non_object_data() {
    assert!(matches!(
        Request::parse(br#"{"action":"set","data":"nope"}"#),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_unknown_action_is_preserved() {
    let request = Request::parse(br#"{"action":"delete"}"#).unwrap();
    assert_eq!(request.action, Some(Action::Unknown("delete".to_string())));
    assert_eq!(request.action.unwrap().to_string(), "delete");
}

#[test]
fn test_request_builders_serialize_wire_names() {
    let mut data = Record::new();
    data.insert("id".to_string(), json!("42"));
    let value = serde_json::to_value(Request::set("c1", data)).unwrap();

    assert_eq!(
        value,
        json!({"action": "set", "clientId": "c1", "data": {"id": "42"}})
    );
    assert_eq!(
        serde_json::to_value(Request::subscribe("c2")).unwrap(),
        json!({"action": "subscribe", "clientId": "c2"})
    );
}

#[test]
fn test_response_shapes() {
    assert_eq!(
        serde_json::to_value(Response::error("missing id")).unwrap(),
        json!({"error": "missing id"})
    );
    assert_eq!(
        serde_json::to_value(Response::not_found("9")).unwrap(),
        json!({"id": "9", "found": false})
    );

    let mut record = Record::new();
    record.insert("id".to_string(), json!("42"));
    assert_eq!(
        serde_json::to_value(Response::Records(vec![record.clone()])).unwrap(),
        json!([{"id": "42"}])
    );
    assert_eq!(
        serde_json::to_value(Response::Record(record)).unwrap(),
        json!({"id": "42"})
    );
}

#[test]
fn test_response_deserializes_untagged() {
    let error: Response = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
    assert!(error.is_error());

    let missing: Response = serde_json::from_str(r#"{"id":"9","found":false}"#).unwrap();
    assert_eq!(missing, Response::not_found("9"));

    let list: Response = serde_json::from_str(r#"[{"id":"1"},{"id":"2"}]"#).unwrap();
    assert!(matches!(list, Response::Records(ref records) if records.len() == 2));
}

#[test]
fn test_record_id() {
    let mut record = Record::new();
    assert_eq!(record_id(&record), None);

    record.insert("id".to_string(), json!(17));
    assert_eq!(record_id(&record).as_deref(), Some("17"));
}
