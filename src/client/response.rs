//! Response envelope handling
//!
//! Every upstream response is `{code, message, data}` with `code == 0` on
//! success. The `data` member comes back in several shapes depending on the
//! endpoint (an object, a bare list, rows nested under `rows` or
//! `result.rows`); it is resolved here, once, into [`RawPayload`] and
//! [`Page`] so downstream code sees a single canonical form.

use serde_json::{Map, Value};

use crate::utils::error::ClientError;
use crate::utils::truncate_text;

/// Canonical form of the `data` member
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    List(Vec<Value>),
    Object(Map<String, Value>),
    None,
}

impl RawPayload {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(rows) => Self::List(rows),
            Value::Object(map) => Self::Object(map),
            _ => Self::None,
        }
    }

    /// View as a JSON value for the single-object normalizers
    pub fn into_value(self) -> Value {
        match self {
            Self::List(rows) => Value::Array(rows),
            Self::Object(map) => Value::Object(map),
            Self::None => Value::Null,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One page of a paginated endpoint
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub rows: Vec<Value>,
    pub total_pages: Option<u32>,
    pub total_records: Option<u64>,
}

const ROW_KEYS: &[&str] = &["rows", "accountOverviewBeanList", "list", "records"];
const TOTAL_PAGE_KEYS: &[&str] = &["totalPage", "totalPages", "pages"];
const TOTAL_RECORD_KEYS: &[&str] = &["totalRecord", "totalRecords", "total"];

fn integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn first_integer(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| map.get(*k).and_then(integer))
}

fn page_from_container(map: &Map<String, Value>) -> Option<Page> {
    let rows = ROW_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_array))?;

    Some(Page {
        rows: rows.clone(),
        total_pages: first_integer(map, TOTAL_PAGE_KEYS).map(|n| n.min(u64::from(u32::MAX)) as u32),
        total_records: first_integer(map, TOTAL_RECORD_KEYS),
    })
}

impl Page {
    /// Resolve a page from whichever shape the endpoint returned
    pub fn from_payload(payload: RawPayload) -> Self {
        match payload {
            RawPayload::List(rows) => Self {
                rows,
                ..Default::default()
            },
            RawPayload::Object(map) => page_from_container(&map)
                .or_else(|| {
                    map.get("result")
                        .and_then(Value::as_object)
                        .and_then(page_from_container)
                })
                .unwrap_or_default(),
            RawPayload::None => Self::default(),
        }
    }
}

/// Parse a response body into its payload
///
/// # Errors
///
/// `Protocol` when the body is not JSON or lacks an integer `code`;
/// `Application` when `code` is non-zero.
pub fn parse_envelope(body: &str) -> Result<RawPayload, ClientError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ClientError::Protocol(format!(
            "invalid JSON ({e}): {}",
            truncate_text(body.trim(), 120)
        ))
    })?;

    let Value::Object(mut envelope) = value else {
        return Err(ClientError::Protocol(
            "response is not a JSON object".to_string(),
        ));
    };

    let code = envelope
        .get("code")
        .and_then(|c| match c {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .ok_or_else(|| ClientError::Protocol("response envelope has no integer code".to_string()))?;

    if code != 0 {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown API error")
            .to_string();
        return Err(ClientError::Application { code, message });
    }

    Ok(envelope
        .remove("data")
        .map(RawPayload::from_value)
        .unwrap_or(RawPayload::None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_object() {
        let payload = parse_envelope(r#"{"code":0,"message":"ok","data":{"balance":"1"}}"#).unwrap();
        match payload {
            RawPayload::Object(map) => assert_eq!(map["balance"], json!("1")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_success_envelope_without_data() {
        assert_eq!(parse_envelope(r#"{"code":0}"#).unwrap(), RawPayload::None);
        assert_eq!(
            parse_envelope(r#"{"code":"0","data":null}"#).unwrap(),
            RawPayload::None
        );
    }

    #[test]
    fn test_application_error() {
        let err = parse_envelope(r#"{"code":4001,"message":"invalid signature"}"#).unwrap_err();
        match err {
            ClientError::Application { code, message } => {
                assert_eq!(code, 4001);
                assert_eq!(message, "invalid signature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_protocol_errors() {
        assert!(matches!(
            parse_envelope("<html>busy</html>"),
            Err(ClientError::Protocol(_))
        ));
        assert!(matches!(
            parse_envelope("[1,2,3]"),
            Err(ClientError::Protocol(_))
        ));
        assert!(matches!(
            parse_envelope(r#"{"message":"no code"}"#),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_page_shapes() {
        let flat = Page::from_payload(RawPayload::from_value(json!({
            "rows": [{"a": 1}, {"a": 2}], "totalPage": 3, "totalRecord": "120"
        })));
        assert_eq!(flat.rows.len(), 2);
        assert_eq!(flat.total_pages, Some(3));
        assert_eq!(flat.total_records, Some(120));

        let nested = Page::from_payload(RawPayload::from_value(json!({
            "result": {"rows": [{"a": 1}], "totalPage": 1, "totalRecord": 1}
        })));
        assert_eq!(nested.rows.len(), 1);
        assert_eq!(nested.total_pages, Some(1));

        let bare = Page::from_payload(RawPayload::from_value(json!([{"a": 1}])));
        assert_eq!(bare.rows.len(), 1);
        assert_eq!(bare.total_pages, None);

        let overview = Page::from_payload(RawPayload::from_value(json!({
            "accountOverviewBeanList": [{"a": 1}], "totalPage": "2"
        })));
        assert_eq!(overview.total_pages, Some(2));

        assert_eq!(Page::from_payload(RawPayload::None), Page::default());
        assert!(Page::from_payload(RawPayload::from_value(json!({"other": 1})))
            .rows
            .is_empty());
    }
}
