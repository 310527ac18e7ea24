use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CacheError;

pub const ID_FIELD: &str = "comreq_id";

/// Identifier of a request record. Strings and integers never compare equal,
/// so `"7"` and `7` are two distinct records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::Text(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::Text(value)
    }
}

/// A cached request record. Only `comreq_id` is interpreted; every other
/// field is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComRequest {
    pub comreq_id: RequestId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ComRequest {
    pub fn new(comreq_id: impl Into<RequestId>, mut fields: Map<String, Value>) -> Self {
        fields.remove(ID_FIELD);
        Self {
            comreq_id: comreq_id.into(),
            fields,
        }
    }

    /// Builder-style helper, mostly for tests and fixtures.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != ID_FIELD {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Parses an untyped JSON record, rejecting anything without a usable `comreq_id`.
    pub fn from_value(value: Value) -> Result<Self, CacheError> {
        let Value::Object(mut fields) = value else {
            return Err(CacheError::invalid("request", "expected a JSON object"));
        };

        let comreq_id = match fields.remove(ID_FIELD) {
            None | Some(Value::Null) => {
                return Err(CacheError::invalid(ID_FIELD, "missing identifier"));
            }
            Some(Value::String(s)) => RequestId::Text(s),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => RequestId::Number(i),
                None if n.is_u64() => {
                    return Err(CacheError::invalid(
                        ID_FIELD,
                        format!("numeric identifier {n} is out of range (max {})", i64::MAX),
                    ));
                }
                None => {
                    return Err(CacheError::invalid(
                        ID_FIELD,
                        format!("numeric identifier {n} is not an integer"),
                    ));
                }
            },
            Some(other) => {
                return Err(CacheError::invalid(
                    ID_FIELD,
                    format!("expected string or integer, got {other}"),
                ));
            }
        };

        let request = Self { comreq_id, fields };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        match &self.comreq_id {
            RequestId::Text(s) if s.trim().is_empty() => {
                Err(CacheError::invalid(ID_FIELD, "identifier is empty"))
            }
            _ => Ok(()),
        }
    }
}

impl TryFrom<Value> for ComRequest {
    type Error = CacheError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_and_integer_ids() {
        let a = ComRequest::from_value(json!({"comreq_id": "r1", "status": "open"})).unwrap();
        assert_eq!(a.comreq_id, RequestId::from("r1"));
        assert_eq!(a.field("status"), Some(&json!("open")));
        assert!(a.field(ID_FIELD).is_none());

        let b = ComRequest::from_value(json!({"comreq_id": 42})).unwrap();
        assert_eq!(b.comreq_id, RequestId::Number(42));
        assert_ne!(RequestId::from("42"), b.comreq_id);
    }

    #[test]
    fn rejects_records_without_usable_id() {
        for bad in [
            json!({"status": "open"}),
            json!({"comreq_id": null}),
            json!({"comreq_id": ""}),
            json!({"comreq_id": "   "}),
            json!({"comreq_id": 1.5}),
            json!({"comreq_id": ["x"]}),
            json!("r1"),
        ] {
            let err = ComRequest::from_value(bad.clone()).unwrap_err();
            assert!(
                matches!(err, CacheError::InvalidArgument { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_integer_id_is_reported_as_out_of_range() {
        let err = ComRequest::from_value(json!({"comreq_id": u64::MAX})).unwrap_err();
        match err {
            CacheError::InvalidArgument { field, reason } => {
                assert_eq!(field, ID_FIELD);
                assert!(reason.contains("out of range"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = ComRequest::from_value(json!({"comreq_id": 1.5})).unwrap_err();
        assert!(err.to_string().contains("not an integer"), "{err}");

        let max = ComRequest::from_value(json!({"comreq_id": i64::MAX})).unwrap();
        assert_eq!(max.comreq_id, RequestId::Number(i64::MAX));
    }

    #[test]
    fn serializes_back_to_flat_shape() {
        let original = json!({"comreq_id": "r1", "status": "open", "n": 3});
        let request = ComRequest::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&request).unwrap(), original);
    }

    #[test]
    fn builder_never_shadows_id() {
        let request = ComRequest::new("r1", Map::new())
            .with_field("status", "open")
            .with_field(ID_FIELD, "other");
        assert_eq!(request.comreq_id, RequestId::from("r1"));
        assert!(request.field(ID_FIELD).is_none());
    }
}
