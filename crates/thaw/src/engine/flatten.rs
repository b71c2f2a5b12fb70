//! Flattening of DynamoDB JSON into plain JSON.
//!
//! Export lines look like `{"Item": {"id": {"S": "a"}, "n": {"N": "1"}}}`.
//! Every attribute value is a single-key object naming its type; flattening
//! replaces it with the plain JSON value it encodes.

use serde_json::{Map, Number, Value};
use snafu::prelude::*;

use crate::error::{
    AttributeSnafu, DescriptorCountSnafu, FlattenError, ItemNotAnObjectSnafu, NotAnObjectSnafu,
    SetMemberSnafu, UnsupportedTypeSnafu, UntypedSnafu,
};

/// Unwrap one exported record into a plain JSON object.
///
/// A record wrapped in `{"Item": ...}` is unwrapped first.
pub fn flatten_item(record: Value) -> Result<Value, FlattenError> {
    let Value::Object(mut object) = record else {
        return NotAnObjectSnafu.fail();
    };

    let attributes = match object.remove("Item") {
        Some(Value::Object(item)) if object.is_empty() => item,
        Some(_) if object.is_empty() => return ItemNotAnObjectSnafu.fail(),
        Some(item) => {
            object.insert("Item".to_string(), item);
            object
        }
        None => object,
    };

    let flattened = attributes
        .into_iter()
        .map(|(name, value)| -> Result<(String, Value), FlattenError> {
            let value = decode_attribute(value).context(AttributeSnafu { name: &name })?;
            Ok((name, value))
        })
        .collect::<Result<Map<String, Value>, FlattenError>>()?;

    Ok(Value::Object(flattened))
}

fn set_member(kind: &str, item: Value, decode: fn(String) -> Value) -> Result<Value, FlattenError> {
    match item {
        Value::String(s) => Ok(decode(s)),
        other => SetMemberSnafu {
            kind,
            found: other.to_string(),
        }
        .fail(),
    }
}

/// Decode one typed attribute value.
pub fn decode_attribute(value: Value) -> Result<Value, FlattenError> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return UntypedSnafu {
                found: other.to_string(),
            }
            .fail();
        }
    };
    ensure!(
        object.len() == 1,
        DescriptorCountSnafu {
            count: object.len()
        }
    );
    let Some((descriptor, inner)) = object.into_iter().next() else {
        return DescriptorCountSnafu { count: 0usize }.fail();
    };

    match (descriptor.as_str(), inner) {
        ("S" | "B", Value::String(s)) => Ok(Value::String(s)),
        ("N", Value::String(n)) => Ok(decode_number(n)),
        ("BOOL", Value::Bool(b)) => Ok(Value::Bool(b)),
        ("NULL", _) => Ok(Value::Null),
        ("M", Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| -> Result<(String, Value), FlattenError> {
                let value = decode_attribute(value).context(AttributeSnafu { name: &key })?;
                Ok((key, value))
            })
            .collect::<Result<Map<String, Value>, FlattenError>>()
            .map(Value::Object),
        ("L", Value::Array(items)) => items
            .into_iter()
            .map(decode_attribute)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ("SS" | "BS", Value::Array(items)) => items
            .into_iter()
            .map(|item| set_member("string", item, Value::String))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ("NS", Value::Array(items)) => items
            .into_iter()
            .map(|item| set_member("number", item, decode_number))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (descriptor, inner) => UnsupportedTypeSnafu {
            descriptor,
            value: inner.to_string(),
        }
        .fail(),
    }
}

/// Numbers are transported as strings. Integral values that fit become
/// integers, other finite values floats; anything else stays a string.
fn decode_number(n: String) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    match n.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_scalar_types() {
        let record = json!({"Item": {
            "id": {"S": "candidate-1"},
            "score": {"N": "42"},
            "ratio": {"N": "0.75"},
            "active": {"BOOL": true},
            "deleted_at": {"NULL": true},
        }});

        assert_eq!(
            flatten_item(record).unwrap(),
            json!({
                "id": "candidate-1",
                "score": 42,
                "ratio": 0.75,
                "active": true,
                "deleted_at": null,
            })
        );
    }

    #[test]
    fn test_flatten_nested_types() {
        let record = json!({"Item": {
            "profile": {"M": {
                "name": {"S": "Ada"},
                "tags": {"L": [{"S": "rust"}, {"N": "7"}]},
            }},
            "skills": {"SS": ["a", "b"]},
            "levels": {"NS": ["1", "2.5"]},
            "blob": {"B": "aGk="},
        }});

        assert_eq!(
            flatten_item(record).unwrap(),
            json!({
                "profile": {"name": "Ada", "tags": ["rust", 7]},
                "skills": ["a", "b"],
                "levels": [1, 2.5],
                "blob": "aGk=",
            })
        );
    }

    #[test]
    fn test_unwrapped_record_is_accepted() {
        let record = json!({"id": {"S": "x"}});
        assert_eq!(flatten_item(record).unwrap(), json!({"id": "x"}));
    }

    #[test]
    fn test_number_decoding() {
        assert_eq!(
            decode_attribute(json!({"N": "123456789012345678901234567890"})).unwrap(),
            json!(1.2345678901234568e29)
        );
        assert_eq!(decode_attribute(json!({"N": "-5"})).unwrap(), json!(-5));
    }

    #[test]
    fn test_malformed_attributes_rejected() {
        let err = flatten_item(json!({"Item": {"id": "plain"}})).unwrap_err();
        assert!(matches!(err, FlattenError::Attribute { ref name, .. } if name == "id"));
        assert_eq!(
            err.to_string(),
            "attribute 'id': expected a typed attribute, found \"plain\""
        );

        assert!(matches!(
            decode_attribute(json!({"S": "a", "N": "1"})),
            Err(FlattenError::DescriptorCount { count: 2 })
        ));
        assert!(matches!(
            decode_attribute(json!({"X": "a"})),
            Err(FlattenError::UnsupportedType { .. })
        ));
        assert!(matches!(
            decode_attribute(json!({"NS": ["1", 2]})),
            Err(FlattenError::SetMember { .. })
        ));
        assert!(matches!(
            flatten_item(json!([1, 2])),
            Err(FlattenError::NotAnObject)
        ));

        let nested = flatten_item(json!({"Item": {"profile": {"M": {"age": {"Q": 1}}}}}));
        assert_eq!(
            nested.unwrap_err().to_string(),
            "attribute 'profile': attribute 'age': unsupported type descriptor 'Q' with value 1"
        );
    }
}
