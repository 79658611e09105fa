//! DynamoDB attribute conversion functions.
//!
//! Pure functions for converting between DynamoDB AttributeValue maps and items.
//! These are testable in isolation without DynamoDB access.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use dynabridge_core::{Item, ItemKey, StoreError, Value};

/// Convert a value to its DynamoDB representation.
///
/// `uuid` and `datetime` values are stored as strings; the table binding
/// restores their declared types on read.
pub fn value_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Int(i) => AttributeValue::N(i.to_string()),
        Value::Float(x) => AttributeValue::N(x.to_string()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Uuid(u) => AttributeValue::S(u.to_string()),
        Value::DateTime(dt) => AttributeValue::S(dt.to_rfc3339()),
    }
}

/// Convert a DynamoDB attribute to a loosely typed value.
pub fn attribute_to_value(name: &str, attribute: &AttributeValue) -> Result<Value, StoreError> {
    match attribute {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => parse_number(n).ok_or_else(|| {
            StoreError::InvalidData(format!("Attribute '{}' is not a number: {}", name, n))
        }),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        other => Err(StoreError::InvalidData(format!(
            "Attribute '{}' has an unsupported type: {:?}",
            name, other
        ))),
    }
}

fn parse_number(n: &str) -> Option<Value> {
    n.parse::<i64>()
        .map(Value::Int)
        .or_else(|_| n.parse::<f64>().map(Value::Float))
        .ok()
}

/// Convert an item to a DynamoDB attribute map.
pub fn item_to_attributes(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(name, value)| (name.clone(), value_to_attribute(value)))
        .collect()
}

/// Convert a DynamoDB attribute map to an item.
///
/// `NULL` attributes are dropped.
pub fn attributes_to_item(attributes: &HashMap<String, AttributeValue>) -> Result<Item, StoreError> {
    attributes
        .iter()
        .filter(|(_, attribute)| !attribute.is_null())
        .map(|(name, attribute)| Ok((name.clone(), attribute_to_value(name, attribute)?)))
        .collect()
}

/// Convert a key to the DynamoDB key map.
pub fn key_to_attributes(key: &ItemKey) -> HashMap<String, AttributeValue> {
    item_to_attributes(&key.to_item())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dynabridge_core::item;
    use uuid::Uuid;

    #[test]
    fn test_value_to_attribute() {
        assert_eq!(
            value_to_attribute(&Value::from("John")),
            AttributeValue::S("John".to_string())
        );
        assert_eq!(
            value_to_attribute(&Value::from(42)),
            AttributeValue::N("42".to_string())
        );
        assert_eq!(
            value_to_attribute(&Value::from(2.5)),
            AttributeValue::N("2.5".to_string())
        );
        assert_eq!(value_to_attribute(&Value::from(true)), AttributeValue::Bool(true));

        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            value_to_attribute(&Value::from(dt)),
            AttributeValue::S("2024-01-15T10:30:00+00:00".to_string())
        );

        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap();
        assert_eq!(
            value_to_attribute(&Value::from(id)),
            AttributeValue::S("550e8400-e29b-41d4-a716-446655440001".to_string())
        );
    }

    #[test]
    fn test_attribute_to_value_numbers() {
        assert_eq!(
            attribute_to_value("n", &AttributeValue::N("7".to_string())),
            Ok(Value::Int(7))
        );
        assert_eq!(
            attribute_to_value("n", &AttributeValue::N("7.25".to_string())),
            Ok(Value::Float(7.25))
        );
        assert!(matches!(
            attribute_to_value("n", &AttributeValue::N("seven".to_string())),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_attribute_to_value_unsupported() {
        let result = attribute_to_value("Tags", &AttributeValue::Ss(vec!["a".to_string()]));
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_item_conversion() {
        let item = item! { "UserId" => "u1", "Age" => 30, "Active" => true };

        let attributes = item_to_attributes(&item);

        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes_to_item(&attributes), Ok(item));
    }

    #[test]
    fn test_null_attributes_are_dropped() {
        let mut attributes = HashMap::new();
        attributes.insert("UserId".to_string(), AttributeValue::S("u1".to_string()));
        attributes.insert("Nickname".to_string(), AttributeValue::Null(true));

        assert_eq!(attributes_to_item(&attributes), Ok(item! { "UserId" => "u1" }));
    }

    #[test]
    fn test_key_to_attributes() {
        let key = ItemKey::new("Pk", "order").with_sort("Sk", 3);
        let attributes = key_to_attributes(&key);

        assert_eq!(attributes.get("Pk"), Some(&AttributeValue::S("order".to_string())));
        assert_eq!(attributes.get("Sk"), Some(&AttributeValue::N("3".to_string())));
    }
}
