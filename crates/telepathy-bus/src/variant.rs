//! Conversion of D-Bus values into display values

use callwatch_observer_core::{PropertyMap, PropertyValue};
use std::collections::HashMap;
use zbus::zvariant::{OwnedValue, Value};

/// Convert a D-Bus value, unwrapping nested variants
pub fn property_value(value: &Value<'_>) -> PropertyValue {
    match value {
        Value::Bool(v) => PropertyValue::Bool(*v),
        Value::U8(v) => PropertyValue::UInt(u64::from(*v)),
        Value::U16(v) => PropertyValue::UInt(u64::from(*v)),
        Value::U32(v) => PropertyValue::UInt(u64::from(*v)),
        Value::U64(v) => PropertyValue::UInt(*v),
        Value::I16(v) => PropertyValue::Int(i64::from(*v)),
        Value::I32(v) => PropertyValue::Int(i64::from(*v)),
        Value::I64(v) => PropertyValue::Int(*v),
        Value::F64(v) => PropertyValue::Double(*v),
        Value::Str(v) => PropertyValue::Str(v.as_str().to_string()),
        Value::Signature(v) => PropertyValue::Str(v.as_str().to_string()),
        Value::ObjectPath(v) => PropertyValue::ObjectPath(v.as_str().to_string()),
        Value::Value(inner) => property_value(inner),
        Value::Array(array) => PropertyValue::List(array.iter().map(property_value).collect()),
        Value::Dict(dict) => PropertyValue::Map(
            dict.iter()
                .map(|(k, v)| (property_value(k), property_value(v)))
                .collect(),
        ),
        Value::Structure(structure) => {
            PropertyValue::Struct(structure.fields().iter().map(property_value).collect())
        }
        other => PropertyValue::Other(format!("{:?}", other)),
    }
}

/// Convert a `GetAll` reply or the changed part of `PropertiesChanged`
pub fn property_map(properties: &HashMap<String, OwnedValue>) -> PropertyMap {
    properties
        .iter()
        .map(|(name, value)| (name.clone(), property_value(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::{ObjectPath, Structure};

    #[test]
    fn test_scalars() {
        assert_eq!(property_value(&Value::from(true)), PropertyValue::Bool(true));
        assert_eq!(property_value(&Value::from(7u32)), PropertyValue::UInt(7));
        assert_eq!(property_value(&Value::from(-3i32)), PropertyValue::Int(-3));
        assert_eq!(
            property_value(&Value::from("stun.example.com")),
            PropertyValue::Str("stun.example.com".to_string())
        );
    }

    #[test]
    fn test_object_path_list() {
        let paths = vec![
            ObjectPath::try_from("/ep/1").unwrap(),
            ObjectPath::try_from("/ep/2").unwrap(),
        ];
        let converted = property_value(&Value::from(paths));
        assert_eq!(converted.to_string(), "[/ep/1, /ep/2]");
        assert_eq!(converted.object_paths().len(), 2);
    }

    #[test]
    fn test_nested_variant_and_struct() {
        let inner = Value::Value(Box::new(Value::from(5u32)));
        assert_eq!(property_value(&inner), PropertyValue::UInt(5));

        let structure = Structure::from(("user", "secret"));
        assert_eq!(
            property_value(&Value::from(structure)).to_string(),
            "(\"user\", \"secret\")"
        );
    }

    #[test]
    fn test_dict() {
        let mut map = HashMap::new();
        map.insert("ice-ufrag".to_string(), "abcd".to_string());
        let converted = property_value(&Value::from(map));
        assert_eq!(converted.to_string(), "{\"ice-ufrag\": \"abcd\"}");
    }
}
