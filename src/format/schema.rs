//! Maps UCM schemas to plain JSON Schema values.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::genai::Schema;

/// Convert a schema into a JSON Schema object.
///
/// Type names are lower-cased; `nullable` is only emitted when true.
pub fn schema_to_map(schema: &Schema) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(schema_type) = schema.schema_type {
        out.insert("type".into(), json!(schema_type.as_str()));
    }
    if let Some(description) = &schema.description
        && !description.is_empty()
    {
        out.insert("description".into(), json!(description));
    }
    if !schema.enum_values.is_empty() {
        out.insert("enum".into(), json!(schema.enum_values));
    }
    if let Some(format) = &schema.format
        && !format.is_empty()
    {
        out.insert("format".into(), json!(format));
    }
    if let Some(items) = &schema.items {
        out.insert("items".into(), Value::Object(schema_to_map(items)));
    }
    if !schema.properties.is_empty() {
        out.insert(
            "properties".into(),
            Value::Object(properties_to_map(&schema.properties)),
        );
    }
    if !schema.required.is_empty() {
        out.insert("required".into(), json!(schema.required));
    }
    if schema.nullable == Some(true) {
        out.insert("nullable".into(), Value::Bool(true));
    }
    if let Some(default) = &schema.default {
        out.insert("default".into(), default.clone());
    }
    if let Some(minimum) = schema.minimum {
        out.insert("minimum".into(), json!(minimum));
    }
    if let Some(maximum) = schema.maximum {
        out.insert("maximum".into(), json!(maximum));
    }
    if let Some(min_length) = schema.min_length {
        out.insert("minLength".into(), json!(min_length));
    }
    if let Some(max_length) = schema.max_length {
        out.insert("maxLength".into(), json!(max_length));
    }
    if let Some(min_items) = schema.min_items {
        out.insert("minItems".into(), json!(min_items));
    }
    if let Some(max_items) = schema.max_items {
        out.insert("maxItems".into(), json!(max_items));
    }
    if let Some(pattern) = &schema.pattern
        && !pattern.is_empty()
    {
        out.insert("pattern".into(), json!(pattern));
    }
    if !schema.any_of.is_empty() {
        let any_of = schema
            .any_of
            .iter()
            .map(|s| Value::Object(schema_to_map(s)))
            .collect();
        out.insert("anyOf".into(), Value::Array(any_of));
    }

    out
}

pub fn properties_to_map(properties: &BTreeMap<String, Schema>) -> Map<String, Value> {
    properties
        .iter()
        .map(|(name, schema)| (name.clone(), Value::Object(schema_to_map(schema))))
        .collect()
}

/// Pretty-printed JSON rendering of a schema, `{}` if it cannot be rendered.
pub fn schema_to_json_string(schema: &Schema) -> String {
    serde_json::to_string_pretty(&Value::Object(schema_to_map(schema)))
        .unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::genai::Type;

    fn create_test_schema() -> Schema {
        let mut properties = BTreeMap::new();
        properties.insert(
            "city".to_string(),
            Schema::of_type(Type::String).with_description("City name"),
        );
        properties.insert(
            "unit".to_string(),
            Schema {
                enum_values: vec!["celsius".to_string(), "fahrenheit".to_string()],
                ..Schema::of_type(Type::String)
            },
        );
        properties.insert(
            "days".to_string(),
            Schema {
                minimum: Some(1.0),
                maximum: Some(14.0),
                nullable: Some(false),
                ..Schema::of_type(Type::Integer)
            },
        );

        Schema {
            properties,
            required: vec!["city".to_string()],
            ..Schema::of_type(Type::Object)
        }
    }

    #[test]
    fn test_schema_to_map_lowercases_types() {
        let map = schema_to_map(&create_test_schema());
        assert_eq!(map["type"], "object");
        assert_eq!(map["properties"]["city"]["type"], "string");
        assert_eq!(map["properties"]["city"]["description"], "City name");
        assert_eq!(map["properties"]["unit"]["enum"], json!(["celsius", "fahrenheit"]));
        assert_eq!(map["required"], json!(["city"]));
    }

    #[test]
    fn test_schema_to_map_extended_fields() {
        let map = schema_to_map(&create_test_schema());
        let days = &map["properties"]["days"];
        assert_eq!(days["minimum"], json!(1.0));
        assert_eq!(days["maximum"], json!(14.0));
        assert!(days.get("nullable").is_none());

        let nullable = Schema {
            nullable: Some(true),
            min_length: Some(2),
            pattern: Some("^[a-z]+$".to_string()),
            ..Schema::of_type(Type::String)
        };
        let map = schema_to_map(&nullable);
        assert_eq!(map["nullable"], true);
        assert_eq!(map["minLength"], 2);
        assert_eq!(map["pattern"], "^[a-z]+$");
    }

    #[test]
    fn test_schema_to_map_nested_items_and_any_of() {
        let schema = Schema {
            items: Some(Box::new(Schema::of_type(Type::Number))),
            any_of: vec![Schema::of_type(Type::Null)],
            ..Schema::of_type(Type::Array)
        };
        let map = schema_to_map(&schema);
        assert_eq!(map["items"], json!({"type": "number"}));
        assert_eq!(map["anyOf"], json!([{"type": "null"}]));
    }

    #[test]
    fn test_schema_to_json_string_is_pretty() {
        let rendered = schema_to_json_string(&Schema::of_type(Type::Object));
        assert_eq!(rendered, "{\n  \"type\": \"object\"\n}");
    }
}
