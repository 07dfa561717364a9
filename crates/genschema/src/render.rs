use serde_json::{json, Map, Value};

use crate::schema::{ConstValue, GenerationSchema, ObjectSchema, Optionality};

impl GenerationSchema {
    /// Render as strict JSON Schema, the form function-calling providers accept.
    ///
    /// Every object lists all of its properties in `required` and forbids
    /// additional ones. Possibly-null properties become `anyOf [schema, null]`.
    pub fn to_json_schema(&self) -> Value {
        match self {
            GenerationSchema::Bool { description } => leaf("boolean", description),
            GenerationSchema::Integer { description } => leaf("integer", description),
            GenerationSchema::Number { description } => leaf("number", description),
            GenerationSchema::String { description } => leaf("string", description),
            GenerationSchema::Array {
                items,
                min_count,
                max_count,
                description,
            } => {
                let mut out = Map::new();
                out.insert("type".into(), json!("array"));
                out.insert("items".into(), items.to_json_schema());
                if let Some(min) = min_count {
                    out.insert("minItems".into(), json!(min));
                }
                if let Some(max) = max_count {
                    out.insert("maxItems".into(), json!(max));
                }
                with_description(out, description.as_deref())
            }
            GenerationSchema::Object(object) => render_object(object),
            GenerationSchema::StringEnum {
                name,
                description,
                choices,
            } => {
                let mut out = Map::new();
                out.insert("title".into(), json!(name));
                out.insert("type".into(), json!("string"));
                out.insert("enum".into(), json!(choices));
                with_description(out, description.as_deref())
            }
            GenerationSchema::Union {
                name,
                description,
                variants,
            } => {
                let mut out = Map::new();
                out.insert("title".into(), json!(name));
                out.insert(
                    "anyOf".into(),
                    Value::Array(variants.iter().map(GenerationSchema::to_json_schema).collect()),
                );
                with_description(out, description.as_deref())
            }
            GenerationSchema::Const(value) => {
                let kind = match value {
                    ConstValue::Int(_) => "integer",
                    ConstValue::Float(_) => "number",
                    ConstValue::Bool(_) => "boolean",
                    ConstValue::String(_) => "string",
                };
                json!({ "type": kind, "const": value.to_json() })
            }
        }
    }
}

fn render_object(object: &ObjectSchema) -> Value {
    let mut properties = Map::new();
    for property in &object.properties {
        let mut rendered = property.schema.to_json_schema();
        if property.optionality == Optionality::PossiblyNull {
            rendered = json!({ "anyOf": [rendered, { "type": "null" }] });
        }
        if let (Some(description), Value::Object(map)) = (&property.description, &mut rendered) {
            map.entry("description")
                .or_insert_with(|| Value::String(description.clone()));
        }
        properties.insert(property.name.clone(), rendered);
    }

    let required: Vec<&str> = object.properties.iter().map(|p| p.name.as_str()).collect();

    let mut out = Map::new();
    out.insert("title".into(), json!(object.name));
    out.insert("type".into(), json!("object"));
    out.insert("properties".into(), Value::Object(properties));
    out.insert("required".into(), json!(required));
    out.insert("additionalProperties".into(), json!(false));
    with_description(out, object.description.as_deref())
}

fn leaf(kind: &str, description: &Option<String>) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), json!(kind));
    with_description(out, description.as_deref())
}

fn with_description(mut out: Map<String, Value>, description: Option<&str>) -> Value {
    if let Some(description) = description {
        out.insert("description".into(), json!(description));
    }
    Value::Object(out)
}
