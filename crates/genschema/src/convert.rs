//! Recursive descent from JSON Schema documents to [`GenerationSchema`].

use serde_json::{Map, Value};

use crate::schema::{ConstValue, GenerationSchema, ObjectSchema, Optionality, Property};

const ROOT_HINT: &str = "schema";

/// Convert a JSON Schema document into a generation schema.
///
/// Total: any input produces a schema. A document that is not a JSON object
/// converts as an empty object.
pub fn convert(document: &Value) -> GenerationSchema {
    let empty = Map::new();
    let doc = document.as_object().unwrap_or(&empty);
    Converter::default().root(doc, ROOT_HINT)
}

/// Where a node sits determines how `null` and unusable constants are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Root,
    Property,
}

/// The `type` keyword, if it names one of the JSON Schema primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKeyword {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    Unknown,
}

impl TypeKeyword {
    fn parse(keyword: &str) -> Self {
        match keyword {
            "null" => TypeKeyword::Null,
            "boolean" => TypeKeyword::Boolean,
            "integer" => TypeKeyword::Integer,
            "number" => TypeKeyword::Number,
            "string" => TypeKeyword::String,
            "array" => TypeKeyword::Array,
            "object" => TypeKeyword::Object,
            _ => TypeKeyword::Unknown,
        }
    }
}

/// A converted node plus whether the source marked it nullable.
struct Converted {
    schema: GenerationSchema,
    nullable: bool,
}

impl Converted {
    fn plain(schema: GenerationSchema) -> Self {
        Self {
            schema,
            nullable: false,
        }
    }
}

#[derive(Default)]
struct Converter {
    synthesized: usize,
}

impl Converter {
    fn root(&mut self, doc: &Map<String, Value>, hint: &str) -> GenerationSchema {
        match self.classify(doc, hint, Position::Root) {
            Some(converted) => converted.schema,
            None => self.object(doc, hint),
        }
    }

    /// Returns `None` when the node has no usable representation at `position`.
    fn classify(
        &mut self,
        doc: &Map<String, Value>,
        hint: &str,
        position: Position,
    ) -> Option<Converted> {
        let description = string_field(doc, "description");
        let (keyword, type_nullable) = declared_type(doc);

        let converted = match keyword {
            Some(TypeKeyword::Null) if position == Position::Property => return None,
            Some(TypeKeyword::Boolean) => Converted::plain(GenerationSchema::Bool { description }),
            Some(TypeKeyword::Array) => Converted::plain(self.array(doc, hint, description)),
            Some(scalar @ (TypeKeyword::Integer | TypeKeyword::Number | TypeKeyword::String)) => {
                if let Some(alternatives) = doc.get("enum") {
                    self.enumeration(doc, alternatives, hint, description)
                } else if let Some(literal) = doc.get("const").and_then(const_literal) {
                    Converted::plain(GenerationSchema::Const(literal))
                } else {
                    Converted::plain(scalar_leaf(scalar, description))
                }
            }
            Some(TypeKeyword::Object) => Converted::plain(self.object(doc, hint)),
            _ => {
                if let Some(alternatives) = doc.get("enum") {
                    self.enumeration(doc, alternatives, hint, description)
                } else if let Some(literal) = doc.get("const") {
                    match const_literal(literal) {
                        Some(literal) => Converted::plain(GenerationSchema::Const(literal)),
                        None if position == Position::Property => {
                            tracing::debug!(property = hint, "unsupported const literal, dropping");
                            return None;
                        }
                        None => Converted::plain(self.object(doc, hint)),
                    }
                } else {
                    Converted::plain(self.object(doc, hint))
                }
            }
        };

        Some(Converted {
            nullable: converted.nullable || type_nullable,
            ..converted
        })
    }

    fn array(
        &mut self,
        doc: &Map<String, Value>,
        hint: &str,
        description: Option<String>,
    ) -> GenerationSchema {
        let empty = Map::new();
        let items = doc.get("items").and_then(Value::as_object).unwrap_or(&empty);

        GenerationSchema::Array {
            items: Box::new(self.root(items, hint)),
            min_count: doc.get("minItems").and_then(Value::as_u64),
            max_count: doc.get("maxItems").and_then(Value::as_u64),
            description,
        }
    }

    fn object(&mut self, doc: &Map<String, Value>, hint: &str) -> GenerationSchema {
        let name = self.name_for(doc, hint);
        let description = string_field(doc, "description");

        let required: Vec<&str> = doc
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut properties = Vec::new();
        if let Some(declared) = doc.get("properties").and_then(Value::as_object) {
            for (key, value) in declared {
                let Some(sub) = value.as_object() else {
                    continue;
                };
                let Some(converted) = self.classify(sub, key, Position::Property) else {
                    continue;
                };

                let optionality = if required.contains(&key.as_str()) && !converted.nullable {
                    Optionality::Required
                } else {
                    Optionality::PossiblyNull
                };

                properties.push(Property {
                    name: key.clone(),
                    description: string_field(sub, "description"),
                    schema: converted.schema,
                    optionality,
                });
            }
        }

        GenerationSchema::Object(ObjectSchema {
            name,
            description,
            properties,
        })
    }

    /// Strings become one string enum. Any other number or boolean adds a
    /// constant variant, and the whole becomes a union. A `null` member marks
    /// the result nullable; arrays and objects are dropped.
    fn enumeration(
        &mut self,
        doc: &Map<String, Value>,
        alternatives: &Value,
        hint: &str,
        description: Option<String>,
    ) -> Converted {
        let name = self.name_for(doc, hint);

        let Some(alternatives) = alternatives.as_array() else {
            return Converted::plain(GenerationSchema::StringEnum {
                name,
                description,
                choices: Vec::new(),
            });
        };

        let choices: Vec<String> = alternatives
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();

        if choices.len() == alternatives.len() {
            return Converted::plain(GenerationSchema::StringEnum {
                name,
                description,
                choices,
            });
        }

        let nullable = alternatives.iter().any(Value::is_null);

        let constants: Vec<GenerationSchema> = alternatives
            .iter()
            .filter_map(|alternative| match alternative {
                Value::Number(n) => ConstValue::from_number(n),
                Value::Bool(b) => Some(ConstValue::Bool(*b)),
                _ => None,
            })
            .map(GenerationSchema::Const)
            .collect();

        if constants.is_empty() {
            return Converted {
                schema: GenerationSchema::StringEnum {
                    name,
                    description,
                    choices,
                },
                nullable,
            };
        }

        let mut variants = Vec::with_capacity(constants.len() + 1);
        if !choices.is_empty() {
            variants.push(GenerationSchema::StringEnum {
                name: format!("{name}_choices"),
                description: None,
                choices,
            });
        }
        variants.extend(constants);

        Converted {
            schema: GenerationSchema::Union {
                name,
                description,
                variants,
            },
            nullable,
        }
    }

    fn name_for(&mut self, doc: &Map<String, Value>, hint: &str) -> String {
        if let Some(title) = string_field(doc, "title") {
            return title;
        }
        self.synthesized += 1;
        format!("{hint}_{}", self.synthesized)
    }
}

/// Resolve `type`, accepting the `["string", "null"]` list form.
fn declared_type(doc: &Map<String, Value>) -> (Option<TypeKeyword>, bool) {
    match doc.get("type") {
        Some(Value::String(keyword)) => (Some(TypeKeyword::parse(keyword)), false),
        Some(Value::Array(keywords)) => {
            let keywords: Vec<TypeKeyword> = keywords
                .iter()
                .filter_map(Value::as_str)
                .map(TypeKeyword::parse)
                .collect();
            let nullable = keywords.contains(&TypeKeyword::Null);
            let primary = keywords
                .iter()
                .copied()
                .find(|k| *k != TypeKeyword::Null)
                .or_else(|| keywords.first().copied());
            (primary, nullable)
        }
        _ => (None, false),
    }
}

/// Scalar literals only. Booleans, arrays, objects and null have no constant form.
fn const_literal(value: &Value) -> Option<ConstValue> {
    match value {
        Value::Number(n) => ConstValue::from_number(n),
        Value::String(s) => Some(ConstValue::String(s.clone())),
        _ => None,
    }
}

fn scalar_leaf(keyword: TypeKeyword, description: Option<String>) -> GenerationSchema {
    match keyword {
        TypeKeyword::Integer => GenerationSchema::Integer { description },
        TypeKeyword::Number => GenerationSchema::Number { description },
        _ => GenerationSchema::String { description },
    }
}

fn string_field(doc: &Map<String, Value>, key: &str) -> Option<String> {
    doc.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_declared_type_list_form() {
        let (keyword, nullable) = declared_type(&object(json!({"type": ["integer", "null"]})));
        assert_eq!(keyword, Some(TypeKeyword::Integer));
        assert!(nullable);

        let (keyword, nullable) = declared_type(&object(json!({"type": ["null"]})));
        assert_eq!(keyword, Some(TypeKeyword::Null));
        assert!(nullable);
    }

    #[test]
    fn test_declared_type_absent() {
        assert_eq!(declared_type(&object(json!({"enum": [1]}))), (None, false));
    }

    #[test]
    fn test_const_literal_kinds() {
        assert_eq!(const_literal(&json!(3)), Some(ConstValue::Int(3)));
        assert_eq!(const_literal(&json!(2.5)), Some(ConstValue::Float(2.5)));
        assert_eq!(const_literal(&json!("x")), Some(ConstValue::String("x".into())));
        assert_eq!(const_literal(&json!(true)), None);
        assert_eq!(const_literal(&json!([1])), None);
        assert_eq!(const_literal(&json!({"a": 1})), None);
    }

    #[test]
    fn test_synthesized_names_are_sequential() {
        let mut converter = Converter::default();
        assert_eq!(converter.name_for(&Map::new(), "a"), "a_1");
        assert_eq!(converter.name_for(&Map::new(), "b"), "b_2");
        assert_eq!(
            converter.name_for(&object(json!({"title": "T"})), "c"),
            "T"
        );
    }
}
