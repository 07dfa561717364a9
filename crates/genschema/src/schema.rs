//! The closed generation-schema grammar.

use serde::Serialize;

/// A node in a generation schema tree.
///
/// Nullability is never a node of its own: it is carried by
/// [`Optionality::PossiblyNull`] on the property that holds the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationSchema {
    Bool {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array {
        items: Box<GenerationSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Object(ObjectSchema),
    /// A string restricted to the listed choices, in source order.
    StringEnum {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        choices: Vec<String>,
    },
    /// Any one of the variants.
    Union {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        variants: Vec<GenerationSchema>,
    },
    /// A single fixed value.
    Const(ConstValue),
}

/// A named object with ordered properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSchema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: GenerationSchema,
    pub optionality: Optionality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Optionality {
    Required,
    PossiblyNull,
}

/// Literal carried by a constant leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl ConstValue {
    /// Interpret a JSON number as an integer when it has no fractional part.
    pub(crate) fn from_number(number: &serde_json::Number) -> Option<Self> {
        if let Some(i) = number.as_i64() {
            Some(ConstValue::Int(i))
        } else {
            number.as_f64().map(ConstValue::Float)
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConstValue::Int(i) => serde_json::Value::from(*i),
            ConstValue::Float(f) => serde_json::Value::from(*f),
            ConstValue::Bool(b) => serde_json::Value::Bool(*b),
            ConstValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl GenerationSchema {
    /// Name of this node, for objects, enums and unions.
    pub fn name(&self) -> Option<&str> {
        match self {
            GenerationSchema::Object(object) => Some(&object.name),
            GenerationSchema::StringEnum { name, .. } | GenerationSchema::Union { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            GenerationSchema::Bool { description }
            | GenerationSchema::Integer { description }
            | GenerationSchema::Number { description }
            | GenerationSchema::String { description }
            | GenerationSchema::Array { description, .. }
            | GenerationSchema::StringEnum { description, .. }
            | GenerationSchema::Union { description, .. } => description.as_deref(),
            GenerationSchema::Object(object) => object.description.as_deref(),
            GenerationSchema::Const(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            GenerationSchema::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Names of every named node in the tree, in pre-order.
    pub fn named_nodes(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        if let Some(name) = self.name() {
            names.push(name);
        }
        match self {
            GenerationSchema::Array { items, .. } => items.collect_names(names),
            GenerationSchema::Object(object) => {
                for property in &object.properties {
                    property.schema.collect_names(names);
                }
            }
            GenerationSchema::Union { variants, .. } => {
                for variant in variants {
                    variant.collect_names(names);
                }
            }
            _ => {}
        }
    }
}

impl ObjectSchema {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Names of the required properties, in declaration order.
    pub fn required_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.optionality == Optionality::Required)
            .map(|p| p.name.as_str())
            .collect()
    }
}
