//! Constrained generation schemas, converted from JSON Schema.
//!
//! Tool servers describe their inputs with open, weakly-typed JSON Schema
//! documents. Constrained decoders want something closed: every object named,
//! every enum resolved to concrete alternatives, every property either required
//! or explicitly possibly-null. This crate does that mapping.
//!
//! # Usage
//!
//! ```rust
//! use genschema::{GenerationSchema, Optionality};
//! use serde_json::json;
//!
//! let schema = GenerationSchema::from_tool_schema(&json!({
//!     "type": "object",
//!     "properties": {
//!         "city": { "type": "string" },
//!         "days": { "type": "integer" }
//!     },
//!     "required": ["city"]
//! }))
//! .unwrap();
//!
//! let object = schema.as_object().unwrap();
//! assert_eq!(object.required_names(), vec!["city"]);
//! assert_eq!(object.property("days").unwrap().optionality, Optionality::PossiblyNull);
//! ```
//!
//! # Conversion rules
//!
//! - `boolean`, `integer`, `number`, `string` map to scalar leaves. For the last
//!   three an `enum` or `const` keyword takes precedence over the plain scalar.
//! - `array` maps to an array of the converted `items` (an empty object when
//!   `items` is missing), keeping `minItems`/`maxItems`.
//! - Everything else, including unknown type keywords, is an object. Without a
//!   `type` keyword, `enum` and `const` are checked first.
//! - Inside `properties`, a property typed `null` is dropped, and a `null`
//!   member of an `enum` makes that property possibly-null.
//! - Objects and enums are named by `title`, or `<hint>_<n>` when untitled.

mod convert;
mod render;
mod schema;

pub use convert::convert;
pub use schema::{ConstValue, GenerationSchema, ObjectSchema, Optionality, Property};

use std::collections::HashSet;

/// Errors raised when a tool schema cannot back a generation schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema document must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("schema name '{0}' is used by more than one node")]
    DuplicateName(String),
}

impl GenerationSchema {
    /// Convert a tool's declared input schema, validating the result.
    ///
    /// Unlike [`convert`], this rejects documents that are not JSON objects and
    /// trees where two named nodes share a name.
    pub fn from_tool_schema(document: &serde_json::Value) -> Result<Self, SchemaError> {
        if !document.is_object() {
            return Err(SchemaError::NotAnObject {
                found: json_kind(document),
            });
        }

        let schema = convert(document);

        let mut seen = HashSet::new();
        for name in schema.named_nodes() {
            if !seen.insert(name) {
                return Err(SchemaError::DuplicateName(name.to_string()));
            }
        }

        Ok(schema)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
