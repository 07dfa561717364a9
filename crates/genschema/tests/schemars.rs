//! Schemas produced by `schemars` are a common input shape.

use genschema::{GenerationSchema, Optionality};

#[allow(dead_code)]
#[derive(schemars::JsonSchema)]
struct Forecast {
    /// City to look up.
    city: String,
    days: Option<u32>,
    tags: Vec<String>,
}

#[test]
fn test_schemars_struct_converts() {
    let document = serde_json::to_value(schemars::schema_for!(Forecast)).unwrap();
    let schema = GenerationSchema::from_tool_schema(&document).unwrap();
    let object = schema.as_object().unwrap();

    assert_eq!(object.name, "Forecast");
    assert_eq!(object.required_names(), vec!["city", "tags"]);
    assert_eq!(
        object.property("days").unwrap().optionality,
        Optionality::PossiblyNull
    );
    assert_eq!(
        object.property("city").unwrap().description.as_deref(),
        Some("City to look up.")
    );
    assert!(matches!(
        object.property("tags").unwrap().schema,
        GenerationSchema::Array { .. }
    ));
}
