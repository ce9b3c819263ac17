//! Fixed catalogue of response schemas selectable by key.

use std::str::FromStr;

use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::GeminiError;
use crate::types::Schema;

/// Named structural constraints for structured generation.
///
/// Parsed from the request's `schema_type` key; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ResponseSchema {
    /// `{response_message, title, steps: [{step_number, instruction}]}`
    Recipe,
    /// `{response_message, title, description}`
    Details,
    /// `{a: number, b: number}`
    Multiply,
}

impl ResponseSchema {
    /// Resolve a schema key, rejecting anything outside the catalogue.
    pub fn lookup(key: &str) -> Result<Self, GeminiError> {
        Self::from_str(key).map_err(|_| GeminiError::UnknownSchema(key.to_owned()))
    }

    pub fn schema(self) -> Schema {
        match self {
            ResponseSchema::Recipe => Schema::object([
                ("response_message", Schema::string()),
                ("title", Schema::string()),
                (
                    "steps",
                    Schema::array(Schema::object([
                        ("step_number", Schema::integer()),
                        ("instruction", Schema::string()),
                    ])),
                ),
            ]),
            ResponseSchema::Details => Schema::object([
                ("response_message", Schema::string()),
                ("title", Schema::string()),
                ("description", Schema::string()),
            ]),
            ResponseSchema::Multiply => Schema::object([
                ("a", Schema::number().with_description("First number")),
                ("b", Schema::number().with_description("Second number")),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use strum::IntoEnumIterator;

    #[test]
    fn every_key_round_trips() {
        for kind in ResponseSchema::iter() {
            assert_eq!(ResponseSchema::lookup(kind.as_ref()).unwrap(), kind);
        }
        assert_eq!(ResponseSchema::lookup("recipe").unwrap(), ResponseSchema::Recipe);
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = ResponseSchema::lookup("poem").unwrap_err();
        assert!(matches!(err, GeminiError::UnknownSchema(ref k) if k == "poem"));
        assert!(ResponseSchema::lookup("").is_err());
    }

    #[test]
    fn recipe_steps_are_objects_with_required_fields() {
        let schema = ResponseSchema::Recipe.schema();
        let props = schema.properties.as_ref().unwrap();
        let steps = &props["steps"];
        assert_eq!(steps.data_type, DataType::Array);
        let item = steps.items.as_ref().unwrap();
        assert_eq!(
            item.required.as_deref(),
            Some(&["instruction".to_owned(), "step_number".to_owned()][..])
        );
        assert_eq!(schema.required.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn multiply_takes_two_numbers() {
        let schema = ResponseSchema::Multiply.schema();
        let props = schema.properties.unwrap();
        assert_eq!(props["a"].data_type, DataType::Number);
        assert_eq!(props["b"].description.as_deref(), Some("Second number"));
    }
}
