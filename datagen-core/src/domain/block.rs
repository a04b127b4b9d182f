//! Block domain types

use serde::{Deserialize, Serialize};

/// Marker used in serialized field lists for [`FieldSet::Any`]
pub const WILDCARD: &str = "*";

/// Set of state fields a block reads or writes
///
/// Serialized as a list of field names, with `["*"]` standing for the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum FieldSet {
    /// Whatever is present (inputs) or a dynamic set decided at runtime (outputs)
    Any,
    /// An explicit, ordered list of field names
    Fields(Vec<String>),
}

impl FieldSet {
    /// Builds an explicit field list
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Fields(fields.into_iter().map(Into::into).collect())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, FieldSet::Any)
    }

    /// Whether `field` is permitted by this set
    pub fn contains(&self, field: &str) -> bool {
        match self {
            FieldSet::Any => true,
            FieldSet::Fields(fields) => fields.iter().any(|f| f == field),
        }
    }

    /// First declared field, if the set is explicit and non-empty
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldSet::Any => None,
            FieldSet::Fields(fields) => fields.first().map(String::as_str),
        }
    }

    /// Field names as declared, with the wildcard rendered as `"*"`
    pub fn names(&self) -> Vec<String> {
        match self {
            FieldSet::Any => vec![WILDCARD.to_string()],
            FieldSet::Fields(fields) => fields.clone(),
        }
    }
}

impl From<Vec<String>> for FieldSet {
    fn from(fields: Vec<String>) -> Self {
        if fields.iter().any(|f| f == WILDCARD) {
            FieldSet::Any
        } else {
            FieldSet::Fields(fields)
        }
    }
}

impl From<FieldSet> for Vec<String> {
    fn from(set: FieldSet) -> Self {
        set.names()
    }
}

/// Declared contract of a block type
///
/// Immutable once a pipeline is loaded. Listed by the block registry so an
/// editor can show what each block consumes and produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSchema {
    /// Registry key (e.g. "text_generator")
    pub type_name: String,
    /// Free-form grouping used for display (e.g. "generators", "validators")
    pub category: String,
    /// State fields the block expects to exist
    pub inputs: FieldSet,
    /// State fields `execute` is permitted to return
    pub outputs: FieldSet,
    /// Whether the block expands one seed into many skeletons
    #[serde(default)]
    pub is_multiplier: bool,
}

impl BlockSchema {
    /// Creates a schema for a standard (non-multiplier) block
    pub fn new(
        type_name: impl Into<String>,
        category: impl Into<String>,
        inputs: FieldSet,
        outputs: FieldSet,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            category: category.into(),
            inputs,
            outputs,
            is_multiplier: false,
        }
    }

    /// Marks the schema as belonging to a multiplier block
    pub fn multiplier(mut self) -> Self {
        self.is_multiplier = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_serializes_as_star() {
        let json = serde_json::to_value(FieldSet::Any).unwrap();
        assert_eq!(json, serde_json::json!(["*"]));

        let parsed: FieldSet = serde_json::from_value(serde_json::json!(["*"])).unwrap();
        assert!(parsed.is_any());
    }

    #[test]
    fn test_explicit_fields_keep_order() {
        let parsed: FieldSet = serde_json::from_value(serde_json::json!(["valid", "parsed"])).unwrap();
        assert_eq!(parsed.first(), Some("valid"));
        assert!(parsed.contains("parsed"));
        assert!(!parsed.contains("generated"));
    }

    #[test]
    fn test_any_contains_everything_but_has_no_first() {
        assert!(FieldSet::Any.contains("whatever"));
        assert_eq!(FieldSet::Any.first(), None);
    }

    #[test]
    fn test_schema_multiplier_flag() {
        let schema = BlockSchema::new("chunker", "seeders", FieldSet::Any, FieldSet::fields(["chunk"]))
            .multiplier();
        assert!(schema.is_multiplier);
    }
}
