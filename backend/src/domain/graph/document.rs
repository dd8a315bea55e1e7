//! Executable selection tree handed to the executor.
//!
//! Inbound adapters produce this from a query document; variables are already
//! substituted into argument values and fragments are already inlined.

use serde_json::{Map, Value};

/// Root operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    /// Name of the root object type, as reported by `__typename`.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Mutation => "Mutation",
        }
    }
}

/// A single operation with its root selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub selections: Vec<FieldSelection>,
}

impl Operation {
    /// Build a query operation.
    #[must_use]
    pub fn query(selections: Vec<FieldSelection>) -> Self {
        Self {
            kind: OperationKind::Query,
            selections,
        }
    }

    /// Build a mutation operation.
    #[must_use]
    pub fn mutation(selections: Vec<FieldSelection>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            selections,
        }
    }
}

/// One selected field, its arguments and its sub-selections.
///
/// # Examples
/// ```
/// use postboard::domain::graph::FieldSelection;
/// use serde_json::json;
///
/// let field = FieldSelection::new("user")
///     .with_alias("ada")
///     .with_argument("id", json!(1))
///     .with_selections(vec![FieldSelection::new("name")]);
/// assert_eq!(field.response_key(), "ada");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Map<String, Value>,
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    /// Select `name` with no alias, arguments or sub-selections.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Map::new(),
            selections: Vec::new(),
        }
    }

    /// Set the response alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an argument value.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Replace the sub-selections.
    #[must_use]
    pub fn with_selections(mut self, selections: Vec<FieldSelection>) -> Self {
        self.selections = selections;
        self
    }

    /// Key under which the field appears in the response.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.name.as_str())
    }
}
