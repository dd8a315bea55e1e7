//! Response assembly.
//!
//! The executor fills objects tier by tier, so an object's slot is allocated
//! before its fields are known. [`ResponseTree`] keeps objects in an arena and
//! only materialises the JSON document once every tier has run.

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::domain::{Error, ErrorCode};

/// One step of a response path: an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Machine-readable context attached to a field error.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorExtensions {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// A failure confined to one field; the field itself is `null` in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FieldError {
    pub message: String,
    pub path: Vec<PathSegment>,
    pub extensions: ErrorExtensions,
}

impl FieldError {
    /// Attach `error` to the field at `path`.
    #[must_use]
    pub fn new(error: &Error, path: Vec<PathSegment>) -> Self {
        Self {
            message: error.message().to_owned(),
            path,
            extensions: ErrorExtensions {
                code: error.code(),
                trace_id: error.trace_id().map(str::to_owned),
            },
        }
    }
}

/// Outcome of executing one operation.
///
/// ```json
/// {"data": {"user": null}, "errors": [{"message": "...", "path": ["user"],
///  "extensions": {"code": "internal_error"}}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExecutionResult {
    #[schema(value_type = Object)]
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// Handle to an object under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotId(usize);

/// Handle to one field of an object under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldRef {
    slot: SlotId,
    index: usize,
}

/// A field value before materialisation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutValue {
    Leaf(Value),
    Object(SlotId),
    List(Vec<OutValue>),
}

impl OutValue {
    pub(crate) const NULL: Self = Self::Leaf(Value::Null);
}

/// Arena of partially built response objects. Slot 0 is the root.
#[derive(Debug)]
pub(crate) struct ResponseTree {
    slots: Vec<Vec<(String, OutValue)>>,
}

impl ResponseTree {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![Vec::new()],
        }
    }

    pub(crate) const fn root() -> SlotId {
        SlotId(0)
    }

    /// Allocate an empty object.
    pub(crate) fn alloc(&mut self) -> SlotId {
        self.slots.push(Vec::new());
        SlotId(self.slots.len() - 1)
    }

    /// Append a field to `slot`, keeping selection order.
    pub(crate) fn push(&mut self, slot: SlotId, key: &str, value: OutValue) -> FieldRef {
        let fields = &mut self.slots[slot.0];
        fields.push((key.to_owned(), value));
        FieldRef {
            slot,
            index: fields.len() - 1,
        }
    }

    /// Replace the value of a previously pushed field.
    pub(crate) fn set(&mut self, field: FieldRef, value: OutValue) {
        self.slots[field.slot.0][field.index].1 = value;
    }

    /// Materialise the document rooted at slot 0.
    pub(crate) fn into_value(mut self) -> Value {
        self.object(Self::root())
    }

    fn object(&mut self, slot: SlotId) -> Value {
        let fields = std::mem::take(&mut self.slots[slot.0]);
        let mut map = Map::with_capacity(fields.len());
        for (key, value) in fields {
            let value = self.materialise(value);
            map.insert(key, value);
        }
        Value::Object(map)
    }

    fn materialise(&mut self, value: OutValue) -> Value {
        match value {
            OutValue::Leaf(value) => value,
            OutValue::Object(slot) => self.object(slot),
            OutValue::List(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.materialise(item))
                    .collect(),
            ),
        }
    }
}
