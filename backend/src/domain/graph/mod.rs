//! Query execution over users and posts.
//!
//! [`Schema`] holds the resolver tables, [`Executor`] drives tiered resolution
//! of an [`Operation`], and [`ExecutionResult`] is what callers serialise.

mod document;
mod executor;
pub mod relations;
mod response;
mod root;
mod schema;

pub use document::{FieldSelection, Operation, OperationKind};
pub use executor::Executor;
pub use response::{ErrorExtensions, ExecutionResult, FieldError, PathSegment};
pub use root::RootResolver;
pub use schema::{
    ArgSpec, ArgType, FieldDescriptor, ObjectType, RELATIONS, Relation, RelationSpec, RootField,
    RootFieldSpec, ScalarField, Schema, SchemaError, TYPENAME_FIELD,
};
