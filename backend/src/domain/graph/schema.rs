//! Resolver tables and the relation map.
//!
//! The tables map field names to typed descriptors and are built once at
//! startup by [`Schema::build`]. Requests are checked against them with
//! [`Schema::validate`] before anything touches the store.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::domain::Error;
use crate::domain::batch::LookupMode;
use crate::domain::ports::Collection;

use super::document::{FieldSelection, Operation, OperationKind};

/// Name of the introspection field available on every object.
pub const TYPENAME_FIELD: &str = "__typename";

/// Object types exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    User,
    Post,
}

impl ObjectType {
    /// Type name as exposed to clients.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Post => "Post",
        }
    }

    /// Collection storing objects of this type.
    #[must_use]
    pub const fn collection(self) -> Collection {
        match self {
            Self::User => Collection::Users,
            Self::Post => Collection::Posts,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Leaf fields read straight off a loaded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarField {
    UserId,
    UserName,
    PostId,
    PostTitle,
    PostContent,
    PostUserId,
    TypeName,
}

/// Fields resolved through the batch collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `Post.author`: the user a post belongs to.
    PostAuthor,
    /// `User.posts`: every post written by a user.
    UserPosts,
}

/// Resolver descriptor for one object field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDescriptor {
    Scalar(ScalarField),
    Relation(Relation),
}

/// Declaration of one relation: where its key comes from and how it is
/// matched against the target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationSpec {
    pub relation: Relation,
    pub field: &'static str,
    pub parent: ObjectType,
    pub target: ObjectType,
    /// Column of the parent record supplying the lookup key.
    pub source_column: &'static str,
    /// Column of the target collection matched against the key.
    pub target_column: &'static str,
    pub mode: LookupMode,
}

/// The relation map consulted by the executor.
pub const RELATIONS: [RelationSpec; 2] = [
    RelationSpec {
        relation: Relation::PostAuthor,
        field: "author",
        parent: ObjectType::Post,
        target: ObjectType::User,
        source_column: "user_id",
        target_column: "id",
        mode: LookupMode::ById,
    },
    RelationSpec {
        relation: Relation::UserPosts,
        field: "posts",
        parent: ObjectType::User,
        target: ObjectType::Post,
        source_column: "id",
        target_column: "user_id",
        mode: LookupMode::ByForeignKeyGroup,
    },
];

const USER_SCALARS: [(&str, ScalarField); 2] =
    [("id", ScalarField::UserId), ("name", ScalarField::UserName)];

const POST_SCALARS: [(&str, ScalarField); 4] = [
    ("id", ScalarField::PostId),
    ("title", ScalarField::PostTitle),
    ("content", ScalarField::PostContent),
    ("userId", ScalarField::PostUserId),
];

/// Root entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootField {
    Users,
    Posts,
    User,
    Post,
    CreateUser,
    CreatePost,
    UpdateUser,
    UpdatePost,
}

/// Argument value types accepted by root fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    String,
}

impl ArgType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Int => value
                .as_i64()
                .is_some_and(|raw| i32::try_from(raw).is_ok()),
            Self::String => value.is_string(),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::String => "String",
        }
    }
}

/// One declared argument of a root field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
    pub required: bool,
}

const fn required(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec {
        name,
        ty,
        required: true,
    }
}

const fn optional(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec {
        name,
        ty,
        required: false,
    }
}

/// Resolver descriptor for one root field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootFieldSpec {
    pub field: RootField,
    pub name: &'static str,
    pub returns: ObjectType,
    pub list: bool,
    pub args: &'static [ArgSpec],
}

const QUERY_FIELDS: [RootFieldSpec; 4] = [
    RootFieldSpec {
        field: RootField::Users,
        name: "users",
        returns: ObjectType::User,
        list: true,
        args: &[],
    },
    RootFieldSpec {
        field: RootField::Posts,
        name: "posts",
        returns: ObjectType::Post,
        list: true,
        args: &[],
    },
    RootFieldSpec {
        field: RootField::User,
        name: "user",
        returns: ObjectType::User,
        list: false,
        args: &[required("id", ArgType::Int)],
    },
    RootFieldSpec {
        field: RootField::Post,
        name: "post",
        returns: ObjectType::Post,
        list: false,
        args: &[required("id", ArgType::Int)],
    },
];

const MUTATION_FIELDS: [RootFieldSpec; 4] = [
    RootFieldSpec {
        field: RootField::CreateUser,
        name: "createUser",
        returns: ObjectType::User,
        list: false,
        args: &[required("name", ArgType::String)],
    },
    RootFieldSpec {
        field: RootField::CreatePost,
        name: "createPost",
        returns: ObjectType::Post,
        list: false,
        args: &[
            required("title", ArgType::String),
            required("content", ArgType::String),
            required("userId", ArgType::Int),
        ],
    },
    RootFieldSpec {
        field: RootField::UpdateUser,
        name: "updateUser",
        returns: ObjectType::User,
        list: false,
        args: &[required("id", ArgType::Int), optional("name", ArgType::String)],
    },
    RootFieldSpec {
        field: RootField::UpdatePost,
        name: "updatePost",
        returns: ObjectType::Post,
        list: false,
        args: &[
            required("id", ArgType::Int),
            optional("title", ArgType::String),
            optional("content", ArgType::String),
            optional("userId", ArgType::Int),
        ],
    },
];

/// Inconsistencies detected while building the resolver tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two resolvers claim the same field name on one type.
    #[error("field `{field}` is declared twice on `{owner}`")]
    DuplicateField {
        owner: &'static str,
        field: &'static str,
    },
    /// A by-id relation must match the target primary key and a group
    /// relation must match a foreign key column with the parent primary key.
    #[error("relation `{field}` on `{parent}` has inconsistent key columns for {mode}")]
    InconsistentRelationKeys {
        parent: ObjectType,
        field: &'static str,
        mode: LookupMode,
    },
}

/// Validated resolver tables.
#[derive(Debug, Clone)]
pub struct Schema {
    query: HashMap<&'static str, RootFieldSpec>,
    mutation: HashMap<&'static str, RootFieldSpec>,
    objects: HashMap<ObjectType, HashMap<&'static str, FieldDescriptor>>,
    relations: HashMap<Relation, RelationSpec>,
}

impl Schema {
    /// Build the tables for the users/posts API.
    ///
    /// # Errors
    /// Returns [`SchemaError`] when the declarations are inconsistent.
    pub fn build() -> Result<Self, SchemaError> {
        Self::from_relations(&RELATIONS)
    }

    /// Build the tables around a custom relation map.
    ///
    /// # Errors
    /// Returns [`SchemaError`] when a relation clashes with another field or
    /// its key columns do not fit its lookup mode.
    pub fn from_relations(relations: &[RelationSpec]) -> Result<Self, SchemaError> {
        let mut objects: HashMap<ObjectType, HashMap<&'static str, FieldDescriptor>> =
            HashMap::new();
        for (owner, scalars) in [
            (ObjectType::User, USER_SCALARS.as_slice()),
            (ObjectType::Post, POST_SCALARS.as_slice()),
        ] {
            let table = objects.entry(owner).or_default();
            table.insert(TYPENAME_FIELD, FieldDescriptor::Scalar(ScalarField::TypeName));
            for (name, scalar) in scalars {
                insert_unique(table, owner.name(), name, FieldDescriptor::Scalar(*scalar))?;
            }
        }

        let mut relation_specs = HashMap::new();
        for spec in relations {
            check_relation_keys(spec)?;
            let table = objects.entry(spec.parent).or_default();
            insert_unique(
                table,
                spec.parent.name(),
                spec.field,
                FieldDescriptor::Relation(spec.relation),
            )?;
            relation_specs.insert(spec.relation, *spec);
        }

        Ok(Self {
            query: root_table(&QUERY_FIELDS, OperationKind::Query)?,
            mutation: root_table(&MUTATION_FIELDS, OperationKind::Mutation)?,
            objects,
            relations: relation_specs,
        })
    }

    /// Resolver for a root field of `kind`.
    #[must_use]
    pub fn root_field(&self, kind: OperationKind, name: &str) -> Option<&RootFieldSpec> {
        match kind {
            OperationKind::Query => self.query.get(name),
            OperationKind::Mutation => self.mutation.get(name),
        }
    }

    /// Resolver for a field of `object`.
    #[must_use]
    pub fn object_field(&self, object: ObjectType, name: &str) -> Option<FieldDescriptor> {
        self.objects
            .get(&object)
            .and_then(|fields| fields.get(name))
            .copied()
    }

    /// Declaration of `relation`.
    #[must_use]
    pub fn relation(&self, relation: Relation) -> Option<&RelationSpec> {
        self.relations.get(&relation)
    }

    /// Check an operation against the tables.
    ///
    /// # Errors
    /// Returns an [`Error`] with code `invalid_request` naming the first
    /// unknown field, unknown or missing argument, mistyped argument value, or
    /// misplaced sub-selection.
    pub fn validate(&self, operation: &Operation) -> Result<(), Error> {
        let owner = operation.kind.type_name();
        for selection in &operation.selections {
            if selection.name == TYPENAME_FIELD {
                ensure_leaf(owner, selection)?;
                continue;
            }
            let spec = self
                .root_field(operation.kind, &selection.name)
                .ok_or_else(|| unknown_field(owner, &selection.name))?;
            validate_arguments(owner, spec, selection)?;
            self.validate_object_selection(spec.returns, selection)?;
        }
        Ok(())
    }

    fn validate_object_selection(
        &self,
        object: ObjectType,
        selection: &FieldSelection,
    ) -> Result<(), Error> {
        if selection.selections.is_empty() {
            return Err(Error::invalid_request(format!(
                "field `{}` of type `{object}` must have a selection of subfields",
                selection.name
            )));
        }
        for child in &selection.selections {
            let descriptor = self
                .object_field(object, &child.name)
                .ok_or_else(|| unknown_field(object.name(), &child.name))?;
            if let Some(argument) = child.arguments.keys().next() {
                return Err(unknown_argument(object.name(), &child.name, argument));
            }
            match descriptor {
                FieldDescriptor::Scalar(_) => ensure_leaf(object.name(), child)?,
                FieldDescriptor::Relation(relation) => {
                    let target = self
                        .relation(relation)
                        .map(|spec| spec.target)
                        .ok_or_else(|| Error::internal("relation missing from schema"))?;
                    self.validate_object_selection(target, child)?;
                }
            }
        }
        Ok(())
    }
}

fn insert_unique(
    table: &mut HashMap<&'static str, FieldDescriptor>,
    owner: &'static str,
    field: &'static str,
    descriptor: FieldDescriptor,
) -> Result<(), SchemaError> {
    if table.insert(field, descriptor).is_some() {
        return Err(SchemaError::DuplicateField { owner, field });
    }
    Ok(())
}

fn check_relation_keys(spec: &RelationSpec) -> Result<(), SchemaError> {
    let consistent = match spec.mode {
        LookupMode::ById => spec.target_column == "id",
        LookupMode::ByForeignKeyGroup => {
            spec.source_column == "id" && spec.target_column != "id"
        }
    };
    if consistent {
        Ok(())
    } else {
        Err(SchemaError::InconsistentRelationKeys {
            parent: spec.parent,
            field: spec.field,
            mode: spec.mode,
        })
    }
}

fn root_table(
    fields: &[RootFieldSpec],
    kind: OperationKind,
) -> Result<HashMap<&'static str, RootFieldSpec>, SchemaError> {
    let mut table = HashMap::new();
    for spec in fields {
        if table.insert(spec.name, *spec).is_some() {
            return Err(SchemaError::DuplicateField {
                owner: kind.type_name(),
                field: spec.name,
            });
        }
    }
    Ok(table)
}

fn validate_arguments(
    owner: &str,
    spec: &RootFieldSpec,
    selection: &FieldSelection,
) -> Result<(), Error> {
    for name in selection.arguments.keys() {
        if !spec.args.iter().any(|arg| arg.name == name) {
            return Err(unknown_argument(owner, spec.name, name));
        }
    }
    for arg in spec.args {
        match selection.arguments.get(arg.name) {
            None | Some(Value::Null) if arg.required => {
                return Err(Error::invalid_request(format!(
                    "argument `{}` of `{owner}.{}` is required",
                    arg.name, spec.name
                )));
            }
            None | Some(Value::Null) => {}
            Some(value) if !arg.ty.accepts(value) => {
                return Err(Error::invalid_request(format!(
                    "argument `{}` of `{owner}.{}` expects {}",
                    arg.name,
                    spec.name,
                    arg.ty.name()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn ensure_leaf(owner: &str, selection: &FieldSelection) -> Result<(), Error> {
    if selection.selections.is_empty() {
        Ok(())
    } else {
        Err(Error::invalid_request(format!(
            "field `{owner}.{}` is a scalar and cannot have subfields",
            selection.name
        )))
    }
}

fn unknown_field(owner: &str, name: &str) -> Error {
    Error::invalid_request(format!("unknown field `{name}` on `{owner}`"))
}

fn unknown_argument(owner: &str, field: &str, argument: &str) -> Error {
    Error::invalid_request(format!("unknown argument `{argument}` on `{owner}.{field}`"))
}
