//! Tier executor.
//!
//! Resolution proceeds one tier at a time:
//!
//! 1. every object of the tier writes its scalar fields and registers its
//!    relation fields with the request's batch collectors;
//! 2. every collector with pending keys is flushed once, concurrently;
//! 3. every registrant resumes with its own value and the objects it produced
//!    form the next tier.
//!
//! The barrier between steps 1 and 2 is what bounds store traffic to one call
//! per (collection, mode) per tier.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::domain::batch::{Deferred, RequestLoaders};
use crate::domain::ports::EntityStore;
use crate::domain::{Error, Post, PostChanges, PostId, User, UserId};

use super::document::{FieldSelection, Operation, OperationKind};
use super::relations::{post_author, user_posts};
use super::response::{
    ExecutionResult, FieldError, FieldRef, OutValue, PathSegment, ResponseTree, SlotId,
};
use super::root::RootResolver;
use super::schema::{
    FieldDescriptor, ObjectType, Relation, RootField, ScalarField, Schema, TYPENAME_FIELD,
};

/// A loaded record waiting to be rendered.
#[derive(Debug, Clone)]
enum Entity {
    User(User),
    Post(Post),
}

impl Entity {
    fn object_type(&self) -> ObjectType {
        match self {
            Self::User(_) => ObjectType::User,
            Self::Post(_) => ObjectType::Post,
        }
    }

    fn scalar(&self, field: ScalarField) -> Value {
        match (self, field) {
            (_, ScalarField::TypeName) => json!(self.object_type().name()),
            (Self::User(user), ScalarField::UserId) => json!(user.id().get().to_string()),
            (Self::User(user), ScalarField::UserName) => json!(user.name().as_ref()),
            (Self::Post(post), ScalarField::PostId) => json!(post.id().get().to_string()),
            (Self::Post(post), ScalarField::PostTitle) => json!(post.title()),
            (Self::Post(post), ScalarField::PostContent) => json!(post.content()),
            (Self::Post(post), ScalarField::PostUserId) => json!(post.user_id().get()),
            _ => Value::Null,
        }
    }
}

/// Value produced by a root field.
enum RootValue {
    TypeName(&'static str),
    One(Option<Entity>),
    Many(Vec<Entity>),
}

/// Relation value registered in phase one and awaited in phase three.
enum PendingValue {
    Author(Deferred<Option<User>>),
    Posts(Deferred<Vec<Post>>),
}

/// An object whose slot exists but whose fields are not yet resolved.
struct PendingObject<'op> {
    slot: SlotId,
    entity: Entity,
    selections: &'op [FieldSelection],
    path: Vec<PathSegment>,
}

/// A relation field registered with a collector.
struct Registration<'op> {
    field: FieldRef,
    selections: &'op [FieldSelection],
    path: Vec<PathSegment>,
    pending: PendingValue,
}

/// Typed view over validated argument values.
struct Arguments<'a>(&'a Map<String, Value>);

impl Arguments<'_> {
    fn optional_int(&self, name: &str) -> Result<Option<i32>, Error> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .and_then(|raw| i32::try_from(raw).ok())
                .map(Some)
                .ok_or_else(|| Error::invalid_request(format!("argument `{name}` expects Int"))),
        }
    }

    fn int(&self, name: &str) -> Result<i32, Error> {
        self.optional_int(name)?
            .ok_or_else(|| Error::invalid_request(format!("argument `{name}` is required")))
    }

    fn optional_string(&self, name: &str) -> Result<Option<String>, Error> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(Error::invalid_request(format!(
                "argument `{name}` expects String"
            ))),
        }
    }

    fn string(&self, name: &str) -> Result<String, Error> {
        self.optional_string(name)?
            .ok_or_else(|| Error::invalid_request(format!("argument `{name}` is required")))
    }
}

fn child_path(parent: &[PathSegment], segment: impl Into<PathSegment>) -> Vec<PathSegment> {
    let mut path = Vec::with_capacity(parent.len() + 1);
    path.extend_from_slice(parent);
    path.push(segment.into());
    path
}

/// Executes validated operations against the entity store.
pub struct Executor {
    schema: Arc<Schema>,
    store: Arc<dyn EntityStore>,
    root: RootResolver,
}

impl Executor {
    /// Create an executor sharing `schema` and `store` across requests.
    pub fn new(schema: Arc<Schema>, store: Arc<dyn EntityStore>) -> Self {
        let root = RootResolver::new(Arc::clone(&store));
        Self {
            schema,
            store,
            root,
        }
    }

    /// Resolver tables used to validate operations.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate and execute `operation`.
    ///
    /// Query root fields run concurrently; mutation root fields run one after
    /// another, each fully resolved before the next starts. Field failures are
    /// reported in [`ExecutionResult::errors`] with the field set to `null`.
    ///
    /// # Errors
    /// Returns `invalid_request` when the operation does not fit the schema.
    /// Nothing is executed in that case.
    pub async fn execute(&self, operation: &Operation) -> Result<ExecutionResult, Error> {
        self.schema.validate(operation)?;

        // Fresh collectors per request keep batches from mixing across callers.
        let loaders = RequestLoaders::new(Arc::clone(&self.store));
        let mut tree = ResponseTree::new();
        let mut errors = Vec::new();

        match operation.kind {
            OperationKind::Query => {
                let values = join_all(
                    operation
                        .selections
                        .iter()
                        .map(|selection| self.resolve_root(operation.kind, selection)),
                )
                .await;
                let mut frontier = Vec::new();
                for (selection, value) in operation.selections.iter().zip(values) {
                    place_root(&mut tree, selection, value, &mut frontier, &mut errors);
                }
                self.resolve_tiers(&loaders, &mut tree, frontier, &mut errors)
                    .await;
            }
            OperationKind::Mutation => {
                for selection in &operation.selections {
                    let value = self.resolve_root(operation.kind, selection).await;
                    let mut frontier = Vec::new();
                    place_root(&mut tree, selection, value, &mut frontier, &mut errors);
                    self.resolve_tiers(&loaders, &mut tree, frontier, &mut errors)
                        .await;
                }
            }
        }

        Ok(ExecutionResult {
            data: tree.into_value(),
            errors,
        })
    }

    async fn resolve_root(
        &self,
        kind: OperationKind,
        selection: &FieldSelection,
    ) -> Result<RootValue, Error> {
        if selection.name == TYPENAME_FIELD {
            return Ok(RootValue::TypeName(kind.type_name()));
        }
        let spec = self
            .schema
            .root_field(kind, &selection.name)
            .ok_or_else(|| Error::internal(format!("no resolver for `{}`", selection.name)))?;
        let args = Arguments(&selection.arguments);

        let value = match spec.field {
            RootField::Users => {
                let users = self.root.list_users().await?;
                RootValue::Many(users.into_iter().map(Entity::User).collect())
            }
            RootField::Posts => {
                let posts = self.root.list_posts().await?;
                RootValue::Many(posts.into_iter().map(Entity::Post).collect())
            }
            RootField::User => RootValue::One(
                self.root
                    .get_user(UserId::new(args.int("id")?))
                    .await?
                    .map(Entity::User),
            ),
            RootField::Post => RootValue::One(
                self.root
                    .get_post(PostId::new(args.int("id")?))
                    .await?
                    .map(Entity::Post),
            ),
            RootField::CreateUser => {
                let user = self.root.create_user(args.string("name")?).await?;
                RootValue::One(Some(Entity::User(user)))
            }
            RootField::CreatePost => {
                let post = self
                    .root
                    .create_post(
                        args.string("title")?,
                        args.string("content")?,
                        UserId::new(args.int("userId")?),
                    )
                    .await?;
                RootValue::One(Some(Entity::Post(post)))
            }
            RootField::UpdateUser => {
                let user = self
                    .root
                    .update_user(UserId::new(args.int("id")?), args.optional_string("name")?)
                    .await?;
                RootValue::One(Some(Entity::User(user)))
            }
            RootField::UpdatePost => {
                let changes = PostChanges {
                    title: args.optional_string("title")?,
                    content: args.optional_string("content")?,
                    user_id: args.optional_int("userId")?.map(UserId::new),
                };
                let post = self
                    .root
                    .update_post(PostId::new(args.int("id")?), changes)
                    .await?;
                RootValue::One(Some(Entity::Post(post)))
            }
        };
        Ok(value)
    }

    async fn resolve_tiers<'op>(
        &self,
        loaders: &RequestLoaders,
        tree: &mut ResponseTree,
        mut frontier: Vec<PendingObject<'op>>,
        errors: &mut Vec<FieldError>,
    ) {
        let mut tier = 0_usize;
        while !frontier.is_empty() {
            let objects = frontier.len();
            let mut registrations = Vec::new();
            for object in frontier.drain(..) {
                self.register_fields(loaders, tree, object, &mut registrations, errors);
            }

            let outcomes = loaders.flush_all().await;
            debug!(
                tier,
                objects,
                registrations = registrations.len(),
                store_calls = outcomes.len(),
                "tier flushed"
            );

            for registration in registrations {
                resume(tree, registration, &mut frontier, errors).await;
            }
            tier += 1;
        }
    }

    /// Phase one: write scalars and register relation keys.
    fn register_fields<'op>(
        &self,
        loaders: &RequestLoaders,
        tree: &mut ResponseTree,
        object: PendingObject<'op>,
        registrations: &mut Vec<Registration<'op>>,
        errors: &mut Vec<FieldError>,
    ) {
        let object_type = object.entity.object_type();
        for selection in object.selections {
            let key = selection.response_key();
            match self.schema.object_field(object_type, &selection.name) {
                Some(FieldDescriptor::Scalar(scalar)) => {
                    tree.push(object.slot, key, OutValue::Leaf(object.entity.scalar(scalar)));
                }
                Some(FieldDescriptor::Relation(relation)) => {
                    let pending = match (relation, &object.entity) {
                        (Relation::PostAuthor, Entity::Post(post)) => {
                            PendingValue::Author(post_author(post, loaders))
                        }
                        (Relation::UserPosts, Entity::User(user)) => {
                            PendingValue::Posts(user_posts(user, loaders))
                        }
                        _ => {
                            tree.push(object.slot, key, OutValue::NULL);
                            errors.push(FieldError::new(
                                &Error::internal(format!(
                                    "relation `{}` does not apply to `{object_type}`",
                                    selection.name
                                )),
                                child_path(&object.path, key),
                            ));
                            continue;
                        }
                    };
                    registrations.push(Registration {
                        field: tree.push(object.slot, key, OutValue::NULL),
                        selections: &selection.selections,
                        path: child_path(&object.path, key),
                        pending,
                    });
                }
                None => {
                    tree.push(object.slot, key, OutValue::NULL);
                    errors.push(FieldError::new(
                        &Error::internal(format!(
                            "no resolver for `{object_type}.{}`",
                            selection.name
                        )),
                        child_path(&object.path, key),
                    ));
                }
            }
        }
    }
}

/// Write a root field's value and queue the objects it produced.
fn place_root<'op>(
    tree: &mut ResponseTree,
    selection: &'op FieldSelection,
    value: Result<RootValue, Error>,
    frontier: &mut Vec<PendingObject<'op>>,
    errors: &mut Vec<FieldError>,
) {
    let key = selection.response_key();
    let path = vec![PathSegment::from(key)];
    let out = match value {
        Ok(RootValue::TypeName(name)) => OutValue::Leaf(json!(name)),
        Ok(RootValue::One(entity)) => {
            place_entity(tree, entity, &selection.selections, path, frontier)
        }
        Ok(RootValue::Many(entities)) => {
            place_list(tree, entities, &selection.selections, &path, frontier)
        }
        Err(error) => {
            errors.push(FieldError::new(&error, path));
            OutValue::NULL
        }
    };
    tree.push(ResponseTree::root(), key, out);
}

fn place_entity<'op>(
    tree: &mut ResponseTree,
    entity: Option<Entity>,
    selections: &'op [FieldSelection],
    path: Vec<PathSegment>,
    frontier: &mut Vec<PendingObject<'op>>,
) -> OutValue {
    let Some(entity) = entity else {
        return OutValue::NULL;
    };
    let slot = tree.alloc();
    frontier.push(PendingObject {
        slot,
        entity,
        selections,
        path,
    });
    OutValue::Object(slot)
}

fn place_list<'op>(
    tree: &mut ResponseTree,
    entities: Vec<Entity>,
    selections: &'op [FieldSelection],
    path: &[PathSegment],
    frontier: &mut Vec<PendingObject<'op>>,
) -> OutValue {
    OutValue::List(
        entities
            .into_iter()
            .enumerate()
            .map(|(index, entity)| {
                place_entity(
                    tree,
                    Some(entity),
                    selections,
                    child_path(path, index),
                    frontier,
                )
            })
            .collect(),
    )
}

/// Phase three: await a flushed registration and fill its field.
async fn resume<'op>(
    tree: &mut ResponseTree,
    registration: Registration<'op>,
    frontier: &mut Vec<PendingObject<'op>>,
    errors: &mut Vec<FieldError>,
) {
    let Registration {
        field,
        selections,
        path,
        pending,
    } = registration;
    let resolved = match pending {
        PendingValue::Author(deferred) => deferred.await.map(|author| {
            let entity = author.map(Entity::User);
            place_entity(tree, entity, selections, path.clone(), frontier)
        }),
        PendingValue::Posts(deferred) => deferred.await.map(|posts| {
            let entities = posts.into_iter().map(Entity::Post).collect();
            place_list(tree, entities, selections, &path, frontier)
        }),
    };
    match resolved {
        Ok(value) => tree.set(field, value),
        Err(error) => errors.push(FieldError::new(&error, path)),
    }
}
