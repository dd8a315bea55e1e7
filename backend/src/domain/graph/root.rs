//! Request root: list, point lookup, create and update entry points.
//!
//! Root operations hit the store directly; only relation fields go through the
//! batch collectors.

use std::sync::Arc;

use tracing::debug;

use crate::domain::ports::{EntityStore, EntityStoreError};
use crate::domain::{
    Error, NewPost, NewUser, Post, PostChanges, PostId, User, UserChanges, UserId, UserName,
};

/// Map a store failure onto the domain error a client sees.
pub(crate) fn map_store_error(error: EntityStoreError) -> Error {
    debug!(error = %error, "entity store call failed");
    match error {
        EntityStoreError::Connection { .. } => {
            Error::service_unavailable("entity store is unavailable")
        }
        EntityStoreError::Query { .. } => Error::internal(error.to_string()),
        EntityStoreError::ConstraintViolation { message } => Error::constraint_violation(message),
        EntityStoreError::NotFound { collection, id } => {
            Error::not_found(format!("{collection} record {id} not found"))
        }
    }
}

fn parse_name(raw: String) -> Result<UserName, Error> {
    UserName::new(raw).map_err(|err| Error::invalid_request(err.to_string()))
}

/// Root entry points over the entity store.
#[derive(Clone)]
pub struct RootResolver {
    store: Arc<dyn EntityStore>,
}

impl RootResolver {
    /// Create a resolver reading and writing through `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Every user.
    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        self.store.select_all_users().await.map_err(map_store_error)
    }

    /// Every post.
    pub async fn list_posts(&self) -> Result<Vec<Post>, Error> {
        self.store.select_all_posts().await.map_err(map_store_error)
    }

    /// One user, or `None` when the id is unknown.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, Error> {
        self.store.find_user(id).await.map_err(map_store_error)
    }

    /// One post, or `None` when the id is unknown.
    pub async fn get_post(&self, id: PostId) -> Result<Option<Post>, Error> {
        self.store.find_post(id).await.map_err(map_store_error)
    }

    /// Insert a user.
    ///
    /// # Errors
    /// `invalid_request` for a blank name and `constraint_violation` when the
    /// name is already taken.
    pub async fn create_user(&self, name: String) -> Result<User, Error> {
        let user = NewUser {
            name: parse_name(name)?,
        };
        self.store.insert_user(&user).await.map_err(map_store_error)
    }

    /// Insert a post.
    ///
    /// # Errors
    /// `constraint_violation` when `user_id` references no user.
    pub async fn create_post(
        &self,
        title: String,
        content: String,
        user_id: UserId,
    ) -> Result<Post, Error> {
        let post = NewPost {
            title,
            content,
            user_id,
        };
        self.store.insert_post(&post).await.map_err(map_store_error)
    }

    /// Rename a user when `name` is present.
    ///
    /// # Errors
    /// `not_found` for an unknown id, `invalid_request` for a blank name and
    /// `constraint_violation` for a name owned by another user.
    pub async fn update_user(&self, id: UserId, name: Option<String>) -> Result<User, Error> {
        let changes = UserChanges {
            name: name.map(parse_name).transpose()?,
        };
        self.store
            .update_user(id, &changes)
            .await
            .map_err(map_store_error)
    }

    /// Apply the present fields of `changes` to a post.
    ///
    /// # Errors
    /// `not_found` for an unknown id and `constraint_violation` when the new
    /// `user_id` references no user.
    pub async fn update_post(&self, id: PostId, changes: PostChanges) -> Result<Post, Error> {
        self.store
            .update_post(id, &changes)
            .await
            .map_err(map_store_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::MockEntityStore;
    use mockall::predicate::eq;
    use rstest::rstest;

    fn user(id: i32, name: &str) -> User {
        User::new(UserId::new(id), UserName::new(name).expect("valid name"))
    }

    fn resolver(store: MockEntityStore) -> RootResolver {
        RootResolver::new(Arc::new(store))
    }

    #[rstest]
    #[case(EntityStoreError::connection("refused"), ErrorCode::ServiceUnavailable)]
    #[case(EntityStoreError::query("bad row"), ErrorCode::InternalError)]
    #[case(
        EntityStoreError::constraint_violation("UNIQUE constraint failed: users.name"),
        ErrorCode::ConstraintViolation
    )]
    #[case(EntityStoreError::not_found("users", 7), ErrorCode::NotFound)]
    fn store_errors_map_to_codes(#[case] error: EntityStoreError, #[case] code: ErrorCode) {
        assert_eq!(map_store_error(error).code(), code);
    }

    #[rstest]
    #[tokio::test]
    async fn get_user_returns_none_for_unknown_ids() {
        let mut store = MockEntityStore::new();
        store
            .expect_find_user()
            .with(eq(UserId::new(42)))
            .times(1)
            .returning(|_| Ok(None));

        let found = resolver(store).get_user(UserId::new(42)).await;

        assert_eq!(found, Ok(None));
    }

    #[rstest]
    #[tokio::test]
    async fn create_user_rejects_blank_names_without_touching_the_store() {
        let mut store = MockEntityStore::new();
        store.expect_insert_user().never();

        let err = resolver(store)
            .create_user("   ".to_owned())
            .await
            .expect_err("blank name");

        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn create_user_surfaces_duplicate_names() {
        let mut store = MockEntityStore::new();
        store
            .expect_insert_user()
            .times(1)
            .returning(|_| Err(EntityStoreError::constraint_violation("name taken")));

        let err = resolver(store)
            .create_user("ada".to_owned())
            .await
            .expect_err("duplicate");

        assert_eq!(err.code(), ErrorCode::ConstraintViolation);
    }

    #[rstest]
    #[tokio::test]
    async fn update_user_without_name_sends_empty_changes() {
        let mut store = MockEntityStore::new();
        store
            .expect_update_user()
            .withf(|id, changes| *id == UserId::new(1) && changes.is_empty())
            .times(1)
            .returning(|id, _| Ok(user(id.get(), "ada")));

        let updated = resolver(store).update_user(UserId::new(1), None).await;

        assert_eq!(updated, Ok(user(1, "ada")));
    }

    #[rstest]
    #[tokio::test]
    async fn update_user_reports_missing_ids() {
        let mut store = MockEntityStore::new();
        store
            .expect_update_user()
            .returning(|id, _| Err(EntityStoreError::not_found("users", id.get())));

        let err = resolver(store)
            .update_user(UserId::new(999_999), Some("x".to_owned()))
            .await
            .expect_err("missing user");

        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.message(), "users record 999999 not found");
    }

    #[rstest]
    #[tokio::test]
    async fn connection_failures_become_service_unavailable() {
        let mut store = MockEntityStore::new();
        store
            .expect_select_all_posts()
            .returning(|| Err(EntityStoreError::connection("pool timed out")));

        let err = resolver(store).list_posts().await.expect_err("offline");

        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }
}
