//! Port abstraction over the relational store holding users and posts.
//!
//! Adapters own the storage engine (SQLite via Diesel in production, an
//! in-memory double in tests). The port exposes exactly the access paths the
//! request root and the batch loaders need: full scans, set lookups by key,
//! point lookups, inserts and partial updates.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

use crate::domain::{NewPost, NewUser, Post, PostChanges, PostId, User, UserChanges, UserId};

use super::define_port_error;

/// Named collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Posts,
}

impl Collection {
    /// Table name backing the collection.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Posts => "posts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

define_port_error! {
    /// Errors raised by entity store adapters.
    pub enum EntityStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "entity store connection failed: {message}",
        /// Query or mutation failed during execution or row conversion.
        Query { message: String } => "entity store query failed: {message}",
        /// A uniqueness or foreign key constraint rejected the write.
        ConstraintViolation { message: String } => "constraint violated: {message}",
        /// The row targeted by an update does not exist.
        NotFound { collection: String, id: i32 } => "{collection} record {id} not found",
    }
}

/// Store access used by the request root and the batch loaders.
///
/// Every method is a single attempt; adapters never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every user, in primary key order.
    async fn select_all_users(&self) -> Result<Vec<User>, EntityStoreError>;

    /// Every post, in primary key order.
    async fn select_all_posts(&self) -> Result<Vec<Post>, EntityStoreError>;

    /// Users whose id is in `ids`. Unknown ids are simply absent.
    async fn select_users_by_ids(
        &self,
        ids: &BTreeSet<UserId>,
    ) -> Result<Vec<User>, EntityStoreError>;

    /// Posts whose `user_id` is in `user_ids`, in primary key order.
    async fn select_posts_by_user_ids(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<Post>, EntityStoreError>;

    /// Point lookup of one user.
    async fn find_user(&self, id: UserId) -> Result<Option<User>, EntityStoreError>;

    /// Point lookup of one post.
    async fn find_post(&self, id: PostId) -> Result<Option<Post>, EntityStoreError>;

    /// Insert a user and return the stored row.
    ///
    /// Fails with [`EntityStoreError::ConstraintViolation`] when the name is
    /// already taken.
    async fn insert_user(&self, user: &NewUser) -> Result<User, EntityStoreError>;

    /// Insert a post and return the stored row.
    ///
    /// Fails with [`EntityStoreError::ConstraintViolation`] when `user_id`
    /// references no user.
    async fn insert_post(&self, post: &NewPost) -> Result<Post, EntityStoreError>;

    /// Apply the present fields of `changes` and return the updated row.
    ///
    /// Fails with [`EntityStoreError::NotFound`] when `id` does not exist.
    async fn update_user(
        &self,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<User, EntityStoreError>;

    /// Apply the present fields of `changes` and return the updated row.
    ///
    /// Fails with [`EntityStoreError::NotFound`] when `id` does not exist and
    /// with [`EntityStoreError::ConstraintViolation`] for a dangling `user_id`.
    async fn update_post(
        &self,
        id: PostId,
        changes: &PostChanges,
    ) -> Result<Post, EntityStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn not_found_names_collection_and_id() {
        let err = EntityStoreError::not_found(Collection::Users.table_name(), 42);
        assert_eq!(err.to_string(), "users record 42 not found");
    }

    #[rstest]
    #[case(Collection::Users, "users")]
    #[case(Collection::Posts, "posts")]
    fn collections_map_to_tables(#[case] collection: Collection, #[case] table: &str) {
        assert_eq!(collection.to_string(), table);
    }
}
