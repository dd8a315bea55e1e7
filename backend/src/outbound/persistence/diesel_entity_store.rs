//! SQLite-backed `EntityStore` implementation using Diesel ORM.
//!
//! Each method checks out one pooled connection and issues exactly one
//! statement, except updates with no present fields, which read the current
//! row instead.

use std::collections::BTreeSet;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::warn;

use crate::domain::ports::{Collection, EntityStore, EntityStoreError};
use crate::domain::{
    NewPost, NewUser, Post, PostChanges, PostId, User, UserChanges, UserId, UserName,
};

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{NewPostRow, NewUserRow, PostRow, PostUpdate, UserRow, UserUpdate};
use super::pool::DbPool;
use super::schema::{posts, users};

/// Diesel-backed implementation of the `EntityStore` port.
#[derive(Clone)]
pub struct DieselEntityStore {
    pool: DbPool,
}

impl DieselEntityStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Convert a database row to a domain user.
fn row_to_user(row: UserRow) -> Result<User, EntityStoreError> {
    let name = UserName::new(row.name).map_err(|err| {
        warn!(user_id = row.id, error = %err, "stored user row failed validation");
        EntityStoreError::query(format!("user {} has an invalid name", row.id))
    })?;
    Ok(User::new(UserId::new(row.id), name))
}

fn row_to_post(row: PostRow) -> Post {
    Post::new(
        PostId::new(row.id),
        row.title,
        row.content,
        UserId::new(row.user_id),
    )
}

fn rows_to_users(rows: Vec<UserRow>) -> Result<Vec<User>, EntityStoreError> {
    rows.into_iter().map(row_to_user).collect()
}

fn raw_ids(ids: &BTreeSet<UserId>) -> Vec<i32> {
    ids.iter().map(|id| id.get()).collect()
}

fn not_found(collection: Collection, id: i32) -> EntityStoreError {
    EntityStoreError::not_found(collection.table_name(), id)
}

#[async_trait]
impl EntityStore for DieselEntityStore {
    async fn select_all_users(&self) -> Result<Vec<User>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = users::table
            .order(users::id.asc())
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_users(rows)
    }

    async fn select_all_posts(&self) -> Result<Vec<Post>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = posts::table
            .order(posts::id.asc())
            .select(PostRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(row_to_post).collect())
    }

    async fn select_users_by_ids(
        &self,
        ids: &BTreeSet<UserId>,
    ) -> Result<Vec<User>, EntityStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = users::table
            .filter(users::id.eq_any(raw_ids(ids)))
            .order(users::id.asc())
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_users(rows)
    }

    async fn select_posts_by_user_ids(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<Post>, EntityStoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = posts::table
            .filter(posts::user_id.eq_any(raw_ids(user_ids)))
            .order(posts::id.asc())
            .select(PostRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(row_to_post).collect())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .find(id.get())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user).transpose()
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<PostRow> = posts::table
            .find(id.get())
            .select(PostRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(row_to_post))
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::insert_into(users::table)
            .values(&NewUserRow {
                name: user.name.as_ref(),
            })
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_user(row)
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::insert_into(posts::table)
            .values(&NewPostRow {
                title: &post.title,
                content: &post.content,
                user_id: post.user_id.get(),
            })
            .returning(PostRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row_to_post(row))
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<User, EntityStoreError> {
        if changes.is_empty() {
            return self
                .find_user(id)
                .await?
                .ok_or_else(|| not_found(Collection::Users, id.get()));
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let update = UserUpdate {
            name: changes.name.as_ref().map(AsRef::as_ref),
        };
        let row: Option<UserRow> = diesel::update(users::table.find(id.get()))
            .set(&update)
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user)
            .transpose()?
            .ok_or_else(|| not_found(Collection::Users, id.get()))
    }

    async fn update_post(
        &self,
        id: PostId,
        changes: &PostChanges,
    ) -> Result<Post, EntityStoreError> {
        if changes.is_empty() {
            return self
                .find_post(id)
                .await?
                .ok_or_else(|| not_found(Collection::Posts, id.get()));
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let update = PostUpdate {
            title: changes.title.as_deref(),
            content: changes.content.as_deref(),
            user_id: changes.user_id.map(UserId::get),
        };
        let row: Option<PostRow> = diesel::update(posts::table.find(id.get()))
            .set(&update)
            .returning(PostRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_post)
            .ok_or_else(|| not_found(Collection::Posts, id.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn blank_stored_names_become_query_errors() {
        let err = row_to_user(UserRow {
            id: 4,
            name: "  ".to_owned(),
        })
        .expect_err("blank name");
        assert_eq!(err, EntityStoreError::query("user 4 has an invalid name"));
    }

    #[rstest]
    fn post_rows_convert_field_by_field() {
        let post = row_to_post(PostRow {
            id: 2,
            title: "t".to_owned(),
            content: "c".to_owned(),
            user_id: 9,
        });
        assert_eq!(
            post,
            Post::new(PostId::new(2), "t".to_owned(), "c".to_owned(), UserId::new(9))
        );
    }

    #[rstest]
    fn missing_rows_name_their_collection() {
        assert_eq!(
            not_found(Collection::Posts, 5).to_string(),
            "posts record 5 not found"
        );
    }
}
