//! Test utilities for the backend crate.
//!
//! This module provides shared helpers for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is only compiled for tests or with the
//! `test-support` feature.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{Collection, EntityStore, EntityStoreError};
use crate::domain::{
    NewPost, NewUser, Post, PostChanges, PostId, User, UserChanges, UserId, UserName,
};

/// Entity store methods, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreMethod {
    SelectAllUsers,
    SelectAllPosts,
    SelectUsersByIds,
    SelectPostsByUserIds,
    FindUser,
    FindPost,
    InsertUser,
    InsertPost,
    UpdateUser,
    UpdatePost,
}

/// One recorded store call with the keys it was given, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub method: StoreMethod,
    pub keys: Vec<i32>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    posts: BTreeMap<i32, Post>,
    next_user_id: i32,
    next_post_id: i32,
}

impl Tables {
    fn allocate_user_id(&mut self) -> UserId {
        self.next_user_id += 1;
        UserId::new(self.next_user_id)
    }

    fn allocate_post_id(&mut self) -> PostId {
        self.next_post_id += 1;
        PostId::new(self.next_post_id)
    }

    fn name_taken(&self, name: &UserName, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|user| user.name() == name && Some(user.id()) != except)
    }

    fn ensure_user_exists(&self, id: UserId) -> Result<(), EntityStoreError> {
        if self.users.contains_key(&id.get()) {
            Ok(())
        } else {
            Err(EntityStoreError::constraint_violation(
                "FOREIGN KEY constraint failed",
            ))
        }
    }
}

/// In-memory [`EntityStore`] with the same constraints as the SQLite schema.
///
/// Every call is recorded so tests can assert how many store round trips a
/// query needed.
///
/// # Examples
/// ```
/// use postboard::test_support::{InMemoryEntityStore, StoreMethod};
///
/// let store = InMemoryEntityStore::new();
/// let ada = store.seed_user("ada");
/// store.seed_post("hello", "world", ada.id());
/// assert_eq!(store.count(StoreMethod::SelectAllUsers), 0);
/// ```
#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<Tables>,
    calls: Mutex<Vec<StoreCall>>,
    failures: Mutex<HashMap<StoreMethod, EntityStoreError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly, bypassing call recording.
    ///
    /// # Panics
    /// Panics when `name` is blank.
    pub fn seed_user(&self, name: &str) -> User {
        let mut tables = lock(&self.tables);
        let id = tables.allocate_user_id();
        let user = User::new(id, UserName::new(name).expect("seeded names are valid"));
        tables.users.insert(id.get(), user.clone());
        user
    }

    /// Insert a post directly, bypassing call recording.
    ///
    /// # Panics
    /// Panics when `user_id` references no seeded user.
    pub fn seed_post(&self, title: &str, content: &str, user_id: UserId) -> Post {
        assert!(
            lock(&self.tables).users.contains_key(&user_id.get()),
            "seeded posts must reference a seeded user"
        );
        self.seed_dangling_post(title, content, user_id)
    }

    /// Insert a post without checking its foreign key, as legacy rows written
    /// before the constraint existed would be.
    pub fn seed_dangling_post(&self, title: &str, content: &str, user_id: UserId) -> Post {
        let mut tables = lock(&self.tables);
        let id = tables.allocate_post_id();
        let post = Post::new(id, title.to_owned(), content.to_owned(), user_id);
        tables.posts.insert(id.get(), post.clone());
        post
    }

    /// Make every later call to `method` fail with `error`.
    pub fn fail_on(&self, method: StoreMethod, error: EntityStoreError) {
        lock(&self.failures).insert(method, error);
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls to `method`.
    pub fn count(&self, method: StoreMethod) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(
        &self,
        method: StoreMethod,
        keys: Vec<i32>,
    ) -> Result<MutexGuard<'_, Tables>, EntityStoreError> {
        lock(&self.calls).push(StoreCall { method, keys });
        if let Some(error) = lock(&self.failures).get(&method) {
            return Err(error.clone());
        }
        Ok(lock(&self.tables))
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn select_all_users(&self) -> Result<Vec<User>, EntityStoreError> {
        let tables = self.record(StoreMethod::SelectAllUsers, Vec::new())?;
        Ok(tables.users.values().cloned().collect())
    }

    async fn select_all_posts(&self) -> Result<Vec<Post>, EntityStoreError> {
        let tables = self.record(StoreMethod::SelectAllPosts, Vec::new())?;
        Ok(tables.posts.values().cloned().collect())
    }

    async fn select_users_by_ids(
        &self,
        ids: &BTreeSet<UserId>,
    ) -> Result<Vec<User>, EntityStoreError> {
        let tables = self.record(
            StoreMethod::SelectUsersByIds,
            ids.iter().map(|id| id.get()).collect(),
        )?;
        Ok(tables
            .users
            .values()
            .filter(|user| ids.contains(&user.id()))
            .cloned()
            .collect())
    }

    async fn select_posts_by_user_ids(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<Post>, EntityStoreError> {
        let tables = self.record(
            StoreMethod::SelectPostsByUserIds,
            user_ids.iter().map(|id| id.get()).collect(),
        )?;
        Ok(tables
            .posts
            .values()
            .filter(|post| user_ids.contains(&post.user_id()))
            .cloned()
            .collect())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, EntityStoreError> {
        let tables = self.record(StoreMethod::FindUser, vec![id.get()])?;
        Ok(tables.users.get(&id.get()).cloned())
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>, EntityStoreError> {
        let tables = self.record(StoreMethod::FindPost, vec![id.get()])?;
        Ok(tables.posts.get(&id.get()).cloned())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, EntityStoreError> {
        let mut tables = self.record(StoreMethod::InsertUser, Vec::new())?;
        if tables.name_taken(&user.name, None) {
            return Err(EntityStoreError::constraint_violation(
                "UNIQUE constraint failed: users.name",
            ));
        }
        let id = tables.allocate_user_id();
        let stored = User::new(id, user.name.clone());
        tables.users.insert(id.get(), stored.clone());
        Ok(stored)
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, EntityStoreError> {
        let mut tables = self.record(StoreMethod::InsertPost, Vec::new())?;
        tables.ensure_user_exists(post.user_id)?;
        let id = tables.allocate_post_id();
        let stored = Post::new(id, post.title.clone(), post.content.clone(), post.user_id);
        tables.posts.insert(id.get(), stored.clone());
        Ok(stored)
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<User, EntityStoreError> {
        let mut tables = self.record(StoreMethod::UpdateUser, vec![id.get()])?;
        let Some(current) = tables.users.get(&id.get()).cloned() else {
            return Err(EntityStoreError::not_found(
                Collection::Users.table_name(),
                id.get(),
            ));
        };
        if let Some(name) = &changes.name {
            if tables.name_taken(name, Some(id)) {
                return Err(EntityStoreError::constraint_violation(
                    "UNIQUE constraint failed: users.name",
                ));
            }
        }
        let updated = changes
            .name
            .clone()
            .map_or(current, |name| User::new(id, name));
        tables.users.insert(id.get(), updated.clone());
        Ok(updated)
    }

    async fn update_post(
        &self,
        id: PostId,
        changes: &PostChanges,
    ) -> Result<Post, EntityStoreError> {
        let mut tables = self.record(StoreMethod::UpdatePost, vec![id.get()])?;
        let Some(current) = tables.posts.get(&id.get()).cloned() else {
            return Err(EntityStoreError::not_found(
                Collection::Posts.table_name(),
                id.get(),
            ));
        };
        if let Some(user_id) = changes.user_id {
            tables.ensure_user_exists(user_id)?;
        }
        let updated = Post::new(
            id,
            changes
                .title
                .clone()
                .unwrap_or_else(|| current.title().to_owned()),
            changes
                .content
                .clone()
                .unwrap_or_else(|| current.content().to_owned()),
            changes.user_id.unwrap_or(current.user_id()),
        );
        tables.posts.insert(id.get(), updated.clone());
        Ok(updated)
    }
}
