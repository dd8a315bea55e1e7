//! Store-backed batch loaders and the per-request loader bundle.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ports::{Collection, EntityStore, EntityStoreError};
use crate::domain::{Error, Post, User, UserId};

use super::collector::{BatchCollector, BatchLoad, BatchTarget, FlushOutcome, LookupMode};

fn batch_failure(target: BatchTarget, error: &EntityStoreError) -> Error {
    Error::batch_fetch_failure(format!(
        "{} {} lookup failed: {error}",
        target.collection, target.mode
    ))
}

/// Users looked up by primary key; one optional user per key.
pub struct UsersById {
    store: Arc<dyn EntityStore>,
}

impl UsersById {
    /// Create a loader reading from `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchLoad for UsersById {
    type Key = UserId;
    type Value = Option<User>;

    fn target(&self) -> BatchTarget {
        BatchTarget {
            collection: Collection::Users,
            mode: LookupMode::ById,
        }
    }

    async fn load(
        &self,
        keys: &BTreeSet<UserId>,
    ) -> Result<HashMap<UserId, Option<User>>, Error> {
        let users = self
            .store
            .select_users_by_ids(keys)
            .await
            .map_err(|err| batch_failure(self.target(), &err))?;
        Ok(users.into_iter().map(|user| (user.id(), Some(user))).collect())
    }
}

/// Posts grouped by their `user_id` foreign key; zero or more posts per key.
pub struct PostsByUserId {
    store: Arc<dyn EntityStore>,
}

impl PostsByUserId {
    /// Create a loader reading from `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

/// Group `posts` by author, keeping the order the store returned them in.
fn group_by_user(posts: Vec<Post>) -> HashMap<UserId, Vec<Post>> {
    let mut groups: HashMap<UserId, Vec<Post>> = HashMap::new();
    for post in posts {
        groups.entry(post.user_id()).or_default().push(post);
    }
    groups
}

#[async_trait]
impl BatchLoad for PostsByUserId {
    type Key = UserId;
    type Value = Vec<Post>;

    fn target(&self) -> BatchTarget {
        BatchTarget {
            collection: Collection::Posts,
            mode: LookupMode::ByForeignKeyGroup,
        }
    }

    async fn load(&self, keys: &BTreeSet<UserId>) -> Result<HashMap<UserId, Vec<Post>>, Error> {
        let posts = self
            .store
            .select_posts_by_user_ids(keys)
            .await
            .map_err(|err| batch_failure(self.target(), &err))?;
        Ok(group_by_user(posts))
    }
}

/// Every batch collector used while resolving one request.
///
/// Built fresh for each request so keys from unrelated requests never share a
/// batch or a result.
pub struct RequestLoaders {
    users_by_id: BatchCollector<UsersById>,
    posts_by_user_id: BatchCollector<PostsByUserId>,
}

impl RequestLoaders {
    /// Create empty collectors reading from `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            users_by_id: BatchCollector::new(UsersById::new(Arc::clone(&store))),
            posts_by_user_id: BatchCollector::new(PostsByUserId::new(store)),
        }
    }

    /// Collector for users keyed by id.
    pub fn users_by_id(&self) -> &BatchCollector<UsersById> {
        &self.users_by_id
    }

    /// Collector for posts grouped by author id.
    pub fn posts_by_user_id(&self) -> &BatchCollector<PostsByUserId> {
        &self.posts_by_user_id
    }

    /// True when any collector holds registrations.
    pub fn has_pending(&self) -> bool {
        self.users_by_id.has_pending() || self.posts_by_user_id.has_pending()
    }

    /// Flush every collector with pending registrations, concurrently.
    ///
    /// Returns one outcome per store call issued.
    pub async fn flush_all(&self) -> Vec<FlushOutcome> {
        let (users, posts) =
            futures_util::join!(self.users_by_id.flush(), self.posts_by_user_id.flush());
        [users, posts]
            .into_iter()
            .filter(FlushOutcome::dispatched)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockEntityStore;
    use crate::domain::{ErrorCode, PostId, UserName};
    use rstest::rstest;

    fn user(id: i32, name: &str) -> User {
        User::new(UserId::new(id), UserName::new(name).expect("valid name"))
    }

    fn post(id: i32, user_id: i32) -> Post {
        Post::new(
            PostId::new(id),
            format!("title {id}"),
            format!("content {id}"),
            UserId::new(user_id),
        )
    }

    #[rstest]
    fn grouping_preserves_store_order() {
        let groups = group_by_user(vec![post(1, 7), post(2, 8), post(3, 7)]);
        assert_eq!(groups.get(&UserId::new(7)), Some(&vec![post(1, 7), post(3, 7)]));
        assert_eq!(groups.get(&UserId::new(8)), Some(&vec![post(2, 8)]));
    }

    #[tokio::test]
    async fn users_by_id_issues_one_call_for_all_keys() {
        let mut store = MockEntityStore::new();
        store
            .expect_select_users_by_ids()
            .withf(|ids| ids == &BTreeSet::from([UserId::new(1), UserId::new(2)]))
            .times(1)
            .returning(|_| Ok(vec![user(1, "ada")]));
        let loaders = RequestLoaders::new(Arc::new(store));

        let found = loaders.users_by_id().register(UserId::new(1));
        let missing = loaders.users_by_id().register(UserId::new(2));
        let outcomes = loaders.flush_all().await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(found.await, Ok(Some(user(1, "ada"))));
        assert_eq!(missing.await, Ok(None));
    }

    #[tokio::test]
    async fn posts_by_user_id_returns_empty_groups_for_childless_users() {
        let mut store = MockEntityStore::new();
        store
            .expect_select_posts_by_user_ids()
            .times(1)
            .returning(|_| Ok(vec![post(10, 1), post(11, 1)]));
        let loaders = RequestLoaders::new(Arc::new(store));

        let with_posts = loaders.posts_by_user_id().register(UserId::new(1));
        let without = loaders.posts_by_user_id().register(UserId::new(2));
        loaders.flush_all().await;

        assert_eq!(with_posts.await, Ok(vec![post(10, 1), post(11, 1)]));
        assert_eq!(without.await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn store_errors_become_batch_fetch_failures() {
        let mut store = MockEntityStore::new();
        store
            .expect_select_users_by_ids()
            .times(1)
            .returning(|_| Err(EntityStoreError::connection("database unavailable")));
        let loaders = RequestLoaders::new(Arc::new(store));

        let pending = loaders.users_by_id().register(UserId::new(1));
        let outcomes = loaders.flush_all().await;

        assert!(outcomes.iter().all(|outcome| outcome.failed));
        let err = pending.await.expect_err("flush failure propagates");
        assert_eq!(err.code(), ErrorCode::BatchFetchFailure);
        assert!(err.message().contains("users by-id-one"));
    }

    #[tokio::test]
    async fn idle_loaders_issue_no_store_calls() {
        let loaders = RequestLoaders::new(Arc::new(MockEntityStore::new()));
        assert!(!loaders.has_pending());
        assert!(loaders.flush_all().await.is_empty());
    }
}
