//! Relation resolvers.
//!
//! Each resolver only declares the key it needs; the store is reached through
//! the batch collectors once the executor flushes them.

use crate::domain::batch::{Deferred, RequestLoaders};
use crate::domain::{Post, User};

/// `Post.author`: the user referenced by `post.user_id`, absent when the
/// reference dangles.
pub fn post_author(post: &Post, loaders: &RequestLoaders) -> Deferred<Option<User>> {
    loaders.users_by_id().register(post.user_id())
}

/// `User.posts`: every post whose `user_id` is `user.id`, in store order.
pub fn user_posts(user: &User, loaders: &RequestLoaders) -> Deferred<Vec<Post>> {
    loaders.posts_by_user_id().register(user.id())
}
