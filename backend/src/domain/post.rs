//! Post data model.

use std::fmt;

use super::UserId;

/// Primary key of the `posts` collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostId(i32);

impl PostId {
    /// Wrap a raw database identifier.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw identifier as stored.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored post.
///
/// ## Invariants
/// - `user_id` referenced an existing user when the post was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    id: PostId,
    title: String,
    content: String,
    user_id: UserId,
}

impl Post {
    /// Build a post from stored parts.
    #[must_use]
    pub fn new(id: PostId, title: String, content: String, user_id: UserId) -> Self {
        Self {
            id,
            title,
            content,
            user_id,
        }
    }

    /// Primary key.
    #[must_use]
    pub fn id(&self) -> PostId {
        self.id
    }

    /// Post title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Post body.
    #[must_use]
    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    /// Foreign key to the authoring user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Insert payload for a post; the id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub user_id: UserId,
}

/// Partial update for a post. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub user_id: Option<UserId>,
}

impl PostChanges {
    /// True when no field would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.user_id.is_none()
    }
}
