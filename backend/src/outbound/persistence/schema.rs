//! Diesel table definitions for the SQLite schema.
//!
//! These definitions must match the migrations under `backend/migrations`
//! exactly. `diesel print-schema` against a migrated database regenerates
//! them.

diesel::table! {
    /// Registered users. `name` carries a unique index.
    users (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    /// Posts, each owned by one user through `user_id`.
    posts (id) {
        id -> Integer,
        title -> Text,
        content -> Text,
        /// Foreign key to `users.id`, indexed for group lookups.
        user_id -> Integer,
    }
}

diesel::joinable!(posts -> users (user_id));
diesel::allow_tables_to_appear_in_same_query!(posts, users);
