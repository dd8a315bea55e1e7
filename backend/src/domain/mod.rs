//! Domain primitives, ports and query execution.
//!
//! Purpose: define the users/posts model, the store port, the batch
//! collectors and the executor that resolves queries against them. Nothing in
//! here knows about HTTP or Diesel.
//!
//! Public surface:
//! - `Error`: error payload with a stable code.
//! - User, Post and their identifiers, insert payloads and partial updates.
//! - `ports::EntityStore`: store port implemented by outbound adapters.
//! - `graph::Executor`: validates and executes operations.

pub mod batch;
pub mod error;
pub mod graph;
pub mod ports;
pub mod post;
pub mod trace_id;
pub mod user;

pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::post::{NewPost, Post, PostChanges, PostId};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};
pub use self::user::{NewUser, User, UserChanges, UserId, UserName, UserValidationError};

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use postboard::domain::{DomainResult, Error};
///
/// fn lookup() -> DomainResult<u32> {
///     Err(Error::not_found("nothing here"))
/// }
/// assert!(lookup().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
