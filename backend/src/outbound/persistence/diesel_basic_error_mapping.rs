//! Diesel and pool error mapping for the entity store adapter.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::EntityStoreError;

use super::pool::PoolError;

/// Map pool failures to connection errors.
pub(super) fn map_pool_error(error: PoolError) -> EntityStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            EntityStoreError::connection(message)
        }
    }
}

/// Map Diesel errors onto store errors without leaking SQL text.
///
/// Constraint failures keep the database message, which names the violated
/// constraint but never the statement.
pub(super) fn map_diesel_error(error: DieselError) -> EntityStoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation,
            info,
        ) => EntityStoreError::constraint_violation(info.message()),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            EntityStoreError::connection("database connection error")
        }
        DieselError::NotFound => EntityStoreError::query("record not found"),
        DieselError::QueryBuilderError(_) => EntityStoreError::query("database query error"),
        DieselError::DatabaseError(_, _) => EntityStoreError::query("database error"),
        _ => EntityStoreError::query("database error"),
    }
}
