use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use rusqlite::{ffi, Error as RusqliteError};
use serde::Serialize;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AbsensiError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    /// A required field is missing or malformed (400)
    #[error("{0}")]
    Validation(String),

    /// Bad credentials or an invalid/expired token (401)
    #[error("{0}")]
    Auth(String),

    /// Authenticated, but the role is not allowed (403)
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Referential integrity violation. `bad_request` selects 400 over 409.
    #[error("{message}")]
    ForeignKey { message: String, bad_request: bool },

    #[error("No active academic year configured")]
    NoActiveYear,

    #[error("Error: {0}")]
    Error(String),
}

/// Kind of constraint that rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Other,
}

impl AbsensiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AbsensiError::Validation(_) | AbsensiError::NoActiveYear => StatusCode::BAD_REQUEST,
            AbsensiError::Auth(_) => StatusCode::UNAUTHORIZED,
            AbsensiError::Forbidden(_) => StatusCode::FORBIDDEN,
            AbsensiError::NotFound(_) => StatusCode::NOT_FOUND,
            AbsensiError::Conflict(_) => StatusCode::CONFLICT,
            AbsensiError::ForeignKey { bad_request, .. } => {
                if *bad_request {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::CONFLICT
                }
            }
            AbsensiError::IoError(_)
            | AbsensiError::DatabaseError(_)
            | AbsensiError::PoolError(_)
            | AbsensiError::Error(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the constraint kind if this error is a SQLite constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            AbsensiError::DatabaseError(RusqliteError::SqliteFailure(sqlite_err, _))
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Some(match sqlite_err.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        ConstraintKind::Unique
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
                    _ => ConstraintKind::Other,
                })
            }
            _ => None,
        }
    }

    /// Maps a unique-constraint violation to `Conflict(msg)`; other errors pass through.
    pub fn on_unique(self, msg: &str) -> Self {
        match self.constraint_kind() {
            Some(ConstraintKind::Unique) => AbsensiError::Conflict(msg.to_string()),
            _ => self,
        }
    }

    /// Maps a foreign-key violation to `ForeignKey`; other errors pass through.
    pub fn on_foreign_key(self, msg: &str, bad_request: bool) -> Self {
        match self.constraint_kind() {
            Some(ConstraintKind::ForeignKey) => AbsensiError::ForeignKey {
                message: msg.to_string(),
                bad_request,
            },
            _ => self,
        }
    }
}

/// Error envelope returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub success: bool,
}

impl IntoResponse for AbsensiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Unhandled error: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                message,
                success: false,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn unique_violation() -> AbsensiError {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err().into()
    }

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            AbsensiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AbsensiError::NoActiveYear.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AbsensiError::Auth("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AbsensiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AbsensiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AbsensiError::ForeignKey {
                message: "x".into(),
                bad_request: true
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AbsensiError::Error("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let err = unique_violation();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));

        let mapped = unique_violation().on_unique("already exists");
        assert!(matches!(mapped, AbsensiError::Conflict(ref m) if m == "already exists"));
    }

    #[test]
    fn test_foreign_key_violation_is_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE p (id INTEGER PRIMARY KEY);
             CREATE TABLE c (p_id INTEGER REFERENCES p(id));",
        )
        .unwrap();
        let err: AbsensiError = conn
            .execute("INSERT INTO c VALUES (42)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));

        let mapped = err.on_foreign_key("missing parent", false);
        assert_eq!(mapped.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_non_constraint_errors_pass_through() {
        let err = AbsensiError::NotFound("nope".into()).on_unique("dup");
        assert!(matches!(err, AbsensiError::NotFound(_)));
    }
}
