use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::auth::{hash_password, Role};
use crate::error::AbsensiError;

/// A login account. The password hash is never part of this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl User {
    pub fn get_by_id(conn: &Connection, user_id: i64) -> Result<Option<Self>, AbsensiError> {
        let user = conn
            .query_row(
                "SELECT user_id, username, role FROM users WHERE user_id = ?",
                [user_id],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        role: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_by_username_with_hash(
        conn: &Connection,
        username: &str,
    ) -> Result<Option<(Self, String)>, AbsensiError> {
        let found = conn
            .query_row(
                "SELECT user_id, username, role, password_hash FROM users WHERE username = ?",
                [username],
                |row| {
                    Ok((
                        User {
                            user_id: row.get(0)?,
                            username: row.get(1)?,
                            role: row.get(2)?,
                        },
                        row.get(3)?,
                    ))
                },
            )
            .optional()?;
        Ok(found)
    }

    pub fn password_hash(conn: &Connection, user_id: i64) -> Result<Option<String>, AbsensiError> {
        let hash = conn
            .query_row(
                "SELECT password_hash FROM users WHERE user_id = ?",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Creates an account and returns its id. A taken username is a `Conflict`.
    pub fn create(
        conn: &Connection,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<i64, AbsensiError> {
        let hash = hash_password(password)?;
        conn.query_row(
            "INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?) RETURNING user_id",
            params![username, hash, role],
            |row| row.get(0),
        )
        .map_err(|e| AbsensiError::from(e).on_unique("Username is already taken"))
    }

    pub fn set_password(conn: &Connection, user_id: i64, password: &str) -> Result<(), AbsensiError> {
        let hash = hash_password(password)?;
        let rows = conn.execute(
            "UPDATE users SET password_hash = ? WHERE user_id = ?",
            params![hash, user_id],
        )?;
        if rows == 0 {
            return Err(AbsensiError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    pub fn set_username(conn: &Connection, user_id: i64, username: &str) -> Result<(), AbsensiError> {
        let rows = conn
            .execute(
                "UPDATE users SET username = ? WHERE user_id = ?",
                params![username, user_id],
            )
            .map_err(|e| {
                AbsensiError::from(e).on_unique("Username is already used by another user")
            })?;
        if rows == 0 {
            return Err(AbsensiError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    pub fn count_by_role(conn: &Connection, role: Role) -> Result<i64, AbsensiError> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?",
            [role],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Bootstraps an administrator account from the command line.
    pub fn create_admin(conn: &Connection, username: &str, password: &str) -> Result<i64, AbsensiError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AbsensiError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        let user_id = Self::create(conn, username, password, Role::Admin)?;
        info!("Created admin account '{}' (id: {})", username, user_id);
        Ok(user_id)
    }
}
