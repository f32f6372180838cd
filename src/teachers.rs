use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, Role};
use crate::database::Database;
use crate::error::AbsensiError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Teacher {
    pub id: i64,
    pub nip: String,
    pub nama_guru: String,
    pub no_telp: Option<String>,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct TeacherRequest {
    #[serde(default)]
    pub nip: String,
    #[serde(default)]
    pub nama: String,
    pub no_telp: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Teacher {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Teacher {
            id: row.get(0)?,
            nip: row.get(1)?,
            nama_guru: row.get(2)?,
            no_telp: row.get(3)?,
            username: row.get(4)?,
        })
    }

    pub fn list(conn: &Connection) -> Result<Vec<Self>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT t.teacher_id, t.nip, t.full_name, t.phone, u.username
             FROM teachers t
             JOIN users u ON t.user_id = u.user_id
             ORDER BY t.full_name ASC",
        )?;
        let teachers = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teachers)
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Self>, AbsensiError> {
        let teacher = conn
            .query_row(
                "SELECT t.teacher_id, t.nip, t.full_name, t.phone, u.username
                 FROM teachers t
                 JOIN users u ON t.user_id = u.user_id
                 WHERE t.teacher_id = ?",
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(teacher)
    }

    /// Creates the teacher record and its `guru` login in one transaction.
    pub fn create(conn: &Connection, req: &TeacherRequest) -> Result<Self, AbsensiError> {
        let nip = req.nip.trim();
        let name = req.nama.trim();
        let (Some(username), Some(password)) = (trimmed(&req.username), req.password.as_deref())
        else {
            return Err(AbsensiError::Validation(
                "NIP, name, username and password are required".to_string(),
            ));
        };
        if nip.is_empty() || name.is_empty() || password.is_empty() {
            return Err(AbsensiError::Validation(
                "NIP, name, username and password are required".to_string(),
            ));
        }

        let password_hash = hash_password(password)?;

        let teacher_id = Database::immediate_transaction(conn, |c| {
            let user_id: i64 = c
                .query_row(
                    "INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)
                     RETURNING user_id",
                    params![username, password_hash, Role::Guru],
                    |row| row.get(0),
                )
                .map_err(|e| AbsensiError::from(e).on_unique("Username or NIP is already registered"))?;

            c.query_row(
                "INSERT INTO teachers (user_id, nip, full_name, phone) VALUES (?, ?, ?, ?)
                 RETURNING teacher_id",
                params![user_id, nip, name, trimmed(&req.no_telp)],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| AbsensiError::from(e).on_unique("Username or NIP is already registered"))
        })?;

        info!("Created teacher '{}' (id: {})", name, teacher_id);
        Self::get_by_id(conn, teacher_id)?
            .ok_or_else(|| AbsensiError::Error("Created teacher vanished".to_string()))
    }

    /// Updates the profile and, when given, the login's username and password.
    pub fn update(conn: &Connection, id: i64, req: &TeacherRequest) -> Result<(), AbsensiError> {
        let nip = req.nip.trim();
        let name = req.nama.trim();
        if nip.is_empty() || name.is_empty() {
            return Err(AbsensiError::Validation("NIP and name are required".to_string()));
        }

        let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        Database::immediate_transaction(conn, |c| {
            let user_id: i64 = c
                .query_row(
                    "UPDATE teachers SET nip = ?, full_name = ?, phone = ?
                     WHERE teacher_id = ?
                     RETURNING user_id",
                    params![nip, name, trimmed(&req.no_telp), id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| AbsensiError::from(e).on_unique("NIP is already used by another teacher"))?
                .ok_or_else(|| AbsensiError::NotFound("Teacher not found".to_string()))?;

            if let Some(username) = trimmed(&req.username) {
                c.execute(
                    "UPDATE users SET username = ? WHERE user_id = ?",
                    params![username, user_id],
                )
                .map_err(|e| AbsensiError::from(e).on_unique("Username is already taken"))?;
            }

            if let Some(hash) = &password_hash {
                c.execute(
                    "UPDATE users SET password_hash = ? WHERE user_id = ?",
                    params![hash, user_id],
                )?;
            }
            Ok(())
        })
    }

    /// Removes the teacher and their login. Refused while they lead a homeroom.
    pub fn delete(conn: &Connection, id: i64) -> Result<(), AbsensiError> {
        let rows = conn
            .execute(
                "DELETE FROM users WHERE user_id = (SELECT user_id FROM teachers WHERE teacher_id = ?)",
                [id],
            )
            .map_err(|e| {
                AbsensiError::from(e).on_foreign_key(
                    "Cannot delete: this teacher is still a homeroom teacher",
                    false,
                )
            })?;

        if rows == 0 {
            return Err(AbsensiError::NotFound("Teacher not found".to_string()));
        }

        info!("Deleted teacher {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::test_support::{seed, test_db};
    use crate::users::User;

    fn request(nip: &str, name: &str, username: Option<&str>, password: Option<&str>) -> TeacherRequest {
        TeacherRequest {
            nip: nip.to_string(),
            nama: name.to_string(),
            no_telp: Some("0812".to_string()),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn test_create_with_login() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();

        let teacher = Teacher::create(&conn, &request("1990", "Dewi", Some("dewi"), Some("pw"))).unwrap();
        assert_eq!(teacher.username, "dewi");
        assert_eq!(teacher.no_telp.as_deref(), Some("0812"));

        let (user, hash) = User::get_by_username_with_hash(&conn, "dewi").unwrap().unwrap();
        assert_eq!(user.role, Role::Guru);
        assert!(verify_password("pw", &hash));
        assert_eq!(Teacher::list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_missing_and_duplicates() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        seed(&conn);

        assert!(matches!(
            Teacher::create(&conn, &request("1990", "Dewi", None, Some("pw"))),
            Err(AbsensiError::Validation(_))
        ));
        // Username of the seeded teacher
        assert!(matches!(
            Teacher::create(&conn, &request("1990", "Dewi", Some("sari"), Some("pw"))),
            Err(AbsensiError::Conflict(_))
        ));
        // NIP of the seeded teacher; the login insert must roll back too
        assert!(matches!(
            Teacher::create(&conn, &request("198001", "Dewi", Some("dewi"), Some("pw"))),
            Err(AbsensiError::Conflict(_))
        ));
        assert!(User::get_by_username_with_hash(&conn, "dewi").unwrap().is_none());
    }

    #[test]
    fn test_update_profile_and_login() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);

        Teacher::update(
            &conn,
            fx.teacher_id,
            &request("198001", "Sari W", Some("sariw"), Some("baru")),
        )
        .unwrap();
        let teacher = Teacher::get_by_id(&conn, fx.teacher_id).unwrap().unwrap();
        assert_eq!(teacher.nama_guru, "Sari W");
        assert_eq!(teacher.username, "sariw");
        let hash = User::password_hash(&conn, fx.teacher_user_id).unwrap().unwrap();
        assert!(verify_password("baru", &hash));

        assert!(matches!(
            Teacher::update(&conn, 999, &request("1", "X", None, None)),
            Err(AbsensiError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_refused_while_homeroom_lead() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        conn.execute(
            "INSERT INTO homerooms (class_id, teacher_id, academic_year_id, updated_at)
             VALUES (?, ?, ?, 0)",
            params![fx.class_id, fx.teacher_id, fx.year_id],
        )
        .unwrap();

        let err = Teacher::delete(&conn, fx.teacher_id).unwrap_err();
        assert!(matches!(err, AbsensiError::ForeignKey { bad_request: false, .. }));
        assert!(User::get_by_id(&conn, fx.teacher_user_id).unwrap().is_some());

        conn.execute("DELETE FROM homerooms", []).unwrap();
        Teacher::delete(&conn, fx.teacher_id).unwrap();
        assert!(User::get_by_id(&conn, fx.teacher_user_id).unwrap().is_none());
        assert!(Teacher::get_by_id(&conn, fx.teacher_id).unwrap().is_none());
        assert!(matches!(
            Teacher::delete(&conn, fx.teacher_id),
            Err(AbsensiError::NotFound(_))
        ));
    }
}
