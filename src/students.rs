use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::academic_years::AcademicYear;
use crate::auth::{hash_password, Role};
use crate::database::Database;
use crate::error::AbsensiError;

/// A student enrolled in the directory, joined with their class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    #[serde(rename = "id")]
    pub student_id: i64,
    pub nisn: String,
    #[serde(rename = "nama_siswa")]
    pub full_name: String,
    pub qr_data_url: Option<String>,
    #[serde(rename = "kelas_id")]
    pub class_id: i64,
    #[serde(rename = "nama_kelas")]
    pub class_name: String,
    pub grade: String,
    #[serde(rename = "ta_id")]
    pub academic_year_id: i64,
    #[serde(skip)]
    pub user_id: Option<i64>,
}

/// The minimum needed to record and report a check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRef {
    pub student_id: i64,
    pub full_name: String,
    pub class_name: String,
}

/// Row of GET /api/admin/kelas/{id}/siswa
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMember {
    pub id: i64,
    pub nisn: String,
    pub nama_siswa: String,
}

/// Row of GET /api/admin/qr/list-siswa
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrListEntry {
    pub id: i64,
    pub nisn: String,
    pub nama_siswa: String,
    pub nama_kelas: String,
    pub has_qr: bool,
}

#[derive(Debug, Deserialize)]
pub struct StudentRequest {
    #[serde(default)]
    pub nisn: String,
    #[serde(default)]
    pub nama_siswa: String,
    pub kelas_id: Option<i64>,
    /// Promotion: move the student to another academic year
    pub ta_id: Option<i64>,
}

const STUDENT_SELECT: &str = "
    SELECT s.student_id, s.nisn, s.full_name, s.qr_data_url, s.class_id,
           c.name, c.grade_level, s.academic_year_id, s.user_id
    FROM students s
    JOIN classes c ON s.class_id = c.class_id";

impl Student {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Student {
            student_id: row.get(0)?,
            nisn: row.get(1)?,
            full_name: row.get(2)?,
            qr_data_url: row.get(3)?,
            class_id: row.get(4)?,
            class_name: row.get(5)?,
            grade: row.get(6)?,
            academic_year_id: row.get(7)?,
            user_id: row.get(8)?,
        })
    }

    /// Resolves a scanned NISN to a student registered in `year_id`.
    pub fn find_in_year(
        conn: &Connection,
        nisn: &str,
        year_id: i64,
    ) -> Result<Option<StudentRef>, AbsensiError> {
        let student = conn
            .query_row(
                "SELECT s.student_id, s.full_name, c.name
                 FROM students s
                 JOIN classes c ON s.class_id = c.class_id
                 WHERE s.nisn = ? AND s.academic_year_id = ?",
                params![nisn, year_id],
                student_ref_from_row,
            )
            .optional()?;
        Ok(student)
    }

    pub fn get_by_id(conn: &Connection, student_id: i64) -> Result<Option<Self>, AbsensiError> {
        let sql = format!("{} WHERE s.student_id = ?", STUDENT_SELECT);
        let student = conn.query_row(&sql, [student_id], Self::from_row).optional()?;
        Ok(student)
    }

    /// The student record owned by a `siswa` login. `students.user_id` is
    /// unique, so a login follows one record across years and promotion
    /// re-points it through `ta_id` on update.
    pub fn get_by_user(conn: &Connection, user_id: i64) -> Result<Option<Self>, AbsensiError> {
        let sql = format!("{} WHERE s.user_id = ?", STUDENT_SELECT);
        let student = conn.query_row(&sql, [user_id], Self::from_row).optional()?;
        Ok(student)
    }

    /// Ordered by grade, class name, then student name.
    pub fn list(conn: &Connection) -> Result<Vec<Self>, AbsensiError> {
        let sql = format!(
            "{} ORDER BY c.grade_level ASC, c.name ASC, s.full_name ASC",
            STUDENT_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let students = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    pub fn list_by_class(conn: &Connection, class_id: i64) -> Result<Vec<ClassMember>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT student_id, nisn, full_name FROM students
             WHERE class_id = ?
             ORDER BY full_name ASC",
        )?;
        let members = stmt
            .query_map([class_id], |row| {
                Ok(ClassMember {
                    id: row.get(0)?,
                    nisn: row.get(1)?,
                    nama_siswa: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn list_for_qr(conn: &Connection) -> Result<Vec<QrListEntry>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT s.student_id, s.nisn, s.full_name, c.name, s.qr_data_url IS NOT NULL
             FROM students s
             JOIN classes c ON s.class_id = c.class_id
             ORDER BY c.name ASC, s.full_name ASC",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(QrListEntry {
                    id: row.get(0)?,
                    nisn: row.get(1)?,
                    nama_siswa: row.get(2)?,
                    nama_kelas: row.get(3)?,
                    has_qr: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn store_qr(conn: &Connection, student_id: i64, data_url: &str) -> Result<(), AbsensiError> {
        let rows = conn.execute(
            "UPDATE students SET qr_data_url = ? WHERE student_id = ?",
            params![data_url, student_id],
        )?;
        if rows == 0 {
            return Err(AbsensiError::NotFound("Student not found".to_string()));
        }
        Ok(())
    }

    /// Enrolls a student in the active year together with a `siswa` login
    /// whose username and initial password are the NISN.
    pub fn create(conn: &Connection, req: &StudentRequest) -> Result<i64, AbsensiError> {
        let (nisn, name, class_id) = validate_request(req)?;
        // Hash outside the write transaction
        let password_hash = hash_password(nisn)?;

        let student_id = Database::immediate_transaction(conn, |c| {
            let year = AcademicYear::get_active(c)?;

            let user_id: i64 = c
                .query_row(
                    "INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)
                     RETURNING user_id",
                    params![nisn, password_hash, Role::Siswa],
                    |row| row.get(0),
                )
                .map_err(|e| {
                    AbsensiError::from(e).on_unique("NISN is already registered as a user")
                })?;

            c.query_row(
                "INSERT INTO students (user_id, nisn, full_name, class_id, academic_year_id)
                 VALUES (?, ?, ?, ?, ?)
                 RETURNING student_id",
                params![user_id, nisn, name, class_id, year.academic_year_id],
                |row| row.get(0),
            )
            .map_err(|e| {
                AbsensiError::from(e)
                    .on_unique("NISN is already used in this academic year")
                    .on_foreign_key("Class not found", true)
            })
        })?;

        info!("Created student '{}' ({}) with login", name, nisn);
        Ok(student_id)
    }

    /// Updates NISN, name and class, optionally moving the student to another
    /// academic year. The linked login username follows the NISN, and a stored
    /// QR code is dropped when the NISN it encodes changes.
    pub fn update(conn: &Connection, student_id: i64, req: &StudentRequest) -> Result<(), AbsensiError> {
        let (nisn, name, class_id) = validate_request(req)?;

        Database::immediate_transaction(conn, |c| {
            let user_id: Option<i64> = c
                .query_row(
                    "UPDATE students
                     SET nisn = ?1, full_name = ?2, class_id = ?3,
                         academic_year_id = COALESCE(?4, academic_year_id),
                         qr_data_url = CASE WHEN nisn = ?1 THEN qr_data_url ELSE NULL END
                     WHERE student_id = ?5
                     RETURNING user_id",
                    params![nisn, name, class_id, req.ta_id, student_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| {
                    AbsensiError::from(e)
                        .on_unique("NISN is already used by another student")
                        .on_foreign_key("Class or academic year not found", true)
                })?
                .ok_or_else(|| AbsensiError::NotFound("Student not found".to_string()))?;

            if let Some(user_id) = user_id {
                c.execute(
                    "UPDATE users SET username = ? WHERE user_id = ?",
                    params![nisn, user_id],
                )
                .map_err(|e| {
                    AbsensiError::from(e).on_unique("NISN is already registered as a user")
                })?;
            }
            Ok(())
        })
    }

    /// Deletes the student, their attendance rows and their login.
    pub fn delete(conn: &Connection, student_id: i64) -> Result<(), AbsensiError> {
        Database::immediate_transaction(conn, |c| {
            let user_id: Option<i64> = c
                .query_row(
                    "DELETE FROM students WHERE student_id = ? RETURNING user_id",
                    [student_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| AbsensiError::NotFound("Student not found".to_string()))?;

            if let Some(user_id) = user_id {
                c.execute("DELETE FROM users WHERE user_id = ?", [user_id])?;
            }
            Ok(())
        })?;

        info!("Deleted student {}", student_id);
        Ok(())
    }
}

fn student_ref_from_row(row: &rusqlite::Row) -> rusqlite::Result<StudentRef> {
    Ok(StudentRef {
        student_id: row.get(0)?,
        full_name: row.get(1)?,
        class_name: row.get(2)?,
    })
}

fn validate_request(req: &StudentRequest) -> Result<(&str, &str, i64), AbsensiError> {
    let nisn = req.nisn.trim();
    let name = req.nama_siswa.trim();
    match req.kelas_id {
        Some(class_id) if !nisn.is_empty() && !name.is_empty() => Ok((nisn, name, class_id)),
        _ => Err(AbsensiError::Validation(
            "NISN, name and class are required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::test_support::{
        count_attendance, insert_attendance, insert_class, insert_student, insert_year, seed,
        test_db,
    };
    use crate::users::User;

    fn request(nisn: &str, name: &str, class_id: i64) -> StudentRequest {
        StudentRequest {
            nisn: nisn.to_string(),
            nama_siswa: name.to_string(),
            kelas_id: Some(class_id),
            ta_id: None,
        }
    }

    #[test]
    fn test_find_in_year_by_nisn() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);

        let found = Student::find_in_year(&conn, "S001", fx.year_id).unwrap().unwrap();
        assert_eq!(found.student_id, fx.student_id);
        assert_eq!(found.full_name, "Budi");
        assert_eq!(found.class_name, "10A");

        assert!(Student::find_in_year(&conn, "S999", fx.year_id).unwrap().is_none());
    }

    #[test]
    fn test_find_in_year_never_matches_internal_id() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let old_year = insert_year(&conn, "2019/2020", false);
        let id_as_nisn = fx.student_id.to_string();
        insert_student(&conn, &id_as_nisn, "Lama", fx.class_id, old_year, None);

        assert!(Student::find_in_year(&conn, &id_as_nisn, fx.year_id).unwrap().is_none());
    }

    #[test]
    fn test_find_in_year_ignores_other_years() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let old_year = insert_year(&conn, "2019/2020", false);
        insert_student(&conn, "S777", "Lama", fx.class_id, old_year, None);

        assert!(Student::find_in_year(&conn, "S777", fx.year_id).unwrap().is_none());
        assert!(Student::find_in_year(&conn, "S777", old_year).unwrap().is_some());
    }

    #[test]
    fn test_create_enrolls_in_active_year_with_login() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);

        let id = Student::create(&conn, &request("S002", "Ani", fx.class_id)).unwrap();
        let student = Student::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(student.academic_year_id, fx.year_id);
        assert_eq!(student.class_name, "10A");

        let (user, hash) = User::get_by_username_with_hash(&conn, "S002").unwrap().unwrap();
        assert_eq!(user.role, Role::Siswa);
        assert_eq!(student.user_id, Some(user.user_id));
        assert!(verify_password("S002", &hash));
    }

    #[test]
    fn test_create_failures_leave_nothing_behind() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);

        // NISN already used as a username
        assert!(matches!(
            Student::create(&conn, &request("S001", "Dup", fx.class_id)),
            Err(AbsensiError::Conflict(_))
        ));
        // Unknown class
        assert!(matches!(
            Student::create(&conn, &request("S003", "Cici", 999)),
            Err(AbsensiError::ForeignKey { bad_request: true, .. })
        ));
        assert!(User::get_by_username_with_hash(&conn, "S003").unwrap().is_none());
        // Missing field
        assert!(matches!(
            Student::create(&conn, &request("", "Cici", fx.class_id)),
            Err(AbsensiError::Validation(_))
        ));
    }

    #[test]
    fn test_create_without_active_year() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let class_id = insert_class(&conn, "10A", "10");

        assert!(matches!(
            Student::create(&conn, &request("S002", "Ani", class_id)),
            Err(AbsensiError::NoActiveYear)
        ));
        assert!(User::get_by_username_with_hash(&conn, "S002").unwrap().is_none());
    }

    #[test]
    fn test_update_keeps_username_in_sync() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let other_class = insert_class(&conn, "11B", "11");

        Student::update(&conn, fx.student_id, &request("S010", "Budi S", other_class)).unwrap();
        let student = Student::get_by_id(&conn, fx.student_id).unwrap().unwrap();
        assert_eq!(student.nisn, "S010");
        assert_eq!(student.class_name, "11B");
        assert_eq!(
            User::get_by_id(&conn, fx.student_user_id).unwrap().unwrap().username,
            "S010"
        );

        assert!(matches!(
            Student::update(&conn, 999, &request("S011", "X", other_class)),
            Err(AbsensiError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_drops_qr_only_when_nisn_changes() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        Student::store_qr(&conn, fx.student_id, "data:image/png;base64,AAAA").unwrap();

        Student::update(&conn, fx.student_id, &request("S001", "Budi Santoso", fx.class_id)).unwrap();
        let student = Student::get_by_id(&conn, fx.student_id).unwrap().unwrap();
        assert_eq!(student.qr_data_url.as_deref(), Some("data:image/png;base64,AAAA"));

        Student::update(&conn, fx.student_id, &request("S999", "Budi Santoso", fx.class_id)).unwrap();
        let student = Student::get_by_id(&conn, fx.student_id).unwrap().unwrap();
        assert_eq!(student.nisn, "S999");
        assert_eq!(student.qr_data_url, None);
    }

    #[test]
    fn test_update_can_promote_to_another_year() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let next_year = insert_year(&conn, "2025/2026", false);

        let mut req = request("S001", "Budi", fx.class_id);
        req.ta_id = Some(next_year);
        Student::update(&conn, fx.student_id, &req).unwrap();

        assert!(Student::find_in_year(&conn, "S001", fx.year_id).unwrap().is_none());
        assert!(Student::find_in_year(&conn, "S001", next_year).unwrap().is_some());

        // The login follows the same record into the new year
        let owned = Student::get_by_user(&conn, fx.student_user_id).unwrap().unwrap();
        assert_eq!(owned.student_id, fx.student_id);
        assert_eq!(owned.academic_year_id, next_year);
    }

    #[test]
    fn test_delete_removes_attendance_and_login() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        insert_attendance(&conn, fx.student_id, "2024-08-01", "Hadir");

        Student::delete(&conn, fx.student_id).unwrap();
        assert_eq!(count_attendance(&conn), 0);
        assert!(User::get_by_id(&conn, fx.student_user_id).unwrap().is_none());
        assert!(matches!(
            Student::delete(&conn, fx.student_id),
            Err(AbsensiError::NotFound(_))
        ));
    }

    #[test]
    fn test_lists_and_qr_flag() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        insert_student(&conn, "S002", "Ani", fx.class_id, fx.year_id, None);

        let names: Vec<String> = Student::list(&conn)
            .unwrap()
            .into_iter()
            .map(|s| s.full_name)
            .collect();
        assert_eq!(names, vec!["Ani", "Budi"]);
        assert_eq!(Student::list_by_class(&conn, fx.class_id).unwrap().len(), 2);

        Student::store_qr(&conn, fx.student_id, "data:image/png;base64,AAAA").unwrap();
        let flags: Vec<(String, bool)> = Student::list_for_qr(&conn)
            .unwrap()
            .into_iter()
            .map(|e| (e.nisn, e.has_qr))
            .collect();
        assert_eq!(
            flags,
            vec![("S002".to_string(), false), ("S001".to_string(), true)]
        );

        let own = Student::get_by_user(&conn, fx.student_user_id).unwrap().unwrap();
        assert_eq!(own.student_id, fx.student_id);
    }
}
