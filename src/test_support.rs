//! Database fixtures shared by the unit tests.

use chrono::{DateTime, Local, TimeZone};
use rusqlite::{params, Connection};
use tempfile::TempDir;

use crate::api::state::AppState;
use crate::auth::{AuthUser, Role};
use crate::config::Config;
use crate::database::Database;

/// Opens a fresh file database inside a temporary directory.
///
/// The directory must outlive the database, so both are returned.
pub fn test_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db = Database::open(&dir.path().join("absensi-test.db"), 4).expect("open test database");
    (dir, db)
}

/// Seeded database wrapped in handler state with default config.
pub fn test_state() -> (TempDir, AppState, Fixture) {
    let (dir, db) = test_db();
    let fx = seed(&db.get_connection().expect("connection"));
    (dir, AppState::new(db, &Config::default()), fx)
}

/// The caller as the extractor would resolve it.
pub fn caller(id: i64, username: &str, role: Role) -> AuthUser {
    AuthUser {
        id,
        username: username.to_string(),
        role,
    }
}

/// Ids of the rows created by [`seed`].
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub year_id: i64,
    pub class_id: i64,
    pub student_id: i64,
    pub student_user_id: i64,
    pub teacher_id: i64,
    pub teacher_user_id: i64,
    pub admin_user_id: i64,
}

/// Seeds one active year, class "10A", student "S001" (Budi), teacher "Sari" and an admin.
pub fn seed(conn: &Connection) -> Fixture {
    let year_id = insert_year(conn, "2024/2025", true);
    let class_id = insert_class(conn, "10A", "10");
    let student_user_id = insert_user(conn, "S001", "siswa");
    let student_id = insert_student(conn, "S001", "Budi", class_id, year_id, Some(student_user_id));
    let teacher_user_id = insert_user(conn, "sari", "guru");
    let teacher_id = insert_teacher(conn, teacher_user_id, "198001", "Sari");
    let admin_user_id = insert_user(conn, "admin", "admin");

    Fixture {
        year_id,
        class_id,
        student_id,
        student_user_id,
        teacher_id,
        teacher_user_id,
        admin_user_id,
    }
}

pub fn insert_year(conn: &Connection, label: &str, active: bool) -> i64 {
    conn.query_row(
        "INSERT INTO academic_years (label, is_active) VALUES (?, ?) RETURNING academic_year_id",
        params![label, active],
        |row| row.get(0),
    )
    .expect("insert academic year")
}

pub fn insert_class(conn: &Connection, name: &str, grade: &str) -> i64 {
    conn.query_row(
        "INSERT INTO classes (name, grade_level) VALUES (?, ?) RETURNING class_id",
        params![name, grade],
        |row| row.get(0),
    )
    .expect("insert class")
}

/// Inserts an account with a placeholder hash. Use `User::create` when the
/// password has to verify.
pub fn insert_user(conn: &Connection, username: &str, role: &str) -> i64 {
    conn.query_row(
        "INSERT INTO users (username, password_hash, role) VALUES (?, 'x', ?) RETURNING user_id",
        params![username, role],
        |row| row.get(0),
    )
    .expect("insert user")
}

pub fn insert_student(
    conn: &Connection,
    nisn: &str,
    name: &str,
    class_id: i64,
    year_id: i64,
    user_id: Option<i64>,
) -> i64 {
    conn.query_row(
        "INSERT INTO students (nisn, full_name, class_id, academic_year_id, user_id)
         VALUES (?, ?, ?, ?, ?) RETURNING student_id",
        params![nisn, name, class_id, year_id, user_id],
        |row| row.get(0),
    )
    .expect("insert student")
}

pub fn insert_teacher(conn: &Connection, user_id: i64, nip: &str, name: &str) -> i64 {
    conn.query_row(
        "INSERT INTO teachers (user_id, nip, full_name) VALUES (?, ?, ?) RETURNING teacher_id",
        params![user_id, nip, name],
        |row| row.get(0),
    )
    .expect("insert teacher")
}

pub fn insert_attendance(conn: &Connection, student_id: i64, date: &str, status: &str) {
    conn.execute(
        "INSERT INTO attendance (student_id, checked_in_at, attendance_date, status)
         VALUES (?, 0, ?, ?)",
        params![student_id, date, status],
    )
    .expect("insert attendance");
}

pub fn count_attendance(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))
        .expect("count attendance")
}

impl Fixture {
    pub fn admin(&self) -> AuthUser {
        caller(self.admin_user_id, "admin", Role::Admin)
    }

    pub fn guru(&self) -> AuthUser {
        caller(self.teacher_user_id, "sari", Role::Guru)
    }

    pub fn siswa(&self) -> AuthUser {
        caller(self.student_user_id, "S001", Role::Siswa)
    }
}

/// Reads a handler response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// A fixed local timestamp for clock-dependent operations.
pub fn local_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("unambiguous local time")
}
