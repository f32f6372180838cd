pub const SCHEMA_VERSION: &str = "1";

pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');

-- Login accounts. A guru or siswa account is linked one-to-one from teachers/students.
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('admin', 'guru', 'siswa'))
);

-- Academic years (tahun ajaran). At most one row may be active.
CREATE TABLE IF NOT EXISTS academic_years (
    academic_year_id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL UNIQUE,
    is_active BOOLEAN NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_single_active
    ON academic_years (is_active) WHERE is_active = 1;

-- Class sections (kelas)
CREATE TABLE IF NOT EXISTS classes (
    class_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    grade_level TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teachers (
    teacher_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE,
    nip TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    phone TEXT DEFAULT NULL,
    FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
);

-- Students are scoped to one academic year; promotion re-points academic_year_id.
CREATE TABLE IF NOT EXISTS students (
    student_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER UNIQUE DEFAULT NULL,
    nisn TEXT NOT NULL,
    full_name TEXT NOT NULL,
    class_id INTEGER NOT NULL,
    academic_year_id INTEGER NOT NULL,
    qr_data_url TEXT DEFAULT NULL,      -- Cached QR image as a data URL
    FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE SET NULL,
    FOREIGN KEY (class_id) REFERENCES classes(class_id),
    FOREIGN KEY (academic_year_id) REFERENCES academic_years(academic_year_id),
    UNIQUE (nisn, academic_year_id)
);

CREATE INDEX IF NOT EXISTS idx_students_class ON students (class_id);

-- Homeroom assignments (wali kelas), one per class per academic year
CREATE TABLE IF NOT EXISTS homerooms (
    homeroom_id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_id INTEGER NOT NULL,
    teacher_id INTEGER NOT NULL,
    academic_year_id INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,        -- Unix timestamp (UTC)
    FOREIGN KEY (class_id) REFERENCES classes(class_id),
    FOREIGN KEY (teacher_id) REFERENCES teachers(teacher_id),
    FOREIGN KEY (academic_year_id) REFERENCES academic_years(academic_year_id),
    UNIQUE (class_id, academic_year_id)
);

-- Attendance ledger. Append-only apart from cascading student deletion.
CREATE TABLE IF NOT EXISTS attendance (
    attendance_id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL,
    checked_in_at INTEGER NOT NULL,     -- Unix timestamp (UTC)
    attendance_date TEXT NOT NULL,      -- Server-local calendar date, YYYY-MM-DD
    status TEXT NOT NULL CHECK (status IN ('Hadir', 'Sakit', 'Izin', 'Alpha', 'Terlambat')),
    note TEXT DEFAULT NULL,
    FOREIGN KEY (student_id) REFERENCES students(student_id) ON DELETE CASCADE,
    UNIQUE (student_id, attendance_date)
);

CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance (attendance_date);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    is_read BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,        -- Unix timestamp (UTC)
    FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, created_at);

-- School-wide key/value settings (check-in window)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

COMMIT;
"#;
