use chrono::{DateTime, Local, NaiveDate};
use log::{info, warn};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, OptionalExtension, ToSql, Transaction, TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::academic_years::AcademicYear;
use crate::error::{AbsensiError, ConstraintKind};
use crate::students::{Student, StudentRef};

/// Attendance status recorded on a ledger row
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumIter,
    EnumString,
)]
pub enum StatusTag {
    Hadir,
    Sakit,
    Izin,
    Alpha,
    Terlambat,
}

impl StatusTag {
    /// Hadir and Terlambat both mean the student showed up.
    pub fn is_present(&self) -> bool {
        matches!(self, StatusTag::Hadir | StatusTag::Terlambat)
    }
}

impl ToSql for StatusTag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_ref()))
    }
}

impl FromSql for StatusTag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        StatusTag::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Format of `attendance_date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, AbsensiError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| AbsensiError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", value)))
}

fn local_from_timestamp(ts: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp(ts, 0).map(|utc| utc.with_timezone(&Local))
}

/// A student's check-in for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckIn {
    pub student: StudentRef,
    pub checked_in_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    /// A new row was written
    Recorded(CheckIn),
    /// The student had already checked in today; carries the existing row's time
    AlreadyScanned(CheckIn),
    /// No student with this identifier in the active academic year
    StudentNotFound,
}

/// Records a check-in for the student with NISN `identifier` on the local calendar day of `now`.
///
/// Runs as one `BEGIN IMMEDIATE` transaction. At most one row is written, and
/// only for a student of the active year who has no row for that day yet.
/// A missing active year is an error and aborts the transaction.
pub fn record_check_in(
    conn: &Connection,
    identifier: &str,
    now: DateTime<Local>,
) -> Result<CheckInOutcome, AbsensiError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(AbsensiError::Validation(
            "QR code is invalid or missing".to_string(),
        ));
    }

    // Dropping the transaction on an early `?` rolls it back
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let year = AcademicYear::get_active(&tx)?;

    let Some(student) = Student::find_in_year(&tx, identifier, year.academic_year_id)? else {
        tx.rollback()?;
        return Ok(CheckInOutcome::StudentNotFound);
    };

    let today = format_date(now.date_naive());

    if let Some(existing) = existing_check_in(&tx, student.student_id, &today)? {
        tx.rollback()?;
        return Ok(CheckInOutcome::AlreadyScanned(CheckIn {
            student,
            checked_in_at: existing,
        }));
    }

    let inserted = tx.execute(
        "INSERT INTO attendance (student_id, checked_in_at, attendance_date, status)
         VALUES (?, ?, ?, ?)",
        params![student.student_id, now.timestamp(), today, StatusTag::Hadir],
    );

    match inserted {
        Ok(_) => {
            tx.commit()?;
            info!(
                "Check-in recorded for '{}' ({}) on {}",
                student.full_name, student.class_name, today
            );
            Ok(CheckInOutcome::Recorded(CheckIn {
                student,
                checked_in_at: now,
            }))
        }
        Err(e) => {
            let err = AbsensiError::from(e);
            tx.rollback()?;
            if err.constraint_kind() != Some(ConstraintKind::Unique) {
                return Err(err);
            }

            // Another writer got there first; report its row
            warn!(
                "Concurrent check-in for student {} on {}",
                student.student_id, today
            );
            let existing = existing_check_in(conn, student.student_id, &today)?.unwrap_or(now);
            Ok(CheckInOutcome::AlreadyScanned(CheckIn {
                student,
                checked_in_at: existing,
            }))
        }
    }
}

fn existing_check_in(
    conn: &Connection,
    student_id: i64,
    date: &str,
) -> Result<Option<DateTime<Local>>, AbsensiError> {
    let ts: Option<i64> = conn
        .query_row(
            "SELECT checked_in_at FROM attendance WHERE student_id = ? AND attendance_date = ?",
            params![student_id, date],
            |row| row.get(0),
        )
        .optional()?;

    Ok(ts.and_then(local_from_timestamp))
}

/// Row of the admin attendance log (GET /api/admin/kehadiran)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceLogEntry {
    pub id: i64,
    pub nisn: String,
    pub nama_siswa: String,
    pub nama_kelas: String,
    /// Unix timestamp for client-side formatting
    pub waktu_masuk: i64,
    pub status_kehadiran: StatusTag,
    pub keterangan: Option<String>,
}

/// All check-ins on `date`, latest first.
pub fn log_for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<AttendanceLogEntry>, AbsensiError> {
    let mut stmt = conn.prepare(
        "SELECT a.attendance_id, s.nisn, s.full_name, c.name,
                a.checked_in_at, a.status, a.note
         FROM attendance a
         JOIN students s ON a.student_id = s.student_id
         JOIN classes c ON s.class_id = c.class_id
         WHERE a.attendance_date = ?
         ORDER BY a.checked_in_at DESC, a.attendance_id DESC",
    )?;

    let entries = stmt
        .query_map([format_date(date)], |row| {
            Ok(AttendanceLogEntry {
                id: row.get(0)?,
                nisn: row.get(1)?,
                nama_siswa: row.get(2)?,
                nama_kelas: row.get(3)?,
                waktu_masuk: row.get(4)?,
                status_kehadiran: row.get(5)?,
                keterangan: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Row of a student's own history (GET /api/siswa/riwayat)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub tanggal: String,
    pub waktu_masuk: i64,
    pub status_kehadiran: StatusTag,
    pub keterangan: Option<String>,
}

/// Attendance of the student owned by `user_id`, newest first.
pub fn history_for_user(conn: &Connection, user_id: i64) -> Result<Vec<HistoryEntry>, AbsensiError> {
    let mut stmt = conn.prepare(
        "SELECT a.attendance_id, a.attendance_date, a.checked_in_at, a.status, a.note
         FROM attendance a
         JOIN students s ON a.student_id = s.student_id
         WHERE s.user_id = ?
         ORDER BY a.attendance_date DESC",
    )?;

    let entries = stmt
        .query_map([user_id], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                tanggal: row.get(1)?,
                waktu_masuk: row.get(2)?,
                status_kehadiran: row.get(3)?,
                keterangan: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        count_attendance, insert_attendance, insert_student, insert_year, local_time, seed,
        test_db,
    };
    use strum::IntoEnumIterator;

    #[test]
    fn test_status_tags_match_stored_strings() {
        let names: Vec<String> = StatusTag::iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["Hadir", "Sakit", "Izin", "Alpha", "Terlambat"]);
        assert_eq!(StatusTag::from_str("Izin").unwrap(), StatusTag::Izin);
        assert!(StatusTag::Terlambat.is_present());
        assert!(!StatusTag::Alpha.is_present());
    }

    #[test]
    fn test_first_scan_recorded_then_already_scanned() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let morning = local_time(2024, 8, 1, 7, 5);

        let check_in = match record_check_in(&conn, "S001", morning).unwrap() {
            CheckInOutcome::Recorded(check_in) => check_in,
            other => panic!("expected Recorded, got {:?}", other),
        };
        assert_eq!(check_in.student.student_id, fx.student_id);
        assert_eq!(check_in.student.class_name, "10A");
        assert_eq!(count_attendance(&conn), 1);

        let later = local_time(2024, 8, 1, 9, 30);
        let existing = match record_check_in(&conn, "S001", later).unwrap() {
            CheckInOutcome::AlreadyScanned(existing) => existing,
            other => panic!("expected AlreadyScanned, got {:?}", other),
        };
        assert_eq!(existing.checked_in_at.timestamp(), morning.timestamp());
        assert_eq!(count_attendance(&conn), 1);

        let status: String = conn
            .query_row("SELECT status FROM attendance", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "Hadir");
    }

    #[test]
    fn test_next_day_records_again() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        seed(&conn);

        record_check_in(&conn, "S001", local_time(2024, 8, 1, 7, 0)).unwrap();
        let next = record_check_in(&conn, "S001", local_time(2024, 8, 2, 7, 0)).unwrap();
        assert!(matches!(next, CheckInOutcome::Recorded(_)));
        assert_eq!(count_attendance(&conn), 2);
    }

    #[test]
    fn test_student_outside_active_year_not_found() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let old_year = insert_year(&conn, "2019/2020", false);
        insert_student(&conn, "S777", "Lama", fx.class_id, old_year, None);

        let now = local_time(2024, 8, 1, 7, 0);
        assert_eq!(
            record_check_in(&conn, "S777", now).unwrap(),
            CheckInOutcome::StudentNotFound
        );
        assert_eq!(
            record_check_in(&conn, "NOPE", now).unwrap(),
            CheckInOutcome::StudentNotFound
        );
        assert_eq!(count_attendance(&conn), 0);
    }

    #[test]
    fn test_old_year_nisn_equal_to_active_student_id_not_found() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let old_year = insert_year(&conn, "2019/2020", false);
        let id_as_nisn = fx.student_id.to_string();
        insert_student(&conn, &id_as_nisn, "Lama", fx.class_id, old_year, None);

        let now = local_time(2024, 8, 1, 7, 0);
        assert_eq!(
            record_check_in(&conn, &id_as_nisn, now).unwrap(),
            CheckInOutcome::StudentNotFound
        );
        assert_eq!(count_attendance(&conn), 0);
    }

    #[test]
    fn test_no_active_year_aborts() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        conn.execute("UPDATE academic_years SET is_active = 0", []).unwrap();

        let result = record_check_in(&conn, "S001", local_time(2024, 8, 1, 7, 0));
        assert!(matches!(result, Err(AbsensiError::NoActiveYear)));
        assert_eq!(count_attendance(&conn), 0);

        // The connection is usable again, so the transaction was closed
        conn.execute("UPDATE academic_years SET is_active = 1 WHERE academic_year_id = ?", [fx.year_id])
            .unwrap();
        assert!(matches!(
            record_check_in(&conn, "S001", local_time(2024, 8, 1, 7, 0)).unwrap(),
            CheckInOutcome::Recorded(_)
        ));
    }

    #[test]
    fn test_blank_identifier_rejected() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        seed(&conn);
        assert!(matches!(
            record_check_in(&conn, "   ", local_time(2024, 8, 1, 7, 0)),
            Err(AbsensiError::Validation(_))
        ));
    }

    #[test]
    fn test_concurrent_duplicate_insert_is_blocked_by_constraint() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        insert_attendance(&conn, fx.student_id, "2024-08-01", "Hadir");

        let err = conn
            .execute(
                "INSERT INTO attendance (student_id, checked_in_at, attendance_date, status)
                 VALUES (?, 0, '2024-08-01', 'Hadir')",
                [fx.student_id],
            )
            .unwrap_err();
        assert_eq!(
            AbsensiError::from(err).constraint_kind(),
            Some(ConstraintKind::Unique)
        );
    }

    #[tokio::test]
    async fn test_parallel_scans_record_once() {
        let (_dir, db) = test_db();
        seed(&db.get_connection().unwrap());
        let now = local_time(2024, 8, 1, 7, 0);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.run(move |conn| record_check_in(conn, "S001", now)).await
                })
            })
            .collect();

        let mut recorded = 0;
        for handle in handles {
            if let CheckInOutcome::Recorded(_) = handle.await.unwrap().unwrap() {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(count_attendance(&db.get_connection().unwrap()), 1);
    }

    #[test]
    fn test_log_and_history() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        insert_attendance(&conn, fx.student_id, "2024-08-01", "Hadir");
        insert_attendance(&conn, fx.student_id, "2024-08-02", "Sakit");

        let day = NaiveDate::from_ymd_opt(2024, 8, 2).unwrap();
        let log = log_for_date(&conn, day).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status_kehadiran, StatusTag::Sakit);
        assert_eq!(log[0].nama_kelas, "10A");

        let history = history_for_user(&conn, fx.student_user_id).unwrap();
        let dates: Vec<&str> = history.iter().map(|h| h.tanggal.as_str()).collect();
        assert_eq!(dates, vec!["2024-08-02", "2024-08-01"]);
        assert!(history_for_user(&conn, fx.admin_user_id).unwrap().is_empty());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-08-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()
        );
        assert!(matches!(parse_date("01/08/2024"), Err(AbsensiError::Validation(_))));
    }
}
