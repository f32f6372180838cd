use chrono::{Duration, NaiveDate};
use log::Level;
use logging_timer::timer;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::academic_years::AcademicYear;
use crate::attendance::{format_date, parse_date, StatusTag};
use crate::auth::Role;
use crate::error::AbsensiError;
use crate::users::User;

pub trait Filter: Debug {
    /// return predicate text and params
    fn to_predicate_parts(&self) -> Result<(String, Vec<Box<dyn ToSql>>), AbsensiError>;
}

/// Inclusive calendar-date range on `attendance_date`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangeFilter {
    date_col_db: &'static str,
    start: NaiveDate,
    end: NaiveDate,
}

impl Filter for DateRangeFilter {
    fn to_predicate_parts(&self) -> Result<(String, Vec<Box<dyn ToSql>>), AbsensiError> {
        let mut pred_vec: Vec<Box<dyn ToSql>> = Vec::new();
        pred_vec.push(Box::new(format_date(self.start)));
        pred_vec.push(Box::new(format_date(self.end)));

        Ok((format!("({} BETWEEN ? AND ?)", self.date_col_db), pred_vec))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassFilter {
    class_col_db: &'static str,
    class_id: i64,
}

impl Filter for ClassFilter {
    fn to_predicate_parts(&self) -> Result<(String, Vec<Box<dyn ToSql>>), AbsensiError> {
        let pred_vec: Vec<Box<dyn ToSql>> = vec![Box::new(self.class_id)];
        Ok((format!("({} = ?)", self.class_col_db), pred_vec))
    }
}

/// Query string of the recap, analytics and export endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecapParams {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    #[serde(rename = "kelasId")]
    pub kelas_id: Option<String>,
}

/// Optional recap filters. The date range applies only when both bounds are given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecapFilter {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub class_id: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RecapFilter {
    pub fn from_params(params: &RecapParams) -> Result<Self, AbsensiError> {
        let date_range = match (non_empty(&params.start_date), non_empty(&params.end_date)) {
            (Some(start), Some(end)) => Some((parse_date(start)?, parse_date(end)?)),
            _ => None,
        };

        let class_id = non_empty(&params.kelas_id)
            .map(|id| {
                id.parse::<i64>()
                    .map_err(|_| AbsensiError::Validation(format!("Invalid class id '{}'", id)))
            })
            .transpose()?;

        Ok(RecapFilter {
            date_range,
            class_id,
        })
    }

    fn filters(&self) -> Vec<Box<dyn Filter>> {
        let mut filters: Vec<Box<dyn Filter>> = Vec::new();
        if let Some((start, end)) = self.date_range {
            filters.push(Box::new(DateRangeFilter {
                date_col_db: "a.attendance_date",
                start,
                end,
            }));
        }
        if let Some(class_id) = self.class_id {
            filters.push(Box::new(ClassFilter {
                class_col_db: "c.class_id",
                class_id,
            }));
        }
        filters
    }

    /// `WHERE 1=1 [AND predicate]...` with the matching positional params.
    pub fn where_clause(&self) -> Result<(String, Vec<Box<dyn ToSql>>), AbsensiError> {
        let mut sql = String::from("WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        for filter in self.filters() {
            let (pred_str, pred_vec) = filter.to_predicate_parts()?;
            sql.push_str(" AND ");
            sql.push_str(&pred_str);
            params.extend(pred_vec);
        }

        Ok((sql, params))
    }
}

/// Attendance summary of one student
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecapRow {
    pub nisn: String,
    pub nama_siswa: String,
    pub nama_kelas: String,
    pub total_hadir: i64,
    /// Non-Hadir rows, plus one for a student with no rows at all
    pub total_absen: i64,
    pub total_absensi_dicatat: i64,
}

/// One point of the daily present/absent series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsPoint {
    pub tanggal: String,
    pub hadir: i64,
    pub absen: i64,
}

/// Per-student counts, ordered by class name then student name.
///
/// Students are left-joined to their rows, so without a date filter a student
/// with no attendance still appears. "Absent" counts both non-Hadir rows and the
/// missing row of such a student.
pub fn get_recap(conn: &Connection, filter: &RecapFilter) -> Result<Vec<RecapRow>, AbsensiError> {
    let _tmr = timer!(Level::Trace; "recap::get_recap", "{:?}", filter);

    let (where_sql, params) = filter.where_clause()?;
    let sql = format!(
        "SELECT s.nisn, s.full_name, c.name,
                COALESCE(SUM(CASE WHEN a.status = 'Hadir' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN a.status IS NULL OR a.status != 'Hadir' THEN 1 ELSE 0 END), 0),
                COUNT(a.attendance_id)
         FROM students s
         JOIN classes c ON s.class_id = c.class_id
         LEFT JOIN attendance a ON s.student_id = a.student_id
         {}
         GROUP BY s.student_id, s.nisn, s.full_name, c.name
         ORDER BY c.name ASC, s.full_name ASC",
        where_sql
    );

    let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(&params_ref[..], |row| {
            Ok(RecapRow {
                nisn: row.get(0)?,
                nama_siswa: row.get(1)?,
                nama_kelas: row.get(2)?,
                total_hadir: row.get(3)?,
                total_absen: row.get(4)?,
                total_absensi_dicatat: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Same filters as [`get_recap`], grouped by calendar date. Only dates that
/// have rows appear.
pub fn get_analytics(
    conn: &Connection,
    filter: &RecapFilter,
) -> Result<Vec<AnalyticsPoint>, AbsensiError> {
    let _tmr = timer!(Level::Trace; "recap::get_analytics", "{:?}", filter);

    let (where_sql, params) = filter.where_clause()?;
    let sql = format!(
        "SELECT a.attendance_date,
                SUM(CASE WHEN a.status = 'Hadir' THEN 1 ELSE 0 END),
                SUM(CASE WHEN a.status != 'Hadir' THEN 1 ELSE 0 END)
         FROM attendance a
         JOIN students s ON a.student_id = s.student_id
         JOIN classes c ON s.class_id = c.class_id
         {}
         GROUP BY a.attendance_date
         ORDER BY a.attendance_date ASC",
        where_sql
    );

    let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let points = stmt
        .query_map(&params_ref[..], |row| {
            Ok(AnalyticsPoint {
                tanggal: row.get(0)?,
                hadir: row.get(1)?,
                absen: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(points)
}

/// Count of rows per status tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    #[serde(rename = "Hadir")]
    pub hadir: i64,
    #[serde(rename = "Sakit")]
    pub sakit: i64,
    #[serde(rename = "Izin")]
    pub izin: i64,
    #[serde(rename = "Alpha")]
    pub alpha: i64,
    #[serde(rename = "Terlambat")]
    pub terlambat: i64,
}

impl StatusCounts {
    fn add(&mut self, status: StatusTag, count: i64) {
        match status {
            StatusTag::Hadir => self.hadir += count,
            StatusTag::Sakit => self.sakit += count,
            StatusTag::Izin => self.izin += count,
            StatusTag::Alpha => self.alpha += count,
            StatusTag::Terlambat => self.terlambat += count,
        }
    }

    /// Students who showed up, on time or late
    pub fn present(&self) -> i64 {
        self.hadir + self.terlambat
    }

    /// Counts for `date`, optionally limited to one class.
    fn for_date(conn: &Connection, date: NaiveDate, class_id: Option<i64>) -> Result<Self, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT a.status, COUNT(*)
             FROM attendance a
             JOIN students s ON a.student_id = s.student_id
             WHERE a.attendance_date = ?1 AND (?2 IS NULL OR s.class_id = ?2)
             GROUP BY a.status",
        )?;

        let mut counts = StatusCounts::default();
        let rows = stmt.query_map(params![format_date(date), class_id], |row| {
            Ok((row.get::<_, StatusTag>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.add(status, count);
        }
        Ok(counts)
    }
}

/// GET /api/admin/dashboard-stats
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_siswa: i64,
    pub total_guru: i64,
    pub total_kelas: i64,
    pub total_petugas: i64,
    pub hadir_siswa: i64,
    pub sakit_siswa: i64,
    pub izin_siswa: i64,
    pub alpha_siswa: i64,
    pub tanggal_hari_ini: String,
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, AbsensiError> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count)
}

pub fn dashboard_stats(conn: &Connection, today: NaiveDate) -> Result<DashboardStats, AbsensiError> {
    let _tmr = timer!(Level::Trace; "recap::dashboard_stats");

    let counts = StatusCounts::for_date(conn, today, None)?;

    Ok(DashboardStats {
        total_siswa: count_rows(conn, "students")?,
        total_guru: count_rows(conn, "teachers")?,
        total_kelas: count_rows(conn, "classes")?,
        total_petugas: User::count_by_role(conn, Role::Admin)?,
        hadir_siswa: counts.present(),
        sakit_siswa: counts.sakit,
        izin_siswa: counts.izin,
        alpha_siswa: counts.alpha,
        tanggal_hari_ini: format_date(today),
    })
}

/// One day of GET /api/admin/rekap/trend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Short label such as "05 Aug"
    pub date: String,
    pub full_date: String,
    /// Present students as a fraction of all students, two decimals
    pub persentase_hadir: f64,
    pub jumlah_hadir: i64,
}

/// The seven days ending at `today`, oldest first, with zero-filled gaps.
pub fn weekly_trend(conn: &Connection, today: NaiveDate) -> Result<Vec<TrendPoint>, AbsensiError> {
    let _tmr = timer!(Level::Trace; "recap::weekly_trend");

    let total_students = count_rows(conn, "students")?.max(1);
    let first_day = today - Duration::days(6);

    let mut stmt = conn.prepare(
        "SELECT attendance_date, COUNT(*)
         FROM attendance
         WHERE attendance_date BETWEEN ? AND ? AND status IN ('Hadir', 'Terlambat')
         GROUP BY attendance_date",
    )?;
    let present: Vec<(String, i64)> = stmt
        .query_map(params![format_date(first_day), format_date(today)], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let points = first_day
        .iter_days()
        .take(7)
        .map(|day| {
            let full_date = format_date(day);
            let jumlah_hadir = present
                .iter()
                .find(|(date, _)| *date == full_date)
                .map(|(_, count)| *count)
                .unwrap_or(0);
            let ratio = jumlah_hadir as f64 / total_students as f64;
            TrendPoint {
                date: day.format("%d %b").to_string(),
                full_date,
                persentase_hadir: (ratio * 100.0).round() / 100.0,
                jumlah_hadir,
            }
        })
        .collect();

    Ok(points)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherProfile {
    pub guru_id: i64,
    pub nama_guru: String,
    pub nip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeroomSummary {
    pub kelas_id: i64,
    pub nama_kelas: String,
    pub grade: String,
    pub total_siswa: i64,
    pub kehadiran_hari_ini: StatusCounts,
}

/// GET /api/guru/dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherDashboard {
    pub guru: TeacherProfile,
    pub is_wali_kelas: bool,
    pub kelas_info: Option<HomeroomSummary>,
}

/// Profile of the teacher logged in as `user_id` and, when they lead a class in
/// the active year, that class's headcount and today's counts.
pub fn teacher_dashboard(
    conn: &Connection,
    user_id: i64,
    today: NaiveDate,
) -> Result<TeacherDashboard, AbsensiError> {
    let _tmr = timer!(Level::Trace; "recap::teacher_dashboard", "{}", user_id);

    let guru = conn
        .query_row(
            "SELECT teacher_id, full_name, nip FROM teachers WHERE user_id = ?",
            [user_id],
            |row| {
                Ok(TeacherProfile {
                    guru_id: row.get(0)?,
                    nama_guru: row.get(1)?,
                    nip: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| {
            AbsensiError::NotFound(
                "Teacher profile not found. Ask an administrator to link this account".to_string(),
            )
        })?;

    // Without an active year there is no homeroom to report
    let year = match AcademicYear::get_active(conn) {
        Ok(year) => Some(year),
        Err(AbsensiError::NoActiveYear) => None,
        Err(e) => return Err(e),
    };

    let homeroom = match year {
        Some(year) => conn
            .query_row(
                "SELECT c.class_id, c.name, c.grade_level
                 FROM homerooms h
                 JOIN classes c ON h.class_id = c.class_id
                 WHERE h.teacher_id = ? AND h.academic_year_id = ?
                 ORDER BY c.name
                 LIMIT 1",
                params![guru.guru_id, year.academic_year_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?,
        None => None,
    };

    let kelas_info = match homeroom {
        Some((class_id, name, grade)) => {
            let total_siswa: i64 = conn.query_row(
                "SELECT COUNT(*) FROM students WHERE class_id = ?",
                [class_id],
                |row| row.get(0),
            )?;
            Some(HomeroomSummary {
                kelas_id: class_id,
                nama_kelas: name,
                grade,
                total_siswa,
                kehadiran_hari_ini: StatusCounts::for_date(conn, today, Some(class_id))?,
            })
        }
        None => None,
    };

    Ok(TeacherDashboard {
        guru,
        is_wali_kelas: kelas_info.is_some(),
        kelas_info,
    })
}
