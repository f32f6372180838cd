use chrono::Utc;
use log::info;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::academic_years::AcademicYear;
use crate::database::Database;
use crate::error::AbsensiError;

/// A homeroom assignment (wali kelas) in the active year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Homeroom {
    pub id: i64,
    pub kelas_id: i64,
    pub nama_kelas: String,
    pub grade: String,
    pub guru_id: i64,
    pub nama_guru: String,
    pub ta_id: i64,
    pub nama_ta: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub kelas_id: Option<i64>,
    pub guru_id: Option<i64>,
}

/// Id and display name for pick lists
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub id: i64,
    pub nama: String,
}

/// Entry of GET /api/admin/wali-kelas-list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: i64,
    pub nama: String,
    pub nip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    Replaced,
}

impl AssignOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            AssignOutcome::Assigned => "Homeroom teacher assigned",
            AssignOutcome::Replaced => "Homeroom teacher replaced",
        }
    }
}

impl Homeroom {
    /// Makes `teacher_id` the homeroom lead of `class_id` for the active year,
    /// replacing any existing lead.
    pub fn assign(conn: &Connection, req: &AssignRequest) -> Result<AssignOutcome, AbsensiError> {
        let (Some(class_id), Some(teacher_id)) = (req.kelas_id, req.guru_id) else {
            return Err(AbsensiError::Validation(
                "Class and teacher must be selected".to_string(),
            ));
        };

        let outcome = Database::immediate_transaction(conn, |c| {
            let year = AcademicYear::get_active(c)?;

            let existed: bool = c.query_row(
                "SELECT EXISTS (SELECT 1 FROM homerooms WHERE class_id = ? AND academic_year_id = ?)",
                params![class_id, year.academic_year_id],
                |row| row.get(0),
            )?;

            c.execute(
                "INSERT INTO homerooms (class_id, teacher_id, academic_year_id, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (class_id, academic_year_id)
                 DO UPDATE SET teacher_id = excluded.teacher_id, updated_at = excluded.updated_at",
                params![class_id, teacher_id, year.academic_year_id, Utc::now().timestamp()],
            )
            .map_err(|e| AbsensiError::from(e).on_foreign_key("Teacher or class not found", true))?;

            Ok(if existed {
                AssignOutcome::Replaced
            } else {
                AssignOutcome::Assigned
            })
        })?;

        info!("Homeroom of class {} set to teacher {} ({:?})", class_id, teacher_id, outcome);
        Ok(outcome)
    }

    /// Assignments of the active year, by grade then class name.
    pub fn list(conn: &Connection) -> Result<Vec<Self>, AbsensiError> {
        let year = AcademicYear::get_active(conn)?;

        let mut stmt = conn.prepare(
            "SELECT h.homeroom_id, c.class_id, c.name, c.grade_level,
                    t.teacher_id, t.full_name, y.academic_year_id, y.label
             FROM homerooms h
             JOIN classes c ON h.class_id = c.class_id
             JOIN teachers t ON h.teacher_id = t.teacher_id
             JOIN academic_years y ON h.academic_year_id = y.academic_year_id
             WHERE h.academic_year_id = ?
             ORDER BY c.grade_level ASC, c.name ASC",
        )?;

        let homerooms = stmt
            .query_map([year.academic_year_id], |row| {
                Ok(Homeroom {
                    id: row.get(0)?,
                    kelas_id: row.get(1)?,
                    nama_kelas: row.get(2)?,
                    grade: row.get(3)?,
                    guru_id: row.get(4)?,
                    nama_guru: row.get(5)?,
                    ta_id: row.get(6)?,
                    nama_ta: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(homerooms)
    }

    pub fn remove(conn: &Connection, id: i64) -> Result<(), AbsensiError> {
        let rows = conn.execute("DELETE FROM homerooms WHERE homeroom_id = ?", [id])?;
        if rows == 0 {
            return Err(AbsensiError::NotFound(
                "Homeroom assignment not found".to_string(),
            ));
        }
        Ok(())
    }

    /// Classes without a homeroom lead in the active year.
    pub fn available_classes(conn: &Connection) -> Result<Vec<Choice>, AbsensiError> {
        let year = AcademicYear::get_active(conn)?;
        let mut stmt = conn.prepare(
            "SELECT c.class_id, c.name
             FROM classes c
             LEFT JOIN homerooms h ON c.class_id = h.class_id AND h.academic_year_id = ?
             WHERE h.class_id IS NULL
             ORDER BY c.grade_level ASC, c.name ASC",
        )?;
        let choices = stmt
            .query_map([year.academic_year_id], choice_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(choices)
    }

    /// Teachers who lead no class in the active year.
    pub fn available_teachers(conn: &Connection) -> Result<Vec<Choice>, AbsensiError> {
        let year = AcademicYear::get_active(conn)?;
        let mut stmt = conn.prepare(
            "SELECT t.teacher_id, t.full_name
             FROM teachers t
             LEFT JOIN homerooms h ON t.teacher_id = h.teacher_id AND h.academic_year_id = ?
             WHERE h.teacher_id IS NULL
             ORDER BY t.full_name ASC",
        )?;
        let choices = stmt
            .query_map([year.academic_year_id], choice_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(choices)
    }

    /// Every teacher, for the homeroom picker.
    pub fn candidates(conn: &Connection) -> Result<Vec<Candidate>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT teacher_id, full_name, nip FROM teachers ORDER BY full_name ASC",
        )?;
        let candidates = stmt
            .query_map([], |row| {
                Ok(Candidate {
                    id: row.get(0)?,
                    nama: row.get(1)?,
                    nip: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }
}

fn choice_from_row(row: &rusqlite::Row) -> rusqlite::Result<Choice> {
    Ok(Choice {
        id: row.get(0)?,
        nama: row.get(1)?,
    })
}
