use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::AbsensiError;

/// A class section with its homeroom lead for the active year, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSection {
    pub id: i64,
    pub nama: String,
    pub grade: String,
    pub wali_kelas_id: Option<i64>,
    pub wali_kelas_name: Option<String>,
    pub current_wali_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClassRequest {
    #[serde(default)]
    pub nama_kelas: String,
    #[serde(default)]
    pub grade: String,
}

/// Id and name, as returned after a write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRef {
    pub kelas_id: i64,
    pub nama_kelas: String,
}

impl ClassSection {
    /// Ordered by grade then name.
    pub fn list(conn: &Connection) -> Result<Vec<Self>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT c.class_id, c.name, c.grade_level,
                    h.homeroom_id, t.full_name, h.teacher_id
             FROM classes c
             LEFT JOIN homerooms h
                 ON c.class_id = h.class_id
                 AND h.academic_year_id = (SELECT academic_year_id FROM academic_years WHERE is_active = 1)
             LEFT JOIN teachers t ON h.teacher_id = t.teacher_id
             ORDER BY c.grade_level ASC, c.name ASC",
        )?;

        let classes = stmt
            .query_map([], |row| {
                Ok(ClassSection {
                    id: row.get(0)?,
                    nama: row.get(1)?,
                    grade: row.get(2)?,
                    wali_kelas_id: row.get(3)?,
                    wali_kelas_name: row.get(4)?,
                    current_wali_id: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(classes)
    }

    pub fn create(conn: &Connection, req: &ClassRequest) -> Result<ClassRef, AbsensiError> {
        let (name, grade) = validate(req)?;

        let class = conn
            .query_row(
                "INSERT INTO classes (name, grade_level) VALUES (?, ?)
                 RETURNING class_id, name",
                params![name, grade],
                class_ref_from_row,
            )
            .map_err(|e| AbsensiError::from(e).on_unique("Class name already exists"))?;

        info!("Created class '{}' (id: {})", class.nama_kelas, class.kelas_id);
        Ok(class)
    }

    pub fn update(conn: &Connection, id: i64, req: &ClassRequest) -> Result<ClassRef, AbsensiError> {
        let (name, grade) = validate(req)?;

        conn.query_row(
            "UPDATE classes SET name = ?, grade_level = ? WHERE class_id = ?
             RETURNING class_id, name",
            params![name, grade, id],
            class_ref_from_row,
        )
        .optional()
        .map_err(|e| AbsensiError::from(e).on_unique("Class name is already in use"))?
        .ok_or_else(|| AbsensiError::NotFound("Class not found".to_string()))
    }

    /// Refused while students or homeroom assignments still reference the class.
    pub fn delete(conn: &Connection, id: i64) -> Result<(), AbsensiError> {
        let rows = conn
            .execute("DELETE FROM classes WHERE class_id = ?", [id])
            .map_err(|e| {
                AbsensiError::from(e).on_foreign_key(
                    "Cannot delete: this class still has students or a homeroom assignment",
                    false,
                )
            })?;

        if rows == 0 {
            return Err(AbsensiError::NotFound("Class not found".to_string()));
        }
        Ok(())
    }
}

fn class_ref_from_row(row: &rusqlite::Row) -> rusqlite::Result<ClassRef> {
    Ok(ClassRef {
        kelas_id: row.get(0)?,
        nama_kelas: row.get(1)?,
    })
}

fn validate(req: &ClassRequest) -> Result<(&str, &str), AbsensiError> {
    let name = req.nama_kelas.trim();
    let grade = req.grade.trim();
    if name.is_empty() || grade.is_empty() {
        return Err(AbsensiError::Validation(
            "Class name and grade are required".to_string(),
        ));
    }
    Ok((name, grade))
}
