use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::AbsensiError;

/// A school year (tahun ajaran). At most one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcademicYear {
    #[serde(rename = "id")]
    pub academic_year_id: i64,
    #[serde(rename = "nama")]
    pub label: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AcademicYearRequest {
    #[serde(default)]
    pub nama: String,
    #[serde(default)]
    pub is_active: bool,
}

impl AcademicYear {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(AcademicYear {
            academic_year_id: row.get(0)?,
            label: row.get(1)?,
            is_active: row.get(2)?,
        })
    }

    /// Returns the single active year.
    ///
    /// Zero active rows is `NoActiveYear`. More than one is reported as an
    /// error rather than silently picking one.
    pub fn get_active(conn: &Connection) -> Result<Self, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT academic_year_id, label, is_active
             FROM academic_years
             WHERE is_active = 1
             LIMIT 2",
        )?;
        let mut years = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        match years.len() {
            0 => Err(AbsensiError::NoActiveYear),
            1 => Ok(years.remove(0)),
            _ => Err(AbsensiError::Error(
                "More than one academic year is marked active".to_string(),
            )),
        }
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Self>, AbsensiError> {
        let year = conn
            .query_row(
                "SELECT academic_year_id, label, is_active FROM academic_years WHERE academic_year_id = ?",
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(year)
    }

    /// Newest first.
    pub fn list(conn: &Connection) -> Result<Vec<Self>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT academic_year_id, label, is_active
             FROM academic_years
             ORDER BY academic_year_id DESC",
        )?;
        let years = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(years)
    }

    pub fn create(conn: &Connection, label: &str, is_active: bool) -> Result<Self, AbsensiError> {
        let label = validate_label(label)?;

        let year = Database::immediate_transaction(conn, |c| {
            if is_active {
                deactivate_all(c)?;
            }
            c.query_row(
                "INSERT INTO academic_years (label, is_active) VALUES (?, ?)
                 RETURNING academic_year_id, label, is_active",
                params![label, is_active],
                Self::from_row,
            )
            .map_err(|e| {
                AbsensiError::from(e).on_unique("An academic year with this name already exists")
            })
        })?;

        info!("Created academic year '{}' (id: {})", year.label, year.academic_year_id);
        Ok(year)
    }

    pub fn update(
        conn: &Connection,
        id: i64,
        label: &str,
        is_active: bool,
    ) -> Result<Self, AbsensiError> {
        let label = validate_label(label)?;

        Database::immediate_transaction(conn, |c| {
            if is_active {
                deactivate_all(c)?;
            }
            c.query_row(
                "UPDATE academic_years SET label = ?, is_active = ?
                 WHERE academic_year_id = ?
                 RETURNING academic_year_id, label, is_active",
                params![label, is_active, id],
                Self::from_row,
            )
            .optional()
            .map_err(|e| {
                AbsensiError::from(e).on_unique("An academic year with this name already exists")
            })?
            .ok_or_else(|| AbsensiError::NotFound(format!("Academic year {} not found", id)))
        })
    }

    /// Makes `id` the only active year.
    pub fn activate(conn: &Connection, id: i64) -> Result<Self, AbsensiError> {
        let year = Database::immediate_transaction(conn, |c| {
            deactivate_all(c)?;
            c.query_row(
                "UPDATE academic_years SET is_active = 1
                 WHERE academic_year_id = ?
                 RETURNING academic_year_id, label, is_active",
                [id],
                Self::from_row,
            )
            .optional()?
            .ok_or_else(|| AbsensiError::NotFound(format!("Academic year {} not found", id)))
        })?;

        info!("Academic year '{}' is now active", year.label);
        Ok(year)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<(), AbsensiError> {
        let rows = conn
            .execute("DELETE FROM academic_years WHERE academic_year_id = ?", [id])
            .map_err(|e| {
                AbsensiError::from(e).on_foreign_key(
                    "Cannot delete: this academic year is still referenced by other data",
                    false,
                )
            })?;

        if rows == 0 {
            return Err(AbsensiError::NotFound(format!("Academic year {} not found", id)));
        }
        Ok(())
    }
}

fn validate_label(label: &str) -> Result<&str, AbsensiError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(AbsensiError::Validation(
            "Academic year name is required".to_string(),
        ));
    }
    Ok(label)
}

fn deactivate_all(conn: &Connection) -> Result<(), AbsensiError> {
    conn.execute("UPDATE academic_years SET is_active = 0 WHERE is_active = 1", [])?;
    Ok(())
}
