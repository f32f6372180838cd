use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::verify_password;
use crate::config::SchoolConfig;
use crate::database::Database;
use crate::error::AbsensiError;
use crate::users::User;

const KEY_CHECK_IN_START: &str = "check_in_start";
const KEY_CHECK_IN_END: &str = "check_in_end";
const KEY_LATE_TOLERANCE: &str = "late_tolerance_minutes";

/// Validate a time of day in 'HH:MM' format
pub fn validate_time_of_day(time: &str) -> Result<(), String> {
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() != 2 {
        return Err(format!("time must be in HH:MM format, got: {}", time));
    }

    let hours: u32 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid hours in time: {}", parts[0]))?;
    let minutes: u32 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid minutes in time: {}", parts[1]))?;

    if hours >= 24 {
        return Err(format!("Hours must be 0-23, got: {}", hours));
    }
    if minutes >= 60 {
        return Err(format!("Minutes must be 0-59, got: {}", minutes));
    }

    Ok(())
}

fn minutes_of_day(time: &str) -> Option<u32> {
    let (h, m) = time.split_once(':')?;
    Some(h.parse::<u32>().ok()? * 60 + m.parse::<u32>().ok()?)
}

/// School-wide check-in window
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SystemSettings {
    #[serde(rename = "jam_masuk_mulai")]
    pub check_in_start: String,
    #[serde(rename = "jam_masuk_akhir")]
    pub check_in_end: String,
    #[serde(rename = "toleransi_terlambat")]
    pub late_tolerance_minutes: i64,
}

/// Partial update body for PUT /api/admin/settings/system
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SystemSettingsUpdate {
    pub jam_masuk_mulai: Option<String>,
    pub jam_masuk_akhir: Option<String>,
    pub toleransi_terlambat: Option<i64>,
}

impl SystemSettings {
    pub fn from_config(school: &SchoolConfig) -> Self {
        SystemSettings {
            check_in_start: school.check_in_start.clone(),
            check_in_end: school.check_in_end.clone(),
            late_tolerance_minutes: school.late_tolerance_minutes,
        }
    }

    /// Stored values, falling back to `defaults` for keys never written.
    pub fn load(conn: &Connection, defaults: &SchoolConfig) -> Result<Self, AbsensiError> {
        let mut settings = Self::from_config(defaults);

        if let Some(v) = get_value(conn, KEY_CHECK_IN_START)? {
            settings.check_in_start = v;
        }
        if let Some(v) = get_value(conn, KEY_CHECK_IN_END)? {
            settings.check_in_end = v;
        }
        if let Some(v) = get_value(conn, KEY_LATE_TOLERANCE)? {
            settings.late_tolerance_minutes = v.parse().unwrap_or(defaults.late_tolerance_minutes);
        }

        Ok(settings)
    }

    pub fn apply(&mut self, update: SystemSettingsUpdate) {
        if let Some(start) = update.jam_masuk_mulai {
            self.check_in_start = start.trim().to_string();
        }
        if let Some(end) = update.jam_masuk_akhir {
            self.check_in_end = end.trim().to_string();
        }
        if let Some(tolerance) = update.toleransi_terlambat {
            self.late_tolerance_minutes = tolerance;
        }
    }

    pub fn validate(&self) -> Result<(), AbsensiError> {
        validate_time_of_day(&self.check_in_start).map_err(AbsensiError::Validation)?;
        validate_time_of_day(&self.check_in_end).map_err(AbsensiError::Validation)?;

        if minutes_of_day(&self.check_in_end) <= minutes_of_day(&self.check_in_start) {
            return Err(AbsensiError::Validation(
                "Check-in end must be after check-in start".to_string(),
            ));
        }
        if self.late_tolerance_minutes < 0 {
            return Err(AbsensiError::Validation(
                "Late tolerance cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store(&self, conn: &Connection) -> Result<(), AbsensiError> {
        self.validate()?;

        Database::immediate_transaction(conn, |c| {
            put_value(c, KEY_CHECK_IN_START, &self.check_in_start)?;
            put_value(c, KEY_CHECK_IN_END, &self.check_in_end)?;
            put_value(c, KEY_LATE_TOLERANCE, &self.late_tolerance_minutes.to_string())?;
            Ok(())
        })?;

        info!(
            "Check-in window set to {}-{} (tolerance {} min)",
            self.check_in_start, self.check_in_end, self.late_tolerance_minutes
        );
        Ok(())
    }
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>, AbsensiError> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn put_value(conn: &Connection, key: &str, value: &str) -> Result<(), AbsensiError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

#[derive(Deserialize, Debug, Default)]
pub struct ChangePasswordRequest {
    #[serde(default, alias = "oldPassword")]
    pub old_password: String,
    #[serde(default, alias = "newPassword")]
    pub new_password: String,
}

/// Changes the caller's own password after checking the current one.
pub fn change_password(
    conn: &Connection,
    user_id: i64,
    req: &ChangePasswordRequest,
) -> Result<(), AbsensiError> {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(AbsensiError::Validation(
            "Old and new password are required".to_string(),
        ));
    }

    let hash = User::password_hash(conn, user_id)?
        .ok_or_else(|| AbsensiError::NotFound("User not found".to_string()))?;

    if !verify_password(&req.old_password, &hash) {
        return Err(AbsensiError::Auth("Old password is incorrect".to_string()));
    }

    User::set_password(conn, user_id, &req.new_password)?;
    info!("User {} changed their password", user_id);
    Ok(())
}

pub fn update_username(conn: &Connection, user_id: i64, username: &str) -> Result<(), AbsensiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AbsensiError::Validation("Username is required".to_string()));
    }

    User::set_username(conn, user_id, username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::test_support::test_db;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn school() -> SchoolConfig {
        SchoolConfig {
            check_in_start: "06:00".to_string(),
            check_in_end: "08:00".to_string(),
            late_tolerance_minutes: 15,
        }
    }

    #[test]
    fn test_validate_time_of_day() {
        assert!(validate_time_of_day("00:00").is_ok());
        assert!(validate_time_of_day("23:59").is_ok());
        assert!(validate_time_of_day("24:00").is_err());
        assert!(validate_time_of_day("12:60").is_err());
        assert!(validate_time_of_day("1200").is_err());
        assert!(validate_time_of_day("ab:cd").is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_times_accepted(h in 0u32..24, m in 0u32..60) {
            let time = format!("{:02}:{:02}", h, m);
            prop_assert!(validate_time_of_day(&time).is_ok());
        }

        #[test]
        fn prop_out_of_range_hours_rejected(h in 24u32..1000, m in 0u32..60) {
            let time = format!("{:02}:{:02}", h, m);
            prop_assert!(validate_time_of_day(&time).is_err());
        }
    }

    #[test]
    fn test_system_settings_default_then_stored() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();

        let mut settings = SystemSettings::load(&conn, &school()).unwrap();
        assert_eq!(settings, SystemSettings::from_config(&school()));

        settings.apply(SystemSettingsUpdate {
            jam_masuk_mulai: Some("06:30".to_string()),
            jam_masuk_akhir: None,
            toleransi_terlambat: Some(10),
        });
        settings.store(&conn).unwrap();

        let reloaded = SystemSettings::load(&conn, &school()).unwrap();
        assert_eq!(reloaded.check_in_start, "06:30");
        assert_eq!(reloaded.check_in_end, "08:00");
        assert_eq!(reloaded.late_tolerance_minutes, 10);
    }

    #[test]
    fn test_invalid_window_is_not_stored() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();

        let mut settings = SystemSettings::from_config(&school());
        settings.check_in_end = "05:00".to_string();
        assert!(matches!(settings.store(&conn), Err(AbsensiError::Validation(_))));

        settings.check_in_end = "8am".to_string();
        assert!(matches!(settings.store(&conn), Err(AbsensiError::Validation(_))));

        assert_eq!(SystemSettings::load(&conn, &school()).unwrap().check_in_end, "08:00");
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(SystemSettings::from_config(&school())).unwrap();
        assert_eq!(json["jam_masuk_mulai"], "06:00");
        assert_eq!(json["jam_masuk_akhir"], "08:00");
        assert_eq!(json["toleransi_terlambat"], 15);
    }

    #[test]
    fn test_change_password() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let id = User::create(&conn, "kepsek", "lama", Role::Admin).unwrap();

        let wrong = ChangePasswordRequest {
            old_password: "keliru".to_string(),
            new_password: "baru".to_string(),
        };
        assert!(matches!(
            change_password(&conn, id, &wrong),
            Err(AbsensiError::Auth(_))
        ));

        let missing = ChangePasswordRequest::default();
        assert!(matches!(
            change_password(&conn, id, &missing),
            Err(AbsensiError::Validation(_))
        ));

        let ok = ChangePasswordRequest {
            old_password: "lama".to_string(),
            new_password: "baru".to_string(),
        };
        change_password(&conn, id, &ok).unwrap();
        let hash = User::password_hash(&conn, id).unwrap().unwrap();
        assert!(verify_password("baru", &hash));
    }

    #[test]
    fn test_camel_case_password_fields_accepted() {
        let req: ChangePasswordRequest =
            serde_json::from_str(r#"{"oldPassword":"a","newPassword":"b"}"#).unwrap();
        assert_eq!(req.old_password, "a");
        assert_eq!(req.new_password, "b");
    }

    #[test]
    fn test_update_username() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let id = crate::test_support::insert_user(&conn, "admin", "admin");
        crate::test_support::insert_user(&conn, "taken", "guru");

        update_username(&conn, id, " kepsek ").unwrap();
        assert_eq!(User::get_by_id(&conn, id).unwrap().unwrap().username, "kepsek");

        assert!(matches!(
            update_username(&conn, id, "taken"),
            Err(AbsensiError::Conflict(_))
        ));
        assert!(matches!(
            update_username(&conn, id, ""),
            Err(AbsensiError::Validation(_))
        ));
    }
}
